use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use retouch_contracts::events::{payload, EventKind, EventWriter};
use retouch_contracts::library::{History, SavedPrompts};
use retouch_contracts::prompt::{
    find_preset, BackdropStyle, ControlState, PromptState, LIGHTING_CLAUSES, PRESET_CLAUSES,
};
use retouch_contracts::session::{parse_command, SessionCommand, SESSION_HELP_COMMANDS};
use retouch_contracts::store::{JsonFileBackend, LocalStore};
use retouch_engine::{build_backend, BackendKind, RestorationClient, RetouchConfig, Workbench};
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(name = "retouch", version, about = "Restore old photos with a generative image model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Restore one or more photos and record them in history.
    Restore(RestoreArgs),
    /// Compose a prompt from structured controls and print it.
    Prompt(PromptArgs),
    /// List or delete restoration history.
    History(HistoryArgs),
    /// Manage saved prompts.
    Prompts(PromptsArgs),
    /// Interactive session with slash commands.
    Session(SessionArgs),
}

#[derive(Debug, Clone, Parser)]
struct EngineArgs {
    #[arg(long, default_value = "gemini")]
    backend: BackendKind,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct RestoreArgs {
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    reference: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Default, Parser)]
struct PromptArgs {
    #[arg(long)]
    base: Option<String>,
    /// Preset text or its 1-based position; repeatable, each one toggles.
    #[arg(long = "preset")]
    presets: Vec<String>,
    #[arg(long)]
    all: bool,
    #[arg(long)]
    backdrop: Option<String>,
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    lighting: Option<usize>,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[command(subcommand)]
    command: HistoryCommand,
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List,
    Delete { id: String },
}

#[derive(Debug, Parser)]
struct PromptsArgs {
    #[command(subcommand)]
    command: PromptsCommand,
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum PromptsCommand {
    List,
    Save { text: String },
    Export { path: PathBuf },
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[command(flatten)]
    engine: EngineArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("retouch error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Restore(args) => run_restore(args),
        Command::Prompt(args) => {
            let prompt = compose_prompt(&args)?;
            println!("{}", prompt.text());
            print!("{}", render_view(&prompt.view()));
            Ok(0)
        }
        Command::History(args) => run_history(args),
        Command::Prompts(args) => run_prompts(args),
        Command::Session(args) => {
            run_session(args)?;
            Ok(0)
        }
    }
}

fn load_config(data_dir: Option<&Path>, model: Option<&str>) -> RetouchConfig {
    let mut config = RetouchConfig::from_env();
    if let Some(dir) = data_dir {
        config.data_dir = dir.to_path_buf();
    }
    if let Some(model) = model.map(str::trim).filter(|model| !model.is_empty()) {
        config.model = model.to_string();
    }
    config
}

fn open_events(config: &RetouchConfig, command: &str) -> EventWriter {
    let session_id = format!("session-{}", uuid::Uuid::new_v4().simple());
    let events = EventWriter::new(config.events_path(), session_id);
    events.record(
        EventKind::SessionStarted,
        payload(json!({
            "command": command,
            "data_dir": config.data_dir.to_string_lossy(),
            "model": config.model,
        })),
    );
    events
}

fn open_store(config: &RetouchConfig, events: &EventWriter) -> LocalStore {
    LocalStore::new(JsonFileBackend::new(config.store_path()), Some(events.clone()))
}

fn open_workbench(engine: &EngineArgs, command: &str) -> Result<Workbench> {
    let config = load_config(engine.data_dir.as_deref(), engine.model.as_deref());
    let events = open_events(&config, command);
    let backend = build_backend(engine.backend, &config)?;
    let client = RestorationClient::new(backend, config.model.clone(), Some(events.clone()));
    let store = open_store(&config, &events);
    Ok(Workbench::new(client, store, Some(events)))
}

fn run_restore(args: RestoreArgs) -> Result<i32> {
    let mut bench = open_workbench(&args.engine, "restore")?;
    let added = bench.add_source_paths(&args.images)?;
    if added.len() < args.images.len() {
        eprintln!(
            "Only the first {} of {} images were added.",
            added.len(),
            args.images.len()
        );
    }
    if let Some(reference) = args.reference.as_deref() {
        bench.set_reference_path(reference)?;
    }
    bench.set_prompt(PromptState::default().edit_raw(args.prompt));

    let mut stdout = io::stdout();
    restore_and_report(&mut bench, args.out.as_deref(), &mut stdout)?;
    Ok(0)
}

fn restore_and_report(
    bench: &mut Workbench,
    out: Option<&Path>,
    w: &mut dyn Write,
) -> Result<()> {
    let results = match bench.restore() {
        Ok(results) => results.to_vec(),
        Err(failure) => bail!(failure),
    };
    for result in &results {
        writeln!(w, "{}  {}", result.id, result.model_text)?;
    }
    if let Some(dir) = out {
        for path in bench.download_current(dir)? {
            writeln!(w, "wrote {}", path.display())?;
        }
    }
    Ok(())
}

/// Applies the structured options on top of `--base`, in a fixed order:
/// presets, all, backdrop style, color, lighting.
fn compose_prompt(args: &PromptArgs) -> Result<PromptState> {
    let mut prompt = match args.base.as_deref() {
        Some(base) => PromptState::default().edit_raw(base),
        None => PromptState::default(),
    };
    for raw in &args.presets {
        let Some(preset) = find_preset(raw) else {
            bail!("Unknown preset '{raw}'.");
        };
        prompt = prompt.toggle_preset(preset);
    }
    if args.all {
        prompt = prompt.toggle_all_presets();
    }
    if let Some(raw) = args.backdrop.as_deref() {
        let Some(style) = BackdropStyle::parse(raw) else {
            bail!("Unknown backdrop style '{raw}' (expected none, plain or gradient).");
        };
        prompt = prompt.set_backdrop_style(style);
    }
    if let Some(color) = args.color.as_deref() {
        prompt = prompt.set_backdrop_color(color);
    }
    if let Some(index) = args.lighting {
        prompt = prompt.set_lighting(index)?;
    }
    Ok(prompt)
}

fn render_view(view: &ControlState) -> String {
    let mut out = String::new();
    for (idx, preset) in PRESET_CLAUSES.iter().enumerate() {
        let mark = if view.presets[idx] { "x" } else { " " };
        out.push_str(&format!("[{mark}] {}. {preset}\n", idx + 1));
    }
    out.push_str(&format!(
        "all presets: {}\n",
        if view.all_selected { "on" } else { "off" }
    ));
    match view.backdrop.style {
        BackdropStyle::None => out.push_str("backdrop: none\n"),
        style => out.push_str(&format!("backdrop: {style} {}\n", view.backdrop.color)),
    }
    let clause = LIGHTING_CLAUSES[view.lighting];
    if clause.is_empty() {
        out.push_str(&format!("lighting: {} (neutral)\n", view.lighting));
    } else {
        out.push_str(&format!("lighting: {} ({clause})\n", view.lighting));
    }
    out
}

fn run_history(args: HistoryArgs) -> Result<i32> {
    let config = load_config(args.data_dir.as_deref(), None);
    let events = open_events(&config, "history");
    let mut store = open_store(&config, &events);
    let mut history = History::load(&store);
    match args.command {
        HistoryCommand::List => {
            for result in history.newest_first() {
                println!("{}\t{}\t{}", result.id, result.timestamp, result.prompt);
            }
            Ok(0)
        }
        HistoryCommand::Delete { id } => {
            if !history.delete(&id) {
                eprintln!("No history entry with id {id}.");
                return Ok(1);
            }
            history.save(&mut store);
            println!("Deleted {id}");
            Ok(0)
        }
    }
}

fn run_prompts(args: PromptsArgs) -> Result<i32> {
    let config = load_config(args.data_dir.as_deref(), None);
    let events = open_events(&config, "prompts");
    let mut store = open_store(&config, &events);
    let mut saved = SavedPrompts::load(&store);
    match args.command {
        PromptsCommand::List => {
            for (idx, prompt) in saved.entries().iter().enumerate() {
                println!("{}. {prompt}", idx + 1);
            }
        }
        PromptsCommand::Save { text } => {
            if saved.insert(&text) {
                saved.save(&mut store);
                println!("Saved prompt #{}", saved.entries().len());
            } else {
                println!("Prompt is empty or already saved.");
            }
        }
        PromptsCommand::Export { path } => {
            saved.export_to(&path)?;
            println!(
                "Exported {} prompts to {}",
                saved.entries().len(),
                path.display()
            );
        }
    }
    Ok(0)
}

fn run_session(args: SessionArgs) -> Result<()> {
    let mut bench = open_workbench(&args.engine, "session")?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    println!("Retouch session started. Type /help for commands.");
    loop {
        print!("> ");
        stdout.flush()?;

        line.clear();
        let read = match stdin.lock().read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let command = parse_command(line.trim_end_matches(['\n', '\r']));
        if let Err(err) = handle_session_command(&mut bench, &command, &mut stdout) {
            writeln!(stdout, "Error: {err:#}")?;
        }
    }
    Ok(())
}

fn handle_session_command(
    bench: &mut Workbench,
    command: &SessionCommand,
    w: &mut dyn Write,
) -> Result<()> {
    let value = command.arg_str("value").unwrap_or_default().trim();
    match command.action.as_str() {
        "noop" => return Ok(()),
        "help" => {
            writeln!(w, "Commands: {}", SESSION_HELP_COMMANDS.join(" "))?;
            writeln!(w, "Any other text replaces the prompt.")?;
            return Ok(());
        }
        "set_prompt" => {
            let prompt = bench.prompt().edit_raw(value);
            bench.set_prompt(prompt);
        }
        "toggle_preset" => {
            let Some(preset) = find_preset(value) else {
                bail!("Unknown preset '{value}'. Use a name or a number 1-7.");
            };
            let prompt = bench.prompt().toggle_preset(preset);
            bench.set_prompt(prompt);
        }
        "toggle_all_presets" => {
            let prompt = bench.prompt().toggle_all_presets();
            bench.set_prompt(prompt);
        }
        "set_backdrop_style" => {
            let Some(style) = BackdropStyle::parse(value) else {
                bail!("/backdrop expects none, plain or gradient");
            };
            let prompt = bench.prompt().set_backdrop_style(style);
            bench.set_prompt(prompt);
        }
        "set_backdrop_color" => {
            if value.is_empty() || value.contains(char::is_whitespace) {
                bail!("/color expects a single color token such as #ffffff");
            }
            let prompt = bench.prompt().set_backdrop_color(value);
            bench.set_prompt(prompt);
        }
        "set_lighting" => {
            let Ok(index) = value.parse::<usize>() else {
                bail!("/light expects a number 0-{}", LIGHTING_CLAUSES.len() - 1);
            };
            let prompt = bench.prompt().set_lighting(index)?;
            bench.set_prompt(prompt);
        }
        "show_view" => {
            writeln!(w, "Prompt: {}", bench.prompt().text())?;
            write!(w, "{}", render_view(&bench.prompt().view()))?;
            return Ok(());
        }
        "add_sources" => {
            let paths = command
                .args
                .get("paths")
                .and_then(Value::as_array)
                .map(|rows| {
                    rows.iter()
                        .filter_map(Value::as_str)
                        .map(PathBuf::from)
                        .collect::<Vec<PathBuf>>()
                })
                .unwrap_or_default();
            if paths.is_empty() {
                bail!("/add requires at least one path");
            }
            let added = bench.add_source_paths(&paths)?;
            writeln!(w, "Added {} of {} images.", added.len(), paths.len())?;
            return Ok(());
        }
        "remove_source" => {
            if bench.remove_source(value) {
                writeln!(w, "Removed {value}")?;
            } else {
                writeln!(w, "No source image with id {value}.")?;
            }
            return Ok(());
        }
        "list_sources" => {
            for handle in bench.sources().handles() {
                let origin = if handle.is_original { "original" } else { "generated" };
                writeln!(w, "{}  {}  {origin}", handle.id, handle.mime_type)?;
            }
            if let Some(reference) = bench.reference() {
                writeln!(w, "reference: {}", reference.id)?;
            }
            return Ok(());
        }
        "set_reference" => {
            let path = command.arg_str("path").unwrap_or_default();
            if path.is_empty() {
                bail!("/ref requires a path");
            }
            let id = bench.set_reference_path(Path::new(path))?;
            writeln!(w, "Reference set to {id}")?;
            return Ok(());
        }
        "clear_reference" => {
            bench.clear_reference();
            writeln!(w, "Reference cleared.")?;
            return Ok(());
        }
        "restore" => {
            return restore_and_report(bench, None, w);
        }
        "promote_result" => {
            let result_id = command.arg_str("result_id").unwrap_or_default();
            let variant = command
                .args
                .get("variant")
                .and_then(Value::as_u64)
                .unwrap_or(1) as usize;
            let id = bench.promote_result(result_id, variant)?;
            writeln!(w, "Added {id} as a source image.")?;
            return Ok(());
        }
        "download_results" => {
            let dir = command.arg_str("path").unwrap_or_default();
            if dir.is_empty() {
                bail!("/download requires a directory");
            }
            for path in bench.download_current(Path::new(dir))? {
                writeln!(w, "wrote {}", path.display())?;
            }
            return Ok(());
        }
        "save_prompt" => {
            if bench.save_prompt() {
                writeln!(w, "Prompt saved.")?;
            } else {
                writeln!(w, "Prompt is empty or already saved.")?;
            }
            return Ok(());
        }
        "list_prompts" => {
            for (idx, prompt) in bench.saved_prompts().entries().iter().enumerate() {
                writeln!(w, "{}. {prompt}", idx + 1)?;
            }
            return Ok(());
        }
        "use_saved_prompt" => {
            let Some(index) = value.parse::<usize>().ok().filter(|index| *index >= 1) else {
                bail!("/use expects a saved prompt number");
            };
            bench.use_saved_prompt(index - 1)?;
        }
        "export_prompts" => {
            let path = command.arg_str("path").unwrap_or_default();
            if path.is_empty() {
                bail!("/export requires a path");
            }
            bench.export_saved_prompts(Path::new(path))?;
            writeln!(w, "Exported to {path}")?;
            return Ok(());
        }
        "list_history" => {
            for result in bench.history().newest_first() {
                writeln!(w, "{}  {}", result.id, result.prompt)?;
            }
            return Ok(());
        }
        "delete_history" => {
            if bench.delete_history(value) {
                writeln!(w, "Deleted {value}")?;
            } else {
                writeln!(w, "No history entry with id {value}.")?;
            }
            return Ok(());
        }
        _ => {
            let name = command.arg_str("command").unwrap_or(command.action.as_str());
            bail!("Unknown command /{name}. Type /help for commands.");
        }
    }
    writeln!(w, "Prompt: {}", bench.prompt().text())?;
    Ok(())
}
