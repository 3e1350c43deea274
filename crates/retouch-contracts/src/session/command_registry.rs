#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is one argument, taken verbatim.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "preset",
        action: "toggle_preset",
    },
    CommandSpec {
        command: "backdrop",
        action: "set_backdrop_style",
    },
    CommandSpec {
        command: "color",
        action: "set_backdrop_color",
    },
    CommandSpec {
        command: "light",
        action: "set_lighting",
    },
    CommandSpec {
        command: "raw",
        action: "set_prompt",
    },
    CommandSpec {
        command: "use",
        action: "use_saved_prompt",
    },
    CommandSpec {
        command: "delete",
        action: "delete_history",
    },
    CommandSpec {
        command: "remove",
        action: "remove_source",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "ref",
        action: "set_reference",
    },
    CommandSpec {
        command: "export",
        action: "export_prompts",
    },
    CommandSpec {
        command: "download",
        action: "download_results",
    },
];

pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "add",
    action: "add_sources",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "all",
        action: "toggle_all_presets",
    },
    CommandSpec {
        command: "clear_ref",
        action: "clear_reference",
    },
    CommandSpec {
        command: "restore",
        action: "restore",
    },
    CommandSpec {
        command: "save",
        action: "save_prompt",
    },
    CommandSpec {
        command: "prompts",
        action: "list_prompts",
    },
    CommandSpec {
        command: "history",
        action: "list_history",
    },
    CommandSpec {
        command: "sources",
        action: "list_sources",
    },
    CommandSpec {
        command: "view",
        action: "show_view",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
];

pub(crate) const PROMOTE_COMMAND: CommandSpec = CommandSpec {
    command: "promote",
    action: "promote_result",
};

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/preset",
    "/all",
    "/backdrop",
    "/color",
    "/light",
    "/raw",
    "/add",
    "/ref",
    "/clear_ref",
    "/remove",
    "/sources",
    "/restore",
    "/promote",
    "/download",
    "/save",
    "/use",
    "/prompts",
    "/export",
    "/history",
    "/delete",
    "/view",
    "/help",
];
