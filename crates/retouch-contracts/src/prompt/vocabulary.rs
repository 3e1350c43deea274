use std::fmt;

/// Defect-removal presets, in the order they always appear at the head of a
/// canonical prompt.
pub const PRESET_CLAUSES: [&str; 7] = [
    "remove scratches and dust",
    "repair tears and creases",
    "fix faded areas",
    "restore color",
    "increase contrast",
    "sharpen details",
    "reduce noise",
];

pub const NEUTRAL_LIGHTING_INDEX: usize = 10;

/// Lighting slider slots. Slot 10 is neutral and never becomes a clause.
pub const LIGHTING_CLAUSES: [&str; 21] = [
    "with pitch-black night lighting",
    "with very dark low-key lighting",
    "with dark moody lighting",
    "with dim evening lighting",
    "with subdued shadowy lighting",
    "with soft low lighting",
    "with slightly dimmed lighting",
    "with gently muted lighting",
    "with a touch of shadow",
    "with barely darkened lighting",
    "",
    "with barely brightened lighting",
    "with a touch of extra light",
    "with gently lifted lighting",
    "with slightly bright lighting",
    "with soft bright lighting",
    "with bright daylight lighting",
    "with vivid sunny lighting",
    "with very bright high-key lighting",
    "with brilliant studio lighting",
    "with dazzling overexposed lighting",
];

pub const DEFAULT_BACKDROP_COLOR: &str = "#ffffff";

const BACKDROP_PREFIX: &str = "with a ";
const BACKDROP_SUFFIX: &str = " backdrop";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackdropStyle {
    None,
    Plain,
    Gradient,
}

impl BackdropStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            BackdropStyle::None => "none",
            BackdropStyle::Plain => "plain",
            BackdropStyle::Gradient => "gradient",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => Some(BackdropStyle::None),
            "plain" => Some(BackdropStyle::Plain),
            "gradient" => Some(BackdropStyle::Gradient),
            _ => None,
        }
    }
}

impl fmt::Display for BackdropStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backdrop {
    pub style: BackdropStyle,
    pub color: String,
}

impl Default for Backdrop {
    fn default() -> Self {
        Self {
            style: BackdropStyle::None,
            color: DEFAULT_BACKDROP_COLOR.to_string(),
        }
    }
}

pub fn preset_position(clause: &str) -> Option<usize> {
    PRESET_CLAUSES.iter().position(|preset| *preset == clause)
}

/// Resolves a preset by exact clause text or by 1-based position.
pub fn find_preset(raw: &str) -> Option<&'static str> {
    let trimmed = raw.trim();
    if let Ok(position) = trimmed.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|idx| PRESET_CLAUSES.get(idx))
            .copied();
    }
    let lowered = trimmed.to_ascii_lowercase();
    PRESET_CLAUSES
        .iter()
        .find(|preset| **preset == lowered)
        .copied()
}

pub fn lighting_clause(index: usize) -> Option<&'static str> {
    LIGHTING_CLAUSES.get(index).copied()
}

pub fn lighting_index(clause: &str) -> Option<usize> {
    if clause.is_empty() {
        return None;
    }
    LIGHTING_CLAUSES.iter().position(|entry| *entry == clause)
}

/// Matches `with a {plain|gradient} {color} backdrop`.
pub fn parse_backdrop(clause: &str) -> Option<Backdrop> {
    let body = clause
        .strip_prefix(BACKDROP_PREFIX)?
        .strip_suffix(BACKDROP_SUFFIX)?;
    let (style, color) = body.split_once(' ')?;
    let style = match style {
        "plain" => BackdropStyle::Plain,
        "gradient" => BackdropStyle::Gradient,
        _ => return None,
    };
    if color.is_empty() || color.chars().any(char::is_whitespace) {
        return None;
    }
    Some(Backdrop {
        style,
        color: color.to_string(),
    })
}

pub fn is_backdrop(clause: &str) -> bool {
    parse_backdrop(clause).is_some()
}

pub fn compose_backdrop(style: BackdropStyle, color: &str) -> Option<String> {
    if style == BackdropStyle::None {
        return None;
    }
    let color = color.trim();
    if color.is_empty() || color.chars().any(char::is_whitespace) {
        return None;
    }
    Some(format!("{BACKDROP_PREFIX}{style} {color}{BACKDROP_SUFFIX}"))
}
