use anyhow::bail;

use super::clauses::{apply_update, parse_clauses, ClauseFilter};
use super::vocabulary::{
    compose_backdrop, lighting_clause, lighting_index, parse_backdrop, Backdrop, BackdropStyle,
    LIGHTING_CLAUSES, NEUTRAL_LIGHTING_INDEX, PRESET_CLAUSES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    /// The prompt was last written by a structured control and is canonical.
    #[default]
    Structured,
    /// The prompt was typed or pasted verbatim and may not be canonical.
    RawOverride,
}

/// Structured control panel derived from a prompt string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlState {
    pub presets: [bool; PRESET_CLAUSES.len()],
    pub all_selected: bool,
    pub backdrop: Backdrop,
    pub lighting: usize,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            presets: [false; PRESET_CLAUSES.len()],
            all_selected: false,
            backdrop: Backdrop::default(),
            lighting: NEUTRAL_LIGHTING_INDEX,
        }
    }
}

impl ControlState {
    pub fn is_selected(&self, preset: &str) -> bool {
        PRESET_CLAUSES
            .iter()
            .position(|entry| *entry == preset)
            .map(|idx| self.presets[idx])
            .unwrap_or(false)
    }

    pub fn selected_presets(&self) -> Vec<&'static str> {
        PRESET_CLAUSES
            .iter()
            .zip(self.presets.iter())
            .filter(|(_, selected)| **selected)
            .map(|(preset, _)| *preset)
            .collect()
    }
}

pub fn derive_view(prompt: &str) -> ControlState {
    let clauses = parse_clauses(prompt);
    let mut presets = [false; PRESET_CLAUSES.len()];
    for (idx, preset) in PRESET_CLAUSES.iter().enumerate() {
        presets[idx] = clauses.contains(*preset);
    }
    let backdrop = clauses
        .iter()
        .find_map(|clause| parse_backdrop(clause))
        .unwrap_or_default();
    let lighting = clauses
        .iter()
        .find_map(|clause| lighting_index(clause))
        .unwrap_or(NEUTRAL_LIGHTING_INDEX);

    ControlState {
        all_selected: presets.iter().all(|selected| *selected),
        presets,
        backdrop,
        lighting,
    }
}

/// The restoration instruction. The prompt string is the single source of
/// truth; every mutator returns a new state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PromptState {
    text: String,
    mode: EditMode,
}

impl PromptState {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: EditMode::Structured,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn view(&self) -> ControlState {
        derive_view(&self.text)
    }

    pub fn apply_update<S: AsRef<str>>(&self, add: &[S], remove: &[ClauseFilter]) -> Self {
        Self {
            text: apply_update(&self.text, add, remove),
            mode: EditMode::Structured,
        }
    }

    /// Replaces the text verbatim, as a text box would.
    pub fn edit_raw(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: EditMode::RawOverride,
        }
    }

    pub fn toggle_preset(&self, preset: &str) -> Self {
        if parse_clauses(&self.text).contains(preset) {
            self.apply_update::<&str>(&[], &[ClauseFilter::exact(preset)])
        } else {
            self.apply_update(&[preset], &[])
        }
    }

    pub fn toggle_all_presets(&self) -> Self {
        if self.view().all_selected {
            let remove = PRESET_CLAUSES
                .iter()
                .map(|preset| ClauseFilter::exact(*preset))
                .collect::<Vec<ClauseFilter>>();
            self.apply_update::<&str>(&[], &remove)
        } else {
            self.apply_update(&PRESET_CLAUSES, &[])
        }
    }

    pub fn set_backdrop_style(&self, style: BackdropStyle) -> Self {
        // Read the color before the old clause is removed.
        let color = self.view().backdrop.color;
        let add = compose_backdrop(style, &color).into_iter().collect::<Vec<String>>();
        self.apply_update(&add, &[ClauseFilter::Backdrop])
    }

    pub fn set_backdrop_color(&self, color: &str) -> Self {
        let style = self.view().backdrop.style;
        let Some(clause) = compose_backdrop(style, color) else {
            return self.clone();
        };
        self.apply_update(&[clause], &[ClauseFilter::Backdrop])
    }

    pub fn set_lighting(&self, index: usize) -> anyhow::Result<Self> {
        let Some(clause) = lighting_clause(index) else {
            bail!(
                "Lighting index {index} out of range (0-{}).",
                LIGHTING_CLAUSES.len() - 1
            );
        };
        let remove = LIGHTING_CLAUSES
            .iter()
            .filter(|entry| !entry.is_empty())
            .map(|entry| ClauseFilter::exact(*entry))
            .collect::<Vec<ClauseFilter>>();
        let add = if clause.is_empty() { vec![] } else { vec![clause] };
        Ok(self.apply_update(&add, &remove))
    }
}
