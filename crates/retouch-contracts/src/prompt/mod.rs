mod clauses;
mod state;
mod vocabulary;

pub use clauses::{apply_update, canonicalize, parse_clauses, ClauseFilter, CLAUSE_SEPARATOR};
pub use state::{derive_view, ControlState, EditMode, PromptState};
pub use vocabulary::{
    compose_backdrop, find_preset, lighting_clause, parse_backdrop, Backdrop, BackdropStyle,
    DEFAULT_BACKDROP_COLOR, LIGHTING_CLAUSES, NEUTRAL_LIGHTING_INDEX, PRESET_CLAUSES,
};
