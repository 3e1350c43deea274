mod backend;
mod local;

pub use backend::{JsonFileBackend, KeyValueBackend, MemoryBackend};
pub use local::LocalStore;
