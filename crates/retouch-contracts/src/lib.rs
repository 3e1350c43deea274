pub mod events;
pub mod library;
pub mod prompt;
pub mod session;
pub mod store;
