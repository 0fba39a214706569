pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod log_sanitize;
pub mod package;
pub mod patch;
pub mod phase;
pub mod recipe;
pub mod registry;
pub mod revdep;
pub mod session;
pub mod source;
pub mod strip;
pub mod sync;
pub mod tools;
pub mod ui;
pub mod workspace;

pub use error::{Error, Result};
