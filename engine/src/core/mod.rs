pub mod cli;
pub mod config;
pub mod constants;

pub use cli::{Cli, Commands};
pub use config::{ConfigOverrides, Dialect, EngineConfig, UnknownFieldPolicy};
