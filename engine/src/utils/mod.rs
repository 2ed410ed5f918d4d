//! Shared helpers

pub mod sql;
pub mod string;
pub mod time;
