//! Shared CLI argument types
//!
//! Reusable argument structs flattened into commands with `#[command(flatten)]`.

mod common;
mod entity;
mod global;

pub use common::OutputFormat;
pub use entity::{CreateArgs, ListArgs, UpdateArgs};
pub use global::GlobalOptions;
