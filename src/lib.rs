//! Kombi - content-pipeline orchestrator
//!
//! Classifies files into typed elements, runs configured task trees over
//! them and dispatches the work locally or to a render farm.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod holder;
pub mod input;
pub mod process;
pub mod reporter;
pub mod task;
pub mod tools;
pub mod wrapper;

pub use error::{Error, ErrorCategory, Result};
pub use holder::{Status, TaskHolder};
pub use task::{Task, TaskKind};
