//! Kombi-Common: Shared types and utilities.
//!
//! This crate provides the pieces every other kombi crate agrees on:
//!
//! - **Values**: the small scalar model ([`Value`]) used for element variables,
//!   holder variables and template scopes, plus the ordered [`VarMap`].
//! - **Paths**: [`FsPath`], a uniform surface over a filesystem location
//!   (base name, parent, existence, size, children).
//! - **Error Handling**: common error type and result alias.
//!
//! # Examples
//!
//! ```
//! use kombi_common::{Value, VarMap};
//!
//! let mut vars = VarMap::new();
//! vars.insert("frame".to_string(), Value::from(12));
//! vars.insert("name".to_string(), Value::from("testSeq"));
//!
//! assert_eq!(vars["frame"].to_string(), "12");
//! assert_eq!(vars["name"].as_str(), Some("testSeq"));
//! ```

pub mod error;
pub mod paths;
pub mod value;

pub use error::{Error, Result};
pub use paths::FsPath;
pub use value::{Value, VarMap};
