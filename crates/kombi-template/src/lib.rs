//! # kombi-template
//!
//! The pattern language used for computed paths and template options.
//!
//! A template is a string evaluated against a [`Scope`]:
//!
//! - `{name}` substitutes a scope variable.
//! - `<name>` substitutes a token bound earlier by `as <name>`.
//! - `(proc arg1 arg2 ...)` calls a registered procedure; arguments are
//!   themselves evaluated, so calls nest.
//! - `(a + b)`, `-`, `*`, `/` evaluate arithmetic.
//! - `... as <name>)` binds the result of a call to a token and also
//!   substitutes it in place.
//! - `'...'` protects a literal run (parentheses included) from tokenising.
//! - A path level prefixed by `!` must exist once evaluated.
//! - A leading `!kt ` marker is accepted and stripped.
//!
//! ## Example
//!
//! ```
//! use kombi_template::{Scope, Template};
//!
//! let mut scope = Scope::new();
//! scope.set_var("x", 5);
//! scope.set_var("y", 2);
//!
//! let template = Template::new("!kt /({x} + 10 as <r>)/(<r> - 10)/(4.0 / {y})")?;
//! assert_eq!(template.value(&scope)?, "/15/5/2");
//! # Ok::<(), kombi_template::TemplateError>(())
//! ```

mod error;
mod parser;
pub mod procedures;
mod scope;
mod template;

pub use error::{Result, TemplateError};
pub use procedures::{procedures, Procedure, ProcedureRegistry};
pub use scope::Scope;
pub use template::{format_number, Template};
