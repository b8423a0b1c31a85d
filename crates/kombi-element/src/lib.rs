//! # kombi-element
//!
//! Typed wrappers around discovered files.
//!
//! This crate provides:
//!
//! - **[`Element`]** -- kind, path, variables, context variables, tags and a
//!   weak parent link, with a lossless JSON form.
//! - **[`KindRegistry`]** -- the ordered table of [`ElementKind`]s used to
//!   classify inputs, plus the process-wide instance returned by [`kinds`].
//! - **Built-in kinds** ([`kinds`](mod@kinds)) -- files, directories, records
//!   and the image, video, LUT, scene, archive and text families.
//! - **[`VarExtractor`]** -- variables from structured base names.
//! - **Sequences and grouping** -- frame detection ([`sequence`]) and
//!   partitioning by group tag ([`group`]).
//! - **[`Glob`]** -- lazy enumeration below a directory element.
//!
//! ## Example
//!
//! ```
//! use kombi_element::{group, Element};
//!
//! let frames: Vec<Element> = (1..=3)
//!     .map(|f| Element::create(format!("/plates/bg.{f:04}.exr").as_str(), None))
//!     .collect::<Result<_, _>>()?;
//! let groups = group(frames);
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0][0].tag("group")?.to_string(), "bg.####.exr");
//! # Ok::<(), kombi_element::ElementError>(())
//! ```

mod element;
mod error;
pub mod extractor;
mod glob;
pub mod group;
pub mod kinds;
mod registry;
pub mod sequence;

pub use element::{Element, ElementInput};
pub use error::{ElementError, Result};
pub use extractor::{ExtractorPattern, VarExtractor, VarExtractorError};
pub use glob::{glob, is_allowed_name, Glob};
pub use group::{group, group_by_tag, sort_group};
pub use registry::{kinds, ElementKind, KindRegistry};
