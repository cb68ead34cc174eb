//! Streaming path-scoped XML extraction
//!
//! Only the subset of XML found in MediaWiki dumps is understood: one
//! optional leading declaration, start tags (attributes are skipped), end
//! tags, empty-element tags, comments and character data with entity
//! references. Text outside the root element is ignored.
//!
//! [`Iterate`] reports every element as it closes, together with its slash
//! joined path and direct text. [`Select`] builds on it and assembles one
//! [`Record`] per occurrence of a target element.

mod iterate;
mod select;

pub use iterate::{ClosedElement, Iterate};
pub use select::{Record, Select};

pub(crate) const NAME: &str = "xml";
