pub mod document;
pub mod parser;
#[allow(clippy::module_inception)]
pub mod show;

pub use document::{Document, DocumentError, Element};
pub use parser::{ParseError, ShowParser};
pub use show::{DynamicRange, DynamicValues, Show, ShowPayload, ShowSet};
