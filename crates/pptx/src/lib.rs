//! PPTX (Office Open XML) renderer for slide decks.
//!
//! Templates are .pptx files whose first slide carries text shapes named
//! after the template's slots. Rendering fills those shapes and assembles
//! the filled slides into a single presentation.

pub mod error;
pub mod fill;
pub mod parser;
pub mod writer;

#[cfg(test)]
mod fixture;

pub use error::{PptxError, Result};
pub use parser::TemplateAsset;
pub use writer::PptxRenderer;
