//! Error types for PPTX template handling.

use thiserror::Error;

/// Result type alias for PPTX operations.
pub type Result<T> = std::result::Result<T, PptxError>;

/// Errors raised while reading templates or writing the deck.
#[derive(Error, Debug)]
pub enum PptxError {
    /// Failed to read a template or write the output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(String),

    /// XML parsing or writing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// A part the package should contain is absent.
    #[error("Missing part '{0}'")]
    MissingPart(String),

    /// The template presentation has no slides.
    #[error("Template {0} contains no slides")]
    NoSlides(String),

    /// The render plan has no slides.
    #[error("Nothing to render")]
    EmptyPlan,

    /// A slot has no placeholder shape with the same text.
    #[error("Template '{template_id}' has no placeholder named '{slot}' (block {block})")]
    UnmatchedSlot {
        block: usize,
        template_id: String,
        slot: String,
    },
}

impl From<zip::result::ZipError> for PptxError {
    fn from(e: zip::result::ZipError) -> Self {
        PptxError::Zip(e.to_string())
    }
}

impl From<quick_xml::Error> for PptxError {
    fn from(e: quick_xml::Error) -> Self {
        PptxError::Xml(e.to_string())
    }
}

impl From<PptxError> for deck_core::Error {
    fn from(e: PptxError) -> Self {
        match e {
            PptxError::UnmatchedSlot {
                block,
                template_id,
                slot,
            } => deck_core::Error::RenderMapping {
                block,
                template_id,
                slot,
            },
            other => deck_core::Error::RenderFailure(other.to_string()),
        }
    }
}
