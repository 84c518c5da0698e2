//! Error types for the slide planning pipeline.

use crate::types::Stage;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning or rendering a deck.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stage output could not be serialized or a snapshot could not be read back.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The markdown produced no non-empty slide blocks.
    #[error("Document contains no slide content")]
    EmptyDocument,

    /// A template directory is malformed.
    #[error("Invalid template '{template}': {reason}")]
    TemplateSchema { template: String, reason: String },

    /// Two template directories resolved to the same id.
    #[error("Duplicate template id: {0}")]
    DuplicateTemplateId(String),

    /// The rewrite service failed or returned empty text.
    #[error("Formatting failed for block {block}: {message}")]
    FormattingService { block: usize, message: String },

    /// The decision service failed while selecting or assigning.
    #[error("Decision service failed during {stage} for block {block}: {message}")]
    DecisionService {
        stage: Stage,
        block: usize,
        message: String,
    },

    /// The decision service chose a template that is not in the catalog.
    #[error("Block {block}: selected template '{template_id}' does not exist")]
    InvalidTemplateSelection { block: usize, template_id: String },

    /// Slot values do not exactly cover the template's slots.
    #[error(
        "Block {block}: incomplete assignment for template '{template_id}' (missing: [{}], extra: [{}])",
        missing.join(", "),
        extra.join(", ")
    )]
    IncompleteAssignment {
        block: usize,
        template_id: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// A render plan or snapshot refers to a template the catalog does not hold.
    #[error("Block {block}: unknown template '{template_id}'")]
    UnknownTemplate { block: usize, template_id: String },

    /// A slot has no placeholder with the same name in the template asset.
    #[error("Block {block}: template '{template_id}' has no placeholder named '{slot}'")]
    RenderMapping {
        block: usize,
        template_id: String,
        slot: String,
    },

    /// The renderer failed to produce the output file.
    #[error("Rendering failed: {0}")]
    RenderFailure(String),

    /// A snapshot for this stage and run already exists.
    #[error("Snapshot already exists: {0}")]
    SnapshotExists(String),

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable identifier of the error kind, used in user-facing reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "IoError",
            Error::Serialization(_) => "SerializationError",
            Error::EmptyDocument => "EmptyDocumentError",
            Error::TemplateSchema { .. } => "TemplateSchemaError",
            Error::DuplicateTemplateId(_) => "DuplicateTemplateIdError",
            Error::FormattingService { .. } => "FormattingServiceError",
            Error::DecisionService { .. } => "DecisionServiceError",
            Error::InvalidTemplateSelection { .. } => "InvalidTemplateSelectionError",
            Error::IncompleteAssignment { .. } => "IncompleteAssignmentError",
            Error::UnknownTemplate { .. } => "UnknownTemplateError",
            Error::RenderMapping { .. } => "RenderMappingError",
            Error::RenderFailure(_) => "RenderFailure",
            Error::SnapshotExists(_) => "SnapshotExistsError",
            Error::Config(_) => "ConfigError",
        }
    }

    /// The block index this error concerns, if any.
    pub fn block_index(&self) -> Option<usize> {
        match self {
            Error::FormattingService { block, .. }
            | Error::DecisionService { block, .. }
            | Error::InvalidTemplateSelection { block, .. }
            | Error::IncompleteAssignment { block, .. }
            | Error::UnknownTemplate { block, .. }
            | Error::RenderMapping { block, .. } => Some(*block),
            _ => None,
        }
    }

    /// Whether a single service call that produced this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::FormattingService { .. }
                | Error::DecisionService { .. }
                | Error::InvalidTemplateSelection { .. }
                | Error::IncompleteAssignment { .. }
        )
    }
}
