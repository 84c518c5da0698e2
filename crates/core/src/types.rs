//! Domain types flowing through the slide planning pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One markdown section between delimiters, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideBlock {
    /// 0-based position in the document.
    pub index: usize,

    /// Section text with surrounding blank lines removed.
    pub raw_text: String,
}

impl SlideBlock {
    /// Create a new slide block.
    pub fn new(index: usize, raw_text: impl Into<String>) -> Self {
        Self {
            index,
            raw_text: raw_text.into(),
        }
    }
}

/// A slide block after rewriting by the text-generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedBlock {
    pub index: usize,

    /// Copy of the source block's text, kept for traceability.
    pub original_text: String,

    /// Presentation-ready text.
    pub formatted_text: String,
}

/// Kind of content a slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    Text,
    Image,
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Text => f.write_str("text"),
            SlotType::Image => f.write_str("image"),
        }
    }
}

/// A named placeholder within a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub slot_type: SlotType,

    /// Human-readable hint describing what belongs in the slot.
    pub role: String,
}

impl SlotSpec {
    /// Create a text slot.
    pub fn text(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: SlotType::Text,
            role: role.into(),
        }
    }

    /// Create an image slot.
    pub fn image(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: SlotType::Image,
            role: role.into(),
        }
    }
}

/// Schema for a visual slide layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    /// Unique id, derived from the template directory name.
    pub id: String,
    pub name: String,
    pub description: String,
    pub use_case_examples: Vec<String>,

    /// Named slots in declaration order.
    pub slots: Vec<SlotSpec>,
}

impl TemplateDescriptor {
    /// Slot names in declaration order.
    pub fn slot_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }

    /// Look up a slot by name.
    pub fn slot(&self, name: &str) -> Option<&SlotSpec> {
        self.slots.iter().find(|s| s.name == name)
    }
}

/// The template chosen for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub block_index: usize,
    pub template_id: String,
}

/// The final slot contents for one block; one entry of the render plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub block_index: usize,
    pub template_id: String,

    /// Slot name to content. Keys match the template's slots exactly.
    pub slot_values: BTreeMap<String, String>,
}

/// Stages whose outputs are persisted as snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Parsed,
    Formatted,
    TemplateSelection,
    ContentAssignment,
}

impl Stage {
    /// All persisted stages, in pipeline order.
    pub const ALL: [Stage; 4] = [
        Stage::Parsed,
        Stage::Formatted,
        Stage::TemplateSelection,
        Stage::ContentAssignment,
    ];

    /// 1-based ordinal used as the snapshot filename prefix.
    pub fn ordinal(self) -> u8 {
        match self {
            Stage::Parsed => 1,
            Stage::Formatted => 2,
            Stage::TemplateSelection => 3,
            Stage::ContentAssignment => 4,
        }
    }

    /// Stage key used in snapshot filenames.
    pub fn key(self) -> &'static str {
        match self {
            Stage::Parsed => "parsed_slides",
            Stage::Formatted => "formatted_slides",
            Stage::TemplateSelection => "template_selection",
            Stage::ContentAssignment => "content_assignment",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Run key shared by every snapshot of one pipeline run (`YYYYMMDDHHMMSS`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunTimestamp(String);

impl RunTimestamp {
    /// Timestamp for the current local time.
    pub fn now() -> Self {
        Self(chrono::Local::now().format("%Y%m%d%H%M%S").to_string())
    }

    /// Parse a `YYYYMMDDHHMMSS` string.
    pub fn parse(value: &str) -> Option<Self> {
        chrono::NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S")
            .ok()
            .map(|_| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
