//! Core domain types, template catalog, and the markdown-to-slide planning
//! pipeline.
//!
//! Markdown is segmented into slide blocks, rewritten, matched to a template,
//! and mapped onto template slots. Every stage output is persisted before the
//! next stage runs, and the final render plan is handed to a [`Renderer`].

pub mod assign;
pub mod catalog;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod render;
pub mod segment;
pub mod select;
pub mod service;
pub mod store;
pub mod types;

pub use assign::{validate_assignment, ContentAssigner};
pub use catalog::{TemplateCatalog, TemplateSummary};
pub use error::{Error, Result};
pub use format::ContentFormatter;
pub use pipeline::{Pipeline, PipelineState, RunFailure, RunReport};
pub use render::{RenderPlan, RenderSlide, Renderer};
pub use segment::segment;
pub use select::TemplateSelector;
pub use service::{
    AssignmentRequest, DecisionService, RetryPolicy, RewriteContext, RewriteService,
    SelectionRequest, ServiceError, ServiceResult, SlidePosition,
};
pub use store::IntermediateStore;
pub use types::{
    AssignmentResult, FormattedBlock, RunTimestamp, SelectionResult, SlideBlock, SlotSpec,
    SlotType, Stage, TemplateDescriptor,
};
