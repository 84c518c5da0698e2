//! Render plan handed to the document renderer.

use crate::catalog::TemplateCatalog;
use crate::{AssignmentResult, Error, Result, SlotSpec};
use std::path::{Path, PathBuf};

/// One slide of the final deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSlide {
    pub assignment: AssignmentResult,

    /// Binary template asset the slide is built from.
    pub asset_path: PathBuf,

    /// Slot schema of the template, in declaration order.
    pub slots: Vec<SlotSpec>,
}

/// Ordered slides ready for document assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderPlan {
    pub slides: Vec<RenderSlide>,
}

impl RenderPlan {
    /// Resolve template assets for each assignment, keeping order.
    pub fn resolve(assignments: &[AssignmentResult], catalog: &TemplateCatalog) -> Result<Self> {
        let slides = assignments
            .iter()
            .map(|assignment| {
                let unknown = || Error::UnknownTemplate {
                    block: assignment.block_index,
                    template_id: assignment.template_id.clone(),
                };
                let descriptor = catalog.get(&assignment.template_id).ok_or_else(unknown)?;
                let asset_path = catalog.asset_path(&assignment.template_id).ok_or_else(unknown)?;
                Ok(RenderSlide {
                    assignment: assignment.clone(),
                    asset_path: asset_path.to_path_buf(),
                    slots: descriptor.slots.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { slides })
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}

/// Assembles the output document from a render plan.
///
/// Implementations report unmatched slot names as [`Error::RenderMapping`] and
/// other failures as [`Error::RenderFailure`].
pub trait Renderer: Send + Sync {
    /// File extension of the produced document, without the dot.
    fn extension(&self) -> &str;

    fn render(&self, plan: &RenderPlan, output: &Path) -> Result<()>;
}
