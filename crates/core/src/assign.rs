//! Slot assignment through the decision service.

use crate::catalog::TemplateCatalog;
use crate::service::{AssignmentRequest, DecisionService, RetryPolicy};
use crate::{
    AssignmentResult, Error, FormattedBlock, Result, SelectionResult, Stage, TemplateDescriptor,
};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Maps formatted text onto the slots of the selected template.
pub struct ContentAssigner<'a> {
    service: &'a dyn DecisionService,
    retry: RetryPolicy,
}

impl<'a> ContentAssigner<'a> {
    pub fn new(service: &'a dyn DecisionService, retry: RetryPolicy) -> Self {
        Self { service, retry }
    }

    /// Assign content for one block. Incomplete mappings are retried.
    pub fn assign(
        &self,
        block: &FormattedBlock,
        selection: &SelectionResult,
        catalog: &TemplateCatalog,
    ) -> Result<AssignmentResult> {
        let template = catalog
            .get(&selection.template_id)
            .ok_or_else(|| Error::UnknownTemplate {
                block: block.index,
                template_id: selection.template_id.clone(),
            })?;

        let request = AssignmentRequest {
            block_index: block.index,
            text: &block.formatted_text,
            template_id: &template.id,
            template_name: &template.name,
            slots: &template.slots,
        };

        let what = format!("Content assignment for block {}", block.index);
        self.retry.run(&what, |attempt| {
            log::debug!("Assigning content for block {} (attempt {})", block.index, attempt);
            let slot_values = self
                .service
                .assign_content(&request)
                .map_err(|e| Error::DecisionService {
                    stage: Stage::ContentAssignment,
                    block: block.index,
                    message: e.to_string(),
                })?;

            let result = AssignmentResult {
                block_index: block.index,
                template_id: template.id.clone(),
                slot_values,
            };
            validate_assignment(&result, template)?;
            Ok(result)
        })
    }

    /// Assign content for every block concurrently, returning results in block order.
    ///
    /// `selections` must hold one entry per block, in the same order.
    pub fn assign_all(
        &self,
        blocks: &[FormattedBlock],
        selections: &[SelectionResult],
        catalog: &TemplateCatalog,
    ) -> Result<Vec<AssignmentResult>> {
        debug_assert_eq!(blocks.len(), selections.len());

        blocks
            .par_iter()
            .zip(selections.par_iter())
            .map(|(block, selection)| self.assign(block, selection, catalog))
            .collect()
    }
}

/// Check that the slot values cover exactly the template's slots.
///
/// Missing names are reported in declaration order, extra names sorted.
pub fn validate_assignment(
    assignment: &AssignmentResult,
    template: &TemplateDescriptor,
) -> Result<()> {
    let missing: Vec<String> = template
        .slots
        .iter()
        .filter(|slot| !assignment.slot_values.contains_key(&slot.name))
        .map(|slot| slot.name.clone())
        .collect();

    let declared: BTreeSet<&str> = template.slots.iter().map(|s| s.name.as_str()).collect();
    let extra: Vec<String> = assignment
        .slot_values
        .keys()
        .filter(|key| !declared.contains(key.as_str()))
        .cloned()
        .collect();

    if missing.is_empty() && extra.is_empty() {
        return Ok(());
    }

    Err(Error::IncompleteAssignment {
        block: assignment.block_index,
        template_id: template.id.clone(),
        missing,
        extra,
    })
}

/// Re-check a stored render plan against the catalog.
pub fn validate_plan(
    assignments: &[AssignmentResult],
    catalog: &TemplateCatalog,
) -> Result<()> {
    for assignment in assignments {
        let template =
            catalog
                .get(&assignment.template_id)
                .ok_or_else(|| Error::UnknownTemplate {
                    block: assignment.block_index,
                    template_id: assignment.template_id.clone(),
                })?;
        validate_assignment(assignment, template)?;
    }
    Ok(())
}

/// Build a slot mapping from pairs; handy for stub services.
pub fn slot_map<'s>(pairs: impl IntoIterator<Item = (&'s str, &'s str)>) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
