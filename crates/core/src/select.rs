//! Template selection through the decision service.

use crate::catalog::{normalize_id, TemplateCatalog, TemplateSummary};
use crate::service::{DecisionService, RetryPolicy, SelectionRequest};
use crate::{Error, FormattedBlock, Result, SelectionResult, Stage};
use rayon::prelude::*;

/// Chooses a catalog template for each formatted block.
pub struct TemplateSelector<'a> {
    service: &'a dyn DecisionService,
    retry: RetryPolicy,
}

impl<'a> TemplateSelector<'a> {
    pub fn new(service: &'a dyn DecisionService, retry: RetryPolicy) -> Self {
        Self { service, retry }
    }

    /// Select a template for one block.
    ///
    /// An id that is not in the catalog is retried and never replaced by a default.
    pub fn select(
        &self,
        block: &FormattedBlock,
        catalog: &TemplateCatalog,
        total_blocks: usize,
    ) -> Result<SelectionResult> {
        let summaries = catalog.summaries();
        self.select_from(block, catalog, &summaries, total_blocks)
    }

    /// Select templates for every block concurrently, returning results in block order.
    pub fn select_all(
        &self,
        blocks: &[FormattedBlock],
        catalog: &TemplateCatalog,
    ) -> Result<Vec<SelectionResult>> {
        let summaries = catalog.summaries();
        blocks
            .par_iter()
            .map(|block| self.select_from(block, catalog, &summaries, blocks.len()))
            .collect()
    }

    fn select_from(
        &self,
        block: &FormattedBlock,
        catalog: &TemplateCatalog,
        summaries: &[TemplateSummary],
        total_blocks: usize,
    ) -> Result<SelectionResult> {
        let request = SelectionRequest {
            block_index: block.index,
            total_blocks,
            text: &block.formatted_text,
            templates: summaries,
        };

        let what = format!("Template selection for block {}", block.index);
        self.retry.run(&what, |attempt| {
            log::debug!("Selecting template for block {} (attempt {})", block.index, attempt);
            let response = self
                .service
                .choose_template(&request)
                .map_err(|e| Error::DecisionService {
                    stage: Stage::TemplateSelection,
                    block: block.index,
                    message: e.to_string(),
                })?;

            let template_id = clean_template_id(&response);
            if !catalog.contains(&template_id) {
                return Err(Error::InvalidTemplateSelection {
                    block: block.index,
                    template_id,
                });
            }

            log::debug!("Block {} -> template '{}'", block.index, template_id);
            Ok(SelectionResult {
                block_index: block.index,
                template_id,
            })
        })
    }
}

/// Strip whitespace and wrapping quotes or backticks from a returned id.
fn clean_template_id(response: &str) -> String {
    let trimmed = response
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();
    normalize_id(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{AssignmentRequest, ServiceResult};
    use crate::{SlotSpec, TemplateDescriptor};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Returns the listed responses in turn, repeating the last one.
    struct Scripted {
        responses: Vec<&'static str>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(responses: Vec<&'static str>) -> Self {
            Self {
                responses,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl DecisionService for Scripted {
        fn choose_template(&self, _request: &SelectionRequest<'_>) -> ServiceResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let idx = n.min(self.responses.len() - 1);
            Ok(self.responses[idx].to_string())
        }

        fn assign_content(
            &self,
            _request: &AssignmentRequest<'_>,
        ) -> ServiceResult<BTreeMap<String, String>> {
            Ok(BTreeMap::new())
        }
    }

    /// Picks "closing" for the last block and "T1" otherwise.
    struct ByPosition;

    impl DecisionService for ByPosition {
        fn choose_template(&self, request: &SelectionRequest<'_>) -> ServiceResult<String> {
            assert_eq!(request.templates.len(), 2);
            if request.block_index + 1 == request.total_blocks {
                Ok("closing".to_string())
            } else {
                Ok("T1".to_string())
            }
        }

        fn assign_content(
            &self,
            _request: &AssignmentRequest<'_>,
        ) -> ServiceResult<BTreeMap<String, String>> {
            Ok(BTreeMap::new())
        }
    }

    fn catalog() -> TemplateCatalog {
        let template = |id: &str| TemplateDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            use_case_examples: Vec::new(),
            slots: vec![SlotSpec::text("title", "heading")],
        };
        TemplateCatalog::from_descriptors(vec![
            (template("T1"), PathBuf::from("T1/template.pptx")),
            (template("closing"), PathBuf::from("closing/template.pptx")),
        ])
        .unwrap()
    }

    fn block(index: usize) -> FormattedBlock {
        FormattedBlock {
            index,
            original_text: "raw".to_string(),
            formatted_text: "formatted".to_string(),
        }
    }

    #[test]
    fn test_select_valid_template() {
        let service = Scripted::new(vec!["  \"T1\"\n"]);
        let selector = TemplateSelector::new(&service, RetryPolicy::new());
        let result = selector.select(&block(3), &catalog(), 5).unwrap();
        assert_eq!(
            result,
            SelectionResult {
                block_index: 3,
                template_id: "T1".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_template_is_retried() {
        let service = Scripted::new(vec!["unknown", "T1"]);
        let selector = TemplateSelector::new(&service, RetryPolicy::new().with_max_attempts(3));
        let result = selector.select(&block(0), &catalog(), 1).unwrap();
        assert_eq!(result.template_id, "T1");
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_template_fails_after_retries() {
        let service = Scripted::new(vec!["unknown"]);
        let selector = TemplateSelector::new(&service, RetryPolicy::new().with_max_attempts(3));
        let err = selector.select(&block(1), &catalog(), 2).unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidTemplateSelection { block: 1, ref template_id } if template_id == "unknown"
        ));
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_select_all_preserves_order() {
        let selector = TemplateSelector::new(&ByPosition, RetryPolicy::new());
        let blocks: Vec<FormattedBlock> = (0..4).map(block).collect();
        let results = selector.select_all(&blocks, &catalog()).unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.template_id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T1", "T1", "closing"]);
        assert_eq!(
            results.iter().map(|r| r.block_index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_clean_template_id() {
        assert_eq!(clean_template_id("`T1`"), "T1");
        assert_eq!(clean_template_id("'two words'\n"), "two words");
    }
}
