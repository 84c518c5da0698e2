//! Content formatting through the rewrite service.

use crate::service::{RetryPolicy, RewriteContext, RewriteService};
use crate::{Error, FormattedBlock, Result, SlideBlock};
use rayon::prelude::*;

/// Rewrites slide blocks into presentation-ready text.
pub struct ContentFormatter<'a> {
    service: &'a dyn RewriteService,
    retry: RetryPolicy,
}

impl<'a> ContentFormatter<'a> {
    pub fn new(service: &'a dyn RewriteService, retry: RetryPolicy) -> Self {
        Self { service, retry }
    }

    /// Format one block, retrying transient failures.
    ///
    /// Empty output is an error rather than a fallback to the raw text.
    pub fn format(&self, block: &SlideBlock, context: &RewriteContext) -> Result<FormattedBlock> {
        let what = format!("Formatting block {}", block.index);
        self.retry.run(&what, |attempt| {
            log::debug!("Formatting block {} (attempt {})", block.index, attempt);
            let text = self
                .service
                .rewrite(&block.raw_text, context)
                .map_err(|e| Error::FormattingService {
                    block: block.index,
                    message: e.to_string(),
                })?;

            let text = text.trim();
            if text.is_empty() {
                return Err(Error::FormattingService {
                    block: block.index,
                    message: "service returned empty text".to_string(),
                });
            }

            Ok(FormattedBlock {
                index: block.index,
                original_text: block.raw_text.clone(),
                formatted_text: text.to_string(),
            })
        })
    }

    /// Format every block concurrently, returning results in block order.
    pub fn format_all(&self, blocks: &[SlideBlock]) -> Result<Vec<FormattedBlock>> {
        let total = blocks.len();
        blocks
            .par_iter()
            .map(|block| self.format(block, &RewriteContext::new(block.index, total)))
            .collect()
    }
}
