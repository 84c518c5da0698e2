//! Boundary to the external text-generation and decision services.
//!
//! The pipeline only depends on these traits. Implementations may call a
//! remote model or apply fixed rules; both must honour the same contract.

use crate::catalog::TemplateSummary;
use crate::{Error, Result, SlotSpec};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single external service call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service could not be reached or the connection failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The response carried no content.
    #[error("empty response")]
    EmptyResponse,
}

/// Result type for service calls.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Where a block sits in the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlidePosition {
    Opening,
    Body,
    Closing,
}

/// Position information passed along with each rewrite request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteContext {
    /// 0-based block index.
    pub index: usize,

    /// Total number of blocks in the document.
    pub total: usize,
}

impl RewriteContext {
    pub fn new(index: usize, total: usize) -> Self {
        Self { index, total }
    }

    /// The first block opens the deck and the last closes it; a single block is an opening.
    pub fn position(&self) -> SlidePosition {
        if self.index == 0 {
            SlidePosition::Opening
        } else if self.index + 1 == self.total {
            SlidePosition::Closing
        } else {
            SlidePosition::Body
        }
    }
}

/// Rewrites raw slide text into presentation-ready copy.
pub trait RewriteService: Send + Sync {
    fn rewrite(&self, text: &str, context: &RewriteContext) -> ServiceResult<String>;
}

/// Input for a template choice.
#[derive(Debug, Clone)]
pub struct SelectionRequest<'a> {
    pub block_index: usize,
    pub total_blocks: usize,
    pub text: &'a str,
    pub templates: &'a [TemplateSummary],
}

/// Input for mapping a block's text onto a template's slots.
#[derive(Debug, Clone)]
pub struct AssignmentRequest<'a> {
    pub block_index: usize,
    pub text: &'a str,
    pub template_id: &'a str,
    pub template_name: &'a str,
    pub slots: &'a [SlotSpec],
}

/// Makes the layout decisions for each block.
pub trait DecisionService: Send + Sync {
    /// Return the id of exactly one template.
    fn choose_template(&self, request: &SelectionRequest<'_>) -> ServiceResult<String>;

    /// Return content for every slot of the requested template, keyed by slot name.
    fn assign_content(
        &self,
        request: &AssignmentRequest<'_>,
    ) -> ServiceResult<BTreeMap<String, String>>;
}

/// Bounded retry for individual service calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total number of attempts per call.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1); // At least one attempt
        self
    }

    /// Set the pause between attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned on exhaustion.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut(u32) -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    log::warn!(
                        "{} failed (attempt {}/{}): {}",
                        what,
                        attempt,
                        self.max_attempts,
                        e
                    );
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient(block: usize) -> Error {
        Error::FormattingService {
            block,
            message: "timeout".to_string(),
        }
    }

    #[test]
    fn test_position() {
        assert_eq!(RewriteContext::new(0, 3).position(), SlidePosition::Opening);
        assert_eq!(RewriteContext::new(1, 3).position(), SlidePosition::Body);
        assert_eq!(RewriteContext::new(2, 3).position(), SlidePosition::Closing);
        assert_eq!(RewriteContext::new(0, 1).position(), SlidePosition::Opening);
    }

    #[test]
    fn test_retry_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new().with_max_attempts(3);
        let mut calls = 0;
        let result = policy.run("call", |attempt| {
            calls += 1;
            if attempt < 3 {
                Err(transient(0))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_exhaustion_returns_last_error() {
        let policy = RetryPolicy::new().with_max_attempts(2);
        let mut calls = 0;
        let result: Result<()> = policy.run("call", |attempt| {
            calls += 1;
            Err(transient(attempt as usize))
        });
        assert!(matches!(result, Err(Error::FormattingService { block: 2, .. })));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_non_retryable_fails_immediately() {
        let policy = RetryPolicy::new();
        let mut calls = 0;
        let result: Result<()> = policy.run("call", |_| {
            calls += 1;
            Err(Error::EmptyDocument)
        });
        assert!(matches!(result, Err(Error::EmptyDocument)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new().with_max_attempts(0).max_attempts(), 1);
    }
}
