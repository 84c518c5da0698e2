//! Rewrite and decision services backed by a chat model.

use crate::client::{ChatClient, Completion};
use crate::config::ServiceConfig;
use crate::prompts;
use deck_core::{
    AssignmentRequest, DecisionService, RewriteContext, RewriteService, SelectionRequest,
    ServiceError, ServiceResult,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// One model answering every per-block call.
#[derive(Debug, Clone)]
pub struct LlmServices<C = ChatClient> {
    backend: C,
}

impl LlmServices<ChatClient> {
    pub fn from_config(config: &ServiceConfig) -> deck_core::Result<Self> {
        log::debug!("Using model {} at {}", config.model, config.base_url);
        Ok(Self::new(ChatClient::new(config)?))
    }
}

impl<C: Completion> LlmServices<C> {
    pub fn new(backend: C) -> Self {
        Self { backend }
    }
}

impl<C: Completion> RewriteService for LlmServices<C> {
    fn rewrite(&self, text: &str, context: &RewriteContext) -> ServiceResult<String> {
        let reply = self.backend.complete(&prompts::rewrite(text, context))?;
        Ok(reply.trim().to_string())
    }
}

impl<C: Completion> DecisionService for LlmServices<C> {
    fn choose_template(&self, request: &SelectionRequest<'_>) -> ServiceResult<String> {
        self.backend.complete(&prompts::select_template(request))
    }

    fn assign_content(
        &self,
        request: &AssignmentRequest<'_>,
    ) -> ServiceResult<BTreeMap<String, String>> {
        let reply = self.backend.complete(&prompts::assign_content(request))?;
        parse_slot_values(&reply)
    }
}

/// Parse a reply holding a JSON object of string values.
///
/// The object may be wrapped in a code fence or surrounded by prose.
pub fn parse_slot_values(reply: &str) -> ServiceResult<BTreeMap<String, String>> {
    let body = json_body(reply);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ServiceError::Malformed(format!("expected a JSON object: {}", e)))?;

    let Value::Object(object) = value else {
        return Err(ServiceError::Malformed(format!(
            "expected a JSON object, got {}",
            value
        )));
    };

    object
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(text) => Ok((key, text)),
            other => Err(ServiceError::Malformed(format!(
                "value for '{}' is not a string: {}",
                key, other
            ))),
        })
        .collect()
}

fn json_body(reply: &str) -> &str {
    let trimmed = reply.trim();

    let body = fenced_body(trimmed).unwrap_or(trimmed);

    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    }
}

/// Text between the first opening fence line and the fence that closes it.
fn fenced_body(reply: &str) -> Option<&str> {
    let open = reply.find("```")?;
    // Skip the info string (e.g. `json`) on the opening fence line.
    let (_, rest) = reply[open + 3..].split_once('\n')?;
    let body = match rest.find("```") {
        Some(close) => &rest[..close],
        None => rest,
    };
    Some(body.trim())
}
