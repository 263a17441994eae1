// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scripted provider that answers from a fixed list of responses.
//!
//! Used by the integration tests, the benches, and `codeweave run --replay`
//! to drive the whole pipeline without a model server.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use crate::error::ProviderError;
use crate::types::{Message, Provider, ProviderResponse, ToolDefinition};

/// What the provider was asked, one entry per `chat` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayCall {
    pub system_prompt: Option<String>,
    pub tool_count: usize,
    pub message_count: usize,
    pub last_text: String,
}

/// A provider that pops one scripted response per call.
pub struct ReplayProvider {
    script: Mutex<VecDeque<ProviderResponse>>,
    calls: Mutex<Vec<ReplayCall>>,
    served: Mutex<usize>,
}

impl ReplayProvider {
    pub fn new(responses: impl IntoIterator<Item = ProviderResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            served: Mutex::new(0),
        }
    }

    /// Load a script from a JSON array of responses.
    pub fn from_json(text: &str) -> Result<Self, ProviderError> {
        let responses: Vec<ProviderResponse> =
            serde_json::from_str(text).map_err(|e| ProviderError::ParseError(e.to_string()))?;
        Ok(Self::new(responses))
    }

    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::NotConfigured(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<ReplayCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Responses not yet served.
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Provider for ReplayProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ReplayCall {
                system_prompt: system_prompt.map(str::to_string),
                tool_count: tools.map_or(0, <[ToolDefinition]>::len),
                message_count: messages.len(),
                last_text: messages.last().map(Message::text_content).unwrap_or_default(),
            });
        }

        let next = self
            .script
            .lock()
            .map_err(|_| ProviderError::api_message("replay script lock poisoned"))?
            .pop_front();

        let mut served = self
            .served
            .lock()
            .map_err(|_| ProviderError::api_message("replay script lock poisoned"))?;
        match next {
            Some(response) => {
                *served += 1;
                Ok(response)
            }
            None => Err(ProviderError::ScriptExhausted(*served)),
        }
    }

    fn name(&self) -> &str {
        "Replay"
    }

    fn model(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_in_order_then_exhausts() {
        let provider = ReplayProvider::new([ProviderResponse::text("one"), ProviderResponse::text("two")]);

        let first = provider.chat(&[Message::user("a")], None, Some("sys")).await.unwrap();
        let second = provider.chat(&[Message::user("b")], None, None).await.unwrap();
        assert_eq!(first.content, "one");
        assert_eq!(second.content, "two");

        let err = provider.chat(&[], None, None).await.unwrap_err();
        assert!(matches!(err, ProviderError::ScriptExhausted(2)));

        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].system_prompt.as_deref(), Some("sys"));
        assert_eq!(calls[1].last_text, "b");
    }

    #[test]
    fn test_from_json() {
        let provider = ReplayProvider::from_json(
            r#"[{"content": "", "tool_calls": [{"id": "1", "name": "list_dir", "input": {}}], "stop_reason": "tool_use"},
                {"content": "Done TASK_COMPLETED"}]"#,
        )
        .unwrap();
        assert_eq!(provider.remaining(), 2);

        assert!(ReplayProvider::from_json("{not json").is_err());
    }
}
