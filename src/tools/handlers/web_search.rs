// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Web search tool handler.
//!
//! Queries an instant-answer style JSON endpoint (DuckDuckGo by default) and
//! flattens the reply into `{title, url, snippet}` results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::error::ToolError;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, ToolContext};
use crate::types::{InputSchema, ToolDefinition};

/// Handler for the `web_search` tool.
pub struct WebSearchHandler;

#[derive(Debug, Deserialize)]
struct WebSearchArgs {
    query: String,
    #[serde(default)]
    max_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// Either a single topic or a named group of topics.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Topic {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
    Other(serde::de::IgnoredAny),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

fn collect_topics(topics: Vec<RelatedTopic>, out: &mut Vec<SearchResult>) {
    for topic in topics {
        match topic {
            RelatedTopic::Topic { text, first_url } if !text.is_empty() => {
                // Topic text reads "Title - description"
                let title = text.split(" - ").next().unwrap_or(&text).to_string();
                out.push(SearchResult {
                    title,
                    url: first_url,
                    snippet: text,
                });
            }
            RelatedTopic::Topic { .. } | RelatedTopic::Other(_) => {}
            RelatedTopic::Group { topics } => collect_topics(topics, out),
        }
    }
}

fn flatten(answer: InstantAnswer, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if !answer.abstract_text.is_empty() {
        results.push(SearchResult {
            title: if answer.heading.is_empty() {
                answer.abstract_text.chars().take(60).collect()
            } else {
                answer.heading
            },
            url: answer.abstract_url,
            snippet: answer.abstract_text,
        });
    }

    collect_topics(answer.related_topics, &mut results);
    results.truncate(max_results);
    results
}

#[async_trait]
impl ToolHandler for WebSearchHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("web_search", "Search the web for documentation or reference material")
            .with_schema(
                InputSchema::new()
                    .with_property("query", json!({
                        "type": "string",
                        "description": "Search query"
                    }))
                    .with_property("max_results", json!({
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 20,
                        "description": "Maximum number of results"
                    }))
                    .with_required(vec!["query".to_string()]),
            )
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, ctx, input), fields(query, results)))]
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: WebSearchArgs = parse_arguments(&input)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }

        #[cfg(feature = "telemetry")]
        tracing::Span::current().record("query", query);

        let settings = &ctx.settings.web_search;
        let max_results = args.max_results.unwrap_or(settings.max_results).max(1);

        let response = ctx
            .settings
            .http
            .get(&settings.endpoint)
            .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("skip_disambig", "1")])
            .send()
            .await
            .map_err(|e| ToolError::NetworkError(format!("Search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::NetworkError(format!("Search endpoint returned {status}")));
        }

        // Some endpoints answer with an empty body for unknown queries
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::NetworkError(format!("Failed to read search response: {e}")))?;
        let answer: InstantAnswer = if body.trim().is_empty() {
            InstantAnswer::default()
        } else {
            serde_json::from_str(&body)
                .map_err(|e| ToolError::NetworkError(format!("Unexpected search response: {e}")))?
        };

        let results = flatten(answer, max_results);

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("results", results.len());
            debug!(query, results = results.len(), "Web search complete");
        }

        Ok(json!({
            "query": query,
            "count": results.len(),
            "results": results,
        }))
    }
}
