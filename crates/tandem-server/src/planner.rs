//! Natural-language planning against an OpenAI-compatible chat-completions
//! upstream: the operation catalog goes out as function schemas, the model's
//! tool calls come back as a list of operations to dispatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tandem_core::engine::{catalog, is_known_tool};
use tandem_core::{Shape, ToolCall};
use thiserror::Error;

/// Upper bound on one planning round trip.
pub const PLAN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Shapes listed in the snapshot summary before it is truncated.
const MAX_SUMMARY_SHAPES: usize = 50;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("planning request timed out")]
    Timeout,
    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Client viewport context forwarded with a command so the model can place
/// new shapes where the user is actually looking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub center_x: f64,
    pub center_y: f64,
    pub zoom: f64,
    pub stage_width: f64,
    pub stage_height: f64,
}

pub struct Planner {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl Planner {
    /// Build a planner if `OPENAI_API_KEY` is set and non-empty. Commands
    /// arriving without a planner are answered with a configuration error
    /// before anything goes upstream.
    pub fn from_env(base_url: &str, model: &str) -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())?;
        Some(Self::new(base_url, model, api_key))
    }

    pub fn new(base_url: &str, model: &str, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: endpoint(base_url),
            api_key,
            model: model.to_string(),
        }
    }

    /// Ask the model to translate `command` into catalog operations.
    ///
    /// Returns the validated tool calls in the order the model emitted them;
    /// an empty list means the model chose not to call any tool.
    pub async fn plan(
        &self,
        command: &str,
        shapes: &[Shape],
        viewport: Option<&Viewport>,
    ) -> Result<Vec<ToolCall>, PlannerError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 4096,
            "messages": [
                { "role": "system", "content": system_prompt(shapes, viewport) },
                { "role": "user", "content": command },
            ],
            "tools": catalog_tools(),
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .timeout(PLAN_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("error")?
                        .get("message")?
                        .as_str()
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("status {status}"));
            return Err(PlannerError::Upstream(detail));
        }

        let json: Value = response.json().await.map_err(classify)?;
        parse_tool_calls(&json)
    }
}

fn classify(err: reqwest::Error) -> PlannerError {
    if err.is_timeout() {
        PlannerError::Timeout
    } else {
        PlannerError::Upstream(err.to_string())
    }
}

fn endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// The catalog wrapped in the `{"type": "function", "function": {...}}`
/// envelope chat-completions endpoints expect.
fn catalog_tools() -> Vec<Value> {
    catalog()
        .into_iter()
        .map(|tool| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                },
            })
        })
        .collect()
}

fn system_prompt(shapes: &[Shape], viewport: Option<&Viewport>) -> String {
    let mut prompt = String::from(
        "You are a canvas automation assistant for a shared drawing board. \
         Translate the user's request into tool calls; respond with tool calls \
         only, never prose. Coordinates are canvas units, origin top-left, \
         y increasing downward. Colors are hex strings like #3b82f6.\n\n",
    );
    prompt.push_str(&snapshot_summary(shapes));
    if let Some(view) = viewport {
        prompt.push_str(&format!(
            "\nThe user is looking at the area centered on ({:.0}, {:.0}) at zoom {:.2} \
             on a {:.0}x{:.0} stage. Prefer placing new shapes there.\n",
            view.center_x, view.center_y, view.zoom, view.stage_width, view.stage_height
        ));
    }
    prompt
}

/// Compact per-shape listing for the system prompt, capped so a crowded
/// canvas cannot blow the context window.
fn snapshot_summary(shapes: &[Shape]) -> String {
    if shapes.is_empty() {
        return "The canvas is empty.".to_string();
    }
    let mut out = format!("The canvas has {} shape(s):\n", shapes.len());
    for shape in shapes.iter().take(MAX_SUMMARY_SHAPES) {
        out.push_str(&format!(
            "- {} {} at ({:.0}, {:.0})",
            shape.id,
            shape.type_name(),
            shape.x,
            shape.y
        ));
        let (width, height) = shape.extent();
        if width > 0.0 || height > 0.0 {
            out.push_str(&format!(" size {width:.0}x{height:.0}"));
        }
        if let Some(fill) = shape.fill {
            out.push_str(&format!(" fill {fill}"));
        }
        out.push('\n');
    }
    if shapes.len() > MAX_SUMMARY_SHAPES {
        out.push_str(&format!(
            "... plus {} more\n",
            shapes.len() - MAX_SUMMARY_SHAPES
        ));
    }
    out
}

/// Pull tool calls out of the first choice. Arguments arrive as a JSON
/// string per the chat-completions contract; some compatible servers send
/// an object instead, so both are accepted. Names outside the catalog are
/// dropped rather than dispatched.
fn parse_tool_calls(json: &Value) -> Result<Vec<ToolCall>, PlannerError> {
    let message = json
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| PlannerError::Upstream("no choices in response".to_string()))?;

    let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut calls = Vec::new();
    for tc in tool_calls {
        let Some(function) = tc.get("function") else {
            continue;
        };
        let Some(name) = function.get("name").and_then(Value::as_str) else {
            continue;
        };
        if !is_known_tool(name) {
            tracing::warn!("Model requested a tool outside the catalog: {}", name);
            continue;
        }
        let params = match function.get("arguments") {
            Some(Value::String(raw)) => {
                serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
            }
            Some(Value::Object(map)) => Value::Object(map.clone()),
            _ => serde_json::json!({}),
        };
        calls.push(ToolCall {
            name: name.to_string(),
            params,
        });
    }
    Ok(calls)
}
