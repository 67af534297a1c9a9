use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const SYSTEM_PROMPT: &str = r#"You convert short descriptions of physical parts into JSON.
Descriptions may be English, Chinese or mixed. All lengths are millimetres.

Reply with a single JSON object and nothing else:
{
  "shape": "box" | "cylinder" | "sphere" | "cone" | "torus" | "tube",
  "dimensions": {"width": n, "height": n, "depth": n, "diameter": n, "radius": n},
  "features": ["hollow", ...],
  "wall_thickness": n,
  "notes": "anything that did not fit"
}

Omit any field you cannot infer. Use "hollow" in features only for parts with an inner
cavity such as tubes and sleeves."#;

pub fn default_system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Dimensions reported by a semantic parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticDimensions {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub depth: Option<f64>,
    pub diameter: Option<f64>,
    pub radius: Option<f64>,
}

/// Structured reading of a description. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticParse {
    pub shape: Option<String>,
    pub dimensions: SemanticDimensions,
    pub features: Vec<String>,
    pub wall_thickness: Option<f64>,
    pub notes: Option<String>,
}

impl SemanticParse {
    /// Record used when the parser is unavailable or fails.
    pub fn fallback() -> Self {
        Self {
            shape: Some("box".to_string()),
            ..Self::default()
        }
    }

    pub fn is_hollow(&self) -> bool {
        self.features
            .iter()
            .any(|feature| feature.trim().eq_ignore_ascii_case("hollow"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SemanticParseError {
    #[error("semantic parser is not configured: {0}")]
    NotConfigured(String),
    #[error("semantic parser request failed: {0}")]
    Transport(String),
    #[error("semantic parser timed out after {0:?}")]
    Timeout(Duration),
    #[error("semantic parser returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("semantic parser response is malformed: {0}")]
    MalformedResponse(String),
}

/// Capability that turns free text into a [`SemanticParse`].
pub trait SemanticParser {
    fn parse(&mut self, text: &str) -> Result<SemanticParse, SemanticParseError>;
}

impl<P: SemanticParser + ?Sized> SemanticParser for Box<P> {
    fn parse(&mut self, text: &str) -> Result<SemanticParse, SemanticParseError> {
        (**self).parse(text)
    }
}

/// Result of a parse that never fails: either the parser's record or the fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticOutcome {
    pub record: SemanticParse,
    pub succeeded: bool,
}

impl SemanticOutcome {
    /// The record, only when it came from a successful parse.
    pub fn successful(&self) -> Option<&SemanticParse> {
        self.succeeded.then_some(&self.record)
    }
}

/// Runs the parser and degrades every failure to [`SemanticParse::fallback`].
pub fn parse_or_fallback<P>(parser: &mut P, text: &str) -> SemanticOutcome
where
    P: SemanticParser + ?Sized,
{
    match parser.parse(text) {
        Ok(record) => {
            debug!(?record, "semantic parse succeeded");
            SemanticOutcome {
                record,
                succeeded: true,
            }
        }
        Err(err) => {
            warn!(error = %err, "semantic parse failed, using fallback record");
            SemanticOutcome {
                record: SemanticParse::fallback(),
                succeeded: false,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticParserConfig {
    /// Full chat-completions URL, e.g. `https://api.openai.com/v1/chat/completions`.
    pub endpoint: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SemanticParserConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// OpenAI-compatible chat-completions client.
pub struct HttpSemanticParser {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpSemanticParser {
    pub fn from_config(config: &SemanticParserConfig) -> Result<Self, SemanticParseError> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|endpoint| !endpoint.trim().is_empty())
            .ok_or_else(|| SemanticParseError::NotConfigured("no endpoint set".to_string()))?;
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SemanticParseError::NotConfigured(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout,
        })
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": text}
            ]
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

impl SemanticParser for HttpSemanticParser {
    fn parse(&mut self, text: &str) -> Result<SemanticParse, SemanticParseError> {
        let mut request = self.client.post(&self.endpoint).json(&self.request_body(text));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|err| {
            if err.is_timeout() {
                SemanticParseError::Timeout(self.timeout)
            } else {
                SemanticParseError::Transport(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SemanticParseError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .map_err(|err| SemanticParseError::MalformedResponse(err.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| SemanticParseError::MalformedResponse("no content".to_string()))?;
        parse_record(&content)
    }
}

/// Parses the model's reply, tolerating a surrounding Markdown code fence.
pub fn parse_record(content: &str) -> Result<SemanticParse, SemanticParseError> {
    let body = strip_code_fence(content);
    if body.is_empty() {
        return Err(SemanticParseError::MalformedResponse(
            "empty content".to_string(),
        ));
    }
    serde_json::from_str(body).map_err(|err| SemanticParseError::MalformedResponse(err.to_string()))
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an info string such as `json` on the opening fence.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
