//! Payloads exchanged with the hosted LLM that turns free-text exercise
//! descriptions into structured entries.
//!
//! The HTTP client itself lives in the CLI crate; everything here is plain
//! data plus validation of whatever text comes back.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::Intensity;

pub const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent";
pub const CLAUDE_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const CLAUDE_MODEL: &str = "claude-3-haiku-20240307";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const TEMPERATURE: f32 = 0.1;
pub const MAX_OUTPUT_TOKENS: u32 = 500;

/// Used when the description names no duration.
pub const DEFAULT_DURATION_MINUTES: u32 = 30;

/// Longest duration accepted from a model reply.
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// Free text in, structured exercise out.
///
/// The CLI implements this over reqwest; tests use canned replies.
#[async_trait]
pub trait ExerciseParser: Send + Sync {
    async fn parse_exercise(&self, input: &str) -> Result<ParsedExercise>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiProviderKind {
    #[default]
    Gemini,
    Claude,
}

impl AiProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AiProviderKind::Gemini => "gemini",
            AiProviderKind::Claude => "claude",
        }
    }
}

impl fmt::Display for AiProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider selection and credentials.
#[derive(Clone, Default)]
pub struct AiSettings {
    pub provider: AiProviderKind,
    pub gemini_api_key: Option<String>,
    pub claude_api_key: Option<String>,
}

// Keys stay out of logs.
impl fmt::Debug for AiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiSettings")
            .field("provider", &self.provider)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "***"))
            .field("claude_api_key", &self.claude_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Which backend to call and with which key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveProvider {
    pub kind: AiProviderKind,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiStatus {
    pub provider: String,
    pub configured: bool,
}

impl AiSettings {
    /// Build settings from `AI_PROVIDER`, `GEMINI_API_KEY` and `CLAUDE_API_KEY`
    /// as returned by `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let provider = match non_empty("AI_PROVIDER") {
            Some(raw) if raw.trim().eq_ignore_ascii_case("claude") => AiProviderKind::Claude,
            Some(raw) if raw.trim().eq_ignore_ascii_case("gemini") => AiProviderKind::Gemini,
            Some(raw) => {
                tracing::warn!(provider = %raw, "unknown AI_PROVIDER, falling back to gemini");
                AiProviderKind::Gemini
            }
            None => AiProviderKind::Gemini,
        };

        Self {
            provider,
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            claude_api_key: non_empty("CLAUDE_API_KEY"),
        }
    }

    /// Claude only when selected and keyed; otherwise Gemini when keyed.
    #[must_use]
    pub fn active(&self) -> Option<ActiveProvider> {
        if self.provider == AiProviderKind::Claude {
            if let Some(key) = &self.claude_api_key {
                return Some(ActiveProvider {
                    kind: AiProviderKind::Claude,
                    api_key: key.clone(),
                });
            }
        }
        self.gemini_api_key.as_ref().map(|key| ActiveProvider {
            kind: AiProviderKind::Gemini,
            api_key: key.clone(),
        })
    }

    /// Health view: the selected provider and whether its key is present.
    #[must_use]
    pub fn status(&self) -> AiStatus {
        let configured = match self.provider {
            AiProviderKind::Gemini => self.gemini_api_key.is_some(),
            AiProviderKind::Claude => self.claude_api_key.is_some(),
        };
        AiStatus {
            provider: self.provider.as_str().to_string(),
            configured,
        }
    }

    /// What a server should warn about at startup, if anything. Judged on
    /// the provider that will actually answer, not the selected one.
    #[must_use]
    pub fn startup_warning(&self) -> Option<String> {
        match self.active() {
            None => Some(
                "No AI provider has an API key; /api/ai/exercise will return 503".to_string(),
            ),
            Some(active) if active.kind != self.provider => Some(format!(
                "AI_PROVIDER is {} but its API key is missing; using {}",
                self.provider, active.kind
            )),
            Some(_) => None,
        }
    }
}

#[must_use]
pub fn exercise_prompt(input: &str) -> String {
    format!(
        r#"Parse this exercise description and return ONLY a JSON object with this exact structure:
{{
  "exercise": {{
    "activity": "activity name",
    "duration": duration in minutes as number,
    "intensity": "light" | "moderate" | "intense"
  }}
}}

Exercise description: "{input}"

If no duration is specified, assume {DEFAULT_DURATION_MINUTES} minutes. Determine intensity based on the activity type and any modifiers mentioned.
Response must be valid JSON only, no additional text."#
    )
}

// --- Gemini wire format ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GeminiRequest {
    #[must_use]
    pub fn for_prompt(prompt: String) -> Self {
        Self {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: Some(prompt) }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiCandidate {
    pub content: Option<GeminiContent>,
}

impl GeminiResponse {
    /// Text of the first part of the first candidate.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

// --- Claude wire format ---

#[derive(Debug, Clone, Serialize)]
pub struct ClaudeRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: String,
}

impl ClaudeRequest {
    #[must_use]
    pub fn for_prompt(prompt: String) -> Self {
        Self {
            model: CLAUDE_MODEL.to_string(),
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeResponse {
    #[serde(default)]
    pub content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeContentBlock {
    #[serde(default)]
    pub text: Option<String>,
}

impl ClaudeResponse {
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.first()?.text.as_deref()
    }
}

// --- Validated result ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedExercise {
    pub activity: String,
    /// Minutes.
    pub duration: u32,
    pub intensity: Intensity,
}

/// `{ "exercise": { ... } }`, the shape returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExercisePayload {
    pub exercise: ParsedExercise,
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::AiResponseMalformed(msg.into())
}

/// Drop a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (`json`) on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Validate a model reply into a [`ParsedExercise`].
///
/// The reply is untrusted: it must be a JSON object with an `exercise`
/// object holding a non-empty `activity`, an optional positive `duration`
/// and an `intensity` of light, moderate or intense.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_exercise_response(text: &str) -> Result<ParsedExercise> {
    let body = strip_code_fence(text);
    let value: Value =
        serde_json::from_str(body).map_err(|e| malformed(format!("reply is not JSON: {e}")))?;

    let exercise = value
        .get("exercise")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("missing \"exercise\" object"))?;

    let activity = exercise
        .get("activity")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| malformed("missing activity"))?;

    let duration = match exercise.get("duration") {
        None | Some(Value::Null) => DEFAULT_DURATION_MINUTES,
        Some(raw) => {
            let minutes = raw
                .as_f64()
                .filter(|d| d.is_finite() && *d > 0.0)
                .ok_or_else(|| malformed(format!("invalid duration {raw}")))?;
            let minutes = minutes.round().max(1.0);
            if minutes > f64::from(MAX_DURATION_MINUTES) {
                return Err(malformed(format!("duration {raw} is out of range")));
            }
            minutes as u32
        }
    };

    let intensity = exercise
        .get("intensity")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing intensity"))?
        .parse::<Intensity>()
        .map_err(|e| malformed(e.to_string()))?;

    Ok(ParsedExercise {
        activity: activity.to_string(),
        duration,
        intensity,
    })
}
