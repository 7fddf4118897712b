use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use slimify_core::Error;
use slimify_core::ai::{
    ANTHROPIC_VERSION, AiProviderKind, AiSettings, CLAUDE_ENDPOINT, ClaudeRequest,
    ClaudeResponse, ExerciseParser, GEMINI_ENDPOINT, GeminiRequest, GeminiResponse,
    ParsedExercise, exercise_prompt, parse_exercise_response,
};

/// Exercise parsing over the Gemini or Claude HTTP APIs.
pub struct AiClient {
    client: reqwest::Client,
    settings: AiSettings,
    gemini_url: String,
    claude_url: String,
}

impl AiClient {
    pub fn new(settings: AiSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "slimify-cli/{} (calorie tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            settings,
            gemini_url: GEMINI_ENDPOINT.to_string(),
            claude_url: CLAUDE_ENDPOINT.to_string(),
        })
    }

    #[cfg(test)]
    fn with_endpoints(mut self, gemini: String, claude: String) -> Self {
        self.gemini_url = gemini;
        self.claude_url = claude;
        self
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        kind: AiProviderKind,
        request: reqwest::RequestBuilder,
        body: &B,
    ) -> slimify_core::Result<R> {
        let resp = request
            .json(body)
            .send()
            .await
            .map_err(|e| Error::AiRequest(format!("failed to reach {kind}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            tracing::warn!(provider = %kind, %status, detail = %detail, "AI provider returned an error");
            return Err(Error::AiRequest(format!("{kind} returned {status}")));
        }

        resp.json()
            .await
            .map_err(|e| Error::AiResponseMalformed(format!("unreadable {kind} response: {e}")))
    }

    async fn ask_gemini(&self, api_key: &str, prompt: String) -> slimify_core::Result<String> {
        let request = self.client.post(&self.gemini_url).query(&[("key", api_key)]);
        let resp: GeminiResponse = self
            .post(AiProviderKind::Gemini, request, &GeminiRequest::for_prompt(prompt))
            .await?;
        resp.text()
            .map(str::to_string)
            .ok_or_else(|| Error::AiResponseMalformed("gemini returned no text".to_string()))
    }

    async fn ask_claude(&self, api_key: &str, prompt: String) -> slimify_core::Result<String> {
        let request = self
            .client
            .post(&self.claude_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let resp: ClaudeResponse = self
            .post(AiProviderKind::Claude, request, &ClaudeRequest::for_prompt(prompt))
            .await?;
        resp.text()
            .map(str::to_string)
            .ok_or_else(|| Error::AiResponseMalformed("claude returned no text".to_string()))
    }
}

#[async_trait]
impl ExerciseParser for AiClient {
    async fn parse_exercise(&self, input: &str) -> slimify_core::Result<ParsedExercise> {
        let Some(active) = self.settings.active() else {
            return Err(Error::AiNotConfigured);
        };
        let prompt = exercise_prompt(input);
        tracing::debug!(provider = %active.kind, "parsing exercise");

        let text = match active.kind {
            AiProviderKind::Gemini => self.ask_gemini(&active.api_key, prompt).await?,
            AiProviderKind::Claude => self.ask_claude(&active.api_key, prompt).await?,
        };
        parse_exercise_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use slimify_core::models::Intensity;

    const GEMINI_REPLY: &str = r#"{"candidates":[{"content":{"parts":[{"text":"```json\n{\"exercise\":{\"activity\":\"running\",\"duration\":45,\"intensity\":\"moderate\"}}\n```"}]}}]}"#;
    const CLAUDE_REPLY: &str = r#"{"content":[{"type":"text","text":"{\"exercise\":{\"activity\":\"swimming\",\"duration\":20,\"intensity\":\"intense\"}}"}]}"#;

    /// Serve `body` with `status` on every path; returns the base URL.
    async fn mock_provider(status: StatusCode, body: &'static str) -> String {
        let app = Router::new().fallback(move || async move { (status, body) });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/v1")
    }

    fn settings(provider: AiProviderKind) -> AiSettings {
        AiSettings {
            provider,
            gemini_api_key: Some("gemini-key".to_string()),
            claude_api_key: Some("claude-key".to_string()),
        }
    }

    fn client(settings: AiSettings, url: &str) -> AiClient {
        AiClient::new(settings)
            .unwrap()
            .with_endpoints(url.to_string(), url.to_string())
    }

    #[tokio::test]
    async fn test_not_configured_without_keys() {
        let client = AiClient::new(AiSettings::default()).unwrap();
        let err = client.parse_exercise("ran 5k").await.unwrap_err();
        assert!(matches!(err, Error::AiNotConfigured));
        assert!(!client.settings.status().configured);
    }

    #[tokio::test]
    async fn test_gemini_reply_parsed() {
        let url = mock_provider(StatusCode::OK, GEMINI_REPLY).await;
        let parsed = client(settings(AiProviderKind::Gemini), &url)
            .parse_exercise("ran for 45 minutes")
            .await
            .unwrap();
        assert_eq!(parsed.activity, "running");
        assert_eq!(parsed.duration, 45);
        assert_eq!(parsed.intensity, Intensity::Moderate);
    }

    #[tokio::test]
    async fn test_claude_reply_parsed() {
        let url = mock_provider(StatusCode::OK, CLAUDE_REPLY).await;
        let parsed = client(settings(AiProviderKind::Claude), &url)
            .parse_exercise("hard swim, 20 min")
            .await
            .unwrap();
        assert_eq!(parsed.activity, "swimming");
        assert_eq!(parsed.duration, 20);
        assert_eq!(parsed.intensity, Intensity::Intense);
    }

    #[tokio::test]
    async fn test_provider_error_status() {
        let url = mock_provider(StatusCode::TOO_MANY_REQUESTS, "slow down").await;
        let err = client(settings(AiProviderKind::Gemini), &url)
            .parse_exercise("walked")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AiRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_candidates_malformed() {
        let url = mock_provider(StatusCode::OK, r#"{"candidates":[]}"#).await;
        let err = client(settings(AiProviderKind::Gemini), &url)
            .parse_exercise("walked")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AiResponseMalformed(_)));
    }

    #[tokio::test]
    async fn test_non_json_envelope_malformed() {
        let url = mock_provider(StatusCode::OK, "<html>oops</html>").await;
        let err = client(settings(AiProviderKind::Claude), &url)
            .parse_exercise("walked")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AiResponseMalformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(settings(AiProviderKind::Gemini), &format!("http://{addr}/v1"))
            .parse_exercise("walked")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AiRequest(_)));
    }

    #[tokio::test]
    #[ignore = "hits the Gemini API; needs GEMINI_API_KEY"]
    async fn test_live_gemini() {
        let settings = AiSettings::from_lookup(|name| std::env::var(name).ok());
        let client = AiClient::new(settings).unwrap();
        let parsed = client
            .parse_exercise("I went for a 30 minute jog")
            .await
            .unwrap();
        assert!(!parsed.activity.is_empty());
        assert!(parsed.duration > 0);
    }
}
