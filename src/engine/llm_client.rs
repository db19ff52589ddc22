use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, TrainerError};
use crate::settings::settings::BackendSettings;

/// Sampling parameters. Fixed per call site; there is no runtime tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
    /// Ask the backend for a JSON object instead of free text.
    pub json_response: bool,
}

impl GenerationConfig {
    pub const fn coached() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 2048,
            top_p: 0.95,
            top_k: 40,
            json_response: false,
        }
    }

    pub const fn roleplay() -> Self {
        Self {
            temperature: 0.8,
            max_output_tokens: 512,
            top_p: 0.95,
            top_k: 40,
            json_response: false,
        }
    }

    pub fn with_json(mut self, json_response: bool) -> Self {
        self.json_response = json_response;
        self
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub config: GenerationConfig,
}

/// An externally hosted text generator.
///
/// `generate` returns the provider's raw JSON; callers go through
/// [`extract_reply_text`] because the reply shape differs per provider.
pub trait TextModel: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, request: &GenerationRequest) -> Result<Value>;

    /// Streams text fragments to `on_chunk` and returns the concatenated reply.
    fn generate_stream(
        &self,
        request: &GenerationRequest,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<String> {
        let raw = self.generate(request)?;
        let text = extract_reply_text(&raw).unwrap_or_default();
        if !text.is_empty() {
            on_chunk(&text);
        }
        Ok(text)
    }
}

/// One call, no retry. Unrecognized reply shapes come back as empty text.
pub fn invoke(model: &dyn TextModel, request: &GenerationRequest) -> Result<String> {
    let raw = model.generate(request)?;
    match extract_reply_text(&raw) {
        Some(text) => Ok(text),
        None => {
            tracing::warn!(model = model.name(), "unrecognized reply shape; treating as empty");
            Ok(String::new())
        }
    }
}

/// Pulls the generated text out of whichever shape the provider returned.
pub fn extract_reply_text(value: &Value) -> Option<String> {
    // Direct accessor
    if let Some(text) = value.as_str() {
        return Some(text.to_string());
    }
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }

    // Nested message content
    if let Some(text) = value.pointer("/message/content").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    if let Some(choice) = value.pointer("/choices/0") {
        for path in ["/message/content", "/delta/content", "/text"] {
            if let Some(text) = choice.pointer(path).and_then(Value::as_str) {
                return Some(text.to_string());
            }
        }
    }

    // Raw candidate structure
    if let Some(parts) = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    {
        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect();
        return Some(text);
    }

    None
}

/// Reads `data:` lines from a server-sent-event body.
pub fn read_sse<R: BufRead>(reader: R, on_chunk: &mut dyn FnMut(&str)) -> Result<String> {
    let mut full = String::new();

    for line in reader.lines() {
        let line = line?;
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }
        if data.is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("skipping malformed stream event: {e}");
                continue;
            }
        };

        if let Some(chunk) = extract_reply_text(&value) {
            if !chunk.is_empty() {
                on_chunk(&chunk);
                full.push_str(&chunk);
            }
        }
    }

    Ok(full)
}

fn check_status(provider: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(TrainerError::Provider {
        provider: provider.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?)
}

/* =========================
   LM Studio (OpenAI-compatible)
   ========================= */

#[derive(Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

pub struct LmStudioClient {
    client: Client,
    base_url: String,
    model: String,
}

impl LmStudioClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn request_body(&self, request: &GenerationRequest, stream: bool) -> ChatCompletionRequest {
        let c = &request.config;
        // JSON mode is carried by the prompt contract; local servers differ in
        // which `response_format` variants they accept.
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "system".into(),
                content: request.prompt.clone(),
            }],
            temperature: c.temperature,
            top_p: c.top_p,
            top_k: c.top_k,
            max_tokens: c.max_output_tokens,
            stream,
        }
    }

    fn post(&self, request: &GenerationRequest, stream: bool) -> Result<Response> {
        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&self.request_body(request, stream))
            .send()?;
        check_status("lm_studio", resp)
    }

    /// Lists loaded models; used by `--check`.
    pub fn check_connection(&self) -> Result<String> {
        let resp = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .send()?;
        let resp: Value = check_status("lm_studio", resp)?.json()?;

        Ok(format!(
            "Connected ({} models available)",
            resp["data"].as_array().map(|a| a.len()).unwrap_or(0)
        ))
    }
}

impl TextModel for LmStudioClient {
    fn name(&self) -> &str {
        "lm_studio"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        Ok(self.post(request, false)?.json::<Value>()?)
    }

    fn generate_stream(
        &self,
        request: &GenerationRequest,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<String> {
        let resp = self.post(request, true)?;
        read_sse(BufReader::new(resp), on_chunk)
    }
}

/* =========================
   Gemini
   ========================= */

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: GEMINI_BASE_URL.to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_env(model: impl Into<String>, api_key_env: &str) -> Result<Self> {
        let key = std::env::var(api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TrainerError::MissingApiKey(api_key_env.to_string()))?;
        Self::new(model, key)
    }

    pub fn request_body(request: &GenerationRequest) -> Value {
        let c = &request.config;
        let mut generation_config = json!({
            "temperature": c.temperature,
            "topP": c.top_p,
            "topK": c.top_k,
            "maxOutputTokens": c.max_output_tokens,
        });
        if c.json_response {
            generation_config["responseMimeType"] = json!("application/json");
        }

        // Role-play content routinely trips the default filters.
        let safety: Vec<Value> = SAFETY_CATEGORIES
            .iter()
            .map(|category| json!({ "category": category, "threshold": "BLOCK_NONE" }))
            .collect();

        json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": generation_config,
            "safetySettings": safety,
        })
    }

    fn post(&self, request: &GenerationRequest, method: &str) -> Result<Response> {
        let resp = self
            .client
            .post(format!("{}/models/{}:{}", self.base_url, self.model, method))
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(request))
            .send()?;
        check_status("gemini", resp)
    }
}

impl TextModel for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        Ok(self.post(request, "generateContent")?.json::<Value>()?)
    }

    fn generate_stream(
        &self,
        request: &GenerationRequest,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<String> {
        let resp = self.post(request, "streamGenerateContent?alt=sse")?;
        read_sse(BufReader::new(resp), on_chunk)
    }
}

pub fn build_model(backend: &BackendSettings) -> Result<Arc<dyn TextModel>> {
    Ok(match backend {
        BackendSettings::LmStudio { base_url, model } => {
            Arc::new(LmStudioClient::new(base_url.clone(), model.clone())?)
        }
        BackendSettings::Gemini { model, api_key_env } => {
            Arc::new(GeminiClient::from_env(model.clone(), api_key_env)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn extracts_each_known_shape() {
        assert_eq!(extract_reply_text(&json!("hi")).as_deref(), Some("hi"));
        assert_eq!(extract_reply_text(&json!({"text": "direct"})).as_deref(), Some("direct"));
        assert_eq!(
            extract_reply_text(&json!({"message": {"content": "nested"}})).as_deref(),
            Some("nested")
        );
        assert_eq!(
            extract_reply_text(&json!({"choices": [{"message": {"content": "openai"}}]})).as_deref(),
            Some("openai")
        );
        assert_eq!(
            extract_reply_text(&json!({
                "candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "officer"}]}}]
            }))
            .as_deref(),
            Some("Hello officer")
        );
    }

    #[test]
    fn unknown_shape_is_none() {
        assert_eq!(extract_reply_text(&json!({"output": 42})), None);
        assert_eq!(extract_reply_text(&json!([])), None);
    }

    #[test]
    fn sse_concatenates_fragments_and_stops_at_done() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
                    : keep-alive\n\
                    data: not-json\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\
                    data: [DONE]\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n";
        let mut chunks = Vec::new();
        let full = read_sse(Cursor::new(body), &mut |c: &str| chunks.push(c.to_string())).unwrap();
        assert_eq!(full, "Hello");
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[test]
    fn gemini_body_carries_generation_config() {
        let req = GenerationRequest {
            prompt: "p".into(),
            config: GenerationConfig::coached().with_json(true),
        };
        let body = GeminiClient::request_body(&req);
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "p");
    }

    struct Echo;

    impl TextModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn generate(&self, request: &GenerationRequest) -> Result<Value> {
            Ok(json!({ "unexpected": request.prompt }))
        }
    }

    #[test]
    fn invoke_treats_unknown_shape_as_empty() {
        let req = GenerationRequest {
            prompt: "x".into(),
            config: GenerationConfig::roleplay(),
        };
        assert_eq!(invoke(&Echo, &req).unwrap(), "");
    }
}
