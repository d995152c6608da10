use crate::config::ExtractorConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Structured components of one raw address, as returned by the
/// extraction service. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredFields {
    pub street_info: Option<String>,
    pub neighborhood: Option<String>,
    pub apartment_info: Option<String>,
    pub notes: Option<String>,
}

impl StructuredFields {
    /// Blank strings count as absent. The rest of the system relies on
    /// these fields being either meaningful text or `None`.
    fn clean(mut self) -> Self {
        self.street_info = blank_to_none(self.street_info);
        self.neighborhood = blank_to_none(self.neighborhood);
        self.apartment_info = blank_to_none(self.apartment_info);
        self.notes = blank_to_none(self.notes);
        self
    }
}

fn blank_to_none(field: Option<String>) -> Option<String> {
    field.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("extraction service credential is not configured")]
    Unconfigured,

    #[error("extraction request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("extraction service returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("extraction service returned no candidates")]
    EmptyReply,

    #[error("could not parse extraction reply: {0}")]
    MalformedReply(String),
}

/// Core trait for structured address extraction backends
#[async_trait]
pub trait AddressExtractor: Send + Sync {
    /// Decompose one raw address into structured fields.
    async fn extract(&self, raw_address: &str) -> Result<StructuredFields, ExtractError>;
}

/// Instruction set sent with every extraction request. The hierarchy rule
/// and the worked examples pin down which road-type token wins when a raw
/// address names several.
const EXTRACTION_INSTRUCTIONS: &str = r#"You are an expert assistant for cleaning and structuring Colombian postal addresses.
Analyze the raw address below and reply with a JSON object containing the specified fields.

Key rules:
1. Road-type hierarchy:
   a. If "Avenida" (or "Av.") appears together with "Carrera" or "Calle", ignore the "Avenida" completely.
   b. Among the remaining road types (Carrera, Calle, Diagonal, etc.), the first one that appears is the principal one.
   c. Any road type appearing after the principal one is an error and must be ignored when building `street_info`.
2. Component extraction:
   - `street_info`: the principal, geocodable part, following the hierarchy rule, in standard format (e.g. "Carrera 44B # 13-16").
   - `neighborhood`: the neighborhood, sector, or urbanization.
   - `apartment_info`: details such as floor, apartment, interior, tower, etc.
   - `notes`: any other non-essential information: colors, landmarks, delivery instructions, etc.
3. Output format: the reply must be the JSON object only, with no explanations. Fields with no value must be null.

Examples:

Raw address: "Cra72a#113-21 2do piso"
JSON:
{
  "street_info": "Carrera 72a # 113-21",
  "neighborhood": null,
  "apartment_info": "2do piso",
  "notes": null
}

Raw address: "Av. Calle 108 A # 77 B-06 Primer piso"
JSON:
{
  "street_info": "Calle 108 A # 77 B-06",
  "neighborhood": null,
  "apartment_info": "Primer piso",
  "notes": null
}

Raw address: "Carrera 30 CC calle 100 B-7 la aldea santo domingo Medellín"
JSON:
{
  "street_info": "Carrera 30 CC # 100 B-7",
  "neighborhood": "la aldea santo domingo Medellín",
  "apartment_info": null,
  "notes": null
}

Raw address: "av. carrera 44B calle 13-16"
JSON:
{
  "street_info": "Carrera 44B # 13-16",
  "neighborhood": null,
  "apartment_info": null,
  "notes": null
}

---

Analyze this address:
"#;

fn build_prompt(raw_address: &str) -> String {
    format!("{EXTRACTION_INSTRUCTIONS}\nRaw address: \"{raw_address}\"\n\nJSON:\n")
}

/// Model replies usually arrive wrapped in a Markdown code fence; strip it
/// (with any language tag on the opening line) before parsing.
fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    match rest.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => rest.trim(),
    }
}

fn parse_extraction_reply(reply: &str) -> Result<StructuredFields, ExtractError> {
    let cleaned = strip_code_fences(reply);
    let fields: StructuredFields = serde_json::from_str(cleaned)
        .map_err(|e| ExtractError::MalformedReply(e.to_string()))?;
    Ok(fields.clean())
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: String,
}

/// Extraction backed by the Gemini `generateContent` REST API
pub struct GeminiExtractor {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiExtractor {
    /// The credential is injected here; when absent every call fails with
    /// `ExtractError::Unconfigured` instead of reaching the network.
    pub fn new(config: &ExtractorConfig, api_key: Option<String>) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl AddressExtractor for GeminiExtractor {
    async fn extract(&self, raw_address: &str) -> Result<StructuredFields, ExtractError> {
        let api_key = self.api_key.as_deref().ok_or(ExtractError::Unconfigured)?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": build_prompt(raw_address) }] }]
        });

        debug!(model = %self.model, "requesting structured extraction");
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Status(status));
        }

        let payload = response.text().await?;
        let reply: GenerateContentResponse = serde_json::from_str(&payload)
            .map_err(|e| ExtractError::MalformedReply(e.to_string()))?;

        let text = reply
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or(ExtractError::EmptyReply)?;

        parse_extraction_reply(&text)
    }
}
