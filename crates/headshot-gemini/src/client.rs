use async_trait::async_trait;
use headshot_batch::RemoteGenerator;
use headshot_common::{HeadshotError, Result, ResultLocator, SourceImage};
use tracing::debug;
use url::Url;

use crate::{
    config::GeminiConfig,
    types::{
        Content, ErrorEnvelope, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
        InlineData, Part,
    },
};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Edits the source image with a Gemini image model, one prompt per call.
pub struct GeminiGenerator {
    url: Url,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let url = generate_url(&config.endpoint, &config.model)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| HeadshotError::InternalError(format!("failed to build http client: {err}")))?;

        Ok(Self {
            url,
            model: config.model,
            api_key: config.api_key,
            client,
        })
    }

    async fn send(&self, request: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        let response = self
            .client
            .post(self.url.clone())
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| HeadshotError::Generation(format!("request to {} failed: {err}", self.model)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HeadshotError::Generation(error_message(status, &body)));
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|err| HeadshotError::Generation(format!("malformed response from {}: {err}", self.model)))
    }
}

#[async_trait]
impl RemoteGenerator for GeminiGenerator {
    async fn generate(&self, image: &SourceImage, prompt: &str) -> Result<ResultLocator> {
        debug!(model = %self.model, bytes = image.len(), "requesting image edit");
        let response = self.send(&build_request(image, prompt)).await?;
        extract_image(response)
    }
}

fn generate_url(endpoint: &str, model: &str) -> Result<Url> {
    let raw = format!(
        "{}/v1beta/models/{model}:generateContent",
        endpoint.trim_end_matches('/')
    );
    Url::parse(&raw)
        .map_err(|err| HeadshotError::InvalidArgument(format!("invalid gemini endpoint {endpoint}: {err}")))
}

fn build_request(image: &SourceImage, prompt: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part {
                    inline_data: Some(InlineData {
                        mime_type: image.mime_type().to_string(),
                        data: image.base64_data(),
                    }),
                    ..Part::default()
                },
                Part {
                    text: Some(prompt.to_string()),
                    ..Part::default()
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
        },
    }
}

/// Picks the first inline image of the first candidate. A reply without one
/// is a failure; any text the model sent instead becomes the reason.
fn extract_image(response: GenerateContentResponse) -> Result<ResultLocator> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .map(|reason| format!("request was blocked: {reason}"))
            .unwrap_or_else(|| "model returned no candidates".to_string());
        return Err(HeadshotError::Generation(reason));
    };

    let parts = candidate.content.map(|content| content.parts).unwrap_or_default();
    if let Some(inline) = parts.iter().find_map(|part| part.inline_data.as_ref()) {
        return Ok(ResultLocator::from_inline(&inline.mime_type, &inline.data));
    }

    let text = parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if !text.is_empty() {
        return Err(HeadshotError::Generation(text));
    }

    let reason = match candidate.finish_reason {
        Some(finish) => format!("model returned no image (finish reason {finish})"),
        None => "model returned no image".to_string(),
    };
    Err(HeadshotError::Generation(reason))
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => {
            format!("gemini returned {status}: {}", envelope.error.message)
        }
        _ => format!("gemini returned {status}"),
    }
}
