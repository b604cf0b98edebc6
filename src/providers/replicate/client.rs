//! Replicate predictions client
//!
//! In-process HTTP client for the image-to-image transform. Input images are
//! inlined as base64 data URLs; the create call asks the API to block with
//! `Prefer: wait` and falls back to status polling when the prediction is
//! still starting or processing.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::ProviderSettings;
use crate::providers::traits::{
    ImageTransformer, ProviderError, ProviderResult, TransformOutput, TransformRequest,
};

use super::models::{extract_output_url, Prediction};

/// Environment variable holding the API token; never configured in files
const TOKEN_ENV: &str = "REPLICATE_API_TOKEN";

pub struct ReplicateClient {
    http: reqwest::Client,
    api_base: String,
    model: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl ReplicateClient {
    pub fn new(settings: &ProviderSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("tile-visualizer/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        ReplicateClient {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            poll_interval: Duration::from_secs(settings.poll_interval_secs.max(1)),
            poll_timeout: Duration::from_secs(settings.poll_timeout_secs),
        }
    }

    fn token() -> ProviderResult<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ProviderError::MissingToken)
    }

    fn predictions_endpoint(&self) -> String {
        format!("{}/predictions", self.api_base)
    }

    /// Inline a local image as a data URL for the `image_input` list
    fn path_to_data_url(path: &Path) -> ProviderResult<String> {
        let bytes = std::fs::read(path).map_err(|e| {
            ProviderError::Internal(format!("failed to read {}: {e}", path.display()))
        })?;
        let mime = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            Some("bmp") => "image/bmp",
            _ => "image/jpeg",
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(format!("data:{mime};base64,{encoded}"))
    }

    async fn json_or_error(
        context: &str,
        response: reqwest::Response,
    ) -> ProviderResult<Prediction> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: truncate(&body, 512),
            });
        }
        response
            .json::<Prediction>()
            .await
            .map_err(|e| ProviderError::Parse(format!("{context}: {e}")))
    }

    async fn poll_prediction(&self, poll_url: &str, token: &str) -> ProviderResult<Prediction> {
        let started = Instant::now();
        loop {
            let response = self
                .http
                .get(poll_url)
                .bearer_auth(token)
                .send()
                .await?;
            let prediction = Self::json_or_error("poll prediction", response).await?;

            if prediction.is_succeeded() {
                return Ok(prediction);
            }
            if prediction.is_failed() {
                return Err(ProviderError::PredictionFailed(prediction.failure_detail()));
            }
            if started.elapsed() >= self.poll_timeout {
                return Err(ProviderError::PollTimeout(self.poll_timeout.as_secs()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl ImageTransformer for ReplicateClient {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn transform(
        &self,
        request: &TransformRequest,
    ) -> ProviderResult<Option<TransformOutput>> {
        let token = Self::token()?;

        let image_input: Vec<String> = request
            .images
            .iter()
            .map(|path| Self::path_to_data_url(path))
            .collect::<ProviderResult<_>>()?;

        let payload = json!({
            "model": self.model,
            "input": {
                "prompt": request.prompt,
                "image_input": image_input,
            },
        });

        debug!(
            model = %self.model,
            images = request.images.len(),
            "Creating prediction"
        );

        let response = self
            .http
            .post(self.predictions_endpoint())
            .bearer_auth(&token)
            .header("Prefer", "wait")
            .json(&payload)
            .send()
            .await?;
        let mut prediction = Self::json_or_error("create prediction", response).await?;

        if prediction.is_in_flight() {
            let poll_url = prediction
                .urls
                .as_ref()
                .and_then(|u| u.get.clone())
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| {
                    ProviderError::Parse("prediction is missing its poll URL".to_string())
                })?;
            prediction = self.poll_prediction(&poll_url, &token).await?;
        } else if !prediction.is_succeeded() {
            return Err(ProviderError::PredictionFailed(prediction.failure_detail()));
        }

        let url = prediction.output.as_ref().and_then(extract_output_url);
        match url {
            Some(url) => {
                debug!(
                    prediction_id = prediction.id.as_deref().unwrap_or("unknown"),
                    url = %url,
                    "Prediction succeeded"
                );
                Ok(Some(TransformOutput { url }))
            }
            None => {
                // Answered but unusable; the caller decides whether this
                // sinks the request.
                warn!(
                    prediction_id = prediction.id.as_deref().unwrap_or("unknown"),
                    output = ?prediction.output,
                    "Prediction returned no usable output"
                );
                Ok(None)
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
