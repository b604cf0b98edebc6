//! Visualization engine
//!
//! This module contains the request pipeline between intake and response:
//! - Staging of material images into a per-request temp directory
//! - Prompt construction and the retried provider invocation
//! - Post-processing of the generated image into a servable artifact
//!
//! One request runs the state machine
//! `Staging → Invoking(+retry) → PostProcessing`, with cleanup on every exit
//! path and an overall wall-clock ceiling enforced by
//! [`Visualizer::run_with_timeout`].

pub mod postprocess;
pub mod prompt;
pub mod staging;
pub mod sweeper;

pub use postprocess::{PostProcessError, ARTIFACT_PREFIX};
pub use prompt::build_prompt;
pub use staging::StagingJob;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::GenericImageView;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Settings;
use crate::domain::{InputError, VisualizationRequest};
use crate::providers::{ImageTransformer, ProviderError, RetryPolicy, TransformRequest};

/// Pipeline errors. `Input` maps to HTTP 400; everything else is a 500.
#[derive(Debug, Error)]
pub enum VisualizeError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Staging failed: {0}")]
    Staging(#[from] std::io::Error),

    #[error("Provider call failed after {attempts} attempts: {source}")]
    Provider {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("ERROR: no output generated")]
    NoOutput,

    #[error(transparent)]
    PostProcess(#[from] PostProcessError),

    #[error("Visualization timed out after {0} seconds")]
    Timeout(u64),
}

impl VisualizeError {
    /// True for failures the client caused (HTTP 400 family)
    pub fn is_client_error(&self) -> bool {
        matches!(self, VisualizeError::Input(_))
    }
}

/// Successful pipeline outcome
#[derive(Debug, Clone)]
pub struct VisualizationResult {
    /// Public-relative URL of the generated artifact (leading slash, no host)
    pub image_url: String,
    pub width: u32,
    pub height: u32,
}

/// Orchestrates one visualization end to end
pub struct Visualizer {
    transformer: Arc<dyn ImageTransformer>,
    transform_retry: RetryPolicy,
    download_retry: RetryPolicy,
    download_client: reqwest::Client,
    public_roots: Vec<PathBuf>,
    request_timeout: Duration,
}

impl Visualizer {
    pub fn new(transformer: Arc<dyn ImageTransformer>, settings: &Settings) -> Self {
        let provider = &settings.provider;
        let download_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(provider.download_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("tile-visualizer/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Visualizer {
            transformer,
            transform_retry: RetryPolicy::new(
                provider.max_attempts,
                Duration::from_secs(provider.retry_delay_secs),
            ),
            download_retry: RetryPolicy::new(
                provider.download_attempts,
                Duration::from_secs(provider.retry_delay_secs),
            ),
            download_client,
            public_roots: settings.public_roots(),
            request_timeout: Duration::from_secs(provider.request_timeout_secs),
        }
    }

    /// Run the pipeline under the overall wall-clock ceiling. On timeout the
    /// in-flight transform future is dropped; staging cleanup still runs.
    pub async fn run_with_timeout(
        &self,
        request: &VisualizationRequest,
    ) -> Result<VisualizationResult, VisualizeError> {
        match tokio::time::timeout(self.request_timeout, self.run(request)).await {
            Ok(result) => result,
            Err(_) => Err(VisualizeError::Timeout(self.request_timeout.as_secs())),
        }
    }

    /// Run the pipeline: stage, invoke, post-process
    pub async fn run(
        &self,
        request: &VisualizationRequest,
    ) -> Result<VisualizationResult, VisualizeError> {
        request.validate()?;

        // Staging directory lives for the whole pipeline; its Drop removes
        // it on success, failure, and cancellation alike.
        let staging = StagingJob::create(request)?;

        let (room_path, (width, height)) = self.correct_room(request, &staging)?;

        let mut images = vec![room_path];
        if let Some(ref tile) = staging.floor_tile {
            images.push(tile.clone());
        }
        if let Some(ref wall) = staging.wall_tile {
            images.push(wall.clone());
        }

        let transform_request = TransformRequest {
            prompt: build_prompt(request.mode).to_string(),
            images,
        };

        info!(
            mode = request.mode.as_str(),
            room_source = if request.room_is_upload { "upload" } else { "render" },
            width,
            height,
            images = transform_request.images.len(),
            "Invoking external transform"
        );

        let transformer = self.transformer.as_ref();
        let transform_request = &transform_request;
        let output = self
            .transform_retry
            .run("provider transform", |_attempt| async move {
                transformer.transform(transform_request).await
            })
            .await
            .map_err(|source| VisualizeError::Provider {
                attempts: self.transform_retry.max_attempts,
                source,
            })?
            .ok_or(VisualizeError::NoOutput)?;

        let bytes = postprocess::download_with_retry(
            &self.download_client,
            &self.download_retry,
            &output.url,
        )
        .await?;

        let image_url =
            postprocess::finalize_artifact(&bytes, (width, height), &self.public_roots[0])?;
        self.verify_artifact(&image_url);

        Ok(VisualizationResult {
            image_url,
            width,
            height,
        })
    }

    /// Correct the room image's EXIF orientation and park the corrected copy
    /// in the staging directory. A failed save degrades to the original file;
    /// the corrected dimensions are authoritative either way.
    fn correct_room(
        &self,
        request: &VisualizationRequest,
        staging: &StagingJob,
    ) -> Result<(PathBuf, (u32, u32)), VisualizeError> {
        let img = postprocess::load_oriented(&request.room_image)?;
        let dimensions = img.dimensions();

        let corrected = staging.corrected_room_path();
        match postprocess::save_jpeg(&img, &corrected, postprocess::JPEG_QUALITY) {
            Ok(()) => Ok((corrected, dimensions)),
            Err(e) => {
                warn!(error = %e, "Could not save corrected room image, using original");
                Ok((request.room_image.clone(), dimensions))
            }
        }
    }

    /// The artifact was just written under the primary root, but a
    /// misconfigured server root would make it unservable; check the
    /// candidates the artifact route will probe and complain loudly.
    fn verify_artifact(&self, image_url: &str) {
        let filename = image_url.trim_start_matches('/');
        let found = self
            .public_roots
            .iter()
            .any(|root| root.join(filename).is_file());
        if !found {
            warn!(
                image_url,
                searched = ?self.public_roots,
                "Generated artifact not found under any public root"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VisualizationMode;
    use crate::providers::traits::test_support::ScriptedTransformer;
    use crate::providers::{ProviderError, TransformOutput};
    use crate::test_util::{jpeg_bytes, serve_bytes, write_jpeg};
    use std::path::Path;

    fn test_settings(public_root: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.assets.server_root = Some(public_root.to_path_buf());
        settings.provider.retry_delay_secs = 0;
        settings
    }

    fn floor_request(dir: &Path) -> VisualizationRequest {
        let room = dir.join("room.jpg");
        let tile = dir.join("marble.jpg");
        write_jpeg(&room, 1200, 800);
        write_jpeg(&tile, 64, 64);
        VisualizationRequest {
            room_image: room,
            room_is_upload: false,
            floor_tile: Some(tile),
            wall_tile: None,
            mode: VisualizationMode::Floor,
        }
    }

    #[tokio::test]
    async fn test_floor_pipeline_matches_original_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_bytes(jpeg_bytes(1024, 1024)).await;
        let transformer = Arc::new(ScriptedTransformer::always_url(&url));
        let visualizer = Visualizer::new(transformer.clone(), &test_settings(dir.path()));

        let result = visualizer.run(&floor_request(dir.path())).await.unwrap();

        assert!(result.image_url.starts_with("/visualized_"));
        assert_eq!((result.width, result.height), (1200, 800));
        assert_eq!(transformer.call_count(), 1);

        let artifact = dir
            .path()
            .join("public")
            .join(result.image_url.trim_start_matches('/'));
        let written = image::open(artifact).unwrap();
        assert_eq!(written.dimensions(), (1200, 800));
    }

    #[tokio::test]
    async fn test_provider_recovers_on_third_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_bytes(jpeg_bytes(512, 512)).await;
        let transformer = Arc::new(ScriptedTransformer::new(vec![
            Err(ProviderError::Internal("transient 1".to_string())),
            Err(ProviderError::Internal("transient 2".to_string())),
            Ok(Some(TransformOutput { url })),
        ]));
        let visualizer = Visualizer::new(transformer.clone(), &test_settings(dir.path()));

        let result = visualizer.run(&floor_request(dir.path())).await;
        assert!(result.is_ok());
        assert_eq!(transformer.call_count(), 3);
    }

    #[tokio::test]
    async fn test_provider_exhaustion_surfaces_last_error() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = Arc::new(ScriptedTransformer::new(vec![Err(
            ProviderError::Internal("socket reset by provider".to_string()),
        )]));
        let visualizer = Visualizer::new(transformer.clone(), &test_settings(dir.path()));

        let err = visualizer.run(&floor_request(dir.path())).await.unwrap_err();
        assert_eq!(transformer.call_count(), 3);
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("after 3 attempts"));
        assert!(format!("{err}").contains("socket reset by provider"));
    }

    #[tokio::test]
    async fn test_unparseable_output_is_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = Arc::new(ScriptedTransformer::new(vec![Ok(None)]));
        let visualizer = Visualizer::new(transformer, &test_settings(dir.path()));

        let err = visualizer.run(&floor_request(dir.path())).await.unwrap_err();
        assert!(matches!(err, VisualizeError::NoOutput));
    }

    #[tokio::test]
    async fn test_invariant_violation_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = Arc::new(ScriptedTransformer::always_url("http://unused"));
        let visualizer = Visualizer::new(transformer.clone(), &test_settings(dir.path()));

        let mut request = floor_request(dir.path());
        request.floor_tile = None;
        let err = visualizer.run(&request).await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(transformer.call_count(), 0);
    }
}
