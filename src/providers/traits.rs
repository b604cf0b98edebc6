//! Provider trait definitions for generative image transforms
//!
//! The external model is treated as an opaque image-to-image function: it
//! takes a text instruction plus an ordered list of reference images and
//! yields a downloadable image URL. Handlers depend on the trait so tests can
//! substitute scripted doubles.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Provider error types
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    #[error("Polling timed out after {0} seconds")]
    PollTimeout(u64),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("REPLICATE_API_TOKEN is not set as an environment variable")]
    MissingToken,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// One transform invocation: the instruction plus the ordered input images
/// (room first, then floor material, then wall material if present).
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub prompt: String,
    pub images: Vec<PathBuf>,
}

/// A resolvable reference to the generated image
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub url: String,
}

/// The external image-to-image transform.
///
/// `Ok(None)` means the provider answered but produced nothing the output
/// parser recognizes as an image reference; the caller decides whether that
/// is fatal. Transport and API failures are `Err` and subject to retry.
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    fn name(&self) -> &str;

    async fn transform(&self, request: &TransformRequest)
        -> ProviderResult<Option<TransformOutput>>;
}

#[cfg(test)]
pub mod test_support {
    //! Scripted transformer double shared by engine and handler tests

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Plays back a fixed sequence of outcomes, one per call, repeating the
    /// last entry once the script is exhausted. Records the call count.
    pub struct ScriptedTransformer {
        script: Mutex<Vec<ProviderResult<Option<TransformOutput>>>>,
        pub calls: AtomicU32,
    }

    impl ScriptedTransformer {
        pub fn new(script: Vec<ProviderResult<Option<TransformOutput>>>) -> Self {
            ScriptedTransformer {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }

        pub fn always_url(url: &str) -> Self {
            Self::new(vec![Ok(Some(TransformOutput {
                url: url.to_string(),
            }))])
        }

        pub fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageTransformer for ScriptedTransformer {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn transform(
            &self,
            _request: &TransformRequest,
        ) -> ProviderResult<Option<TransformOutput>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                clone_outcome(script.first().expect("empty script"))
            }
        }
    }

    fn clone_outcome(
        outcome: &ProviderResult<Option<TransformOutput>>,
    ) -> ProviderResult<Option<TransformOutput>> {
        match outcome {
            Ok(output) => Ok(output.clone()),
            Err(e) => Err(ProviderError::Internal(e.to_string())),
        }
    }
}
