//! Wire models for the Replicate predictions API

use serde::Deserialize;
use serde_json::Value;

/// A prediction resource as returned by create/get
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
}

impl Prediction {
    pub fn is_succeeded(&self) -> bool {
        self.status.eq_ignore_ascii_case("succeeded")
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "starting" | "processing"
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "failed" | "canceled"
        )
    }

    /// Provider-reported failure detail, or the whole status when absent
    pub fn failure_detail(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => format!("status={}", self.status),
        }
    }
}

/// Pull the first image URL out of a prediction output.
///
/// The model is loose about shape: a plain URL string, a list whose first
/// element bears a URL, or an object with a `url`/`urls`/`output` member are
/// all seen in the wild. Anything else yields `None`.
pub fn extract_output_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with("http") {
                Some(trimmed.to_string())
            } else {
                None
            }
        }
        Value::Array(items) => items.iter().find_map(extract_output_url),
        Value::Object(obj) => obj
            .get("url")
            .or_else(|| obj.get("urls"))
            .or_else(|| obj.get("output"))
            .and_then(extract_output_url),
        _ => None,
    }
}
