//! HTTP request handlers

pub mod artifacts;
pub mod health;
pub mod visualize;

use actix_web::HttpResponse;

/// Catch-all: unmatched routes answer JSON, never an HTML error page
pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "success": false,
        "error": "Not Found",
    }))
}
