//! Generated artifact serving
//!
//! Artifacts are written under the public root with a `visualized_` prefix;
//! the route matches on that prefix and serves them with cache-defeating
//! headers, since every generation produces a brand-new name and clients
//! must never see a stale result.

use std::path::Path;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::engine::ARTIFACT_PREFIX;
use crate::AppState;

/// GET /{filename} - Serve a generated artifact
#[utoipa::path(
    get,
    path = "/{filename}",
    tag = "visualization",
    params(
        ("filename" = String, Path, description = "Generated artifact name (visualized_*.jpg)")
    ),
    responses(
        (status = 200, description = "Artifact bytes"),
        (status = 404, description = "Artifact not found")
    )
)]
pub async fn serve_artifact(
    state: web::Data<AppState>,
    filename: web::Path<String>,
) -> HttpResponse {
    let filename = filename.into_inner();

    // The route pattern already pins the prefix; reject traversal outright.
    if !filename.starts_with(ARTIFACT_PREFIX) || filename.contains('/') || filename.contains("..")
    {
        return not_found(&filename);
    }

    for root in state.settings.public_roots() {
        let path = root.join(&filename);
        if !path.is_file() {
            continue;
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes = bytes.len(), "Serving artifact");
                return artifact_response(&path, bytes);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read artifact");
            }
        }
    }

    not_found(&filename)
}

fn artifact_response(path: &Path, bytes: Vec<u8>) -> HttpResponse {
    let metadata = std::fs::metadata(path).ok();
    let modified: DateTime<Utc> = metadata
        .and_then(|m| m.modified().ok())
        .map(DateTime::from)
        .unwrap_or_else(Utc::now);

    // ETag from length + mtime: fresh for every newly generated artifact
    let etag = format!("\"{:x}-{:x}\"", bytes.len(), modified.timestamp_millis());

    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    };

    HttpResponse::Ok()
        .content_type(content_type)
        .insert_header(("Cache-Control", "no-cache, no-store, must-revalidate"))
        .insert_header(("Pragma", "no-cache"))
        .insert_header(("Expires", "0"))
        .insert_header(("ETag", etag))
        .insert_header((
            "Last-Modified",
            modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        ))
        .body(bytes)
}

fn not_found(filename: &str) -> HttpResponse {
    warn!(filename, "Artifact not found");
    HttpResponse::NotFound().json(serde_json::json!({
        "success": false,
        "error": "Resized image not found",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::domain::TileCatalog;
    use crate::engine::Visualizer;
    use crate::providers::traits::test_support::ScriptedTransformer;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn test_state(root: &Path) -> AppState {
        let mut settings = Settings::default();
        settings.assets.server_root = Some(root.to_path_buf());
        let transformer = Arc::new(ScriptedTransformer::always_url("http://unused"));
        AppState {
            catalog: Arc::new(TileCatalog::builtin(&settings.tiles_root())),
            visualizer: Arc::new(Visualizer::new(transformer, &settings)),
            settings,
        }
    }

    #[actix_web::test]
    async fn test_serves_artifact_with_no_cache_headers() {
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("public");
        std::fs::create_dir_all(&public).unwrap();
        std::fs::write(public.join("visualized_1712_00af.jpg"), b"jpeg-bytes").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state(dir.path())))
                .route(
                    "/{filename:visualized_.*}",
                    web::get().to(serve_artifact),
                ),
        )
        .await;

        let request = test::TestRequest::get()
            .uri("/visualized_1712_00af.jpg")
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("Cache-Control").unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert!(response.headers().contains_key("ETag"));
        assert!(response.headers().contains_key("Last-Modified"));
        let body = test::read_body(response).await;
        assert_eq!(&body[..], b"jpeg-bytes");
    }

    #[actix_web::test]
    async fn test_missing_artifact_is_json_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state(dir.path())))
                .route(
                    "/{filename:visualized_.*}",
                    web::get().to(serve_artifact),
                ),
        )
        .await;

        let request = test::TestRequest::get()
            .uri("/visualized_nope.jpg")
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 404);
        let json: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(json["success"], false);
    }
}
