//! Visualization endpoint
//!
//! `POST /api/visualize` accepts a multipart form with the room photo (or a
//! reference to a pre-seeded render), the material selection, and the
//! visualization mode, then drives the engine pipeline and maps its outcome
//! to JSON. Client-input problems are 400s caught before any staging or
//! provider cost; everything downstream is a 500 with diagnostics.

use std::path::{Path, PathBuf};

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use tracing::{error, info, warn, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{
    ensure_source, resolve_floor_tile, resolve_render_path, resolve_wall_tile, InputError,
    VisualizationMode, VisualizationRequest,
};
use crate::engine::VisualizeError;
use crate::AppState;

/// Per-file upload ceiling
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Extensions accepted when the part carries no image content type
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Response for a completed visualization
#[derive(Serialize, ToSchema)]
pub struct VisualizeResponse {
    pub success: bool,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    pub message: String,
}

/// Error response; `details` carries the full error chain for operators
#[derive(Serialize, ToSchema)]
pub struct VisualizeErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// An upload spooled to disk, removed when the request finishes on any path.
/// Catalog tiles and render images are never wrapped in this guard.
struct UploadedFile {
    path: PathBuf,
}

impl Drop for UploadedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to clean up upload");
            }
        }
    }
}

/// Parsed multipart form
#[derive(Default)]
struct IntakeForm {
    room_image: Option<UploadedFile>,
    custom_tile: Option<UploadedFile>,
    wall_tile: Option<UploadedFile>,
    tile_id: Option<String>,
    visualization_type: Option<String>,
    render_image_path: Option<String>,
}

/// POST /api/visualize - Run a visualization
#[utoipa::path(
    post,
    path = "/api/visualize",
    tag = "visualization",
    responses(
        (status = 200, description = "Visualization completed", body = VisualizeResponse),
        (status = 400, description = "Invalid input", body = VisualizeErrorResponse),
        (status = 500, description = "Transform or processing failure", body = VisualizeErrorResponse)
    )
)]
pub async fn visualize(state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("visualize", %request_id);

    async move {
        let form = match read_form(payload, &state.settings.assets.upload_dir).await {
            Ok(form) => form,
            Err(e) => return client_error(&e),
        };

        info!(
            tile_id = form.tile_id.as_deref().unwrap_or("-"),
            visualization_type = form.visualization_type.as_deref().unwrap_or("floor"),
            has_room_image = form.room_image.is_some(),
            has_custom_tile = form.custom_tile.is_some(),
            has_wall_tile = form.wall_tile.is_some(),
            render_image_path = form.render_image_path.as_deref().unwrap_or("-"),
            "New visualization request"
        );

        let request = match build_request(&state, &form) {
            Ok(request) => request,
            Err(e) => return client_error(&e),
        };

        match state.visualizer.run_with_timeout(&request).await {
            Ok(result) => {
                info!(image_url = %result.image_url, "Visualization completed");
                HttpResponse::Ok().json(VisualizeResponse {
                    success: true,
                    image_url: result.image_url,
                    message: "Visualization completed successfully".to_string(),
                })
            }
            Err(VisualizeError::Input(e)) => client_error(&e),
            Err(e) => server_error(&e),
        }
        // `form` drops here: uploaded source files are removed on success
        // and failure alike.
    }
    .instrument(span)
    .await
}

/// Validate and resolve the form into a `VisualizationRequest`
fn build_request(state: &AppState, form: &IntakeForm) -> Result<VisualizationRequest, InputError> {
    let mode = VisualizationMode::from_param(form.visualization_type.as_deref())?;

    let (room_image, room_is_upload) = match (&form.room_image, &form.render_image_path) {
        (Some(upload), _) => (upload.path.clone(), true),
        (None, Some(raw)) => {
            let decoded = percent_decode_str(raw).decode_utf8_lossy().into_owned();
            let roots = state.settings.public_roots();
            (resolve_render_path(&decoded, &roots)?, false)
        }
        (None, None) => return Err(InputError::MissingRoomImage),
    };

    ensure_source("Room image", &room_image)?;

    let wall_tile = resolve_wall_tile(mode, form.wall_tile.as_ref().map(|f| f.path.as_path()))?;
    let floor_tile = resolve_floor_tile(
        mode,
        form.tile_id.as_deref(),
        form.custom_tile.as_ref().map(|f| f.path.as_path()),
        &state.catalog,
    )?;

    let request = VisualizationRequest {
        room_image,
        room_is_upload,
        floor_tile,
        wall_tile,
        mode,
    };
    request.validate()?;
    Ok(request)
}

/// Drain the multipart payload, spooling file parts to the upload directory
async fn read_form(mut payload: Multipart, upload_dir: &Path) -> Result<IntakeForm, InputError> {
    let mut form = IntakeForm::default();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| InputError::Malformed(e.to_string()))?
    {
        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_string();

        match name.as_str() {
            "roomImage" | "customTileFile" | "wallTileFile" => {
                let upload = save_upload(&mut field, &name, upload_dir).await?;
                match name.as_str() {
                    "roomImage" => form.room_image = Some(upload),
                    "customTileFile" => form.custom_tile = Some(upload),
                    _ => form.wall_tile = Some(upload),
                }
            }
            "tileId" => form.tile_id = Some(read_text(&mut field).await?),
            "visualizationType" => form.visualization_type = Some(read_text(&mut field).await?),
            "renderImagePath" => form.render_image_path = Some(read_text(&mut field).await?),
            other => {
                // Unknown parts are drained and dropped so the stream stays
                // consumable.
                warn!(field = other, "Ignoring unknown multipart field");
                while field
                    .try_next()
                    .await
                    .map_err(|e| InputError::Malformed(e.to_string()))?
                    .is_some()
                {}
            }
        }
    }

    Ok(form)
}

/// Spool one file part to disk under a collision-free name, enforcing the
/// image-type and size constraints.
async fn save_upload(
    field: &mut actix_multipart::Field,
    name: &str,
    upload_dir: &Path,
) -> Result<UploadedFile, InputError> {
    let filename = field
        .content_disposition()
        .get_filename()
        .unwrap_or_default()
        .to_string();
    let content_type = field.content_type().map(|m| m.to_string());

    let is_image_type = content_type
        .as_deref()
        .map(|ct| ct.starts_with("image/"))
        .unwrap_or(false);
    let extension = Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let has_image_extension = extension
        .as_deref()
        .map(|e| IMAGE_EXTENSIONS.contains(&e))
        .unwrap_or(false);

    if !is_image_type && !has_image_extension {
        error!(
            field = name,
            filename = %filename,
            content_type = content_type.as_deref().unwrap_or("unknown"),
            "File rejected"
        );
        return Err(InputError::NotAnImage {
            field: name.to_string(),
            content_type,
        });
    }

    std::fs::create_dir_all(upload_dir).map_err(|e| {
        InputError::Malformed(format!("cannot create upload directory: {e}"))
    })?;

    let stored_name = format!(
        "{name}-{}-{:09}.{}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>(),
        extension.as_deref().unwrap_or("jpg"),
    );
    let upload = UploadedFile {
        path: upload_dir.join(stored_name),
    };

    let mut file = tokio::fs::File::create(&upload.path)
        .await
        .map_err(|e| InputError::Malformed(format!("cannot spool upload: {e}")))?;
    let mut written = 0usize;

    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|e| InputError::Malformed(e.to_string()))?
    {
        written += chunk.len();
        if written > MAX_UPLOAD_BYTES {
            // The guard removes the partial file on return
            return Err(InputError::FileTooLarge {
                field: name.to_string(),
                limit_bytes: MAX_UPLOAD_BYTES as u64,
            });
        }
        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk)
            .await
            .map_err(|e| InputError::Malformed(format!("cannot spool upload: {e}")))?;
    }

    Ok(upload)
}

/// Collect a small text part into a string
async fn read_text(field: &mut actix_multipart::Field) -> Result<String, InputError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|e| InputError::Malformed(e.to_string()))?
    {
        bytes.extend_from_slice(&chunk);
        if bytes.len() > 4096 {
            return Err(InputError::Malformed("text field too long".to_string()));
        }
    }
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

fn client_error(e: &InputError) -> HttpResponse {
    warn!(error = %e, "Rejected visualization request");
    let mut body = serde_json::json!({
        "success": false,
        "error": e.to_string(),
    });
    if let (Some(extra), Some(obj)) = (e.diagnostics(), body.as_object_mut()) {
        if let Some(extra) = extra.as_object() {
            for (key, value) in extra {
                obj.insert(key.clone(), value.clone());
            }
        }
    }
    HttpResponse::BadRequest().json(body)
}

fn server_error(e: &VisualizeError) -> HttpResponse {
    error!(error = %e, "Visualization failed");
    HttpResponse::InternalServerError().json(VisualizeErrorResponse {
        success: false,
        error: "Failed to process visualization".to_string(),
        message: Some(e.to_string()),
        details: Some(format!("{e:?}")),
    })
}
