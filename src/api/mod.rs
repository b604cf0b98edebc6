//! API module - HTTP routes and handlers

pub mod handlers;
pub mod openapi;

use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;

/// Configure all API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health::health_check))
        .route(
            "/api/visualize",
            web::post().to(handlers::visualize::visualize),
        )
        // Generated artifacts carry a fixed prefix so one routing rule can
        // recognize them without tracking filenames
        .route(
            "/{filename:visualized_.*}",
            web::get().to(handlers::artifacts::serve_artifact),
        )
        // Swagger UI and OpenAPI spec
        .service(
            SwaggerUi::new("/swagger-ui/{_:.*}")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
        );
}
