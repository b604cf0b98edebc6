//! OpenAPI 3.0 specification definition

use utoipa::OpenApi;

use crate::api::handlers::{
    health::HealthResponse,
    visualize::{VisualizeErrorResponse, VisualizeResponse},
};
use crate::domain::VisualizationMode;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tile Visualizer API",
        version = "1.0.0",
        description = "Room visualization service: floor and wall material replacement via a generative image provider",
        contact(
            name = "API Support",
            email = "support@example.com"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "visualization", description = "Visualization and artifact endpoints")
    ),
    paths(
        crate::api::handlers::health::health_check,
        crate::api::handlers::visualize::visualize,
        crate::api::handlers::artifacts::serve_artifact,
    ),
    components(
        schemas(
            HealthResponse,
            VisualizeResponse,
            VisualizeErrorResponse,
            VisualizationMode,
        )
    )
)]
pub struct ApiDoc;
