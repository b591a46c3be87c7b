//! Documentation OpenAPI des routes du cache de streaming

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::trigger_download,
        crate::api::download_progress,
        crate::api::stream_track,
    ),
    components(
        schemas(
            crate::api::DownloadResponse,
            crate::api::ProgressResponse,
            crate::api::ErrorResponse,
            crate::jobs::StartOutcome,
            crate::record::JobStatus,
        )
    ),
    tags(
        (name = "stream", description = "Téléchargement et streaming des pistes audio")
    ),
    info(
        title = "Musify Stream API",
        version = "0.1.0",
        description = "Cache de pistes audio avec suivi de progression et lecture par plages",
        contact(
            name = "Musify",
        ),
        license(
            name = "MIT",
        ),
    )
)]
pub struct ApiDoc;
