//! Documentation OpenAPI des routes Spotify

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(crate::api::search_tracks, crate::api::get_track),
    components(
        schemas(
            crate::models::TrackSummary,
            crate::models::Track,
            crate::models::Artist,
            crate::models::Album,
            crate::models::Image,
            crate::models::ExternalUrls,
            crate::api::ErrorResponse,
        )
    ),
    tags(
        (name = "spotify", description = "Recherche et métadonnées Spotify")
    ),
    info(
        title = "Musify Spotify API",
        version = "0.1.0",
        description = "Recherche de pistes via l'API Spotify",
    )
)]
pub struct ApiDoc;
