//! Routes HTTP de recherche et de métadonnées
//!
//! - `GET /api/search?query=` : liste de `TrackSummary`
//! - `GET /api/track/{id}` : `Track` complet

use crate::client::SpotifyClient;
use crate::error::SpotifyError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

#[cfg(feature = "openapi")]
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct SearchQuery {
    /// Texte recherché (titre, artiste, album)
    pub query: Option<String>,
}

/// Réponse d'erreur générique
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn spotify_error_response(e: &SpotifyError) -> Response {
    let status = match e {
        SpotifyError::InvalidId(_) => StatusCode::BAD_REQUEST,
        SpotifyError::NotFound(_) => StatusCode::NOT_FOUND,
        SpotifyError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        SpotifyError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    };
    warn!("Spotify request failed: {}", e);
    error_response(status, e.to_string())
}

/// Recherche des pistes
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/search",
    tag = "spotify",
    params(SearchQuery),
    responses(
        (status = 200, description = "Pistes trouvées", body = Vec<crate::models::TrackSummary>),
        (status = 400, description = "Paramètre query absent", body = ErrorResponse),
        (status = 502, description = "Erreur de l'API Spotify", body = ErrorResponse)
    )
))]
pub async fn search_tracks(
    State(client): State<Arc<SpotifyClient>>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let query = match params.query.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => return error_response(StatusCode::BAD_REQUEST, "Missing query parameter"),
    };

    match client.search(&query).await {
        Ok(tracks) => Json(tracks).into_response(),
        Err(e) => spotify_error_response(&e),
    }
}

/// Informations complètes d'une piste
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/track/{id}",
    tag = "spotify",
    params(
        ("id" = String, Path, description = "Identifiant Spotify de la piste")
    ),
    responses(
        (status = 200, description = "Piste", body = crate::models::Track),
        (status = 400, description = "Identifiant invalide", body = ErrorResponse),
        (status = 404, description = "Piste inconnue", body = ErrorResponse)
    )
))]
pub async fn get_track(
    State(client): State<Arc<SpotifyClient>>,
    Path(id): Path<String>,
) -> Response {
    match client.get_track(&id).await {
        Ok(track) => Json(track).into_response(),
        Err(e) => spotify_error_response(&e),
    }
}

/// Crée le router des routes Spotify (chemins absolus, à monter à la racine)
pub fn create_router(client: Arc<SpotifyClient>) -> Router {
    Router::new()
        .route("/api/search", get(search_tracks))
        .route("/api/track/{id}", get(get_track))
        .with_state(client)
}
