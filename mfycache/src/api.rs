//! API HTTP du cache de streaming
//!
//! - `POST /api/download?trackId=` : démarre ou rejoint un téléchargement
//! - `GET /api/download/progress?trackId=` : statut courant du job
//! - `GET /api/stream?trackId=` : sert l'audio, avec support de `Range`
//!
//! Le lecteur interroge `progress` jusqu'à `done` avant de demander
//! `stream` ; un `stream` sur une piste absente déclenche le job et répond
//! `404`.

use crate::error::{CacheError, RangeError};
use crate::jobs::{JobManager, StartOutcome};
use crate::range::{unsatisfied_content_range, ByteRange};
use crate::record::{JobRecord, JobStatus};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

#[cfg(feature = "openapi")]
use utoipa::{IntoParams, ToSchema};

const MEGABYTE: f64 = 1024.0 * 1024.0;

/// Paramètre commun aux trois routes
#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct TrackQuery {
    /// Identifiant de piste Spotify
    #[serde(rename = "trackId")]
    #[cfg_attr(feature = "openapi", param(example = "4uLU6hMCjMI75M1A2tKUQC"))]
    pub track_id: Option<String>,
}

/// Réponse de `POST /api/download`
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DownloadResponse {
    pub status: StartOutcome,
}

/// Réponse de `GET /api/download/progress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ProgressResponse {
    /// Pourcentage 0..=100
    #[cfg_attr(feature = "openapi", schema(example = 42))]
    pub progress: u8,
    pub status: JobStatus,
    pub downloaded: u64,
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(example = "Downloading... 1.2MB / 3.4MB"))]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobRecord> for ProgressResponse {
    fn from(record: JobRecord) -> Self {
        let (message, error) = match record.status {
            JobStatus::NotStarted => (Some("No download in progress".to_string()), None),
            JobStatus::Downloading => (
                Some(downloading_message(record.downloaded, record.total)),
                None,
            ),
            JobStatus::Done => (Some("Ready to play!".to_string()), None),
            JobStatus::Error => (
                None,
                Some(
                    record
                        .error
                        .clone()
                        .unwrap_or_else(|| "Download failed".to_string()),
                ),
            ),
        };
        Self {
            progress: record.progress,
            status: record.status,
            downloaded: record.downloaded,
            total: record.total,
            message,
            error,
        }
    }
}

fn downloading_message(downloaded: u64, total: u64) -> String {
    let done = downloaded as f64 / MEGABYTE;
    if total > 0 {
        format!(
            "Downloading... {:.1}MB / {:.1}MB",
            done,
            total as f64 / MEGABYTE
        )
    } else {
        format!("Downloading... {:.1}MB", done)
    }
}

/// Réponse d'erreur générique
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
    /// Message descriptif
    #[cfg_attr(feature = "openapi", schema(example = "Track not ready"))]
    pub error: String,
    /// Issue du déclenchement, pour un `stream` sur une piste absente
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StartOutcome>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            status: None,
        }),
    )
        .into_response()
}

fn cache_error_response(e: &CacheError) -> Response {
    let status = match e {
        CacheError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        CacheError::Resolution(_) | CacheError::RemoteStatus { .. } | CacheError::Http(_) => {
            StatusCode::BAD_GATEWAY
        }
        CacheError::Io(_) | CacheError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Stream cache request failed: {}", e);
    }
    error_response(status, e.to_string())
}

/// Extrait `trackId` ou produit la réponse 400
#[allow(clippy::result_large_err)]
fn require_track_id(query: TrackQuery) -> Result<String, Response> {
    match query.track_id {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            "Missing trackId parameter",
        )),
    }
}

/// Démarre le téléchargement d'une piste, ou rejoint celui en cours
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/download",
    tag = "stream",
    params(TrackQuery),
    responses(
        (status = 200, description = "Téléchargement démarré, en cours ou déjà en cache", body = DownloadResponse),
        (status = 400, description = "trackId absent ou invalide", body = ErrorResponse),
        (status = 500, description = "Erreur disque", body = ErrorResponse),
        (status = 502, description = "Source introuvable pour cette piste", body = ErrorResponse)
    )
))]
pub async fn trigger_download(
    State(manager): State<JobManager>,
    Query(query): Query<TrackQuery>,
) -> Response {
    let key = match require_track_id(query) {
        Ok(key) => key,
        Err(response) => return response,
    };

    match manager.start_or_join(&key).await {
        Ok(status) => (StatusCode::OK, Json(DownloadResponse { status })).into_response(),
        Err(e) => cache_error_response(&e),
    }
}

/// Retourne la progression du téléchargement d'une piste
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/download/progress",
    tag = "stream",
    params(TrackQuery),
    responses(
        (status = 200, description = "Statut courant", body = ProgressResponse),
        (status = 400, description = "trackId absent ou invalide", body = ErrorResponse)
    )
))]
pub async fn download_progress(
    State(manager): State<JobManager>,
    Query(query): Query<TrackQuery>,
) -> Response {
    let key = match require_track_id(query) {
        Ok(key) => key,
        Err(response) => return response,
    };

    match manager.status(&key).await {
        Ok(record) => (StatusCode::OK, Json(ProgressResponse::from(record))).into_response(),
        Err(e) => cache_error_response(&e),
    }
}

/// Sert l'audio d'une piste en cache
///
/// Sans entrée fraîche, le téléchargement est déclenché et la réponse est
/// `404` avec l'issue du déclenchement. L'en-tête `X-Download: true`
/// demande un `Content-Disposition: attachment`.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/stream",
    tag = "stream",
    params(
        TrackQuery,
        ("Range" = Option<String>, Header, description = "Plage d'octets, ex: bytes=0-99"),
        ("X-Download" = Option<String>, Header, description = "true pour un téléchargement en pièce jointe")
    ),
    responses(
        (status = 200, description = "Fichier complet"),
        (status = 206, description = "Plage demandée"),
        (status = 400, description = "trackId absent ou invalide", body = ErrorResponse),
        (status = 404, description = "Piste pas encore en cache", body = ErrorResponse),
        (status = 502, description = "Source introuvable pour cette piste", body = ErrorResponse),
        (status = 416, description = "Plage invalide"),
        (status = 500, description = "Erreur de lecture", body = ErrorResponse)
    )
))]
pub async fn stream_track(
    State(manager): State<JobManager>,
    Query(query): Query<TrackQuery>,
    headers: HeaderMap,
) -> Response {
    let key = match require_track_id(query) {
        Ok(key) => key,
        Err(response) => return response,
    };

    let path = match manager.cached_path(&key).await {
        Ok(Some(path)) => path,
        Ok(None) => match trigger_on_miss(&manager, &key).await {
            Ok(path) => path,
            Err(response) => return response,
        },
        Err(e) => return cache_error_response(&e),
    };

    let attachment = headers
        .get("x-download")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let range = headers.get(header::RANGE).map(|v| v.to_str().unwrap_or(""));

    match serve_file(&path, &key, manager.cache().extension(), range, attachment).await {
        Ok(response) => response,
        Err(e) => {
            warn!(track_id = %key, "Cannot read cached file: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error reading file")
        }
    }
}

/// Déclenche le job d'une piste absente
///
/// Retourne le chemin si un job concurrent vient de peupler le cache.
#[allow(clippy::result_large_err)]
async fn trigger_on_miss(manager: &JobManager, key: &str) -> Result<std::path::PathBuf, Response> {
    let outcome = manager
        .start_or_join(key)
        .await
        .map_err(|e| cache_error_response(&e))?;

    if outcome == StartOutcome::Cached {
        if let Ok(Some(path)) = manager.cached_path(key).await {
            return Ok(path);
        }
    }

    debug!(track_id = %key, "Stream requested before download ({})", outcome.as_str());
    Err((
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Track not ready".to_string(),
            status: Some(outcome),
        }),
    )
        .into_response())
}

/// Type MIME d'un fichier audio selon son extension
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "m4a" | "mp4" | "aac" => "audio/mp4",
        "ogg" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

async fn serve_file(
    path: &Path,
    key: &str,
    extension: &str,
    range: Option<&str>,
    attachment: bool,
) -> std::io::Result<Response> {
    let mut file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();

    let disposition = format!(
        "{}; filename=\"{}.{}\"",
        if attachment { "attachment" } else { "inline" },
        key,
        extension
    );

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type_for(extension))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONTENT_DISPOSITION, disposition);

    let Some(range) = range else {
        let body = Body::from_stream(ReaderStream::new(file));
        return Ok(builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, size)
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()));
    };

    let range = match ByteRange::parse(range, size) {
        Ok(range) => range,
        Err(e) => {
            if let RangeError::Malformed(ref header) = e {
                debug!(track_id = %key, "Rejecting range header {:?}", header);
            }
            return Ok(builder
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, unsatisfied_content_range(size))
                .body(Body::empty())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()));
        }
    };

    file.seek(std::io::SeekFrom::Start(range.start)).await?;
    let body = Body::from_stream(ReaderStream::new(file.take(range.len())));
    Ok(builder
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_RANGE, range.content_range())
        .header(header::CONTENT_LENGTH, range.len())
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

/// Crée le router des trois routes du cache de streaming
///
/// Les chemins sont absolus : le router se monte à la racine du serveur.
pub fn create_router(manager: JobManager) -> Router {
    Router::new()
        .route("/api/download", post(trigger_download))
        .route("/api/download/progress", get(download_progress))
        .route("/api/stream", get(stream_track))
        .with_state(manager)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_messages() {
        let response = ProgressResponse::from(JobRecord::not_started());
        assert_eq!(response.message.as_deref(), Some("No download in progress"));

        let response = ProgressResponse::from(JobRecord::downloading(1024 * 1024, 4 * 1024 * 1024));
        assert_eq!(
            response.message.as_deref(),
            Some("Downloading... 1.0MB / 4.0MB")
        );
        assert_eq!(response.progress, 25);

        let response = ProgressResponse::from(JobRecord::downloading(512 * 1024, 0));
        assert_eq!(response.message.as_deref(), Some("Downloading... 0.5MB"));

        let response = ProgressResponse::from(JobRecord::done(10));
        assert_eq!(response.message.as_deref(), Some("Ready to play!"));
        assert_eq!(response.progress, 100);
    }

    #[test]
    fn test_error_defaults_message() {
        let mut record = JobRecord::failed("x", 0, 0);
        record.error = None;
        let response = ProgressResponse::from(record);
        assert_eq!(response.error.as_deref(), Some("Download failed"));
        assert!(response.message.is_none());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("mp3"), "audio/mpeg");
        assert_eq!(content_type_for("FLAC"), "audio/flac");
        assert_eq!(content_type_for("opus"), "audio/ogg");
        assert_eq!(content_type_for("xyz"), "application/octet-stream");
    }
}
