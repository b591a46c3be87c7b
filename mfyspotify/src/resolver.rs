//! Résolution des pistes Spotify via un backend spotDL
//!
//! Le backend expose :
//!
//! - `GET /api/search?query=<url spotify>` : `{songs: [{cached, file_path, ...}]}`
//! - `POST /api/download?url=<url spotify>` : `{status: "success", file_path}`
//! - `GET /api/file/<nom>` : le fichier audio
//!
//! Le `POST` est synchrone côté backend (spotDL télécharge avant de
//! répondre) et `start_or_join` attend la résolution : la requête qui
//! déclenche un téléchargement attend donc que spotDL ait préparé le
//! fichier, et reçoit directement son erreur.

use crate::client::handle_response;
use crate::error::{Result, SpotifyError};
use crate::models::{SpotdlDownloadResponse, SpotdlSearchResponse};
use async_trait::async_trait;
use mfycache::SourceResolver;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info};

/// Préfixe des URLs de pistes Spotify
pub const SPOTIFY_TRACK_URL: &str = "https://open.spotify.com/track/";

/// Timeout d'une préparation de fichier par le backend
const BACKEND_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct SpotdlResolver {
    client: Client,
    backend: Url,
}

impl SpotdlResolver {
    /// # Arguments
    ///
    /// * `backend_url` - URL racine du backend (ex: `http://localhost:5000`)
    pub fn new(backend_url: &str) -> Result<Self> {
        let backend = Url::parse(backend_url).map_err(|e| {
            SpotifyError::Configuration(format!("Invalid backend URL {}: {}", backend_url, e))
        })?;
        if backend.cannot_be_a_base() {
            return Err(SpotifyError::Configuration(format!(
                "Backend URL {} cannot be a base",
                backend_url
            )));
        }
        let client = Client::builder().timeout(BACKEND_TIMEOUT).build()?;
        Ok(Self { client, backend })
    }

    pub fn backend(&self) -> &Url {
        &self.backend
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.backend.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Chemin du fichier côté backend, téléchargé si besoin
    pub async fn backend_file_path(&self, track_id: &str) -> Result<String> {
        let track_url = format!("{}{}", SPOTIFY_TRACK_URL, track_id);

        let response = self
            .client
            .get(self.endpoint(&["api", "search"]))
            .query(&[("query", track_url.as_str())])
            .send()
            .await?;
        let search: SpotdlSearchResponse = handle_response(response).await?;

        let song = search
            .songs
            .into_iter()
            .next()
            .ok_or_else(|| SpotifyError::NotFound("Song not found".to_string()))?;

        if song.cached {
            if let Some(path) = song.file_path.filter(|p| !p.is_empty()) {
                debug!(track_id = %track_id, "Backend already has {}", path);
                return Ok(path);
            }
        }

        info!(track_id = %track_id, "Asking backend to download track");
        let response = self
            .client
            .post(self.endpoint(&["api", "download"]))
            .query(&[("url", track_url.as_str())])
            .send()
            .await?;
        let download: SpotdlDownloadResponse = handle_response(response).await?;

        match (download.status.as_str(), download.file_path) {
            ("success", Some(path)) if !path.is_empty() => Ok(path),
            _ => Err(SpotifyError::Backend(
                download
                    .error
                    .unwrap_or_else(|| "Download failed".to_string()),
            )),
        }
    }

    /// URL de téléchargement d'un fichier du backend
    pub fn file_url(&self, file_path: &str) -> Url {
        let name = file_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(file_path);
        self.endpoint(&["api", "file", name])
    }
}

#[async_trait]
impl SourceResolver for SpotdlResolver {
    async fn resolve(&self, key: &str) -> mfycache::Result<String> {
        let path = self.backend_file_path(key).await?;
        Ok(self.file_url(&path).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url_encodes_basename() {
        let resolver = SpotdlResolver::new("http://localhost:5000/").unwrap();
        let url = resolver.file_url("/data/music/Daft Punk - Get Lucky.mp3");
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/file/Daft%20Punk%20-%20Get%20Lucky.mp3"
        );
    }

    #[test]
    fn test_file_url_with_base_path() {
        let resolver = SpotdlResolver::new("http://backend.local/spotdl").unwrap();
        let url = resolver.file_url("C:\\music\\song#1.mp3");
        assert_eq!(url.as_str(), "http://backend.local/spotdl/api/file/song%231.mp3");
    }

    #[test]
    fn test_invalid_backend_url() {
        assert!(matches!(
            SpotdlResolver::new("not a url"),
            Err(SpotifyError::Configuration(_))
        ));
    }
}
