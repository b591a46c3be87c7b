//! Client Spotify Web API (flux client credentials)

use crate::error::{Result, SpotifyError};
use crate::models::{SearchResponse, TokenResponse, Track, TrackSummary};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// URL du service d'authentification Spotify
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// URL de base de l'API Spotify
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Nombre de résultats d'une recherche
const SEARCH_LIMIT: &str = "10";

/// Marge avant expiration à partir de laquelle le token est renouvelé
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Client Spotify haut-niveau
///
/// Le token d'accès est obtenu au premier appel puis réutilisé jusqu'à
/// une minute avant son expiration.
#[derive(Debug)]
pub struct SpotifyClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    /// Crée un client pour l'API publique Spotify
    ///
    /// # Exemple
    ///
    /// ```no_run
    /// use mfyspotify::SpotifyClient;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let client = SpotifyClient::new("client_id", "client_secret")?;
    ///     for track in client.search("daft punk").await? {
    ///         println!("{} - {}", track.artist, track.name);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        Self::with_endpoints(client_id, client_secret, TOKEN_URL, API_BASE_URL)
    }

    /// Crée un client sur des URLs explicites (serveur de test, proxy)
    pub fn with_endpoints(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(SpotifyError::Configuration(
                "client_id and client_secret are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            client_id,
            client_secret,
            token_url: token_url.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        })
    }

    /// Retourne un token valide, en le renouvelant si besoin
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting Spotify access token");
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let token: TokenResponse = handle_response(response).await?;

        let value = token.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.api_base, endpoint);
        debug!("GET {} with {} params", url, params.len());

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(params)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            // Token révoqué côté Spotify : le prochain appel en redemandera un
            *self.token.lock().await = None;
        }
        handle_response(response).await
    }

    /// Recherche des pistes (10 résultats au plus)
    pub async fn search(&self, query: &str) -> Result<Vec<TrackSummary>> {
        let response: SearchResponse = self
            .get(
                "/search",
                &[("q", query), ("type", "track"), ("limit", SEARCH_LIMIT)],
            )
            .await?;
        Ok(response.tracks.items.iter().map(TrackSummary::from).collect())
    }

    /// Récupère les informations complètes d'une piste
    pub async fn get_track(&self, track_id: &str) -> Result<Track> {
        if mfycache::validate_key(track_id).is_err() {
            return Err(SpotifyError::InvalidId(track_id.to_string()));
        }
        self.get(&format!("/tracks/{}", track_id), &[]).await
    }
}

/// Traite la réponse HTTP
pub(crate) async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let status_code = status.as_u16();

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        warn!("Spotify API error ({}): {}", status_code, error_text);
        return Err(SpotifyError::from_status_code(status_code, error_text));
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        warn!("Failed to parse response: {}", e);
        SpotifyError::JsonParse(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials() {
        assert!(matches!(
            SpotifyClient::new("", "secret"),
            Err(SpotifyError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_track_id_is_rejected_locally() {
        let client = SpotifyClient::with_endpoints("id", "secret", "http://127.0.0.1:9", "http://127.0.0.1:9")
            .unwrap();
        assert!(matches!(
            client.get_track("../me").await,
            Err(SpotifyError::InvalidId(_))
        ));
    }
}
