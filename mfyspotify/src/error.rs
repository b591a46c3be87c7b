//! Gestion des erreurs pour le client Spotify

use thiserror::Error;

/// Type Result personnalisé pour mfyspotify
pub type Result<T> = std::result::Result<T, SpotifyError>;

/// Erreurs possibles lors de l'utilisation du client Spotify
#[derive(Error, Debug)]
pub enum SpotifyError {
    /// Token refusé ou credentials invalides (401/403)
    #[error("Spotify rejected the credentials: {0}")]
    Unauthorized(String),

    /// Piste ou chanson inconnue (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identifiant de piste refusé avant tout appel réseau
    #[error("Invalid track identifier: {0:?}")]
    InvalidId(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response body: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Client ID / secret absents
    #[error("Spotify configuration error: {0}")]
    Configuration(String),

    /// Erreur de l'API Spotify
    #[error("Spotify API error (code {code}): {message}")]
    ApiError { code: u16, message: String },

    /// 429 de l'API Web
    #[error("Spotify rate limit reached")]
    RateLimitExceeded,

    /// Le backend spotDL a refusé ou raté la préparation du fichier
    #[error("spotDL backend error: {0}")]
    Backend(String),
}

impl SpotifyError {
    /// Classe une réponse HTTP en échec
    pub fn from_status_code(code: u16, message: impl Into<String>) -> Self {
        match code {
            401 | 403 => Self::Unauthorized(message.into()),
            404 => Self::NotFound(message.into()),
            429 => Self::RateLimitExceeded,
            _ => Self::ApiError {
                code,
                message: message.into(),
            },
        }
    }

    /// Vrai si les credentials sont en cause
    pub fn is_auth_error(&self) -> bool {
        matches!(self, SpotifyError::Unauthorized(_))
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, SpotifyError::RateLimitExceeded)
    }
}

impl From<SpotifyError> for mfycache::CacheError {
    fn from(e: SpotifyError) -> Self {
        mfycache::CacheError::Resolution(e.to_string())
    }
}
