//! Extension pour intégrer Spotify et le backend spotDL dans mfyconfig
//!
//! ```yaml
//! backend:
//!   url: "http://localhost:5000"
//! spotify:
//!   client_id: ""
//!   client_secret: ""
//! ```

use crate::client::SpotifyClient;
use crate::resolver::SpotdlResolver;
use anyhow::Result;
use mfyconfig::Config;
use tracing::warn;

pub trait SpotifyConfigExt {
    /// Client ID Spotify, `None` si absent ou vide
    fn get_spotify_client_id(&self) -> Option<String>;

    /// Client secret Spotify, `None` si absent ou vide
    fn get_spotify_client_secret(&self) -> Option<String>;

    fn set_spotify_credentials(&self, client_id: String, client_secret: String) -> Result<()>;

    /// Crée le client Spotify, ou `None` si les credentials manquent
    fn create_spotify_client(&self) -> Result<Option<SpotifyClient>>;

    /// Crée le résolveur pointant sur `backend.url`
    fn create_spotdl_resolver(&self) -> Result<SpotdlResolver>;
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl SpotifyConfigExt for Config {
    fn get_spotify_client_id(&self) -> Option<String> {
        non_empty(self.get_string_or(&["spotify", "client_id"], ""))
    }

    fn get_spotify_client_secret(&self) -> Option<String> {
        non_empty(self.get_string_or(&["spotify", "client_secret"], ""))
    }

    fn set_spotify_credentials(&self, client_id: String, client_secret: String) -> Result<()> {
        self.set_value(&["spotify", "client_id"], client_id.into())?;
        self.set_value(&["spotify", "client_secret"], client_secret.into())
    }

    fn create_spotify_client(&self) -> Result<Option<SpotifyClient>> {
        match (self.get_spotify_client_id(), self.get_spotify_client_secret()) {
            (Some(id), Some(secret)) => Ok(Some(SpotifyClient::new(id, secret)?)),
            _ => {
                warn!("Spotify credentials not configured, search is disabled");
                Ok(None)
            }
        }
    }

    fn create_spotdl_resolver(&self) -> Result<SpotdlResolver> {
        Ok(SpotdlResolver::new(&self.get_backend_url())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        assert!(config.get_spotify_client_id().is_none());
        assert!(config.create_spotify_client().unwrap().is_none());

        config
            .set_spotify_credentials("abc".into(), "def".into())
            .unwrap();
        assert_eq!(config.get_spotify_client_id().as_deref(), Some("abc"));
        assert!(config.create_spotify_client().unwrap().is_some());
    }

    #[test]
    fn test_default_resolver_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        let resolver = config.create_spotdl_resolver().unwrap();
        assert_eq!(resolver.backend().as_str(), "http://localhost:5000/");
    }
}
