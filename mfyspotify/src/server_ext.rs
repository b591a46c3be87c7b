//! Extension mfyserver : monte les routes de recherche Spotify

use crate::api::create_router;
use crate::client::SpotifyClient;
use std::sync::Arc;
use utoipa::OpenApi;

/// Trait pour étendre un serveur HTTP avec la recherche Spotify
pub trait SpotifyExt {
    /// Enregistre `/api/search` et `/api/track/{id}`
    async fn init_spotify(&mut self, client: Arc<SpotifyClient>);
}

impl SpotifyExt for mfyserver::Server {
    async fn init_spotify(&mut self, client: Arc<SpotifyClient>) {
        self.add_router("/", create_router(client)).await;
        self.add_api_docs(crate::ApiDoc::openapi(), "spotify").await;
    }
}
