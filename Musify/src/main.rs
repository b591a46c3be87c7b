use mfycache::{JobEvent, StreamCacheExt};
use mfyconfig::get_config;
use mfyserver::{LoggingOptions, ServerBuilder};
use mfyspotify::{SpotifyConfigExt, SpotifyExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Période du balayage des entrées expirées
const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Délai laissé aux téléchargements en cours à l'arrêt
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Infrastructure HTTP ==========
    let config = get_config();
    let mut server = ServerBuilder::new_configured().build();
    server.init_logging(LoggingOptions::from_config()).await;

    info!("Configuration loaded from {}", config.dir().display());

    server
        .add_route("/info", || async {
            serde_json::json!({"name": "Musify", "version": env!("CARGO_PKG_VERSION")})
        })
        .await;

    // ========== PHASE 2 : Cache de streaming ==========
    info!("Initializing stream cache...");
    let resolver = Arc::new(config.create_spotdl_resolver()?);
    info!("spotDL backend: {}", resolver.backend());
    let manager = server.init_stream_cache_configured(resolver).await?;

    match manager.sweep().await {
        Ok(evicted) if !evicted.is_empty() => {
            info!("Removed {} expired track(s) at startup", evicted.len())
        }
        Ok(_) => {}
        Err(e) => warn!("Initial cache sweep failed: {}", e),
    }
    let sweeper = manager.spawn_sweeper(SWEEP_PERIOD);

    // Canal d'erreurs des jobs
    let mut events = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(JobEvent::Failed { key, error }) => {
                    warn!(track_id = %key, "Background download failed: {}", error)
                }
                Ok(JobEvent::Finished { .. }) => {}
                Err(RecvError::Lagged(n)) => warn!("Missed {} job events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // ========== PHASE 3 : Recherche Spotify ==========
    match config.create_spotify_client()? {
        Some(client) => {
            info!("Spotify search enabled");
            server.init_spotify(Arc::new(client)).await;
        }
        None => info!("Set spotify.client_id and spotify.client_secret to enable search"),
    }

    // ========== PHASE 4 : Démarrage du serveur ==========
    info!("Starting HTTP server...");
    server.start().await?;

    info!("Musify is ready!");
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    sweeper.abort();
    if tokio::time::timeout(SHUTDOWN_GRACE, manager.shutdown())
        .await
        .is_err()
    {
        warn!("Downloads still running at shutdown, partial files will be swept");
    }

    Ok(())
}
