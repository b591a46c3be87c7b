//! # mfyserver - Serveur web haut niveau basé sur Axum
//!
//! Cette crate fournit une abstraction simple pour composer le serveur HTTP de Musify
//! à partir de routers fournis par les autres crates de la workspace.
//!
//! ## Fonctionnalités
//!
//! - **API de haut niveau** : routes JSON, handlers avec état, sous-routers
//! - **Documentation OpenAPI** : Swagger UI par API enregistrée
//! - **Logs** : buffer circulaire consultable via `/log-dump` et `/log-sse`
//! - **Arrêt gracieux** : gestion propre de l'arrêt sur Ctrl+C
//!
//! ## Extension
//!
//! Les autres crates ajoutent leurs routes via des traits d'extension implémentés
//! pour [`Server`] (ex: `mfycache::StreamCacheExt`, `mfyspotify::SpotifyExt`),
//! sans que `mfyserver` ne dépende d'elles.
//!
//! ## Exemple d'utilisation
//!
//! ```rust,no_run
//! use mfyserver::ServerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = ServerBuilder::new("Musify", "localhost", 3000).build();
//!
//!     server.add_route("/info", || async {
//!         serde_json::json!({"status": "ok"})
//!     }).await;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LogState, LoggingOptions, log_dump, log_sse};
pub use server::{Server, ServerBuilder, ServerInfo};
