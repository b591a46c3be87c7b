//! # mfycache - Cache de streaming audio pour Musify
//!
//! Cette crate télécharge les pistes audio à la demande, publie la
//! progression des téléchargements et sert les fichiers terminés avec
//! support des requêtes `Range`.
//!
//! ## Architecture
//!
//! ```text
//! mfycache
//!     ├── progress.rs   - ProgressStore : statut des jobs (mémoire + fichiers JSON)
//!     ├── cache_dir.rs  - CacheDirectory : fichiers audio, expiration par âge
//!     ├── jobs.rs       - JobManager : un seul transfert actif par piste
//!     ├── runner.rs     - JobRunner : tâches de fond et canal d'événements
//!     ├── download.rs   - transfert HTTP en flux vers un fichier temporaire
//!     ├── range.rs      - interprétation de l'en-tête Range
//!     ├── poll.rs       - attente côté client de la fin d'un job
//!     └── api.rs        - routes axum (download, progress, stream)
//! ```
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use mfycache::{JobManager, TemplateResolver, StartOutcome};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = Arc::new(TemplateResolver::new("http://files.local/{key}.mp3"));
//!     let manager = JobManager::open("./cache_audio", "mp3", Duration::from_secs(1800), resolver)?;
//!
//!     match manager.start_or_join("4uLU6hMCjMI75M1A2tKUQC").await? {
//!         StartOutcome::Cached => println!("Déjà disponible"),
//!         StartOutcome::Started => println!("Téléchargement lancé"),
//!         StartOutcome::AlreadyDownloading => println!("Téléchargement en cours"),
//!     }
//!
//!     let record = mfycache::wait_for_completion(
//!         &manager,
//!         "4uLU6hMCjMI75M1A2tKUQC",
//!         Default::default(),
//!     )
//!     .await?;
//!     println!("{} octets", record.downloaded);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `config` (défaut) : `StreamCacheConfigExt` pour `mfyconfig::Config`
//! - `openapi` : schémas et documentation utoipa
//! - `server` : `StreamCacheExt` pour `mfyserver::Server`

pub mod api;
pub mod cache_dir;
pub mod download;
pub mod error;
pub mod jobs;
pub mod poll;
pub mod progress;
pub mod range;
pub mod record;
pub mod resolver;
pub mod runner;

#[cfg(feature = "config")]
pub mod config_ext;

#[cfg(feature = "openapi")]
pub mod openapi;

#[cfg(feature = "server")]
pub mod server_ext;

pub use api::create_router;
pub use cache_dir::{validate_key, CacheDirectory, DEFAULT_MAX_AGE};
pub use error::{CacheError, PollError, RangeError, Result};
pub use jobs::{JobManager, JobOptions, StartOutcome};
pub use poll::{wait_for_completion, PollOptions};
pub use progress::ProgressStore;
pub use range::ByteRange;
pub use record::{JobRecord, JobStatus};
pub use resolver::{SourceResolver, TemplateResolver};
pub use runner::{JobEvent, JobRunner};

#[cfg(feature = "config")]
pub use config_ext::StreamCacheConfigExt;

#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;

#[cfg(feature = "server")]
pub use server_ext::StreamCacheExt;
