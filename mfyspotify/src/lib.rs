//! # mfyspotify - Métadonnées Spotify et source audio spotDL
//!
//! - [`SpotifyClient`] : recherche et fiche de piste via l'API Web Spotify
//! - [`SpotdlResolver`] : implémente `mfycache::SourceResolver` en demandant
//!   le fichier audio à un backend spotDL
//! - [`api`] : routes axum `/api/search` et `/api/track/{id}`

pub mod api;
pub mod client;
pub mod error;
pub mod models;
pub mod resolver;

#[cfg(feature = "config")]
pub mod config_ext;

#[cfg(feature = "openapi")]
pub mod openapi;

#[cfg(feature = "server")]
pub mod server_ext;

pub use client::SpotifyClient;
pub use error::{Result, SpotifyError};
pub use models::{Track, TrackSummary};
pub use resolver::SpotdlResolver;

#[cfg(feature = "config")]
pub use config_ext::SpotifyConfigExt;

#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;

#[cfg(feature = "server")]
pub use server_ext::SpotifyExt;
