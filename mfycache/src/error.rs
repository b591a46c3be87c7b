//! Gestion des erreurs du cache de streaming

use thiserror::Error;

/// Type Result personnalisé pour mfycache
pub type Result<T> = std::result::Result<T, CacheError>;

/// Erreurs possibles côté cache, jobs et progression
#[derive(Error, Debug)]
pub enum CacheError {
    /// Clé de cache refusée (caractères hors `[A-Za-z0-9_-]` ou longueur invalide)
    #[error("Invalid track identifier: {0:?}")]
    InvalidKey(String),

    /// La résolution de l'URL source a échoué (mauvais identifiant, backend indisponible)
    #[error("Source resolution failed: {0}")]
    Resolution(String),

    /// Le serveur distant a répondu avec un statut d'erreur
    #[error("Remote returned HTTP {status}")]
    RemoteStatus { status: u16 },

    /// Erreur réseau pendant le transfert
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Erreur disque
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur de (dé)sérialisation d'un fichier de statut
    #[error("Status file error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Erreur d'interprétation d'un en-tête `Range`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    /// En-tête syntaxiquement invalide ou unité autre que `bytes`
    #[error("Malformed range header: {0}")]
    Malformed(String),

    /// Intervalle hors des bornes du fichier
    #[error("Range not satisfiable for a {size}-byte file")]
    Unsatisfiable { size: u64 },
}

/// Erreurs observées par un client qui attend la fin d'un job
///
/// `StartTimeout` est une erreur locale au client : le job peut encore
/// aboutir côté serveur et peupler le cache pour une tentative ultérieure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("Download did not start within {0:?}")]
    StartTimeout(std::time::Duration),

    #[error("Download failed: {0}")]
    Failed(String),

    #[error("Download still running after {0:?}")]
    Timeout(std::time::Duration),
}
