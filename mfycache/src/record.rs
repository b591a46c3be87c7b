//! Enregistrement de progression d'un job, indexé par identifiant de piste

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Longueur maximale, en octets, du message d'erreur conservé
pub const MAX_ERROR_LEN: usize = 512;

/// État d'un job de téléchargement
///
/// Transitions : `not_started → downloading → done | error`.
/// `done` et `error` sont terminaux pour une instance de job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    NotStarted,
    Downloading,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::NotStarted => "not_started",
            JobStatus::Downloading => "downloading",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

/// Statut courant d'un job
///
/// Un enregistrement est toujours remplacé en entier, jamais modifié sur place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobRecord {
    pub status: JobStatus,
    /// Pourcentage 0..=100
    pub progress: u8,
    pub downloaded: u64,
    /// 0 si la taille est inconnue (transfert chunked)
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Millisecondes depuis l'epoch de la dernière écriture
    #[serde(default)]
    pub updated_at: i64,
}

impl JobRecord {
    pub fn not_started() -> Self {
        Self::default()
    }

    pub fn downloading(downloaded: u64, total: u64) -> Self {
        Self {
            status: JobStatus::Downloading,
            progress: percent(downloaded, total),
            downloaded,
            total,
            error: None,
            updated_at: now_millis(),
        }
    }

    pub fn done(size: u64) -> Self {
        Self {
            status: JobStatus::Done,
            progress: 100,
            downloaded: size,
            total: size,
            error: None,
            updated_at: now_millis(),
        }
    }

    /// Conserve les compteurs atteints au moment de l'échec
    ///
    /// Le message est tronqué à [`MAX_ERROR_LEN`] octets.
    pub fn failed(message: impl Into<String>, downloaded: u64, total: u64) -> Self {
        let mut message = message.into();
        truncate_at_char_boundary(&mut message, MAX_ERROR_LEN);
        Self {
            status: JobStatus::Error,
            progress: percent(downloaded, total),
            downloaded,
            total,
            error: Some(message),
            updated_at: now_millis(),
        }
    }

    /// Âge de l'enregistrement en millisecondes
    pub fn age_millis(&self) -> i64 {
        now_millis().saturating_sub(self.updated_at)
    }
}

/// Pourcentage entier borné à 99 tant que le transfert n'est pas confirmé
///
/// Seul `done` publie 100.
pub fn percent(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = downloaded.saturating_mul(100) / total;
    pct.min(99) as u8
}

fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
