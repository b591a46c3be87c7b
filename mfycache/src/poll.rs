//! Attente de la fin d'un job par interrogation périodique
//!
//! Contrat côté client : un job qui reste `not_started` au-delà de
//! `start_timeout` est considéré comme perdu pour ce client, même si le
//! serveur peut encore le terminer plus tard.

use crate::error::PollError;
use crate::jobs::JobManager;
use crate::record::{JobRecord, JobStatus};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub interval: Duration,
    pub start_timeout: Duration,
    pub overall_timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            start_timeout: Duration::from_secs(10),
            overall_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Interroge `manager` jusqu'à ce que `key` soit `done`
///
/// Retourne l'enregistrement terminal. Une erreur de lecture du statut est
/// traitée comme un `not_started` transitoire.
pub async fn wait_for_completion(
    manager: &JobManager,
    key: &str,
    options: PollOptions,
) -> Result<JobRecord, PollError> {
    let started = Instant::now();
    let mut seen_activity = false;

    loop {
        let record = match manager.status(key).await {
            Ok(record) => record,
            Err(e) => {
                debug!(track_id = %key, "Status read failed while polling: {}", e);
                JobRecord::not_started()
            }
        };

        match record.status {
            JobStatus::Done => return Ok(record),
            JobStatus::Error => {
                let message = record
                    .error
                    .unwrap_or_else(|| "Download failed".to_string());
                return Err(PollError::Failed(message));
            }
            JobStatus::Downloading => seen_activity = true,
            JobStatus::NotStarted => {
                if !seen_activity && started.elapsed() >= options.start_timeout {
                    return Err(PollError::StartTimeout(options.start_timeout));
                }
            }
        }

        if started.elapsed() >= options.overall_timeout {
            return Err(PollError::Timeout(options.overall_timeout));
        }
        tokio::time::sleep(options.interval).await;
    }
}
