//! Exécution des transferts en tâche de fond
//!
//! Les handlers HTTP ne lancent jamais de tâche détachée : ils soumettent
//! un job au `JobRunner`, qui garde la trace des tâches en vol et publie
//! l'issue de chacune sur un canal broadcast.

use std::future::Future;
use tokio::sync::broadcast;
use tokio_util::task::TaskTracker;

const EVENT_CAPACITY: usize = 256;

/// Issue d'un job, publiée une fois par job terminé
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Finished { key: String, bytes: u64 },
    Failed { key: String, error: String },
}

impl JobEvent {
    pub fn key(&self) -> &str {
        match self {
            JobEvent::Finished { key, .. } | JobEvent::Failed { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobRunner {
    tracker: TaskTracker,
    events: broadcast::Sender<JobEvent>,
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunner {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tracker: TaskTracker::new(),
            events,
        }
    }

    /// S'abonne aux issues des jobs soumis après l'appel
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Soumet un job ; son résultat est publié sur le canal d'événements
    pub fn submit<F>(&self, job: F)
    where
        F: Future<Output = JobEvent> + Send + 'static,
    {
        let events = self.events.clone();
        self.tracker.spawn(async move {
            let event = job.await;
            // Aucun abonné : l'issue reste consultable via le ProgressStore
            let _ = events.send(event);
        });
    }

    /// Nombre de jobs en vol
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// N'accepte plus de job et attend la fin de ceux en vol
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_publishes_event() {
        let runner = JobRunner::new();
        let mut events = runner.subscribe();

        runner.submit(async {
            JobEvent::Finished {
                key: "abc".into(),
                bytes: 42,
            }
        });

        let event = events.recv().await.unwrap();
        assert_eq!(event.key(), "abc");
        assert_eq!(
            event,
            JobEvent::Finished {
                key: "abc".into(),
                bytes: 42
            }
        );
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_jobs() {
        let runner = JobRunner::new();
        runner.submit(async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            JobEvent::Failed {
                key: "abc".into(),
                error: "boom".into(),
            }
        });
        assert_eq!(runner.active(), 1);

        runner.shutdown().await;
        assert_eq!(runner.active(), 0);
    }
}
