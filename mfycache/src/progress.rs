//! Progress Store : statut des jobs partagé entre processus
//!
//! Chaque écriture met à jour la map mémoire du processus et un fichier
//! `<dir>/<key>.json` écrit atomiquement (fichier temporaire puis `rename`).
//! Une lecture consulte d'abord la mémoire ; une entrée mémoire plus vieille
//! que `memory_ttl` est relue depuis le fichier, ce qui borne le retard
//! d'un processus sur les écritures des autres.
//!
//! Les accès disque sont synchrones, y compris depuis les tâches async :
//! un fichier de statut tient en quelques centaines d'octets (le message
//! d'erreur est borné par [`MAX_ERROR_LEN`](crate::record::MAX_ERROR_LEN)), et `get` est appelé sous le
//! verrou des leases, qui ne peut pas traverser un `.await`.
//!
//! ```text
//! cache_audio/
//! └── status/
//!     ├── 4uLU6hMCjMI75M1A2tKUQC.json
//!     └── 7ouMYWpwJ422jRcDASZB7P.json
//! ```

use crate::error::Result;
use crate::record::JobRecord;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Durée pendant laquelle une écriture locale fait foi sans relire le disque
pub const DEFAULT_MEMORY_TTL: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct ProgressStore {
    dir: PathBuf,
    memory_ttl: Duration,
    memory: RwLock<HashMap<String, (JobRecord, Instant)>>,
}

impl ProgressStore {
    /// Ouvre (et crée si besoin) le répertoire des fichiers de statut
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            memory_ttl: DEFAULT_MEMORY_TTL,
            memory: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_memory_ttl(mut self, ttl: Duration) -> Self {
        self.memory_ttl = ttl;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Persiste `record` puis le rend visible en mémoire
    ///
    /// Le fichier est écrit avant la map : si l'écriture disque échoue,
    /// l'erreur est retournée et la map reste à jour pour ce processus.
    pub fn set(&self, key: &str, record: JobRecord) -> Result<()> {
        let result = self.write_sidecar(key, &record);
        self.memory
            .write()
            .unwrap()
            .insert(key.to_string(), (record, Instant::now()));
        result
    }

    fn write_sidecar(&self, key: &str, record: &JobRecord) -> Result<()> {
        let data = serde_json::to_vec(record)?;
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4().simple()));
        std::fs::write(&tmp, data)?;
        if let Err(e) = std::fs::rename(&tmp, self.sidecar_path(key)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        trace!(track_id = %key, status = record.status.as_str(), "progress written");
        Ok(())
    }

    /// Dernier enregistrement connu, ou `not_started` si aucun
    pub fn get(&self, key: &str) -> JobRecord {
        self.lookup(key).unwrap_or_else(JobRecord::not_started)
    }

    /// Comme `get`, mais distingue l'absence d'enregistrement
    pub fn lookup(&self, key: &str) -> Option<JobRecord> {
        let local = self.memory.read().unwrap().get(key).cloned();
        if let Some((record, written_at)) = &local {
            if written_at.elapsed() < self.memory_ttl {
                return Some(record.clone());
            }
        }

        match std::fs::read(self.sidecar_path(key)) {
            Ok(data) => match serde_json::from_slice::<JobRecord>(&data) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(track_id = %key, "Ignoring unreadable status file: {}", e);
                    local.map(|(record, _)| record)
                }
            },
            // Effacé par un autre processus
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if local.is_some() {
                    self.memory.write().unwrap().remove(key);
                }
                None
            }
            Err(e) => {
                warn!(track_id = %key, "Cannot read status file: {}", e);
                local.map(|(record, _)| record)
            }
        }
    }

    /// Oublie l'enregistrement (mémoire et fichier)
    pub fn clear(&self, key: &str) -> Result<()> {
        self.memory.write().unwrap().remove(key);
        match std::fs::remove_file(self.sidecar_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::JobStatus;

    #[test]
    fn test_get_defaults_to_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(dir.path()).unwrap();

        let record = store.get("unknown");
        assert_eq!(record.status, JobStatus::NotStarted);
        assert_eq!(record.progress, 0);
        assert!(store.lookup("unknown").is_none());
    }

    #[test]
    fn test_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(dir.path()).unwrap();

        store.set("abc", JobRecord::downloading(10, 100)).unwrap();
        let record = store.get("abc");
        assert_eq!(record.status, JobStatus::Downloading);
        assert_eq!(record.progress, 10);
        assert!(dir.path().join("abc.json").exists());
    }

    #[test]
    fn test_other_instance_sees_writes() {
        // Deux instances sur le même répertoire simulent deux processus
        let dir = tempfile::tempdir().unwrap();
        let writer = ProgressStore::open(dir.path()).unwrap();
        let reader = ProgressStore::open(dir.path()).unwrap();

        writer.set("abc", JobRecord::done(1234)).unwrap();

        let record = reader.get("abc");
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.downloaded, 1234);
    }

    #[test]
    fn test_stale_memory_is_refreshed_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let a = ProgressStore::open(dir.path())
            .unwrap()
            .with_memory_ttl(Duration::ZERO);
        let b = ProgressStore::open(dir.path()).unwrap();

        a.set("abc", JobRecord::downloading(1, 10)).unwrap();
        b.set("abc", JobRecord::done(10)).unwrap();

        assert_eq!(a.get("abc").status, JobStatus::Done);

        b.clear("abc").unwrap();
        assert!(a.lookup("abc").is_none());
    }

    #[test]
    fn test_clear_removes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(dir.path()).unwrap();

        store.set("abc", JobRecord::done(1)).unwrap();
        store.clear("abc").unwrap();

        assert!(!dir.path().join("abc.json").exists());
        assert_eq!(store.get("abc").status, JobStatus::NotStarted);
        // Idempotent
        store.clear("abc").unwrap();
    }

    #[test]
    fn test_corrupt_sidecar_reads_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("abc.json"), b"{not json").unwrap();

        assert!(store.lookup("abc").is_none());
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(dir.path()).unwrap();
        for i in 0..5 {
            store.set("abc", JobRecord::downloading(i, 10)).unwrap();
        }

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["abc.json".to_string()]);
    }

    #[test]
    fn test_failed_sidecar_stays_small() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(dir.path()).unwrap();
        let message = "x".repeat(64 * 1024);
        store.set("abc", JobRecord::failed(message, 10, 20)).unwrap();

        let size = std::fs::metadata(dir.path().join("abc.json")).unwrap().len();
        assert!(size < 1024, "sidecar is {} bytes", size);
        assert_eq!(store.get("abc").status, JobStatus::Error);
    }
}
