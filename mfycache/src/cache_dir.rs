//! Cache Directory : fichiers audio terminés, indexés par identifiant de piste
//!
//! ```text
//! cache_audio/
//! ├── 4uLU6hMCjMI75M1A2tKUQC.mp3        # entrée complète
//! ├── .7ouMYWpwJ422jRcDASZB7P.<uuid>.part  # transfert en cours
//! └── status/                           # ProgressStore
//! ```
//!
//! Une entrée n'apparaît sous son nom final qu'au `rename` qui suit un
//! transfert complet : un lecteur ne voit jamais de fichier partiel.
//! Une entrée est fraîche tant que `now - mtime < max_age` ; une entrée
//! périmée est supprimée dès qu'on la consulte et n'est jamais servie.

use crate::error::{CacheError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Âge maximal par défaut d'une entrée (30 minutes)
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);

const PART_SUFFIX: &str = ".part";
const MAX_KEY_LEN: usize = 128;

/// Vérifie qu'un identifiant peut servir de nom de fichier sans sortir du cache
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct CacheDirectory {
    root: PathBuf,
    extension: String,
    max_age: Duration,
}

impl CacheDirectory {
    /// Ouvre le répertoire de cache, créé s'il n'existe pas
    ///
    /// # Arguments
    ///
    /// * `root` - Répertoire racine
    /// * `extension` - Extension des fichiers audio (ex: `"mp3"`)
    /// * `max_age` - Âge au-delà duquel une entrée est périmée
    pub fn open(root: impl Into<PathBuf>, extension: &str, max_age: Duration) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            extension: extension.trim_start_matches('.').to_string(),
            max_age,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Chemin final d'une entrée (qu'elle existe ou non)
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", key, self.extension))
    }

    /// Chemin temporaire unique pour un nouveau transfert
    ///
    /// Le fichier est caché et suffixé `.part` : il ne peut pas être pris
    /// pour une entrée valide.
    pub fn temp_path(&self, key: &str) -> PathBuf {
        self.root.join(format!(
            ".{}.{}{}",
            key,
            uuid::Uuid::new_v4().simple(),
            PART_SUFFIX
        ))
    }

    fn is_fresh(&self, modified: SystemTime, now: SystemTime) -> bool {
        // Un mtime dans le futur (horloge ajustée) compte comme âge nul
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        age < self.max_age
    }

    /// Retourne le chemin de l'entrée si elle existe et est fraîche
    ///
    /// Une entrée périmée est supprimée et `None` est retourné.
    pub async fn lookup_fresh(&self, key: &str) -> Result<Option<PathBuf>> {
        validate_key(key)?;
        let path = self.entry_path(key);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if !metadata.is_file() {
            return Ok(None);
        }

        if self.is_fresh(metadata.modified()?, SystemTime::now()) {
            return Ok(Some(path));
        }

        debug!(track_id = %key, "Cache entry expired, removing");
        remove_if_exists(&path).await?;
        Ok(None)
    }

    /// Installe un transfert terminé sous le nom final
    ///
    /// `rename` est atomique sur un même système de fichiers, d'où le
    /// placement des fichiers temporaires dans la racine du cache.
    pub async fn commit(&self, temp: &Path, key: &str) -> Result<PathBuf> {
        let path = self.entry_path(key);
        tokio::fs::rename(temp, &path).await?;
        Ok(path)
    }

    /// Supprime toutes les entrées périmées et les `.part` orphelins
    ///
    /// Retourne les clés des entrées supprimées.
    pub async fn sweep_expired(&self) -> Result<Vec<String>> {
        let now = SystemTime::now();
        let suffix = format!(".{}", self.extension);
        let mut evicted = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };

            let is_part = name.starts_with('.') && name.ends_with(PART_SUFFIX);
            let key = name.strip_suffix(suffix.as_str());
            if !is_part && key.is_none() {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                // Supprimé entre-temps par un autre balayage
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            let modified = metadata.modified()?;
            if self.is_fresh(modified, now) {
                continue;
            }

            if let Err(e) = remove_if_exists(&entry.path()).await {
                warn!("Cannot remove expired cache file {}: {}", name, e);
                continue;
            }

            if let (false, Some(key)) = (is_part, key) {
                evicted.push(key.to_string());
            }
        }

        if !evicted.is_empty() {
            info!("Evicted {} expired cache entries", evicted.len());
        }
        Ok(evicted)
    }
}

pub(crate) async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, FileTimes};

    fn age_file(path: &Path, age: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        let mtime = SystemTime::now() - age;
        file.set_times(FileTimes::new().set_modified(mtime)).unwrap();
    }

    fn open_cache(dir: &tempfile::TempDir) -> CacheDirectory {
        CacheDirectory::open(dir.path(), "mp3", DEFAULT_MAX_AGE).unwrap()
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("4uLU6hMCjMI75M1A2tKUQC").is_ok());
        assert!(validate_key("track_01-b").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("a.b").is_err());
        assert!(validate_key(&"x".repeat(129)).is_err());
    }

    #[tokio::test]
    async fn test_lookup_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);
        assert!(cache.lookup_fresh("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_fresh_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);
        std::fs::write(cache.entry_path("abc"), b"ID3").unwrap();

        let path = cache.lookup_fresh("abc").await.unwrap();
        assert_eq!(path, Some(dir.path().join("abc.mp3")));
    }

    #[tokio::test]
    async fn test_lookup_deletes_stale_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);
        let path = cache.entry_path("abc");
        std::fs::write(&path, b"ID3").unwrap();
        age_file(&path, Duration::from_secs(31 * 60));

        assert!(cache.lookup_fresh("abc").await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_lookup_rejects_invalid_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);
        assert!(matches!(
            cache.lookup_fresh("../abc").await,
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_temp_path_is_never_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);
        let temp = cache.temp_path("abc");
        std::fs::write(&temp, b"partial").unwrap();

        assert_ne!(temp, cache.entry_path("abc"));
        assert!(cache.lookup_fresh("abc").await.unwrap().is_none());

        let committed = cache.commit(&temp, "abc").await.unwrap();
        assert!(!temp.exists());
        assert_eq!(std::fs::read(committed).unwrap(), b"partial");
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let old = cache.entry_path("old");
        let fresh = cache.entry_path("fresh");
        let orphan = cache.temp_path("crashed");
        let running = cache.temp_path("running");
        let unrelated = dir.path().join("notes.txt");
        for path in [&old, &fresh, &orphan, &running, &unrelated] {
            std::fs::write(path, b"data").unwrap();
        }
        age_file(&old, Duration::from_secs(3600));
        age_file(&orphan, Duration::from_secs(3600));
        age_file(&unrelated, Duration::from_secs(3600));

        let evicted = cache.sweep_expired().await.unwrap();

        assert_eq!(evicted, vec!["old".to_string()]);
        assert!(!old.exists());
        assert!(!orphan.exists());
        assert!(fresh.exists());
        assert!(running.exists());
        assert!(unrelated.exists());
    }
}
