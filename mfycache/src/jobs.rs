//! Download Job Manager
//!
//! Garantit au plus un transfert actif par identifiant de piste, publie
//! la progression dans le [`ProgressStore`] et installe le fichier terminé
//! dans le [`CacheDirectory`].
//!
//! Cycle d'un job :
//!
//! ```text
//! start_or_join ──► lease ──► sweep ──► downloading(0, 0) ──► resolve
//!                                                                │
//!        Err(Resolution) ◄── error(message), lease libéré ◄──────┤
//!                                                                │
//!                                   tâche du runner : fetch ─► commit ─► done(bytes)
//!                                                       └────────┴─────► error(message)
//!                                                                │
//!                                                  lease libéré (toujours)
//! ```

use crate::cache_dir::{remove_if_exists, validate_key, CacheDirectory};
use crate::download::{fetch_to_file, http_client};
use crate::error::{CacheError, Result};
use crate::progress::ProgressStore;
use crate::record::{JobRecord, JobStatus};
use crate::resolver::SourceResolver;
use crate::runner::{JobEvent, JobRunner};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Message publié pour un job dont le propriétaire a disparu
pub const INTERRUPTED_MESSAGE: &str = "Download interrupted";

/// Résultat de `start_or_join`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    /// Une entrée fraîche existe déjà
    Cached,
    /// Un nouveau job a été soumis
    Started,
    /// Un job est déjà en cours pour cette piste
    AlreadyDownloading,
}

impl StartOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            StartOutcome::Cached => "cached",
            StartOutcome::Started => "started",
            StartOutcome::AlreadyDownloading => "already_downloading",
        }
    }
}

/// Réglages du Job Manager
#[derive(Debug, Clone, Copy)]
pub struct JobOptions {
    /// Intervalle minimal entre deux écritures de progression
    pub progress_interval: Duration,
    /// Âge au-delà duquel un `downloading` sans propriétaire local est abandonné
    pub stale_after: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(500),
            stale_after: Duration::from_secs(120),
        }
    }
}

type ActiveSet = Arc<Mutex<HashSet<String>>>;

/// Droit exclusif de télécharger une piste dans ce processus
///
/// La clé quitte l'ensemble des jobs actifs quand le lease est détruit,
/// y compris si la tâche du job panique.
struct JobLease {
    key: String,
    active: ActiveSet,
}

impl Drop for JobLease {
    fn drop(&mut self) {
        self.active.lock().unwrap().remove(&self.key);
    }
}

/// Limite la fréquence des écritures de progression
///
/// La première mise à jour est toujours écrite ; `downloaded` ne décroît
/// jamais.
struct ProgressThrottle {
    interval: Duration,
    last_write: Option<Instant>,
    downloaded: u64,
    total: u64,
}

impl ProgressThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_write: None,
            downloaded: 0,
            total: 0,
        }
    }

    /// Throttle dont l'intervalle court depuis une écriture déjà faite
    fn after_write(interval: Duration) -> Self {
        Self {
            last_write: Some(Instant::now()),
            ..Self::new(interval)
        }
    }

    /// Enregistre l'avancement ; retourne `true` s'il faut le publier
    fn update(&mut self, downloaded: u64, total: u64) -> bool {
        self.downloaded = self.downloaded.max(downloaded);
        self.total = total;
        let due = self
            .last_write
            .map_or(true, |last| last.elapsed() >= self.interval);
        if due {
            self.last_write = Some(Instant::now());
        }
        due
    }
}

struct Inner {
    cache: CacheDirectory,
    progress: ProgressStore,
    resolver: Arc<dyn SourceResolver>,
    client: reqwest::Client,
    runner: JobRunner,
    active: ActiveSet,
    options: JobOptions,
}

/// Point d'entrée unique pour déclencher et suivre les téléchargements
///
/// Clonable à bas coût ; toutes les copies partagent le même état.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("cache", &self.inner.cache)
            .field("active", &self.inner.active.lock().unwrap().len())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl JobManager {
    /// Assemble un Job Manager à partir de ses composants
    pub fn new(
        cache: CacheDirectory,
        progress: ProgressStore,
        resolver: Arc<dyn SourceResolver>,
        options: JobOptions,
    ) -> Result<Self> {
        Ok(Self::with_client(
            cache,
            progress,
            resolver,
            options,
            http_client()?,
        ))
    }

    pub fn with_client(
        cache: CacheDirectory,
        progress: ProgressStore,
        resolver: Arc<dyn SourceResolver>,
        options: JobOptions,
        client: reqwest::Client,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                progress,
                resolver,
                client,
                runner: JobRunner::new(),
                active: Arc::new(Mutex::new(HashSet::new())),
                options,
            }),
        }
    }

    /// Ouvre un cache complet sous `root` (statuts dans `root/status`)
    ///
    /// # Arguments
    ///
    /// * `root` - Répertoire du cache audio
    /// * `extension` - Extension des fichiers audio
    /// * `max_age` - Durée de vie d'une entrée
    /// * `resolver` - Source des URLs audio
    pub fn open(
        root: impl Into<PathBuf>,
        extension: &str,
        max_age: Duration,
        resolver: Arc<dyn SourceResolver>,
    ) -> Result<Self> {
        let root = root.into();
        let cache = CacheDirectory::open(&root, extension, max_age)?;
        let progress = ProgressStore::open(root.join("status"))?;
        Self::new(cache, progress, resolver, JobOptions::default())
    }

    pub fn cache(&self) -> &CacheDirectory {
        &self.inner.cache
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.inner.progress
    }

    pub fn options(&self) -> JobOptions {
        self.inner.options
    }

    /// S'abonne aux issues des jobs (canal d'erreurs du runner)
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.runner.subscribe()
    }

    /// Indique si un job de ce processus détient la piste
    pub fn is_active(&self, key: &str) -> bool {
        self.inner.active.lock().unwrap().contains(key)
    }

    /// Démarre le téléchargement de `key`, ou rejoint celui en cours
    ///
    /// La source est résolue ici, avant de rendre la main : un échec est
    /// enregistré en `error` et retourné comme [`CacheError::Resolution`].
    /// Le transfert lui-même est soumis au runner ; la méthode n'attend
    /// jamais sa fin.
    pub async fn start_or_join(&self, key: &str) -> Result<StartOutcome> {
        validate_key(key)?;

        if self.ensure_cached(key).await? {
            return Ok(StartOutcome::Cached);
        }

        let Some(lease) = self.try_acquire(key) else {
            debug!(track_id = %key, "Joining running download");
            return Ok(StartOutcome::AlreadyDownloading);
        };

        // Un job concurrent a pu terminer entre la vérification et le lease
        if self.ensure_cached(key).await? {
            return Ok(StartOutcome::Cached);
        }

        match self.sweep().await {
            Ok(evicted) if !evicted.is_empty() => {
                debug!("Evicted {} expired entries before new job", evicted.len())
            }
            Ok(_) => {}
            Err(e) => warn!("Cache sweep before job failed: {}", e),
        }

        self.inner.progress.set(key, JobRecord::downloading(0, 0))?;
        let throttle = ProgressThrottle::after_write(self.inner.options.progress_interval);

        let url = match self.resolve(key).await {
            Ok(url) => url,
            Err(e) => {
                warn!(track_id = %key, "Cannot resolve source: {}", e);
                if let Err(store_err) = self
                    .inner
                    .progress
                    .set(key, JobRecord::failed(&e.to_string(), 0, 0))
                {
                    error!(track_id = %key, "Cannot record failed resolution: {}", store_err);
                }
                drop(lease);
                return Err(e);
            }
        };
        info!(track_id = %key, "Starting download from {}", url);

        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        self.inner
            .runner
            .submit(async move { run_job(inner, key, url, lease, throttle).await });

        Ok(StartOutcome::Started)
    }

    /// URL de la source ; toute erreur du résolveur devient `Resolution`
    async fn resolve(&self, key: &str) -> Result<String> {
        self.inner
            .resolver
            .resolve(key)
            .await
            .map_err(|e| match e {
                CacheError::Resolution(_) => e,
                other => CacheError::Resolution(other.to_string()),
            })
    }

    /// Vérifie l'entrée du cache et aligne le statut si elle est fraîche
    async fn ensure_cached(&self, key: &str) -> Result<bool> {
        let Some(path) = self.inner.cache.lookup_fresh(key).await? else {
            return Ok(false);
        };
        let size = tokio::fs::metadata(&path).await?.len();
        let record = self.inner.progress.get(key);
        if record.status != JobStatus::Done || record.downloaded != size {
            self.inner.progress.set(key, JobRecord::done(size))?;
        }
        Ok(true)
    }

    /// Prend le lease de `key` si aucun job vivant ne le détient
    ///
    /// La vérification et l'insertion se font sous le même verrou.
    fn try_acquire(&self, key: &str) -> Option<JobLease> {
        let mut active = self.inner.active.lock().unwrap();
        if active.contains(key) {
            return None;
        }

        // Job d'un autre processus partageant le même répertoire de statuts
        let record = self.inner.progress.get(key);
        if record.status == JobStatus::Downloading && !self.is_abandoned(&record) {
            return None;
        }

        active.insert(key.to_string());
        Some(JobLease {
            key: key.to_string(),
            active: Arc::clone(&self.inner.active),
        })
    }

    fn is_abandoned(&self, record: &JobRecord) -> bool {
        let stale_ms = self.inner.options.stale_after.as_millis() as i64;
        record.age_millis() > stale_ms
    }

    /// Statut courant de `key`, cohérent avec le contenu du cache
    ///
    /// * entrée fraîche mais statut non `done` : le statut est réparé en `done`
    /// * statut `done` sans entrée fraîche : le statut est effacé
    /// * `downloading` abandonné : rapporté comme une erreur
    pub async fn status(&self, key: &str) -> Result<JobRecord> {
        validate_key(key)?;
        let record = self.inner.progress.get(key);

        if let Some(path) = self.inner.cache.lookup_fresh(key).await? {
            if record.status == JobStatus::Done {
                return Ok(record);
            }
            let size = tokio::fs::metadata(&path).await?.len();
            let repaired = JobRecord::done(size);
            self.inner.progress.set(key, repaired.clone())?;
            return Ok(repaired);
        }

        match record.status {
            JobStatus::Done => {
                debug!(track_id = %key, "Cache entry gone, clearing status");
                self.inner.progress.clear(key)?;
                Ok(JobRecord::not_started())
            }
            JobStatus::Downloading if !self.is_active(key) && self.is_abandoned(&record) => {
                Ok(JobRecord::failed(
                    INTERRUPTED_MESSAGE,
                    record.downloaded,
                    record.total,
                ))
            }
            _ => Ok(record),
        }
    }

    /// Chemin de l'entrée fraîche de `key`, s'il y en a une
    pub async fn cached_path(&self, key: &str) -> Result<Option<PathBuf>> {
        self.inner.cache.lookup_fresh(key).await
    }

    /// Évince les entrées périmées et oublie leurs statuts
    pub async fn sweep(&self) -> Result<Vec<String>> {
        let evicted = self.inner.cache.sweep_expired().await?;
        for key in &evicted {
            if self.is_active(key) {
                continue;
            }
            if let Err(e) = self.inner.progress.clear(key) {
                warn!(track_id = %key, "Cannot clear status of evicted entry: {}", e);
            }
        }
        Ok(evicted)
    }

    /// Lance un balayage périodique du cache
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = manager.sweep().await {
                    warn!("Cache sweep failed: {}", e);
                }
            }
        })
    }

    /// Attend la fin des jobs en vol
    pub async fn shutdown(&self) {
        self.inner.runner.shutdown().await;
    }
}

/// Corps d'un job : le statut terminal est écrit avant la libération du lease
async fn run_job(
    inner: Arc<Inner>,
    key: String,
    url: String,
    lease: JobLease,
    mut throttle: ProgressThrottle,
) -> JobEvent {
    let result = transfer(&inner, &key, &url, &mut throttle).await;

    let event = match result {
        Ok(bytes) => {
            if let Err(e) = inner.progress.set(&key, JobRecord::done(bytes)) {
                error!(track_id = %key, "Cannot record completed download: {}", e);
            }
            info!(track_id = %key, "Download complete ({} bytes)", bytes);
            JobEvent::Finished { key, bytes }
        }
        Err(e) => {
            let message = e.to_string();
            let record = JobRecord::failed(&message, throttle.downloaded, throttle.total);
            if let Err(e) = inner.progress.set(&key, record) {
                error!(track_id = %key, "Cannot record failed download: {}", e);
            }
            warn!(track_id = %key, "Download failed: {}", message);
            JobEvent::Failed {
                key,
                error: message,
            }
        }
    };

    drop(lease);
    event
}

async fn transfer(
    inner: &Inner,
    key: &str,
    url: &str,
    throttle: &mut ProgressThrottle,
) -> Result<u64> {
    let temp = inner.cache.temp_path(key);
    let fetched = fetch_to_file(&inner.client, url, &temp, |downloaded, total| {
        if throttle.update(downloaded, total) {
            let record = JobRecord::downloading(throttle.downloaded, total);
            if let Err(e) = inner.progress.set(key, record) {
                warn!(track_id = %key, "Cannot record progress: {}", e);
            }
        }
    })
    .await;

    let committed = match fetched {
        Ok(bytes) => inner.cache.commit(&temp, key).await.map(|_| bytes),
        Err(e) => Err(e),
    };

    if committed.is_err() {
        if let Err(e) = remove_if_exists(&temp).await {
            warn!(track_id = %key, "Cannot remove partial file: {}", e);
        }
    }
    committed
}
