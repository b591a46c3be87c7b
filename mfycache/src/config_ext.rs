//! Extension pour intégrer le cache de streaming dans mfyconfig
//!
//! Clés utilisées, sous `host.stream_cache` :
//!
//! ```yaml
//! host:
//!   stream_cache:
//!     directory: cache_audio
//!     max_age_secs: 1800
//!     progress_interval_ms: 500
//!     stale_job_secs: 120
//!     file_extension: mp3
//! ```

use crate::cache_dir::CacheDirectory;
use crate::jobs::{JobManager, JobOptions};
use crate::progress::ProgressStore;
use crate::resolver::SourceResolver;
use anyhow::Result;
use mfyconfig::Config;
use serde_yaml::{Number, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const SECTION: [&str; 2] = ["host", "stream_cache"];

const DEFAULT_DIR: &str = "cache_audio";
const DEFAULT_MAX_AGE_SECS: u64 = 30 * 60;
const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;
const DEFAULT_STALE_JOB_SECS: u64 = 120;
const DEFAULT_EXTENSION: &str = "mp3";

fn key(name: &str) -> [&str; 3] {
    [SECTION[0], SECTION[1], name]
}

/// Trait d'extension pour gérer le cache de streaming dans mfyconfig
///
/// # Exemple
///
/// ```rust,ignore
/// use mfyconfig::get_config;
/// use mfycache::StreamCacheConfigExt;
///
/// let config = get_config();
/// let manager = config.create_job_manager(resolver)?;
/// ```
pub trait StreamCacheConfigExt {
    /// Répertoire du cache audio (créé si besoin, relatif au répertoire de config)
    fn get_stream_cache_dir(&self) -> Result<PathBuf>;

    fn set_stream_cache_dir(&self, directory: String) -> Result<()>;

    /// Durée de vie d'une entrée (défaut : 30 minutes)
    fn get_stream_cache_max_age(&self) -> Duration;

    fn set_stream_cache_max_age(&self, max_age: Duration) -> Result<()>;

    /// Intervalle minimal entre deux écritures de progression (défaut : 500 ms)
    fn get_stream_progress_interval(&self) -> Duration;

    /// Âge d'un `downloading` orphelin avant reprise (défaut : 120 s)
    fn get_stream_stale_job_after(&self) -> Duration;

    /// Extension des fichiers du cache (défaut : `mp3`)
    fn get_stream_cache_extension(&self) -> String;

    /// Crée le Job Manager décrit par la configuration
    fn create_job_manager(&self, resolver: Arc<dyn SourceResolver>) -> Result<JobManager>;
}

impl StreamCacheConfigExt for Config {
    fn get_stream_cache_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&key("directory"), DEFAULT_DIR)
    }

    fn set_stream_cache_dir(&self, directory: String) -> Result<()> {
        self.set_managed_dir(&key("directory"), directory)
    }

    fn get_stream_cache_max_age(&self) -> Duration {
        let secs = self.get_u64_or(&key("max_age_secs"), DEFAULT_MAX_AGE_SECS);
        Duration::from_secs(secs)
    }

    fn set_stream_cache_max_age(&self, max_age: Duration) -> Result<()> {
        self.set_value(
            &key("max_age_secs"),
            Value::Number(Number::from(max_age.as_secs())),
        )
    }

    fn get_stream_progress_interval(&self) -> Duration {
        let ms = self.get_u64_or(&key("progress_interval_ms"), DEFAULT_PROGRESS_INTERVAL_MS);
        Duration::from_millis(ms)
    }

    fn get_stream_stale_job_after(&self) -> Duration {
        let secs = self.get_u64_or(&key("stale_job_secs"), DEFAULT_STALE_JOB_SECS);
        Duration::from_secs(secs)
    }

    fn get_stream_cache_extension(&self) -> String {
        self.get_string_or(&key("file_extension"), DEFAULT_EXTENSION)
    }

    fn create_job_manager(&self, resolver: Arc<dyn SourceResolver>) -> Result<JobManager> {
        let root = self.get_stream_cache_dir()?;
        let cache = CacheDirectory::open(
            &root,
            &self.get_stream_cache_extension(),
            self.get_stream_cache_max_age(),
        )?;
        let progress = ProgressStore::open(root.join("status"))?;
        let options = JobOptions {
            progress_interval: self.get_stream_progress_interval(),
            stale_after: self.get_stream_stale_job_after(),
        };
        Ok(JobManager::new(cache, progress, resolver, options)?)
    }
}
