//! Extension mfyserver : monte les routes du cache de streaming

use crate::api::create_router;
use crate::config_ext::StreamCacheConfigExt;
use crate::jobs::JobManager;
use crate::resolver::SourceResolver;
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;

/// Trait pour étendre un serveur HTTP avec le cache de streaming
///
/// Implémenté pour `mfyserver::Server` sans que mfyserver dépende de mfycache.
pub trait StreamCacheExt {
    /// Enregistre les routes `/api/download`, `/api/download/progress`
    /// et `/api/stream` pour un Job Manager déjà construit
    async fn init_stream_cache(&mut self, manager: JobManager) -> JobManager;

    /// Construit le Job Manager depuis `mfyconfig` puis enregistre les routes
    async fn init_stream_cache_configured(
        &mut self,
        resolver: Arc<dyn SourceResolver>,
    ) -> anyhow::Result<JobManager>;
}

impl StreamCacheExt for mfyserver::Server {
    async fn init_stream_cache(&mut self, manager: JobManager) -> JobManager {
        self.add_router("/", create_router(manager.clone())).await;
        self.add_api_docs(crate::ApiDoc::openapi(), "stream").await;
        info!(
            "Stream cache mounted on {}",
            manager.cache().root().display()
        );
        manager
    }

    async fn init_stream_cache_configured(
        &mut self,
        resolver: Arc<dyn SourceResolver>,
    ) -> anyhow::Result<JobManager> {
        let config = mfyconfig::get_config();
        let manager = config.create_job_manager(resolver)?;
        Ok(self.init_stream_cache(manager).await)
    }
}
