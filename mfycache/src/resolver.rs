//! Résolution d'un identifiant de piste en URL téléchargeable

use crate::error::Result;
use async_trait::async_trait;

/// Source des fichiers audio
///
/// Appelée par `JobManager::start_or_join` avant la soumission du job :
/// le client qui lance un téléchargement attend donc la résolution et
/// reçoit son erreur directement.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Retourne une URL HTTP(S) servant l'audio de la piste `key`
    ///
    /// Une erreur est reportée dans le statut du job et retournée à
    /// l'appelant comme `CacheError::Resolution`.
    async fn resolve(&self, key: &str) -> Result<String>;
}

/// Résolveur à gabarit fixe : `{key}` est remplacé par l'identifiant
///
/// Utile pour un serveur de fichiers statique ou pour les tests.
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    template: String,
}

impl TemplateResolver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl SourceResolver for TemplateResolver {
    async fn resolve(&self, key: &str) -> Result<String> {
        Ok(self.template.replace("{key}", key))
    }
}
