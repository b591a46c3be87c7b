//! # Module Server - API de haut niveau pour Axum
//!
//! Ce module cache la composition des routers Axum derrière une API simple :
//!
//! - Routes JSON simples avec `add_route()`
//! - Handlers avec état avec `add_handler_with_state()`
//! - Sous-routers avec `add_router()`
//! - Documentation OpenAPI/Swagger avec `add_openapi()`
//! - Arrêt propre sur Ctrl+C

use crate::logs::{self, LogState, LoggingOptions};
use anyhow::{Context, Result};
use axum::handler::Handler;
use axum::routing::get;
use axum::{Json, Router};
use mfyconfig::get_config;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tracing::{error, info};
use utoipa_swagger_ui::SwaggerUi;

const DEFAULT_SERVER_NAME: &str = "Musify";

/// Info serveur sérialisable
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct ServerInfo {
    pub name: String,
    pub base_url: String,
    pub http_port: u16,
}

/// Serveur principal
pub struct Server {
    name: String,
    base_url: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    log_state: Option<LogState>,
}

impl Server {
    /// Crée une nouvelle instance de serveur
    ///
    /// # Arguments
    ///
    /// * `name` - Nom du serveur (pour les logs)
    /// * `base_url` - Nom d'hôte annoncé (ex: "localhost")
    /// * `http_port` - Port HTTP à écouter
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            log_state: None,
        }
    }

    /// Crée un serveur à partir de la configuration globale
    pub fn new_configured() -> Self {
        let config = get_config();
        Self::new(DEFAULT_SERVER_NAME, config.get_base_url(), config.get_http_port())
    }

    /// Ajoute une route JSON dynamique
    ///
    /// La closure fournie est appelée à chaque requête GET sur le chemin spécifié.
    ///
    /// ```rust,no_run
    /// # use mfyserver::Server;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let mut server = Server::new("Test", "localhost", 3000);
    /// server.add_route("/api/status", || async {
    ///     serde_json::json!({"status": "online"})
    /// }).await;
    /// # }
    /// ```
    pub async fn add_route<F, Fut, T>(&mut self, path: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = move || {
            let f = f.clone();
            async move { Json(f().await) }
        };

        self.mount(path, Router::new().route("/", get(handler))).await;
    }

    /// Ajoute un handler GET avec état
    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new().route("/", get(handler)).with_state(state);
        self.mount(path, route).await;
    }

    /// Ajoute une API documentée avec OpenAPI et Swagger UI
    ///
    /// Résultat pour `name = "stream"` :
    ///
    /// - les routes de `api_router` sont accessibles sous `/api/stream/...`
    /// - `/swagger-ui/stream` affiche la documentation
    /// - `/api-docs/stream.json` fournit la spécification OpenAPI
    pub async fn add_openapi(
        &mut self,
        api_router: Router,
        openapi: utoipa::openapi::OpenApi,
        name: &str,
    ) {
        let api = Router::new()
            .nest(&format!("/api/{}", name), api_router)
            .merge(swagger_for(openapi, name));
        self.mount("/", api).await;
    }

    /// Publie la documentation d'une API montée par ailleurs
    ///
    /// Pour les routes dont les chemins sont fixés hors de `/api/{name}` :
    /// seules `/swagger-ui/{name}` et `/api-docs/{name}.json` sont ajoutées.
    pub async fn add_api_docs(&mut self, openapi: utoipa::openapi::OpenApi, name: &str) {
        self.mount("/", swagger_for(openapi, name).into()).await;
    }

    /// Ajoute un sous-router au serveur
    ///
    /// - Si `path` est "/", merge directement au router principal
    /// - Sinon, nest le router sous le chemin donné
    pub async fn add_router(&mut self, path: &str, sub_router: Router) {
        self.mount(path, sub_router).await;
    }

    async fn mount(&mut self, path: &str, sub_router: Router) {
        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).merge(sub_router)
        } else {
            let normalized = format!("/{}", path.trim_start_matches('/'));
            std::mem::take(&mut *r).nest(&normalized, sub_router)
        };
    }

    /// Copie du router composé (utile pour les tests en mémoire)
    pub async fn router(&self) -> Router {
        self.router.read().await.clone()
    }

    /// Démarre le serveur HTTP
    ///
    /// Le port est réservé avant de rendre la main : une erreur de bind est
    /// retournée à l'appelant. Le service tourne ensuite en tâche de fond
    /// jusqu'à Ctrl+C.
    pub async fn start(&mut self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Cannot bind HTTP port {}", self.http_port))?;

        info!(
            "Server {} running at http://{}:{}",
            self.name, self.base_url, self.http_port
        );

        let router = self.router.read().await.clone();
        self.join_handle = Some(tokio::spawn(async move {
            let shutdown = async {
                if let Err(e) = signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Ctrl+C received, shutting down");
            };

            if let Err(e) = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("HTTP server error: {}", e);
            }
        }));

        Ok(())
    }

    /// Attend la fin du serveur
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Récupère les infos du serveur
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            http_port: self.http_port,
        }
    }

    /// État des logs si `init_logging` a été appelé
    pub fn log_state(&self) -> Option<LogState> {
        self.log_state.clone()
    }

    /// Initialise le système de logging et enregistre les routes de logs
    ///
    /// Routes enregistrées :
    /// - `GET /log-sse` - flux SSE des logs
    /// - `GET /log-dump` - contenu du buffer en JSON
    /// - `GET|POST /api/logs/log_setup` - niveau de log courant
    pub async fn init_logging(&mut self, options: LoggingOptions) {
        let log_state = logs::init_logging(options);

        self.add_handler_with_state("/log-sse", logs::log_sse, log_state.clone())
            .await;
        self.add_handler_with_state("/log-dump", logs::log_dump, log_state.clone())
            .await;

        use utoipa::OpenApi;
        self.add_openapi(
            logs::create_logs_router(log_state.clone()),
            logs::LogsApiDoc::openapi(),
            "logs",
        )
        .await;

        self.log_state = Some(log_state);
    }
}

/// Swagger UI sur `/swagger-ui/{name}`, document sur `/api-docs/{name}.json`
fn swagger_for(openapi: utoipa::openapi::OpenApi, name: &str) -> SwaggerUi {
    // SwaggerUi n'accepte que des chemins 'static ; une fuite par API enregistrée
    let ui: &'static str = Box::leak(format!("/swagger-ui/{}", name).into_boxed_str());
    let doc: &'static str = Box::leak(format!("/api-docs/{}.json", name).into_boxed_str());
    SwaggerUi::new(ui).url(doc, openapi)
}

/// Builder pattern
pub struct ServerBuilder {
    name: String,
    base_url: String,
    http_port: u16,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
        }
    }

    pub fn new_configured() -> Self {
        let config = get_config();
        Self {
            name: DEFAULT_SERVER_NAME.to_string(),
            base_url: config.get_base_url(),
            http_port: config.get_http_port(),
        }
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    /// Construit le serveur
    pub fn build(self) -> Server {
        Server::new(self.name, self.base_url, self.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_add_route_serves_json() {
        let mut server = ServerBuilder::new("Test", "localhost", 0).build();
        server
            .add_route("/info", || async { serde_json::json!({"version": "1.0.0"}) })
            .await;

        let response = server
            .router()
            .await
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["version"], "1.0.0");
    }

    #[tokio::test]
    async fn test_add_router_at_root_and_nested() {
        let mut server = Server::new("Test", "localhost", 0);
        server
            .add_router("/", Router::new().route("/ping", get(|| async { "pong" })))
            .await;
        server
            .add_router("nested", Router::new().route("/ping", get(|| async { "deep" })))
            .await;

        let router = server.router().await;
        let root = router
            .clone()
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(root.status(), StatusCode::OK);

        let nested = router
            .oneshot(Request::get("/nested/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(nested.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"deep");
    }

    #[test]
    fn test_builder_port_override() {
        let server = ServerBuilder::new("Test", "localhost", 3000)
            .http_port(4000)
            .build();
        let info = server.info();
        assert_eq!(info.http_port, 4000);
        assert_eq!(info.name, "Test");
    }
}
