//! Logs de l'application : buffer circulaire, diffusion SSE et niveau réglable
//!
//! Routes exposées par `Server::init_logging` :
//!
//! - `GET /log-dump` : contenu du buffer
//! - `GET /log-sse?warn=true&search=jobs` : historique puis flux en direct
//! - `GET|POST /api/logs/log_setup` : niveau courant

mod layer;

pub use layer::BufferLayer;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use mfyconfig::get_config;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::{
    Registry, filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

const LOG_LEVELS: [Level; 5] = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE];

/// Taille du canal de diffusion vers les clients SSE
const LIVE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    pub fn now(level: &Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            level: level.as_str().to_string(),
            target: target.into(),
            message: message.into(),
        }
    }
}

struct LogInner {
    history: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    live: broadcast::Sender<LogEntry>,
    level: RwLock<Level>,
    filter: reload::Handle<LevelFilter, Registry>,
}

/// État partagé du logging : historique borné, flux en direct et niveau
#[derive(Clone)]
pub struct LogState {
    inner: Arc<LogInner>,
}

impl LogState {
    pub fn new(
        capacity: usize,
        level: Level,
        filter: reload::Handle<LevelFilter, Registry>,
    ) -> Self {
        let capacity = capacity.max(1);
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(LogInner {
                history: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                live,
                level: RwLock::new(level),
                filter,
            }),
        }
    }

    /// Change le niveau du filtre global
    pub fn set_max_level(&self, level: Level) {
        *self.inner.level.write().unwrap() = level;
        if let Err(e) = self.inner.filter.reload(LevelFilter::from_level(level)) {
            eprintln!("Cannot reload log level filter: {}", e);
        }
    }

    pub fn get_max_level(&self) -> Level {
        *self.inner.level.read().unwrap()
    }

    pub(crate) fn push(&self, entry: LogEntry) {
        {
            let mut history = self.inner.history.lock().unwrap();
            if history.len() == self.inner.capacity {
                history.pop_front();
            }
            history.push_back(entry.clone());
        }
        // Aucun client SSE : l'envoi échoue sans conséquence
        let _ = self.inner.live.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.inner.live.subscribe()
    }

    pub fn dump(&self) -> Vec<LogEntry> {
        self.inner.history.lock().unwrap().iter().cloned().collect()
    }
}

/// Filtres de `/log-sse` : drapeaux de niveau et recherche plein texte
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogQuery {
    pub error: Option<bool>,
    pub warn: Option<bool>,
    pub info: Option<bool>,
    pub debug: Option<bool>,
    pub trace: Option<bool>,
    pub search: Option<String>,
}

fn to_event(entry: &LogEntry) -> Option<Result<Event, axum::Error>> {
    serde_json::to_string(entry)
        .ok()
        .map(|json| Ok(Event::default().data(json)))
}

/// Historique filtré puis entrées en direct, tant que le client reste connecté
pub async fn log_sse(
    State(state): State<LogState>,
    Query(query): Query<LogQuery>,
) -> impl IntoResponse {
    let mut live = state.subscribe();
    let history = state.dump();

    let stream = async_stream::stream! {
        let level = state.get_max_level();
        for entry in history.iter().filter(|e| query.accepts(e, level)) {
            if let Some(event) = to_event(entry) {
                yield event;
            }
        }

        loop {
            match live.recv().await {
                Ok(entry) if query.accepts(&entry, state.get_max_level()) => {
                    if let Some(event) = to_event(&entry) {
                        yield event;
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn log_dump(State(state): State<LogState>) -> Json<Vec<LogEntry>> {
    Json(state.dump())
}

impl LogQuery {
    /// Niveaux cochés ; vide si aucun drapeau n'est posé
    fn selected_levels(&self) -> Vec<Level> {
        [
            (self.error, Level::ERROR),
            (self.warn, Level::WARN),
            (self.info, Level::INFO),
            (self.debug, Level::DEBUG),
            (self.trace, Level::TRACE),
        ]
        .into_iter()
        .filter(|(flag, _)| flag.unwrap_or(false))
        .map(|(_, level)| level)
        .collect()
    }

    /// Vrai si l'entrée passe le niveau courant, les drapeaux et la recherche
    fn accepts(&self, entry: &LogEntry, max_level: Level) -> bool {
        // ERROR < WARN < ... < TRACE : un niveau "plus grand" est plus verbeux
        let Some(level) = parse_level(&entry.level) else {
            return false;
        };
        if level > max_level {
            return false;
        }

        let selected = self.selected_levels();
        if !selected.is_empty() && !selected.contains(&level) {
            return false;
        }

        self.search.as_deref().is_none_or(|needle| {
            entry.message.contains(needle) || entry.target.contains(needle)
        })
    }
}

/// Options d'initialisation du système de logging
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Capacité du buffer circulaire (nombre d'entrées conservées)
    pub buffer_capacity: usize,
    /// Activer la sortie console
    pub enable_console: bool,
    /// Niveau minimum initial
    pub min_level: Level,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            enable_console: true,
            min_level: Level::INFO,
        }
    }
}

impl LoggingOptions {
    /// Options lues dans la configuration globale
    pub fn from_config() -> Self {
        let settings = get_config().get_logger_settings();
        Self {
            buffer_capacity: settings.buffer_capacity,
            enable_console: settings.enable_console,
            min_level: parse_level(&settings.min_level).unwrap_or(Level::INFO),
        }
    }
}

/// Initialise le système de logging
///
/// L'ordre des layers compte : le filtre rechargeable est appliqué avant
/// le `BufferLayer` et la console.
pub fn init_logging(options: LoggingOptions) -> LogState {
    let (filter, reload_handle) = reload::Layer::new(LevelFilter::from_level(options.min_level));

    let log_state = LogState::new(options.buffer_capacity, options.min_level, reload_handle);

    let subscriber = Registry::default()
        .with(filter)
        .with(BufferLayer::new(log_state.clone()));

    let result = if options.enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };

    if let Err(e) = result {
        eprintln!("Global tracing subscriber already installed: {}", e);
    }

    log_state
}

/// Corps de `POST /api/logs/log_setup`
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LogSetupRequest {
    #[schema(example = "DEBUG")]
    pub level: String,
}

/// Niveau courant et niveaux acceptés
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LogSetupResponse {
    pub current_level: String,
    pub available_levels: Vec<String>,
}

impl From<Level> for LogSetupResponse {
    fn from(level: Level) -> Self {
        Self {
            current_level: level.as_str().to_string(),
            available_levels: LOG_LEVELS.iter().map(|l| l.as_str().to_string()).collect(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LogSetupError {
    pub error: String,
}

#[utoipa::path(
    get,
    path = "/log_setup",
    responses(
        (status = 200, description = "Niveau de log courant", body = LogSetupResponse)
    ),
    tag = "logs"
)]
pub async fn log_setup_get(State(state): State<LogState>) -> Json<LogSetupResponse> {
    Json(state.get_max_level().into())
}

/// Change le niveau de log sans redémarrer
#[utoipa::path(
    post,
    path = "/log_setup",
    request_body = LogSetupRequest,
    responses(
        (status = 200, description = "Niveau appliqué", body = LogSetupResponse),
        (status = 400, description = "Niveau inconnu", body = LogSetupError)
    ),
    tag = "logs"
)]
pub async fn log_setup_post(
    State(state): State<LogState>,
    Json(payload): Json<LogSetupRequest>,
) -> Result<Json<LogSetupResponse>, (StatusCode, Json<LogSetupError>)> {
    let level = parse_level(&payload.level).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(LogSetupError {
                error: format!("Unknown log level {:?}", payload.level),
            }),
        )
    })?;

    state.set_max_level(level);
    tracing::info!("Log level set to {}", level);
    Ok(Json(level.into()))
}

/// `ERROR`..`TRACE`, sans tenir compte de la casse
fn parse_level(name: &str) -> Option<Level> {
    LOG_LEVELS
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(name.trim()))
}

/// Crée le router pour l'API de gestion des logs
pub fn create_logs_router(log_state: LogState) -> axum::Router {
    use axum::routing::get;
    axum::Router::new()
        .route("/log_setup", get(log_setup_get).post(log_setup_post))
        .with_state(log_state)
}

/// API OpenAPI pour la gestion des logs
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(log_setup_get, log_setup_post),
    components(schemas(LogSetupRequest, LogSetupResponse)),
    tags(
        (name = "logs", description = "Log level configuration endpoints")
    )
)]
pub struct LogsApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state(capacity: usize) -> LogState {
        let (_filter, handle) = reload::Layer::<LevelFilter, Registry>::new(LevelFilter::TRACE);
        LogState::new(capacity, Level::TRACE, handle)
    }

    fn entry(level: &str, message: &str) -> LogEntry {
        LogEntry {
            level: level.to_string(),
            ..LogEntry::now(&Level::INFO, "mfycache::jobs", message)
        }
    }

    #[test]
    fn test_buffer_is_bounded() {
        let state = test_state(2);
        state.push(entry("INFO", "one"));
        state.push(entry("INFO", "two"));
        state.push(entry("INFO", "three"));

        let dump = state.dump();
        assert_eq!(dump.len(), 2);
        assert_eq!(dump[0].message, "two");
        assert_eq!(dump[1].message, "three");
    }

    #[test]
    fn test_query_respects_current_level() {
        let query = LogQuery::default();
        assert!(query.accepts(&entry("ERROR", "x"), Level::WARN));
        assert!(query.accepts(&entry("WARN", "x"), Level::WARN));
        assert!(!query.accepts(&entry("INFO", "x"), Level::WARN));
        assert!(query.accepts(&entry("TRACE", "x"), Level::TRACE));
        assert!(!query.accepts(&entry("bogus", "x"), Level::TRACE));
    }

    #[test]
    fn test_query_flags_and_search() {
        let e = entry("WARN", "transfer failed for 4uLU6hMCjMI75M1A2tKUQC");

        let only_errors = LogQuery {
            error: Some(true),
            ..Default::default()
        };
        assert!(!only_errors.accepts(&e, Level::TRACE));

        let search = LogQuery {
            search: Some("4uLU6h".to_string()),
            ..Default::default()
        };
        assert!(search.accepts(&e, Level::TRACE));

        let by_target = LogQuery {
            warn: Some(true),
            search: Some("jobs".to_string()),
            ..Default::default()
        };
        assert!(by_target.accepts(&e, Level::TRACE));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level(" WARN "), Some(Level::WARN));
        assert_eq!(parse_level("verbose"), None);
    }

    #[tokio::test]
    async fn test_push_is_broadcast() {
        let state = test_state(10);
        let mut rx = state.subscribe();
        state.push(entry("INFO", "hello"));
        assert_eq!(rx.recv().await.unwrap().message, "hello");
    }
}
