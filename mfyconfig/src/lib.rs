//! # mfyconfig - Configuration de Musify
//!
//! La configuration est un arbre YAML construit en trois couches :
//!
//! 1. les valeurs par défaut embarquées (`musify.yaml`) ;
//! 2. le fichier `config.yaml` du répertoire de configuration, fusionné
//!    par-dessus (les tables sont fusionnées, les scalaires remplacés) ;
//! 3. les variables d'environnement `MUSIFY_CONFIG__SECTION__CLE=valeur`.
//!
//! Le résultat est réécrit dans `config.yaml` au chargement et à chaque
//! modification.
//!
//! ```no_run
//! use mfyconfig::get_config;
//!
//! let config = get_config();
//! println!("port {} / backend {}", config.get_http_port(), config.get_backend_url());
//! config.set_http_port(9000)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Les autres crates ajoutent leurs accesseurs par des traits d'extension
//! (`StreamCacheConfigExt`, `SpotifyConfigExt`).

use anyhow::{Context, Result, anyhow};
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, info, warn};

const DEFAULT_CONFIG: &str = include_str!("musify.yaml");

const ENV_CONFIG_DIR: &str = "MUSIFY_CONFIG";
const ENV_PREFIX: &str = "MUSIFY_CONFIG__";
const CONFIG_DIR_NAME: &str = ".musify";
const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_BASE_URL: &str = "localhost";
const DEFAULT_HTTP_PORT: u16 = 3000;
const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load Musify configuration"));
}

/// Réglages du logger (`host.logger`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerSettings {
    pub buffer_capacity: usize,
    pub enable_console: bool,
    pub min_level: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            enable_console: true,
            min_level: "INFO".to_string(),
        }
    }
}

/// Configuration chargée et persistée dans `<dir>/config.yaml`
#[derive(Debug)]
pub struct Config {
    dir: PathBuf,
    file: PathBuf,
    tree: Mutex<Value>,
}

impl Config {
    /// Répertoire de configuration à utiliser
    ///
    /// Ordre de recherche : `directory` s'il n'est pas vide, la variable
    /// `MUSIFY_CONFIG`, `./.musify`, `~/.musify`. À défaut, `./.musify` est
    /// créé. Le répertoire retenu doit être accessible en écriture.
    pub fn config_dir(directory: &str) -> Result<PathBuf> {
        let dir = locate_config_dir(directory);
        ensure_writable_dir(&dir)?;
        Ok(dir)
    }

    /// Charge la configuration depuis `directory` (voir [`Config::config_dir`])
    pub fn load_config(directory: &str) -> Result<Self> {
        let dir = Self::config_dir(directory)?;
        let file = dir.join(CONFIG_FILE_NAME);
        info!(config_dir = %dir.display(), "Using config directory");

        let mut tree = lowercase_keys(serde_yaml::from_str(DEFAULT_CONFIG)?);
        match fs::read_to_string(&file) {
            Ok(text) => {
                let user: Value = serde_yaml::from_str(&text)
                    .with_context(|| format!("Invalid YAML in {}", file.display()))?;
                merge_yaml(&mut tree, &lowercase_keys(user));
                info!(config_file = %file.display(), "Loaded config file");
            }
            Err(_) => info!(config_file = %file.display(), "No config file, using defaults"),
        }

        apply_overrides(&mut tree, env::vars());

        let config = Config {
            dir,
            file,
            tree: Mutex::new(tree),
        };
        config.save()?;
        Ok(config)
    }

    /// Répertoire contenant `config.yaml`
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Réécrit `config.yaml`
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.tree.lock().unwrap())?;
        fs::write(&self.file, yaml)
            .with_context(|| format!("Cannot write {}", self.file.display()))
    }

    /// Remplace la valeur à `path` (ex: `&["host", "http_port"]`) et sauvegarde
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        insert_at(&mut self.tree.lock().unwrap(), path, value)?;
        self.save()
    }

    /// Valeur à `path` ; erreur si une clé du chemin manque
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let tree = self.tree.lock().unwrap();
        let mut node = &*tree;
        for (depth, key) in path.iter().enumerate() {
            node = node
                .as_mapping()
                .and_then(|map| map.get(key.to_lowercase()))
                .ok_or_else(|| anyhow!("No configuration entry {}", path[..=depth].join(".")))?;
        }
        Ok(node.clone())
    }

    /// Entier positif à `path`, ou `default` si absent ou invalide
    ///
    /// Les surcharges d'environnement peuvent arriver sous forme de chaîne.
    pub fn get_u64_or(&self, path: &[&str], default: u64) -> u64 {
        match self.get_value(path) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Ok(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_bool_or(&self, path: &[&str], default: bool) -> bool {
        match self.get_value(path) {
            Ok(Value::Bool(b)) => b,
            Ok(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Chaîne non vide à `path`, ou `default`
    pub fn get_string_or(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => default.to_string(),
        }
    }

    /// Répertoire géré par la configuration
    ///
    /// Un chemin relatif est résolu par rapport au répertoire de
    /// configuration. Le répertoire est créé s'il n'existe pas ; si la clé
    /// est absente, `default` y est enregistré.
    ///
    /// ```no_run
    /// let config = mfyconfig::get_config();
    /// let dir = config.get_managed_dir(&["host", "stream_cache", "directory"], "cache_audio")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let configured = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };

        let dir = self.dir.join(configured);
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
            info!(directory = %dir.display(), "Created managed directory");
        }
        Ok(dir)
    }

    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Nom d'hôte annoncé par le serveur HTTP
    pub fn get_base_url(&self) -> String {
        self.get_string_or(&["host", "base_url"], DEFAULT_BASE_URL)
    }

    /// Port HTTP ; la valeur par défaut (3000) remplace un port hors limites
    pub fn get_http_port(&self) -> u16 {
        let port = self.get_u64_or(&["host", "http_port"], DEFAULT_HTTP_PORT.into());
        u16::try_from(port).unwrap_or_else(|_| {
            warn!("Invalid HTTP port {}, using {}", port, DEFAULT_HTTP_PORT);
            DEFAULT_HTTP_PORT
        })
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::Number(Number::from(port)))
    }

    /// URL du backend de téléchargement spotDL
    pub fn get_backend_url(&self) -> String {
        self.get_string_or(&["backend", "url"], DEFAULT_BACKEND_URL)
    }

    pub fn set_backend_url(&self, url: String) -> Result<()> {
        self.set_value(&["backend", "url"], Value::String(url))
    }

    /// Réglages `host.logger`, complétés par les valeurs par défaut
    pub fn get_logger_settings(&self) -> LoggerSettings {
        let defaults = LoggerSettings::default();
        let capacity = self.get_u64_or(
            &["host", "logger", "buffer_capacity"],
            defaults.buffer_capacity as u64,
        );
        LoggerSettings {
            buffer_capacity: usize::try_from(capacity).unwrap_or(defaults.buffer_capacity),
            enable_console: self
                .get_bool_or(&["host", "logger", "enable_console"], defaults.enable_console),
            min_level: self.get_string_or(&["host", "logger", "min_level"], &defaults.min_level),
        }
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Configuration globale, chargée au premier accès
///
/// Les tests et les intégrations qui ont besoin d'isolation construisent
/// leur propre instance avec [`Config::load_config`].
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

fn locate_config_dir(explicit: &str) -> PathBuf {
    if !explicit.is_empty() {
        return PathBuf::from(explicit);
    }
    if let Ok(from_env) = env::var(ENV_CONFIG_DIR) {
        debug!(path = %from_env, "Config directory from {}", ENV_CONFIG_DIR);
        return PathBuf::from(from_env);
    }

    let local = PathBuf::from(CONFIG_DIR_NAME);
    let home = dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME));
    [Some(local.clone()), home]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.is_dir())
        .unwrap_or(local)
}

fn ensure_writable_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    if !dir.is_dir() {
        return Err(anyhow!("{} is not a directory", dir.display()));
    }
    let probe = dir.join(".write_test");
    fs::write(&probe, b"musify")
        .with_context(|| format!("{} is not writable", dir.display()))?;
    fs::remove_file(&probe)?;
    Ok(())
}

/// Fusionne `overlay` dans `base` : tables fusionnées, le reste remplacé
fn merge_yaml(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, value)| {
                    let key = match key {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (key, lowercase_keys(value))
                })
                .collect::<Mapping>(),
        ),
        Value::Sequence(items) => {
            Value::Sequence(items.into_iter().map(lowercase_keys).collect())
        }
        other => other,
    }
}

/// Applique les variables `MUSIFY_CONFIG__A__B=valeur` ; la valeur est lue
/// comme un scalaire YAML
fn apply_overrides(tree: &mut Value, vars: impl IntoIterator<Item = (String, String)>) {
    for (name, raw) in vars {
        let Some(path) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<&str> = path.split("__").filter(|s| !s.is_empty()).collect();
        let value = serde_yaml::from_str(&raw).unwrap_or(Value::String(raw.clone()));
        if let Err(e) = insert_at(tree, &path, value) {
            warn!("Ignoring {}: {}", name, e);
        }
    }
}

fn insert_at(tree: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        *tree = value;
        return Ok(());
    };

    let mut node = tree;
    for key in parents {
        let map = node
            .as_mapping_mut()
            .ok_or_else(|| anyhow!("{} is not a table", key))?;
        node = map
            .entry(Value::String(key.to_lowercase()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
    }
    node.as_mapping_mut()
        .ok_or_else(|| anyhow!("Parent of {} is not a table", last))?
        .insert(Value::String(last.to_lowercase()), value);
    Ok(())
}
