//! Configuration Vault – reads/writes `~/.iris/config.toml`.

use iris_types::{TopicNames, TransportKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted form of [`TopicNames`]; every role falls back to its own
/// documented default when missing from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topics {
    pub raw_image: String,
    pub processed_image: String,
    pub steering: String,
    pub speed: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            raw_image: "/camera/image_raw/compressed".to_string(),
            processed_image: "/lane_detection/image_processed/compressed".to_string(),
            steering: "/lane_detection/steering_angle".to_string(),
            speed: "/vehicle/speed".to_string(),
        }
    }
}

impl Topics {
    pub fn to_names(&self) -> TopicNames {
        TopicNames {
            raw_image: self.raw_image.clone(),
            processed_image: self.processed_image.clone(),
            steering: self.steering.clone(),
            speed: self.speed.clone(),
        }
    }
}

/// Persisted user configuration stored in `~/.iris/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Transport used by a bare `/connect`.
    #[serde(default)]
    pub kind: TransportKind,

    /// Endpoint of the vehicle's socket server.
    #[serde(default = "default_socket_endpoint")]
    pub socket_endpoint: String,

    /// Endpoint of the rosbridge server.
    #[serde(default = "default_bridge_endpoint")]
    pub bridge_endpoint: String,

    #[serde(default)]
    pub topics: Topics,
}

fn default_socket_endpoint() -> String {
    "ws://localhost:8080".to_string()
}
fn default_bridge_endpoint() -> String {
    "ws://localhost:9090".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            socket_endpoint: default_socket_endpoint(),
            bridge_endpoint: default_bridge_endpoint(),
            topics: Topics::default(),
        }
    }
}

impl Config {
    /// Endpoint configured for `kind`.
    pub fn endpoint_for(&self, kind: TransportKind) -> &str {
        match kind {
            TransportKind::Socket => &self.socket_endpoint,
            TransportKind::Bridge => &self.bridge_endpoint,
        }
    }

    /// Endpoint of the currently selected kind.
    pub fn endpoint(&self) -> &str {
        self.endpoint_for(self.kind)
    }

    fn endpoint_mut(&mut self) -> &mut String {
        match self.kind {
            TransportKind::Socket => &mut self.socket_endpoint,
            TransportKind::Bridge => &mut self.bridge_endpoint,
        }
    }
}

/// Return the path to `~/.iris/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".iris").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `IRIS_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `IRIS_KIND` | `kind` (`socket` / `bridge`) |
/// | `IRIS_ENDPOINT` | endpoint of the selected kind |
/// | `IRIS_TOPIC_RAW` | `topics.raw_image` |
/// | `IRIS_TOPIC_PROCESSED` | `topics.processed_image` |
/// | `IRIS_TOPIC_STEERING` | `topics.steering` |
/// | `IRIS_TOPIC_SPEED` | `topics.speed` |
///
/// Unparseable or blank values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    // Kind first, so IRIS_ENDPOINT lands on the right endpoint.
    if let Some(kind) = get("IRIS_KIND").and_then(|v| v.parse::<TransportKind>().ok()) {
        cfg.kind = kind;
    }
    if let Some(v) = get("IRIS_ENDPOINT") {
        *cfg.endpoint_mut() = v;
    }
    if let Some(v) = get("IRIS_TOPIC_RAW") {
        cfg.topics.raw_image = v;
    }
    if let Some(v) = get("IRIS_TOPIC_PROCESSED") {
        cfg.topics.processed_image = v;
    }
    if let Some(v) = get("IRIS_TOPIC_STEERING") {
        cfg.topics.steering = v;
    }
    if let Some(v) = get("IRIS_TOPIC_SPEED") {
        cfg.topics.speed = v;
    }
}

/// Save the config to disk, creating `~/.iris/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
