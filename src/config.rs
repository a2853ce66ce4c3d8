use crate::error::ConfigError;
use crate::keys::{public_key_from_private, KeyGenerator, KeyPair, X25519KeyGenerator};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyBackend {
    /// Shell out to the `wg` tool.
    #[default]
    Wg,
    /// Generate keys in-process.
    Native,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// First three octets of the overlay /24, e.g. `10.8.0`.
    pub network: String,
    pub config_file: PathBuf,
    pub activation_script: PathBuf,
    pub listen_port: u16,
    pub server_private_key: String,
    pub server_public_key: String,
    pub server_hostname: String,
    pub peers_file: PathBuf,
    pub key_backend: KeyBackend,
    pub wg_binary: String,
    pub audit_log: Option<PathBuf>,
}

/// On-disk shape of `server.toml`. Every field may be supplied by the environment instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawServerConfig {
    pub network: Option<String>,
    pub config_file: Option<PathBuf>,
    pub activation_script: Option<PathBuf>,
    pub listen_port: Option<u16>,
    pub server_private_key: Option<String>,
    pub server_public_key: Option<String>,
    pub server_hostname: Option<String>,
    pub peers_file: Option<PathBuf>,
    pub key_backend: Option<KeyBackend>,
    pub wg_binary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
}

pub const DEFAULT_CONFIG_PATH: &str = "server.toml";

pub fn load_server_config(path: Option<PathBuf>) -> Result<ServerConfig, ConfigError> {
    let p = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let raw = if p.exists() {
        let s = fs::read_to_string(&p)?;
        toml::from_str::<RawServerConfig>(&s)?
    } else {
        log::debug!("{} not found, using environment only", p.display());
        RawServerConfig::default()
    };
    resolve(raw, |key| std::env::var(key).ok())
}

/**
 * @brief Overlay environment values on file values and validate required settings.
 * @param raw Values read from the config file.
 * @param env Lookup for environment variables.
 */
pub fn resolve<F>(raw: RawServerConfig, env: F) -> Result<ServerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let text = |key: &'static str, file: Option<String>| -> Result<String, ConfigError> {
        env(key)
            .or(file)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(key))
    };

    let network = text("NETWORK", raw.network)?;
    let config_file = PathBuf::from(text("CONFIG_FILE", raw.config_file.map(path_string))?);
    let activation_script = PathBuf::from(text(
        "WIREGUARD_SERVICE_SCRIPT_FILE",
        raw.activation_script.map(path_string),
    )?);
    let listen_port = match env("SERVER_PORT") {
        Some(v) => v.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
            key: "SERVER_PORT",
            reason: e.to_string(),
        })?,
        None => raw.listen_port.ok_or(ConfigError::Missing("SERVER_PORT"))?,
    };
    let server_private_key = text("SERVER_PRIVATE_KEY", raw.server_private_key)?;
    let server_public_key = text("SERVER_PUBLIC_KEY", raw.server_public_key)?;
    let server_hostname = text("SERVER_HOSTNAME", raw.server_hostname)?;
    let peers_file = env("PEERS_FILE")
        .map(PathBuf::from)
        .or(raw.peers_file)
        .unwrap_or_else(|| PathBuf::from("clients.json"));

    if network.split('.').count() != 3 || network.split('.').any(|o| o.parse::<u8>().is_err()) {
        return Err(ConfigError::Invalid {
            key: "NETWORK",
            reason: format!("expected three octets like 10.8.0, got {}", network),
        });
    }

    Ok(ServerConfig {
        network,
        config_file,
        activation_script,
        listen_port,
        server_private_key,
        server_public_key,
        server_hostname,
        peers_file,
        key_backend: raw.key_backend.unwrap_or_default(),
        wg_binary: raw.wg_binary.unwrap_or_else(|| "wg".into()),
        audit_log: raw.audit_log,
    })
}

fn path_string(p: PathBuf) -> String {
    p.to_string_lossy().into_owned()
}

/**
 * @brief Write a fresh `server.toml` for this server.
 * @param path Destination file; must not exist yet.
 * @param hostname Public hostname clients will dial.
 * @param private_key Existing Base64 server private key; a new pair is generated when absent.
 * @return The resulting configuration.
 */
pub fn write_config_template(
    path: Option<PathBuf>,
    hostname: &str,
    private_key: Option<&str>,
) -> Result<ServerConfig, ConfigError> {
    let p = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    if p.exists() {
        return Err(ConfigError::Invalid {
            key: "path",
            reason: format!("{} already exists", p.display()),
        });
    }
    let pair = match private_key {
        Some(k) => KeyPair {
            private_key: k.trim().to_string(),
            public_key: public_key_from_private(k).map_err(|e| ConfigError::Keygen(e.to_string()))?,
        },
        None => X25519KeyGenerator
            .generate()
            .map_err(|e| ConfigError::Keygen(e.to_string()))?,
    };
    let raw = RawServerConfig {
        network: Some("10.8.0".into()),
        config_file: Some(PathBuf::from("wg0.conf")),
        activation_script: Some(PathBuf::from("./restart-wireguard.sh")),
        listen_port: Some(51820),
        server_private_key: Some(pair.private_key),
        server_public_key: Some(pair.public_key.clone()),
        server_hostname: Some(hostname.to_string()),
        peers_file: Some(PathBuf::from("clients.json")),
        key_backend: Some(KeyBackend::Wg),
        wg_binary: Some("wg".into()),
        audit_log: None,
    };
    let s = toml::to_string_pretty(&raw)?;
    fs::write(&p, s)?;
    log::info!("Server public key: {}", pair.public_key);
    resolve(raw, |_| None)
}
