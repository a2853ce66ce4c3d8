use crate::config::ServerConfig;
use crate::error::RegistryError;
use crate::store::PeerRecord;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Server side `[Interface]` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSettings {
    pub network: String,
    pub listen_port: u16,
    pub private_key: String,
}

impl From<&ServerConfig> for InterfaceSettings {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            network: cfg.network.clone(),
            listen_port: cfg.listen_port,
            private_key: cfg.server_private_key.clone(),
        }
    }
}

/// What a client needs to reach the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEndpoint {
    pub network: String,
    pub server_public_key: String,
    pub hostname: String,
    pub port: u16,
}

impl From<&ServerConfig> for ClientEndpoint {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            network: cfg.network.clone(),
            server_public_key: cfg.server_public_key.clone(),
            hostname: cfg.server_hostname.clone(),
            port: cfg.listen_port,
        }
    }
}

/**
 * @brief Render the full server interface config.
 * @param peers Peer records in store order.
 * @param iface Server interface settings.
 * @return Config text, one `[Peer]` block per record.
 */
pub fn render_server_config(peers: &[PeerRecord], iface: &InterfaceSettings) -> String {
    let mut out = format!(
        "[Interface]\nAddress = {}.1/24\nListenPort={}\nPrivateKey={}\n",
        iface.network, iface.listen_port, iface.private_key
    );
    for peer in peers {
        let host_id = peer.host_id.map(|h| h.to_string()).unwrap_or_default();
        let _ = write!(
            out,
            "\n### begin {name} ###\n[Peer]\nPublicKey = {key}\nAllowedIPs = {net}.{host}/32\n### end {name} ###\n",
            name = peer.name,
            key = peer.public_key,
            net = iface.network,
            host = host_id,
        );
    }
    out
}

/**
 * @brief Render the config handed to a single client.
 * @param peer The client's record.
 * @param endpoint Server endpoint details.
 */
pub fn generate_client_config(peer: &PeerRecord, endpoint: &ClientEndpoint) -> String {
    let host_id = peer.host_id.map(|h| h.to_string()).unwrap_or_default();
    let mut out = format!(
        "[Interface]\nPrivateKey = {}\nAddress = {}.{}/32\n\n[Peer]\nPublicKey = {}\nEndpoint = {}:{}\nAllowedIPs = 0.0.0.0/0",
        peer.private_key, endpoint.network, host_id, endpoint.server_public_key, endpoint.hostname, endpoint.port
    );
    if let Some(secs) = peer.keep_alive {
        let _ = write!(out, "\nPersistentKeepalive = {}", secs);
    }
    out
}

/// Terminal QR rendering of a client config.
pub fn client_config_qr(text: &str) -> Result<String, RegistryError> {
    let code = qrcode::QrCode::new(text.as_bytes())
        .map_err(|e| RegistryError::validation(format!("config too large for QR code: {}", e)))?;
    Ok(code.render::<char>().quiet_zone(false).module_dimensions(2, 1).build())
}

pub trait Activator: Send + Sync {
    /// Apply the freshly written config. Returns the action's output.
    fn activate(&self) -> Result<String, RegistryError>;
}

/// Runs an executable with no arguments. Relative paths resolve against the
/// working directory, never `PATH`.
pub struct ScriptActivator {
    script: PathBuf,
}

impl ScriptActivator {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self { script: script.into() }
    }

    /// The path actually executed.
    pub fn program(&self) -> PathBuf {
        if self.script.is_relative() {
            Path::new(".").join(&self.script)
        } else {
            self.script.clone()
        }
    }
}

impl Activator for ScriptActivator {
    fn activate(&self) -> Result<String, RegistryError> {
        log::info!("running: {}", self.script.display());
        let out = Command::new(self.program())
            .output()
            .map_err(|e| RegistryError::ExternalPrimitive(format!("{}: {}", self.script.display(), e)))?;
        let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        if !stdout.trim().is_empty() {
            log::info!("{}", stdout.trim_end());
        }
        if !out.status.success() {
            return Err(RegistryError::ExternalPrimitive(format!(
                "{} exited with {}: {}",
                self.script.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(stdout)
    }
}

/// Writes the server config file and triggers activation.
pub struct ConfigSynthesizer {
    iface: InterfaceSettings,
    config_file: PathBuf,
    activator: Box<dyn Activator>,
}

impl ConfigSynthesizer {
    pub fn new(iface: InterfaceSettings, config_file: impl Into<PathBuf>, activator: Box<dyn Activator>) -> Self {
        Self { iface, config_file: config_file.into(), activator }
    }

    pub fn render(&self, peers: &[PeerRecord]) -> String {
        render_server_config(peers, &self.iface)
    }

    /// Regenerate the whole file from `peers`, then activate it.
    pub fn resync(&self, peers: &[PeerRecord]) -> Result<(), RegistryError> {
        let text = self.render(peers);
        fs::write(&self.config_file, text).map_err(|e| {
            RegistryError::Storage(format!("writing {}: {}", self.config_file.display(), e))
        })?;
        log::debug!("wrote {} with {} peers", self.config_file.display(), peers.len());
        self.activator.activate()?;
        Ok(())
    }
}
