use crate::config::{KeyBackend, ServerConfig};
use crate::error::RegistryError;
use crate::filelog;
use crate::keys::{KeyGenerator, KeyPair, WgToolKeyGenerator, X25519KeyGenerator};
use crate::store::{JsonPeerStore, PeerRecord, PeerStore};
use crate::wg::{self, ClientEndpoint, ConfigSynthesizer, InterfaceSettings, ScriptActivator};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Lowest hostID a peer may hold; `.1` is the server.
pub const HOST_ID_MIN: i64 = 2;
/// Highest hostID accepted when supplied explicitly.
pub const HOST_ID_MAX: i64 = 254;
/// Automatic allocation stops before this value, so it only hands out 2..=253.
const ALLOCATION_END: i64 = 254;

/**
 * @brief Resolve the hostID for a new peer.
 * @param assigned hostIDs already held by existing peers.
 * @param requested Caller supplied hostID, passed through unchecked.
 * @return The requested value, or the smallest free value in [2, 254).
 */
pub fn allocate_host_id(assigned: &[i64], requested: Option<i64>) -> Result<i64, RegistryError> {
    if let Some(h) = requested {
        return Ok(h);
    }
    (HOST_ID_MIN..ALLOCATION_END)
        .find(|candidate| !assigned.contains(candidate))
        .ok_or(RegistryError::CapacityExhausted)
}

/// Parse a hostID supplied as text.
pub fn parse_host_id(s: &str) -> Result<i64, RegistryError> {
    s.trim()
        .parse::<i64>()
        .map_err(|_| RegistryError::validation("hostID must be a number"))
}

/// Partial fields merged over an existing record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerUpdate {
    pub name: Option<String>,
    pub host_id: Option<i64>,
    pub public_key: Option<String>,
    pub private_key: Option<String>,
    pub keep_alive: Option<u16>,
}

impl PeerUpdate {
    fn merge_into(self, mut peer: PeerRecord) -> PeerRecord {
        if let Some(name) = self.name {
            peer.name = name;
        }
        if let Some(h) = self.host_id {
            peer.host_id = Some(h);
        }
        if let Some(k) = self.public_key {
            peer.public_key = k;
        }
        if let Some(k) = self.private_key {
            peer.private_key = k;
        }
        if let Some(secs) = self.keep_alive {
            peer.keep_alive = Some(secs);
        }
        peer
    }
}

impl From<KeyPair> for PeerUpdate {
    fn from(pair: KeyPair) -> Self {
        Self {
            private_key: Some(pair.private_key),
            public_key: Some(pair.public_key),
            ..Default::default()
        }
    }
}

/**
 * @brief Single entry point for peer mutations.
 *
 * Each mutation persists to the store and then regenerates and activates the
 * interface config. Mutations are serialized on one lock. If activation fails the
 * store change stays in place and the error is returned.
 */
pub struct Registry {
    store: Box<dyn PeerStore>,
    keys: Box<dyn KeyGenerator>,
    synth: ConfigSynthesizer,
    endpoint: ClientEndpoint,
    audit_log: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl Registry {
    pub fn new(
        store: Box<dyn PeerStore>,
        keys: Box<dyn KeyGenerator>,
        synth: ConfigSynthesizer,
        endpoint: ClientEndpoint,
    ) -> Self {
        Self { store, keys, synth, endpoint, audit_log: None, write_lock: Mutex::new(()) }
    }

    pub fn with_audit_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log = Some(path.into());
        self
    }

    /// Wire up the JSON store, configured key backend and activation script.
    pub fn from_config(cfg: &ServerConfig) -> Result<Self, RegistryError> {
        let store = JsonPeerStore::open(&cfg.peers_file)?;
        let keys: Box<dyn KeyGenerator> = match cfg.key_backend {
            KeyBackend::Wg => Box::new(WgToolKeyGenerator::new(cfg.wg_binary.clone())),
            KeyBackend::Native => Box::new(X25519KeyGenerator),
        };
        let synth = ConfigSynthesizer::new(
            InterfaceSettings::from(cfg),
            cfg.config_file.clone(),
            Box::new(ScriptActivator::new(cfg.activation_script.clone())),
        );
        let registry = Self::new(Box::new(store), keys, synth, ClientEndpoint::from(cfg));
        Ok(match &cfg.audit_log {
            Some(p) => registry.with_audit_log(p.clone()),
            None => registry,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn audit(&self, line: &str) {
        if let Some(p) = &self.audit_log {
            filelog::write_line(p, line);
        }
    }

    fn resync(&self) -> Result<(), RegistryError> {
        let peers = self.store.list()?;
        self.synth.resync(&peers)
    }

    pub fn list_peers(&self) -> Result<Vec<PeerRecord>, RegistryError> {
        self.store.list()
    }

    /// `Ok(None)` when no peer has this id.
    pub fn get_peer(&self, id: &str) -> Result<Option<PeerRecord>, RegistryError> {
        Ok(self.store.list()?.into_iter().find(|p| p.id == id))
    }

    pub fn create_peer(
        &self,
        name: &str,
        host_id: Option<i64>,
        keep_alive: Option<u16>,
    ) -> Result<PeerRecord, RegistryError> {
        let _guard = self.lock();
        let pair = self.keys.generate()?;
        let assigned: Vec<i64> = self.store.list()?.iter().filter_map(|p| p.host_id).collect();
        let host_id = allocate_host_id(&assigned, host_id)?;
        let record = PeerRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            host_id: Some(host_id),
            public_key: pair.public_key,
            private_key: pair.private_key,
            keep_alive,
        };
        let peer = self.store.create(record).map_err(|e| {
            log::debug!("create {} rejected: {}", name, e);
            e
        })?;
        log::info!("created peer {} ({}) with hostID {}", peer.name, peer.id, host_id);
        self.audit(&format!("created {} {} hostID={}", peer.id, peer.name, host_id));
        self.resync()?;
        Ok(peer)
    }

    pub fn update_peer(&self, id: &str, fields: PeerUpdate) -> Result<PeerRecord, RegistryError> {
        let _guard = self.lock();
        self.update_locked(id, fields)
    }

    fn update_locked(&self, id: &str, fields: PeerUpdate) -> Result<PeerRecord, RegistryError> {
        let existing = self
            .get_peer(id)?
            .ok_or_else(|| RegistryError::NotFound(format!("user {}", id)))?;
        let peer = self.store.update(fields.merge_into(existing)).map_err(|e| {
            log::debug!("update {} rejected: {}", id, e);
            e
        })?;
        log::info!("updated peer {} ({})", peer.name, peer.id);
        self.audit(&format!("updated {} {}", peer.id, peer.name));
        self.resync()?;
        Ok(peer)
    }

    pub fn delete_peer(&self, id: &str) -> Result<PeerRecord, RegistryError> {
        let _guard = self.lock();
        let peer = self.store.delete(id)?;
        log::info!("deleted peer {} ({})", peer.name, peer.id);
        self.audit(&format!("deleted {} {}", peer.id, peer.name));
        self.resync()?;
        Ok(peer)
    }

    pub fn regenerate_keys(&self, id: &str) -> Result<PeerRecord, RegistryError> {
        let _guard = self.lock();
        let pair = self.keys.generate()?;
        self.update_locked(id, PeerUpdate::from(pair))
    }

    /// Client-side config for one peer.
    pub fn client_config(&self, id: &str) -> Result<String, RegistryError> {
        let peer = self
            .get_peer(id)?
            .ok_or_else(|| RegistryError::NotFound(format!("user {}", id)))?;
        Ok(wg::generate_client_config(&peer, &self.endpoint))
    }

    /// Server config for the current collection, without writing or activating it.
    pub fn render_server_config(&self) -> Result<String, RegistryError> {
        Ok(self.synth.render(&self.store.list()?))
    }
}
