//! Flat peer record store.
//!
//! Every write reads the whole collection, applies one change and writes the whole
//! collection back. Name and hostID invariants are checked against the current
//! collection before anything is persisted.

use crate::error::RegistryError;
use crate::peer_registry::{HOST_ID_MAX, HOST_ID_MIN};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "hostID", default)]
    pub host_id: Option<i64>,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    #[serde(rename = "persistentKeepalive", default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<u16>,
}

pub trait PeerStore: Send + Sync {
    fn list(&self) -> Result<Vec<PeerRecord>, RegistryError>;
    fn create(&self, record: PeerRecord) -> Result<PeerRecord, RegistryError>;
    /// Replaces the record with the same id.
    fn update(&self, record: PeerRecord) -> Result<PeerRecord, RegistryError>;
    fn delete(&self, id: &str) -> Result<PeerRecord, RegistryError>;
}

/// Check `record` against every other record in `collection`.
pub fn validate_peer(record: &PeerRecord, collection: &[PeerRecord]) -> Result<(), RegistryError> {
    let others: Vec<&PeerRecord> = collection.iter().filter(|p| p.id != record.id).collect();
    if record.name.is_empty() {
        return Err(RegistryError::validation("username cannot be empty"));
    }
    if others.iter().any(|p| p.name == record.name) {
        return Err(RegistryError::validation("User with same name exists"));
    }
    let host_id = record
        .host_id
        .ok_or_else(|| RegistryError::validation("host ID cannot be empty"))?;
    if !(HOST_ID_MIN..=HOST_ID_MAX).contains(&host_id) {
        return Err(RegistryError::validation(format!(
            "host ID must be between {} and {}",
            HOST_ID_MIN, HOST_ID_MAX
        )));
    }
    if others.iter().any(|p| p.host_id == Some(host_id)) {
        return Err(RegistryError::validation("User cannot have same hostID as another user"));
    }
    Ok(())
}

fn apply_create(mut peers: Vec<PeerRecord>, record: &PeerRecord) -> Result<Vec<PeerRecord>, RegistryError> {
    validate_peer(record, &peers)?;
    peers.push(record.clone());
    Ok(peers)
}

fn apply_update(mut peers: Vec<PeerRecord>, record: &PeerRecord) -> Result<Vec<PeerRecord>, RegistryError> {
    validate_peer(record, &peers)?;
    let slot = peers
        .iter_mut()
        .find(|p| p.id == record.id)
        .ok_or_else(|| RegistryError::NotFound(format!("user {}", record.id)))?;
    *slot = record.clone();
    Ok(peers)
}

fn apply_delete(mut peers: Vec<PeerRecord>, id: &str) -> Result<(Vec<PeerRecord>, PeerRecord), RegistryError> {
    let idx = peers
        .iter()
        .position(|p| p.id == id)
        .ok_or_else(|| RegistryError::NotFound(format!("user {}", id)))?;
    let removed = peers.remove(idx);
    Ok((peers, removed))
}

/// Peer collection persisted as a pretty-printed JSON array.
pub struct JsonPeerStore {
    path: PathBuf,
}

impl JsonPeerStore {
    /// Opens the store, creating an empty `[]` collection if the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, "[]")?;
        }
        Ok(Self { path })
    }

    fn persist(&self, peers: &[PeerRecord]) -> Result<(), RegistryError> {
        let s = serde_json::to_string_pretty(peers)?;
        fs::write(&self.path, s)?;
        Ok(())
    }
}

impl PeerStore for JsonPeerStore {
    fn list(&self) -> Result<Vec<PeerRecord>, RegistryError> {
        let s = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&s)?)
    }

    fn create(&self, record: PeerRecord) -> Result<PeerRecord, RegistryError> {
        let peers = apply_create(self.list()?, &record)?;
        self.persist(&peers)?;
        Ok(record)
    }

    fn update(&self, record: PeerRecord) -> Result<PeerRecord, RegistryError> {
        let peers = apply_update(self.list()?, &record)?;
        self.persist(&peers)?;
        Ok(record)
    }

    fn delete(&self, id: &str) -> Result<PeerRecord, RegistryError> {
        let (peers, removed) = apply_delete(self.list()?, id)?;
        self.persist(&peers)?;
        Ok(removed)
    }
}

/// In-memory store with the same semantics as [`JsonPeerStore`].
#[derive(Default)]
pub struct MemoryPeerStore {
    peers: Mutex<Vec<PeerRecord>>,
}

impl MemoryPeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peers(peers: Vec<PeerRecord>) -> Self {
        Self { peers: Mutex::new(peers) }
    }

    fn snapshot(&self) -> Vec<PeerRecord> {
        self.peers.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn replace(&self, peers: Vec<PeerRecord>) {
        *self.peers.lock().unwrap_or_else(|e| e.into_inner()) = peers;
    }
}

impl PeerStore for MemoryPeerStore {
    fn list(&self) -> Result<Vec<PeerRecord>, RegistryError> {
        Ok(self.snapshot())
    }

    fn create(&self, record: PeerRecord) -> Result<PeerRecord, RegistryError> {
        self.replace(apply_create(self.snapshot(), &record)?);
        Ok(record)
    }

    fn update(&self, record: PeerRecord) -> Result<PeerRecord, RegistryError> {
        self.replace(apply_update(self.snapshot(), &record)?);
        Ok(record)
    }

    fn delete(&self, id: &str) -> Result<PeerRecord, RegistryError> {
        let (peers, removed) = apply_delete(self.snapshot(), id)?;
        self.replace(peers);
        Ok(removed)
    }
}
