#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use vpn_registry::keys::{KeyGenerator, KeyPair};
use vpn_registry::store::JsonPeerStore;
use vpn_registry::wg::{Activator, ClientEndpoint, ConfigSynthesizer, InterfaceSettings};
use vpn_registry::{Registry, RegistryError};

/// Deterministic keys: `priv-N` / `pub-N`.
pub struct SequenceKeys {
    pub calls: Arc<AtomicUsize>,
}

impl KeyGenerator for SequenceKeys {
    fn generate(&self) -> Result<KeyPair, RegistryError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(KeyPair { private_key: format!("priv-{}", n), public_key: format!("pub-{}", n) })
    }
}

pub struct FailingKeys;

impl KeyGenerator for FailingKeys {
    fn generate(&self) -> Result<KeyPair, RegistryError> {
        Err(RegistryError::ExternalPrimitive("wg genkey: not installed".into()))
    }
}

pub struct RecordingActivator {
    pub runs: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
}

impl Activator for RecordingActivator {
    fn activate(&self) -> Result<String, RegistryError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RegistryError::ExternalPrimitive("restart script exited with 1".into()));
        }
        Ok("restarted\n".into())
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub registry: Registry,
    pub peers_file: PathBuf,
    pub config_file: PathBuf,
    pub key_calls: Arc<AtomicUsize>,
    pub activations: Arc<AtomicUsize>,
    pub fail_activation: Arc<AtomicBool>,
}

impl Harness {
    pub fn config_text(&self) -> String {
        std::fs::read_to_string(&self.config_file).unwrap_or_default()
    }

    pub fn store_text(&self) -> String {
        std::fs::read_to_string(&self.peers_file).unwrap()
    }
}

pub fn endpoint() -> ClientEndpoint {
    ClientEndpoint {
        network: "10.8.0".into(),
        server_public_key: "SERVERPUB".into(),
        hostname: "vpn.example.org".into(),
        port: 51820,
    }
}

pub fn harness_with_keys(keys: Option<Box<dyn KeyGenerator>>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let peers_file = dir.path().join("clients.json");
    let config_file = dir.path().join("wg0.conf");
    let key_calls = Arc::new(AtomicUsize::new(0));
    let activations = Arc::new(AtomicUsize::new(0));
    let fail_activation = Arc::new(AtomicBool::new(false));
    let keys: Box<dyn KeyGenerator> = match keys {
        Some(k) => k,
        None => Box::new(SequenceKeys { calls: key_calls.clone() }),
    };
    let synth = ConfigSynthesizer::new(
        InterfaceSettings { network: "10.8.0".into(), listen_port: 51820, private_key: "SERVERPRIV".into() },
        config_file.clone(),
        Box::new(RecordingActivator { runs: activations.clone(), fail: fail_activation.clone() }),
    );
    let store = JsonPeerStore::open(&peers_file).unwrap();
    let registry = Registry::new(Box::new(store), keys, synth, endpoint());
    Harness { dir, registry, peers_file, config_file, key_calls, activations, fail_activation }
}

pub fn harness() -> Harness {
    harness_with_keys(None)
}

/// Write an executable `/bin/sh` script into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
