use crate::error::RegistryError;
use base64::{engine::general_purpose, Engine as _};
use std::io::Write;
use std::process::{Command, Stdio};
use x25519_dalek::{PublicKey, StaticSecret};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

pub trait KeyGenerator: Send + Sync {
    fn generate(&self) -> Result<KeyPair, RegistryError>;
}

/**
 * @brief Key generator backed by the `wg` command line tool.
 *
 * Runs `wg genkey`, then feeds the private key to `wg pubkey` on stdin.
 */
pub struct WgToolKeyGenerator {
    binary: String,
}

impl WgToolKeyGenerator {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn run(&self, arg: &str, input: Option<&str>) -> Result<String, RegistryError> {
        let mut child = Command::new(&self.binary)
            .arg(arg)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RegistryError::ExternalPrimitive(format!("{} {}: {}", self.binary, arg, e)))?;
        if let Some(text) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(text.as_bytes())
                    .map_err(|e| RegistryError::ExternalPrimitive(format!("{} {}: {}", self.binary, arg, e)))?;
            }
        }
        let out = child
            .wait_with_output()
            .map_err(|e| RegistryError::ExternalPrimitive(format!("{} {}: {}", self.binary, arg, e)))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(RegistryError::ExternalPrimitive(format!(
                "{} {} exited with {}: {}",
                self.binary,
                arg,
                out.status,
                stderr.trim()
            )));
        }
        let value = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if value.is_empty() {
            return Err(RegistryError::ExternalPrimitive(format!("{} {} produced no output", self.binary, arg)));
        }
        Ok(value)
    }
}

impl KeyGenerator for WgToolKeyGenerator {
    fn generate(&self) -> Result<KeyPair, RegistryError> {
        let private_key = self.run("genkey", None)?;
        let public_key = self.run("pubkey", Some(&private_key))?;
        Ok(KeyPair { private_key, public_key })
    }
}

/// In-process Curve25519 keys, same text format as `wg genkey`/`wg pubkey`.
#[derive(Debug, Default, Clone, Copy)]
pub struct X25519KeyGenerator;

impl KeyGenerator for X25519KeyGenerator {
    fn generate(&self) -> Result<KeyPair, RegistryError> {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);
        Ok(KeyPair {
            private_key: general_purpose::STANDARD.encode(secret.to_bytes()),
            public_key: general_purpose::STANDARD.encode(public.as_bytes()),
        })
    }
}

/**
 * @brief Derive the Base64 public key for a Base64 private key.
 * @param private_b64 Base64-encoded 32-byte private key.
 */
pub fn public_key_from_private(private_b64: &str) -> Result<String, RegistryError> {
    let bytes = decode_key(private_b64)?;
    let public = PublicKey::from(&StaticSecret::from(bytes));
    Ok(general_purpose::STANDARD.encode(public.as_bytes()))
}

fn decode_key(b64: &str) -> Result<[u8; 32], RegistryError> {
    let bytes = general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| RegistryError::validation(format!("invalid key encoding: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| RegistryError::validation("Invalid key length"))
}
