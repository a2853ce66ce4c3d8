/* \page RegistryOverview Registry Overview
WireGuard peer registry and interface config synthesis.

- Startup configuration loading and server key bootstrap (`config.rs`).
- Peer record storage and validation (`store.rs`).
- Key pair generation (`keys.rs`).
- Host ID allocation and the registry service (`peer_registry.rs`).
- Server/client config rendering and activation (`wg.rs`).
- Audit trail (`filelog.rs`).
*/
pub mod config;
pub mod error;
pub mod filelog;
pub mod keys;
pub mod peer_registry;
pub mod store;
pub mod wg;

pub use error::{ConfigError, RegistryError};
pub use peer_registry::{PeerUpdate, Registry};
pub use store::PeerRecord;
