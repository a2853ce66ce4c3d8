use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use vpn_registry::config::{load_server_config, write_config_template};
use vpn_registry::peer_registry::parse_host_id;
use vpn_registry::{wg, ConfigError, PeerRecord, PeerUpdate, Registry, RegistryError};

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("error (config): {0}")]
    Config(#[from] ConfigError),

    #[error("error ({}): {}", .0.kind(), .0)]
    Registry(#[from] RegistryError),
}

fn print_peer(p: &PeerRecord) {
    let host = p.host_id.map(|h| h.to_string()).unwrap_or_else(|| "-".into());
    println!("{} {} {} {}", p.id, p.name, host, p.public_key);
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Cmd::Init { hostname, private_key } = &cli.cmd {
        let cfg = write_config_template(cli.config.clone(), hostname, private_key.as_deref())?;
        println!("Server public key: {}", cfg.server_public_key);
        return Ok(());
    }
    let cfg = load_server_config(cli.config)?;
    let registry = Registry::from_config(&cfg)?;
    match cli.cmd {
        Cmd::Init { .. } => {}
        Cmd::ListPeers => {
            for p in registry.list_peers()? {
                print_peer(&p);
            }
        }
        Cmd::ShowPeer { id } => match registry.get_peer(&id)? {
            Some(p) => print_peer(&p),
            None => return Err(RegistryError::NotFound(format!("user {}", id)).into()),
        },
        Cmd::AddPeer { name, host_id, keep_alive } => {
            let host_id = host_id.as_deref().map(parse_host_id).transpose()?;
            let p = registry.create_peer(name.trim(), host_id, keep_alive)?;
            print_peer(&p);
        }
        Cmd::UpdatePeer { id, name, host_id, keep_alive } => {
            let fields = PeerUpdate {
                name: name.filter(|n| !n.is_empty()),
                host_id: host_id.as_deref().map(parse_host_id).transpose()?,
                keep_alive,
                ..Default::default()
            };
            print_peer(&registry.update_peer(&id, fields)?);
        }
        Cmd::RemovePeer { id } => print_peer(&registry.delete_peer(&id)?),
        Cmd::RegenerateKeys { id } => print_peer(&registry.regenerate_keys(&id)?),
        Cmd::ClientConfig { id, qr } => {
            let txt = registry.client_config(&id)?;
            println!("{}", txt);
            if qr {
                println!("{}", wg::client_config_qr(&txt)?);
            }
        }
        Cmd::Render => print!("{}", registry.render_server_config()?),
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "vpn-registry")]
#[command(version, about = "WireGuard peer registry")]
struct Cli {
    /// Path to server.toml; environment variables override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Write a server.toml, generating a server key pair unless one is given.
    Init {
        hostname: String,
        #[arg(long)]
        private_key: Option<String>,
    },
    ListPeers,
    ShowPeer { id: String },
    AddPeer {
        name: String,
        #[arg(long)]
        host_id: Option<String>,
        #[arg(long)]
        keep_alive: Option<u16>,
    },
    UpdatePeer {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        host_id: Option<String>,
        #[arg(long)]
        keep_alive: Option<u16>,
    },
    RemovePeer { id: String },
    RegenerateKeys { id: String },
    ClientConfig {
        id: String,
        #[arg(long)]
        qr: bool,
    },
    /// Print the server config for the current peers without applying it.
    Render,
}
