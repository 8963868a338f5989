//! hop: server catalog command line
//!
//! Loads the client configuration, opens the persisted catalog and runs a
//! single command against it.
//!
//! ```text
//! hop [--config <path>] <command>
//!
//!   update                     force a catalog refresh
//!   list                       servers for the active protocol
//!   current                    current entry/exit pair
//!   select <entry|exit> <gw>   pick a server
//!   fastest                    switch to fastest-server mode
//!   favourite [--remove] <gw>
//!   exclude [--remove] <gw>
//!   ports                      port rotation for the active protocol
//! ```

use anyhow::{Context, Result, anyhow, bail};
use hop_servers::{
    HopConfig, Port, Server, ServerListError, ServerListUpdatedListener, ServerType,
    ServersRepository,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_CONFIG_PATH: &str = "hop.toml";

#[derive(Debug, PartialEq)]
enum Command {
    Update,
    List,
    Current,
    Select { server_type: ServerType, gateway: String },
    Fastest,
    Favourite { gateway: String, remove: bool },
    Exclude { gateway: String, remove: bool },
    Ports,
}

#[derive(Debug, PartialEq)]
struct Args {
    config: PathBuf,
    command: Command,
}

fn parse_server_type(value: &str) -> Result<ServerType> {
    match value.to_ascii_lowercase().as_str() {
        "entry" => Ok(ServerType::Entry),
        "exit" => Ok(ServerType::Exit),
        other => bail!("unknown server type '{}', expected entry or exit", other),
    }
}

/// Parse `[--config <path>] <command> [args]` (program name excluded)
fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();
    let mut config = PathBuf::from(DEFAULT_CONFIG_PATH);

    if args.peek().map(String::as_str) == Some("--config") {
        args.next();
        config = args.next().map(PathBuf::from).context("--config needs a path")?;
    }

    let name = args.next().context("missing command")?;
    let mut rest: Vec<String> = args.collect();
    let remove = match rest.iter().position(|arg| arg == "--remove") {
        Some(index) => {
            rest.remove(index);
            true
        }
        None => false,
    };

    let gateway = |rest: &[String]| -> Result<String> {
        rest.last().cloned().ok_or_else(|| anyhow!("'{}' needs a gateway", name))
    };

    let command = match name.as_str() {
        "update" => Command::Update,
        "list" => Command::List,
        "current" => Command::Current,
        "select" => {
            let kind = rest.first().context("select needs entry or exit")?;
            if rest.len() < 2 {
                bail!("select needs a gateway");
            }
            Command::Select {
                server_type: parse_server_type(kind)?,
                gateway: gateway(&rest)?,
            }
        }
        "fastest" => Command::Fastest,
        "favourite" => Command::Favourite {
            gateway: gateway(&rest)?,
            remove,
        },
        "exclude" => Command::Exclude {
            gateway: gateway(&rest)?,
            remove,
        },
        "ports" => Command::Ports,
        other => bail!("unknown command '{}'", other),
    };

    Ok(Args { config, command })
}

/// Prints refresh outcomes as they arrive
struct PrintListener;

impl ServerListUpdatedListener for PrintListener {
    fn on_success(&self, servers: &[Server], is_forced: bool) {
        println!(
            "Server list updated: {} servers (forced: {})",
            servers.len(),
            is_forced
        );
    }

    fn on_error(&self, error: &ServerListError) {
        eprintln!("Server list update failed: {}", error);
    }
}

fn find_server(repository: &ServersRepository, gateway: &str) -> Result<Server> {
    repository
        .servers(false)
        .unwrap_or_default()
        .into_iter()
        .find(|server| server.gateway.eq_ignore_ascii_case(gateway))
        .with_context(|| format!("no server with gateway '{}'", gateway))
}

fn print_server(label: &str, server: Option<Server>) {
    match server {
        Some(server) => println!("{:<6} {} ({})", label, server.gateway, server.description()),
        None => println!("{:<6} -", label),
    }
}

async fn run(repository: &ServersRepository, command: Command) -> Result<()> {
    match command {
        Command::Update => {
            repository.add_server_list_listener(Arc::new(PrintListener));
            repository.update_server_list(true).await;
            repository.try_update_ip_list();
        }
        Command::List => {
            let favourites = repository.favourite_servers();
            let excluded = repository.excluded_servers();
            for server in repository.servers(false).unwrap_or_default() {
                let mark = if favourites.contains(&server) {
                    '*'
                } else if excluded.contains(&server) {
                    'x'
                } else {
                    ' '
                };
                println!("{} {:<28} {}", mark, server.gateway, server.description());
            }
        }
        Command::Current => {
            let settings = repository.settings();
            println!(
                "Protocol: {}  multi-hop: {}  fastest: {}",
                settings.protocol(),
                settings.is_multi_hop_enabled(),
                settings.is_fastest_server_enabled()
            );
            print_server("Entry", repository.current_server(ServerType::Entry));
            if settings.is_multi_hop_enabled() {
                print_server("Exit", repository.current_server(ServerType::Exit));
            }
        }
        Command::Select {
            server_type,
            gateway,
        } => {
            let server = find_server(repository, &gateway)?;
            if repository.forbidden_server(server_type).as_ref() == Some(&server) {
                bail!("{} is already the {} server", gateway, server_type.another());
            }
            repository.server_selected(&server, server_type);
            print_server("Entry", repository.current_server(ServerType::Entry));
            print_server("Exit", repository.current_server(ServerType::Exit));
        }
        Command::Fastest => {
            repository.fastest_server_selected();
            let candidates = repository.possible_servers();
            println!("Fastest server mode on, {} candidates", candidates.len());
        }
        Command::Favourite { gateway, remove } => {
            let server = find_server(repository, &gateway)?;
            if remove {
                repository.remove_favourite_server(&server);
            } else {
                repository.add_favourite_server(&server);
            }
        }
        Command::Exclude { gateway, remove } => {
            let server = find_server(repository, &gateway)?;
            if remove {
                repository.remove_from_excluded_servers(&server);
            } else {
                repository.add_to_excluded_servers(&server);
            }
        }
        Command::Ports => {
            let protocol = repository.settings().protocol();
            let default = Port::default_for(protocol);
            for port in Port::values_for(protocol) {
                let mark = if *port == default { '*' } else { ' ' };
                println!("{} {}", mark, port);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let config = HopConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("hop starting, protocol = {}", config.protocol);
    let repository = ServersRepository::from_config(&config).context("opening server store")?;

    run(&repository, args.command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_default_config() {
        let parsed = parse_args(args("list")).unwrap();
        assert_eq!(parsed.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(parsed.command, Command::List);
    }

    #[test]
    fn test_parse_select() {
        let parsed = parse_args(args("--config /etc/hop.json select exit de.wg.hopvpn.net")).unwrap();
        assert_eq!(parsed.config, PathBuf::from("/etc/hop.json"));
        assert_eq!(
            parsed.command,
            Command::Select {
                server_type: ServerType::Exit,
                gateway: "de.wg.hopvpn.net".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_remove_flag() {
        let parsed = parse_args(args("favourite --remove at.wg.hopvpn.net")).unwrap();
        assert_eq!(
            parsed.command,
            Command::Favourite {
                gateway: "at.wg.hopvpn.net".to_string(),
                remove: true,
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(args("")).is_err());
        assert!(parse_args(args("--config")).is_err());
        assert!(parse_args(args("select sideways at.wg")).is_err());
        assert!(parse_args(args("select entry")).is_err());
        assert!(parse_args(args("exclude")).is_err());
        assert!(parse_args(args("teleport")).is_err());
    }
}
