use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use usage_proxy::config::{resolve_config, StoreKind};
use usage_proxy::store::open_store;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the usage proxy", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy system status
    Status,
    /// Show usage counts, for every destination or one port
    Usage {
        port: Option<u32>,
    },
    /// Register destinations in the store so the next start tracks them
    Seed {
        /// Proxy configuration file (environment overrides apply)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Ports to register (1-65535)
        #[arg(required = true, value_parser = clap::value_parser!(u16).range(1..))]
        ports: Vec<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/admin/status", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Usage { port } => {
            let url = match port {
                Some(port) => format!("{}/admin/usage/{}", cli.url, port),
                None => format!("{}/admin/usage", cli.url),
            };
            let res = client.get(url).send().await?;
            print_response(res).await?;
        }
        Commands::Seed { config, ports } => {
            let config = resolve_config(config.as_deref())?;
            if config.store.kind == StoreKind::Memory {
                eprintln!("Memory store does not outlive this command; nothing to seed");
                return Ok(());
            }

            let store = open_store(&config.store).await?;
            for port in ports {
                // Count 0 never lowers an existing count.
                store.upsert_count(u32::from(port), 0).await?;
                println!("registered port {}", port);
            }
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_ports(args: &[&str]) -> Result<Vec<u16>, clap::Error> {
        let cli = Cli::try_parse_from(args)?;
        match cli.command {
            Commands::Seed { ports, .. } => Ok(ports),
            _ => panic!("expected seed command"),
        }
    }

    #[test]
    fn seed_accepts_tcp_ports() {
        let ports = seed_ports(&["proxy-cli", "seed", "1", "8080", "65535"]).unwrap();
        assert_eq!(ports, vec![1, 8080, 65535]);
    }

    #[test]
    fn seed_rejects_ports_the_proxy_cannot_serve() {
        assert!(seed_ports(&["proxy-cli", "seed", "0"]).is_err());
        assert!(seed_ports(&["proxy-cli", "seed", "65536"]).is_err());
        assert!(seed_ports(&["proxy-cli", "seed", "8080", "70000"]).is_err());
    }
}
