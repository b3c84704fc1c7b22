// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Habridge Contributors

// habridge - CLI
// Command-line front end for the Home Assistant API client and the
// database SSH tunnel helper

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use habridge_api::HassClient;
use habridge_common::{Config, SecretsFile};
use habridge_tunnel::{TunnelRegistry, DEFAULT_WAIT_SECS};

#[derive(Parser)]
#[command(name = "habridge")]
#[command(about = "Home Assistant API client and database tunnel helper", long_about = None)]
#[command(version)]
struct Cli {
    /// Server name from config.yaml (uses the default server when omitted)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Override the Home Assistant base URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// Override the API token
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured servers
    Servers,

    /// Test the API connection
    Test,

    /// Show entity states
    States {
        /// Only entities in this domain (e.g. light, sensor)
        #[arg(short, long)]
        domain: Option<String>,

        /// Only energy-related entities
        #[arg(short, long)]
        energy: bool,

        /// Output as JSON for scripting
        #[arg(short, long)]
        json: bool,
    },

    /// Show the state of one entity
    State {
        /// Entity id (e.g. light.kitchen)
        entity_id: String,
    },

    /// Show state history for an entity
    History {
        /// Entity id to fetch history for
        entity_id: String,

        /// How many hours back to look
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },

    /// List available services
    Services,

    /// Call a service (e.g. habridge call light turn_on -e light.kitchen)
    Call {
        /// Service domain (e.g. light, switch)
        domain: String,

        /// Service name (e.g. turn_on, turn_off)
        service: String,

        /// Target entity id
        #[arg(short, long)]
        entity: Option<String>,

        /// Extra service data as a JSON object
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Manage the database SSH tunnel
    Tunnel {
        #[command(subcommand)]
        action: TunnelCommands,
    },
}

#[derive(Subcommand)]
enum TunnelCommands {
    /// Start the tunnel and wait for the forwarded port to open
    Start {
        /// Seconds to wait for the forward to come up
        #[arg(long, default_value_t = DEFAULT_WAIT_SECS)]
        wait: u64,
    },
    /// Stop the tunnel
    Stop,
    /// Show tunnel and database status
    Status {
        /// Output as JSON for scripting
        #[arg(short, long)]
        json: bool,
    },
    /// Start the tunnel only if it is not already active
    Ensure,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "habridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Cli {
        server,
        url,
        token,
        command,
    } = Cli::parse();
    let server = server.as_deref();

    let config = Config::load()?;
    let secrets = SecretsFile::load()?;
    tracing::debug!(servers = config.servers.len(), "configuration loaded");

    let client = |config: &Config, secrets: &SecretsFile| {
        HassClient::with_overrides(config, secrets, server, url.as_deref(), token.as_deref())
            .context("failed to build Home Assistant client")
    };

    match command {
        Commands::Servers => list_servers(&config),
        Commands::Test => test_connection(&client(&config, &secrets)?),
        Commands::States {
            domain,
            energy,
            json,
        } => show_states(&client(&config, &secrets)?, domain.as_deref(), energy, json),
        Commands::State { entity_id } => {
            let state = client(&config, &secrets)?.get_state(&entity_id)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
        Commands::History { entity_id, hours } => {
            show_history(&client(&config, &secrets)?, &entity_id, hours)
        }
        Commands::Services => {
            let services = client(&config, &secrets)?.get_services()?;
            println!("{}", serde_json::to_string_pretty(&services)?);
            Ok(())
        }
        Commands::Call {
            domain,
            service,
            entity,
            data,
        } => call_service(
            &client(&config, &secrets)?,
            &domain,
            &service,
            entity.as_deref(),
            data.as_deref(),
        ),
        Commands::Tunnel { action } => run_tunnel(&config, &secrets, server, action),
    }
}

fn list_servers(config: &Config) -> Result<()> {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Host").add_attribute(Attribute::Bold),
            Cell::new("Port").add_attribute(Attribute::Bold),
            Cell::new("Default").add_attribute(Attribute::Bold),
        ]);

    for name in config.server_names() {
        let server = config.server(Some(name))?;
        table.add_row(vec![
            server.name.clone(),
            server.host.clone(),
            server.port.to_string(),
            if server.is_default { "*".to_string() } else { String::new() },
        ]);
    }
    println!("{table}");
    Ok(())
}

fn test_connection(client: &HassClient) -> Result<()> {
    match client.test_connection() {
        Ok(config) => {
            println!("{} Connected to Home Assistant", "✓".green().bold());
            if let Some(location) = config.get("location_name").and_then(Value::as_str) {
                println!("  Location: {location}");
            }
            if let Some(version) = config.get("version").and_then(Value::as_str) {
                println!("  Version:  {version}");
            }
            Ok(())
        }
        Err(err) => {
            println!("{} Connection failed: {err}", "✗".red().bold());
            Err(err.into())
        }
    }
}

fn show_states(
    client: &HassClient,
    domain: Option<&str>,
    energy: bool,
    json: bool,
) -> Result<()> {
    let states = match (domain, energy) {
        (Some(domain), _) => client.get_entities_by_domain(domain)?,
        (None, true) => client.get_energy_entities()?,
        (None, false) => client.get_states()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&states)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Entity").add_attribute(Attribute::Bold),
            Cell::new("State").add_attribute(Attribute::Bold),
            Cell::new("Name").add_attribute(Attribute::Bold),
        ]);
    for state in &states {
        table.add_row(vec![
            state.entity_id.clone(),
            state.state.clone(),
            state.friendly_name().unwrap_or_default().to_string(),
        ]);
    }
    println!("{table}");
    println!("{} entities", states.len());
    Ok(())
}

fn show_history(client: &HassClient, entity_id: &str, hours: i64) -> Result<()> {
    let start = Utc::now() - Duration::hours(hours);
    let history = client.get_history(Some(entity_id), Some(start), None, true)?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}

fn call_service(
    client: &HassClient,
    domain: &str,
    service: &str,
    entity: Option<&str>,
    data: Option<&str>,
) -> Result<()> {
    let data: Map<String, Value> = match data {
        Some(raw) => serde_json::from_str(raw).context("--data must be a JSON object")?,
        None => Map::new(),
    };
    client.call_service(domain, service, entity, data)?;
    println!(
        "{} Called {domain}.{service}{}",
        "✓".green().bold(),
        entity.map(|e| format!(" on {e}")).unwrap_or_default()
    );
    Ok(())
}

fn run_tunnel(
    config: &Config,
    secrets: &SecretsFile,
    server: Option<&str>,
    action: TunnelCommands,
) -> Result<()> {
    let mut registry = TunnelRegistry::new();
    let tunnel = registry.get_or_create(config, secrets, server)?;

    match action {
        TunnelCommands::Start { wait } => {
            if tunnel.start(wait) {
                println!(
                    "{} Tunnel active on 127.0.0.1:{}",
                    "✓".green().bold(),
                    tunnel.endpoint().local_port
                );
                Ok(())
            } else {
                anyhow::bail!(
                    "tunnel to {} did not come up within {wait}s",
                    tunnel.endpoint().ssh_endpoint()
                );
            }
        }
        TunnelCommands::Stop => {
            if tunnel.stop() {
                println!("{} Tunnel stopped", "✓".green().bold());
                Ok(())
            } else {
                anyhow::bail!("tunnel is still active after stop");
            }
        }
        TunnelCommands::Status { json } => {
            let report = tunnel.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            let mark = |ok: bool| {
                if ok {
                    "✓".green().bold()
                } else {
                    "✗".red().bold()
                }
            };
            println!("Server:       {}", report.server_name);
            println!("{} Tunnel:     127.0.0.1:{}", mark(report.tunnel_active), report.local_port);
            println!("{} Database:   {}", mark(report.database_responding), report.remote_target);
            println!("  SSH:        {}", report.ssh_endpoint);
            Ok(())
        }
        TunnelCommands::Ensure => {
            if tunnel.ensure_connected() {
                println!("{} Tunnel active", "✓".green().bold());
                Ok(())
            } else {
                anyhow::bail!("could not establish tunnel");
            }
        }
    }
}
