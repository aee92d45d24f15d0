// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use openmesh_fleet::{
    inventory::{Inventory, XNode, XNodeStatus, XNodeUpdate},
    monitoring::{FleetTarget, MonitoringEngine},
    providers::{CredentialStore, DeployConfig, ProviderRegistry},
};
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "openmesh-fleet", version, about = "xNode fleet management")]
struct Cli {
    /// Data directory, defaults to ~/.openmesh
    #[arg(long, env = "OPENMESH_HOME", global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Provider credentials and catalog access
    Providers {
        #[command(subcommand)]
        command: ProvidersCommand,
    },
    /// List machine templates, optionally for one provider
    Templates {
        #[arg(long)]
        provider: Option<String>,
    },
    /// Filter and rank templates across every provider by hourly price
    Compare {
        #[arg(long, default_value_t = 0)]
        min_cpu: u32,
        #[arg(long, default_value_t = 0)]
        min_memory: u32,
        #[arg(long, default_value_t = f64::INFINITY)]
        max_price: f64,
    },
    /// Show the cheapest template meeting the given floor
    Cheapest {
        #[arg(long, default_value_t = 0)]
        min_cpu: u32,
        #[arg(long, default_value_t = 0)]
        min_memory: u32,
    },
    /// Deploy a new xnode and record it in the inventory
    Deploy {
        provider: String,
        template: String,
        name: String,
        region: String,
        #[arg(long)]
        os: Option<String>,
        #[arg(long = "ssh-key")]
        ssh_keys: Vec<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List live instances straight from the providers
    Instances {
        #[arg(long)]
        provider: Option<String>,
    },
    /// Inventory bookkeeping
    Fleet {
        #[command(subcommand)]
        command: FleetCommand,
    },
    /// Current spend projection over the running fleet
    Cost,
    /// Fleet statistics and distributions
    Stats,
    /// Deployment history, newest first
    History {
        #[arg(long)]
        xnode: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Export the inventory to CSV
    Export { path: PathBuf },
    /// Import xnodes from CSV, skipping ids already present
    Import { path: PathBuf },
    /// Health, metrics and the watch loop
    Monitor {
        #[command(subcommand)]
        command: MonitorCommand,
    },
    /// Active alert management
    Alerts {
        #[command(subcommand)]
        command: AlertsCommand,
    },
    /// Monitoring configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ProvidersCommand {
    /// List known providers and whether each has a credential
    List,
    /// Store an API key for a provider
    Configure { provider: String, api_key: String },
}

#[derive(Subcommand)]
enum FleetCommand {
    /// Record an existing xnode in the inventory
    Add {
        id: String,
        name: String,
        provider: String,
        template: String,
        ip_address: String,
        #[arg(long)]
        region: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        cost_hourly: f64,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Remove an xnode, closing its deployment record
    Remove { id: String },
    /// Apply a partial update to one xnode
    Update {
        id: String,
        #[arg(long)]
        status: Option<XNodeStatus>,
        #[arg(long)]
        ip_address: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        cost_hourly: Option<f64>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
    },
    /// List inventory entries with optional filters
    List {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        status: Option<XNodeStatus>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Require every given tag instead of any
        #[arg(long)]
        all_tags: bool,
    },
    /// Case-insensitive search over names and ids
    Search { query: String },
}

#[derive(Subcommand)]
enum MonitorCommand {
    /// Probe one xnode, or the whole fleet when no id is given
    Check { id: Option<String> },
    /// Collect one metrics sample over ssh
    Metrics {
        id: String,
        #[arg(long)]
        ssh_key: Option<String>,
    },
    /// Fleet-wide monitoring summary
    Dashboard,
    /// Sweep the fleet on an interval until ctrl-c
    Watch,
}

#[derive(Subcommand)]
enum AlertsCommand {
    /// List unresolved alerts
    List,
    /// Mark an alert acknowledged
    Ack { id: String },
    /// Resolve an alert, re-arming dedup for its xnode and type
    Resolve { id: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the monitoring configuration as YAML
    Show,
    /// Set one monitoring configuration field by name
    Set { key: String, value: String },
}

struct Paths {
    inventory: PathBuf,
    credentials: PathBuf,
    monitoring_config: PathBuf,
    monitoring_data: PathBuf,
}

impl Paths {
    fn resolve(home: Option<PathBuf>) -> Result<Self> {
        let home = match home {
            Some(home) => home,
            None => dirs::home_dir()
                .context("cannot determine home directory, pass --home")?
                .join(".openmesh"),
        };
        Ok(Self {
            inventory: home.join("inventory.json"),
            credentials: home.join("providers.yml"),
            monitoring_config: home.join("monitoring.yml"),
            monitoring_data: home.join("monitoring_data"),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let paths = Paths::resolve(cli.home)?;

    match cli.command {
        Command::Providers { command } => run_providers(&paths, command),
        Command::Templates { provider } => run_templates(&paths, provider),
        Command::Compare {
            min_cpu,
            min_memory,
            max_price,
        } => {
            let registry = open_registry(&paths)?;
            print_json(&registry.compare_templates(min_cpu, min_memory, max_price))
        }
        Command::Cheapest { min_cpu, min_memory } => {
            let registry = open_registry(&paths)?;
            match registry.get_cheapest_option(min_cpu, min_memory) {
                Some(template) => print_json(&template),
                None => bail!("no template satisfies cpu >= {min_cpu}, memory >= {min_memory}"),
            }
        }
        Command::Deploy {
            provider,
            template,
            name,
            region,
            os,
            ssh_keys,
            tags,
        } => run_deploy(&paths, provider, template, name, region, os, ssh_keys, tags).await,
        Command::Instances { provider } => run_instances(&paths, provider).await,
        Command::Fleet { command } => run_fleet(&paths, command),
        Command::Cost => {
            let inventory = Inventory::open(&paths.inventory)?;
            print_json(&inventory.get_cost_report())
        }
        Command::Stats => {
            let inventory = Inventory::open(&paths.inventory)?;
            print_json(&inventory.get_statistics())
        }
        Command::History {
            xnode,
            provider,
            limit,
        } => {
            let inventory = Inventory::open(&paths.inventory)?;
            print_json(&inventory.get_deployment_history(
                xnode.as_deref(),
                provider.as_deref(),
                limit,
            ))
        }
        Command::Export { path } => {
            let inventory = Inventory::open(&paths.inventory)?;
            inventory.export_csv(&path)?;
            println!("exported {} xnodes to {}", inventory.len(), path.display());
            Ok(())
        }
        Command::Import { path } => {
            let mut inventory = Inventory::open(&paths.inventory)?;
            let imported = inventory.import_csv(&path)?;
            println!("imported {imported} xnodes from {}", path.display());
            Ok(())
        }
        Command::Monitor { command } => run_monitor(&paths, command).await,
        Command::Alerts { command } => run_alerts(&paths, command).await,
        Command::Config { command } => run_config(&paths, command).await,
    }
}

fn open_registry(paths: &Paths) -> Result<ProviderRegistry> {
    let store = CredentialStore::load(&paths.credentials)?;
    ProviderRegistry::new(store)
}

async fn open_engine(paths: &Paths) -> Result<MonitoringEngine> {
    MonitoringEngine::new(
        paths.monitoring_config.clone(),
        paths.monitoring_data.clone(),
    )
    .await
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_providers(paths: &Paths, command: ProvidersCommand) -> Result<()> {
    match command {
        ProvidersCommand::List => {
            let store = CredentialStore::load(&paths.credentials)?;
            for name in openmesh_fleet::PROVIDER_NAMES {
                let configured = if store.api_key(name).is_some() {
                    "configured"
                } else {
                    "no credential"
                };
                println!("{name:14} {configured}");
            }
            Ok(())
        }
        ProvidersCommand::Configure { provider, api_key } => {
            let mut registry = open_registry(paths)?;
            registry.configure_provider(&provider, api_key)?;
            println!("credential stored for {provider}");
            Ok(())
        }
    }
}

fn run_templates(paths: &Paths, provider: Option<String>) -> Result<()> {
    let registry = open_registry(paths)?;
    match provider {
        Some(name) => print_json(&registry.get_provider(&name)?.templates().to_vec()),
        None => print_json(&registry.get_all_templates()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_deploy(
    paths: &Paths,
    provider: String,
    template: String,
    name: String,
    region: String,
    os: Option<String>,
    ssh_keys: Vec<String>,
    tags: Vec<String>,
) -> Result<()> {
    let registry = open_registry(paths)?;

    let mut config = DeployConfig::new(name.clone(), region.clone());
    if let Some(os) = os {
        config = config.with_os(os);
    }
    if !ssh_keys.is_empty() {
        config = config.with_ssh_keys(ssh_keys);
    }

    let instance = registry
        .deploy_to_provider(&provider, &template, &config)
        .await?;

    let mut inventory = Inventory::open(&paths.inventory)?;
    let status = instance
        .status
        .parse::<XNodeStatus>()
        .unwrap_or(XNodeStatus::Deploying);
    let xnode = XNode::new(
        instance.id.clone(),
        name,
        status,
        instance.ip_address.clone(),
    )
    .with_region(region);
    inventory.add_xnode(&xnode, provider, template, instance.cost_hourly, tags)?;

    print_json(&instance)
}

async fn run_instances(paths: &Paths, provider: Option<String>) -> Result<()> {
    let registry = open_registry(paths)?;
    let names = match provider {
        Some(name) => vec![name],
        None => registry.list_providers(),
    };

    let mut instances = Vec::new();
    for name in names {
        instances.extend(registry.get_provider(&name)?.list_instances().await?);
    }
    print_json(&instances)
}

fn run_fleet(paths: &Paths, command: FleetCommand) -> Result<()> {
    let mut inventory = Inventory::open(&paths.inventory)?;
    match command {
        FleetCommand::Add {
            id,
            name,
            provider,
            template,
            ip_address,
            region,
            cost_hourly,
            tags,
        } => {
            let mut xnode = XNode::new(id.clone(), name, XNodeStatus::Running, ip_address);
            if let Some(region) = region {
                xnode = xnode.with_region(region);
            }
            inventory.add_xnode(&xnode, provider, template, cost_hourly, tags)?;
            println!("added {id}");
            Ok(())
        }
        FleetCommand::Remove { id } => {
            inventory.remove_xnode(&id)?;
            println!("removed {id}");
            Ok(())
        }
        FleetCommand::Update {
            id,
            status,
            ip_address,
            region,
            cost_hourly,
            name,
            tags,
        } => {
            inventory.update_xnode(
                &id,
                XNodeUpdate {
                    status,
                    ip_address,
                    region,
                    cost_hourly,
                    name,
                    tags,
                },
            )?;
            println!("updated {id}");
            Ok(())
        }
        FleetCommand::List {
            provider,
            status,
            tags,
            all_tags,
        } => {
            let entries = if let Some(provider) = provider {
                inventory.list_by_provider(&provider)
            } else if let Some(status) = status {
                inventory.list_by_status(status)
            } else if !tags.is_empty() {
                inventory.list_by_tags(&tags, all_tags)
            } else {
                inventory.list_all()
            };
            print_json(&entries)
        }
        FleetCommand::Search { query } => print_json(&inventory.search(&query)),
    }
}

/// Monitoring targets for every inventory entry that has an address. An
/// xnode tagged `web` or `webserver` also gets the HTTP probe.
fn fleet_targets(inventory: &Inventory) -> Vec<FleetTarget> {
    inventory
        .list_all()
        .into_iter()
        .map(|entry| FleetTarget {
            xnode_id: entry.id.clone(),
            ip_address: if entry.ip_address.is_empty() {
                None
            } else {
                Some(entry.ip_address.clone())
            },
            has_webserver: entry
                .tags
                .iter()
                .any(|t| t == "web" || t == "webserver"),
            ssh_key_path: None,
        })
        .collect()
}

async fn run_monitor(paths: &Paths, command: MonitorCommand) -> Result<()> {
    let engine = open_engine(paths).await?;
    let inventory = Inventory::open(&paths.inventory)?;

    match command {
        MonitorCommand::Check { id } => {
            let targets = fleet_targets(&inventory);
            let targets = match id {
                Some(id) => {
                    let target = targets
                        .into_iter()
                        .find(|t| t.xnode_id == id)
                        .with_context(|| format!("xnode '{id}' not in inventory"))?;
                    vec![target]
                }
                None => targets,
            };
            let checks = engine.check_fleet(&targets).await;
            engine.save_history().await?;
            print_json(&checks)
        }
        MonitorCommand::Metrics { id, ssh_key } => {
            let entry = inventory
                .get_xnode(&id)
                .with_context(|| format!("xnode '{id}' not in inventory"))?;
            let ip = if entry.ip_address.is_empty() {
                None
            } else {
                Some(entry.ip_address.as_str())
            };
            let sample = engine.collect_metrics(&id, ip, ssh_key.as_deref()).await;
            engine.save_history().await?;
            match sample {
                Some(sample) => print_json(&sample),
                None => bail!("no metrics sample collected from {id}"),
            }
        }
        MonitorCommand::Dashboard => print_json(&engine.get_dashboard_data().await),
        MonitorCommand::Watch => {
            let targets = fleet_targets(&inventory);
            if targets.is_empty() {
                bail!("inventory is empty, nothing to watch");
            }
            engine.watch(&targets).await
        }
    }
}

async fn run_alerts(paths: &Paths, command: AlertsCommand) -> Result<()> {
    let engine = open_engine(paths).await?;
    match command {
        AlertsCommand::List => print_json(&engine.get_active_alerts().await),
        AlertsCommand::Ack { id } => {
            if engine.acknowledge_alert(&id).await? {
                println!("acknowledged {id}");
                Ok(())
            } else {
                bail!("no alert with id {id}")
            }
        }
        AlertsCommand::Resolve { id } => {
            if engine.resolve_alert(&id).await? {
                println!("resolved {id}");
                Ok(())
            } else {
                bail!("no alert with id {id}")
            }
        }
    }
}

async fn run_config(paths: &Paths, command: ConfigCommand) -> Result<()> {
    let engine = open_engine(paths).await?;
    match command {
        ConfigCommand::Show => {
            print!("{}", serde_yaml::to_string(&engine.get_config().await)?);
            Ok(())
        }
        ConfigCommand::Set { key, value } => {
            // Validate against a copy first; a bad key or value must not
            // touch the config file.
            let mut candidate = engine.get_config().await;
            apply_config_key(&mut candidate, &key, &value)?;
            engine.update_config(|config| *config = candidate).await?;
            println!("{key} = {value}");
            Ok(())
        }
    }
}

fn apply_config_key(
    config: &mut openmesh_fleet::MonitoringConfig,
    key: &str,
    value: &str,
) -> Result<()> {
    fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}"))
    }

    match key {
        "enabled" => config.enabled = parse(key, value)?,
        "check_interval_seconds" => config.check_interval_seconds = parse(key, value)?,
        "ping_timeout" => config.ping_timeout = parse(key, value)?,
        "ssh_timeout" => config.ssh_timeout = parse(key, value)?,
        "http_timeout" => config.http_timeout = parse(key, value)?,
        "cpu_warning_threshold" => config.cpu_warning_threshold = parse(key, value)?,
        "cpu_critical_threshold" => config.cpu_critical_threshold = parse(key, value)?,
        "memory_warning_threshold" => config.memory_warning_threshold = parse(key, value)?,
        "memory_critical_threshold" => config.memory_critical_threshold = parse(key, value)?,
        "disk_warning_threshold" => config.disk_warning_threshold = parse(key, value)?,
        "disk_critical_threshold" => config.disk_critical_threshold = parse(key, value)?,
        "console_alerts" => config.alert_delivery.console_alerts = parse(key, value)?,
        "email_alerts" => config.alert_delivery.email_alerts = parse(key, value)?,
        "webhook_alerts" => config.alert_delivery.webhook_alerts = parse(key, value)?,
        "slack_alerts" => config.alert_delivery.slack_alerts = parse(key, value)?,
        "webhook_url" => config.alert_delivery.webhook_url = Some(value.to_string()),
        "slack_webhook_url" => config.alert_delivery.slack_webhook_url = Some(value.to_string()),
        other => bail!("unknown config key '{other}'"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> Paths {
        Paths {
            inventory: dir.path().join("inventory.json"),
            credentials: dir.path().join("providers.yml"),
            monitoring_config: dir.path().join("monitoring.yml"),
            monitoring_data: dir.path().join("monitoring_data"),
        }
    }

    #[test]
    fn test_apply_config_key_sets_known_keys() {
        let mut config = openmesh_fleet::MonitoringConfig::default();
        apply_config_key(&mut config, "check_interval_seconds", "120").unwrap();
        assert_eq!(config.check_interval_seconds, 120);

        assert!(apply_config_key(&mut config, "ping_timeout", "fast").is_err());
        assert!(apply_config_key(&mut config, "no_such_key", "1").is_err());
    }

    #[tokio::test]
    async fn test_rejected_config_set_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);

        let err = run_config(
            &paths,
            ConfigCommand::Set {
                key: "no_such_key".into(),
                value: "1".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("unknown config key"));
        assert!(!paths.monitoring_config.exists());

        // A valid set still lands on disk
        run_config(
            &paths,
            ConfigCommand::Set {
                key: "check_interval_seconds".into(),
                value: "120".into(),
            },
        )
        .await
        .unwrap();
        assert!(paths.monitoring_config.exists());
    }
}
