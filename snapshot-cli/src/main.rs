/*!
snapctl - command-line interface for space snapshot and restore tasks.

Drives the named snapshot tasks against a local space store and an HTTP
bridge: freeze a space for a snapshot, follow the transfer, put access back,
and restore a snapshot into a new space.
*/

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use snapshot_core::bridge::HttpBridgeGateway;
use snapshot_core::config::{BridgeConfig, SnapshotConfig, StorageConfig, StoreInstance};
use snapshot_core::task::{GetRestoreTaskResult, GetSnapshotTaskResult};
use snapshot_core::{SnapshotError, SnapshotTaskClient, TaskDispatcher};
use snapshot_poll::{interactive_poll_policy, job_status_poll_policy};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing::{info, warn};

const DEFAULT_STORE_DIR: &str = "./spaces";

#[derive(Parser)]
#[command(name = "snapctl")]
#[command(about = "Snapshot and restore storage spaces through the bridge")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs as JSON lines
    #[arg(long, global = true, env = "SNAPCTL_JSON_LOGS")]
    json_logs: bool,

    /// JSON configuration file; flags below override its values
    #[arg(short, long, global = true, env = "SNAPCTL_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Directory holding the local space store
    #[arg(long, global = true, env = "SNAPCTL_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Host of the storage instance, as the bridge reaches it
    #[arg(long, global = true, env = "SNAPCTL_DC_HOST")]
    dc_host: Option<String>,

    #[arg(long, global = true, env = "SNAPCTL_DC_PORT")]
    dc_port: Option<String>,

    #[arg(long, global = true, env = "SNAPCTL_STORE_ID")]
    store_id: Option<String>,

    /// User the bridge reads spaces as
    #[arg(long, global = true, env = "SNAPCTL_SNAPSHOT_USER")]
    snapshot_user: Option<String>,

    #[arg(long, global = true, env = "SNAPCTL_BRIDGE_HOST")]
    bridge_host: Option<String>,

    #[arg(long, global = true, env = "SNAPCTL_BRIDGE_PORT")]
    bridge_port: Option<String>,

    #[arg(long, global = true, env = "SNAPCTL_BRIDGE_USER")]
    bridge_user: Option<String>,

    #[arg(long, global = true, env = "SNAPCTL_BRIDGE_PASS", hide_env_values = true)]
    bridge_pass: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Freeze a space and hand it to the bridge for a snapshot
    Create {
        space_id: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Address notified by the bridge when the snapshot finishes
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Put back the space's access once its snapshot has finished
    Complete { space_id: String },
    /// Show the status of a snapshot
    Show { snapshot_id: String },
    /// List the snapshots taken from this storage instance
    List,
    /// List one page of a snapshot's content
    Contents {
        snapshot_id: String,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        page: i64,
        #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
        page_size: i64,
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Restore a snapshot into a new space
    Restore {
        snapshot_id: String,
        #[arg(short, long)]
        email: String,
    },
    /// Show the status of a restore
    RestoreStatus {
        #[arg(long, conflicts_with = "snapshot_id", required_unless_present = "snapshot_id")]
        restore_id: Option<u64>,
        #[arg(long)]
        snapshot_id: Option<String>,
    },
    /// Wait until a snapshot or restore reaches a final status
    Wait {
        #[arg(long, conflicts_with = "restore_id", required_unless_present = "restore_id")]
        snapshot_id: Option<String>,
        #[arg(long)]
        restore_id: Option<u64>,
        /// Give up after this many seconds; without it, wait up to the job limit
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Tabled)]
struct Field {
    #[tabled(rename = "Field")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Snapshot ID")]
    snapshot_id: String,
    #[tabled(rename = "Description")]
    description: String,
}

#[derive(Tabled)]
struct ContentRow {
    #[tabled(rename = "Content ID")]
    content_id: String,
    #[tabled(rename = "Properties")]
    properties: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs)?;

    let config = resolve_config(cli.config.as_deref(), &cli.overrides)?;
    let client = build_client(&config)?;

    match cli.command {
        Commands::Create {
            space_id,
            description,
            email,
        } => {
            let result = client.create_snapshot(&space_id, &description, email.as_deref())?;
            println!("Snapshot {} started for space {}", result.snapshot_id, space_id);
        }
        Commands::Complete { space_id } => {
            let result = client.complete_snapshot(&space_id)?;
            println!("{}", result.result);
        }
        Commands::Show { snapshot_id } => {
            print_snapshot(&client.get_snapshot(&snapshot_id)?);
        }
        Commands::List => {
            let rows: Vec<SnapshotRow> = client
                .get_snapshots()?
                .snapshots
                .into_iter()
                .map(|s| SnapshotRow {
                    snapshot_id: s.snapshot_id,
                    description: s.description,
                })
                .collect();
            if rows.is_empty() {
                println!("No snapshots found");
            } else {
                println!("{}", Table::new(rows));
            }
        }
        Commands::Contents {
            snapshot_id,
            page,
            page_size,
            prefix,
        } => {
            let result =
                client.get_snapshot_contents(&snapshot_id, page, page_size, prefix.as_deref())?;
            let shown = result.content_items.len();
            let rows: Vec<ContentRow> = result
                .content_items
                .into_iter()
                .map(|item| ContentRow {
                    content_id: item.content_id,
                    properties: format_properties(&item.content_properties),
                })
                .collect();
            println!("{}", Table::new(rows));
            println!("{} of {} items (page {})", shown, result.total_count, page);
        }
        Commands::Restore { snapshot_id, email } => {
            let result = client.restore_snapshot(&snapshot_id, &email)?;
            println!(
                "Restore {} of {} into space {} ({})",
                result.restore_id, snapshot_id, result.space_id, result.status
            );
        }
        Commands::RestoreStatus {
            restore_id,
            snapshot_id,
        } => {
            let restore = match (restore_id, snapshot_id) {
                (Some(id), _) => client.get_restore(id)?,
                (None, Some(snapshot_id)) => client.get_restore_by_snapshot(&snapshot_id)?,
                (None, None) => anyhow::bail!("--restore-id or --snapshot-id is required"),
            };
            print_restore(&restore);
        }
        Commands::Wait {
            snapshot_id,
            restore_id,
            timeout_secs,
        } => {
            let policy = match timeout_secs {
                Some(secs) => interactive_poll_policy(Duration::from_secs(secs)),
                None => job_status_poll_policy(),
            };
            let outcome = match (snapshot_id, restore_id) {
                (Some(id), _) => client.wait_for_snapshot(&id, policy).map(|s| print_snapshot(&s)),
                (None, Some(id)) => client.wait_for_restore(id, policy).map(|r| print_restore(&r)),
                (None, None) => anyhow::bail!("--snapshot-id or --restore-id is required"),
            };
            if let Err(e) = &outcome {
                if e.is_retryable() {
                    warn!(error = %e, "Bridge unreachable; the job may still be running, try again later");
                }
            }
            outcome?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> Result<(), anyhow::Error> {
    if json {
        snapshot_core::observability::init_observability(true)?;
        return Ok(());
    }

    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Merge the optional config file with command-line overrides
fn resolve_config(
    path: Option<&std::path::Path>,
    overrides: &ConfigArgs,
) -> Result<SnapshotConfig, anyhow::Error> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<SnapshotConfig>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => SnapshotConfig {
            store: StoreInstance {
                host: String::new(),
                port: String::new(),
                store_id: String::new(),
            },
            snapshot_user: String::new(),
            bridge: BridgeConfig {
                host: String::new(),
                port: String::new(),
                username: None,
                password: None,
            },
            storage: StorageConfig::local(DEFAULT_STORE_DIR),
        },
    };

    let set = |target: &mut String, value: &Option<String>| {
        if let Some(value) = value {
            *target = value.clone();
        }
    };
    set(&mut config.store.host, &overrides.dc_host);
    set(&mut config.store.port, &overrides.dc_port);
    set(&mut config.store.store_id, &overrides.store_id);
    set(&mut config.snapshot_user, &overrides.snapshot_user);
    set(&mut config.bridge.host, &overrides.bridge_host);
    set(&mut config.bridge.port, &overrides.bridge_port);
    if overrides.bridge_user.is_some() {
        config.bridge.username = overrides.bridge_user.clone();
    }
    if overrides.bridge_pass.is_some() {
        config.bridge.password = overrides.bridge_pass.clone();
    }
    if let Some(dir) = &overrides.store_dir {
        config.storage = StorageConfig::local(dir);
    }

    config.validate()?;
    Ok(config)
}

fn build_client(config: &SnapshotConfig) -> Result<SnapshotTaskClient<TaskDispatcher>, SnapshotError> {
    let provider = config.storage.build_provider()?;
    let bridge = Arc::new(HttpBridgeGateway::new(&config.bridge)?);
    info!(
        bridge = %format!("{}:{}", config.bridge.host, config.bridge.port),
        store = %config.store.host,
        "Task client ready"
    );
    Ok(SnapshotTaskClient::new(TaskDispatcher::with_handlers(
        provider, bridge, config,
    )))
}

fn print_snapshot(snapshot: &GetSnapshotTaskResult) {
    let mut fields = vec![
        Field {
            name: "Snapshot ID",
            value: snapshot.snapshot_id.clone(),
        },
        Field {
            name: "Status",
            value: snapshot.status.to_string(),
        },
        Field {
            name: "Created",
            value: format_timestamp(&snapshot.snapshot_date),
        },
        Field {
            name: "Source",
            value: format!(
                "{}/{}/{}",
                snapshot.source_host, snapshot.source_store_id, snapshot.source_space_id
            ),
        },
        Field {
            name: "Description",
            value: snapshot.description.clone(),
        },
    ];
    if let Some(count) = snapshot.content_item_count {
        fields.push(Field {
            name: "Items",
            value: count.to_string(),
        });
    }
    if let Some(bytes) = snapshot.total_size_in_bytes {
        fields.push(Field {
            name: "Size",
            value: format_size(bytes),
        });
    }
    println!("{}", Table::new(fields));
}

fn print_restore(restore: &GetRestoreTaskResult) {
    let mut fields = vec![
        Field {
            name: "Restore ID",
            value: restore.restore_id.to_string(),
        },
        Field {
            name: "Snapshot ID",
            value: restore.snapshot_id.clone(),
        },
        Field {
            name: "Status",
            value: restore.status.to_string(),
        },
        Field {
            name: "Destination",
            value: format!(
                "{}:{}/{}/{}",
                restore.destination_host,
                restore.destination_port,
                restore.destination_store_id,
                restore.destination_space_id
            ),
        },
        Field {
            name: "Started",
            value: format_timestamp(&restore.start_date),
        },
    ];
    if let Some(text) = &restore.status_text {
        fields.push(Field {
            name: "Detail",
            value: text.clone(),
        });
    }
    if let Some(end) = &restore.end_date {
        fields.push(Field {
            name: "Finished",
            value: format_timestamp(end),
        });
    }
    println!("{}", Table::new(fields));
}

fn format_properties(props: &std::collections::BTreeMap<String, String>) -> String {
    props
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    timestamp
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_restore_status_needs_one_id() {
        assert!(Cli::try_parse_from(["snapctl", "restore-status"]).is_err());
        assert!(Cli::try_parse_from([
            "snapctl",
            "restore-status",
            "--restore-id",
            "1",
            "--snapshot-id",
            "s"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["snapctl", "restore-status", "--restore-id", "1"]).is_ok());
    }

    #[test]
    fn test_overrides_fill_config() {
        let overrides = ConfigArgs {
            store_dir: Some(PathBuf::from("/tmp/spaces")),
            dc_host: Some("dc.example.org".to_string()),
            dc_port: Some("443".to_string()),
            store_id: Some("0".to_string()),
            snapshot_user: Some("snapshot-user".to_string()),
            bridge_host: Some("bridge.example.org".to_string()),
            bridge_port: Some("8080".to_string()),
            bridge_user: None,
            bridge_pass: None,
        };
        let config = resolve_config(None, &overrides).unwrap();
        assert_eq!(config.store.host, "dc.example.org");
        assert_eq!(
            config.storage.local_base_path,
            Some(PathBuf::from("/tmp/spaces"))
        );
    }

    #[test]
    fn test_missing_bridge_rejected() {
        let overrides = ConfigArgs {
            dc_host: Some("dc.example.org".to_string()),
            dc_port: Some("443".to_string()),
            store_id: Some("0".to_string()),
            snapshot_user: Some("snapshot-user".to_string()),
            ..ConfigArgs::default()
        };
        assert!(resolve_config(None, &overrides).is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
