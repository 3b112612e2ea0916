//! resty CLI - Command line interface for a restAssured server
//!
//! Files go through the blob endpoints directly; JSON values go through the
//! deduplicating push/pull protocol. Output is JSON on stdout, logs on stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use resty::serializer::{from_json, to_json};
use resty::{
    Attributes, BlobTransport, ChecksumEngine, CloudPassage, DriverConfig, LiaisonNames,
    RestDriver, SecretStore, SerializationKind, Value,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resty")]
#[command(about = "Client for a restAssured blob and table store")]
#[command(version)]
struct Cli {
    /// Server host, scheme included (overrides RESTY_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides RESTY_PORT)
    #[arg(long)]
    port: Option<String>,

    /// Checksum algorithm (overrides RESTY_CHECKSUM_ALGO)
    #[arg(long)]
    checksum: Option<String>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum TableAction {
    New,
    Get,
    Update,
    Delete,
}

#[derive(Subcommand)]
enum Commands {
    // === File Commands ===
    /// Upload a file
    Push {
        /// Path of the file
        path: PathBuf,
        /// Extra attributes as key=value
        attrs: Vec<String>,
    },

    /// Replace a stored file; attributes select the record
    PutFile {
        /// Path of the file
        path: PathBuf,
        /// Selector attributes as key=value
        attrs: Vec<String>,
    },

    /// Download a blob to disk
    Pull {
        /// Content key of the blob
        key: String,
        /// Local file name (defaults to the key's last segment)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List manifest records
    List {
        /// Filters as key=value
        filters: Vec<String>,
    },

    /// Delete blobs matching the filters
    Trash {
        /// Filters as key=value
        filters: Vec<String>,
    },

    // === Checksums and Signing ===
    /// Checksum a string
    Bcksum {
        data: String,
    },

    /// Checksum a file
    Fcksum {
        path: PathBuf,
    },

    /// Sign each item with the secret key
    Sign {
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Store the secret key for this server
    UpdateSecretKey {
        key: String,
    },

    // === Value Commands ===
    /// Push a JSON value through the deduplicating protocol
    PushValue {
        /// The value, as JSON
        json: String,
        /// Store with the binary serializer instead of text
        #[arg(long)]
        binary: bool,
        /// Extra attributes as key=value
        attrs: Vec<String>,
    },

    /// Pull the value behind the first matching record
    PullValue {
        /// Query as key=value, e.g. metaData=text
        query: Vec<String>,
    },

    /// Delete the blob a push of this value would have written
    RemoveValue {
        /// The value, as JSON
        json: String,
        #[arg(long)]
        binary: bool,
    },

    // === Table Commands ===
    /// List registered tables
    Tables,

    /// Call a table endpoint
    Table {
        /// Resource name, e.g. Job
        name: String,
        action: TableAction,
        /// Register the table at this path first
        #[arg(long)]
        path: Option<String>,
        /// Fields as key=value
        fields: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = driver_config(&cli);

    match &cli.command {
        Commands::Push { path, attrs } => {
            let driver = RestDriver::new(config)?;
            let response = driver.upload_file(path, &parse_attrs(attrs)?);
            output(&cli.format, &serde_json::to_value(&response)?)?;
        }

        Commands::PutFile { path, attrs } => {
            let driver = RestDriver::new(config)?;
            let response = driver.update_file(path, &parse_attrs(attrs)?);
            output(&cli.format, &serde_json::to_value(&response)?)?;
        }

        Commands::Pull { key, output: local } => {
            let driver = RestDriver::new(config)?;
            let written = driver.download_file(key, local.as_deref())?;
            output(
                &cli.format,
                &serde_json::json!({
                    "key": key,
                    "found": written > 0,
                    "bytes": written
                }),
            )?;
        }

        Commands::List { filters } => {
            let driver = RestDriver::new(config)?;
            let response = driver.manifest(&parse_attrs(filters)?);
            output(
                &cli.format,
                &serde_json::json!({
                    "status": response.status,
                    "count": response.data.len(),
                    "data": response.data,
                    "reason": response.reason
                }),
            )?;
        }

        Commands::Trash { filters } => {
            let driver = RestDriver::new(config)?;
            let response = driver.delete_blob(&parse_attrs(filters)?);
            output(&cli.format, &serde_json::to_value(&response)?)?;
        }

        Commands::Bcksum { data } => {
            let engine = ChecksumEngine::new(&config.checksum_algorithm)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "algorithm": engine.algorithm().name(),
                    "checksum": engine.digest(data.as_bytes()).to_string()
                }),
            )?;
        }

        Commands::Fcksum { path } => {
            let engine = ChecksumEngine::new(&config.checksum_algorithm)?;
            let checksum = engine
                .digest_file(path)
                .with_context(|| format!("cannot checksum {}", path.display()))?;
            output(
                &cli.format,
                &serde_json::json!({
                    "path": path.display().to_string(),
                    "algorithm": engine.algorithm().name(),
                    "checksum": checksum.as_str()
                }),
            )?;
        }

        Commands::Sign { items } => {
            let driver = RestDriver::new(config.clone())?;
            if config.secret_key.is_none() {
                let key = SecretStore::new()?
                    .load(driver.base_url())?
                    .ok_or_else(|| anyhow::anyhow!("No secret key for {}", driver.base_url()))?;
                driver.update_secret_key(&key)?;
            }
            let signatures = driver.sign_items(items)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "signatures": items
                        .iter()
                        .zip(signatures)
                        .map(|(item, sig)| serde_json::json!({"item": item, "signature": sig}))
                        .collect::<Vec<_>>()
                }),
            )?;
        }

        Commands::UpdateSecretKey { key } => {
            let base_url = config.base_url();
            let store = SecretStore::new()?;
            store.save(&base_url, key)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "base_url": base_url,
                    "path": store.path().display().to_string()
                }),
            )?;
        }

        Commands::PushValue {
            json,
            binary,
            attrs,
        } => {
            let passage = CloudPassage::connect(config)?;
            let value = parse_value(json)?;
            let response = passage.push(&value, kind_for(*binary), &parse_attrs(attrs)?)?;
            output(&cli.format, &serde_json::to_value(&response)?)?;
        }

        Commands::PullValue { query } => {
            let passage = CloudPassage::connect(config)?;
            let value = passage.pull(&parse_attrs(query)?)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "found": value.is_some(),
                    "value": value.as_ref().map(display_value)
                }),
            )?;
        }

        Commands::RemoveValue { json, binary } => {
            let passage = CloudPassage::connect(config)?;
            let value = parse_value(json)?;
            let response = passage.remove_trace(&value, kind_for(*binary), &Attributes::new())?;
            output(&cli.format, &serde_json::to_value(&response)?)?;
        }

        Commands::Tables => {
            let driver = RestDriver::new(config)?;
            let tables: Vec<_> = driver
                .liaison_names()
                .into_iter()
                .filter_map(|name| {
                    let liaison = driver.liaison(&name)?;
                    let names = LiaisonNames::for_resource(&name);
                    Some(serde_json::json!({
                        "name": name,
                        "url": liaison.url(),
                        "methods": [names.create, names.list, names.update, names.delete]
                    }))
                })
                .collect();
            output(&cli.format, &serde_json::json!({ "tables": tables }))?;
        }

        Commands::Table {
            name,
            action,
            path,
            fields,
        } => {
            let driver = RestDriver::new(config)?;
            if let Some(path) = path {
                if !driver.register_liaison(name, path) {
                    anyhow::bail!("Cannot register table {:?} at {:?}", name, path);
                }
            }
            let liaison = driver
                .liaison(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown table: {}", name))?;
            let fields = parse_attrs(fields)?;
            let response = match action {
                TableAction::New => liaison.create(&fields),
                TableAction::Get => liaison.list(&fields),
                TableAction::Update => liaison.update(&fields),
                TableAction::Delete => liaison.delete(&fields),
            };
            output(&cli.format, &serde_json::to_value(&response)?)?;
        }
    }

    Ok(())
}

fn driver_config(cli: &Cli) -> DriverConfig {
    let mut config = DriverConfig::from_env();
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    if let Some(algorithm) = &cli.checksum {
        config.checksum_algorithm = algorithm.clone();
    }
    config
}

fn kind_for(binary: bool) -> SerializationKind {
    if binary {
        SerializationKind::Binary
    } else {
        SerializationKind::Text
    }
}

/// Parse `key=value` pairs
fn parse_attrs(pairs: &[String]) -> anyhow::Result<Attributes> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("Expected key=value, got {:?}", pair))
        })
        .collect()
}

fn parse_value(json: &str) -> anyhow::Result<Value> {
    let json: serde_json::Value = serde_json::from_str(json).context("value must be JSON")?;
    Ok(from_json(json))
}

fn display_value(value: &Value) -> serde_json::Value {
    to_json(value).unwrap_or_else(|_| serde_json::Value::String(format!("{:?}", value)))
}

fn output(format: &OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
