// Perch - serve data-processing pipelines over HTTP
// Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use perch::config::{load_settings, Settings};
use perch::directory::{generate_api_key, Directory, FileKeyStore};
use perch::logging::init_tracing;
use perch::pipeline::demo::Demo;
use perch::server::RequestService;
use perch::service::DirectoryClient;

#[derive(Parser)]
#[command(
    name = "perch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Serve data-processing pipelines and the directory that lists them"
)]
struct Cli {
    /// Settings file (default: ~/.perch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a request service with one of the built-in demo pipelines
    Serve {
        /// text, fiducials or echo
        #[arg(long, default_value = "text")]
        demo: Demo,
        #[arg(long)]
        port: Option<u16>,
        /// Answer /predict with a job token
        #[arg(long)]
        delayed: bool,
        /// Announce to this directory
        #[arg(long)]
        directory_url: Option<String>,
    },

    /// Run the directory service
    Directory {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        key_store: Option<PathBuf>,
    },

    /// Administer the directory's API keys
    Keys {
        #[arg(long, global = true)]
        key_store: Option<PathBuf>,
        #[command(subcommand)]
        action: KeysAction,
    },

    /// List the services a directory knows about
    Discover {
        /// Directory base URL
        url: String,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Generate a new key, store it and print it
    Create,
    /// Store an existing key
    Add { key: String },
    /// Revoke a key
    Remove { key: String },
    /// Print every stored key
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::Serve {
            demo,
            port,
            delayed,
            directory_url,
        } => run_node(settings, demo, port, delayed, directory_url).await,
        Command::Directory { port, key_store } => {
            let mut config = settings.directory;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(path) = key_store {
                config.key_store = path;
            }
            tracing::info!("Using API key store {}", config.key_store.display());
            Directory::from_config(&config).serve(&config).await
        }
        Command::Keys { key_store, action } => {
            let path = key_store.unwrap_or(settings.directory.key_store);
            run_keys(FileKeyStore::new(path), action)
        }
        Command::Discover { url } => run_discover(&url).await,
    }
}

async fn run_node(
    settings: Settings,
    demo: Demo,
    port: Option<u16>,
    delayed: bool,
    directory_url: Option<String>,
) -> Result<()> {
    let mut config = settings.node;
    if let Some(port) = port {
        config.port = port;
    }
    if delayed {
        config.delayed = true;
    }
    if let Some(url) = directory_url {
        config.directory_url = Some(url);
        config.announce = true;
    }
    config.validate()?;

    let app = demo.build();
    tracing::info!(?demo, delayed = config.delayed, "Serving demo pipeline");
    RequestService::from_config(&config, app.pipeline, app.input, app.output)
        .serve(&config)
        .await
}

fn run_keys(store: FileKeyStore, action: KeysAction) -> Result<()> {
    let path = store.path().display().to_string();
    match action {
        KeysAction::Create => {
            let key = generate_api_key();
            store
                .add(&key)
                .with_context(|| format!("Failed to update {}", path))?;
            println!("{}", key);
        }
        KeysAction::Add { key } => {
            if store
                .add(&key)
                .with_context(|| format!("Failed to update {}", path))?
            {
                println!("Added key to {}", path);
            } else {
                println!("Key already present in {}", path);
            }
        }
        KeysAction::Remove { key } => {
            if store
                .remove(&key)
                .with_context(|| format!("Failed to update {}", path))?
            {
                println!("Removed key from {}", path);
            } else {
                anyhow::bail!("Key not found in {}", path);
            }
        }
        KeysAction::List => {
            for key in store
                .list()
                .with_context(|| format!("Failed to read {}", path))?
            {
                println!("{}", key);
            }
        }
    }
    Ok(())
}

async fn run_discover(url: &str) -> Result<()> {
    let client = DirectoryClient::new(url)?;
    let catalog = client.catalog().await?;
    if catalog.is_empty() {
        println!("No services announced at {}", url);
        return Ok(());
    }
    for (modality, anatomies) in &catalog {
        println!("{}", modality);
        for (anatomy, tasks) in anatomies {
            println!("  {}", anatomy);
            for (task, services) in tasks {
                println!("    {}", task);
                for s in services {
                    println!("      [{}] {} - {}", s.sid, s.name, s.prediction_url);
                }
            }
        }
    }
    Ok(())
}
