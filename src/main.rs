//! autodex command-line interface.
//!
//! The operations the (external) presentation and admin layers would call,
//! exposed as subcommands: backend CRUD, per-backend sync, the sweep the
//! scheduler would trigger, direct-children listing, name search, and
//! streaming a file to stdout.

mod error;

use clap::{Parser, Subcommand};
use exn::ResultExt;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

use autodex_config::Settings;
use autodex_crawl::{HttpFetcher, sync_all, sync_backend};
use autodex_proxy::ContentProxy;
use autodex_store::{Backend, Credentials, Database, FileEntry, NewBackend, Repository};

use crate::error::{ErrorKind, Result};

#[derive(Parser)]
#[command(name = "autodex", version, about = "Index and browse remote HTTP directory listings")]
struct Cli {
    /// Configuration file (defaults to ./autodex.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage registered backends.
    Backend {
        #[command(subcommand)]
        action: BackendAction,
    },
    /// Crawl one backend now.
    Sync {
        /// Backend id.
        id: i64,
    },
    /// Crawl every backend, sequentially.
    Sweep {
        /// Keep running, sweeping at the configured interval.
        #[arg(long)]
        watch: bool,
    },
    /// List the direct children of an indexed directory.
    Ls {
        backend: i64,
        #[arg(default_value = "/")]
        path: String,
    },
    /// Search indexed file names (substring, case-insensitive).
    Search { query: String },
    /// Stream an indexed file to stdout.
    Cat {
        backend: i64,
        path: String,
        /// Byte range to request, e.g. "bytes=0-1023".
        #[arg(long)]
        range: Option<String>,
    },
}

#[derive(Subcommand)]
enum BackendAction {
    /// Register a backend.
    Add {
        url: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, requires = "password")]
        username: Option<String>,
        #[arg(long, requires = "username")]
        password: Option<String>,
        /// Minutes between scheduled rescans; omit for manual-only.
        #[arg(long)]
        rescan_interval: Option<u32>,
    },
    /// List registered backends.
    List,
    /// Replace a backend's descriptor.
    Update {
        id: i64,
        url: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, requires = "password")]
        username: Option<String>,
        #[arg(long, requires = "username")]
        password: Option<String>,
        #[arg(long)]
        rescan_interval: Option<u32>,
    },
    /// Delete a backend, its index entries, and renumber the rest.
    Rm { id: i64 },
}

fn descriptor(
    url: String,
    name: Option<String>,
    username: Option<String>,
    password: Option<String>,
    rescan_interval: Option<u32>,
) -> NewBackend {
    let credentials = match (username, password) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        _ => None,
    };
    NewBackend { name, url, credentials, rescan_interval }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        tracing::error!("{err:?}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let db = Database::connect(&settings.database.path).await.or_raise(|| ErrorKind::Store)?;
    let repo = Repository::from(&db);

    match cli.command {
        Command::Backend { action } => backend_command(&repo, action, cli.json).await?,
        Command::Sync { id } => {
            let fetcher = listing_fetcher(&settings)?;
            let stats = sync_backend(&repo, &fetcher, id).await.or_raise(|| ErrorKind::Crawl)?;
            println!("synced backend {id}: {} entries in {} directories", stats.entries, stats.directories);
        }
        Command::Sweep { watch } => {
            let fetcher = listing_fetcher(&settings)?;
            loop {
                let outcomes = sync_all(&repo, &fetcher).await.or_raise(|| ErrorKind::Crawl)?;
                for outcome in outcomes {
                    match outcome.result {
                        Ok(stats) => println!(
                            "{:>4}  {}  {} entries in {} directories",
                            outcome.backend.id, outcome.backend.name, stats.entries, stats.directories
                        ),
                        Err(err) => println!("{:>4}  {}  failed: {err}", outcome.backend.id, outcome.backend.name),
                    }
                }
                if !watch {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(settings.crawl.sweep_interval_secs)).await;
            }
        }
        Command::Ls { backend, path } => {
            let entries = repo.direct_children(backend, &path).await.or_raise(|| ErrorKind::Store)?;
            print_entries(&entries, cli.json)?;
        }
        Command::Search { query } => {
            let entries = repo.search_names(&query).await.or_raise(|| ErrorKind::Store)?;
            print_entries(&entries, cli.json)?;
        }
        Command::Cat { backend, path, range } => {
            let client = reqwest::Client::builder()
                .user_agent(settings.http.user_agent.as_str())
                // Total-request timeouts would cut long streams short; only
                // bound connection establishment.
                .connect_timeout(Duration::from_secs(settings.http.timeout_secs))
                .build()
                .or_raise(|| ErrorKind::Proxy)?;
            let proxy = ContentProxy::new(repo, client);
            let content = proxy
                .resolve_and_stream(backend, &path, range.as_deref())
                .await
                .or_raise(|| ErrorKind::Proxy)?;
            tracing::debug!(status = content.status, "streaming upstream response");
            let mut stdout = tokio::io::stdout();
            let mut body = content.body;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.or_raise(|| ErrorKind::Proxy)?;
                stdout.write_all(&chunk).await.or_raise(|| ErrorKind::Io)?;
            }
            stdout.flush().await.or_raise(|| ErrorKind::Io)?;
        }
    }
    Ok(())
}

fn listing_fetcher(settings: &Settings) -> Result<HttpFetcher> {
    HttpFetcher::new(&settings.http.user_agent, Duration::from_secs(settings.http.timeout_secs))
        .or_raise(|| ErrorKind::Crawl)
}

async fn backend_command(repo: &Repository, action: BackendAction, json: bool) -> Result<()> {
    match action {
        BackendAction::Add { url, name, username, password, rescan_interval } => {
            let created = repo
                .insert_backend(&descriptor(url, name, username, password, rescan_interval))
                .await
                .or_raise(|| ErrorKind::Store)?;
            println!("registered backend {} ({})", created.id, created.name);
        }
        BackendAction::List => {
            let backends = repo.list_backends().await.or_raise(|| ErrorKind::Store)?;
            let mut counts = Vec::with_capacity(backends.len());
            for backend in &backends {
                counts.push(repo.count_entries(backend.id).await.or_raise(|| ErrorKind::Store)?);
            }
            print_backends(&backends, &counts, json)?;
        }
        BackendAction::Update { id, url, name, username, password, rescan_interval } => {
            let updated = repo
                .update_backend(id, &descriptor(url, name, username, password, rescan_interval))
                .await
                .or_raise(|| ErrorKind::Store)?;
            println!("updated backend {} ({})", updated.id, updated.name);
        }
        BackendAction::Rm { id } => {
            repo.delete_backend(id).await.or_raise(|| ErrorKind::Store)?;
            println!("deleted backend {id}; higher ids renumbered");
        }
    }
    Ok(())
}

fn format_stamp(stamp: Option<time::UtcDateTime>) -> String {
    stamp
        .and_then(|ts| ts.format(&Rfc3339).ok())
        .unwrap_or_else(|| "never".to_string())
}

fn print_backends(backends: &[Backend], counts: &[u64], json: bool) -> Result<()> {
    if json {
        let value: Vec<_> = backends
            .iter()
            .zip(counts)
            .map(|(b, count)| {
                serde_json::json!({
                    "id": b.id,
                    "name": b.name,
                    "url": b.url,
                    "authEnabled": b.credentials.is_some(),
                    "rescanInterval": b.rescan_interval,
                    "scannedAt": b.scanned_at.map(|ts| ts.unix_timestamp()),
                    "entries": count,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value).or_raise(|| ErrorKind::Io)?);
        return Ok(());
    }
    for (backend, count) in backends.iter().zip(counts) {
        println!(
            "{:>4}  {:<24}  {:<40}  {:>8} entries  last scan: {}",
            backend.id,
            backend.name,
            backend.url,
            count,
            format_stamp(backend.scanned_at),
        );
    }
    Ok(())
}

fn print_entries(entries: &[FileEntry], json: bool) -> Result<()> {
    if json {
        let value: Vec<_> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "id": e.id,
                    "backendId": e.backend_id,
                    "path": e.path,
                    "name": e.name,
                    "isDirectory": e.is_directory,
                    "size": e.size,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value).or_raise(|| ErrorKind::Io)?);
        return Ok(());
    }
    for entry in entries {
        let marker = if entry.is_directory { "d" } else { "-" };
        println!("{marker}  {:>12}  {}", entry.size.map_or(String::new(), |s| s.to_string()), entry.path);
    }
    Ok(())
}
