//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use catalogwriter_catalog::Converter;
use catalogwriter_core::{
    CatalogWriter, Consumer, ConsumerProgress, ConsumerReport, WriterConfig, build_payload, queue,
};
use catalogwriter_shared::{
    AccountId, AppConfig, CatalogAccount, init_config, load_config, load_config_from,
    validate_config,
};
use catalogwriter_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// catalogwriter: push DCAT dataset graphs into a CKAN catalog.
#[derive(Parser)]
#[command(
    name = "catalogwriter",
    version,
    about = "Convert DCAT dataset graphs with DQV quality metrics into CKAN datasets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.catalogwriter/catalogwriter.toml).
    #[arg(long, global = true, env = "CATALOGWRITER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process N-Triples files as queue messages and submit them.
    Run {
        /// Graph files or directories of them.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Catalog base URL (overrides config).
        #[arg(long)]
        base_url: Option<String>,

        /// Messages processed at once (overrides config).
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the catalog payload for one graph without submitting it.
    Convert {
        /// N-Triples file.
        file: PathBuf,
    },

    /// Catalog credential management.
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Account subcommands.
#[derive(Subcommand)]
pub(crate) enum AccountsAction {
    /// Store a catalog account.
    Add {
        /// Label for the account.
        #[arg(long)]
        name: String,

        /// CKAN API key.
        #[arg(long, env = "CATALOGWRITER_API_KEY", hide_env_values = true)]
        api_key: String,
    },
    /// List stored accounts (keys masked). The first one is used for writes.
    List,
    /// Remove an account by ID.
    Remove {
        /// Account ID as printed by `accounts list`.
        id: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "catalogwriter=info",
        1 => "catalogwriter=debug",
        _ => "catalogwriter=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            paths,
            base_url,
            concurrency,
        } => cmd_run(config_path, &paths, base_url.as_deref(), concurrency).await,
        Command::Convert { file } => cmd_convert(config_path, &file).await,
        Command::Accounts { action } => match action {
            AccountsAction::Add { name, api_key } => {
                cmd_accounts_add(config_path, &name, &api_key).await
            }
            AccountsAction::List => cmd_accounts_list(config_path).await,
            AccountsAction::Remove { id } => cmd_accounts_remove(config_path, &id).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

/// Load the config from `--config` or the default location.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    paths: &[PathBuf],
    base_url: Option<&str>,
    concurrency: Option<usize>,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(url) = base_url {
        config.catalog.base_url = url.to_string();
    }
    if let Some(n) = concurrency {
        config.worker.concurrency = n;
    }
    validate_config(&config)?;

    let files = collect_graph_files(paths)?;
    if files.is_empty() {
        return Err(eyre!("no graph files found in the given paths"));
    }

    // A missing database means no account yet; messages are then dropped
    // until one is added.
    let db_path = config.db_path()?;
    let storage = if db_path.exists() {
        Storage::open_readonly(&db_path).await?
    } else {
        Storage::open(&db_path).await?
    };

    let writer = Arc::new(CatalogWriter::new(
        WriterConfig::from_app(&config)?,
        Arc::new(storage),
    ));
    let consumer = Consumer::new(writer, config.worker.concurrency);
    let (tx, rx) = queue(config.worker.queue_capacity);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    info!(
        files = files.len(),
        base_url = %config.catalog.base_url,
        concurrency = config.worker.concurrency,
        "processing graph files"
    );

    let total = files.len();
    let producer = tokio::spawn(async move {
        for path in files {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot read graph file, skipping");
                    continue;
                }
            };
            if tx.send(Some(bytes)).await.is_err() {
                break;
            }
        }
    });

    let progress = Arc::new(CliProgress::new(total));
    let report = consumer.run(rx, shutdown, progress.clone()).await;
    producer.abort();
    progress.finish();

    println!();
    println!("  Messages:   {}", report.received);
    println!("  Dispatched: {}", report.dispatched);
    println!("  Skipped:    {}", report.skipped);
    println!("  Failed:     {}", report.failed);
    println!("  Accepted:   {}", report.sent);
    println!("  Rejected:   {}", report.rejected);
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Expand directories to their files, sorted by path.
fn collect_graph_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            files.extend(entries);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(eyre!("'{}' is not a file or directory", path.display()));
        }
    }
    Ok(files)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    total: usize,
}

impl CliProgress {
    fn new(total: usize) -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner.set_message(format!("Processing [0/{total}]"));
        Self { spinner, total }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ConsumerProgress for CliProgress {
    fn message_done(&self, report: &ConsumerReport) {
        let done = report.dispatched + report.skipped + report.failed;
        self.spinner.set_message(format!(
            "Processing [{done}/{}] dispatched {}, failed {}",
            self.total, report.dispatched, report.failed
        ));
    }
}

// ---------------------------------------------------------------------------
// convert
// ---------------------------------------------------------------------------

async fn cmd_convert(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let config = resolve_config(config_path)?;
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;

    let graph = catalogwriter_graph::deserialize(&bytes)?;
    let converter = Converter::new(config.catalog.append_number);
    let (payload, metrics) = build_payload(&converter, &graph, &config.quality.metrics)?;
    info!(triples = graph.len(), metrics, "graph converted");

    let value: serde_json::Value = serde_json::from_str(&payload)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// accounts
// ---------------------------------------------------------------------------

async fn open_storage(config_path: Option<&Path>) -> Result<Storage> {
    let config = resolve_config(config_path)?;
    Ok(Storage::open(&config.db_path()?).await?)
}

async fn cmd_accounts_add(config_path: Option<&Path>, name: &str, api_key: &str) -> Result<()> {
    let storage = open_storage(config_path).await?;
    let account = CatalogAccount::new(name, api_key.trim());
    storage.insert_account(&account).await?;

    let position = storage.list_accounts().await?.len();
    println!("Account added: {} ({})", account.id, account.name);
    if position > 1 {
        println!("Note: the first stored account is the one used for writes.");
    }
    Ok(())
}

async fn cmd_accounts_list(config_path: Option<&Path>) -> Result<()> {
    let storage = open_storage(config_path).await?;
    let accounts = storage.list_accounts().await?;
    if accounts.is_empty() {
        println!("No accounts stored. Add one with `catalogwriter accounts add`.");
        return Ok(());
    }

    for (i, account) in accounts.iter().enumerate() {
        let marker = if i == 0 { "*" } else { " " };
        println!(
            "{marker} {}  {:<20} {}  {}",
            account.id,
            account.name,
            account.masked_key(),
            account.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn cmd_accounts_remove(config_path: Option<&Path>, id: &str) -> Result<()> {
    let id: AccountId = id
        .parse()
        .map_err(|e| eyre!("invalid account id '{id}': {e}"))?;
    let storage = open_storage(config_path).await?;
    if !storage.delete_account(&id).await? {
        return Err(eyre!("no account with id {id}"));
    }
    println!("Account removed: {id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
