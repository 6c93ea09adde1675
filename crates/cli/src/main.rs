use anyhow::Context;
use clap::{Parser, Subcommand};
use peerscope_core::config::Settings;
use peerscope_core::peers::{PeerDiscoveryError, ScreenerPeerClient};
use peerscope_core::pipeline::{parse_date, PeerResolver, PipelineError, DATE_FORMAT};
use peerscope_core::prices::{HistoryRequest, InstrumentTable, KiteHistoryClient, PriceHistory};
use peerscope_core::reference::ReferenceTable;
use peerscope_core::storage::{MemoryFundamentalsStore, PgFundamentalsStore};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod render;

#[derive(Debug, Parser)]
#[command(name = "peerscope", about = "Compare a stock's fundamentals with its listed peers")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the peer comparison for one ticker and date.
    Analyze {
        /// Base stock ticker, e.g. ALKEM.
        #[arg(long)]
        ticker: String,

        /// Snapshot date (YYYY-MM-DD). Defaults to today's local date.
        #[arg(long)]
        date: Option<String>,

        /// Issuer-name reference table (CSV or zipped CSV). Overrides REFERENCE_TABLE_PATH.
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Read store documents from this JSON file instead of DATABASE_URL.
        #[arg(long)]
        documents: Option<PathBuf>,

        /// Print the comparison as JSON instead of tables.
        #[arg(long)]
        json: bool,
    },

    /// Load fundamentals documents (JSON array or JSON lines) into the store.
    Import {
        #[arg(long)]
        file: PathBuf,

        /// Collection to import into; analyses of this ticker read from it.
        #[arg(long)]
        collection: String,

        /// Parse and validate only.
        #[arg(long)]
        dry_run: bool,
    },

    /// Fetch OHLCV price history for one NSE symbol.
    History {
        /// Symbol such as RELIANCE or RELIANCE.NS.
        #[arg(long)]
        symbol: String,

        /// Lookback such as 1y, 6mo or 7d. Ignored when --start or --end is given.
        #[arg(long)]
        period: Option<String>,

        /// 1d, 1m, 5m, 15m, 30m or 60m. Anything else is fetched daily.
        #[arg(long, default_value = "1d")]
        interval: String,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// Broker instruments dump (CSV). Overrides KITE_INSTRUMENTS_PATH.
        #[arg(long)]
        instruments: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
}

const DEFAULT_INSTRUMENTS_PATH: &str = "instruments.csv";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Analyze {
            ticker,
            date,
            reference,
            documents,
            json,
        } => {
            analyze(
                &settings,
                AnalyzeOptions {
                    ticker,
                    date,
                    reference,
                    documents,
                    json,
                },
            )
            .await
        }
        Command::Import {
            file,
            collection,
            dry_run,
        } => import(&settings, &file, &collection, dry_run)
            .await
            .map(|()| ExitCode::SUCCESS),
        Command::History {
            symbol,
            period,
            interval,
            start,
            end,
            instruments,
            json,
        } => {
            let req = HistoryRequest {
                period,
                interval,
                start,
                end,
            };
            history(&symbol, &req, instruments, json).await
        }
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
    }
    result
}

struct AnalyzeOptions {
    ticker: String,
    date: Option<String>,
    reference: Option<PathBuf>,
    documents: Option<PathBuf>,
    json: bool,
}

async fn analyze(settings: &Settings, opts: AnalyzeOptions) -> anyhow::Result<ExitCode> {
    let date = opts
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive().format(DATE_FORMAT).to_string());
    let ticker = opts.ticker.trim().to_string();

    if let Err(err) = parse_date(&date) {
        println!("{err}");
        return Ok(ExitCode::FAILURE);
    }

    let reference_path = opts
        .reference
        .unwrap_or_else(|| PathBuf::from(settings.reference_table_path()));
    let reference = ReferenceTable::load(&reference_path)?;

    let discovery = ScreenerPeerClient::from_settings(settings)?;

    let outcome = match opts.documents {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read documents file {}", path.display()))?;
            let store = MemoryFundamentalsStore::from_documents_text(&text)?;
            tracing::debug!(documents = store.len(), "using offline document store");

            PeerResolver::new(&reference, &store, &discovery)
                .resolve_peers(&ticker, &date)
                .await
        }
        None => {
            let pool = connect(settings).await?;
            let store = PgFundamentalsStore::new(pool.clone(), ticker.as_str());

            let outcome = PeerResolver::new(&reference, &store, &discovery)
                .resolve_peers(&ticker, &date)
                .await;
            pool.close().await;
            outcome
        }
    };

    match outcome {
        Ok(comparison) => {
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&comparison)?);
            } else {
                println!("{}", render::report(&comparison));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("{err}");
            if is_unexpected(&err) {
                let err = anyhow::Error::new(err);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(%ticker, %date, error = %err, "analysis failed");
            } else {
                tracing::info!(%ticker, %date, error = %err, "analysis halted");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

// Infrastructure failures, as opposed to missing data or bad input.
fn is_unexpected(err: &PipelineError) -> bool {
    matches!(
        err,
        PipelineError::Store(_) | PipelineError::Discovery(PeerDiscoveryError::Fetch(_))
    )
}

async fn import(
    settings: &Settings,
    file: &std::path::Path,
    collection: &str,
    dry_run: bool,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read documents file {}", file.display()))?;
    let docs = peerscope_core::storage::documents::parse_documents(&text)?;
    anyhow::ensure!(!docs.is_empty(), "{} contains no documents", file.display());

    let reports = docs.iter().filter(|d| d.is_report).count();
    if dry_run {
        tracing::info!(
            collection,
            documents = docs.len(),
            reports,
            dry_run = true,
            "import validated"
        );
        println!(
            "{} documents ({reports} report) parsed; nothing written",
            docs.len()
        );
        return Ok(());
    }

    let pool = connect(settings).await?;
    let result = async {
        peerscope_core::storage::migrate(&pool).await?;
        peerscope_core::storage::postgres::import_documents(&pool, collection.trim(), &docs).await
    }
    .await;
    pool.close().await;

    let affected = result?;
    tracing::info!(collection, affected, reports, "imported fundamentals documents");
    println!("Imported {affected} documents into {}", collection.trim());
    Ok(())
}

async fn history(
    symbol: &str,
    req: &HistoryRequest,
    instruments: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let instruments_path = instruments.unwrap_or_else(|| {
        std::env::var("KITE_INSTRUMENTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_INSTRUMENTS_PATH))
    });
    let instruments = InstrumentTable::load(&instruments_path)?;
    let client = KiteHistoryClient::from_env()?;

    let ticker = PriceHistory::new(symbol, &instruments, &client);
    match ticker.history(req).await {
        Ok(bars) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&bars)?);
            } else {
                println!("{}", render::price_table(&bars));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("{err}");
            tracing::info!(symbol = ticker.symbol(), error = %err, "price history halted");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<sqlx::PgPool> {
    let db_url = settings.require_database_url()?;
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
