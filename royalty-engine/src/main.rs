//! royalty-engine - statement settlement CLI
//!
//! Operator surface over the settlement engine: register writers and
//! placements, upload and resolve statements, publish, queue and pay them,
//! and inspect summaries and balances. Results are printed as JSON on
//! stdout; logs go to stderr.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use royalty_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use royalty_engine::models::{AssignedWriter, PlacementCredit, ProType, StatementRow, WriterRecord};
use royalty_engine::{RoyaltyEngine, SettlementSettings};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for royalty-engine
#[derive(Parser, Debug)]
#[command(name = "royalty-engine")]
#[command(about = "Royalty statement settlement engine")]
#[command(version)]
struct Cli {
    /// Root folder holding the settlement database
    #[arg(short, long, global = true, env = "ROYALTY_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML file (default: platform config dir, then /etc/royalty)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding root folder and TOML
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Ledger entries per insert batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Transaction timeout for publish and payment runs, in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the root folder and database
    Init,
    /// Writer identities
    #[command(subcommand)]
    Writer(WriterCommand),
    /// Authoritative placements
    #[command(subcommand)]
    Placement(PlacementCommand),
    /// Upload normalized statement rows from a JSON array
    Upload {
        /// PRO type (BMI, ASCAP, SESAC, MLC, GMR, SOCAN, PRS, OTHER)
        #[arg(long)]
        pro: String,
        /// JSON file with the normalized rows
        #[arg(long)]
        file: PathBuf,
        /// Reporting period label
        #[arg(long)]
        period: Option<String>,
    },
    /// Match rows to writers and build the review queue
    Resolve { statement_id: Uuid },
    /// Show rows waiting on an operator
    Review { statement_id: Uuid },
    /// Store operator assignments from a JSON object (work key -> writers)
    Assign {
        statement_id: Uuid,
        #[arg(long)]
        file: PathBuf,
    },
    /// Materialize ledger entries
    Publish { statement_id: Uuid },
    /// Recompute ledger entries of a published, unpaid statement
    Republish { statement_id: Uuid },
    /// Make ledger entries visible to writers
    Queue { statement_id: Uuid },
    /// Pay a published statement and credit writer balances
    Pay { statement_id: Uuid },
    /// Statement overview
    Summary { statement_id: Uuid },
    /// Per-writer payment breakdown
    PaymentSummary { statement_id: Uuid },
    /// Writer balance
    Balance { writer_id: Uuid },
    /// Delete an unpaid statement
    Delete { statement_id: Uuid },
    /// List statements, newest first
    List,
    /// Commission administration
    #[command(subcommand)]
    Policy(PolicyCommand),
}

#[derive(Subcommand, Debug)]
enum WriterCommand {
    /// Register a writer (or update one with --id)
    Add(WriterArgs),
    /// Show a writer
    Show { writer_id: Uuid },
}

#[derive(Args, Debug)]
struct WriterArgs {
    #[arg(long)]
    id: Option<Uuid>,
    #[arg(long)]
    name: String,
    #[arg(long)]
    ipi: Option<String>,
    #[arg(long)]
    publisher_ipi: Option<String>,
    /// PRO affiliation
    #[arg(long)]
    pro: Option<String>,
    /// Commission override rate (0-100)
    #[arg(long)]
    override_rate: Option<Decimal>,
}

#[derive(Subcommand, Debug)]
enum PlacementCommand {
    /// Register a placement with its writer credits
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        publisher_ipi: Option<String>,
        #[arg(long)]
        dsp: Option<String>,
        /// WRITER_ID:SPLIT[:WRITER_IPI], repeatable
        #[arg(long = "credit", required = true, value_parser = parse_credit)]
        credits: Vec<PlacementCredit>,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Record a global commission rate
    Set {
        #[arg(long)]
        rate: Decimal,
        /// RFC 3339 start time (default: now)
        #[arg(long)]
        effective_from: Option<DateTime<Utc>>,
    },
    /// Show the policy in effect now
    Show,
    /// Set or clear a writer's override rate
    Override {
        #[arg(long)]
        writer: Uuid,
        #[arg(long, conflicts_with = "clear")]
        rate: Option<Decimal>,
        #[arg(long)]
        clear: bool,
    },
    /// Request a commission reduction for a writer
    Redeem {
        #[arg(long)]
        writer: Uuid,
        #[arg(long)]
        rate: Decimal,
        /// RFC 3339 expiry
        #[arg(long)]
        expires_at: DateTime<Utc>,
    },
    /// Approve a pending reduction (or reject it with --reject)
    Decide {
        redemption_id: Uuid,
        #[arg(long)]
        reject: bool,
    },
}

fn parse_credit(raw: &str) -> std::result::Result<PlacementCredit, String> {
    let mut parts = raw.splitn(3, ':');
    let writer_id = parts
        .next()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| format!("invalid writer id in {:?}", raw))?;
    let split_percentage = parts
        .next()
        .and_then(|s| s.trim().parse::<Decimal>().ok())
        .ok_or_else(|| format!("invalid split in {:?}", raw))?;
    let writer_ipi = parts.next().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    Ok(PlacementCredit {
        writer_id,
        split_percentage,
        writer_ipi,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn init_logging(toml_config: &TomlConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("royalty_engine={0},royalty_common={0}", toml_config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolver = RootFolderResolver::new("royalty-engine")
        .with_cli_arg(cli.root_folder.clone())
        .with_config_path(cli.config.clone());
    let toml_config = resolver.load_config();
    init_logging(&toml_config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting royalty-engine"
    );

    let initializer = RootFolderInitializer::new(resolver.resolve());
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    let db_path = cli
        .database
        .clone()
        .or_else(|| toml_config.database_path.clone())
        .unwrap_or_else(|| initializer.database_path());
    info!("Database: {}", db_path.display());

    let mut settings = SettlementSettings::resolve(&toml_config)?;
    if let Some(batch_size) = cli.batch_size {
        settings.batch_size = batch_size;
    }
    if let Some(secs) = cli.timeout_secs {
        settings.transaction_timeout = Duration::from_secs(secs);
    }

    let engine = RoyaltyEngine::open(&db_path, settings)
        .await
        .context("Failed to open settlement database")?;

    run(&engine, cli.command).await
}

async fn run(engine: &RoyaltyEngine, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            info!("Database ready");
            print_json(&serde_json::json!({ "status": "ok" }))
        }
        Command::Writer(WriterCommand::Add(args)) => {
            let mut writer = WriterRecord::new(args.name);
            if let Some(id) = args.id {
                writer.id = id;
            }
            writer.writer_ipi = args.ipi;
            writer.publisher_ipi = args.publisher_ipi;
            writer.pro_affiliation = args.pro.as_deref().map(str::parse::<ProType>).transpose()?;
            writer.commission_override_rate = args.override_rate;
            print_json(&engine.catalog.register_writer(writer).await?)
        }
        Command::Writer(WriterCommand::Show { writer_id }) => print_json(&engine.catalog.writer(writer_id).await?),
        Command::Placement(PlacementCommand::Add {
            title,
            publisher_ipi,
            dsp,
            credits,
        }) => print_json(
            &engine
                .catalog
                .register_placement(&title, publisher_ipi, dsp, credits)
                .await?,
        ),
        Command::Upload { pro, file, period } => {
            let pro_type: ProType = pro.parse()?;
            let rows: Vec<StatementRow> = read_json(&file)?;
            let statement = engine.publisher.upload(pro_type, rows, period).await?;
            print_json(&engine.publisher.summary(statement.id).await?)
        }
        Command::Resolve { statement_id } => print_json(&engine.publisher.resolve(statement_id).await?),
        Command::Review { statement_id } => print_json(&engine.publisher.review_queue(statement_id).await?),
        Command::Assign { statement_id, file } => {
            let assignments: BTreeMap<String, Vec<AssignedWriter>> = read_json(&file)?;
            engine.publisher.assign(statement_id, assignments).await?;
            print_json(&engine.publisher.summary(statement_id).await?)
        }
        Command::Publish { statement_id } => print_json(&engine.publisher.publish(statement_id).await?),
        Command::Republish { statement_id } => print_json(&engine.publisher.republish(statement_id).await?),
        Command::Queue { statement_id } => {
            let visible = engine.publisher.queue_for_payment(statement_id).await?;
            print_json(&serde_json::json!({ "statement_id": statement_id, "visible_entries": visible }))
        }
        Command::Pay { statement_id } => {
            let outcome = engine.payments.process_payment(statement_id).await?;
            // Let notifications finish before the process exits
            let failed = outcome.side_effects.await.unwrap_or(0);
            if failed > 0 {
                tracing::warn!(failed, "Some post-payment notifications failed");
            }
            print_json(&outcome.receipt)
        }
        Command::Summary { statement_id } => print_json(&engine.publisher.summary(statement_id).await?),
        Command::PaymentSummary { statement_id } => {
            print_json(&engine.payments.payment_summary(statement_id).await?)
        }
        Command::Balance { writer_id } => print_json(&engine.payments.writer_balance(writer_id).await?),
        Command::Delete { statement_id } => {
            engine.publisher.delete(statement_id).await?;
            print_json(&serde_json::json!({ "statement_id": statement_id, "deleted": true }))
        }
        Command::List => print_json(&engine.publisher.list().await?),
        Command::Policy(policy) => run_policy(engine, policy).await,
    }
}

async fn run_policy(engine: &RoyaltyEngine, command: PolicyCommand) -> Result<()> {
    match command {
        PolicyCommand::Set { rate, effective_from } => {
            print_json(&engine.commission.create_policy(rate, effective_from).await?)
        }
        PolicyCommand::Show => match engine.commission.active_policy().await? {
            Some(policy) => print_json(&policy),
            None => bail!("No commission policy in effect"),
        },
        PolicyCommand::Override { writer, rate, clear } => {
            if rate.is_none() && !clear {
                bail!("Pass --rate or --clear");
            }
            engine.commission.set_writer_override(writer, rate).await?;
            print_json(&engine.catalog.writer(writer).await?)
        }
        PolicyCommand::Redeem {
            writer,
            rate,
            expires_at,
        } => print_json(&engine.commission.request_redemption(writer, rate, expires_at).await?),
        PolicyCommand::Decide { redemption_id, reject } => {
            print_json(&engine.commission.decide_redemption(redemption_id, !reject).await?)
        }
    }
}
