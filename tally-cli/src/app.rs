use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tally_checkpoint::{open_sqlite, PlannerConfig, SqliteCheckpointEngine};
use tally_config::{load_config, to_toml, AppConfig};
use tally_core::{AccountId, CommodityId, ReconcileState, TransactionId};
use tally_ledger::{Account, Commodity, LedgerSource, SqliteLedger, Transaction};
use tracing::info;

use crate::telemetry;

#[derive(Parser)]
#[command(author, version, about = "Tally ledger checkpoint maintenance")]
pub struct Cli {
    /// Configuration environment layered over config/default.toml
    #[arg(long)]
    env: Option<String>,
    /// Override database.path from the configuration
    #[arg(long)]
    database: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Increases logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the effective configuration as TOML
    Config,
    #[command(flatten)]
    Book(BookCommand),
}

#[derive(Subcommand)]
pub enum BookCommand {
    /// Create the ledger and checkpoint tables
    Init,
    /// Manage commodities
    Commodity {
        #[command(subcommand)]
        action: CommodityCommand,
    },
    /// Manage accounts
    Account {
        #[command(subcommand)]
        action: AccountCommand,
    },
    /// Record a transaction and refresh the checkpoints it touches
    Post(PostArgs),
    /// Delete a transaction and refresh the checkpoints that held it
    Remove(RemoveArgs),
    /// Recompute checkpoints from scratch
    Rebuild(RebuildArgs),
    /// Refresh the checkpoint containing a date
    Refresh(RefreshArgs),
    /// Resolve one account's balances as of a date
    Balance(BalanceArgs),
    /// Resolve balances for a group of accounts
    Balances(BalancesArgs),
    /// List an account's checkpoints
    Checkpoints(CheckpointsArgs),
}

#[derive(Subcommand)]
pub enum CommodityCommand {
    Add {
        name: String,
        /// Smallest units per whole unit, e.g. 100 for cents
        #[arg(long, default_value_t = 100)]
        fraction: i64,
    },
}

#[derive(Subcommand)]
pub enum AccountCommand {
    Add {
        name: String,
        #[arg(long)]
        commodity: Option<String>,
        #[arg(long)]
        parent: Option<AccountId>,
    },
    /// List every account in the book
    List,
}

#[derive(Args)]
pub struct PostArgs {
    #[arg(long, value_parser = parse_timestamp)]
    date: DateTime<Utc>,
    #[arg(long, default_value = "")]
    description: String,
    /// ACCOUNT_ID:AMOUNT[:STATE], repeatable
    #[arg(long = "split", required = true)]
    splits: Vec<SplitArg>,
}

#[derive(Args)]
pub struct RemoveArgs {
    #[arg(long)]
    transaction: TransactionId,
}

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["account", "group", "all"])))]
pub struct RebuildArgs {
    #[arg(long)]
    account: Option<AccountId>,
    /// Rebuild every account below this parent
    #[arg(long)]
    group: Option<AccountId>,
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
pub struct RefreshArgs {
    #[arg(long)]
    account: AccountId,
    #[arg(long, value_parser = parse_timestamp)]
    at: DateTime<Utc>,
}

#[derive(Args)]
pub struct BalanceArgs {
    #[arg(long)]
    account: AccountId,
    /// Defaults to now
    #[arg(long, value_parser = parse_timestamp)]
    as_of: Option<DateTime<Utc>>,
}

#[derive(Args)]
pub struct BalancesArgs {
    /// Parent account; the whole book when omitted
    #[arg(long)]
    group: Option<AccountId>,
    #[arg(long, value_parser = parse_timestamp)]
    as_of: Option<DateTime<Utc>>,
}

#[derive(Args)]
pub struct CheckpointsArgs {
    #[arg(long)]
    account: AccountId,
}

/// One split given on the command line as `ACCOUNT_ID:AMOUNT[:STATE]`.
#[derive(Clone, Debug)]
pub struct SplitArg {
    account: AccountId,
    amount: Decimal,
    state: ReconcileState,
}

impl FromStr for SplitArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.split(':');
        let (Some(account), Some(amount)) = (parts.next(), parts.next()) else {
            return Err(format!("expected ACCOUNT_ID:AMOUNT[:STATE], got '{value}'"));
        };
        let account = account
            .parse::<AccountId>()
            .map_err(|err| err.to_string())?;
        let amount = Decimal::from_str(amount).map_err(|err| format!("invalid amount: {err}"))?;
        let state = match parts.next() {
            Some(state) => state.parse::<ReconcileState>()?,
            None => ReconcileState::New,
        };
        if parts.next().is_some() {
            return Err(format!("too many fields in split '{value}'"));
        }
        Ok(Self {
            account,
            amount,
            state,
        })
    }
}

/// Balances of one account as printed by `balance` and `balances`.
#[derive(Serialize)]
struct BalanceRow {
    account: String,
    name: String,
    commodity: Option<CommodityId>,
    as_of: DateTime<Utc>,
    balance: Option<String>,
    cleared: Option<String>,
    reconciled: Option<String>,
}

impl BalanceRow {
    fn new(account: &Account, as_of: DateTime<Utc>) -> Self {
        let balances = account.starting_balances;
        Self {
            account: account.id.to_string(),
            name: account.name.clone(),
            commodity: account.commodity.clone(),
            as_of,
            balance: balances.map(|b| b.balance.to_string()),
            cleared: balances.map(|b| b.cleared.to_string()),
            reconciled: balances.map(|b| b.reconciled.to_string()),
        }
    }

    fn print(&self) {
        match (&self.balance, &self.cleared, &self.reconciled) {
            (Some(balance), Some(cleared), Some(reconciled)) => println!(
                "{}\t{}\tbalance={balance}\tcleared={cleared}\treconciled={reconciled}",
                self.account, self.name
            ),
            _ => println!("{}\t{}\tno commodity", self.account, self.name),
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.env.as_deref())?;
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    let _guard = telemetry::init_tracing(&config.log, cli.verbose)?;
    match cli.command {
        Commands::Config => print!("{}", to_toml(&config)?),
        Commands::Book(command) => command.run(&config, cli.json)?,
    }
    Ok(())
}

impl BookCommand {
    fn run(self, config: &AppConfig, json: bool) -> Result<()> {
        let engine = open_engine(config)?;
        match self {
            BookCommand::Init => {
                info!(path = %config.database.path.display(), "book ready");
                println!("initialized {}", config.database.path.display());
            }
            BookCommand::Commodity {
                action: CommodityCommand::Add { name, fraction },
            } => {
                engine
                    .source()
                    .add_commodity(&Commodity::new(name.as_str(), fraction))?;
                println!("{name}");
            }
            BookCommand::Account { action } => account_command(&engine, action, json)?,
            BookCommand::Post(args) => post(&engine, args)?,
            BookCommand::Remove(args) => {
                let placements = engine.source().remove_transaction(&args.transaction)?;
                let rows = engine.update_checkpoints_at(&placements)?;
                println!(
                    "removed {} (refreshed {rows} checkpoints)",
                    args.transaction
                );
            }
            BookCommand::Rebuild(args) => rebuild(&engine, args)?,
            BookCommand::Refresh(args) => {
                let rows = engine.update_checkpoint_at(&args.account, args.at)?;
                println!("refreshed {rows} checkpoints");
            }
            BookCommand::Balance(args) => {
                let as_of = args.as_of.unwrap_or_else(Utc::now);
                let account = engine.resolve_account(&args.account, as_of)?;
                print_balances(&[BalanceRow::new(&account, as_of)], json)?;
            }
            BookCommand::Balances(args) => {
                let as_of = args.as_of.unwrap_or_else(Utc::now);
                let rows: Vec<_> = engine
                    .resolve_group_balances(args.group.as_ref(), as_of)?
                    .iter()
                    .map(|account| BalanceRow::new(account, as_of))
                    .collect();
                print_balances(&rows, json)?;
            }
            BookCommand::Checkpoints(args) => {
                let checkpoints = engine.checkpoints(&args.account)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&checkpoints)?);
                } else {
                    for checkpoint in checkpoints {
                        println!(
                            "{}\t{}\t{}\t{}\t{}",
                            checkpoint.span.start.to_rfc3339(),
                            checkpoint.span.end.to_rfc3339(),
                            checkpoint.totals.balance,
                            checkpoint.totals.cleared,
                            checkpoint.totals.reconciled
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

fn open_engine(config: &AppConfig) -> Result<SqliteCheckpointEngine> {
    let ledger = SqliteLedger::new(&config.database.path)
        .with_context(|| format!("failed to open {}", config.database.path.display()))?
        .with_busy_timeout(StdDuration::from_millis(config.database.busy_timeout_ms));
    let settings = &config.checkpoints;
    let planner = PlannerConfig::from_secs(
        settings.min_checkpoint_count,
        settings.min_gap_secs,
        settings.boundary_offset_secs,
    )?;
    Ok(open_sqlite(ledger, planner)?)
}

fn account_command(
    engine: &SqliteCheckpointEngine,
    action: AccountCommand,
    json: bool,
) -> Result<()> {
    match action {
        AccountCommand::Add {
            name,
            commodity,
            parent,
        } => {
            let mut account = Account::new(name, commodity.map(CommodityId::from));
            if let Some(parent) = parent {
                account = account.with_parent(parent);
            }
            engine.source().add_account(&account)?;
            println!("{}", account.id);
        }
        AccountCommand::List => {
            let accounts = engine.source().accounts()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
            } else {
                for account in accounts {
                    let commodity = account
                        .commodity
                        .as_ref()
                        .map(CommodityId::as_str)
                        .unwrap_or("-");
                    println!("{}\t{}\t{commodity}", account.id, account.name);
                }
            }
        }
    }
    Ok(())
}

fn post(engine: &SqliteCheckpointEngine, args: PostArgs) -> Result<()> {
    let mut txn = Transaction::new(args.date, args.description);
    for split in args.splits {
        let commodity = engine.source().account_commodity(&split.account)?;
        let amount = to_smallest_units(split.amount, commodity.fraction)
            .with_context(|| format!("amount for account {}", split.account))?;
        txn = txn.with_split(split.account, amount, split.state);
    }
    engine.source().record_transaction(&txn)?;
    let rows = engine.update_checkpoints_for_transaction(&txn.id)?;
    println!("{}", txn.id);
    info!(transaction = %txn.id, rows, "posted transaction");
    Ok(())
}

fn rebuild(engine: &SqliteCheckpointEngine, args: RebuildArgs) -> Result<()> {
    if let Some(account) = args.account {
        let count = engine.rebuild_checkpoints(&account)?;
        println!("{account}\t{count}");
        return Ok(());
    }
    let outcome = engine.rebuild_group(args.group.as_ref())?;
    for (account, count) in &outcome.rebuilt {
        println!("{account}\t{count}");
    }
    for account in &outcome.skipped {
        println!("{account}\tskipped");
    }
    Ok(())
}

fn print_balances(rows: &[BalanceRow], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else {
        rows.iter().for_each(BalanceRow::print);
    }
    Ok(())
}

/// Convert a decimal amount into the commodity's smallest unit.
fn to_smallest_units(amount: Decimal, fraction: i64) -> Result<i64> {
    let scaled = amount
        .checked_mul(Decimal::from(fraction))
        .ok_or_else(|| anyhow!("amount {amount} overflows"))?;
    if !scaled.fract().is_zero() {
        bail!("amount {amount} is finer than 1/{fraction}");
    }
    scaled
        .to_i64()
        .ok_or_else(|| anyhow!("amount {amount} overflows"))
}

/// Accept RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{value}' (expected RFC 3339 or YYYY-MM-DD)"))
}
