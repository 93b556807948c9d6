use clap::{Parser, Subcommand};
use hourglass_rs::{SafeTimeProvider, TimeSource};
use serde_json::json;
use std::path::PathBuf;
use std::process;

use loan_ledger_rs::{
    telemetry, InMemoryStore, Ledger, LedgerConfig, LedgerError, LoanId, LoanStore, Money, Rate,
    SqliteStore, StorageConfig,
};

type CliLedger = Ledger<Box<dyn LoanStore>, SafeTimeProvider>;

/// Personal loan ledger
#[derive(Parser)]
#[command(
    name = "loan-ledger",
    version,
    about = "Personal loan ledger with exact decimal interest",
    long_about = "Creates loans, records payments and runs the daily interest passes \
                  against a loan database. Meant to be invoked once per day by an \
                  external scheduler such as cron for the `run-daily` pass."
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overrides the configured storage
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Originate a loan and record its disbursement
    Create {
        customer_key: String,
        principal: Money,
        /// Annual base rate as a decimal fraction, e.g. 0.12
        base_rate: Rate,
        /// Annual rate variance, may be negative
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        variance: Rate,
    },
    /// Show one loan
    Show { id: LoanId },
    /// List all loans
    List,
    /// Record a payment
    Pay { id: LoanId, amount: Money },
    /// Change the rate terms of an active loan
    UpdateRate {
        id: LoanId,
        base_rate: Rate,
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        variance: Rate,
    },
    /// Delete a loan and its transactions
    Delete { id: LoanId },
    /// List a loan's transactions
    Transactions { id: LoanId },
    /// Replay a loan's transactions against its balance
    Reconcile { id: LoanId },
    /// Run the daily accrual pass
    Accrue,
    /// Run the monthly capitalization pass
    Capitalize,
    /// Run accrual then capitalization
    RunDaily,
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };
    telemetry::init(&config.logging);

    match open_ledger(config).and_then(|ledger| run(&ledger, cli.command)) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> Result<LedgerConfig, LedgerError> {
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::from_file(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(path) = &cli.database {
        config.storage = StorageConfig::Sqlite { path: path.clone() };
    }
    config.validate()?;
    Ok(config)
}

fn open_ledger(config: LedgerConfig) -> Result<CliLedger, Box<dyn std::error::Error>> {
    let store: Box<dyn LoanStore> = match &config.storage {
        StorageConfig::Memory => {
            tracing::warn!("using in-memory storage, nothing will be kept after exit");
            Box::new(InMemoryStore::new())
        }
        StorageConfig::Sqlite { path } => Box::new(SqliteStore::open(path)?),
    };
    let time = SafeTimeProvider::new(TimeSource::System);
    Ok(Ledger::from_config(store, time, config))
}

fn run(ledger: &CliLedger, command: Commands) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let value = match command {
        Commands::Create {
            customer_key,
            principal,
            base_rate,
            variance,
        } => serde_json::to_value(ledger.create_loan(customer_key, principal, base_rate, variance)?)?,
        Commands::Show { id } => serde_json::to_value(ledger.get_loan(id)?)?,
        Commands::List => serde_json::to_value(ledger.list_loans()?)?,
        Commands::Pay { id, amount } => serde_json::to_value(ledger.record_payment(id, amount)?)?,
        Commands::UpdateRate {
            id,
            base_rate,
            variance,
        } => {
            let mut loan = ledger.get_loan(id)?;
            loan.base_rate = base_rate;
            loan.rate_variance = variance;
            loan.effective_rate = base_rate
                .checked_add(variance)
                .ok_or_else(|| LedgerError::calculation("effective rate overflow"))?;
            serde_json::to_value(ledger.update_loan(loan)?)?
        }
        Commands::Delete { id } => {
            ledger.delete_loan(id)?;
            json!({ "deleted": id })
        }
        Commands::Transactions { id } => serde_json::to_value(ledger.list_transactions(id)?)?,
        Commands::Reconcile { id } => {
            let recon = ledger.reconcile(id)?;
            json!({ "balanced": recon.is_balanced(), "reconciliation": recon })
        }
        Commands::Accrue => serde_json::to_value(ledger.run_daily_accrual())?,
        Commands::Capitalize => serde_json::to_value(ledger.run_monthly_capitalization())?,
        Commands::RunDaily => {
            let (accrual, capitalization) = ledger.run_daily_cycle();
            json!({ "accrual": accrual, "capitalization": capitalization })
        }
    };
    Ok(value)
}
