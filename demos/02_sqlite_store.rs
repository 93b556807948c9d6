/// sqlite store - keep loans in a database file and read them back
use loan_ledger_rs::{
    Ledger, LedgerConfig, Money, Rate, SafeTimeProvider, SqliteStore, TimeSource, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::temp_dir().join(format!("loan-ledger-demo-{}.db", Uuid::new_v4()));
    let time = SafeTimeProvider::new(TimeSource::System);
    println!("database: {}", path.display());

    // first process: originate, accrue and pay
    let loan_id = {
        let ledger = Ledger::from_config(SqliteStore::open(&path)?, &time, LedgerConfig::sqlite(&path));
        let loan = ledger.create_loan(
            "customer-9",
            Money::from_str_exact("1234.56")?,
            Rate::from_percentage(7),
            Rate::ZERO,
        )?;
        ledger.run_daily_accrual();
        ledger.record_payment(loan.id, Money::from_str_exact("34.56")?)?;
        loan.id
    };

    // second process: reopen the same file
    let ledger = Ledger::from_config(SqliteStore::open(&path)?, &time, LedgerConfig::sqlite(&path));
    let loan = ledger.get_loan(loan_id)?;
    println!("\nbalance: ${}", loan.balance);
    println!("accrued interest: {}", loan.accrued_interest);
    println!("version: {}", loan.version);

    println!("\ntransactions:");
    for tx in ledger.list_transactions(loan_id)? {
        println!("  {:<12} ${}", tx.transaction_type.as_str(), tx.amount);
    }
    println!("\nbalanced: {}", ledger.reconcile(loan_id)?.is_balanced());

    drop(ledger);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }

    Ok(())
}
