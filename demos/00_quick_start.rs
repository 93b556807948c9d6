/// quick start - minimal example to get started
use loan_ledger_rs::{InMemoryStore, Ledger, LedgerConfig, Money, Rate, SafeTimeProvider, TimeSource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // in-memory store, wall-clock time
    let ledger = Ledger::from_config(
        InMemoryStore::new(),
        SafeTimeProvider::new(TimeSource::System),
        LedgerConfig::default(),
    );

    // originate a $10,000 loan at 8% with a half-point discount
    let loan = ledger.create_loan(
        "customer-42",
        Money::from_major(10_000),
        Rate::from_percentage(8),
        Rate::from_bps(-50),
    )?;

    // accrue today's interest and make a payment
    ledger.run_daily_accrual();
    ledger.record_payment(loan.id, Money::from_major(500))?;

    // print current state
    println!("{}", serde_json::to_string_pretty(&ledger.get_loan(loan.id)?)?);

    Ok(())
}
