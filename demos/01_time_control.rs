/// time control - drive daily accrual and monthly capitalization with test time
use chrono::{Duration, TimeZone, Utc};
use loan_ledger_rs::{
    InMemoryStore, Ledger, LedgerConfig, Money, Rate, SafeTimeProvider, TimeSource, TransactionType,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== time control example ===\n");

    // create controlled time for testing
    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap(),
    ));
    let controller = time.test_control().unwrap();

    // seeded so the statement cycle day is the same on every run
    let config = LedgerConfig {
        rng_seed: Some(2024),
        ..LedgerConfig::default()
    };
    let ledger = Ledger::from_config(InMemoryStore::new(), &time, config);

    let loan = ledger.create_loan(
        "customer-7",
        Money::from_major(25_000),
        Rate::from_str_exact("0.1899")?,
        Rate::from_str_exact("-0.015")?,
    )?;
    println!("loan originated on {}", time.now().format("%Y-%m-%d"));
    println!("effective rate: {}", loan.effective_rate);
    println!("statement cycle day: {}", loan.statement_cycle_day);

    // a second accrual pass on the same date does nothing
    let first = ledger.run_daily_accrual();
    let again = ledger.run_daily_accrual();
    println!(
        "\naccrual passes on day one: applied {} then {}",
        first.applied, again.applied
    );

    // one daily cycle per day until two statements have capitalized
    let mut statements = 0;
    while statements < 2 {
        controller.advance(Duration::days(1));
        let (_, capitalization) = ledger.run_daily_cycle();
        if capitalization.applied == 0 {
            continue;
        }
        statements += 1;
        let current = ledger.get_loan(loan.id)?;
        println!(
            "\n{}: interest capitalized, balance now ${}",
            time.now().format("%Y-%m-%d"),
            current.balance.round_dp(2)
        );

        if statements == 1 {
            ledger.record_payment(loan.id, Money::from_major(750))?;
            let paid = ledger.get_loan(loan.id)?;
            println!("paid $750, balance now ${}", paid.balance.round_dp(2));
        }
    }

    // the trail holds one interest entry per statement
    println!("\ninterest transactions:");
    for tx in ledger.list_transactions(loan.id)? {
        if tx.transaction_type == TransactionType::Interest {
            println!("  {}  ${}", tx.timestamp.format("%Y-%m-%d"), tx.amount.round_dp(2));
        }
    }

    let recon = ledger.reconcile(loan.id)?;
    println!("\ntrail replays to stored balance: {}", recon.is_balanced());
    println!("interest accrued since last statement: ${}", recon.pending_interest.round_dp(2));

    Ok(())
}
