//! randomized operation sequences against one loan.

use chrono::{Duration, TimeZone, Utc};
use loan_ledger_rs::{
    InMemoryStore, Ledger, LedgerError, LoanStatus, Money, Rate, SafeTimeProvider, TimeSource,
    TransactionType,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
enum Op {
    /// payment in cents
    Pay(i64),
    /// run the daily cycle this many times, one day apart
    Days(u32),
    /// extra accrual pass on the current day
    Accrue,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..5_000_000i64).prop_map(Op::Pay),
        (1u32..35).prop_map(Op::Days),
        Just(Op::Accrue),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Property: balances stay non-negative, closure follows a zero balance,
    /// and the transaction trail replays to the stored balance.
    #[test]
    fn loan_invariants_hold(
        principal_cents in 100i64..10_000_000i64,
        rate_bps in 0i32..3_000i32,
        variance_bps in -200i32..200i32,
        seed in any::<u64>(),
        ops in prop::collection::vec(op(), 1..20),
    ) {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let control = time.test_control().unwrap();
        let ledger = Ledger::new(InMemoryStore::new(), &time, StdRng::seed_from_u64(seed));

        let loan = ledger
            .create_loan(
                "prop",
                Money::from_minor(principal_cents, 2),
                Rate::from_bps(rate_bps),
                Rate::from_bps(variance_bps),
            )
            .unwrap();

        for op in ops {
            let before = ledger.get_loan(loan.id).unwrap();
            match op {
                Op::Pay(cents) => {
                    let result = ledger.record_payment(loan.id, Money::from_minor(cents, 2));
                    if before.status == LoanStatus::Closed {
                        prop_assert!(matches!(result, Err(LedgerError::InvalidState { .. })), "expected InvalidState, got {:?}", result);
                    } else {
                        prop_assert_eq!(result.unwrap().amount, Money::from_minor(cents, 2));
                    }
                }
                Op::Days(n) => {
                    for _ in 0..n {
                        control.advance(Duration::days(1));
                        let (accrual, capitalization) = ledger.run_daily_cycle();
                        prop_assert_eq!(accrual.failed + capitalization.failed, 0);
                    }
                }
                Op::Accrue => {
                    // the date gate makes a repeated pass a no-op
                    ledger.run_daily_accrual();
                    let once = ledger.get_loan(loan.id).unwrap();
                    ledger.run_daily_accrual();
                    let twice = ledger.get_loan(loan.id).unwrap();
                    prop_assert_eq!(once.accrued_interest, twice.accrued_interest);
                }
            }

            let after = ledger.get_loan(loan.id).unwrap();
            prop_assert!(!after.balance.is_negative());
            prop_assert!(!after.accrued_interest.is_negative());
            prop_assert_eq!(after.balance.is_zero(), after.status == LoanStatus::Closed);
            prop_assert!(after.version >= before.version);

            let recon = ledger.reconcile(loan.id).unwrap();
            prop_assert!(recon.is_balanced(), "trail does not replay: {:?}", recon);
        }

        let trail = ledger.list_transactions(loan.id).unwrap();
        let disbursements = trail
            .iter()
            .filter(|t| t.transaction_type == TransactionType::Disbursement)
            .count();
        prop_assert_eq!(disbursements, 1);
        prop_assert!(trail.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        prop_assert!(trail.iter().all(|t| t.amount.is_positive()));
    }

    /// Property: capitalization moves exactly the accrued amount into the
    /// balance and writes one interest transaction for it.
    #[test]
    fn capitalization_moves_accrued_interest(
        principal_cents in 10_000i64..10_000_000i64,
        rate_bps in 1i32..3_000i32,
        seed in any::<u64>(),
    ) {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap(),
        ));
        let control = time.test_control().unwrap();
        let ledger = Ledger::new(InMemoryStore::new(), &time, StdRng::seed_from_u64(seed));
        let loan = ledger
            .create_loan("prop", Money::from_minor(principal_cents, 2), Rate::from_bps(rate_bps), Rate::ZERO)
            .unwrap();

        // accrue every day of january up to the day before the cycle day
        let cycle_day = i64::from(loan.statement_cycle_day.day());
        for _ in 1..cycle_day {
            ledger.run_daily_accrual();
            control.advance(Duration::days(1));
        }
        let before = ledger.get_loan(loan.id).unwrap();

        let summary = ledger.run_monthly_capitalization();
        let after = ledger.get_loan(loan.id).unwrap();
        let interest: Vec<_> = ledger
            .list_transactions(loan.id)
            .unwrap()
            .into_iter()
            .filter(|t| t.transaction_type == TransactionType::Interest)
            .collect();

        if before.accrued_interest.is_positive() {
            prop_assert_eq!(summary.applied, 1);
            prop_assert_eq!(after.balance, before.balance + before.accrued_interest);
            prop_assert_eq!(after.accrued_interest, Money::ZERO);
            prop_assert_eq!(interest.len(), 1);
            prop_assert_eq!(interest[0].amount, before.accrued_interest);
        } else {
            prop_assert_eq!(summary.applied, 0);
            prop_assert_eq!(after, before);
            prop_assert!(interest.is_empty());
        }
    }
}
