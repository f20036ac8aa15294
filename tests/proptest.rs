// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Property-based tests for the ledger engine.
//!
//! These tests verify invariants that should hold for any sequence of
//! accepted entries.

use chrono::{Days, NaiveDate};
use credit_ledger_rs::{
    AccountId, AccountProfile, AgingClassifier, DueSummaryAggregator, EntryType, FifoAllocator,
    FixedClock, HistoryFilter, InMemoryDirectory, LedgerEngine, LedgerEntry, LedgerError,
    NewEntry,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

const ACCOUNT: AccountId = AccountId(1);

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.01 to 10000 with 2 decimal places).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

#[derive(Debug, Clone)]
enum Op {
    Purchase { amount: Decimal, due_offset: i64 },
    Payment(Decimal),
    Return(Decimal),
    Fee(Decimal),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (arb_amount(), -200i64..60)
            .prop_map(|(amount, due_offset)| Op::Purchase { amount, due_offset }),
        3 => arb_amount().prop_map(Op::Payment),
        1 => arb_amount().prop_map(Op::Return),
        1 => arb_amount().prop_map(Op::Fee),
    ]
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

fn offset(days: i64) -> NaiveDate {
    let base = today();
    if days >= 0 {
        base.checked_add_days(Days::new(days.unsigned_abs())).unwrap()
    } else {
        base.checked_sub_days(Days::new(days.unsigned_abs())).unwrap()
    }
}

fn engine(credit_limit: Decimal) -> LedgerEngine {
    let directory: InMemoryDirectory = [AccountProfile::new(ACCOUNT, credit_limit, 30)]
        .into_iter()
        .collect();
    LedgerEngine::builder(Arc::new(directory))
        .clock(Arc::new(FixedClock::on(today())))
        .build()
        .unwrap()
}

fn request(op: &Op) -> NewEntry {
    match op {
        Op::Purchase { amount, due_offset } => {
            NewEntry::purchase(ACCOUNT, *amount, "Invoice").due_on(offset(*due_offset))
        }
        Op::Payment(amount) => NewEntry::payment(ACCOUNT, *amount, "Payment"),
        Op::Return(amount) => {
            NewEntry::new(ACCOUNT, EntryType::Return, Decimal::ZERO, *amount, "Return")
        }
        Op::Fee(amount) => {
            NewEntry::new(ACCOUNT, EntryType::Adjustment, *amount, Decimal::ZERO, "Fee")
        }
    }
}

/// Applies every op, ignoring credit limit rejections.
fn apply_all(engine: &LedgerEngine, ops: &[Op]) -> Vec<LedgerEntry> {
    for op in ops {
        match engine.create_entry(request(op)) {
            Ok(_) | Err(LedgerError::CreditLimitExceeded { .. }) => {}
            Err(error) => panic!("unexpected error: {error}"),
        }
    }
    engine.history(ACCOUNT, &HistoryFilter::all()).unwrap()
}

// =============================================================================
// Balance Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// The cached balance equals the replayed history and the last snapshot.
    #[test]
    fn cached_balance_matches_history(ops in prop::collection::vec(arb_op(), 0..40)) {
        let engine = engine(Decimal::ZERO);
        let history = apply_all(&engine, &ops);

        let replayed: Decimal = history.iter().map(LedgerEntry::net).sum();
        prop_assert_eq!(engine.get_balance(ACCOUNT).unwrap(), replayed);
        prop_assert_eq!(history.last().map_or(Decimal::ZERO, |e| e.balance), replayed);
        prop_assert!(engine.verify_account(ACCOUNT).unwrap().is_consistent());
    }

    /// Each entry's snapshot extends the one before it.
    #[test]
    fn snapshots_chain(ops in prop::collection::vec(arb_op(), 1..40)) {
        let engine = engine(Decimal::ZERO);
        let history = apply_all(&engine, &ops);

        let mut previous = Decimal::ZERO;
        for entry in &history {
            prop_assert_eq!(entry.balance, previous + entry.debit - entry.credit);
            previous = entry.balance;
        }
    }

    /// With a limit, no accepted debit ever leaves the balance above it.
    #[test]
    fn accepted_debits_respect_limit(
        limit in arb_amount(),
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let engine = engine(limit);
        let history = apply_all(&engine, &ops);

        for entry in history.iter().filter(|e| e.debit > Decimal::ZERO) {
            prop_assert!(entry.balance <= limit);
        }
    }

    /// Exactly one side of every entry is positive.
    #[test]
    fn entries_are_one_sided(ops in prop::collection::vec(arb_op(), 1..40)) {
        let engine = engine(Decimal::ZERO);
        for entry in apply_all(&engine, &ops) {
            prop_assert!((entry.debit > Decimal::ZERO) != (entry.credit > Decimal::ZERO));
            prop_assert!(entry.debit >= Decimal::ZERO && entry.credit >= Decimal::ZERO);
        }
    }
}

// =============================================================================
// FIFO and Aging Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Open debits never exceed their original amount and sum to at most total debits.
    #[test]
    fn fifo_remaining_is_bounded(ops in prop::collection::vec(arb_op(), 0..40)) {
        let engine = engine(Decimal::ZERO);
        let history = apply_all(&engine, &ops);

        let open = FifoAllocator::allocate(&history);
        let total_debits: Decimal = history.iter().map(|e| e.debit).sum();
        let total_credits: Decimal = history.iter().map(|e| e.credit).sum();
        let outstanding: Decimal = open.iter().map(|d| d.remaining).sum();

        for debit in &open {
            prop_assert!(debit.remaining > Decimal::ZERO);
            prop_assert!(debit.remaining <= debit.entry.debit);
        }
        prop_assert!(outstanding <= total_debits);
        // Unapplied credit is dropped, never subtracted twice.
        prop_assert!(outstanding >= total_debits - total_credits);
    }

    /// Aging buckets partition the overdue amount.
    #[test]
    fn aging_buckets_sum_to_overdue(ops in prop::collection::vec(arb_op(), 0..40)) {
        let engine = engine(Decimal::ZERO);
        let history = apply_all(&engine, &ops);

        let summary = DueSummaryAggregator::new(AgingClassifier::default())
            .summarize(ACCOUNT, &history, today());
        prop_assert_eq!(summary.aging.total(), summary.overdue_amount);
        let outstanding = FifoAllocator::outstanding(&FifoAllocator::allocate(&history));
        prop_assert!(
            summary.overdue_amount + summary.due_today + summary.due_this_week <= outstanding
        );
        prop_assert_eq!(summary.total_due, summary.current_balance.max(Decimal::ZERO));
    }

    /// Summaries depend only on history and the as-of date.
    #[test]
    fn summary_is_pure(ops in prop::collection::vec(arb_op(), 0..20)) {
        let engine = engine(Decimal::ZERO);
        apply_all(&engine, &ops);
        prop_assert_eq!(
            engine.get_due_summary(ACCOUNT).unwrap(),
            engine.get_due_summary(ACCOUNT).unwrap()
        );
    }
}
