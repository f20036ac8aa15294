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

//! Deadlock and serialization tests for concurrent entry creation.
//!
//! The engine serializes writers per account and commits entries under the
//! account book's mutex. These tests drive the real engine from many threads
//! while parking_lot's `deadlock_detection` feature watches the lock graph.

use credit_ledger_rs::{
    AccountId, AccountProfile, HistoryFilter, InMemoryDirectory, LedgerConfig, LedgerEngine,
    LedgerError, NewEntry, QueueKind, ScanCancel,
};
use parking_lot::{Mutex, deadlock};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

// === Deadlock Detection ===

/// Starts a background thread that panics if parking_lot sees a cycle.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
}

fn engine_with_accounts(
    count: u32,
    credit_limit: Decimal,
    notifications: QueueKind,
) -> Arc<LedgerEngine> {
    let directory: InMemoryDirectory = (1..=count)
        .map(|id| AccountProfile::new(AccountId(id), credit_limit, 30))
        .collect();
    let engine = LedgerEngine::builder(Arc::new(directory))
        .config(LedgerConfig {
            notifications,
            ..LedgerConfig::default()
        })
        .build()
        .unwrap();
    Arc::new(engine)
}

// === Tests ===

#[test]
fn concurrent_debits_serialize_per_account() {
    let detector = start_deadlock_detector();
    let engine = engine_with_accounts(1, Decimal::ZERO, QueueKind::Disabled);
    let threads = 8;
    let per_thread = 25;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                for _ in 0..per_thread {
                    engine
                        .create_entry(NewEntry::purchase(AccountId(1), dec!(1), "Unit"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = threads * per_thread;
    let history = engine.history(AccountId(1), &HistoryFilter::all()).unwrap();
    let balances: Vec<Decimal> = history.iter().map(|entry| entry.balance).collect();
    let expected: Vec<Decimal> = (1..=total).map(Decimal::from).collect();
    assert_eq!(balances, expected);
    assert_eq!(engine.get_balance(AccountId(1)).unwrap(), Decimal::from(total));
    assert!(engine.verify_account(AccountId(1)).unwrap().is_consistent());

    stop_deadlock_detector(detector);
}

#[test]
fn concurrent_debits_never_pass_credit_limit() {
    let detector = start_deadlock_detector();
    let engine = engine_with_accounts(1, dec!(100), QueueKind::Disabled);
    let rejected = Arc::new(Mutex::new(0usize));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let engine = engine.clone();
            let rejected = rejected.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    match engine.create_entry(NewEntry::purchase(AccountId(1), dec!(3), "Unit")) {
                        Ok(_) => {}
                        Err(LedgerError::CreditLimitExceeded { .. }) => *rejected.lock() += 1,
                        Err(error) => panic!("unexpected error: {error}"),
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // 33 debits of 3 fit under 100; the other 17 are rejected.
    assert_eq!(engine.get_balance(AccountId(1)).unwrap(), dec!(99));
    assert_eq!(*rejected.lock(), 17);

    stop_deadlock_detector(detector);
}

#[test]
fn no_deadlock_cross_account_writes() {
    let detector = start_deadlock_detector();
    let accounts = 6;
    let engine = engine_with_accounts(accounts, Decimal::ZERO, QueueKind::Channel);

    let handles: Vec<_> = (0..12u32)
        .map(|worker| {
            let engine = engine.clone();
            thread::spawn(move || {
                for i in 0..40u32 {
                    let account = AccountId((worker + i) % accounts + 1);
                    if i % 3 == 0 {
                        engine
                            .create_entry(NewEntry::payment(account, dec!(1), "Cash"))
                            .unwrap();
                    } else {
                        engine
                            .create_entry(NewEntry::purchase(account, dec!(2), "Invoice"))
                            .unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total: Decimal = (1..=accounts)
        .map(|id| engine.get_balance(AccountId(id)).unwrap())
        .sum();
    // Each worker: 14 payments of 1 and 26 purchases of 2.
    assert_eq!(total, Decimal::from(12 * (26 * 2 - 14)));
    for id in 1..=accounts {
        assert!(engine.verify_account(AccountId(id)).unwrap().is_consistent());
    }

    stop_deadlock_detector(detector);
}

#[test]
fn no_deadlock_scans_during_writes() {
    let detector = start_deadlock_detector();
    let accounts = 4;
    let engine = engine_with_accounts(accounts, Decimal::ZERO, QueueKind::Inline);

    let writers: Vec<_> = (1..=accounts)
        .map(|id| {
            let engine = engine.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    engine
                        .create_entry(NewEntry::purchase(AccountId(id), dec!(1), "Invoice"))
                        .unwrap();
                }
            })
        })
        .collect();
    let scanner = {
        let engine = engine.clone();
        thread::spawn(move || {
            for _ in 0..20 {
                engine.list_accounts_with_due().unwrap();
                engine.global_due_totals().unwrap();
            }
        })
    };
    for handle in writers {
        handle.join().unwrap();
    }
    scanner.join().unwrap();

    let totals = engine.global_due_totals().unwrap();
    assert_eq!(totals.account_count, accounts as usize);
    assert_eq!(totals.total_due, Decimal::from(accounts * 50));

    stop_deadlock_detector(detector);
}

#[test]
fn no_deadlock_voids_against_writers() {
    let detector = start_deadlock_detector();
    let engine = engine_with_accounts(1, Decimal::ZERO, QueueKind::Disabled);
    let originals: Vec<_> = (0..20)
        .map(|_| {
            engine
                .create_entry(NewEntry::purchase(AccountId(1), dec!(5), "Invoice"))
                .unwrap()
                .entry
                .id
        })
        .collect();

    // Two threads race to void every entry; exactly one wins each time.
    let voiders: Vec<_> = (0..2)
        .map(|_| {
            let engine = engine.clone();
            let originals = originals.clone();
            thread::spawn(move || {
                originals
                    .iter()
                    .filter(|id| engine.void_entry(**id, "ops", "race").is_ok())
                    .count()
            })
        })
        .collect();
    let writer = {
        let engine = engine.clone();
        thread::spawn(move || {
            for _ in 0..20 {
                engine
                    .create_entry(NewEntry::purchase(AccountId(1), dec!(1), "Invoice"))
                    .unwrap();
            }
        })
    };

    let voided: usize = voiders.into_iter().map(|h| h.join().unwrap()).sum();
    writer.join().unwrap();

    assert_eq!(voided, originals.len());
    assert_eq!(engine.get_balance(AccountId(1)).unwrap(), dec!(20));

    stop_deadlock_detector(detector);
}

#[test]
fn cancelled_scan_returns_promptly() {
    let engine = engine_with_accounts(3, Decimal::ZERO, QueueKind::Disabled);
    for id in 1..=3 {
        engine
            .create_entry(NewEntry::purchase(AccountId(id), dec!(1), "Invoice"))
            .unwrap();
    }
    let cancel = ScanCancel::new();
    cancel.cancel();
    assert_eq!(
        engine.list_accounts_with_due_cancellable(&cancel),
        Err(LedgerError::ScanCancelled)
    );
}
