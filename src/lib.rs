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

//! # Credit Ledger
//!
//! This library tracks running credit balances for customer accounts and
//! derives due and overdue summaries from an append-only entry history.
//!
//! ## Core Components
//!
//! - [`LedgerEngine`]: Creates entries and answers balance and due queries
//! - [`LedgerStore`]: Persistence contract with optimistic, per-account appends
//! - [`CreditLimitGuard`]: Rejects debits that would pass an account's credit limit
//! - [`FifoAllocator`]: Applies credits to the oldest open debits first
//! - [`AgingClassifier`]: Buckets unpaid debits by days past due
//! - [`DueSummaryAggregator`]: Per-account and portfolio-wide due summaries
//! - [`LedgerError`]: Error types for ledger operations
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use credit_ledger_rs::{
//!     AccountId, AccountProfile, InMemoryDirectory, LedgerEngine, LedgerError, NewEntry,
//! };
//! use rust_decimal_macros::dec;
//!
//! let directory = InMemoryDirectory::new();
//! directory.upsert(AccountProfile::new(AccountId(1), dec!(1000), 30));
//! let engine = LedgerEngine::new(Arc::new(directory));
//!
//! engine
//!     .create_entry(NewEntry::purchase(AccountId(1), dec!(900), "Invoice 17"))
//!     .unwrap();
//!
//! // The next debit would take the balance to 1050.
//! let rejected = engine.create_entry(NewEntry::purchase(AccountId(1), dec!(150), "Invoice 18"));
//! assert!(matches!(rejected, Err(LedgerError::CreditLimitExceeded { .. })));
//!
//! engine
//!     .create_entry(NewEntry::payment(AccountId(1), dec!(400), "Cash"))
//!     .unwrap();
//! assert_eq!(engine.get_balance(AccountId(1)).unwrap(), dec!(500));
//! ```
//!
//! ## Thread Safety
//!
//! Entry creation is serialized per account; different accounts proceed in
//! parallel. Reads work on immutable entry snapshots and never block writers
//! for longer than a copy.

pub mod account;
pub mod aging;
mod base;
pub mod clock;
pub mod config;
pub mod directory;
pub mod effects;
mod engine;
pub mod entry;
pub mod error;
pub mod fifo;
mod guard;
pub mod notification_queue;
pub mod store;
pub mod summary;

pub use account::{AccountBook, AccountProfile, AccountStats};
pub use aging::{AgingBucket, AgingBuckets, AgingClassifier, AgingReport, DuePosition};
pub use base::{AccountId, EntryId};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{LedgerConfig, QueueKind};
pub use directory::{AccountDirectory, InMemoryDirectory};
pub use effects::{
    AuditSink, EntryNotification, LogDispatcher, NotificationDispatcher, NotificationStatus,
    TracingAuditSink,
};
pub use engine::{
    ConsistencyReport, CreatedEntry, LedgerEngine, LedgerEngineBuilder, LedgerPage, Pagination,
};
pub use entry::{EntrySide, EntryType, LedgerEntry, NewEntry};
pub use error::{ConfigError, LedgerError, SideEffectError, ValidationError};
pub use fifo::{FifoAllocator, OpenDebit};
pub use guard::CreditLimitGuard;
pub use notification_queue::{ChannelQueue, DisabledQueue, InlineQueue, QueueBackend};
pub use store::{EntryCommit, EntryDraft, HistoryFilter, InMemoryStore, LedgerHead, LedgerStore};
pub use summary::{DueSummary, DueSummaryAggregator, DueTotals, ScanCancel};
