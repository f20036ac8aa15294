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

//! Ledger persistence contract.
//!
//! A [`LedgerStore`] owns every account's append-only entry sequence. Appends
//! are optimistic: the writer reads a [`LedgerHead`], computes its entry and
//! the matching [`AccountStats`], and commits them together against the
//! head's `version`. A commit against a stale version fails with
//! [`LedgerError::ConcurrencyConflict`] and writes nothing.
//!
//! [`InMemoryStore`] keeps one [`AccountBook`] per account in a [`DashMap`],
//! so accounts never contend with each other.

use crate::account::{AccountBook, AccountStats};
use crate::base::{AccountId, EntryId};
use crate::entry::{EntryType, LedgerEntry};
use crate::error::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Latest committed state of one account's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerHead {
    /// Number of committed entries.
    pub version: u64,
    /// Balance of the last entry, zero for an empty ledger.
    pub balance: Decimal,
    pub last_created_at: Option<DateTime<Utc>>,
}

impl LedgerHead {
    pub const EMPTY: LedgerHead = LedgerHead {
        version: 0,
        balance: Decimal::ZERO,
        last_created_at: None,
    };
}

/// Entry fields chosen by the writer; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub balance: Decimal,
    pub due_date: Option<NaiveDate>,
    pub entry_type: EntryType,
    pub reference: Option<String>,
    pub created_by: String,
}

/// One unit of work: an entry plus the account cache it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCommit {
    pub account_id: AccountId,
    pub expected_version: u64,
    pub draft: EntryDraft,
    pub stats: AccountStats,
}

/// Optional restriction on a history read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Inclusive lower bound on `created_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<DateTime<Utc>>,
    pub entry_type: Option<EntryType>,
}

impl HistoryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_type(entry_type: EntryType) -> Self {
        Self {
            entry_type: Some(entry_type),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.since.is_none_or(|since| entry.created_at >= since)
            && self.until.is_none_or(|until| entry.created_at < until)
            && self.entry_type.is_none_or(|kind| entry.entry_type == kind)
    }
}

/// Storage backend for ledger entries and account caches.
pub trait LedgerStore: Send + Sync {
    /// Latest committed head for `account_id`; [`LedgerHead::EMPTY`] if none.
    fn head(&self, account_id: AccountId) -> Result<LedgerHead, LedgerError>;

    /// Atomically appends the entry and installs its stats.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ConcurrencyConflict`] - Another entry was committed since the head
    ///   was read.
    /// - [`LedgerError::Persistence`] - Storage failed; nothing was written.
    fn append(&self, commit: EntryCommit) -> Result<LedgerEntry, LedgerError>;

    /// Entries for `account_id` matching `filter`, ascending by creation.
    fn history(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Cached stats, or empty stats for an account with no entries.
    fn stats(&self, account_id: AccountId) -> Result<AccountStats, LedgerError>;

    /// Recomputes the cached stats from the history and stores them.
    fn rebuild_stats(&self, account_id: AccountId) -> Result<AccountStats, LedgerError>;

    fn entry(&self, entry_id: EntryId) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Accounts with at least one entry, in ascending id order.
    fn account_ids(&self) -> Result<Vec<AccountId>, LedgerError>;

    fn latest_balance(&self, account_id: AccountId) -> Result<Decimal, LedgerError> {
        Ok(self.head(account_id)?.balance)
    }
}

/// Process-local [`LedgerStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    books: DashMap<AccountId, Arc<AccountBook>>,
    /// Entry id to owning account, for lookups by id.
    index: DashMap<EntryId, AccountId>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones the book handle so no map shard stays locked while the book is used.
    fn book(&self, account_id: AccountId) -> Option<Arc<AccountBook>> {
        self.books.get(&account_id).map(|book| Arc::clone(&book))
    }

    fn book_or_create(&self, account_id: AccountId) -> Arc<AccountBook> {
        let book = self
            .books
            .entry(account_id)
            .or_insert_with(|| Arc::new(AccountBook::new(account_id)));
        Arc::clone(&book)
    }
}

impl LedgerStore for InMemoryStore {
    fn head(&self, account_id: AccountId) -> Result<LedgerHead, LedgerError> {
        Ok(self
            .book(account_id)
            .map_or(LedgerHead::EMPTY, |book| book.head()))
    }

    fn append(&self, commit: EntryCommit) -> Result<LedgerEntry, LedgerError> {
        let account_id = commit.account_id;
        let book = self.book_or_create(account_id);
        let entry = book.commit(commit, || {
            EntryId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
        })?;
        self.index.insert(entry.id, account_id);
        tracing::debug!(
            account = %account_id,
            entry = %entry.id,
            balance = %entry.balance,
            "entry appended"
        );
        Ok(entry)
    }

    fn history(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .book(account_id)
            .map(|book| book.entries(filter))
            .unwrap_or_default())
    }

    fn stats(&self, account_id: AccountId) -> Result<AccountStats, LedgerError> {
        Ok(self
            .book(account_id)
            .map_or_else(|| AccountStats::empty(account_id), |book| book.stats()))
    }

    fn rebuild_stats(&self, account_id: AccountId) -> Result<AccountStats, LedgerError> {
        match self.book(account_id) {
            Some(book) => Ok(book.rebuild_stats()?),
            None => Ok(AccountStats::empty(account_id)),
        }
    }

    fn entry(&self, entry_id: EntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        let Some(account_id) = self.index.get(&entry_id).map(|owner| *owner) else {
            return Ok(None);
        };
        Ok(self.book(account_id).and_then(|book| book.entry(entry_id)))
    }

    fn account_ids(&self) -> Result<Vec<AccountId>, LedgerError> {
        let mut ids: Vec<AccountId> = self
            .books
            .iter()
            .filter(|book| !book.value().is_empty())
            .map(|book| *book.key())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
