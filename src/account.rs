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

//! Account state.
//!
//! Accounts themselves are owned by the [`AccountDirectory`](crate::AccountDirectory);
//! this module holds the directory's view of an account ([`AccountProfile`]),
//! the denormalized cache derived from its entries ([`AccountStats`]) and the
//! per-account entry sequence ([`AccountBook`]).
//!
//! # Example
//!
//! ```
//! use rust_decimal::Decimal;
//! use credit_ledger_rs::{AccountId, AccountStats};
//!
//! let stats = AccountStats::empty(AccountId(1));
//! assert_eq!(stats.current_balance, Decimal::ZERO);
//! ```

use crate::base::{AccountId, EntryId};
use crate::entry::LedgerEntry;
use crate::error::{LedgerError, ValidationError};
use crate::store::{EntryCommit, HistoryFilter, LedgerHead};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Directory view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct AccountProfile {
    pub id: AccountId,
    /// Maximum running balance; zero means unlimited.
    pub credit_limit: Decimal,
    pub default_due_period_days: u32,
}

impl AccountProfile {
    pub fn new(id: AccountId, credit_limit: Decimal, default_due_period_days: u32) -> Self {
        Self {
            id,
            credit_limit,
            default_due_period_days,
        }
    }

    /// Whether debits are admitted through the credit limit guard.
    pub fn has_credit_limit(&self) -> bool {
        self.credit_limit > Decimal::ZERO
    }
}

/// Denormalized per-account figures.
///
/// A cache over the entry history, always recomputable with
/// [`AccountStats::from_history`]; the history stays the source of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStats {
    pub account_id: AccountId,
    pub current_balance: Decimal,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub last_activity: Option<DateTime<Utc>>,
}

impl AccountStats {
    pub const DECIMAL_PRECISION: u32 = 4;

    pub fn empty(account_id: AccountId) -> Self {
        Self {
            account_id,
            current_balance: Decimal::ZERO,
            total_debits: Decimal::ZERO,
            total_credits: Decimal::ZERO,
            last_activity: None,
        }
    }

    /// Returns the stats after booking `debit`/`credit` at `at`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::AmountOverflow`] if the balance or either total
    /// would leave the decimal range.
    pub fn advanced(
        &self,
        debit: Decimal,
        credit: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let current_balance = self
            .current_balance
            .checked_add(debit)
            .and_then(|balance| balance.checked_sub(credit));
        match (
            current_balance,
            self.total_debits.checked_add(debit),
            self.total_credits.checked_add(credit),
        ) {
            (Some(current_balance), Some(total_debits), Some(total_credits)) => Ok(Self {
                account_id: self.account_id,
                current_balance,
                total_debits,
                total_credits,
                last_activity: Some(at),
            }),
            _ => Err(ValidationError::AmountOverflow),
        }
    }

    /// Replays `entries` from an empty account.
    pub fn from_history<'a>(
        account_id: AccountId,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Result<Self, ValidationError> {
        entries
            .into_iter()
            .try_fold(Self::empty(account_id), |stats, entry| {
                stats.advanced(entry.debit, entry.credit, entry.created_at)
            })
    }
}

impl Serialize for AccountStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("AccountStats", 5)?;
        state.serialize_field("account", &self.account_id)?;
        state.serialize_field(
            "current_balance",
            &self.current_balance.round_dp(Self::DECIMAL_PRECISION),
        )?;
        state.serialize_field(
            "total_debits",
            &self.total_debits.round_dp(Self::DECIMAL_PRECISION),
        )?;
        state.serialize_field(
            "total_credits",
            &self.total_credits.round_dp(Self::DECIMAL_PRECISION),
        )?;
        state.serialize_field("last_activity", &self.last_activity)?;
        state.end()
    }
}

#[derive(Debug)]
struct BookData {
    entries: Vec<LedgerEntry>,
    stats: AccountStats,
}

impl BookData {
    fn assert_invariants(&self) {
        let last_balance = self
            .entries
            .last()
            .map_or(Decimal::ZERO, |entry| entry.balance);
        debug_assert_eq!(
            self.stats.current_balance, last_balance,
            "Invariant violated: cached balance diverged from last entry"
        );
        if let [.., prev, last] = self.entries.as_slice() {
            debug_assert_eq!(
                prev.balance.checked_add(last.net()),
                Some(last.balance),
                "Invariant violated: running balance chain broken"
            );
        }
    }
}

/// One account's append-only entry sequence and its cached stats.
///
/// Both live behind a single lock, so an entry and its cache update become
/// visible together.
#[derive(Debug)]
pub struct AccountBook {
    inner: Mutex<BookData>,
}

impl AccountBook {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            inner: Mutex::new(BookData {
                entries: Vec::new(),
                stats: AccountStats::empty(account_id),
            }),
        }
    }

    pub fn head(&self) -> LedgerHead {
        let data = self.inner.lock();
        LedgerHead {
            version: data.entries.len() as u64,
            balance: data.stats.current_balance,
            last_created_at: data.entries.last().map(|entry| entry.created_at),
        }
    }

    pub fn stats(&self) -> AccountStats {
        self.inner.lock().stats.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the entries matching `filter`, oldest first.
    pub fn entries(&self, filter: &HistoryFilter) -> Vec<LedgerEntry> {
        let data = self.inner.lock();
        data.entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    pub fn entry(&self, id: EntryId) -> Option<LedgerEntry> {
        let data = self.inner.lock();
        data.entries.iter().find(|entry| entry.id == id).cloned()
    }

    /// Appends the committed entry and installs its stats in one step.
    ///
    /// `next_id` is only called once the version check has passed.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ConcurrencyConflict`] - The book moved past `commit.expected_version`.
    /// - [`LedgerError::Persistence`] - The commit does not extend the current balance.
    pub fn commit(
        &self,
        commit: EntryCommit,
        next_id: impl FnOnce() -> EntryId,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut data = self.inner.lock();
        let version = data.entries.len() as u64;
        if version != commit.expected_version {
            return Err(LedgerError::ConcurrencyConflict {
                account_id: commit.account_id,
                attempts: 1,
            });
        }

        let draft = commit.draft;
        if data.stats.current_balance + draft.debit - draft.credit != draft.balance
            || commit.stats.current_balance != draft.balance
        {
            return Err(LedgerError::Persistence(format!(
                "commit for account {} does not extend balance {}",
                commit.account_id, data.stats.current_balance
            )));
        }

        let entry = LedgerEntry {
            id: next_id(),
            account_id: commit.account_id,
            created_at: draft.created_at,
            description: draft.description,
            debit: draft.debit,
            credit: draft.credit,
            balance: draft.balance,
            due_date: draft.due_date,
            entry_type: draft.entry_type,
            reference: draft.reference,
            created_by: draft.created_by,
        };
        data.entries.push(entry.clone());
        data.stats = commit.stats;
        data.assert_invariants();
        Ok(entry)
    }

    /// Replaces the cache with one recomputed from the entries.
    ///
    /// The cache is left untouched if the replay overflows.
    pub fn rebuild_stats(&self) -> Result<AccountStats, ValidationError> {
        let mut data = self.inner.lock();
        let account_id = data.stats.account_id;
        data.stats = AccountStats::from_history(account_id, &data.entries)?;
        Ok(data.stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryType;
    use crate::store::EntryDraft;
    use rust_decimal_macros::dec;

    fn commit_for(book: &AccountBook, debit: Decimal, credit: Decimal) -> EntryCommit {
        let head = book.head();
        let now = Utc::now();
        EntryCommit {
            account_id: AccountId(1),
            expected_version: head.version,
            draft: EntryDraft {
                created_at: now,
                description: "test".into(),
                debit,
                credit,
                balance: head.balance + debit - credit,
                due_date: None,
                entry_type: EntryType::Adjustment,
                reference: None,
                created_by: "tester".into(),
            },
            stats: book.stats().advanced(debit, credit, now).unwrap(),
        }
    }

    // === AccountBook Internal Tests ===

    #[test]
    fn commit_appends_and_updates_stats() {
        let book = AccountBook::new(AccountId(1));
        let commit = commit_for(&book, dec!(100), Decimal::ZERO);
        let entry = book.commit(commit, || EntryId(1)).unwrap();

        assert_eq!(entry.balance, dec!(100));
        assert_eq!(book.head().version, 1);
        let stats = book.stats();
        assert_eq!(stats.current_balance, dec!(100));
        assert_eq!(stats.total_debits, dec!(100));
        assert_eq!(stats.total_credits, Decimal::ZERO);
        assert!(stats.last_activity.is_some());
    }

    #[test]
    fn stale_commit_is_a_conflict() {
        let book = AccountBook::new(AccountId(1));
        let stale = commit_for(&book, dec!(10), Decimal::ZERO);
        let fresh = commit_for(&book, dec!(20), Decimal::ZERO);
        book.commit(fresh, || EntryId(1)).unwrap();

        let result = book.commit(stale, || EntryId(2));
        assert!(matches!(result, Err(LedgerError::ConcurrencyConflict { .. })));
        assert_eq!(book.len(), 1);
        assert_eq!(book.stats().current_balance, dec!(20));
    }

    #[test]
    fn commit_with_wrong_balance_is_rejected() {
        let book = AccountBook::new(AccountId(1));
        let mut commit = commit_for(&book, dec!(10), Decimal::ZERO);
        commit.draft.balance = dec!(11);

        let result = book.commit(commit, || EntryId(1));
        assert!(matches!(result, Err(LedgerError::Persistence(_))));
        assert!(book.is_empty());
        assert_eq!(book.stats(), AccountStats::empty(AccountId(1)));
    }

    #[test]
    fn id_is_not_drawn_for_rejected_commit() {
        let book = AccountBook::new(AccountId(1));
        let mut commit = commit_for(&book, dec!(10), Decimal::ZERO);
        commit.expected_version = 7;

        let mut drawn = false;
        let _ = book.commit(commit, || {
            drawn = true;
            EntryId(1)
        });
        assert!(!drawn);
    }

    #[test]
    fn rebuild_matches_incremental_stats() {
        let book = AccountBook::new(AccountId(1));
        for (i, (debit, credit)) in [(dec!(50), dec!(0)), (dec!(0), dec!(20)), (dec!(5.5), dec!(0))]
            .into_iter()
            .enumerate()
        {
            let commit = commit_for(&book, debit, credit);
            book.commit(commit, || EntryId(i as u64)).unwrap();
        }
        let incremental = book.stats();
        assert_eq!(book.rebuild_stats().unwrap(), incremental);
        assert_eq!(incremental.current_balance, dec!(35.5));
    }

    #[test]
    fn long_chain_keeps_invariants_on_every_commit() {
        let book = AccountBook::new(AccountId(1));
        for i in 0..5_000u64 {
            let (debit, credit) = if i % 4 == 3 {
                (Decimal::ZERO, dec!(2))
            } else {
                (dec!(1), Decimal::ZERO)
            };
            let commit = commit_for(&book, debit, credit);
            book.commit(commit, || EntryId(i)).unwrap();
        }
        assert_eq!(book.len(), 5_000);
        assert_eq!(book.head().balance, dec!(1250));
        assert_eq!(book.rebuild_stats().unwrap(), book.stats());
    }

    #[test]
    fn advancing_past_decimal_range_is_rejected() {
        let stats = AccountStats::empty(AccountId(1))
            .advanced(Decimal::MAX, Decimal::ZERO, Utc::now())
            .unwrap();

        let result = stats.advanced(Decimal::ONE, Decimal::ZERO, Utc::now());
        assert_eq!(result, Err(ValidationError::AmountOverflow));
    }

    #[test]
    fn totals_overflow_even_when_balance_fits() {
        let now = Utc::now();
        let stats = AccountStats::empty(AccountId(1))
            .advanced(Decimal::MAX, Decimal::ZERO, now)
            .and_then(|stats| stats.advanced(Decimal::ZERO, Decimal::MAX, now))
            .unwrap();
        assert_eq!(stats.current_balance, Decimal::ZERO);

        let result = stats.advanced(Decimal::ONE, Decimal::ZERO, now);
        assert_eq!(result, Err(ValidationError::AmountOverflow));
    }

    // === Serialization Tests ===

    #[test]
    fn serializer_rounds_to_four_decimal_places() {
        let mut stats = AccountStats::empty(AccountId(1));
        stats.current_balance = dec!(123.456789);
        stats.total_debits = dec!(0.000001);

        let json = serde_json::to_string(&stats).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["account"], 1);
        assert_eq!(parsed["current_balance"].as_str().unwrap(), "123.4568");
        assert_eq!(parsed["total_debits"].as_str().unwrap(), "0.0000");
        assert!(parsed["last_activity"].is_null());
    }

    #[test]
    fn profile_without_limit_is_unlimited() {
        assert!(!AccountProfile::new(AccountId(1), Decimal::ZERO, 30).has_credit_limit());
        assert!(AccountProfile::new(AccountId(1), dec!(1), 30).has_credit_limit());
    }
}
