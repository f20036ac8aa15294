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

//! Ledger engine.
//!
//! The [`LedgerEngine`] is the only writer of ledger entries. It validates
//! requests, admits debits through the [`CreditLimitGuard`], computes the new
//! running balance and commits the entry together with the account's cached
//! stats. Reads (balances, paged ledgers, due summaries) go straight to the
//! [`LedgerStore`] snapshot and never take a write lock.
//!
//! # Write path
//!
//! 1. Validate the request shape and resolve the account.
//! 2. Take the account's write lock.
//! 3. Read the head, run the guard, build the entry and its stats.
//! 4. Commit against the head's version; on a version conflict go back to 3,
//!    at most `max_append_retries` more times.
//! 5. Release the lock, then audit and notify.
//!
//! # Thread Safety
//!
//! Write locks are per account and held for one entry creation at a time.
//! No code path holds two of them, so writers on different accounts never
//! wait on each other and cannot deadlock.

use crate::account::{AccountProfile, AccountStats};
use crate::aging::AgingClassifier;
use crate::base::{AccountId, EntryId};
use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::directory::AccountDirectory;
use crate::effects::{
    AuditSink, EntryNotification, LogDispatcher, NotificationDispatcher, NotificationStatus,
    TracingAuditSink,
};
use crate::entry::{EntrySide, EntryType, LedgerEntry, NewEntry};
use crate::error::{ConfigError, LedgerError, ValidationError};
use crate::guard::CreditLimitGuard;
use crate::notification_queue::{QueueBackend, queue_backend};
use crate::store::{EntryCommit, EntryDraft, HistoryFilter, InMemoryStore, LedgerStore};
use crate::summary::{DueSummary, DueSummaryAggregator, DueTotals, ScanCancel};
use chrono::{Days, NaiveDate};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// A committed entry and the outcome of its notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedEntry {
    pub entry: LedgerEntry,
    pub notification: NotificationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
    pub total_entries: usize,
    pub total_pages: usize,
}

/// One page of an account's ledger, oldest entry first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerPage {
    pub entries: Vec<LedgerEntry>,
    pub pagination: Pagination,
}

/// Cache-versus-history comparison for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub account_id: AccountId,
    pub cached_balance: Decimal,
    /// Sum of `debit - credit` over every entry.
    pub replayed_balance: Decimal,
    pub last_entry_balance: Decimal,
    pub entry_count: usize,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.cached_balance == self.replayed_balance
            && self.replayed_balance == self.last_entry_balance
    }
}

pub struct LedgerEngineBuilder {
    directory: Arc<dyn AccountDirectory>,
    store: Option<Arc<dyn LedgerStore>>,
    audit: Option<Arc<dyn AuditSink>>,
    dispatcher: Option<Arc<dyn NotificationDispatcher>>,
    queue: Option<Arc<dyn QueueBackend>>,
    clock: Option<Arc<dyn Clock>>,
    config: LedgerConfig,
}

impl LedgerEngineBuilder {
    pub fn store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Dispatcher behind the queue backend selected by the config.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Uses `queue` as is, ignoring the configured queue kind.
    pub fn queue(mut self, queue: Arc<dyn QueueBackend>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<LedgerEngine, ConfigError> {
        self.config.validate()?;
        let notifications = self.queue.unwrap_or_else(|| {
            let dispatcher = self.dispatcher.unwrap_or_else(|| Arc::new(LogDispatcher));
            queue_backend(
                self.config.notifications,
                self.config.channel_capacity,
                dispatcher,
            )
        });
        Ok(LedgerEngine {
            directory: self.directory,
            store: self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new())),
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
            notifications,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            aggregator: DueSummaryAggregator::new(AgingClassifier::new(
                self.config.due_soon_days,
            )),
            config: self.config,
            write_locks: DashMap::new(),
        })
    }
}

/// Credit ledger engine.
///
/// # Invariants
///
/// - Exactly one of `debit`/`credit` is positive on every entry.
/// - `balance(n) = balance(n-1) + debit(n) - credit(n)`, starting from zero.
/// - An account's cached stats always match its last committed entry.
/// - A debit is never committed if it takes the balance above a non-zero credit limit.
pub struct LedgerEngine {
    directory: Arc<dyn AccountDirectory>,
    store: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
    notifications: Arc<dyn QueueBackend>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    aggregator: DueSummaryAggregator,
    /// Per-account writer serialization.
    write_locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl LedgerEngine {
    /// Engine with an in-memory store and default collaborators.
    pub fn new(directory: Arc<dyn AccountDirectory>) -> Self {
        Self {
            directory,
            store: Arc::new(InMemoryStore::new()),
            audit: Arc::new(TracingAuditSink),
            notifications: queue_backend(
                LedgerConfig::default().notifications,
                LedgerConfig::default().channel_capacity,
                Arc::new(LogDispatcher),
            ),
            clock: Arc::new(SystemClock),
            config: LedgerConfig::default(),
            aggregator: DueSummaryAggregator::default(),
            write_locks: DashMap::new(),
        }
    }

    pub fn builder(directory: Arc<dyn AccountDirectory>) -> LedgerEngineBuilder {
        LedgerEngineBuilder {
            directory,
            store: None,
            audit: None,
            dispatcher: None,
            queue: None,
            clock: None,
            config: LedgerConfig::default(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Creates a ledger entry.
    ///
    /// Debits without a due date fall due `default_due_period_days` after
    /// today. A due date on a credit is dropped.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] - Malformed request, unknown account, or an
    ///   amount that would overflow the balance or its totals.
    /// - [`LedgerError::CreditLimitExceeded`] - Debit would pass the credit limit.
    /// - [`LedgerError::ConcurrencyConflict`] - Retries exhausted against concurrent writers.
    /// - [`LedgerError::Persistence`] - The store failed; nothing was written.
    #[tracing::instrument(
        skip(self, request),
        fields(account = %request.account_id, entry_type = %request.entry_type)
    )]
    pub fn create_entry(&self, request: NewEntry) -> Result<CreatedEntry, LedgerError> {
        let side = request.validate()?;
        let profile = self
            .directory
            .resolve(request.account_id)
            .ok_or(ValidationError::UnknownAccount(request.account_id))?;

        let entry = {
            let lock = self.write_lock(profile.id);
            let _guard = lock.lock();
            self.commit_locked(&profile, request, side)?
        };
        Ok(self.after_commit(entry))
    }

    /// Reverses an entry with an opposite adjustment of the same amount.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::EntryNotFound`] - No entry with that id.
    /// - [`ValidationError::AlreadyVoided`] - The entry is a void or was already voided.
    /// - Any error from [`LedgerEngine::create_entry`], including the credit
    ///   limit when reversing a credit.
    #[tracing::instrument(skip(self, created_by, reason))]
    pub fn void_entry(
        &self,
        entry_id: EntryId,
        created_by: &str,
        reason: &str,
    ) -> Result<CreatedEntry, LedgerError> {
        let original = self
            .store
            .entry(entry_id)?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        if original.voids().is_some() {
            return Err(ValidationError::AlreadyVoided(entry_id).into());
        }
        let profile = self
            .directory
            .resolve(original.account_id)
            .ok_or(LedgerError::AccountNotFound(original.account_id))?;

        let mut description = format!("Void of entry {entry_id}");
        if !reason.trim().is_empty() {
            description.push_str(": ");
            description.push_str(reason.trim());
        }
        let request = NewEntry::new(
            original.account_id,
            EntryType::Adjustment,
            original.credit,
            original.debit,
            description,
        )
        .with_reference(LedgerEntry::void_reference(entry_id))
        .created_by(created_by);
        let side = request.validate()?;

        let entry = {
            let lock = self.write_lock(profile.id);
            let _guard = lock.lock();
            let already_voided = self
                .store
                .history(original.account_id, &HistoryFilter::of_type(EntryType::Adjustment))?
                .iter()
                .any(|entry| entry.voids() == Some(entry_id));
            if already_voided {
                return Err(ValidationError::AlreadyVoided(entry_id).into());
            }
            self.commit_locked(&profile, request, side)?
        };
        tracing::info!(voided = %entry_id, reversal = %entry.id, "entry voided");
        Ok(self.after_commit(entry))
    }

    /// Current running balance; zero for an account with no entries.
    pub fn get_balance(&self, account_id: AccountId) -> Result<Decimal, LedgerError> {
        self.ensure_account(account_id)?;
        self.store.latest_balance(account_id)
    }

    pub fn get_entry(&self, entry_id: EntryId) -> Result<LedgerEntry, LedgerError> {
        self.store
            .entry(entry_id)?
            .ok_or(LedgerError::EntryNotFound(entry_id))
    }

    pub fn get_account_stats(&self, account_id: AccountId) -> Result<AccountStats, LedgerError> {
        self.ensure_account(account_id)?;
        self.store.stats(account_id)
    }

    /// Entries matching `filter`, oldest first.
    pub fn history(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.ensure_account(account_id)?;
        self.store.history(account_id, filter)
    }

    /// One page of the account's ledger; `page` is 1-based.
    ///
    /// `page_size` defaults to the configured page size. Pages past the end
    /// are empty.
    pub fn get_account_ledger(
        &self,
        account_id: AccountId,
        page: usize,
        page_size: Option<usize>,
    ) -> Result<LedgerPage, LedgerError> {
        let page_size = page_size.unwrap_or(self.config.default_page_size);
        if page == 0 || page_size == 0 || page_size > self.config.max_page_size {
            return Err(ValidationError::InvalidPage { page, page_size }.into());
        }
        let history = self.history(account_id, &HistoryFilter::all())?;
        let total_entries = history.len();
        let entries = history
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();
        Ok(LedgerPage {
            entries,
            pagination: Pagination {
                page,
                page_size,
                total_entries,
                total_pages: total_entries.div_ceil(page_size),
            },
        })
    }

    /// Due summary as of the clock's today.
    pub fn get_due_summary(&self, account_id: AccountId) -> Result<DueSummary, LedgerError> {
        self.ensure_account(account_id)?;
        let history = self.store.history(account_id, &HistoryFilter::all())?;
        Ok(self
            .aggregator
            .summarize(account_id, &history, self.clock.today()))
    }

    /// Accounts with something due, most overdue first.
    pub fn list_accounts_with_due(&self) -> Result<Vec<DueSummary>, LedgerError> {
        self.list_accounts_with_due_cancellable(&ScanCancel::new())
    }

    /// # Errors
    ///
    /// [`LedgerError::ScanCancelled`] if `cancel` fires mid-scan.
    pub fn list_accounts_with_due_cancellable(
        &self,
        cancel: &ScanCancel,
    ) -> Result<Vec<DueSummary>, LedgerError> {
        let account_ids = self.store.account_ids()?;
        let today = self.clock.today();
        tracing::debug!(accounts = account_ids.len(), %today, "scanning due summaries");
        let summaries = self.aggregator.scan(&account_ids, today, cancel, |account_id| {
            self.store.history(account_id, &HistoryFilter::all())
        })?;
        Ok(DueSummaryAggregator::rank(summaries))
    }

    pub fn global_due_totals(&self) -> Result<DueTotals, LedgerError> {
        self.global_due_totals_cancellable(&ScanCancel::new())
    }

    pub fn global_due_totals_cancellable(
        &self,
        cancel: &ScanCancel,
    ) -> Result<DueTotals, LedgerError> {
        let due = self.list_accounts_with_due_cancellable(cancel)?;
        DueSummaryAggregator::totals(&due)
    }

    /// Recomputes the account's cached stats from its history.
    pub fn rebuild_account_stats(
        &self,
        account_id: AccountId,
    ) -> Result<AccountStats, LedgerError> {
        self.ensure_account(account_id)?;
        let lock = self.write_lock(account_id);
        let _guard = lock.lock();
        let stats = self.store.rebuild_stats(account_id)?;
        tracing::info!(account = %account_id, balance = %stats.current_balance, "stats rebuilt");
        Ok(stats)
    }

    /// Compares the cached balance against a replay of the history.
    pub fn verify_account(&self, account_id: AccountId) -> Result<ConsistencyReport, LedgerError> {
        self.ensure_account(account_id)?;
        let lock = self.write_lock(account_id);
        let _guard = lock.lock();
        let history = self.store.history(account_id, &HistoryFilter::all())?;
        let cached = self.store.stats(account_id)?;
        let report = ConsistencyReport {
            account_id,
            cached_balance: cached.current_balance,
            replayed_balance: history.iter().map(LedgerEntry::net).sum(),
            last_entry_balance: history.last().map_or(Decimal::ZERO, |entry| entry.balance),
            entry_count: history.len(),
        };
        if !report.is_consistent() {
            tracing::warn!(?report, "account cache diverged from history");
        }
        Ok(report)
    }

    /// Builds and commits one entry. The caller holds the account's write lock.
    fn commit_locked(
        &self,
        profile: &AccountProfile,
        mut request: NewEntry,
        side: EntrySide,
    ) -> Result<LedgerEntry, LedgerError> {
        let account_id = profile.id;
        if side == EntrySide::Credit && request.due_date.take().is_some() {
            tracing::debug!(account = %account_id, "dropping due date on credit entry");
        }

        let attempts = self.config.max_append_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let head = self.store.head(account_id)?;
            if side == EntrySide::Debit {
                CreditLimitGuard::check(profile, head.balance, request.debit)?;
            }

            let now = self.clock.now();
            let created_at = head.last_created_at.map_or(now, |last| last.max(now));
            let due_date = match side {
                EntrySide::Debit => Some(
                    request
                        .due_date
                        .unwrap_or_else(|| default_due_date(self.clock.today(), profile)),
                ),
                EntrySide::Credit => None,
            };
            let balance = head
                .balance
                .checked_add(request.debit)
                .and_then(|balance| balance.checked_sub(request.credit))
                .ok_or(ValidationError::AmountOverflow)?;
            let stats = self
                .store
                .stats(account_id)?
                .advanced(request.debit, request.credit, created_at)?;

            let commit = EntryCommit {
                account_id,
                expected_version: head.version,
                draft: EntryDraft {
                    created_at,
                    description: request.description.clone(),
                    debit: request.debit,
                    credit: request.credit,
                    balance,
                    due_date,
                    entry_type: request.entry_type,
                    reference: request.reference.clone(),
                    created_by: request.created_by.clone(),
                },
                stats,
            };
            match self.store.append(commit) {
                Ok(entry) => return Ok(entry),
                Err(LedgerError::ConcurrencyConflict { .. }) => {
                    tracing::debug!(account = %account_id, attempt, "version conflict, retrying");
                }
                Err(error) => return Err(error),
            }
        }

        tracing::warn!(account = %account_id, attempts, "append retries exhausted");
        Err(LedgerError::ConcurrencyConflict {
            account_id,
            attempts,
        })
    }

    /// Best-effort side effects. Nothing here can fail the write.
    fn after_commit(&self, entry: LedgerEntry) -> CreatedEntry {
        if let Err(error) = self.audit.record(&entry) {
            tracing::warn!(entry = %entry.id, %error, "audit record failed");
        }
        let notification = self.notifications.submit(EntryNotification::from(&entry));
        if let NotificationStatus::Failed(reason) = &notification {
            tracing::warn!(entry = %entry.id, %reason, "notification failed");
        }
        tracing::info!(
            account = %entry.account_id,
            entry = %entry.id,
            debit = %entry.debit,
            credit = %entry.credit,
            balance = %entry.balance,
            "entry created"
        );
        CreatedEntry {
            entry,
            notification,
        }
    }

    fn ensure_account(&self, account_id: AccountId) -> Result<AccountProfile, LedgerError> {
        self.directory
            .resolve(account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Clones the lock handle so the map shard is released before locking.
    fn write_lock(&self, account_id: AccountId) -> Arc<Mutex<()>> {
        Arc::clone(&self.write_locks.entry(account_id).or_default())
    }
}

fn default_due_date(today: NaiveDate, profile: &AccountProfile) -> NaiveDate {
    today
        .checked_add_days(Days::new(u64::from(profile.default_due_period_days)))
        .unwrap_or(NaiveDate::MAX)
}
