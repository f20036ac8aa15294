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

//! Due summaries.
//!
//! A [`DueSummary`] is a point-in-time view of one account, computed from a
//! single history snapshot: the running balance comes from the last entry,
//! the near-term and overdue figures from [`FifoAllocator`] and
//! [`AgingClassifier`]. Portfolio scans fan out across accounts with rayon and
//! share no mutable state beyond a [`ScanCancel`] flag.
//!
//! `total_due` is `max(0, current_balance)`. The overdue and aging figures only
//! cover debits with a due date that FIFO left unpaid, so they can be smaller
//! than `total_due` (undated debits) or larger (credits that found no open
//! debit).

use crate::aging::{AgingBuckets, AgingClassifier};
use crate::base::AccountId;
use crate::entry::LedgerEntry;
use crate::error::LedgerError;
use crate::fifo::FifoAllocator;
use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueSummary {
    pub account_id: AccountId,
    pub current_balance: Decimal,
    pub total_due: Decimal,
    pub overdue_amount: Decimal,
    pub due_today: Decimal,
    pub due_this_week: Decimal,
    pub aging: AgingBuckets,
    pub last_activity: Option<DateTime<Utc>>,
}

impl DueSummary {
    pub fn empty(account_id: AccountId) -> Self {
        Self {
            account_id,
            current_balance: Decimal::ZERO,
            total_due: Decimal::ZERO,
            overdue_amount: Decimal::ZERO,
            due_today: Decimal::ZERO,
            due_this_week: Decimal::ZERO,
            aging: AgingBuckets::default(),
            last_activity: None,
        }
    }
}

/// Portfolio-wide sums over the accounts that have something due.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DueTotals {
    pub account_count: usize,
    pub current_balance: Decimal,
    pub total_due: Decimal,
    pub overdue_amount: Decimal,
    pub due_today: Decimal,
    pub due_this_week: Decimal,
    pub aging: AgingBuckets,
}

impl DueTotals {
    /// Adds one account's figures, or `None` if any sum overflows.
    fn include(&self, summary: &DueSummary) -> Option<Self> {
        Some(Self {
            account_count: self.account_count + 1,
            current_balance: self.current_balance.checked_add(summary.current_balance)?,
            total_due: self.total_due.checked_add(summary.total_due)?,
            overdue_amount: self.overdue_amount.checked_add(summary.overdue_amount)?,
            due_today: self.due_today.checked_add(summary.due_today)?,
            due_this_week: self.due_this_week.checked_add(summary.due_this_week)?,
            aging: self.aging.checked_add(&summary.aging)?,
        })
    }
}

/// Cooperative cancellation for portfolio scans.
///
/// Clones share the flag. Scans only read, so abandoning one leaves nothing
/// behind.
#[derive(Debug, Clone, Default)]
pub struct ScanCancel(Arc<AtomicBool>);

impl ScanCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DueSummaryAggregator {
    classifier: AgingClassifier,
}

impl DueSummaryAggregator {
    pub fn new(classifier: AgingClassifier) -> Self {
        Self { classifier }
    }

    /// Summarizes one account from its full, creation-ordered history.
    pub fn summarize(
        &self,
        account_id: AccountId,
        history: &[LedgerEntry],
        today: NaiveDate,
    ) -> DueSummary {
        let Some(last) = history.last() else {
            return DueSummary::empty(account_id);
        };
        let open = FifoAllocator::allocate(history);
        let report = self.classifier.classify(&open, today);

        DueSummary {
            account_id,
            current_balance: last.balance,
            total_due: last.balance.max(Decimal::ZERO),
            overdue_amount: report.overdue_amount,
            due_today: report.due_today,
            due_this_week: report.due_this_week,
            aging: report.aging,
            last_activity: Some(last.created_at),
        }
    }

    /// Summarizes every account in parallel.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ScanCancelled`] - `cancel` fired before the scan finished.
    /// - Any error returned by `load`.
    pub fn scan<F>(
        &self,
        account_ids: &[AccountId],
        today: NaiveDate,
        cancel: &ScanCancel,
        load: F,
    ) -> Result<Vec<DueSummary>, LedgerError>
    where
        F: Fn(AccountId) -> Result<Vec<LedgerEntry>, LedgerError> + Sync,
    {
        account_ids
            .par_iter()
            .map(|&account_id| {
                if cancel.is_cancelled() {
                    return Err(LedgerError::ScanCancelled);
                }
                let history = load(account_id)?;
                Ok(self.summarize(account_id, &history, today))
            })
            .collect()
    }

    /// Keeps accounts with something due, most overdue first.
    ///
    /// Ties on `(overdue_amount, total_due)` fall back to ascending account id.
    pub fn rank(summaries: Vec<DueSummary>) -> Vec<DueSummary> {
        let mut due: Vec<DueSummary> = summaries
            .into_iter()
            .filter(|summary| summary.total_due > Decimal::ZERO)
            .collect();
        due.sort_by(compare_for_collections);
        due
    }

    /// Sums every figure across `summaries`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::TotalsOverflow`] if any sum leaves the decimal range.
    pub fn totals<'a>(
        summaries: impl IntoIterator<Item = &'a DueSummary>,
    ) -> Result<DueTotals, LedgerError> {
        summaries
            .into_iter()
            .try_fold(DueTotals::default(), |totals, summary| {
                totals.include(summary).ok_or(LedgerError::TotalsOverflow)
            })
    }
}

fn compare_for_collections(a: &DueSummary, b: &DueSummary) -> CmpOrdering {
    b.overdue_amount
        .cmp(&a.overdue_amount)
        .then_with(|| b.total_due.cmp(&a.total_due))
        .then_with(|| a.account_id.cmp(&b.account_id))
}
