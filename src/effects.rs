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

//! Collaborators invoked after an entry commits.
//!
//! Both are best-effort. A failing [`AuditSink`] is logged and ignored; a
//! failing [`NotificationDispatcher`] is reported back to the caller as a
//! [`NotificationStatus`]. Neither can undo the ledger write.

use crate::base::{AccountId, EntryId};
use crate::entry::{EntryType, LedgerEntry};
use crate::error::SideEffectError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Records who created which entry.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &LedgerEntry) -> Result<(), SideEffectError>;
}

/// Delivers entry notifications to customers or staff.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: &EntryNotification) -> Result<(), SideEffectError>;
}

/// What a notification says about a committed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryNotification {
    pub entry_id: EntryId,
    pub account_id: AccountId,
    pub entry_type: EntryType,
    pub debit: Decimal,
    pub credit: Decimal,
    pub balance: Decimal,
    pub due_date: Option<NaiveDate>,
}

impl From<&LedgerEntry> for EntryNotification {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            entry_id: entry.id,
            account_id: entry.account_id,
            entry_type: entry.entry_type,
            debit: entry.debit,
            credit: entry.credit,
            balance: entry.balance,
            due_date: entry.due_date,
        }
    }
}

/// Outcome of the post-commit notification, separate from the entry itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum NotificationStatus {
    Disabled,
    Delivered,
    Queued,
    Failed(String),
}

impl NotificationStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Audit sink that writes to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &LedgerEntry) -> Result<(), SideEffectError> {
        tracing::info!(
            target: "audit",
            account = %entry.account_id,
            entry = %entry.id,
            entry_type = %entry.entry_type,
            created_by = %entry.created_by,
            debit = %entry.debit,
            credit = %entry.credit,
            "ledger entry created"
        );
        Ok(())
    }
}

/// Dispatcher that only logs, for deployments without a delivery channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn dispatch(&self, notification: &EntryNotification) -> Result<(), SideEffectError> {
        tracing::debug!(
            account = %notification.account_id,
            entry = %notification.entry_id,
            balance = %notification.balance,
            "notification dispatched"
        );
        Ok(())
    }
}
