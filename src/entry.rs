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

//! Ledger entries.
//!
//! An entry is a single debit or credit against one account. Entries are
//! immutable once appended: the running `balance` is fixed at creation and
//! corrections are booked as new [`EntryType::Adjustment`] entries.

use crate::base::{AccountId, EntryId};
use crate::error::ValidationError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference prefix marking an entry as the reversal of another.
const VOID_REFERENCE_PREFIX: &str = "void:";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Purchase,
    Payment,
    Adjustment,
    Return,
}

impl EntryType {
    /// Whether this type may be booked on `side`.
    ///
    /// Purchases are always debits, payments and returns always credits.
    pub fn allows(&self, side: EntrySide) -> bool {
        match self {
            Self::Purchase => side == EntrySide::Debit,
            Self::Payment | Self::Return => side == EntrySide::Credit,
            Self::Adjustment => true,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Purchase => "purchase",
            Self::Payment => "payment",
            Self::Adjustment => "adjustment",
            Self::Return => "return",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntrySide {
    Debit,
    Credit,
}

impl fmt::Display for EntrySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debit => f.write_str("debit"),
            Self::Credit => f.write_str("credit"),
        }
    }
}

/// A persisted ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub debit: Decimal,
    pub credit: Decimal,
    /// Running balance including this entry.
    pub balance: Decimal,
    pub due_date: Option<NaiveDate>,
    pub entry_type: EntryType,
    pub reference: Option<String>,
    pub created_by: String,
}

impl LedgerEntry {
    pub fn side(&self) -> EntrySide {
        if self.debit > Decimal::ZERO {
            EntrySide::Debit
        } else {
            EntrySide::Credit
        }
    }

    /// Returns `debit - credit`.
    pub fn net(&self) -> Decimal {
        self.debit - self.credit
    }

    /// Id of the entry this one reverses, if it is a void.
    pub fn voids(&self) -> Option<EntryId> {
        self.reference
            .as_deref()?
            .strip_prefix(VOID_REFERENCE_PREFIX)?
            .parse()
            .ok()
            .map(EntryId)
    }

    pub(crate) fn void_reference(id: EntryId) -> String {
        format!("{VOID_REFERENCE_PREFIX}{id}")
    }
}

/// Request to create a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub account_id: AccountId,
    pub description: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub reference: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub entry_type: EntryType,
    pub created_by: String,
}

impl NewEntry {
    /// A purchase debit with no explicit due date.
    pub fn purchase(
        account_id: AccountId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self::new(account_id, EntryType::Purchase, amount, Decimal::ZERO, description)
    }

    /// A payment credit.
    pub fn payment(account_id: AccountId, amount: Decimal, description: impl Into<String>) -> Self {
        Self::new(account_id, EntryType::Payment, Decimal::ZERO, amount, description)
    }

    pub fn new(
        account_id: AccountId,
        entry_type: EntryType,
        debit: Decimal,
        credit: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            description: description.into(),
            debit,
            credit,
            reference: None,
            due_date: None,
            entry_type,
            created_by: String::from("system"),
        }
    }

    pub fn due_on(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn created_by(mut self, user: impl Into<String>) -> Self {
        self.created_by = user.into();
        self
    }

    /// Checks the request's shape and returns the side it books on.
    ///
    /// Does not resolve the account; that needs the directory.
    pub fn validate(&self) -> Result<EntrySide, ValidationError> {
        if self.debit < Decimal::ZERO || self.credit < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount);
        }
        let side = match (self.debit > Decimal::ZERO, self.credit > Decimal::ZERO) {
            (true, false) => EntrySide::Debit,
            (false, true) => EntrySide::Credit,
            _ => return Err(ValidationError::AmountSides),
        };
        if self.description.trim().is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        if !self.entry_type.allows(side) {
            return Err(ValidationError::EntryTypeMismatch {
                entry_type: self.entry_type,
                side,
            });
        }
        Ok(side)
    }
}
