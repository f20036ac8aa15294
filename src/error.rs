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

//! Error types for ledger operations.

use crate::base::{AccountId, EntryId};
use crate::entry::{EntrySide, EntryType};
use rust_decimal::Decimal;
use thiserror::Error;

/// Malformed input rejected before anything is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Debit and credit are both zero or both positive
    #[error("exactly one of debit or credit must be positive")]
    AmountSides,

    /// Debit or credit is below zero
    #[error("amounts must not be negative")]
    NegativeAmount,

    /// Account id does not resolve in the account directory
    #[error("account {0} does not exist")]
    UnknownAccount(AccountId),

    /// Description is empty or whitespace
    #[error("description must not be empty")]
    EmptyDescription,

    /// Entry type cannot be booked on the requested side
    #[error("{entry_type} entries cannot be booked as a {side}")]
    EntryTypeMismatch { entry_type: EntryType, side: EntrySide },

    /// Page number or page size out of range
    #[error("invalid page {page} with page size {page_size}")]
    InvalidPage { page: usize, page_size: usize },

    /// Entry was already reversed, or is itself a reversal
    #[error("entry {0} is already voided")]
    AlreadyVoided(EntryId),

    /// Booking the amount would overflow the account's balance or totals
    #[error("amount overflows the account's running figures")]
    AmountOverflow,
}

/// Ledger engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Input failed validation
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Debit would push the running balance past the account's credit limit
    #[error(
        "credit limit exceeded: balance {current_balance} + debit would reach {attempted_balance}, \
         limit {credit_limit} (over by {excess_amount})"
    )]
    CreditLimitExceeded {
        current_balance: Decimal,
        credit_limit: Decimal,
        attempted_balance: Decimal,
        excess_amount: Decimal,
    },

    /// Account id is unknown
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    /// Entry id is unknown
    #[error("entry {0} not found")]
    EntryNotFound(EntryId),

    /// The account's ledger kept moving underneath the writer
    #[error("concurrent modification of account {account_id} after {attempts} attempts")]
    ConcurrencyConflict { account_id: AccountId, attempts: u32 },

    /// Storage failure; nothing was written
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A portfolio scan was cancelled before completing
    #[error("scan cancelled")]
    ScanCancelled,

    /// Portfolio totals do not fit in a decimal
    #[error("portfolio totals overflow")]
    TotalsOverflow,
}

impl LedgerError {
    /// Returns `true` for failures that may succeed if the caller tries again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Failure reported by an audit sink or notification dispatcher.
///
/// Never converted into a [`LedgerError`]: side effects run after commit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SideEffectError(pub String);

/// Invalid engine configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Page size must be at least one
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// Default page size is larger than the maximum
    #[error("default page size {default} exceeds maximum {max}")]
    PageSizeOrder { default: usize, max: usize },
}
