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

//! Credit limit admission control.
//!
//! The guard is a pure check against a balance the caller has already read.
//! It only protects the limit if the caller commits against that same
//! balance, which [`LedgerEngine`](crate::LedgerEngine) does by holding the
//! account's write lock and committing against the head's version.

use crate::account::AccountProfile;
use crate::error::{LedgerError, ValidationError};
use rust_decimal::Decimal;

pub struct CreditLimitGuard;

impl CreditLimitGuard {
    /// Admits a debit of `debit` on top of `current_balance`.
    ///
    /// Accounts with a zero limit are unlimited and always pass.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::CreditLimitExceeded`] - The resulting balance is above the limit.
    /// - [`ValidationError::AmountOverflow`] - The resulting balance does not fit in a decimal.
    pub fn check(
        profile: &AccountProfile,
        current_balance: Decimal,
        debit: Decimal,
    ) -> Result<(), LedgerError> {
        if !profile.has_credit_limit() {
            return Ok(());
        }
        let attempted_balance = current_balance
            .checked_add(debit)
            .ok_or(ValidationError::AmountOverflow)?;
        if attempted_balance > profile.credit_limit {
            return Err(LedgerError::CreditLimitExceeded {
                current_balance,
                credit_limit: profile.credit_limit,
                attempted_balance,
                excess_amount: attempted_balance - profile.credit_limit,
            });
        }
        Ok(())
    }
}
