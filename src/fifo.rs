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

//! FIFO allocation of credits against outstanding debits.
//!
//! Replays an account's history oldest first. Every debit that carries a due
//! date opens a charge; every credit pays down open charges in the order they
//! were opened. Nothing here is persisted: the allocation is recomputed from
//! the full history on every call.
//!
//! Credits that find no open charge are not carried forward to charges opened
//! later. Such amounts still show in the running balance, which is why an
//! account's `total_due` and its aging buckets can differ.

use crate::entry::LedgerEntry;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// A debit with an unpaid remainder after allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDebit {
    pub entry: LedgerEntry,
    pub due_date: NaiveDate,
    pub remaining: Decimal,
}

impl OpenDebit {
    /// Portion of the original debit already covered by credits.
    pub fn paid(&self) -> Decimal {
        self.entry.debit - self.remaining
    }
}

pub struct FifoAllocator;

impl FifoAllocator {
    /// Allocates every credit in `history` and returns the debits left unpaid.
    ///
    /// `history` must be in creation order. The result keeps that order.
    pub fn allocate<'a>(history: impl IntoIterator<Item = &'a LedgerEntry>) -> Vec<OpenDebit> {
        let mut open: Vec<OpenDebit> = Vec::new();
        // Everything before `cursor` is fully paid.
        let mut cursor = 0;

        for entry in history {
            if entry.debit > Decimal::ZERO {
                if let Some(due_date) = entry.due_date {
                    open.push(OpenDebit {
                        entry: entry.clone(),
                        due_date,
                        remaining: entry.debit,
                    });
                }
                continue;
            }

            let mut credit_left = entry.credit;
            while credit_left > Decimal::ZERO && cursor < open.len() {
                let debit = &mut open[cursor];
                let applied = credit_left.min(debit.remaining);
                debit.remaining -= applied;
                credit_left -= applied;
                if debit.remaining.is_zero() {
                    cursor += 1;
                }
            }
            if credit_left > Decimal::ZERO {
                tracing::debug!(
                    account = %entry.account_id,
                    entry = %entry.id,
                    unapplied = %credit_left,
                    "credit exceeds open debits"
                );
            }
        }

        open.retain(|debit| debit.remaining > Decimal::ZERO);
        open
    }

    /// Sum of the unpaid remainders.
    pub fn outstanding(open: &[OpenDebit]) -> Decimal {
        open.iter().map(|debit| debit.remaining).sum()
    }
}
