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

//! Aging classification of unpaid debits.
//!
//! Each open debit is placed by comparing its due date with `today`:
//!
//! | Due date | Counted in |
//! |----------|------------|
//! | before today | `overdue_amount` and one aging bucket by days past due |
//! | today | `due_today` |
//! | within the next `due_soon_days` days | `due_this_week` |
//! | later | none of the near-term figures |

use crate::fifo::OpenDebit;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Days-past-due bracket of an overdue amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgingBucket {
    #[serde(rename = "0-30")]
    UpTo30,
    #[serde(rename = "31-60")]
    UpTo60,
    #[serde(rename = "61-90")]
    UpTo90,
    #[serde(rename = "90+")]
    Over90,
}

impl AgingBucket {
    pub const ALL: [AgingBucket; 4] = [Self::UpTo30, Self::UpTo60, Self::UpTo90, Self::Over90];

    pub fn for_days_past(days_past: i64) -> Self {
        match days_past {
            ..=30 => Self::UpTo30,
            31..=60 => Self::UpTo60,
            61..=90 => Self::UpTo90,
            _ => Self::Over90,
        }
    }

}

/// Overdue amounts per [`AgingBucket`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingBuckets {
    #[serde(rename = "0-30")]
    pub up_to_30: Decimal,
    #[serde(rename = "31-60")]
    pub up_to_60: Decimal,
    #[serde(rename = "61-90")]
    pub up_to_90: Decimal,
    #[serde(rename = "90+")]
    pub over_90: Decimal,
}

impl AgingBuckets {
    pub fn get(&self, bucket: AgingBucket) -> Decimal {
        match bucket {
            AgingBucket::UpTo30 => self.up_to_30,
            AgingBucket::UpTo60 => self.up_to_60,
            AgingBucket::UpTo90 => self.up_to_90,
            AgingBucket::Over90 => self.over_90,
        }
    }

    pub fn add(&mut self, bucket: AgingBucket, amount: Decimal) {
        let slot = match bucket {
            AgingBucket::UpTo30 => &mut self.up_to_30,
            AgingBucket::UpTo60 => &mut self.up_to_60,
            AgingBucket::UpTo90 => &mut self.up_to_90,
            AgingBucket::Over90 => &mut self.over_90,
        };
        *slot += amount;
    }

    /// Bucket-wise sum, or `None` if any bucket overflows.
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        Some(Self {
            up_to_30: self.up_to_30.checked_add(other.up_to_30)?,
            up_to_60: self.up_to_60.checked_add(other.up_to_60)?,
            up_to_90: self.up_to_90.checked_add(other.up_to_90)?,
            over_90: self.over_90.checked_add(other.over_90)?,
        })
    }

    pub fn total(&self) -> Decimal {
        AgingBucket::ALL.iter().map(|bucket| self.get(*bucket)).sum()
    }
}


/// Where a due date falls relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuePosition {
    Overdue { days_past: i64, bucket: AgingBucket },
    DueToday,
    DueSoon,
    Later,
}

/// Near-term and overdue figures for one account's open debits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingReport {
    pub overdue_amount: Decimal,
    pub due_today: Decimal,
    pub due_this_week: Decimal,
    pub aging: AgingBuckets,
}

#[derive(Debug, Clone, Copy)]
pub struct AgingClassifier {
    due_soon_days: u32,
}

impl AgingClassifier {
    pub const DEFAULT_DUE_SOON_DAYS: u32 = 7;

    pub fn new(due_soon_days: u32) -> Self {
        Self { due_soon_days }
    }

    pub fn position(&self, due_date: NaiveDate, today: NaiveDate) -> DuePosition {
        let days_past = today.signed_duration_since(due_date).num_days();
        if days_past > 0 {
            DuePosition::Overdue {
                days_past,
                bucket: AgingBucket::for_days_past(days_past),
            }
        } else if days_past == 0 {
            DuePosition::DueToday
        } else if -days_past <= i64::from(self.due_soon_days) {
            DuePosition::DueSoon
        } else {
            DuePosition::Later
        }
    }

    pub fn classify(&self, open: &[OpenDebit], today: NaiveDate) -> AgingReport {
        let mut report = AgingReport::default();
        for debit in open.iter().filter(|debit| debit.remaining > Decimal::ZERO) {
            match self.position(debit.due_date, today) {
                DuePosition::Overdue { bucket, .. } => {
                    report.overdue_amount += debit.remaining;
                    report.aging.add(bucket, debit.remaining);
                }
                DuePosition::DueToday => report.due_today += debit.remaining,
                DuePosition::DueSoon => report.due_this_week += debit.remaining,
                DuePosition::Later => {}
            }
        }
        report
    }
}

impl Default for AgingClassifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DUE_SOON_DAYS)
    }
}
