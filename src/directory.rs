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

//! Account directory.
//!
//! The ledger never creates or edits accounts; it only resolves them through
//! an [`AccountDirectory`] to read the credit limit and default due period.

use crate::account::AccountProfile;
use crate::base::AccountId;
use dashmap::DashMap;

/// Read-only account lookup.
pub trait AccountDirectory: Send + Sync {
    /// Resolves an account, `None` if it does not exist.
    fn resolve(&self, account_id: AccountId) -> Option<AccountProfile>;
}

/// Directory backed by a concurrent map, used by the CLI and tests.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    accounts: DashMap<AccountId, AccountProfile>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an account profile.
    pub fn upsert(&self, profile: AccountProfile) {
        self.accounts.insert(profile.id, profile);
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl FromIterator<AccountProfile> for InMemoryDirectory {
    fn from_iter<I: IntoIterator<Item = AccountProfile>>(iter: I) -> Self {
        let directory = Self::new();
        for profile in iter {
            directory.upsert(profile);
        }
        directory
    }
}

impl AccountDirectory for InMemoryDirectory {
    fn resolve(&self, account_id: AccountId) -> Option<AccountProfile> {
        self.accounts.get(&account_id).map(|profile| profile.clone())
    }
}
