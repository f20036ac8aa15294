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

//! Engine configuration.

use crate::aging::AgingClassifier;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// How post-commit notifications are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Notifications are not sent.
    Disabled,
    /// Dispatched on the writer's thread right after commit.
    #[default]
    Inline,
    /// Handed to a bounded channel drained by a worker thread.
    Channel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Extra attempts after a commit loses an optimistic version race.
    pub max_append_retries: u32,
    /// Days after today counted as "due this week".
    pub due_soon_days: u32,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub notifications: QueueKind,
    pub channel_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_append_retries: 5,
            due_soon_days: AgingClassifier::DEFAULT_DUE_SOON_DAYS,
            default_page_size: 50,
            max_page_size: 500,
            notifications: QueueKind::default(),
            channel_capacity: 1024,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::Zero("default_page_size"));
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::Zero("max_page_size"));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::PageSizeOrder {
                default: self.default_page_size,
                max: self.max_page_size,
            });
        }
        if self.notifications == QueueKind::Channel && self.channel_capacity == 0 {
            return Err(ConfigError::Zero("channel_capacity"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LedgerConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.due_soon_days, 7);
        assert_eq!(config.notifications, QueueKind::Inline);
    }

    #[test]
    fn page_sizes_are_checked() {
        let config = LedgerConfig {
            default_page_size: 600,
            ..LedgerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::PageSizeOrder { default: 600, max: 500 })
        );

        let config = LedgerConfig {
            max_page_size: 0,
            ..LedgerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("max_page_size")));
    }

    #[test]
    fn channel_needs_capacity() {
        let config = LedgerConfig {
            notifications: QueueKind::Channel,
            channel_capacity: 0,
            ..LedgerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("channel_capacity")));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{"due_soon_days": 10, "notifications": "channel"}"#).unwrap();
        assert_eq!(config.due_soon_days, 10);
        assert_eq!(config.notifications, QueueKind::Channel);
        assert_eq!(config.max_append_retries, 5);
    }
}
