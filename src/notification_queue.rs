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

//! Notification delivery backends.
//!
//! The backend is chosen once, from [`LedgerConfig::notifications`], and
//! injected into the engine. The engine only sees the [`QueueBackend`]
//! capability and never probes for optional infrastructure at runtime.
//!
//! [`LedgerConfig::notifications`]: crate::LedgerConfig

use crate::config::QueueKind;
use crate::effects::{EntryNotification, NotificationDispatcher, NotificationStatus};
use crossbeam::channel::{self, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Accepts notifications for committed entries.
pub trait QueueBackend: Send + Sync {
    /// Hands off one notification. Never retries.
    fn submit(&self, notification: EntryNotification) -> NotificationStatus;
}

/// Builds the backend selected by `kind`.
pub fn queue_backend(
    kind: QueueKind,
    capacity: usize,
    dispatcher: Arc<dyn NotificationDispatcher>,
) -> Arc<dyn QueueBackend> {
    match kind {
        QueueKind::Disabled => Arc::new(DisabledQueue),
        QueueKind::Inline => Arc::new(InlineQueue::new(dispatcher)),
        QueueKind::Channel => Arc::new(ChannelQueue::new(dispatcher, capacity)),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledQueue;

impl QueueBackend for DisabledQueue {
    fn submit(&self, _notification: EntryNotification) -> NotificationStatus {
        NotificationStatus::Disabled
    }
}

/// Dispatches on the caller's thread.
pub struct InlineQueue {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl InlineQueue {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl QueueBackend for InlineQueue {
    fn submit(&self, notification: EntryNotification) -> NotificationStatus {
        match self.dispatcher.dispatch(&notification) {
            Ok(()) => NotificationStatus::Delivered,
            Err(error) => NotificationStatus::Failed(error.to_string()),
        }
    }
}

/// Bounded channel drained by a single worker thread.
///
/// Delivery failures on the worker are logged; the writer has already been
/// told the notification was queued.
pub struct ChannelQueue {
    sender: Mutex<Option<Sender<EntryNotification>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelQueue {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, capacity: usize) -> Self {
        let (sender, receiver) = channel::bounded::<EntryNotification>(capacity);
        let worker = thread::spawn(move || {
            for notification in receiver {
                if let Err(error) = dispatcher.dispatch(&notification) {
                    tracing::warn!(
                        account = %notification.account_id,
                        entry = %notification.entry_id,
                        %error,
                        "queued notification failed"
                    );
                }
            }
        });
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stops accepting notifications and waits for the queue to drain.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("notification worker panicked");
            }
        }
    }
}

impl QueueBackend for ChannelQueue {
    fn submit(&self, notification: EntryNotification) -> NotificationStatus {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            return NotificationStatus::Failed("notification queue closed".into());
        };
        match sender.try_send(notification) {
            Ok(()) => NotificationStatus::Queued,
            Err(TrySendError::Full(_)) => {
                NotificationStatus::Failed("notification queue full".into())
            }
            Err(TrySendError::Disconnected(_)) => {
                NotificationStatus::Failed("notification queue closed".into())
            }
        }
    }
}

impl Drop for ChannelQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
