//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.
//! A scripted in-memory `RemoteAdapter` for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::prelude::*;
use tokio::sync::mpsc;

use super::adapter::*;
use super::context::RequestContext;
use super::update::{BusEvent, RemoteUpdate};
use crate::account::model::*;
use crate::account::user::User;
use crate::support::reporter::RecordingReporter;
use crate::support::system_config::SystemConfig;
use crate::support::uid_validity::IncrementalUidValidityGenerator;

pub const TEST_PASSWORD: &str = "hunter2";

#[derive(Debug, Default)]
struct Store {
    next_id: u64,
    labels: HashMap<RemoteMailboxId, Vec<String>>,
    messages: HashMap<RemoteMessageId, (RemoteMessage, Vec<u8>)>,
}

#[derive(Debug, Default)]
pub struct TestAdapter {
    store: Mutex<Store>,
    /// How many upcoming `create_message` calls should fail.
    pub fail_creates: AtomicUsize,
    /// A line for every call made, e.g. `create_label a/b`.
    pub calls: Mutex<Vec<String>>,
    /// The context each `create_label` call was made under.
    pub label_contexts: Mutex<Vec<RequestContext>>,
    pub observed: Mutex<Vec<BusEvent>>,
}

impl TestAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_creates(&self, n: usize) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn message_count(&self) -> usize {
        self.store.lock().unwrap().messages.len()
    }

    /// Build a message the host could push through `RemoteUpdate`.
    pub fn remote_message(
        &self,
        label: &str,
        literal: &[u8],
    ) -> (RemoteMessage, Vec<u8>) {
        let mut store = self.store.lock().unwrap();
        store.next_id += 1;
        let message = RemoteMessage {
            id: RemoteMessageId(format!("pushed-{}", store.next_id)),
            mailboxes: vec![RemoteMailboxId(label.to_owned())],
            flags: FlagSet::new(),
            internal_date: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
                .unwrap(),
        };
        store
            .messages
            .insert(message.id.clone(), (message.clone(), literal.to_vec()));
        (message, literal.to_vec())
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn with_messages(
        &self,
        ids: &[RemoteMessageId],
        mut f: impl FnMut(&mut RemoteMessage),
    ) -> Result<(), AdapterError> {
        let mut store = self.store.lock().unwrap();
        for id in ids {
            let (message, _) =
                store.messages.get_mut(id).ok_or(AdapterError::NotFound)?;
            f(message);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteAdapter for TestAdapter {
    async fn authorize(
        &self,
        _ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> Result<bool, AdapterError> {
        self.record(format!("authorize {}", username));
        Ok(TEST_PASSWORD == password)
    }

    async fn get_label(
        &self,
        _ctx: &RequestContext,
        id: &RemoteMailboxId,
    ) -> Result<RemoteLabel, AdapterError> {
        let store = self.store.lock().unwrap();
        let path = store.labels.get(id).ok_or(AdapterError::NotFound)?;
        Ok(RemoteLabel {
            id: id.clone(),
            path: path.clone(),
        })
    }

    async fn create_label(
        &self,
        ctx: &RequestContext,
        path: &[String],
    ) -> Result<RemoteLabel, AdapterError> {
        self.record(format!("create_label {}", path.join("/")));
        self.label_contexts.lock().unwrap().push(ctx.clone());
        let mut store = self.store.lock().unwrap();
        store.next_id += 1;
        let id = RemoteMailboxId(format!("label-{}", store.next_id));
        store.labels.insert(id.clone(), path.to_vec());
        Ok(RemoteLabel {
            id,
            path: path.to_vec(),
        })
    }

    async fn update_label(
        &self,
        _ctx: &RequestContext,
        id: &RemoteMailboxId,
        path: &[String],
    ) -> Result<(), AdapterError> {
        self.record(format!("update_label {} {}", id, path.join("/")));
        let mut store = self.store.lock().unwrap();
        let existing =
            store.labels.get_mut(id).ok_or(AdapterError::NotFound)?;
        *existing = path.to_vec();
        Ok(())
    }

    async fn delete_label(
        &self,
        _ctx: &RequestContext,
        id: &RemoteMailboxId,
    ) -> Result<(), AdapterError> {
        self.record(format!("delete_label {}", id));
        self.store.lock().unwrap().labels.remove(id);
        Ok(())
    }

    async fn get_message(
        &self,
        _ctx: &RequestContext,
        id: &RemoteMessageId,
    ) -> Result<(RemoteMessage, Vec<u8>), AdapterError> {
        self.store
            .lock()
            .unwrap()
            .messages
            .get(id)
            .cloned()
            .ok_or(AdapterError::NotFound)
    }

    async fn create_message(
        &self,
        _ctx: &RequestContext,
        mailbox: &RemoteMailboxId,
        literal: &[u8],
        flags: &FlagSet,
        internal_date: DateTime<FixedOffset>,
    ) -> Result<(RemoteMessage, Vec<u8>), AdapterError> {
        self.record(format!("create_message {}", mailbox));
        let failing = self
            .fail_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(AdapterError::Unavailable("scripted failure".to_owned()));
        }

        let mut store = self.store.lock().unwrap();
        store.next_id += 1;
        let message = RemoteMessage {
            id: RemoteMessageId(format!("msg-{}", store.next_id)),
            mailboxes: vec![mailbox.clone()],
            flags: flags.clone(),
            internal_date,
        };
        store
            .messages
            .insert(message.id.clone(), (message.clone(), literal.to_vec()));
        Ok((message, literal.to_vec()))
    }

    async fn add_messages_to_mailbox(
        &self,
        _ctx: &RequestContext,
        ids: &[RemoteMessageId],
        mailbox: &RemoteMailboxId,
    ) -> Result<(), AdapterError> {
        self.record(format!("add_messages {} {}", ids.len(), mailbox));
        self.with_messages(ids, |m| {
            if !m.mailboxes.contains(mailbox) {
                m.mailboxes.push(mailbox.clone());
            }
        })
    }

    async fn remove_messages_from_mailbox(
        &self,
        _ctx: &RequestContext,
        ids: &[RemoteMessageId],
        mailbox: &RemoteMailboxId,
    ) -> Result<(), AdapterError> {
        self.record(format!("remove_messages {} {}", ids.len(), mailbox));
        self.with_messages(ids, |m| m.mailboxes.retain(|l| l != mailbox))
    }

    async fn move_messages(
        &self,
        _ctx: &RequestContext,
        ids: &[RemoteMessageId],
        from: &RemoteMailboxId,
        to: &RemoteMailboxId,
    ) -> Result<(), AdapterError> {
        self.record(format!("move_messages {} {} {}", ids.len(), from, to));
        self.with_messages(ids, |m| {
            m.mailboxes.retain(|l| l != from);
            if !m.mailboxes.contains(to) {
                m.mailboxes.push(to.clone());
            }
        })
    }

    async fn mark_messages_seen(
        &self,
        _ctx: &RequestContext,
        ids: &[RemoteMessageId],
        seen: bool,
    ) -> Result<(), AdapterError> {
        self.record(format!("mark_seen {} {}", ids.len(), seen));
        self.with_messages(ids, |m| {
            if seen {
                m.flags.insert(Flag::Seen);
            } else {
                m.flags.remove(&Flag::Seen);
            }
        })
    }

    async fn mark_messages_flagged(
        &self,
        _ctx: &RequestContext,
        ids: &[RemoteMessageId],
        flagged: bool,
    ) -> Result<(), AdapterError> {
        self.record(format!("mark_flagged {} {}", ids.len(), flagged));
        self.with_messages(ids, |m| {
            if flagged {
                m.flags.insert(Flag::Flagged);
            } else {
                m.flags.remove(&Flag::Flagged);
            }
        })
    }

    fn observe(&self, event: &BusEvent) {
        self.observed.lock().unwrap().push(event.clone());
    }
}

/// Start a user backed by a fresh `TestAdapter`.
///
/// The returned sender is the host's update channel for the user.
pub fn start_user(
    name: &str,
) -> (Arc<User>, Arc<TestAdapter>, mpsc::Sender<RemoteUpdate>) {
    let adapter = TestAdapter::new();
    let (tx, rx) = mpsc::channel(16);
    let user = User::start(
        name.to_owned(),
        adapter.clone(),
        rx,
        Arc::new(SystemConfig::default()),
        Arc::new(IncrementalUidValidityGenerator::new()),
        Arc::new(RecordingReporter::default()),
    )
    .unwrap();
    (user, adapter, tx)
}
