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

//! Per-user shared state.
//!
//! Each user has one `UserState`, guarded by a `std::sync::Mutex` which acts
//! as the per-user write lock. The lock is never held across a suspension
//! point. Mailboxes and messages live in arenas keyed by their gateway ids;
//! all cross-references are ids.
//!
//! Mutations are made by the update bus pump (see `bus`), in bus order. The
//! exceptions are snapshot registration, `\Recent` claims made at `SELECT`
//! time, and subscriptions, which sessions make directly under the lock.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::TryFrom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::prelude::*;
use log::{info, warn};
use tokio::sync::{mpsc, watch};

use super::bus::{self, Applied, Bus, UpdateKind};
use super::limits::ImapLimits;
use super::literal_store::LiteralStore;
use super::model::*;
use crate::remote::adapter::RemoteAdapter;
use crate::remote::update::{BusEvent, RemoteUpdate};
use crate::support::error::Error;
use crate::support::reporter::Reporter;
use crate::support::system_config::SystemConfig;
use crate::support::uid_validity::UidValidityGenerator;

static NEXT_SNAPSHOT_ID: AtomicU64 = AtomicU64::new(1);

/// One message's membership in one mailbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Row {
    pub message: MessageId,
    /// `\Deleted` is tracked per mailbox.
    pub deleted: bool,
    /// Whether some snapshot has been awarded `\Recent` for this row.
    pub recent_claimed: bool,
}

#[derive(Debug)]
pub struct MailboxRecord {
    pub id: MailboxId,
    pub name: String,
    pub remote: Option<RemoteMailboxId>,
    pub uid_validity: u32,
    next_uid: u64,
    pub rows: BTreeMap<Uid, Row>,
    by_message: HashMap<MessageId, Uid>,
    pub recovery: bool,
}

impl MailboxRecord {
    pub fn uidnext(&self) -> Uid {
        u32::try_from(self.next_uid)
            .ok()
            .and_then(Uid::of)
            .unwrap_or(Uid::MAX)
    }

    pub fn uid_of(&self, message: MessageId) -> Option<Uid> {
        self.by_message.get(&message).copied()
    }

    pub fn contains(&self, message: MessageId) -> bool {
        self.by_message.contains_key(&message)
    }
}

#[derive(Debug)]
pub struct MessageRecord {
    pub id: MessageId,
    pub remote: Option<RemoteMessageId>,
    /// Every flag except `\Deleted`.
    pub flags: FlagSet,
    pub internal_date: DateTime<FixedOffset>,
    pub size: usize,
    pub mailboxes: BTreeSet<MailboxId>,
    /// How many deletion pool entries still reference this message.
    pub pool_refs: usize,
    pub recovery_hash: Option<[u8; 32]>,
}

/// Something a selected snapshot needs to learn about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotEvent {
    Appended {
        uid: Uid,
        message: MessageId,
        flags: FlagSet,
        recent: bool,
    },
    FlagsChanged {
        uid: Uid,
        flags: FlagSet,
        /// False if the change should update the cache silently.
        report: bool,
    },
    /// The message left the mailbox. The snapshot now holds a deletion pool
    /// reference on `message` and must eventually release it.
    Expunged {
        uid: Uid,
        message: MessageId,
    },
    MailboxDeleted,
}

#[derive(Debug)]
struct Registration {
    mailbox: MailboxId,
    events: mpsc::UnboundedSender<SnapshotEvent>,
}

/// What a newly registered snapshot starts from.
#[derive(Debug)]
pub struct SnapshotSeed {
    pub id: SnapshotId,
    pub mailbox: MailboxId,
    pub uid_validity: u32,
    pub uidnext: Uid,
    /// `(uid, message, flags, recent)` in ascending UID order.
    pub rows: Vec<(Uid, MessageId, FlagSet, bool)>,
    pub events: mpsc::UnboundedReceiver<SnapshotEvent>,
}

/// The result of adding messages to a mailbox.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Added {
    /// Messages that received new UIDs, in the order requested.
    pub fresh: Vec<(MessageId, Uid)>,
    /// Messages that were already in the mailbox, with their existing UIDs.
    pub existing: Vec<(MessageId, Uid)>,
}

#[derive(Debug)]
pub struct UserState {
    delimiter: String,
    limits: ImapLimits,
    mailboxes: BTreeMap<MailboxId, MailboxRecord>,
    names: BTreeMap<String, MailboxId>,
    messages: HashMap<MessageId, MessageRecord>,
    remote_messages: HashMap<RemoteMessageId, MessageId>,
    remote_mailboxes: HashMap<RemoteMailboxId, MailboxId>,
    recovery_hashes: HashMap<[u8; 32], MessageId>,
    subscriptions: BTreeSet<String>,
    snapshots: BTreeMap<SnapshotId, Registration>,
    next_mailbox_id: u64,
    garbage: Vec<MessageId>,
    observed: Vec<BusEvent>,
}

impl UserState {
    pub fn new(delimiter: String, limits: ImapLimits) -> Self {
        UserState {
            delimiter,
            limits,
            mailboxes: BTreeMap::new(),
            names: BTreeMap::new(),
            messages: HashMap::new(),
            remote_messages: HashMap::new(),
            remote_mailboxes: HashMap::new(),
            recovery_hashes: HashMap::new(),
            subscriptions: BTreeSet::new(),
            snapshots: BTreeMap::new(),
            next_mailbox_id: 1,
            garbage: Vec::new(),
            observed: Vec::new(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn mailbox(&self, id: MailboxId) -> Result<&MailboxRecord, Error> {
        self.mailboxes.get(&id).ok_or(Error::NxMailbox)
    }

    pub fn mailbox_by_name(&self, name: &str) -> Result<&MailboxRecord, Error> {
        self.names
            .get(name)
            .and_then(|id| self.mailboxes.get(id))
            .ok_or(Error::NxMailbox)
    }

    pub fn mailbox_by_remote(&self, id: &RemoteMailboxId) -> Option<MailboxId> {
        self.remote_mailboxes.get(id).copied()
    }

    /// All mailboxes, ordered by name.
    pub fn mailboxes(&self) -> impl Iterator<Item = &MailboxRecord> + '_ {
        self.names.values().filter_map(move |id| self.mailboxes.get(id))
    }

    pub fn recovery_mailbox(&self) -> Option<&MailboxRecord> {
        self.mailboxes.values().find(|mb| mb.recovery)
    }

    pub fn message(&self, id: MessageId) -> Result<&MessageRecord, Error> {
        self.messages.get(&id).ok_or(Error::NxMessage)
    }

    pub fn message_by_remote(&self, id: &RemoteMessageId) -> Option<MessageId> {
        self.remote_messages.get(id).copied()
    }

    /// If a message with the given recovery hash is still sitting in the
    /// recovery mailbox, return it.
    pub fn recovery_duplicate(&self, hash: &[u8; 32]) -> Option<MessageId> {
        let id = *self.recovery_hashes.get(hash)?;
        let recovery = self.recovery_mailbox()?;
        Some(id).filter(|&id| recovery.contains(id))
    }

    pub fn subscriptions(&self) -> &BTreeSet<String> {
        &self.subscriptions
    }

    pub fn subscribe(&mut self, name: String) {
        self.subscriptions.insert(name);
    }

    pub fn unsubscribe(&mut self, name: &str) -> bool {
        self.subscriptions.remove(name)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn knows_message(&self, id: MessageId) -> bool {
        self.messages.contains_key(&id)
    }

    /// Schedule the literal stored under `id` for deletion, unless `id` is a
    /// live message.
    pub fn discard_literal(&mut self, id: MessageId) {
        if !self.messages.contains_key(&id) {
            self.garbage.push(id);
        }
    }

    /// Record that `message` is known remotely as `remote`.
    pub fn link_remote(&mut self, message: MessageId, remote: RemoteMessageId) {
        let Some(record) = self.messages.get_mut(&message) else {
            return;
        };
        if record.remote.as_ref() == Some(&remote) {
            return;
        }

        if let Some(old) = record.remote.replace(remote.clone()) {
            self.remote_messages.remove(&old);
        }
        self.remote_messages.insert(remote, message);
    }

    /// Take the ids of messages destroyed since the last call, whose
    /// literals should now be deleted.
    pub fn take_garbage(&mut self) -> Vec<MessageId> {
        std::mem::take(&mut self.garbage)
    }

    pub fn take_observed(&mut self) -> Vec<BusEvent> {
        std::mem::take(&mut self.observed)
    }

    pub fn status(&self, request: &StatusRequest) -> Result<StatusResponse, Error> {
        let mb = self.mailbox_by_name(&request.name)?;
        let unseen = || {
            mb.rows
                .values()
                .filter(|row| {
                    self.messages
                        .get(&row.message)
                        .map_or(false, |m| !m.flags.contains(&Flag::Seen))
                })
                .count()
        };

        Ok(StatusResponse {
            name: request.name.clone(),
            messages: Some(mb.rows.len()).filter(|_| request.messages),
            recent: Some(
                mb.rows.values().filter(|row| !row.recent_claimed).count(),
            )
            .filter(|_| request.recent),
            uidnext: Some(mb.uidnext()).filter(|_| request.uidnext),
            uidvalidity: Some(mb.uid_validity).filter(|_| request.uidvalidity),
            unseen: if request.unseen { Some(unseen()) } else { None },
        })
    }

    /// The full flag set (including `\Deleted`) a mailbox row shows.
    pub fn flags_of(&self, row: &Row) -> FlagSet {
        let mut flags = self
            .messages
            .get(&row.message)
            .map(|m| m.flags.clone())
            .unwrap_or_default();
        if row.deleted {
            flags.insert(Flag::Deleted);
        }
        flags
    }

    pub fn create_mailbox(
        &mut self,
        name: String,
        remote: Option<RemoteMailboxId>,
        uid_validity: u32,
        recovery: bool,
    ) -> Result<MailboxId, Error> {
        if self.names.contains_key(&name) {
            return Err(Error::MailboxExists);
        }
        if let Some(ref remote) = remote {
            if self.remote_mailboxes.contains_key(remote) {
                return Err(Error::MailboxExists);
            }
        }
        self.limits.check_mailbox_count(self.mailboxes.len())?;
        self.limits.check_uid_validity(uid_validity)?;

        let id = MailboxId(self.next_mailbox_id);
        self.next_mailbox_id += 1;

        if let Some(ref remote) = remote {
            self.remote_mailboxes.insert(remote.clone(), id);
        }
        self.names.insert(name.clone(), id);
        self.mailboxes.insert(
            id,
            MailboxRecord {
                id,
                name: name.clone(),
                remote,
                uid_validity,
                next_uid: 1,
                rows: BTreeMap::new(),
                by_message: HashMap::new(),
                recovery,
            },
        );
        self.observed.push(BusEvent::MailboxCreated { name });
        Ok(id)
    }

    /// Rename `id` and all its inferiors.
    pub fn rename_mailbox(
        &mut self,
        id: MailboxId,
        new_name: String,
    ) -> Result<(), Error> {
        let old_name = self.mailbox(id)?.name.clone();
        if old_name == new_name {
            return Ok(());
        }

        let prefix = format!("{}{}", old_name, self.delimiter);
        let renames: Vec<(MailboxId, String, String)> = self
            .names
            .iter()
            .filter_map(|(name, &mid)| {
                if mid == id {
                    Some((mid, name.clone(), new_name.clone()))
                } else if !self.delimiter.is_empty() && name.starts_with(&prefix)
                {
                    Some((
                        mid,
                        name.clone(),
                        format!(
                            "{}{}{}",
                            new_name,
                            self.delimiter,
                            &name[prefix.len()..]
                        ),
                    ))
                } else {
                    None
                }
            })
            .collect();

        let moving: BTreeSet<MailboxId> =
            renames.iter().map(|&(mid, _, _)| mid).collect();
        for (_, _, ref to) in &renames {
            if let Some(existing) = self.names.get(to) {
                if !moving.contains(existing) {
                    return Err(Error::MailboxExists);
                }
            }
        }

        for (_, ref from, _) in &renames {
            self.names.remove(from);
        }
        for (mid, from, to) in renames {
            self.names.insert(to.clone(), mid);
            if let Some(mb) = self.mailboxes.get_mut(&mid) {
                mb.name = to.clone();
            }
            self.observed.push(BusEvent::MailboxRenamed { from, to });
        }

        Ok(())
    }

    /// Delete one mailbox. Inferiors are untouched.
    pub fn delete_mailbox(&mut self, id: MailboxId) -> Result<(), Error> {
        let mb = self.mailboxes.remove(&id).ok_or(Error::NxMailbox)?;
        self.names.remove(&mb.name);
        if let Some(ref remote) = mb.remote {
            self.remote_mailboxes.remove(remote);
        }

        for registration in self.snapshots.values() {
            if registration.mailbox == id {
                let _ = registration.events.send(SnapshotEvent::MailboxDeleted);
            }
        }

        for row in mb.rows.values() {
            if let Some(message) = self.messages.get_mut(&row.message) {
                message.mailboxes.remove(&id);
            }
            self.gc(row.message);
        }

        self.observed
            .push(BusEvent::MailboxDeleted { name: mb.name });
        Ok(())
    }

    /// Create message records for `messages` (or resolve them to existing
    /// ones) and add them all to `mailbox`.
    ///
    /// A new message whose remote id is already known becomes a reference to
    /// the existing message. A message whose id is already known is updated
    /// with the new remote id and size. A recovery stash whose hash matches
    /// a message still in the recovery mailbox resolves to that message.
    pub fn insert_messages(
        &mut self,
        mailbox: MailboxId,
        messages: Vec<NewMessage>,
    ) -> Result<Added, Error> {
        if !self.mailboxes.contains_key(&mailbox) {
            for message in &messages {
                if !self.messages.contains_key(&message.id) {
                    self.garbage.push(message.id);
                }
            }
            return Err(Error::NxMailbox);
        }

        let mut targets = Vec::with_capacity(messages.len());
        let mut created = Vec::new();
        for message in messages {
            let existing = message
                .remote_id
                .as_ref()
                .and_then(|r| self.remote_messages.get(r).copied())
                .or_else(|| {
                    message
                        .recovery_hash
                        .as_ref()
                        .and_then(|h| self.recovery_duplicate(h))
                });

            if let Some(existing) = existing {
                if existing != message.id
                    && !self.messages.contains_key(&message.id)
                {
                    self.garbage.push(message.id);
                }
                targets.push((existing, message.deleted));
                continue;
            }

            if let Some(record) = self.messages.get_mut(&message.id) {
                if let Some(ref remote) = message.remote_id {
                    if let Some(ref old) = record.remote {
                        self.remote_messages.remove(old);
                    }
                    self.remote_messages.insert(remote.clone(), message.id);
                    record.remote = Some(remote.clone());
                }
                record.size = message.size;
                targets.push((message.id, message.deleted));
                continue;
            }

            if let Some(ref remote) = message.remote_id {
                self.remote_messages.insert(remote.clone(), message.id);
            }
            if let Some(hash) = message.recovery_hash {
                self.recovery_hashes.insert(hash, message.id);
            }
            let mut flags = message.flags;
            flags.take_deleted();
            self.messages.insert(
                message.id,
                MessageRecord {
                    id: message.id,
                    remote: message.remote_id,
                    flags,
                    internal_date: message.internal_date,
                    size: message.size,
                    mailboxes: BTreeSet::new(),
                    pool_refs: 0,
                    recovery_hash: message.recovery_hash,
                },
            );
            created.push(message.id);
            targets.push((message.id, message.deleted));
        }

        let result = self.add_messages(mailbox, &targets);
        if result.is_err() {
            for id in created {
                self.gc(id);
            }
        }
        result
    }

    /// Add existing messages to `mailbox`, assigning UIDs in order.
    ///
    /// Messages already present keep their UIDs and are reported in
    /// `existing`.
    pub fn add_messages(
        &mut self,
        mailbox: MailboxId,
        messages: &[(MessageId, bool)],
    ) -> Result<Added, Error> {
        let mb = self.mailboxes.get_mut(&mailbox).ok_or(Error::NxMailbox)?;

        let mut added = Added::default();
        let mut seen = BTreeSet::new();
        let mut to_add = Vec::new();
        for &(message, deleted) in messages {
            if !self.messages.contains_key(&message) {
                return Err(Error::NxMessage);
            }

            if let Some(uid) = mb.uid_of(message) {
                added.existing.push((message, uid));
            } else if seen.insert(message) {
                to_add.push((message, deleted));
            }
        }

        self.limits
            .check_message_count(mb.rows.len(), to_add.len())?;
        if !to_add.is_empty() {
            let next = u32::try_from(mb.next_uid)
                .ok()
                .and_then(Uid::of)
                .ok_or(Error::UidSpaceExhausted)?;
            self.limits.check_uids(next, to_add.len())?;
        }

        // The first snapshot to observe an arrival gets \Recent for it.
        let recipient = self
            .snapshots
            .iter()
            .find(|(_, r)| r.mailbox == mailbox)
            .map(|(&id, _)| id);

        for (message, deleted) in to_add {
            let Some(uid) = u32::try_from(mb.next_uid).ok().and_then(Uid::of)
            else {
                return Err(Error::UidSpaceExhausted);
            };
            mb.next_uid += 1;
            mb.rows.insert(
                uid,
                Row {
                    message,
                    deleted,
                    recent_claimed: recipient.is_some(),
                },
            );
            mb.by_message.insert(message, uid);

            let mut flags = FlagSet::new();
            if let Some(record) = self.messages.get_mut(&message) {
                record.mailboxes.insert(mailbox);
                flags = record.flags.clone();
            }
            if deleted {
                flags.insert(Flag::Deleted);
            }

            for (&sid, registration) in &self.snapshots {
                if registration.mailbox != mailbox {
                    continue;
                }

                let _ = registration.events.send(SnapshotEvent::Appended {
                    uid,
                    message,
                    flags: flags.clone(),
                    recent: Some(sid) == recipient,
                });
            }

            added.fresh.push((message, uid));
        }

        if !added.fresh.is_empty() {
            self.observed.push(BusEvent::MessagesAdded {
                mailbox: mb.name.clone(),
                count: added.fresh.len(),
            });
        }

        Ok(added)
    }

    /// Remove messages from `mailbox`, returning the UIDs they had.
    ///
    /// Messages not in the mailbox are ignored.
    pub fn remove_messages(
        &mut self,
        mailbox: MailboxId,
        messages: &[MessageId],
    ) -> Result<Vec<Uid>, Error> {
        let mb = self.mailboxes.get_mut(&mailbox).ok_or(Error::NxMailbox)?;

        let mut removed = Vec::new();
        for &message in messages {
            let Some(uid) = mb.by_message.remove(&message) else {
                continue;
            };
            mb.rows.remove(&uid);
            removed.push(uid);

            if let Some(record) = self.messages.get_mut(&message) {
                record.mailboxes.remove(&mailbox);
                for registration in self.snapshots.values() {
                    if registration.mailbox == mailbox
                        && registration
                            .events
                            .send(SnapshotEvent::Expunged { uid, message })
                            .is_ok()
                    {
                        record.pool_refs += 1;
                    }
                }

                if mb.recovery {
                    if let Some(hash) = record.recovery_hash {
                        self.recovery_hashes.remove(&hash);
                    }
                }
            }
        }

        if !removed.is_empty() {
            self.observed.push(BusEvent::MessagesRemoved {
                mailbox: mb.name.clone(),
                count: removed.len(),
            });
        }

        for &message in messages {
            self.gc(message);
        }

        removed.sort_unstable();
        Ok(removed)
    }

    /// Apply `change` to `message`.
    ///
    /// `\Deleted` only affects the row in `mailbox`; everything else affects
    /// the message in every mailbox. Snapshots are told about whatever
    /// actually changed; `origin` is not told if `silent`.
    pub fn change_flags(
        &mut self,
        message: MessageId,
        mailbox: Option<MailboxId>,
        change: &FlagChange,
        origin: Option<SnapshotId>,
        silent: bool,
    ) {
        let (deleted, rest) = change.split_deleted();

        let Some(record) = self.messages.get_mut(&message) else {
            return;
        };

        let new_flags = rest.apply(&record.flags);
        let message_changed = !new_flags.same_as(&record.flags);
        if message_changed {
            record.flags = new_flags;
        }

        let mut row_changed = false;
        if let (Some(mailbox), Some(deleted)) = (mailbox, deleted) {
            if let Some(mb) = self.mailboxes.get_mut(&mailbox) {
                if let Some(uid) = mb.by_message.get(&message).copied() {
                    if let Some(row) = mb.rows.get_mut(&uid) {
                        if row.deleted != deleted {
                            row.deleted = deleted;
                            row_changed = true;
                        }
                    }
                }
            }
        }

        let affected: Vec<MailboxId> = if message_changed {
            record.mailboxes.iter().copied().collect()
        } else if row_changed {
            mailbox.into_iter().collect()
        } else {
            return;
        };

        if message_changed {
            self.observed.push(BusEvent::FlagsChanged {
                remote: record.remote.clone(),
                flags: record.flags.clone(),
            });
        }

        for mailbox in affected {
            let Some(mb) = self.mailboxes.get(&mailbox) else {
                continue;
            };
            let Some(uid) = mb.uid_of(message) else {
                continue;
            };
            let Some(row) = mb.rows.get(&uid) else {
                continue;
            };

            let flags = self.flags_of(row);
            for (&sid, registration) in &self.snapshots {
                if registration.mailbox == mailbox {
                    let _ =
                        registration.events.send(SnapshotEvent::FlagsChanged {
                            uid,
                            flags: flags.clone(),
                            report: !(silent && Some(sid) == origin),
                        });
                }
            }
        }
    }

    /// Remove messages from every mailbox.
    pub fn delete_messages(&mut self, messages: &[MessageId]) -> usize {
        let mut count = 0;
        for &message in messages {
            let mailboxes: Vec<MailboxId> = self
                .messages
                .get(&message)
                .map(|m| m.mailboxes.iter().copied().collect())
                .unwrap_or_default();
            for mailbox in mailboxes {
                if self.remove_messages(mailbox, &[message]).is_ok() {
                    count += 1;
                }
            }
        }

        if count > 0 {
            self.observed.push(BusEvent::MessagesDeleted { count });
        }
        count
    }

    /// Make the remotely-backed mailboxes containing `message` exactly those
    /// named by `labels`. Unknown labels are ignored; purely local mailboxes
    /// are left alone.
    pub fn sync_membership(
        &mut self,
        message: MessageId,
        labels: &[RemoteMailboxId],
    ) -> Result<(), Error> {
        let wanted: BTreeSet<MailboxId> = labels
            .iter()
            .filter_map(|l| self.remote_mailboxes.get(l).copied())
            .collect();
        let current: BTreeSet<MailboxId> = self
            .message(message)?
            .mailboxes
            .iter()
            .copied()
            .filter(|mb| {
                self.mailboxes.get(mb).map_or(false, |mb| mb.remote.is_some())
            })
            .collect();

        for &mailbox in wanted.difference(&current) {
            self.add_messages(mailbox, &[(message, false)])?;
        }
        for &mailbox in current.difference(&wanted) {
            self.remove_messages(mailbox, &[message])?;
        }
        Ok(())
    }

    /// Register a new snapshot selecting the mailbox called `name`.
    ///
    /// Every row no snapshot has claimed yet becomes `\Recent` in this one.
    pub fn register_snapshot(&mut self, name: &str) -> Result<SnapshotSeed, Error> {
        let mailbox = self.mailbox_by_name(name)?.id;
        let id = SnapshotId(NEXT_SNAPSHOT_ID.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();

        let messages = &self.messages;
        let mb = self.mailboxes.get_mut(&mailbox).ok_or(Error::NxMailbox)?;
        let rows = mb
            .rows
            .iter_mut()
            .map(|(&uid, row)| {
                let recent = !row.recent_claimed;
                row.recent_claimed = true;

                let mut flags = messages
                    .get(&row.message)
                    .map(|m| m.flags.clone())
                    .unwrap_or_default();
                if row.deleted {
                    flags.insert(Flag::Deleted);
                }
                (uid, row.message, flags, recent)
            })
            .collect();

        let seed = SnapshotSeed {
            id,
            mailbox,
            uid_validity: mb.uid_validity,
            uidnext: mb.uidnext(),
            rows,
            events: rx,
        };

        self.snapshots.insert(
            id,
            Registration {
                mailbox,
                events: tx,
            },
        );
        Ok(seed)
    }

    /// Forget a snapshot, releasing the deletion pool references it held.
    pub fn unregister_snapshot(
        &mut self,
        id: SnapshotId,
        pool: impl IntoIterator<Item = MessageId>,
    ) {
        self.snapshots.remove(&id);
        self.release(pool);
    }

    /// Release deletion pool references.
    pub fn release(&mut self, messages: impl IntoIterator<Item = MessageId>) {
        for message in messages {
            if let Some(record) = self.messages.get_mut(&message) {
                record.pool_refs = record.pool_refs.saturating_sub(1);
            }
            self.gc(message);
        }
    }

    fn gc(&mut self, message: MessageId) {
        let dead = self
            .messages
            .get(&message)
            .map_or(false, |m| m.mailboxes.is_empty() && 0 == m.pool_refs);
        if !dead {
            return;
        }

        if let Some(record) = self.messages.remove(&message) {
            if let Some(remote) = record.remote {
                self.remote_messages.remove(&remote);
            }
            if let Some(hash) = record.recovery_hash {
                if self.recovery_hashes.get(&hash) == Some(&message) {
                    self.recovery_hashes.remove(&hash);
                }
            }
            self.garbage.push(message);
        }
    }
}

/// Whether the intake task should be draining the host's update channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntakeState {
    Running,
    Paused,
    Stopped,
}

/// Everything the gateway knows about one user, shared by all of that
/// user's sessions, the bus pump, and the intake task.
pub struct User {
    pub name: String,
    state: Mutex<UserState>,
    pub(crate) bus: Bus,
    pub(crate) adapter: Arc<dyn RemoteAdapter>,
    pub(crate) literals: LiteralStore,
    pub(crate) config: Arc<SystemConfig>,
    pub(crate) uid_validity: Arc<dyn UidValidityGenerator>,
    pub(crate) reporter: Arc<dyn Reporter>,
    intake: watch::Sender<IntakeState>,
}

impl User {
    /// Set up the user and start its bus pump and intake task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        name: String,
        adapter: Arc<dyn RemoteAdapter>,
        updates: mpsc::Receiver<RemoteUpdate>,
        config: Arc<SystemConfig>,
        uid_validity: Arc<dyn UidValidityGenerator>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Arc<Self>, Error> {
        let literals = match config.data_dir {
            Some(ref dir) => LiteralStore::open(dir.join(&name))?,
            None => LiteralStore::in_memory(),
        };
        // Metadata is not persisted, so every literal already on disk is an
        // orphan.
        literals.collect_orphans(|_| false)?;

        let mut state =
            UserState::new(config.delimiter.clone(), config.limits);
        state.create_mailbox(
            "INBOX".to_owned(),
            Some(adapter.inbox_label()),
            uid_validity.generate()?,
            false,
        )?;
        state.subscribe("INBOX".to_owned());
        state.take_observed();

        let (intake, intake_rx) = watch::channel(IntakeState::Running);
        let user = Arc::new(User {
            name,
            state: Mutex::new(state),
            bus: Bus::new(config.bus_capacity),
            adapter,
            literals,
            config,
            uid_validity,
            reporter,
            intake,
        });

        tokio::spawn(bus::run_pump(Arc::clone(&user)));
        tokio::spawn(bus::run_intake(Arc::clone(&user), updates, intake_rx));
        info!("Started update bus for {}", user.name);
        Ok(user)
    }

    pub fn lock(&self) -> MutexGuard<'_, UserState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Publish `kind` on the bus and wait for it to be applied.
    pub async fn apply(
        &self,
        kind: UpdateKind,
        origin: Option<SnapshotId>,
    ) -> Result<Applied, Error> {
        self.bus.publish(kind, origin).await?.wait().await
    }

    /// Release deletion pool references and delete any literals that freed.
    pub fn release(&self, messages: impl IntoIterator<Item = MessageId>) {
        let garbage = {
            let mut state = self.lock();
            state.release(messages);
            state.take_garbage()
        };
        self.delete_literals(garbage);
    }

    pub(crate) fn delete_literals(&self, ids: Vec<MessageId>) {
        for id in ids {
            if let Err(e) = self.literals.remove(id) {
                warn!("{}: Failed to delete literal {}: {}", self.name, id, e);
            }
        }
    }

    pub async fn pause(&self) {
        self.adapter.pause().await;
        let _ = self.intake.send(IntakeState::Paused);
    }

    pub async fn resume(&self) {
        self.adapter.resume().await;
        let _ = self.intake.send(IntakeState::Running);
    }

    /// Stop the intake task and close the bus. The pump exits once it has
    /// drained what is already queued.
    pub fn shut_down(&self) {
        let _ = self.intake.send(IntakeState::Stopped);
        self.bus.close();
    }
}
