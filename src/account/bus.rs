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

//! The per-user update bus.
//!
//! Every mutation of a user's state is expressed as an `UpdateKind`,
//! published onto that user's `Bus`, and applied by the user's single pump
//! task in queue order. Applying an update fans it out to every selected
//! snapshot of the user (via `UserState`) and then to the adapter's
//! `observe` sink.
//!
//! The queue is bounded; producers wait for space. While an update is still
//! queued, a later flag change to the same message (from the same origin)
//! or a later rename of the same mailbox is folded into it instead of
//! queuing a second entry. Everything else, expunges in particular, is
//! queued as-is and also acts as a barrier to folding across it.
//!
//! Each published update yields a `Completion`; awaiting it waits until the
//! update has been applied and reports what happened.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot, watch, Notify, Semaphore};

use super::literal_store;
use super::model::*;
use super::user::{Added, IntakeState, User, UserState};
use crate::remote::adapter::RemoteMessage;
use crate::remote::update::RemoteUpdate;
use crate::support::error::Error;

/// A message pushed by the host whose literal is already in the literal
/// store under `candidate`.
#[derive(Clone, Debug)]
pub struct RemoteArrival {
    pub candidate: MessageId,
    /// The id found in the internal-id header of the literal, if any.
    pub stamped: Option<MessageId>,
    pub message: RemoteMessage,
    pub size: usize,
}

#[derive(Clone, Debug)]
pub enum UpdateKind {
    MailboxCreated {
        name: String,
        remote: Option<RemoteMailboxId>,
        recovery: bool,
    },
    MailboxRenamed {
        mailbox: MailboxId,
        name: String,
    },
    MailboxDeleted {
        mailbox: MailboxId,
    },
    MessagesCreated {
        mailbox: MailboxId,
        messages: Vec<NewMessage>,
    },
    /// Add existing messages to a mailbox. The flag is `\Deleted` for the
    /// new row.
    MessagesAdded {
        mailbox: MailboxId,
        messages: Vec<(MessageId, bool)>,
    },
    MessagesRemoved {
        mailbox: MailboxId,
        messages: Vec<MessageId>,
    },
    FlagsChanged {
        message: MessageId,
        mailbox: MailboxId,
        change: FlagChange,
        silent: bool,
    },
    MessagesDeleted {
        messages: Vec<MessageId>,
    },
    RemoteArrivals(Vec<RemoteArrival>),
    Remote(RemoteUpdate),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CoalesceKey {
    Flags(MessageId, MailboxId, Option<SnapshotId>, bool),
    Rename(MailboxId),
}

impl UpdateKind {
    fn coalesce_key(&self, origin: Option<SnapshotId>) -> Option<CoalesceKey> {
        match *self {
            UpdateKind::FlagsChanged {
                message,
                mailbox,
                silent,
                ..
            } => Some(CoalesceKey::Flags(message, mailbox, origin, silent)),
            UpdateKind::MailboxRenamed { mailbox, .. } => {
                Some(CoalesceKey::Rename(mailbox))
            }
            _ => None,
        }
    }

    /// Whether folding a later update into one queued before this one could
    /// reorder effects.
    fn is_barrier(&self) -> bool {
        !matches!(
            *self,
            UpdateKind::FlagsChanged { .. } | UpdateKind::MailboxRenamed { .. }
        )
    }

    /// Produce the single update equivalent to `self` followed by `later`.
    fn merge(&self, later: &UpdateKind) -> Option<UpdateKind> {
        match (self, later) {
            (
                &UpdateKind::FlagsChanged {
                    message,
                    mailbox,
                    ref change,
                    silent,
                },
                &UpdateKind::FlagsChanged {
                    change: ref later_change,
                    ..
                },
            ) => change.then(later_change).map(|change| {
                UpdateKind::FlagsChanged {
                    message,
                    mailbox,
                    change,
                    silent,
                }
            }),
            (
                &UpdateKind::MailboxRenamed { mailbox, .. },
                &UpdateKind::MailboxRenamed { ref name, .. },
            ) => Some(UpdateKind::MailboxRenamed {
                mailbox,
                name: name.clone(),
            }),
            _ => None,
        }
    }
}

/// What applying an update did.
#[derive(Clone, Debug, Default)]
pub struct Applied {
    /// For `MailboxCreated`, the new mailbox.
    pub mailbox: Option<MailboxId>,
    /// For updates that add messages to a mailbox.
    pub added: Added,
    /// For `MessagesRemoved`, the UIDs that left the mailbox.
    pub removed: Vec<Uid>,
}

type Outcome = Result<Applied, Error>;

#[derive(Debug)]
pub struct Update {
    pub kind: UpdateKind,
    /// The snapshot whose session caused the update, if any.
    pub origin: Option<SnapshotId>,
    completions: Vec<oneshot::Sender<Outcome>>,
}

/// Resolves once the corresponding update has been applied.
#[derive(Debug)]
pub struct Completion(oneshot::Receiver<Outcome>);

impl Completion {
    pub async fn wait(self) -> Outcome {
        self.0.await.map_err(|_| Error::BusClosed)?
    }
}

#[derive(Debug, Default)]
struct Queue {
    entries: VecDeque<Update>,
    closed: bool,
}

impl Queue {
    /// Try to fold `kind` into a queued update. Returns the arguments back if
    /// that is not possible.
    fn coalesce(
        &mut self,
        kind: UpdateKind,
        origin: Option<SnapshotId>,
        completion: oneshot::Sender<Outcome>,
    ) -> Option<(UpdateKind, oneshot::Sender<Outcome>)> {
        let Some(key) = kind.coalesce_key(origin) else {
            return Some((kind, completion));
        };

        for entry in self.entries.iter_mut().rev() {
            if entry.kind.coalesce_key(entry.origin) == Some(key) {
                if let Some(merged) = entry.kind.merge(&kind) {
                    entry.kind = merged;
                    entry.completions.push(completion);
                    return None;
                }
                break;
            }

            if entry.kind.is_barrier() {
                break;
            }
        }

        Some((kind, completion))
    }
}

#[derive(Debug)]
pub struct Bus {
    queue: Mutex<Queue>,
    capacity: Semaphore,
    ready: Notify,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        Bus {
            queue: Mutex::new(Queue::default()),
            capacity: Semaphore::new(capacity.max(1)),
            ready: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Enqueue `kind`, waiting for space if the bus is full.
    pub async fn publish(
        &self,
        kind: UpdateKind,
        origin: Option<SnapshotId>,
    ) -> Result<Completion, Error> {
        let permit = self
            .capacity
            .acquire()
            .await
            .map_err(|_| Error::BusClosed)?;
        let (tx, rx) = oneshot::channel();

        {
            let mut queue = self.lock();
            if queue.closed {
                return Err(Error::BusClosed);
            }

            if let Some((kind, tx)) = queue.coalesce(kind, origin, tx) {
                queue.entries.push_back(Update {
                    kind,
                    origin,
                    completions: vec![tx],
                });
                // Returned by `next()` when the entry leaves the queue
                permit.forget();
            }
        }

        self.ready.notify_one();
        Ok(Completion(rx))
    }

    /// Take the next update, waiting for one if needed. Returns `None` once
    /// the bus is closed and drained.
    pub async fn next(&self) -> Option<Update> {
        loop {
            let ready = self.ready.notified();
            {
                let mut queue = self.lock();
                if let Some(update) = queue.entries.pop_front() {
                    self.capacity.add_permits(1);
                    return Some(update);
                }

                if queue.closed {
                    return None;
                }
            }
            ready.await;
        }
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.capacity.close();
        self.ready.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

/// Apply updates from `user`'s bus until it is closed.
pub(super) async fn run_pump(user: Arc<User>) {
    while let Some(update) = user.bus.next().await {
        let Update {
            kind,
            origin,
            completions,
        } = update;

        let (outcome, garbage, observed) = {
            let mut state = user.lock();
            let outcome = apply(&user, &mut state, kind, origin);
            (outcome, state.take_garbage(), state.take_observed())
        };

        user.delete_literals(garbage);
        for event in &observed {
            user.adapter.observe(event);
        }
        resolve(&user, completions, outcome);
    }

    debug!("Update bus for {} closed", user.name);
}

fn resolve(
    user: &User,
    completions: Vec<oneshot::Sender<Outcome>>,
    outcome: Outcome,
) {
    if let Err(ref e) = outcome {
        debug!("{}: Update failed: {}", user.name, e);
    }

    let mut completions = completions.into_iter();
    let Some(first) = completions.next() else {
        return;
    };

    for completion in completions {
        let _ = completion.send(match outcome {
            Ok(ref applied) => Ok(applied.clone()),
            Err(ref e) => Err(e.duplicate()),
        });
    }
    let _ = first.send(outcome);
}

fn apply(
    user: &User,
    state: &mut UserState,
    kind: UpdateKind,
    origin: Option<SnapshotId>,
) -> Outcome {
    let mut applied = Applied::default();
    match kind {
        UpdateKind::MailboxCreated {
            name,
            remote,
            recovery,
        } => {
            let uid_validity = user.uid_validity.generate()?;
            applied.mailbox =
                Some(state.create_mailbox(name, remote, uid_validity, recovery)?);
        }
        UpdateKind::MailboxRenamed { mailbox, name } => {
            state.rename_mailbox(mailbox, name)?;
        }
        UpdateKind::MailboxDeleted { mailbox } => {
            state.delete_mailbox(mailbox)?;
        }
        UpdateKind::MessagesCreated { mailbox, messages } => {
            applied.added = state.insert_messages(mailbox, messages)?;
        }
        UpdateKind::MessagesAdded { mailbox, messages } => {
            applied.added = state.add_messages(mailbox, &messages)?;
        }
        UpdateKind::MessagesRemoved { mailbox, messages } => {
            applied.removed = state.remove_messages(mailbox, &messages)?;
        }
        UpdateKind::FlagsChanged {
            message,
            mailbox,
            change,
            silent,
        } => {
            state.change_flags(message, Some(mailbox), &change, origin, silent);
        }
        UpdateKind::MessagesDeleted { messages } => {
            state.delete_messages(&messages);
        }
        UpdateKind::RemoteArrivals(arrivals) => {
            for arrival in arrivals {
                if let Err(e) = apply_arrival(state, arrival) {
                    warn!("{}: Dropping remote message: {}", user.name, e);
                }
            }
        }
        UpdateKind::Remote(update) => {
            apply_remote(user, state, update)?;
        }
    }

    Ok(applied)
}

fn apply_arrival(state: &mut UserState, arrival: RemoteArrival) -> Result<(), Error> {
    let RemoteArrival {
        candidate,
        stamped,
        message,
        size,
    } = arrival;

    let existing = state
        .message_by_remote(&message.id)
        .or_else(|| stamped.filter(|&id| state.knows_message(id)));
    if let Some(existing) = existing {
        state.discard_literal(candidate);
        state.link_remote(existing, message.id.clone());
        return apply_remote_message(state, existing, &message);
    }

    let mut labels = message
        .mailboxes
        .iter()
        .filter_map(|l| state.mailbox_by_remote(l));
    let Some(first) = labels.next() else {
        state.discard_literal(candidate);
        debug!("Ignoring remote message {} in no known mailbox", message.id);
        return Ok(());
    };

    state.insert_messages(
        first,
        vec![NewMessage {
            id: candidate,
            remote_id: Some(message.id.clone()),
            flags: message.flags.clone(),
            deleted: false,
            internal_date: message.internal_date,
            size,
            recovery_hash: None,
        }],
    )?;
    state.sync_membership(candidate, &message.mailboxes)
}

fn apply_remote_message(
    state: &mut UserState,
    id: MessageId,
    message: &RemoteMessage,
) -> Result<(), Error> {
    let mut flags = message.flags.clone();
    flags.take_deleted();
    state.change_flags(id, None, &FlagChange::Set(flags), None, false);
    state.sync_membership(id, &message.mailboxes)
}

fn apply_remote(
    user: &User,
    state: &mut UserState,
    update: RemoteUpdate,
) -> Result<(), Error> {
    match update {
        RemoteUpdate::MailboxCreated { id, path }
        | RemoteUpdate::MailboxUpdated { id, path } => {
            let name = path.join(state.delimiter());
            match state.mailbox_by_remote(&id) {
                Some(mailbox) => state.rename_mailbox(mailbox, name),
                None => {
                    let uid_validity = user.uid_validity.generate()?;
                    state
                        .create_mailbox(name, Some(id), uid_validity, false)
                        .map(|_| ())
                }
            }
        }
        RemoteUpdate::MailboxDeleted { id } => {
            let deletable = state
                .mailbox_by_remote(&id)
                .filter(|&mb| state.mailbox(mb).map_or(false, |mb| "INBOX" != mb.name));
            match deletable {
                Some(mailbox) => state.delete_mailbox(mailbox),
                None => Ok(()),
            }
        }
        RemoteUpdate::MessagesCreated(messages) => {
            // Normally converted by the intake task; handle it anyway in case
            // it arrives by another route.
            for (message, literal) in messages {
                let arrival = stash_arrival(user, message, &literal)?;
                apply_arrival(state, arrival)?;
            }
            Ok(())
        }
        RemoteUpdate::MessageUpdated(message) => {
            match state.message_by_remote(&message.id) {
                Some(id) => apply_remote_message(state, id, &message),
                None => Ok(()),
            }
        }
        RemoteUpdate::MessageMailboxesUpdated { id, mailboxes } => {
            match state.message_by_remote(&id) {
                Some(id) => state.sync_membership(id, &mailboxes),
                None => Ok(()),
            }
        }
        RemoteUpdate::MessageFlagsUpdated { id, mut flags } => {
            if let Some(id) = state.message_by_remote(&id) {
                flags.take_deleted();
                state.change_flags(id, None, &FlagChange::Set(flags), None, false);
            }
            Ok(())
        }
        RemoteUpdate::MessagesDeleted(ids) => {
            let ids: Vec<MessageId> = ids
                .iter()
                .filter_map(|id| state.message_by_remote(id))
                .collect();
            state.delete_messages(&ids);
            Ok(())
        }
    }
}

/// Put a remotely-supplied literal into the literal store under a fresh id.
fn stash_arrival(
    user: &User,
    message: RemoteMessage,
    literal: &[u8],
) -> Result<RemoteArrival, Error> {
    let candidate = MessageId::generate();
    user.literals.put(candidate, literal)?;
    Ok(RemoteArrival {
        candidate,
        stamped: literal_store::read_internal_id(
            literal,
            &user.config.internal_id_header,
        ),
        message,
        size: literal.len(),
    })
}

/// Drain the host's update channel into the bus, honouring pause/resume.
pub(super) async fn run_intake(
    user: Arc<User>,
    mut updates: mpsc::Receiver<RemoteUpdate>,
    mut control: watch::Receiver<IntakeState>,
) {
    loop {
        let state = *control.borrow();
        match state {
            IntakeState::Stopped => break,
            IntakeState::Paused => {
                if control.changed().await.is_err() {
                    break;
                }
                continue;
            }
            IntakeState::Running => {}
        }

        tokio::select! {
            // Control changes must win over a queued update
            biased;

            changed = control.changed() => {
                if changed.is_err() {
                    break;
                }
            }

            update = updates.recv() => {
                let Some(update) = update else {
                    break;
                };

                if let Err(e) = intake(&user, update).await {
                    warn!("{}: Failed to take remote update: {}", user.name, e);
                    if matches!(e, Error::BusClosed) {
                        break;
                    }
                }
            }
        }
    }

    debug!("Remote update intake for {} stopped", user.name);
}

async fn intake(user: &User, update: RemoteUpdate) -> Result<(), Error> {
    let kind = match update {
        RemoteUpdate::MessagesCreated(messages) => {
            let mut arrivals = Vec::with_capacity(messages.len());
            for (message, literal) in messages {
                arrivals.push(stash_arrival(user, message, &literal)?);
            }
            UpdateKind::RemoteArrivals(arrivals)
        }
        update => UpdateKind::Remote(update),
    };

    // Remote updates are fire-and-forget
    user.bus.publish(kind, None).await.map(|_| ())
}
