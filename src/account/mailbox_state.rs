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
//! The snapshot engine: one selected session's private view of a mailbox.
//!
//! Nothing here does I/O; it's simply the pure state management. Changes made
//! to the user's shared state arrive as `SnapshotEvent`s, which are folded in
//! immediately but only become visible to the client's sequence number
//! regime when the state is flushed.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::mem;

use super::model::*;
use super::user::{SnapshotEvent, SnapshotSeed};
use crate::support::error::Error;

/// The view of one selected mailbox.
#[derive(Debug, Clone, Default)]
pub struct MailboxState {
    /// Every keyword this snapshot has seen on any message, in the order
    /// first observed. The system flags are implicit.
    keywords: Vec<Flag>,
    /// Set when `keywords` grows, so `* FLAGS` gets resent at the next poll.
    keywords_changed: bool,

    /// The UIDs of the messages the snapshot knows about.
    ///
    /// Sequence numbers correspond (with bias 1) to the elements in this array
    /// from 0..`len-unapplied_create`. The whole array is sorted ascending,
    /// since UIDs are assigned in order and the tail only ever grows.
    ///
    /// Expunged messages stay here until the next flush, which is what keeps
    /// them addressable while they sit in the deletion pool.
    extant_messages: Vec<Uid>,

    /// Per-UID state. Entries are removed at the flush that removes the UID
    /// from `extant_messages`.
    messages: HashMap<Uid, Entry>,

    /// The number of elements at the end of `extant_messages` which do not
    /// yet have sequence numbers.
    unapplied_create: usize,

    /// The deletion pool: UIDs which have left the mailbox but which the
    /// client has not been told about. Each entry holds a reference on its
    /// message that must be released once the entry is flushed.
    unapplied_expunge: Vec<(Uid, MessageId)>,

    /// UIDs whose flags changed since the last poll and should be reported.
    changed_flags_uids: Vec<Uid>,

    /// The greatest UID ever observed.
    max_uid: Option<Uid>,
    /// The `UIDNEXT` value at the time of selection.
    initial_uidnext: Uid,

    uid_validity: u32,
    /// Whether the mailbox was deleted out from under the snapshot.
    mailbox_deleted: bool,
}

/// What the snapshot knows about one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub message: MessageId,
    /// The flags as last observed, including `\Deleted`.
    pub flags: FlagSet,
    pub recent: bool,
}

/// The result of flushing the mailbox state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushResponse {
    /// The sequence numbers (using the *new* regime) and UIDs of messages
    /// which the client has not yet seen.
    pub new: Vec<(Seqnum, Uid)>,
    /// The sequence numbers (using the regime from *before* the flush) and
    /// UIDs of messages that have been expunged since the last flush. Only
    /// messages which had defined sequence numbers are included.
    ///
    /// This is sorted ascending. When providing `EXPUNGE` responses, the
    /// elements should be sent in the opposite order to avoid interference
    /// with the sequence numbers.
    pub expunged: Vec<(Seqnum, Uid)>,
    /// UIDs of messages that were expunged before they could get a sequence
    /// number. These are never reported to the client.
    pub stillborn: Vec<Uid>,
    /// Messages whose deletion pool references are no longer needed and must
    /// be released.
    pub released: Vec<MessageId>,
}

impl MailboxState {
    /// Build the initial state from what the user state handed out at
    /// selection time. Everything in the seed gets a sequence number right
    /// away.
    pub fn new(seed: &SnapshotSeed) -> Self {
        let mut state = MailboxState {
            initial_uidnext: seed.uidnext,
            uid_validity: seed.uid_validity,
            ..MailboxState::default()
        };

        for &(uid, message, ref flags, recent) in &seed.rows {
            state.insert(uid, message, flags.clone(), recent);
        }
        state.unapplied_create = 0;
        state.keywords_changed = false;
        state
    }

    /// Fold one event from the user state into this snapshot.
    pub fn apply(&mut self, event: SnapshotEvent) {
        match event {
            SnapshotEvent::Appended {
                uid,
                message,
                flags,
                recent,
            } => {
                if self.max_uid.map_or(true, |max| uid > max) {
                    self.insert(uid, message, flags, recent);
                }
            }

            SnapshotEvent::FlagsChanged { uid, flags, report } => {
                self.note_keywords(&flags);
                if let Some(entry) = self.messages.get_mut(&uid) {
                    entry.flags = flags;
                    if report {
                        self.changed_flags_uids.push(uid);
                    }
                }
            }

            SnapshotEvent::Expunged { uid, message } => {
                self.unapplied_expunge.push((uid, message));
            }

            SnapshotEvent::MailboxDeleted => {
                self.mailbox_deleted = true;
            }
        }
    }

    fn insert(
        &mut self,
        uid: Uid,
        message: MessageId,
        flags: FlagSet,
        recent: bool,
    ) {
        self.note_keywords(&flags);
        self.extant_messages.push(uid);
        self.unapplied_create += 1;
        self.max_uid = Some(uid);
        self.messages.insert(
            uid,
            Entry {
                message,
                flags,
                recent,
            },
        );
    }

    fn note_keywords(&mut self, flags: &FlagSet) {
        for kw in flags.keywords() {
            let flag = Flag::Keyword(kw.to_owned());
            if !self.keywords.contains(&flag) {
                self.keywords.push(flag);
                self.keywords_changed = true;
            }
        }
    }

    /// Bring the sequence number regime up to date.
    ///
    /// New UIDs become addressable through sequence numbers, and expunged
    /// messages lose their sequence numbers.
    pub fn flush(&mut self) -> FlushResponse {
        let mut unapplied_create = self.unapplied_create;

        let mut expunged_pairs: Vec<(Seqnum, Uid)> = Vec::new();
        let mut stillborn: Vec<Uid> = Vec::new();
        let mut released = Vec::new();
        if !self.unapplied_expunge.is_empty() {
            let max_index = self.num_messages();

            self.unapplied_expunge.sort_unstable_by_key(|&(uid, _)| uid);
            let mut uids: Vec<Uid> = Vec::with_capacity(
                self.unapplied_expunge.len(),
            );
            for (uid, message) in self.unapplied_expunge.drain(..) {
                released.push(message);
                uids.push(uid);
            }
            uids.dedup();

            for uid in &uids {
                self.messages.remove(uid);
            }

            let mut expunged = uids.into_iter().peekable();
            let mut index = 0;

            // This will also expunge things from the unapplied_create range;
            // those must not be reported since the client never got to see
            // them.
            self.extant_messages.retain(|&uid| loop {
                let next_expunged =
                    expunged.peek().copied().unwrap_or(Uid::MAX);
                match next_expunged.cmp(&uid) {
                    Ordering::Less => {
                        expunged.next();
                    }
                    Ordering::Equal => {
                        if index < max_index {
                            expunged_pairs
                                .push((Seqnum::from_index(index), uid));
                        } else {
                            unapplied_create -= 1;
                            stillborn.push(uid);
                        }
                        index += 1;
                        return false;
                    }
                    Ordering::Greater => {
                        index += 1;
                        return true;
                    }
                }
            });
        }

        let first_new = self.extant_messages.len() - unapplied_create;
        let new_message_pairs: Vec<(Seqnum, Uid)> = self.extant_messages
            [first_new..]
            .iter()
            .copied()
            .enumerate()
            .map(|(ix, uid)| (Seqnum::from_index(ix + first_new), uid))
            .collect();

        self.unapplied_create = 0;

        FlushResponse {
            new: new_message_pairs,
            expunged: expunged_pairs,
            stillborn,
            released,
        }
    }

    /// Perform a full poll: flush, then describe everything the client needs
    /// to hear about.
    ///
    /// The returned message ids are deletion pool references to release.
    pub fn poll(&mut self) -> (PollResponse, Vec<MessageId>) {
        let flush = self.flush();
        let mut expunge = flush.expunged;
        expunge.reverse();

        let new = !flush.new.is_empty();
        let response = PollResponse {
            expunge,
            exists: Some(self.num_messages()).filter(|_| new),
            recent: Some(self.count_recent()).filter(|_| new),
            fetch: self.take_reportable_flag_changes(),
            flags: self.take_flags_update(),
        };

        (response, flush.released)
    }

    /// Report only flag changes on messages the client can already address.
    ///
    /// Nothing is flushed, so sequence numbers stay stable.
    pub fn mini_poll(&mut self) -> PollResponse {
        PollResponse {
            fetch: self.take_reportable_flag_changes(),
            flags: self.take_flags_update(),
            ..PollResponse::default()
        }
    }

    fn take_reportable_flag_changes(&mut self) -> Vec<Uid> {
        let mut uids = self.take_changed_flags_uids();
        let mut deferred = Vec::new();
        uids.retain(|&uid| {
            if self.is_assigned_uid(uid) {
                true
            } else {
                // Not addressable yet; report once it is
                if self.messages.contains_key(&uid) {
                    deferred.push(uid);
                }
                false
            }
        });
        self.changed_flags_uids = deferred;
        uids
    }

    fn take_flags_update(&mut self) -> Option<Vec<Flag>> {
        if mem::replace(&mut self.keywords_changed, false) {
            Some(self.flags())
        } else {
            None
        }
    }

    /// Return whether there are any expunges the client has not heard about.
    pub fn has_pending_expunge(&self) -> bool {
        !self.unapplied_expunge.is_empty()
    }

    /// Return whether `uid` is in the deletion pool.
    pub fn is_pending_expunge(&self, uid: Uid) -> bool {
        self.unapplied_expunge.iter().any(|&(u, _)| u == uid)
    }

    /// The message ids of every deletion pool entry.
    pub fn pool_messages(&self) -> Vec<MessageId> {
        self.unapplied_expunge.iter().map(|&(_, m)| m).collect()
    }

    /// Return a vec of UIDs whose flags have changed since the last call to
    /// this function.
    pub fn take_changed_flags_uids(&mut self) -> Vec<Uid> {
        self.changed_flags_uids.sort_unstable();
        self.changed_flags_uids.dedup();
        mem::take(&mut self.changed_flags_uids)
    }

    /// Add the given UID to the next value that will be returned from
    /// `take_changed_flags_uids()`.
    pub fn add_changed_flags_uid(&mut self, uid: Uid) {
        self.changed_flags_uids.push(uid);
    }

    /// Replace the cached flags of `uid` without telling anyone else.
    ///
    /// Used for messages in the deletion pool, whose real flags no longer
    /// matter.
    pub fn set_cached_flags(&mut self, uid: Uid, flags: FlagSet) -> bool {
        self.note_keywords(&flags);
        match self.messages.get_mut(&uid) {
            Some(entry) if !entry.flags.same_as(&flags) => {
                entry.flags = flags;
                true
            }
            _ => false,
        }
    }

    /// Returns the number of messages currently addressable by sequence
    /// numbers.
    pub fn num_messages(&self) -> usize {
        self.extant_messages.len() - self.unapplied_create
    }

    /// Translate the given sequence number into a UID.
    ///
    /// On failure, return `Error::NxMessage`.
    pub fn seqnum_to_uid(&self, seqnum: Seqnum) -> Result<Uid, Error> {
        self.extant_messages[..self.num_messages()]
            .get(seqnum.to_index())
            .copied()
            .ok_or(Error::NxMessage)
    }

    /// Translate a `SeqRange<Seqnum>` to `SeqRange<Uid>`.
    ///
    /// If `silent` is true, errors will be silently swallowed and the call
    /// never fails. Otherwise, the first failure from `seqnum_to_uid()` is
    /// propagated.
    pub fn seqnum_range_to_uid(
        &self,
        seqnums: &SeqRange<Seqnum>,
        silent: bool,
    ) -> Result<SeqRange<Uid>, Error> {
        let mut ret = SeqRange::new();
        for seqnum in seqnums.items(u32::MAX) {
            match self.seqnum_to_uid(seqnum) {
                Ok(uid) => ret.append(uid),
                Err(_) if silent => (),
                Err(e) => return Err(e),
            }
        }

        Ok(ret)
    }

    /// Translate the given UID into a sequence number according to the current
    /// regime.
    ///
    /// On failure, return `Error::ExpungedMessage` if the UID is allocated but
    /// no longer exists, `Error::NxMessage` if the UID is not allocated, or
    /// `Error::UnaddressableMessage` if the UID references an existing message
    /// but is not accessible through the current sequence number regime.
    pub fn uid_to_seqnum(&self, uid: Uid) -> Result<Seqnum, Error> {
        if self.max_uid.map_or(true, |max| uid > max) {
            return Err(Error::NxMessage);
        }

        self.extant_messages[..self.num_messages()]
            .binary_search(&uid)
            .map(Seqnum::from_index)
            .map_err(|_| {
                if self.extant_messages[self.num_messages()..]
                    .binary_search(&uid)
                    .is_ok()
                {
                    Error::UnaddressableMessage
                } else {
                    Error::ExpungedMessage
                }
            })
    }

    /// Resolve a UID range to the UIDs the client can address, ignoring
    /// anything else.
    pub fn uid_range_to_extant(&self, uids: &SeqRange<Uid>) -> SeqRange<Uid> {
        let mut ret = SeqRange::new();
        for &uid in &self.extant_messages[..self.num_messages()] {
            if uids.contains(uid) {
                ret.append(uid);
            }
        }
        ret
    }

    /// Return whether the given UID currently has an assigned sequence number.
    pub fn is_assigned_uid(&self, uid: Uid) -> bool {
        self.extant_messages[..self.num_messages()]
            .binary_search(&uid)
            .is_ok()
    }

    /// The system flags followed by every keyword seen so far.
    pub fn flags(&self) -> Vec<Flag> {
        vec![
            Flag::Answered,
            Flag::Flagged,
            Flag::Deleted,
            Flag::Seen,
            Flag::Draft,
        ]
        .into_iter()
        .chain(self.keywords.iter().cloned())
        .collect()
    }

    pub fn entry(&self, uid: Uid) -> Option<&Entry> {
        self.messages.get(&uid)
    }

    pub fn uids(&self) -> impl Iterator<Item = Uid> + '_ {
        self.extant_messages[..self.num_messages()].iter().copied()
    }

    pub fn seqnums_uids(&'_ self) -> impl Iterator<Item = (Seqnum, Uid)> + '_ {
        self.uids()
            .enumerate()
            .map(|(ix, uid)| (Seqnum::from_index(ix), uid))
    }

    pub fn count_recent(&self) -> usize {
        self.uids()
            .filter(|uid| self.messages.get(uid).map_or(false, |e| e.recent))
            .count()
    }

    /// The sequence number of the first message without `\Seen`.
    pub fn first_unseen(&self) -> Option<Seqnum> {
        self.seqnums_uids()
            .find(|(_, uid)| {
                self.messages
                    .get(uid)
                    .map_or(false, |e| !e.flags.contains(&Flag::Seen))
            })
            .map(|(seqnum, _)| seqnum)
    }

    pub fn max_uid(&self) -> Option<Uid> {
        self.max_uid
    }

    pub fn max_seqnum(&self) -> Option<Seqnum> {
        match self.num_messages() {
            0 => None,
            n => Some(Seqnum::from_index(n - 1)),
        }
    }

    /// The UID the next message will probably get.
    pub fn uidnext(&self) -> Uid {
        match self.max_uid {
            Some(max) if max >= self.initial_uidnext => max.saturating_next(),
            _ => self.initial_uidnext,
        }
    }

    pub fn uid_validity(&self) -> u32 {
        self.uid_validity
    }

    pub fn mailbox_deleted(&self) -> bool {
        self.mailbox_deleted
    }
}
