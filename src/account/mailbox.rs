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
//! The handle a session holds while it has a mailbox selected.
//!
//! Every operation first folds in whatever snapshot events have arrived, so
//! the snapshot reflects every update the bus has applied so far. Mutations
//! go through the remote adapter first and then through the update bus; the
//! handle waits for the bus to apply them before returning, so their effects
//! are visible in the snapshot by the time the command responds.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::prelude::*;
use log::{debug, warn};
use tokio::sync::mpsc;

use super::bus::{Completion, UpdateKind};
use super::mailbox_state::MailboxState;
use super::model::*;
use super::recovery;
use super::search::{self, ContentData, SearchData};
use super::user::{SnapshotEvent, User};
use crate::mime::fetch::bodystructure::BodyStructure;
use crate::mime::fetch::envelope::Envelope;
use crate::mime::fetch::section::BodySection;
use crate::mime::part::Part;
use crate::remote::context::RequestContext;
use crate::support::error::Error;

/// One piece of data returned by `FETCH`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchedItem {
    Uid(Uid),
    Flags { flags: Vec<Flag>, recent: bool },
    Rfc822Size(usize),
    InternalDate(DateTime<FixedOffset>),
    Envelope(Envelope),
    /// `BODYSTRUCTURE`, with extension data.
    BodyStructure(BodyStructure),
    /// `BODY`, without extension data.
    Body(BodyStructure),
    Section(BodySection, Vec<u8>),
}

/// Everything fetched for one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedMessage {
    pub seqnum: Seqnum,
    pub uid: Uid,
    pub items: Vec<FetchedItem>,
}

pub struct SelectedMailbox {
    user: Arc<User>,
    ctx: RequestContext,
    id: SnapshotId,
    mailbox: MailboxId,
    read_only: bool,
    state: MailboxState,
    events: mpsc::UnboundedReceiver<SnapshotEvent>,
}

impl SelectedMailbox {
    /// Select the mailbox called `name`.
    pub fn select(
        user: Arc<User>,
        ctx: RequestContext,
        name: &str,
        read_only: bool,
    ) -> Result<(Self, SelectResponse), Error> {
        let seed = user.lock().register_snapshot(name)?;
        let state = MailboxState::new(&seed);

        let this = SelectedMailbox {
            user,
            ctx,
            id: seed.id,
            mailbox: seed.mailbox,
            read_only,
            state,
            events: seed.events,
        };

        let response = SelectResponse {
            flags: this.state.flags(),
            exists: this.state.num_messages(),
            recent: this.state.count_recent(),
            unseen: this.state.first_unseen(),
            uidnext: this.state.uidnext(),
            uidvalidity: this.state.uid_validity(),
            read_only,
        };

        debug!(
            "{}: Snapshot {:?} selected {} ({} messages)",
            this.user.name, this.id, name, response.exists
        );
        Ok((this, response))
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Replace the request context, e.g. after `ID`.
    pub fn set_context(&mut self, ctx: RequestContext) {
        self.ctx = ctx;
    }

    /// Whether the mailbox was deleted while selected.
    pub fn mailbox_deleted(&self) -> bool {
        self.state.mailbox_deleted()
    }

    pub fn has_pending_expunge(&self) -> bool {
        self.state.has_pending_expunge()
    }

    pub fn max_seqnum(&self) -> u32 {
        self.state.max_seqnum().map_or(0, u32::from)
    }

    pub fn max_uid(&self) -> u32 {
        self.state.max_uid().map_or(0, u32::from)
    }

    fn ingest(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.state.apply(event);
        }
    }

    /// Wait until the user state has told this snapshot something.
    ///
    /// Cancel-safe.
    pub async fn wait_for_change(&mut self) {
        match self.events.recv().await {
            Some(event) => {
                self.state.apply(event);
                self.ingest();
            }
            // Cannot happen while registered; don't spin if it does
            None => futures::future::pending::<()>().await,
        }
    }

    /// Perform a full poll, bringing the sequence number regime up to date.
    pub fn poll(&mut self) -> PollResponse {
        self.ingest();
        let (response, released) = self.state.poll();
        if !released.is_empty() {
            self.user.release(released);
        }
        response
    }

    /// Report flag changes without touching sequence numbers.
    pub fn mini_poll(&mut self) -> PollResponse {
        self.ingest();
        self.state.mini_poll()
    }

    /// Build the unsolicited `FETCH` responses for flag changes.
    pub fn flag_report(&self, uids: &[Uid], with_uid: bool) -> Vec<FetchedMessage> {
        uids.iter()
            .filter_map(|&uid| {
                let seqnum = self.state.uid_to_seqnum(uid).ok()?;
                let entry = self.state.entry(uid)?;
                let mut items = Vec::with_capacity(2);
                if with_uid {
                    items.push(FetchedItem::Uid(uid));
                }
                items.push(FetchedItem::Flags {
                    flags: entry.flags.iter().collect(),
                    recent: entry.recent,
                });
                Some(FetchedMessage { seqnum, uid, items })
            })
            .collect()
    }

    /// The `FETCH` command.
    pub async fn seqnum_fetch(
        &mut self,
        request: FetchRequest<Seqnum>,
    ) -> Result<Vec<FetchedMessage>, Error> {
        self.ingest();
        let ids = self.state.seqnum_range_to_uid(&request.ids, false)?;
        let FetchRequest {
            uid,
            flags,
            rfc822size,
            internal_date,
            envelope,
            bodystructure,
            body,
            sections,
            set_seen,
            ..
        } = request;

        self.fetch(&FetchRequest {
            ids,
            uid,
            flags,
            rfc822size,
            internal_date,
            envelope,
            bodystructure,
            body,
            sections,
            set_seen,
        })
        .await
    }

    /// The `UID FETCH` command.
    ///
    /// UIDs that do not exist are silently ignored.
    pub async fn fetch(
        &mut self,
        request: &FetchRequest<Uid>,
    ) -> Result<Vec<FetchedMessage>, Error> {
        self.ingest();
        let uids: Vec<Uid> = self
            .state
            .uid_range_to_extant(&request.ids)
            .items(u32::MAX)
            .collect();

        let mut forced_flags = Vec::new();
        if request.set_seen && !self.read_only {
            let unseen: Vec<(Uid, MessageId)> = uids
                .iter()
                .filter(|&&uid| !self.state.is_pending_expunge(uid))
                .filter_map(|&uid| {
                    self.state
                        .entry(uid)
                        .filter(|e| !e.flags.contains(&Flag::Seen))
                        .map(|e| (uid, e.message))
                })
                .collect();

            if !unseen.is_empty() {
                let seen: FlagSet = vec![Flag::Seen].into_iter().collect();
                self.change_flags(&unseen, &FlagChange::Add(seen), true)
                    .await?;
                forced_flags = unseen.into_iter().map(|(uid, _)| uid).collect();
            }
        }

        let needs_part = request.envelope
            || request.bodystructure
            || request.body
            || !request.sections.is_empty();
        let hidden_header = self.user.config.internal_id_header.clone();

        let mut fetched = Vec::with_capacity(uids.len());
        for uid in uids {
            let Ok(seqnum) = self.state.uid_to_seqnum(uid) else {
                continue;
            };
            let Some(entry) = self.state.entry(uid) else {
                continue;
            };

            let record = {
                let state = self.user.lock();
                state
                    .message(entry.message)
                    .map(|m| (m.size, m.internal_date))
            };
            let Ok((size, date)) = record else {
                debug!(
                    "{}: Message for UID {} vanished before fetch",
                    self.user.name,
                    u32::from(uid)
                );
                continue;
            };

            let mut items = Vec::new();
            if request.uid {
                items.push(FetchedItem::Uid(uid));
            }
            if request.flags || forced_flags.contains(&uid) {
                items.push(FetchedItem::Flags {
                    flags: entry.flags.iter().collect(),
                    recent: entry.recent,
                });
            }
            if request.rfc822size {
                items.push(FetchedItem::Rfc822Size(size));
            }
            if request.internal_date {
                items.push(FetchedItem::InternalDate(date));
            }

            if needs_part {
                let data = match self.user.literals.get(entry.message) {
                    Ok(data) => data,
                    Err(Error::NxMessage) => {
                        warn!(
                            "{}: Literal for {} is missing",
                            self.user.name, entry.message
                        );
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let root = Part::parse(&data);

                if request.envelope {
                    items.push(FetchedItem::Envelope(Envelope::extract(
                        &data,
                        &root.header,
                    )));
                }
                if request.bodystructure || request.body {
                    let structure = BodyStructure::extract(&data, &root);
                    if request.body {
                        items.push(FetchedItem::Body(structure.clone()));
                    }
                    if request.bodystructure {
                        items.push(FetchedItem::BodyStructure(structure));
                    }
                }
                for section in &request.sections {
                    let content = section.fetch(&data, &root, &hidden_header);
                    items.push(FetchedItem::Section(section.clone(), content));
                }
            }

            fetched.push(FetchedMessage { seqnum, uid, items });
        }

        Ok(fetched)
    }

    /// The `STORE` command.
    pub async fn seqnum_store(
        &mut self,
        request: &StoreRequest<'_, Seqnum>,
    ) -> Result<(), Error> {
        self.ingest();
        let ids = self.state.seqnum_range_to_uid(request.ids, false)?;
        self.store(&StoreRequest {
            ids: &ids,
            change: request.change.clone(),
            silent: request.silent,
        })
        .await
    }

    /// The `UID STORE` command.
    ///
    /// Messages in the deletion pool only have their cached flags updated,
    /// since there is nothing left to change.
    pub async fn store(
        &mut self,
        request: &StoreRequest<'_, Uid>,
    ) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::MailboxReadOnly);
        }

        self.ingest();
        let mut live = Vec::new();
        for uid in self.state.uid_range_to_extant(request.ids).items(u32::MAX) {
            let Some(entry) = self.state.entry(uid) else {
                continue;
            };

            if self.state.is_pending_expunge(uid) {
                let flags = request.change.apply(&entry.flags);
                if self.state.set_cached_flags(uid, flags) && !request.silent
                {
                    self.state.add_changed_flags_uid(uid);
                }
            } else {
                live.push((uid, entry.message));
            }
        }

        if live.is_empty() || request.change.is_noop() {
            return Ok(());
        }

        self.change_flags(&live, &request.change, request.silent)
            .await
    }

    /// Apply `change` to the given live messages, remotely and locally.
    async fn change_flags(
        &mut self,
        messages: &[(Uid, MessageId)],
        change: &FlagChange,
        silent: bool,
    ) -> Result<(), Error> {
        let (_, rest) = change.split_deleted();

        let mut seen = (Vec::new(), Vec::new());
        let mut flagged = (Vec::new(), Vec::new());
        {
            let state = self.user.lock();
            for &(_, message) in messages {
                let Ok(record) = state.message(message) else {
                    continue;
                };
                let Some(ref remote) = record.remote else {
                    continue;
                };

                let after = rest.apply(&record.flags);
                for (flag, (on, off)) in
                    [(Flag::Seen, &mut seen), (Flag::Flagged, &mut flagged)]
                {
                    match (record.flags.contains(&flag), after.contains(&flag)) {
                        (false, true) => on.push(remote.clone()),
                        (true, false) => off.push(remote.clone()),
                        _ => {}
                    }
                }
            }
        }

        let adapter = &self.user.adapter;
        for (ids, value) in [(&seen.0, true), (&seen.1, false)] {
            if !ids.is_empty() {
                adapter.mark_messages_seen(&self.ctx, ids, value).await?;
            }
        }
        for (ids, value) in [(&flagged.0, true), (&flagged.1, false)] {
            if !ids.is_empty() {
                adapter.mark_messages_flagged(&self.ctx, ids, value).await?;
            }
        }

        let mut completions = Vec::with_capacity(messages.len());
        for &(_, message) in messages {
            completions.push(
                self.user
                    .bus
                    .publish(
                        UpdateKind::FlagsChanged {
                            message,
                            mailbox: self.mailbox,
                            change: change.clone(),
                            silent,
                        },
                        Some(self.id),
                    )
                    .await?,
            );
        }
        wait_all(completions).await?;

        self.ingest();
        Ok(())
    }

    /// The `COPY` command.
    pub async fn seqnum_copy(
        &mut self,
        ids: &SeqRange<Seqnum>,
        dst: &str,
    ) -> Result<CopyResponse, Error> {
        self.ingest();
        let ids = self.state.seqnum_range_to_uid(ids, false)?;
        self.copy(&ids, dst).await
    }

    /// The `UID COPY` command.
    pub async fn copy(
        &mut self,
        ids: &SeqRange<Uid>,
        dst: &str,
    ) -> Result<CopyResponse, Error> {
        self.transfer(ids, dst, false).await
    }

    /// The `MOVE` command.
    pub async fn seqnum_move(
        &mut self,
        ids: &SeqRange<Seqnum>,
        dst: &str,
    ) -> Result<CopyResponse, Error> {
        self.ingest();
        let ids = self.state.seqnum_range_to_uid(ids, false)?;
        self.move_messages(&ids, dst).await
    }

    /// The `UID MOVE` command.
    ///
    /// The source messages are expunged from this snapshot's mailbox; the
    /// `EXPUNGE` responses come out at the next poll.
    pub async fn move_messages(
        &mut self,
        ids: &SeqRange<Uid>,
        dst: &str,
    ) -> Result<CopyResponse, Error> {
        if self.read_only {
            return Err(Error::MailboxReadOnly);
        }

        self.transfer(ids, dst, true).await
    }

    async fn transfer(
        &mut self,
        ids: &SeqRange<Uid>,
        dst: &str,
        remove: bool,
    ) -> Result<CopyResponse, Error> {
        self.ingest();

        // (uid, message, deleted, in pool)
        let sources: Vec<(Uid, MessageId, bool, bool)> = self
            .state
            .uid_range_to_extant(ids)
            .items(u32::MAX)
            .filter_map(|uid| {
                self.state.entry(uid).map(|e| {
                    (
                        uid,
                        e.message,
                        e.flags.contains(&Flag::Deleted),
                        self.state.is_pending_expunge(uid),
                    )
                })
            })
            .collect();

        let (dst_id, dst_remote, uid_validity, src_remote, remotes) = {
            let state = self.user.lock();
            let dst_mb = state.mailbox_by_name(dst)?;
            if dst_mb.recovery {
                return Err(Error::RecoveryMailboxReserved);
            }
            let src_remote = state.mailbox(self.mailbox)?.remote.clone();
            let remotes: HashMap<MessageId, Option<RemoteMessageId>> = sources
                .iter()
                .filter_map(|&(_, message, _, _)| {
                    state
                        .message(message)
                        .ok()
                        .map(|m| (message, m.remote.clone()))
                })
                .collect();
            (
                dst_mb.id,
                dst_mb.remote.clone(),
                dst_mb.uid_validity,
                src_remote,
                remotes,
            )
        };

        let mut to_move = Vec::new();
        let mut to_add = Vec::new();
        let mut local_only = Vec::new();
        for &(_, message, _, pooled) in &sources {
            match remotes.get(&message) {
                None => {}
                Some(None) => local_only.push(message),
                Some(Some(remote)) => {
                    if remove && !pooled && src_remote.is_some() {
                        to_move.push(remote.clone());
                    } else {
                        to_add.push(remote.clone());
                    }
                }
            }
        }

        let adapter = &self.user.adapter;
        if let Some(ref dst_remote) = dst_remote {
            if !to_add.is_empty() {
                adapter
                    .add_messages_to_mailbox(&self.ctx, &to_add, dst_remote)
                    .await?;
            }
            if let (false, Some(src_remote)) = (to_move.is_empty(), &src_remote)
            {
                adapter
                    .move_messages(&self.ctx, &to_move, src_remote, dst_remote)
                    .await?;
            }
        }

        let mut resolved: HashMap<MessageId, MessageId> = HashMap::new();
        for message in local_only {
            let backed =
                recovery::ingest(&self.user, &self.ctx, message, dst_id)
                    .await?;
            resolved.insert(message, backed);
        }

        let additions: Vec<(MessageId, bool)> = sources
            .iter()
            .filter(|&&(_, message, _, _)| remotes.contains_key(&message))
            .map(|&(_, message, deleted, _)| {
                (resolved.get(&message).copied().unwrap_or(message), deleted)
            })
            .collect();
        if additions.is_empty() {
            return Ok(CopyResponse {
                uid_validity,
                from_uids: SeqRange::new(),
                to_uids: SeqRange::new(),
            });
        }

        let applied = self
            .user
            .apply(
                UpdateKind::MessagesAdded {
                    mailbox: dst_id,
                    messages: additions,
                },
                Some(self.id),
            )
            .await?;

        if remove {
            let removals: Vec<MessageId> = sources
                .iter()
                .filter(|&&(_, _, _, pooled)| !pooled)
                .map(|&(_, message, _, _)| message)
                .collect();
            if !removals.is_empty() {
                self.user
                    .apply(
                        UpdateKind::MessagesRemoved {
                            mailbox: self.mailbox,
                            messages: removals,
                        },
                        Some(self.id),
                    )
                    .await?;
            }
        }
        self.ingest();

        let dst_uids: HashMap<MessageId, Uid> = applied
            .added
            .fresh
            .iter()
            .chain(applied.added.existing.iter())
            .copied()
            .collect();

        let mut from_uids = SeqRange::new();
        let mut to_uids = SeqRange::new();
        for &(uid, message, _, _) in &sources {
            let message = resolved.get(&message).copied().unwrap_or(message);
            if let Some(&dst_uid) = dst_uids.get(&message) {
                from_uids.append(uid);
                to_uids.append(dst_uid);
            }
        }

        Ok(CopyResponse {
            uid_validity,
            from_uids,
            to_uids,
        })
    }

    /// The `EXPUNGE` command.
    pub async fn expunge_all_deleted(&mut self) -> Result<(), Error> {
        self.expunge(None).await
    }

    /// The `UID EXPUNGE` command. A set matching nothing is not an error.
    pub async fn uid_expunge(&mut self, uids: &SeqRange<Uid>) -> Result<(), Error> {
        self.expunge(Some(uids)).await
    }

    async fn expunge(
        &mut self,
        filter: Option<&SeqRange<Uid>>,
    ) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::MailboxReadOnly);
        }

        self.ingest();
        let targets: Vec<MessageId> = self
            .state
            .uids()
            .filter(|&uid| filter.map_or(true, |f| f.contains(uid)))
            .filter(|&uid| !self.state.is_pending_expunge(uid))
            .filter_map(|uid| self.state.entry(uid))
            .filter(|e| e.flags.contains(&Flag::Deleted))
            .map(|e| e.message)
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        let (mailbox_remote, remote_ids) = {
            let state = self.user.lock();
            let remote = state.mailbox(self.mailbox)?.remote.clone();
            let ids: Vec<RemoteMessageId> = targets
                .iter()
                .filter_map(|&m| state.message(m).ok())
                .filter_map(|m| m.remote.clone())
                .collect();
            (remote, ids)
        };

        if let Some(ref mailbox_remote) = mailbox_remote {
            if !remote_ids.is_empty() {
                self.user
                    .adapter
                    .remove_messages_from_mailbox(
                        &self.ctx,
                        &remote_ids,
                        mailbox_remote,
                    )
                    .await?;
            }
        }

        self.user
            .apply(
                UpdateKind::MessagesRemoved {
                    mailbox: self.mailbox,
                    messages: targets,
                },
                Some(self.id),
            )
            .await?;
        self.ingest();
        Ok(())
    }

    /// The `CLOSE` command: silently expunge, then deselect.
    pub async fn close(mut self) -> Result<(), Error> {
        if !self.read_only {
            self.expunge_all_deleted().await?;
        }
        Ok(())
    }

    /// The `SEARCH` command.
    pub fn seqnum_search(
        &mut self,
        query: &SearchQuery,
    ) -> Result<Vec<Seqnum>, Error> {
        Ok(self.search(query)?.into_iter().map(|(s, _)| s).collect())
    }

    /// The `UID SEARCH` command.
    pub fn uid_search(&mut self, query: &SearchQuery) -> Result<Vec<Uid>, Error> {
        Ok(self.search(query)?.into_iter().map(|(_, u)| u).collect())
    }

    fn search(
        &mut self,
        query: &SearchQuery,
    ) -> Result<Vec<(Seqnum, Uid)>, Error> {
        self.ingest();
        let needs_literal = search::needs_literal(query);

        let mut hits = Vec::new();
        for (seqnum, uid) in self.state.seqnums_uids() {
            let Some(entry) = self.state.entry(uid) else {
                continue;
            };
            let record = self
                .user
                .lock()
                .message(entry.message)
                .map(|m| (m.size, m.internal_date));
            let Ok((size, internal_date)) = record else {
                continue;
            };

            let content = if needs_literal {
                match self.user.literals.get(entry.message) {
                    Ok(data) => Some(ContentData::extract(&data)),
                    Err(Error::NxMessage) => None,
                    Err(e) => return Err(e),
                }
            } else {
                None
            };

            let data = SearchData {
                seqnum,
                uid,
                flags: entry.flags.clone(),
                recent: entry.recent,
                size,
                internal_date,
                content,
            };
            if search::matches(query, &data) {
                hits.push((seqnum, uid));
            }
        }

        Ok(hits)
    }
}

impl Drop for SelectedMailbox {
    fn drop(&mut self) {
        let garbage = {
            let mut state = self.user.lock();
            // The pump only sends events with the lock held, so nothing can
            // slip in between draining and unregistering.
            while let Ok(event) = self.events.try_recv() {
                self.state.apply(event);
            }
            let pool = self.state.pool_messages();
            state.unregister_snapshot(self.id, pool);
            state.take_garbage()
        };
        self.user.delete_literals(garbage);
        debug!("{}: Snapshot {:?} released", self.user.name, self.id);
    }
}

async fn wait_all(completions: Vec<Completion>) -> Result<(), Error> {
    let mut result = Ok(());
    for completion in completions {
        if let Err(e) = completion.wait().await {
            result = Err(e);
        }
    }
    result
}
