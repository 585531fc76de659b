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
//! The handle a session holds once it has logged in.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::prelude::*;
use log::{info, warn};

use super::bus::UpdateKind;
use super::literal_store;
use super::mailbox::SelectedMailbox;
use super::mailbox_path::*;
use super::model::*;
use super::recovery;
use super::user::User;
use crate::remote::context::RequestContext;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

pub struct Account {
    user: Arc<User>,
    ctx: RequestContext,
    log_prefix: LogPrefix,
    /// Whether this session has already reported a failed append.
    recovery_reported: bool,
}

impl Account {
    pub fn new(user: Arc<User>, ctx: RequestContext, log_prefix: LogPrefix) -> Self {
        Account {
            user,
            ctx,
            log_prefix,
            recovery_reported: false,
        }
    }

    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Replace the request context, e.g. after `ID`.
    pub fn set_context(&mut self, ctx: RequestContext) {
        self.ctx = ctx;
    }

    pub fn delimiter(&self) -> &str {
        &self.user.config.delimiter
    }

    fn normalise(&self, name: &str) -> String {
        normalise(name, self.delimiter())
    }

    /// Split a normalised name into levels for the remote store.
    fn path_of(&self, name: &str) -> Vec<String> {
        parse_mailbox_path(name, self.delimiter())
            .map(str::to_owned)
            .collect()
    }

    /// Select (or, with `read_only`, examine) the named mailbox.
    pub fn select(
        &self,
        name: &str,
        read_only: bool,
    ) -> Result<(SelectedMailbox, SelectResponse), Error> {
        let name = self.normalise(name);
        SelectedMailbox::select(
            Arc::clone(&self.user),
            self.ctx.clone(),
            &name,
            read_only,
        )
    }

    /// The `LIST` and `LSUB` commands.
    ///
    /// Results are sorted by name.
    pub fn list(&self, request: &ListRequest) -> Result<Vec<ListResponse>, Error> {
        // `LIST "" ""` asks for the delimiter and nothing else
        if request.pattern.is_empty() && !request.lsub {
            return Ok(vec![ListResponse {
                name: String::new(),
                attributes: vec![MailboxAttribute::Noselect],
            }]);
        }

        let delimiter = self.delimiter().to_owned();
        let mut pattern = request.reference.clone();
        // Wildcards in the reference have no significance, and we don't allow
        // creating mailboxes containing them, so nothing can match.
        if pattern.contains('%') || pattern.contains('*') {
            return Ok(vec![]);
        }
        if !pattern.is_empty() && !pattern.ends_with(&delimiter) {
            pattern.push_str(&delimiter);
        }
        pattern.push_str(&request.pattern);

        let matcher = mailbox_path_matcher(std::iter::once(&pattern[..]), &delimiter);
        let state = self.user.lock();
        let mut results = BTreeMap::<String, Vec<MailboxAttribute>>::new();

        if request.lsub {
            let subscriptions = state.subscriptions();
            for name in subscriptions {
                if matcher(name) {
                    results.entry(name.clone()).or_default();
                    continue;
                }

                // An unmatched subscription shows up as its nearest matching
                // ancestor, which `%` could not see past.
                let nearest = ancestors(name, &delimiter)
                    .into_iter()
                    .rev()
                    .find(|a| matcher(a));
                if let Some(ancestor) = nearest {
                    if !subscriptions.contains(&ancestor) {
                        results
                            .entry(ancestor)
                            .or_insert_with(|| vec![MailboxAttribute::Noselect]);
                    }
                }
            }
        } else {
            for mb in state.mailboxes() {
                if mb.recovery && mb.rows.is_empty() {
                    continue;
                }

                for ancestor in ancestors(&mb.name, &delimiter) {
                    if matcher(&ancestor) && state.mailbox_by_name(&ancestor).is_err()
                    {
                        results
                            .entry(ancestor)
                            .or_insert_with(|| vec![MailboxAttribute::Noselect]);
                    }
                }

                if matcher(&mb.name) {
                    let attributes = if mb.recovery || delimiter.is_empty() {
                        vec![MailboxAttribute::Noinferiors]
                    } else {
                        vec![]
                    };
                    results.insert(mb.name.clone(), attributes);
                }
            }
        }

        Ok(results
            .into_iter()
            .map(|(name, attributes)| ListResponse { name, attributes })
            .collect())
    }

    /// The `CREATE` command.
    ///
    /// Missing superiors are created too.
    pub async fn create(&self, name: &str) -> Result<(), Error> {
        let name = self.normalise(name);
        check_new_name(&name)?;
        if "INBOX" == name {
            return Err(Error::MailboxExists);
        }

        let mut levels = ancestors(&name, self.delimiter());
        if let Some(top) = levels.first() {
            if recovery::is_recovery_name(top) {
                return Err(Error::RecoveryMailboxReserved);
            }
        }
        if recovery::is_recovery_name(&name) {
            return Err(Error::RecoveryMailboxReserved);
        }

        let exists = self.user.lock().mailbox_by_name(&name).is_ok();
        if exists {
            return Err(Error::MailboxExists);
        }

        levels.push(name);
        for level in levels {
            let exists = self.user.lock().mailbox_by_name(&level).is_ok();
            if !exists {
                self.create_one(level).await?;
            }
        }

        Ok(())
    }

    async fn create_one(&self, name: String) -> Result<MailboxId, Error> {
        let label = self
            .user
            .adapter
            .create_label(&self.ctx, &self.path_of(&name))
            .await?;
        let applied = self
            .user
            .apply(
                UpdateKind::MailboxCreated {
                    name: name.clone(),
                    remote: Some(label.id),
                    recovery: false,
                },
                None,
            )
            .await?;

        info!("{} Created mailbox {}", self.log_prefix, name);
        applied.mailbox.ok_or(Error::NxMailbox)
    }

    /// The `DELETE` command.
    ///
    /// Only the named mailbox goes away; its inferiors keep their names.
    pub async fn delete(&self, name: &str) -> Result<(), Error> {
        let name = self.normalise(name);
        if "INBOX" == name {
            return Err(Error::BadOperationOnInbox);
        }

        let (id, remote) = {
            let state = self.user.lock();
            let mb = state.mailbox_by_name(&name)?;
            if mb.recovery {
                return Err(Error::RecoveryMailboxReserved);
            }
            (mb.id, mb.remote.clone())
        };

        if let Some(ref remote) = remote {
            self.user.adapter.delete_label(&self.ctx, remote).await?;
        }
        self.user
            .apply(UpdateKind::MailboxDeleted { mailbox: id }, None)
            .await?;

        info!("{} Deleted mailbox {}", self.log_prefix, name);
        Ok(())
    }

    /// The `RENAME` command.
    ///
    /// Renaming INBOX moves all its messages into the new mailbox and leaves
    /// INBOX itself in place, empty.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), Error> {
        let from = self.normalise(from);
        let to = self.normalise(to);
        let delimiter = self.delimiter().to_owned();
        check_new_name(&to)?;

        let top_of_to = parse_mailbox_path(&to, &delimiter).next().unwrap_or("");
        if recovery::is_recovery_name(top_of_to) {
            return Err(Error::RecoveryMailboxReserved);
        }
        if is_within(&to, &from, &delimiter) {
            return Err(Error::RenameIntoSelf);
        }

        let (from_id, from_remote) = {
            let state = self.user.lock();
            let mb = state.mailbox_by_name(&from)?;
            if mb.recovery {
                return Err(Error::RecoveryMailboxReserved);
            }
            if state.mailbox_by_name(&to).is_ok() {
                return Err(Error::MailboxExists);
            }
            (mb.id, mb.remote.clone())
        };

        for ancestor in ancestors(&to, &delimiter) {
            let exists = self.user.lock().mailbox_by_name(&ancestor).is_ok();
            if !exists {
                self.create_one(ancestor).await?;
            }
        }

        if "INBOX" == from {
            return self.rename_inbox(from_id, from_remote, to).await;
        }

        // The mailbox and all its inferiors change name remotely
        let relabels: Vec<(RemoteMailboxId, Vec<String>)> = {
            let state = self.user.lock();
            state
                .mailboxes()
                .filter(|mb| is_within(&mb.name, &from, &delimiter))
                .filter_map(|mb| {
                    let remote = mb.remote.clone()?;
                    let new_name = format!("{}{}", to, &mb.name[from.len()..]);
                    Some((remote, self.path_of(&new_name)))
                })
                .collect()
        };
        for (remote, path) in relabels {
            self.user
                .adapter
                .update_label(&self.ctx, &remote, &path)
                .await?;
        }

        self.user
            .apply(
                UpdateKind::MailboxRenamed {
                    mailbox: from_id,
                    name: to.clone(),
                },
                None,
            )
            .await?;
        info!("{} Renamed {} to {}", self.log_prefix, from, to);
        Ok(())
    }

    async fn rename_inbox(
        &self,
        inbox: MailboxId,
        inbox_remote: Option<RemoteMailboxId>,
        to: String,
    ) -> Result<(), Error> {
        let dst = self.create_one(to.clone()).await?;
        let (dst_remote, messages, remote_ids) = {
            let state = self.user.lock();
            let dst_remote = state.mailbox(dst)?.remote.clone();
            let rows: Vec<(MessageId, bool)> = state
                .mailbox(inbox)?
                .rows
                .values()
                .map(|row| (row.message, row.deleted))
                .collect();
            let remote_ids: Vec<RemoteMessageId> = rows
                .iter()
                .filter_map(|&(m, _)| state.message(m).ok())
                .filter_map(|m| m.remote.clone())
                .collect();
            (dst_remote, rows, remote_ids)
        };

        if let (Some(from), Some(to)) = (&inbox_remote, &dst_remote) {
            if !remote_ids.is_empty() {
                self.user
                    .adapter
                    .move_messages(&self.ctx, &remote_ids, from, to)
                    .await?;
            }
        }

        if !messages.is_empty() {
            let ids: Vec<MessageId> = messages.iter().map(|&(m, _)| m).collect();
            self.user
                .apply(
                    UpdateKind::MessagesAdded {
                        mailbox: dst,
                        messages,
                    },
                    None,
                )
                .await?;
            self.user
                .apply(
                    UpdateKind::MessagesRemoved {
                        mailbox: inbox,
                        messages: ids,
                    },
                    None,
                )
                .await?;
        }

        info!("{} Moved INBOX contents into {}", self.log_prefix, to);
        Ok(())
    }

    /// The `SUBSCRIBE` command. Subscribing to a name which does not exist
    /// is permitted.
    pub fn subscribe(&self, name: &str) -> Result<(), Error> {
        let name = self.normalise(name);
        check_new_name(&name)?;
        self.user.lock().subscribe(name);
        Ok(())
    }

    /// The `UNSUBSCRIBE` command. Unsubscribing from something not
    /// subscribed is not an error.
    pub fn unsubscribe(&self, name: &str) -> Result<(), Error> {
        let name = self.normalise(name);
        self.user.lock().unsubscribe(&name);
        Ok(())
    }

    /// The `STATUS` command.
    pub fn status(&self, request: &StatusRequest) -> Result<StatusResponse, Error> {
        let normalised = StatusRequest {
            name: self.normalise(&request.name),
            ..request.clone()
        };
        let mut response = self.user.lock().status(&normalised)?;
        response.name = request.name.clone();
        Ok(response)
    }

    /// The `APPEND` command.
    ///
    /// If the remote store refuses the message, it is parked in the
    /// recovery mailbox and this fails with `RemoteCreateFailed`.
    pub async fn append(
        &mut self,
        name: &str,
        flags: Vec<Flag>,
        internal_date: Option<DateTime<FixedOffset>>,
        literal: Vec<u8>,
    ) -> Result<AppendResponse, Error> {
        let name = self.normalise(name);
        let (mailbox, remote) = {
            let state = self.user.lock();
            let mb = state.mailbox_by_name(&name)?;
            if mb.recovery {
                return Err(Error::RecoveryMailboxReserved);
            }
            (mb.id, mb.remote.clone().ok_or(Error::NxMailbox)?)
        };

        let internal_date = internal_date.unwrap_or_else(|| Utc::now().into());
        let all_flags: FlagSet = flags.into_iter().collect();
        let mut flags = all_flags.clone();
        let deleted = flags.take_deleted();

        let id = MessageId::generate();
        let stamped = literal_store::stamp_internal_id(
            &literal,
            &self.user.config.internal_id_header,
            id,
        );

        let created = self
            .user
            .adapter
            .create_message(&self.ctx, &remote, &stamped, &flags, internal_date)
            .await;
        let (message, canonical) = match created {
            Ok(created) => created,
            Err(e) => {
                warn!(
                    "{} Remote store rejected append to {}: {}",
                    self.log_prefix, name, e
                );
                let fresh =
                    recovery::stash(&self.user, &literal, all_flags, internal_date)
                        .await?;
                if fresh && !self.recovery_reported {
                    self.recovery_reported = true;
                    self.user.reporter.report_message(&format!(
                        "{} Append to {} failed; message kept in {}",
                        self.log_prefix,
                        name,
                        recovery::RECOVERY_MAILBOX_NAME
                    ));
                }
                return Err(Error::RemoteCreateFailed(e.to_string()));
            }
        };

        self.user.literals.put(id, &canonical)?;
        let applied = self
            .user
            .apply(
                UpdateKind::MessagesCreated {
                    mailbox,
                    messages: vec![NewMessage {
                        id,
                        remote_id: Some(message.id),
                        flags,
                        deleted,
                        internal_date,
                        size: canonical.len(),
                        recovery_hash: None,
                    }],
                },
                None,
            )
            .await?;

        let uid = applied
            .added
            .fresh
            .first()
            .or_else(|| applied.added.existing.first())
            .map(|&(_, uid)| uid)
            .ok_or(Error::NxMessage)?;
        let uid_validity = self.user.lock().mailbox(mailbox)?.uid_validity;
        Ok(AppendResponse { uid_validity, uid })
    }
}
