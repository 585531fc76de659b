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

use std::borrow::Cow;
use std::convert::TryFrom;

use log::warn;

use super::defs::*;
use crate::account::model::*;
use crate::support::error::Error;

impl CommandProcessor {
    pub(super) async fn cmd_close(&mut self) -> CmdResult {
        // CLOSE expunges silently, so the snapshot goes away without
        // reporting anything.
        let selected = match self.selected.take() {
            Some(selected) => selected,
            None => return Err(r::Response::no(None, "No mailbox selected")),
        };

        if let Err(e) = selected.close().await {
            warn!("{} Implicit EXPUNGE failed: {}", self.log_prefix, e);
        }

        success()
    }

    pub(super) fn cmd_unselect(&mut self) -> CmdResult {
        selected!(self)?;
        self.selected = None;
        success()
    }

    pub(super) async fn cmd_create(&mut self, cmd: s::MailboxCommand<'_>) -> CmdResult {
        account!(self)?
            .create(&cmd.mailbox)
            .await
            .map_err(map_error! {
                self,
                MailboxExists =>
                    (No, Some(r::RespTextCode::AlreadyExists)),
                UnsafeName | RecoveryMailboxReserved | BadOperationOnInbox =>
                    (No, Some(r::RespTextCode::Cannot)),
                TooManyMailboxes | UidValidityExhausted =>
                    (No, Some(r::RespTextCode::Limit)),
            })?;
        success()
    }

    pub(super) async fn cmd_delete(&mut self, cmd: s::MailboxCommand<'_>) -> CmdResult {
        account!(self)?
            .delete(&cmd.mailbox)
            .await
            .map_err(map_error! {
                self,
                NxMailbox =>
                    (No, Some(r::RespTextCode::Nonexistent)),
                UnsafeName | RecoveryMailboxReserved | BadOperationOnInbox =>
                    (No, Some(r::RespTextCode::Cannot)),
            })?;
        success()
    }

    pub(super) async fn cmd_rename(&mut self, cmd: s::RenameCommand<'_>) -> CmdResult {
        account!(self)?
            .rename(&cmd.src, &cmd.dst)
            .await
            .map_err(map_error! {
                self,
                NxMailbox =>
                    (No, Some(r::RespTextCode::Nonexistent)),
                MailboxExists =>
                    (No, Some(r::RespTextCode::AlreadyExists)),
                BadOperationOnInbox | RenameIntoSelf | UnsafeName
                | RecoveryMailboxReserved =>
                    (No, Some(r::RespTextCode::Cannot)),
                TooManyMailboxes | UidValidityExhausted =>
                    (No, Some(r::RespTextCode::Limit)),
            })?;
        success()
    }

    pub(super) fn cmd_subscribe(&mut self, cmd: s::MailboxCommand<'_>) -> CmdResult {
        account!(self)?
            .subscribe(&cmd.mailbox)
            .map_err(map_error! {
                self,
                NxMailbox => (No, Some(r::RespTextCode::Nonexistent)),
                UnsafeName => (No, Some(r::RespTextCode::Cannot)),
            })?;
        success()
    }

    pub(super) fn cmd_unsubscribe(
        &mut self,
        cmd: s::MailboxCommand<'_>,
    ) -> CmdResult {
        account!(self)?
            .unsubscribe(&cmd.mailbox)
            .map_err(map_error! {
                self,
                NxMailbox => (No, Some(r::RespTextCode::Nonexistent)),
                UnsafeName => (No, Some(r::RespTextCode::Cannot)),
            })?;
        success()
    }

    pub(super) async fn cmd_list(
        &mut self,
        cmd: s::ListCommand<'_>,
        lsub: bool,
        sender: &SendResponse,
    ) -> CmdResult {
        let request = ListRequest {
            reference: cmd.reference.into_owned(),
            pattern: cmd.pattern.into_owned(),
            lsub,
        };

        let account = account!(self)?;
        let delimiter = account.delimiter().to_owned();
        let responses = account.list(&request).map_err(map_error!(self))?;
        for response in responses {
            let list = r::MailboxList {
                name: response.name,
                attributes: response.attributes,
                delimiter: Cow::Owned(delimiter.clone()),
            };
            send_response(
                sender,
                if lsub {
                    r::Response::Lsub(list)
                } else {
                    r::Response::List(list)
                },
            )
            .await;
        }

        success()
    }

    pub(super) async fn cmd_status(
        &mut self,
        cmd: s::StatusCommand<'_>,
        sender: &SendResponse,
    ) -> CmdResult {
        let request = StatusRequest {
            name: cmd.mailbox.into_owned(),
            messages: cmd.atts.contains(&s::StatusAtt::Messages),
            recent: cmd.atts.contains(&s::StatusAtt::Recent),
            uidnext: cmd.atts.contains(&s::StatusAtt::UidNext),
            uidvalidity: cmd.atts.contains(&s::StatusAtt::UidValidity),
            unseen: cmd.atts.contains(&s::StatusAtt::Unseen),
        };

        let response = account!(self)?.status(&request).map_err(map_error! {
            self,
            UnsafeName => (No, Some(r::RespTextCode::Cannot)),
            NxMailbox | MailboxUnselectable =>
                (No, Some(r::RespTextCode::Nonexistent)),
        })?;

        send_response(sender, r::Response::Status(response)).await;
        success()
    }

    pub(super) async fn cmd_select(
        &mut self,
        cmd: s::MailboxCommand<'_>,
        sender: &SendResponse,
    ) -> CmdResult {
        self.select(&cmd.mailbox, sender, false).await
    }

    pub(super) async fn cmd_examine(
        &mut self,
        cmd: s::MailboxCommand<'_>,
        sender: &SendResponse,
    ) -> CmdResult {
        self.select(&cmd.mailbox, sender, true).await
    }

    async fn select(
        &mut self,
        mailbox: &str,
        sender: &SendResponse,
        read_only: bool,
    ) -> CmdResult {
        // SELECT and EXAMINE unselect any selected mailbox regardless of
        // whether they succeed. Dropping the old snapshot discards whatever
        // it still had pending.
        self.selected = None;

        let (selected, select) = account!(self)?
            .select(mailbox, read_only)
            .map_err(map_error! {
                self,
                NxMailbox | MailboxUnselectable =>
                    (No, Some(r::RespTextCode::Nonexistent)),
                UnsafeName =>
                    (No, Some(r::RespTextCode::Cannot)),
            })?;

        send_response(sender, r::Response::Flags(select.flags.clone())).await;
        send_response(
            sender,
            r::Response::Exists(u32::try_from(select.exists).unwrap_or(u32::MAX)),
        )
        .await;
        send_response(
            sender,
            r::Response::Recent(u32::try_from(select.recent).unwrap_or(u32::MAX)),
        )
        .await;
        if let Some(unseen) = select.unseen {
            send_response(
                sender,
                r::Response::cond(
                    r::RespCondType::Ok,
                    Some(r::RespTextCode::Unseen(unseen)),
                    "First unseen",
                ),
            )
            .await;
        }
        send_response(
            sender,
            r::Response::cond(
                r::RespCondType::Ok,
                Some(r::RespTextCode::PermanentFlags(if read_only {
                    vec![]
                } else {
                    select.flags
                })),
                "Permanent flags",
            ),
        )
        .await;
        send_response(
            sender,
            r::Response::cond(
                r::RespCondType::Ok,
                Some(r::RespTextCode::UidNext(select.uidnext)),
                "Predicted next UID",
            ),
        )
        .await;
        send_response(
            sender,
            r::Response::cond(
                r::RespCondType::Ok,
                Some(r::RespTextCode::UidValidity(select.uidvalidity)),
                "UIDs valid",
            ),
        )
        .await;

        self.selected = Some(selected);

        Ok(r::Response::cond(
            r::RespCondType::Ok,
            Some(if read_only {
                r::RespTextCode::ReadOnly
            } else {
                r::RespTextCode::ReadWrite
            }),
            if read_only {
                "EXAMINE completed"
            } else {
                "SELECT completed"
            },
        ))
    }
}
