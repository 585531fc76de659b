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

use super::defs::*;
use crate::account::model::*;
use crate::support::error::Error;

impl CommandProcessor {
    pub(super) async fn cmd_append(&mut self, cmd: s::AppendCommand<'_>) -> CmdResult {
        let response = account!(self)?
            .append(
                &cmd.mailbox,
                cmd.flags,
                cmd.internal_date,
                cmd.message.into_owned(),
            )
            .await
            .map_err(map_error! {
                self,
                NxMailbox | MailboxUnselectable =>
                    (No, Some(r::RespTextCode::TryCreate)),
                UnsafeName | RecoveryMailboxReserved =>
                    (No, Some(r::RespTextCode::Cannot)),
                MailboxFull | UidSpaceExhausted =>
                    (No, Some(r::RespTextCode::Limit)),
            })?;

        Ok(r::Response::cond(
            r::RespCondType::Ok,
            Some(r::RespTextCode::AppendUid(
                response.uid_validity,
                response.uid,
            )),
            "APPEND completed",
        ))
    }

    pub(super) async fn cmd_expunge(&mut self) -> CmdResult {
        // As with NOOP, the unsolicited responses that go with this are part
        // of the natural poll cycle.
        selected!(self)?
            .expunge_all_deleted()
            .await
            .map_err(map_error! {
                self,
                MailboxReadOnly => (No, Some(r::RespTextCode::Cannot)),
            })?;
        success()
    }

    pub(super) async fn cmd_uid_expunge(&mut self, uids: &str) -> CmdResult {
        let uids = self.parse_uid_range(uids)?;
        selected!(self)?
            .uid_expunge(&uids)
            .await
            .map_err(map_error! {
                self,
                MailboxReadOnly => (No, Some(r::RespTextCode::Cannot)),
            })?;
        success()
    }

    pub(super) async fn cmd_copy(
        &mut self,
        cmd: s::CopyCommand<'_>,
        uid: bool,
    ) -> CmdResult {
        let response = if uid {
            let messages = self.parse_uid_range(&cmd.messages)?;
            selected!(self)?.copy(&messages, &cmd.dst).await
        } else {
            let messages = self.parse_seqnum_range(&cmd.messages)?;
            selected!(self)?.seqnum_copy(&messages, &cmd.dst).await
        };

        let response = self.map_transfer_error(response)?;
        Ok(r::Response::cond(
            r::RespCondType::Ok,
            copyuid(response),
            "COPY completed",
        ))
    }

    pub(super) async fn cmd_move(
        &mut self,
        cmd: s::CopyCommand<'_>,
        uid: bool,
        sender: &SendResponse,
    ) -> CmdResult {
        let response = if uid {
            let messages = self.parse_uid_range(&cmd.messages)?;
            selected!(self)?.move_messages(&messages, &cmd.dst).await
        } else {
            let messages = self.parse_seqnum_range(&cmd.messages)?;
            selected!(self)?.seqnum_move(&messages, &cmd.dst).await
        };

        let response = self.map_transfer_error(response)?;
        // RFC 6851 recommends sending the COPYUID response in an untagged
        // response before any EXPUNGE responses.
        if let Some(code) = copyuid(response) {
            send_response(
                sender,
                r::Response::cond(r::RespCondType::Ok, Some(code), "Moved"),
            )
            .await;
        }

        Ok(r::Response::ok("MOVE completed"))
    }

    fn map_transfer_error(
        &self,
        result: Result<CopyResponse, Error>,
    ) -> PartialResult<CopyResponse> {
        result.map_err(map_error! {
            self,
            NxMailbox | MailboxUnselectable =>
                (No, Some(r::RespTextCode::TryCreate)),
            UnsafeName | RecoveryMailboxReserved | MailboxReadOnly =>
                (No, Some(r::RespTextCode::Cannot)),
            MailboxFull | UidSpaceExhausted =>
                (No, Some(r::RespTextCode::Limit)),
            NxMessage | ExpungedMessage =>
                (No, Some(r::RespTextCode::ExpungeIssued)),
            UnaddressableMessage =>
                (No, Some(r::RespTextCode::ClientBug)),
        })
    }
}

/// The `[COPYUID]` code for `response`, unless nothing was copied, in which
/// case there are no UID sets to report.
fn copyuid(response: CopyResponse) -> Option<r::RespTextCode<'static>> {
    if response.from_uids.is_empty() {
        None
    } else {
        Some(r::RespTextCode::CopyUid(
            response.uid_validity,
            response.from_uids,
            response.to_uids,
        ))
    }
}
