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
    pub(super) async fn cmd_store(
        &mut self,
        cmd: s::StoreCommand<'_>,
        uid: bool,
    ) -> CmdResult {
        let change = flag_change(cmd.typ, cmd.flags);

        let result = if uid {
            let ids = self.parse_uid_range(&cmd.messages)?;
            selected!(self)?
                .store(&StoreRequest {
                    ids: &ids,
                    change,
                    silent: cmd.silent,
                })
                .await
        } else {
            let ids = self.parse_seqnum_range(&cmd.messages)?;
            selected!(self)?
                .seqnum_store(&StoreRequest {
                    ids: &ids,
                    change,
                    silent: cmd.silent,
                })
                .await
        };

        result.map_err(map_error! {
            self,
            MailboxReadOnly => (No, Some(r::RespTextCode::Cannot)),
            NxMessage | ExpungedMessage =>
                (No, Some(r::RespTextCode::ExpungeIssued)),
            UnaddressableMessage => (No, Some(r::RespTextCode::ClientBug)),
        })?;

        Ok(r::Response::ok(if uid {
            "UID STORE completed"
        } else {
            "STORE completed"
        }))
    }
}

fn flag_change(typ: s::StoreCommandType, flags: Vec<Flag>) -> FlagChange {
    let flags = flags.into_iter().collect::<FlagSet>();
    match typ {
        s::StoreCommandType::Eq => FlagChange::Set(flags),
        s::StoreCommandType::Plus => FlagChange::Add(flags),
        s::StoreCommandType::Minus => FlagChange::Remove(flags),
    }
}
