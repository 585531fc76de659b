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

use std::sync::Arc;

use log::{info, warn};

use super::defs::*;
use crate::account::account::Account;
use crate::support::user_name::is_safe_user_name;

impl CommandProcessor {
    pub(super) async fn cmd_log_in(&mut self, cmd: s::LoginCommand<'_>) -> CmdResult {
        let rejected = || r::Response::no(None, "Bad user id or password");

        if !is_safe_user_name(&cmd.userid) {
            return Err(rejected());
        }

        let user = self
            .users
            .read()
            .ok()
            .and_then(|users| users.get(&*cmd.userid).cloned());
        let user = match user {
            Some(user) => user,
            None => {
                info!(
                    "{} Login attempt for unknown user '{}'",
                    self.log_prefix, cmd.userid
                );
                return Err(rejected());
            }
        };

        let authorised = user
            .adapter
            .authorize(&self.ctx, &cmd.userid, &cmd.password)
            .await
            .map_err(|e| {
                warn!(
                    "{} Remote store failed to check credentials: {}",
                    self.log_prefix, e
                );
                r::Response::no(None, "Authentication temporarily unavailable")
            })?;

        if !authorised {
            // Login attempts with no password aren't remarkable. They also
            // happen if the user accidentally types their password into the
            // username field, in which case we especially don't want to log
            // it.
            if !cmd.password.is_empty() && cmd.password != cmd.userid {
                warn!(
                    "{} Rejected login for user '{}'",
                    self.log_prefix, cmd.userid
                );
            }
            return Err(rejected());
        }

        self.log_prefix.set_user(cmd.userid.clone().into_owned());
        info!("{} Login successful", self.log_prefix);

        self.account = Some(Account::new(
            Arc::clone(&user),
            self.ctx.clone(),
            self.log_prefix.clone(),
        ));

        Ok(r::Response::cond(
            r::RespCondType::Ok,
            Some(r::RespTextCode::Capability(capability_data(
                self.tls_available,
                self.tls_active,
            ))),
            "User login successful",
        ))
    }
}
