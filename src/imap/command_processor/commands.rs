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
use std::io;

use log::info;
use tokio::io::AsyncRead;

use super::defs::*;
use crate::account::mailbox::SelectedMailbox;
use crate::imap::request_reader::RequestReader;
use crate::imap::response_writer::OutputEvent;
use crate::remote::context::ImapId;

/// Which session state a command requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Requires {
    Anything,
    NotAuthenticated,
    Authenticated,
    Selected,
}

fn requirement(cmd: &c::Command<'_>) -> Requires {
    use c::Command::*;

    match *cmd {
        Capability | Noop | Logout | Id(..) => Requires::Anything,
        StartTls | Login(..) => Requires::NotAuthenticated,
        Select(..) | Examine(..) | Create(..) | Delete(..) | Rename(..)
        | Subscribe(..) | Unsubscribe(..) | List(..) | Lsub(..)
        | Status(..) | Append(..) | Idle => Requires::Authenticated,
        Check | Close | Unselect | Expunge | Search(..) | Fetch(..)
        | Store(..) | Copy(..) | Move(..) | Uid(..) => Requires::Selected,
    }
}

impl CommandProcessor {
    /// Return the greeting line to send to the client.
    pub fn greet(&self) -> r::ResponseLine<'static> {
        r::ResponseLine::untagged(r::Response::cond(
            r::RespCondType::Ok,
            Some(r::RespTextCode::Capability(capability_data(
                self.tls_available,
                self.tls_active,
            ))),
            TAGLINE,
        ))
    }

    fn check_state(&self, cmd: &c::Command<'_>) -> PartialResult<()> {
        match requirement(cmd) {
            Requires::Anything => Ok(()),
            Requires::NotAuthenticated if self.account.is_some() => {
                Err(r::Response::no(None, "Already logged in"))
            }
            Requires::NotAuthenticated => Ok(()),
            Requires::Authenticated | Requires::Selected
                if self.account.is_none() =>
            {
                Err(r::Response::no(None, "Not logged in"))
            }
            Requires::Selected if self.selected.is_none() => {
                Err(r::Response::no(None, "No mailbox selected"))
            }
            Requires::Authenticated | Requires::Selected => Ok(()),
        }
    }

    /// Handles a regular command, i.e., one that the protocol level does not
    /// give special treatment to.
    ///
    /// `sender` receives untagged responses as they are produced.
    ///
    /// Returns the final response. An untagged `BYE` means the connection
    /// must be closed after sending it.
    pub async fn handle_command(
        &mut self,
        command_line: c::CommandLine<'_>,
        sender: &SendResponse,
    ) -> r::ResponseLine<'static> {
        let tag = command_line.tag.into_owned();
        let cmd = command_line.cmd;

        // FETCH, STORE, SEARCH and COPY are the commands during which we may
        // not change the sequence number mapping.
        let allow_full_poll = !matches!(
            cmd,
            c::Command::Fetch(..)
                | c::Command::Store(..)
                | c::Command::Search(..)
                | c::Command::Copy(..)
                | c::Command::Uid(c::UidCommand::Fetch(..))
                | c::Command::Uid(c::UidCommand::Store(..))
                | c::Command::Uid(c::UidCommand::Search(..))
                | c::Command::Uid(c::UidCommand::Copy(..))
        );
        let uid_form = matches!(cmd, c::Command::Uid(..));

        let res = match self.check_state(&cmd) {
            Err(e) => Err(e),
            Ok(()) => self.dispatch(cmd, sender).await,
        };

        if res.is_ok() {
            if allow_full_poll {
                self.full_poll(sender, uid_form).await;
            } else {
                self.mini_poll(sender, uid_form).await;
            }
        }

        // Don't let the client continue to flail in confusion.
        if let Some(bye) = self.bye_if_deleted() {
            return bye;
        }

        let mut res = match res {
            Ok(res) => res,
            Err(res) => res,
        };

        // For a cond response, if we have nothing better to say as far as a
        // "response code" goes and there's a pending unapplied expunge, tell
        // the client about it.
        if let r::Response::Cond(ref mut cr) = res {
            if cr.code.is_none()
                && self
                    .selected
                    .as_ref()
                    .map_or(false, SelectedMailbox::has_pending_expunge)
            {
                cr.code = Some(r::RespTextCode::ExpungeIssued);
            }
        }

        if Some(r::RespCondType::Bye) == res.cond_type() {
            // BYE is never tagged
            r::ResponseLine::untagged(res)
        } else {
            r::ResponseLine::tagged(tag, res)
        }
    }

    /// If the selected mailbox has been deleted, deselect it and produce the
    /// `BYE` that ends the session.
    fn bye_if_deleted(&mut self) -> Option<r::ResponseLine<'static>> {
        if !self
            .selected
            .as_ref()
            .map_or(false, SelectedMailbox::mailbox_deleted)
        {
            return None;
        }

        self.selected = None;
        self.logged_out = true;
        Some(r::ResponseLine::untagged(r::Response::bye(
            "Selected mailbox was deleted",
        )))
    }

    async fn dispatch(
        &mut self,
        cmd: c::Command<'_>,
        sender: &SendResponse,
    ) -> CmdResult {
        match cmd {
            c::Command::Capability => self.cmd_capability(sender).await,
            c::Command::Noop => self.cmd_noop("NOOP OK"),
            c::Command::Check => self.cmd_noop("Nothing to check"),
            c::Command::Logout => self.cmd_log_out(sender).await,
            c::Command::StartTls => self.cmd_start_tls(),
            c::Command::Login(cmd) => self.cmd_log_in(cmd).await,
            c::Command::Id(cmd) => self.cmd_id(cmd, sender).await,

            c::Command::Select(cmd) => self.cmd_select(cmd, sender).await,
            c::Command::Examine(cmd) => self.cmd_examine(cmd, sender).await,
            c::Command::Create(cmd) => self.cmd_create(cmd).await,
            c::Command::Delete(cmd) => self.cmd_delete(cmd).await,
            c::Command::Rename(cmd) => self.cmd_rename(cmd).await,
            c::Command::Subscribe(cmd) => self.cmd_subscribe(cmd),
            c::Command::Unsubscribe(cmd) => self.cmd_unsubscribe(cmd),
            c::Command::List(cmd) => self.cmd_list(cmd, false, sender).await,
            c::Command::Lsub(cmd) => self.cmd_list(cmd, true, sender).await,
            c::Command::Status(cmd) => self.cmd_status(cmd, sender).await,
            c::Command::Append(cmd) => self.cmd_append(cmd).await,
            c::Command::Idle => Err(r::Response::bad(
                Some(r::RespTextCode::ServerBug),
                "IDLE must be handled by the connection",
            )),

            c::Command::Close => self.cmd_close().await,
            c::Command::Unselect => self.cmd_unselect(),
            c::Command::Expunge => self.cmd_expunge().await,
            c::Command::Search(cmd) => {
                self.cmd_search(cmd, false, sender).await
            }
            c::Command::Fetch(cmd) => self.cmd_fetch(cmd, false, sender).await,
            c::Command::Store(cmd) => self.cmd_store(cmd, false).await,
            c::Command::Copy(cmd) => self.cmd_copy(cmd, false).await,
            c::Command::Move(cmd) => self.cmd_move(cmd, false, sender).await,

            c::Command::Uid(c::UidCommand::Search(cmd)) => {
                self.cmd_search(cmd, true, sender).await
            }
            c::Command::Uid(c::UidCommand::Fetch(cmd)) => {
                self.cmd_fetch(cmd, true, sender).await
            }
            c::Command::Uid(c::UidCommand::Store(cmd)) => {
                self.cmd_store(cmd, true).await
            }
            c::Command::Uid(c::UidCommand::Copy(cmd)) => {
                self.cmd_copy(cmd, true).await
            }
            c::Command::Uid(c::UidCommand::Move(cmd)) => {
                self.cmd_move(cmd, true, sender).await
            }
            c::Command::Uid(c::UidCommand::Expunge(uids)) => {
                self.cmd_uid_expunge(&uids).await
            }
        }
    }

    async fn cmd_capability(&mut self, sender: &SendResponse) -> CmdResult {
        send_response(
            sender,
            r::Response::Capability(capability_data(
                self.tls_available,
                self.tls_active,
            )),
        )
        .await;
        success()
    }

    fn cmd_noop(&mut self, quip: &'static str) -> CmdResult {
        // Nothing to do here; shared command processing takes care of the
        // actual poll operation.
        Ok(r::Response::ok(quip))
    }

    async fn cmd_log_out(&mut self, sender: &SendResponse) -> CmdResult {
        // Pending expunges for this session are simply dropped with the
        // snapshot.
        self.selected = None;
        self.account = None;

        // RFC 3501 requires the OK to come *after* the BYE.
        self.logged_out = true;
        send_response(sender, r::Response::bye("Goodbye")).await;
        Ok(r::Response::ok("LOGOUT completed"))
    }

    fn cmd_start_tls(&mut self) -> CmdResult {
        if self.tls_active {
            Err(r::Response::bad(None, "Already using TLS"))
        } else if !self.tls_available {
            Err(r::Response::no(None, "TLS is not configured"))
        } else {
            Ok(r::Response::ok("Begin TLS negotiation now"))
        }
    }

    /// Called by the connection once the TLS handshake has completed.
    pub fn tls_started(&mut self) {
        self.tls_active = true;
        self.log_prefix.set_protocol("imaps");
    }

    async fn cmd_id(
        &mut self,
        cmd: s::IdCommand<'_>,
        sender: &SendResponse,
    ) -> CmdResult {
        // Only take action on the first ID exchange so the log prefix and
        // request context stay stable for the rest of the session.
        if !self.id_exchanged {
            self.id_exchanged = true;

            let id = ImapId {
                fields: cmd
                    .parameters
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k.into_owned(), v.map(Cow::into_owned)))
                    .collect(),
            };

            let mut message = String::new();
            for (name, value) in &id.fields {
                message.push_str(&format!(
                    " \"{}\" = \"{}\";",
                    name,
                    value.as_deref().unwrap_or("NIL")
                ));
            }

            if id.name().is_some() || id.version().is_some() {
                self.log_prefix.set_user_agent(
                    id.name().map(str::to_owned),
                    id.version().map(str::to_owned),
                );
            }

            info!(
                "{} ID exchanged; client says it is{}",
                self.log_prefix, message
            );

            self.ctx = self.ctx.with_imap_id(id);
            if let Some(ref mut account) = self.account {
                account.set_context(self.ctx.clone());
            }
            if let Some(ref mut selected) = self.selected {
                selected.set_context(self.ctx.clone());
            }
        }

        let mut id_info: Vec<(Cow<'static, str>, Option<Cow<'static, str>>)> = vec![
            (
                Cow::Borrowed("name"),
                Some(Cow::Borrowed(env!("CARGO_PKG_NAME"))),
            ),
            (
                Cow::Borrowed("version"),
                Some(Cow::Borrowed(env!("CARGO_PKG_VERSION"))),
            ),
        ];

        for (name, value) in &self.system_config.identification {
            // Silently replace _ with - since it's easy to accidentally use _
            // in the config but _ is never used in these parameters.
            id_info.push((
                Cow::Owned(name.replace('_', "-")),
                Some(Cow::Owned(value.clone())),
            ));
        }

        send_response(sender, r::Response::Id(Some(id_info))).await;
        success()
    }

    pub(super) async fn full_poll(&mut self, sender: &SendResponse, with_uid: bool) {
        let selected = match self.selected.as_mut() {
            Some(s) => s,
            None => return,
        };

        let poll = selected.poll();
        // Already in descending order, so each EXPUNGE is valid against the
        // sequence numbers the client has after the previous one.
        for (seqnum, _) in poll.expunge {
            send_response(sender, r::Response::Expunge(seqnum.into())).await;
        }
        if let Some(exists) = poll.exists {
            send_response(
                sender,
                r::Response::Exists(u32::try_from(exists).unwrap_or(u32::MAX)),
            )
            .await;
        }
        if let Some(recent) = poll.recent {
            send_response(
                sender,
                r::Response::Recent(u32::try_from(recent).unwrap_or(u32::MAX)),
            )
            .await;
        }
        if let Some(flags) = poll.flags {
            send_response(sender, r::Response::Flags(flags)).await;
        }

        for fetched in selected.flag_report(&poll.fetch, with_uid) {
            send_response(sender, r::Response::Fetch(fetched)).await;
        }
    }

    pub(super) async fn mini_poll(&mut self, sender: &SendResponse, with_uid: bool) {
        let selected = match self.selected.as_mut() {
            Some(s) => s,
            None => return,
        };

        let poll = selected.mini_poll();
        if let Some(flags) = poll.flags {
            send_response(sender, r::Response::Flags(flags)).await;
        }
        for fetched in selected.flag_report(&poll.fetch, with_uid) {
            send_response(sender, r::Response::Fetch(fetched)).await;
        }
    }

    /// The IDLE command.
    ///
    /// This needs to be dispatched directly by the connection since it
    /// interacts with the protocol flow: after the continuation line, the
    /// only thing the client may send is `DONE`.
    pub async fn cmd_idle<R: AsyncRead + Unpin>(
        &mut self,
        tag: String,
        reader: &mut RequestReader<R>,
        sender: &SendResponse,
    ) -> io::Result<r::ResponseLine<'static>> {
        if let Err(response) = self.check_state(&c::Command::Idle) {
            return Ok(r::ResponseLine::tagged(tag, response));
        }

        self.full_poll(sender, false).await;
        if let Some(bye) = self.bye_if_deleted() {
            return Ok(bye);
        }

        send_event(sender, OutputEvent::ContinuationLine { prompt: "Ready" })
            .await;

        loop {
            let line = {
                let selected = &mut self.selected;
                tokio::select! {
                    line = reader.read_line() => Some(line),
                    _ = wait_for_change(selected) => None,
                }
            };

            match line {
                Some(Ok(line)) if c::is_done(&line) => break,
                Some(Ok(_)) => {
                    return Ok(r::ResponseLine::tagged(
                        tag,
                        r::Response::bad(None, "Expected DONE"),
                    ))
                }
                Some(Err(e)) => return Err(e),
                None => {
                    self.full_poll(sender, false).await;
                    if let Some(bye) = self.bye_if_deleted() {
                        return Ok(bye);
                    }
                    send_event(sender, OutputEvent::Flush).await;
                }
            }
        }

        Ok(r::ResponseLine::tagged(tag, r::Response::ok("IDLE done")))
    }
}

async fn wait_for_change(selected: &mut Option<SelectedMailbox>) {
    match *selected {
        Some(ref mut selected) => selected.wait_for_change().await,
        None => futures::future::pending::<()>().await,
    }
}
