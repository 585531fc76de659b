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
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{error, warn};

use crate::{
    account::{account::Account, mailbox::SelectedMailbox, model::*, user::User},
    imap::response_writer::{OutputControl, OutputEvent},
    remote::context::RequestContext,
    support::{
        error::Error, log_prefix::LogPrefix, reporter::Reporter,
        system_config::SystemConfig,
    },
};

pub(super) use crate::imap::command as c;
pub(super) use crate::imap::response as r;
pub(super) use crate::imap::syntax as s;

pub(super) static CAPABILITIES: &[&str] =
    &["IMAP4rev1", "ID", "IDLE", "MOVE", "UIDPLUS", "UNSELECT"];

pub(super) static TAGLINE: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " ",
    env!("CARGO_PKG_VERSION"),
    " ready"
);

/// The users the server knows about, by name.
pub(crate) type UserDirectory = Arc<RwLock<HashMap<String, Arc<User>>>>;

/// Receives decoded commands and produces responses.
///
/// While primarily a translation layer, it also manages high-level IMAP state
/// (e.g., authentication status) and also handles certain cases where one IMAP
/// command does multiple distinct actions (e.g. `FETCH BODY[]` does an
/// implicit `STORE`, `CLOSE` does an implicit `EXPUNGE`).
pub struct CommandProcessor {
    pub(super) log_prefix: LogPrefix,
    pub(super) system_config: Arc<SystemConfig>,
    pub(super) users: UserDirectory,
    pub(super) reporter: Arc<dyn Reporter>,
    pub(super) ctx: RequestContext,

    pub(super) account: Option<Account>,
    pub(super) selected: Option<SelectedMailbox>,

    pub(super) tls_available: bool,
    pub(super) tls_active: bool,
    pub(super) logged_out: bool,
    pub(super) id_exchanged: bool,

    /// The sanitised form of the command being processed, for reports.
    pub(super) command_line: String,
}

/// Used just for the convenient `?` operator. We mostly don't distinguish `Ok`
/// from `Err`, since the contained value is sent down the wire either way,
/// though on `Err` no polling happens.
pub(super) type CmdResult = Result<r::Response<'static>, r::Response<'static>>;

/// Return value from an operation that can either succeed with a value, or
/// fail with an IMAP response.
pub(super) type PartialResult<T> = Result<T, r::Response<'static>>;

/// Channel used to send additional non-tagged responses as they become
/// available.
pub type SendResponse = tokio::sync::mpsc::Sender<OutputEvent>;

/// Send an event through the sender, ignoring errors.
pub(super) async fn send_event(sender: &SendResponse, event: OutputEvent) {
    let _ = sender.send(event).await;
}

/// Send an untagged response through `sender`, ignoring errors.
pub(super) async fn send_response(
    sender: &SendResponse,
    response: r::Response<'static>,
) {
    send_event(
        sender,
        OutputEvent::ResponseLine {
            line: r::ResponseLine::untagged(response),
            ctl: OutputControl::Buffer,
        },
    )
    .await;
}

impl CommandProcessor {
    pub fn new(
        log_prefix: LogPrefix,
        system_config: Arc<SystemConfig>,
        users: UserDirectory,
        reporter: Arc<dyn Reporter>,
        session: u64,
        tls_active: bool,
    ) -> Self {
        CommandProcessor {
            tls_available: system_config.tls.is_some(),
            log_prefix,
            system_config,
            users,
            reporter,
            ctx: RequestContext::new(session),

            account: None,
            selected: None,

            tls_active,
            logged_out: false,
            id_exchanged: false,

            command_line: String::new(),
        }
    }

    pub fn logged_out(&self) -> bool {
        self.logged_out
    }

    pub fn log_prefix(&self) -> &LogPrefix {
        &self.log_prefix
    }

    /// Record the sanitised text of the command about to be processed.
    pub fn set_command_line(&mut self, sanitised: String) {
        self.command_line = sanitised;
    }

    pub(super) fn parse_seqnum_range(
        &mut self,
        raw: &str,
    ) -> PartialResult<SeqRange<Seqnum>> {
        let max_seqnum = selected!(self)?.max_seqnum();
        let seqrange = SeqRange::parse(raw, max_seqnum).ok_or_else(|| {
            r::Response::bad(
                Some(r::RespTextCode::Parse),
                "Unparsable sequence set",
            )
        })?;

        if seqrange.max().unwrap_or(0) > max_seqnum {
            // RFC 3501 doesn't say so outright, but addressing a sequence
            // number outside the snapshot is a protocol violation.
            return Err(r::Response::bad(
                Some(r::RespTextCode::ClientBug),
                "Message sequence number out of range",
            ));
        }

        Ok(seqrange)
    }

    pub(super) fn parse_uid_range(
        &mut self,
        raw: &str,
    ) -> PartialResult<SeqRange<Uid>> {
        let max_uid = selected!(self)?.max_uid();
        // The client is explicitly allowed to request UIDs out of range, so
        // there's nothing else to validate here.
        SeqRange::parse(raw, max_uid).ok_or_else(|| {
            r::Response::bad(
                Some(r::RespTextCode::Parse),
                "Unparsable sequence set",
            )
        })
    }
}

pub(super) fn success() -> CmdResult {
    Ok(r::Response::ok("Completed"))
}

pub(super) fn catch_all_error_handling(
    log_prefix: &LogPrefix,
    reporter: &dyn Reporter,
    command_line: &str,
    e: Error,
) -> r::Response<'static> {
    match e {
        Error::Remote(msg) => {
            warn!("{} Remote store failed: {}", log_prefix, msg);
            r::Response::no(None, "Remote mail store failed; try again later")
        }
        Error::RemoteCreateFailed(msg) => {
            warn!("{} Remote store rejected message: {}", log_prefix, msg);
            r::Response::no(
                Some(r::RespTextCode::Cannot),
                "Remote mail store rejected the message; \
                 it has been kept in \"Recovered Messages\"",
            )
        }
        Error::NxUser | Error::BusClosed => {
            warn!("{} Account went away: {}", log_prefix, e);
            r::Response::bye("Account no longer available")
        }
        e => {
            error!("{} Unhandled internal error: {}", log_prefix, e);
            reporter.report_error(
                &format!("{} Unhandled internal error: {}", log_prefix, e),
                Some(command_line),
            );
            r::Response::bad(
                Some(r::RespTextCode::ServerBug),
                "Unexpected error; check server logs for details",
            )
        }
    }
}

pub(super) fn capability_data(
    tls_available: bool,
    tls_active: bool,
) -> Vec<Cow<'static, str>> {
    let mut caps: Vec<Cow<'static, str>> =
        CAPABILITIES.iter().copied().map(Cow::Borrowed).collect();
    if tls_available && !tls_active {
        caps.push(Cow::Borrowed("STARTTLS"));
    }
    caps
}
