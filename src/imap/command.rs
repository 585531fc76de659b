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

//! The command decoder.
//!
//! A command line is a tag, a space, and a keyword. The keyword is looked up
//! case-insensitively in a dispatch table whose entries parse the rest of
//! the line into a typed payload. `UID` is itself an entry whose payload is
//! looked up in a second, smaller table.

use std::borrow::Cow;
use std::fmt;
use std::str;

use lazy_static::lazy_static;
use nom::{
    bytes::complete::{tag, tag_no_case, take_while1},
    combinator::map,
    sequence::{preceded, tuple},
    IResult,
};
use regex::bytes::Regex;

use super::syntax::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub tag: Cow<'a, str>,
    pub cmd: Command<'a>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Capability,
    Noop,
    Logout,
    StartTls,
    Login(LoginCommand<'a>),
    Id(IdCommand<'a>),
    Select(MailboxCommand<'a>),
    Examine(MailboxCommand<'a>),
    Create(MailboxCommand<'a>),
    Delete(MailboxCommand<'a>),
    Rename(RenameCommand<'a>),
    Subscribe(MailboxCommand<'a>),
    Unsubscribe(MailboxCommand<'a>),
    List(ListCommand<'a>),
    Lsub(ListCommand<'a>),
    Status(StatusCommand<'a>),
    Append(AppendCommand<'a>),
    Idle,
    Check,
    Close,
    Unselect,
    Expunge,
    Search(SearchCommand<'a>),
    Fetch(FetchCommand<'a>),
    Store(StoreCommand<'a>),
    Copy(CopyCommand<'a>),
    Move(CopyCommand<'a>),
    Uid(UidCommand<'a>),
}

/// The forms `UID` may prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UidCommand<'a> {
    Copy(CopyCommand<'a>),
    Move(CopyCommand<'a>),
    Fetch(FetchCommand<'a>),
    Search(SearchCommand<'a>),
    Store(StoreCommand<'a>),
    Expunge(Cow<'a, str>),
}

impl Command<'_> {
    /// The name used to refer to the command in responses and logs.
    pub fn name(&self) -> &'static str {
        match *self {
            Command::Capability => "CAPABILITY",
            Command::Noop => "NOOP",
            Command::Logout => "LOGOUT",
            Command::StartTls => "STARTTLS",
            Command::Login(..) => "LOGIN",
            Command::Id(..) => "ID",
            Command::Select(..) => "SELECT",
            Command::Examine(..) => "EXAMINE",
            Command::Create(..) => "CREATE",
            Command::Delete(..) => "DELETE",
            Command::Rename(..) => "RENAME",
            Command::Subscribe(..) => "SUBSCRIBE",
            Command::Unsubscribe(..) => "UNSUBSCRIBE",
            Command::List(..) => "LIST",
            Command::Lsub(..) => "LSUB",
            Command::Status(..) => "STATUS",
            Command::Append(..) => "APPEND",
            Command::Idle => "IDLE",
            Command::Check => "CHECK",
            Command::Close => "CLOSE",
            Command::Unselect => "UNSELECT",
            Command::Expunge => "EXPUNGE",
            Command::Search(..) => "SEARCH",
            Command::Fetch(..) => "FETCH",
            Command::Store(..) => "STORE",
            Command::Copy(..) => "COPY",
            Command::Move(..) => "MOVE",
            Command::Uid(UidCommand::Copy(..)) => "UID COPY",
            Command::Uid(UidCommand::Move(..)) => "UID MOVE",
            Command::Uid(UidCommand::Fetch(..)) => "UID FETCH",
            Command::Uid(UidCommand::Search(..)) => "UID SEARCH",
            Command::Uid(UidCommand::Store(..)) => "UID STORE",
            Command::Uid(UidCommand::Expunge(..)) => "UID EXPUNGE",
        }
    }
}

/// Why a command line could not be decoded.
///
/// This is for logs and tests only; clients just get a generic `BAD`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    /// The tag, if even that much could be parsed.
    pub tag: Option<String>,
    /// Byte offset into the command at which parsing failed.
    pub offset: usize,
    pub expected: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "at offset {}: expected {}", self.offset, self.expected)
    }
}

impl std::error::Error for ParseError {}

type CommandParser = for<'a> fn(&'a [u8]) -> IResult<&'a [u8], Command<'a>>;
type UidCommandParser =
    for<'a> fn(&'a [u8]) -> IResult<&'a [u8], UidCommand<'a>>;

static COMMANDS: &[(&str, CommandParser)] = &[
    ("APPEND", |i| map(append_args, Command::Append)(i)),
    ("CAPABILITY", |i| Ok((i, Command::Capability))),
    ("CHECK", |i| Ok((i, Command::Check))),
    ("CLOSE", |i| Ok((i, Command::Close))),
    ("COPY", |i| map(copy_args, Command::Copy)(i)),
    ("CREATE", |i| map(mailbox_args, Command::Create)(i)),
    ("DELETE", |i| map(mailbox_args, Command::Delete)(i)),
    ("EXAMINE", |i| map(mailbox_args, Command::Examine)(i)),
    ("EXPUNGE", |i| Ok((i, Command::Expunge))),
    ("FETCH", |i| map(fetch_args, Command::Fetch)(i)),
    ("ID", |i| map(id_args, Command::Id)(i)),
    ("IDLE", |i| Ok((i, Command::Idle))),
    ("LIST", |i| map(list_args, Command::List)(i)),
    ("LOGIN", |i| map(login_args, Command::Login)(i)),
    ("LOGOUT", |i| Ok((i, Command::Logout))),
    ("LSUB", |i| map(list_args, Command::Lsub)(i)),
    ("MOVE", |i| map(copy_args, Command::Move)(i)),
    ("NOOP", |i| Ok((i, Command::Noop))),
    ("RENAME", |i| map(rename_args, Command::Rename)(i)),
    ("SEARCH", |i| map(search_args, Command::Search)(i)),
    ("SELECT", |i| map(mailbox_args, Command::Select)(i)),
    ("STARTTLS", |i| Ok((i, Command::StartTls))),
    ("STATUS", |i| map(status_args, Command::Status)(i)),
    ("STORE", |i| map(store_args, Command::Store)(i)),
    ("SUBSCRIBE", |i| map(mailbox_args, Command::Subscribe)(i)),
    ("UID", uid_command),
    ("UNSELECT", |i| Ok((i, Command::Unselect))),
    ("UNSUBSCRIBE", |i| map(mailbox_args, Command::Unsubscribe)(i)),
];

static UID_COMMANDS: &[(&str, UidCommandParser)] = &[
    ("COPY", |i| map(copy_args, UidCommand::Copy)(i)),
    ("EXPUNGE", |i| map(uid_expunge_args, UidCommand::Expunge)(i)),
    ("FETCH", |i| map(fetch_args, UidCommand::Fetch)(i)),
    ("MOVE", |i| map(copy_args, UidCommand::Move)(i)),
    ("SEARCH", |i| map(search_args, UidCommand::Search)(i)),
    ("STORE", |i| map(store_args, UidCommand::Store)(i)),
];

fn command_keyword(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|b: u8| b.is_ascii_alphabetic())(i)
}

fn lookup<T: Copy>(table: &[(&str, T)], keyword: &[u8]) -> Option<T> {
    let keyword = str::from_utf8(keyword).ok()?;
    table
        .iter()
        .find(|&&(name, _)| name.eq_ignore_ascii_case(keyword))
        .map(|&(_, parser)| parser)
}

fn uid_command(i: &[u8]) -> IResult<&[u8], Command<'_>> {
    let (rest, keyword) = preceded(tag(" "), command_keyword)(i)?;
    match lookup(UID_COMMANDS, keyword) {
        Some(parser) => map(parser, Command::Uid)(rest),
        None => Err(nom::Err::Error(nom::error::make_error(
            &i[1..],
            nom::error::ErrorKind::Tag,
        ))),
    }
}

fn describe(kind: nom::error::ErrorKind) -> String {
    kind.description().to_owned()
}

impl<'a> CommandLine<'a> {
    /// Decode a complete command, without its final line ending.
    pub fn parse(raw: &'a [u8]) -> Result<Self, ParseError> {
        let offset_of = |rest: &[u8]| raw.len() - rest.len();

        let (rest, tag) = tag_atom(raw).map_err(|_| ParseError {
            tag: None,
            offset: 0,
            expected: "tag".to_owned(),
        })?;
        let fail = |rest: &[u8], expected: String| ParseError {
            tag: Some(tag.clone().into_owned()),
            offset: offset_of(rest),
            expected,
        };

        let rest = match tag_sp(rest) {
            Ok((rest, _)) => rest,
            Err(_) => return Err(fail(rest, "space".to_owned())),
        };
        let (after_keyword, keyword) = match command_keyword(rest) {
            Ok(v) => v,
            Err(_) => return Err(fail(rest, "command".to_owned())),
        };
        let parser = match lookup(COMMANDS, keyword) {
            Some(parser) => parser,
            None => return Err(fail(rest, "known command".to_owned())),
        };

        match parser(after_keyword) {
            Ok((remaining, cmd)) if remaining.is_empty() => {
                Ok(CommandLine { tag, cmd })
            }
            Ok((remaining, _)) => {
                Err(fail(remaining, "end of command".to_owned()))
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                Err(fail(e.input, describe(e.code)))
            }
            Err(nom::Err::Incomplete(_)) => {
                Err(fail(&raw[raw.len()..], "more input".to_owned()))
            }
        }
    }
}

fn tag_sp(i: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(" ")(i)
}

/// Whether `raw` is the `DONE` that ends `IDLE`. It carries no tag.
pub fn is_done(raw: &[u8]) -> bool {
    raw.eq_ignore_ascii_case(b"DONE")
}

lazy_static! {
    static ref LITERAL_START: Regex =
        Regex::new(r"\{([0-9]+)\+?\}\r\n").unwrap();
}

/// The longest literal shown verbatim by `sanitise`.
const MAX_LOGGED_LITERAL: usize = 64;

fn login_prefix(i: &[u8]) -> IResult<&[u8], ()> {
    map(
        tuple((tag_atom, tag(" "), tag_no_case("LOGIN"), tag(" "), astring)),
        |_| (),
    )(i)
}

/// Render `raw` for logs and error reports.
///
/// The password of `LOGIN` becomes `<password>`, literals longer than a few
/// dozen bytes become `<N bytes>`, and control characters are escaped.
pub fn sanitise(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len().min(256));

    let raw = match login_prefix(raw) {
        Ok((rest, _)) => {
            let prefix_len = raw.len() - rest.len();
            out.extend_from_slice(&raw[..prefix_len]);
            out.extend_from_slice(b" <password>");
            &raw[raw.len()..]
        }
        Err(_) => raw,
    };

    let mut pos = 0;
    while let Some(cap) = LITERAL_START.captures_at(raw, pos) {
        let (Some(whole), Some(len)) = (cap.get(0), cap.get(1)) else {
            break;
        };
        let len = str::from_utf8(len.as_bytes())
            .ok()
            .and_then(|l| l.parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        let content_start = whole.end();
        let content_end = content_start.saturating_add(len).min(raw.len());

        out.extend_from_slice(&raw[pos..content_start]);
        if len > MAX_LOGGED_LITERAL {
            out.extend_from_slice(format!("<{} bytes>", len).as_bytes());
        } else {
            out.extend_from_slice(&raw[content_start..content_end]);
        }
        pos = content_end;
    }
    out.extend_from_slice(&raw[pos..]);

    let mut vis = String::with_capacity(out.len());
    for c in String::from_utf8_lossy(&out).chars() {
        match c {
            '\r' => vis.push_str("\\r"),
            '\n' => vis.push_str("\\n"),
            c if c.is_control() => vis.push_str(&format!("\\x{:02X}", c as u32)),
            c => vis.push(c),
        }
    }
    vis
}
