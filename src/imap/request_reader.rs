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

//! Assembles whole commands from the network input.
//!
//! A command is one line, or several when it carries literals. Each literal
//! introducer `{N}` at the end of a line is honoured by sending a
//! continuation and then reading exactly N bytes; `{N+}` is read without
//! asking. The assembled command has every line ending normalised to CRLF
//! and the final one removed, ready for `CommandLine::parse`.

use std::io;
use std::str;

use lazy_static::lazy_static;
use regex::bytes::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;

use super::response_writer::OutputEvent;

lazy_static! {
    static ref LITERAL_AT_END: Regex =
        Regex::new(r#"\{([0-9]+)(\+?)\}\r?\n$"#).unwrap();
    static ref APPEND_START: Regex =
        Regex::new(r#"^[^ ]+ (?i:APPEND) "#).unwrap();
    static ref TAG: Regex = Regex::new(r#"^([^ (){%*"\\+\x00-\x1f\x7f]+) "#)
        .unwrap();
}

pub const MAX_CMDLINE: usize = 65536;

/// What `read_command` produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Request {
    /// A complete command.
    Command(Vec<u8>),
    /// The command exceeded the size limits and has been skipped. The value
    /// is the tag, if one could be found.
    TooLong(Option<String>),
    /// The client announced a synchronising literal that we will not
    /// accept. The client has been given no continuation, so it will not
    /// send the literal, and the rest of the command is void.
    LiteralRefused(Option<String>),
    /// The output side went away while we wanted to send a continuation.
    OutputDisconnected,
}

pub struct RequestReader<R> {
    io: BufReader<R>,
    /// Partial line carried across cancelled reads.
    line: Vec<u8>,
    /// Every byte consumed since the last `reset_raw`.
    raw: Vec<u8>,
    max_literal_size: u32,
}

impl<R: AsyncRead + Unpin> RequestReader<R> {
    pub fn new(io: R, max_literal_size: u32) -> Self {
        RequestReader {
            io: BufReader::new(io),
            line: Vec::new(),
            raw: Vec::new(),
            max_literal_size,
        }
    }

    /// Read the next complete command.
    ///
    /// `outputs` carries the continuation lines for synchronising literals.
    pub async fn read_command(
        &mut self,
        outputs: &mpsc::Sender<OutputEvent>,
    ) -> io::Result<Request> {
        let mut command = Vec::new();

        loop {
            let line = match self.read_bounded_line(MAX_CMDLINE).await? {
                Some(line) => line,
                None => {
                    let tag = tag_of(&command).or_else(|| tag_of(&self.line));
                    self.line.clear();
                    self.skip_rest_of_line().await?;
                    self.skip_command(None).await?;
                    return Ok(Request::TooLong(tag));
                }
            };

            let literal = literal_at_end(&line);
            append_normalised(&mut command, &line);

            let Some((len, literal_plus)) = literal else {
                // Drop the final CRLF
                command.truncate(command.len() - 2);
                return Ok(Request::Command(command));
            };

            let limit = if APPEND_START.is_match(&command) {
                self.max_literal_size as usize
            } else {
                MAX_CMDLINE.saturating_sub(command.len())
            };

            if len as usize > limit {
                let tag = tag_of(&command);
                if literal_plus {
                    self.skip_command(Some(len)).await?;
                    return Ok(Request::TooLong(tag));
                } else {
                    return Ok(Request::LiteralRefused(tag));
                }
            }

            if !literal_plus
                && outputs
                    .send(OutputEvent::ContinuationLine { prompt: "Ready" })
                    .await
                    .is_err()
            {
                return Ok(Request::OutputDisconnected);
            }

            let start = command.len();
            command.resize(start + len as usize, 0);
            self.io.read_exact(&mut command[start..]).await?;
            self.raw.extend_from_slice(&command[start..]);
        }
    }

    /// Read a single line with its line ending removed, such as the `DONE`
    /// that ends `IDLE`.
    ///
    /// Cancel-safe: a partially read line is kept for the next call.
    pub async fn read_line(&mut self) -> io::Result<Vec<u8>> {
        match self.read_bounded_line(MAX_CMDLINE).await? {
            Some(mut line) => {
                strip_line_ending(&mut line);
                Ok(line)
            }
            None => {
                self.line.clear();
                self.skip_rest_of_line().await?;
                Ok(Vec::new())
            }
        }
    }

    /// Everything read since the last reset, for diagnostics.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn reset_raw(&mut self) {
        self.raw.clear();
    }

    /// Whether input the client sent has been read ahead of the command
    /// currently being processed.
    pub fn has_buffered_input(&self) -> bool {
        !self.io.buffer().is_empty() || !self.line.is_empty()
    }

    pub fn into_inner(self) -> R {
        self.io.into_inner()
    }

    /// Read one line including its LF. `None` means the line exceeded
    /// `max` bytes; the bytes read so far stay in `self.line`.
    async fn read_bounded_line(
        &mut self,
        max: usize,
    ) -> io::Result<Option<Vec<u8>>> {
        while !self.line.ends_with(b"\n") {
            if self.line.len() >= max {
                return Ok(None);
            }

            let before = self.line.len();
            let limit = (max - before) as u64;
            let nread = (&mut self.io)
                .take(limit)
                .read_until(b'\n', &mut self.line)
                .await?;
            self.raw.extend_from_slice(&self.line[before..]);
            if 0 == nread {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "EOF reached before reading full line",
                ));
            }
        }

        Ok(Some(std::mem::take(&mut self.line)))
    }

    async fn skip_rest_of_line(&mut self) -> io::Result<()> {
        loop {
            match self.read_bounded_line(MAX_CMDLINE).await? {
                Some(_) => return Ok(()),
                None => self.line.clear(),
            }
        }
    }

    /// Discard the remainder of a command, starting with a non-synchronising
    /// literal of `pending` bytes if given.
    ///
    /// Synchronising literals found along the way end the command, since
    /// the client will not send them without a continuation.
    async fn skip_command(&mut self, mut pending: Option<u32>) -> io::Result<()> {
        while let Some(len) = pending.take() {
            let mut literal = (&mut self.io).take(len.into());
            let skipped =
                tokio::io::copy(&mut literal, &mut tokio::io::sink()).await?;
            if skipped != u64::from(len) {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "EOF reached inside literal",
                ));
            }

            let line = match self.read_bounded_line(MAX_CMDLINE).await? {
                Some(line) => line,
                None => {
                    self.line.clear();
                    self.skip_rest_of_line().await?;
                    continue;
                }
            };

            pending = match literal_at_end(&line) {
                Some((len, true)) => Some(len),
                _ => None,
            };
        }

        Ok(())
    }
}

fn literal_at_end(line: &[u8]) -> Option<(u32, bool)> {
    let captures = LITERAL_AT_END.captures(line)?;
    let len = str::from_utf8(captures.get(1)?.as_bytes())
        .ok()?
        .parse::<u32>()
        .ok()?;
    let plus = captures.get(2).map_or(false, |m| !m.as_bytes().is_empty());
    Some((len, plus))
}

fn strip_line_ending(line: &mut Vec<u8>) {
    if line.ends_with(b"\n") {
        line.pop();
        if line.ends_with(b"\r") {
            line.pop();
        }
    }
}

/// Append `line` to `command`, with its line ending made CRLF.
fn append_normalised(command: &mut Vec<u8>, line: &[u8]) {
    let mut line = line;
    if line.ends_with(b"\n") {
        line = &line[..line.len() - 1];
    }
    if line.ends_with(b"\r") {
        line = &line[..line.len() - 1];
    }
    command.extend_from_slice(line);
    command.extend_from_slice(b"\r\n");
}

fn tag_of(command: &[u8]) -> Option<String> {
    TAG.captures(command)
        .and_then(|c| c.get(1))
        .and_then(|m| str::from_utf8(m.as_bytes()).ok())
        .map(str::to_owned)
}
