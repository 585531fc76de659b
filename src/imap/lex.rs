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

//! Utilities for *writing* values under IMAP's "lexical rules".
//!
//! This is write-only since IMAP's lexical syntax is not separable from its
//! grammar.
//!
//! # Encoding Decisions
//!
//! Given the choice between encoding a string as an atom-like value or some
//! other form, we only use atom if all characters are in the set
//! `a-zA-Z0-9?=+/_.-` (this set is specifically chosen to also include encoded
//! words) and the string is not "NIL".
//!
//! Given the choice between encoding a string as a quoted string or a literal,
//! we only choose the quoted string if it only contains printable ASCII other
//! than backslash and double-quote, and is less than 100 bytes long.
//!
//! # Repair strategies
//!
//! Clients are never assumed to be Unicode-aware, since no extension that
//! would make them so is offered.
//!
//! - Free-form header text (e.g. the subject) is sent as encoded words.
//! - Things that may not contain encoded words (e.g. email addresses) have
//!   their non-ASCII characters censored.
//! - Mailbox names are sent in modified UTF-7.
//! - Message content is sent verbatim, 8-bit or not.

use std::borrow::Cow;
use std::io::{self, Write};

use chrono::prelude::*;

use crate::account::model::Flag;
use crate::mime::utf7;

#[derive(Clone, Copy, Debug)]
pub struct LexWriter<W> {
    writer: W,
}

impl<W: Write> LexWriter<W> {
    pub fn new(writer: W) -> Self {
        LexWriter { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn verbatim(&mut self, s: &str) -> io::Result<()> {
        self.writer.write_all(s.as_bytes())
    }

    pub fn verbatim_bytes(&mut self, s: &[u8]) -> io::Result<()> {
        self.writer.write_all(s)
    }

    pub fn nil(&mut self) -> io::Result<()> {
        self.verbatim("NIL")
    }

    pub fn censored_astring(&mut self, s: &str) -> io::Result<()> {
        self.astring(&censor(s))
    }

    pub fn censored_nstring(
        &mut self,
        s: &Option<impl AsRef<str>>,
    ) -> io::Result<()> {
        match s.as_ref() {
            None => self.nil(),
            Some(s) => self.string(&censor(s.as_ref())),
        }
    }

    pub fn encoded_nstring(
        &mut self,
        s: &Option<impl AsRef<str>>,
    ) -> io::Result<()> {
        match s.as_ref() {
            None => self.nil(),
            Some(s) => self.string(&encode(s.as_ref())),
        }
    }

    pub fn censored_string(&mut self, s: &str) -> io::Result<()> {
        self.string(&censor(s))
    }

    /// Write the UTF-8 mailbox name `name` in wire format.
    pub fn mailbox(&mut self, name: &str) -> io::Result<()> {
        let wire = utf7::encode(name);
        self.astring(&wire)
    }

    pub fn literal(&mut self, data: &[u8]) -> io::Result<()> {
        write!(self.writer, "{{{}}}\r\n", data.len())?;
        self.writer.write_all(data)
    }

    pub fn flag(&mut self, flag: &Flag) -> io::Result<()> {
        write!(self.writer, "{}", flag)
    }

    pub fn datetime(
        &mut self,
        datetime: &DateTime<FixedOffset>,
    ) -> io::Result<()> {
        write!(
            self.writer,
            "\"{}\"",
            datetime.format("%_d-%b-%Y %H:%M:%S %z")
        )
    }

    pub fn num_u32(&mut self, value: &u32) -> io::Result<()> {
        write!(self.writer, "{}", *value)
    }

    pub fn num_u64(&mut self, value: &u64) -> io::Result<()> {
        write!(self.writer, "{}", *value)
    }

    pub fn num_usize(&mut self, value: &usize) -> io::Result<()> {
        write!(self.writer, "{}", *value)
    }

    fn astring(&mut self, s: &str) -> io::Result<()> {
        if is_conservative_atom(s) {
            write!(self.writer, "{}", s)
        } else {
            self.string(s)
        }
    }

    fn string(&mut self, s: &str) -> io::Result<()> {
        if is_quotable(s) {
            write!(self.writer, "\"{}\"", s)
        } else {
            self.literal(s.as_bytes())
        }
    }
}

fn censor(s: &str) -> Cow<'_, str> {
    if s.is_ascii() {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.replace(|ch| ch > '\u{7f}', "X"))
    }
}

fn encode(s: &str) -> Cow<'_, str> {
    if s.is_ascii() {
        return Cow::Borrowed(s);
    }

    let mut total_accum = String::new();
    let mut part_accum = String::new();
    let mut first = true;
    // Copy whole characters one at a time, breaking into separate encoded
    // words when they start getting too long. Multi-byte characters may not
    // be split across words.
    for c in s.chars() {
        part_accum.push(c);

        // An encoded word is at most 76 characters. `=?utf-8?b??=` is 12 of
        // them, leaving 64 for base64, i.e. 48 raw bytes.
        if part_accum.len() > 40 {
            encode_part(&mut total_accum, &part_accum, first);
            part_accum.clear();
            first = false;
        }
    }

    encode_part(&mut total_accum, &part_accum, first);
    Cow::Owned(total_accum)
}

fn encode_part(dst: &mut String, src: &str, first: bool) {
    if src.is_empty() {
        return;
    }

    if !first {
        dst.push(' ');
    }

    dst.push_str("=?utf-8?b?");
    dst.push_str(&base64::encode_config(src, base64::STANDARD_NO_PAD));
    dst.push_str("?=");
}

fn is_conservative_atom(s: &str) -> bool {
    !"nil".eq_ignore_ascii_case(s)
        && !s.is_empty()
        && s.as_bytes().iter().copied().all(|b| {
            matches!(
                b,
                b'a'..=b'z'
                    | b'A'..=b'Z'
                    | b'0'..=b'9'
                    | b'='
                    | b'?'
                    | b'/'
                    | b'+'
                    | b'_'
                    | b'.'
                    | b'-'
            )
        })
}

fn is_quotable(s: &str) -> bool {
    s.len() < 100
        && s
            .as_bytes()
            .iter()
            .copied()
            .all(|b| !matches!(b, 0..=31 | 127..=255 | b'\\' | b'"'))
}
