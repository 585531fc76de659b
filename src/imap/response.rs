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

//! The response half of the IMAP grammar.
//!
//! Responses are built as a small AST and then written through a
//! `LexWriter`, which takes care of choosing between atoms, quoted strings
//! and literals.

use std::borrow::Cow;
use std::io::{self, Write};

use super::lex::LexWriter;
use crate::account::mailbox::{FetchedItem, FetchedMessage};
use crate::account::model::*;
use crate::mime::fetch::bodystructure::BodyStructure;
use crate::mime::fetch::envelope::{Envelope, EnvelopeAddress};
use crate::mime::fetch::section::{BodySection, Imap2Section, LeafType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RespCondType {
    Ok,
    No,
    Bad,
    Bye,
}

impl RespCondType {
    fn name(self) -> &'static str {
        match self {
            RespCondType::Ok => "OK",
            RespCondType::No => "NO",
            RespCondType::Bad => "BAD",
            RespCondType::Bye => "BYE",
        }
    }
}

/// The bracketed code at the start of a condition response's text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RespTextCode<'a> {
    Alert,
    Parse,
    /// Always followed by `\*` on the wire.
    PermanentFlags(Vec<Flag>),
    ReadOnly,
    ReadWrite,
    TryCreate,
    UidNext(Uid),
    UidValidity(u32),
    Unseen(Seqnum),
    // RFC 4315
    AppendUid(u32, Uid),
    CopyUid(u32, SeqRange<Uid>, SeqRange<Uid>),
    // RFC 5530
    ExpungeIssued,
    Nonexistent,
    Cannot,
    AlreadyExists,
    ClientBug,
    ServerBug,
    Limit,
    BadCharset,
    Capability(Vec<Cow<'a, str>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CondResponse<'a> {
    pub cond: RespCondType,
    pub code: Option<RespTextCode<'a>>,
    pub quip: Option<Cow<'a, str>>,
}

/// One `LIST` or `LSUB` result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxList<'a> {
    pub name: String,
    pub attributes: Vec<MailboxAttribute>,
    /// Sent as `NIL` when empty.
    pub delimiter: Cow<'a, str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response<'a> {
    Cond(CondResponse<'a>),
    Capability(Vec<Cow<'a, str>>),
    Flags(Vec<Flag>),
    Exists(u32),
    Recent(u32),
    Expunge(u32),
    Fetch(FetchedMessage),
    List(MailboxList<'a>),
    Lsub(MailboxList<'a>),
    Search(Vec<u32>),
    Status(StatusResponse),
    /// `None` is sent as `ID NIL`.
    Id(Option<Vec<(Cow<'a, str>, Option<Cow<'a, str>>)>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseLine<'a> {
    /// `None` for untagged responses.
    pub tag: Option<Cow<'a, str>>,
    pub response: Response<'a>,
}

impl<'a> Response<'a> {
    pub fn ok(quip: impl Into<Cow<'a, str>>) -> Self {
        Self::cond(RespCondType::Ok, None, quip)
    }

    pub fn no(code: Option<RespTextCode<'a>>, quip: impl Into<Cow<'a, str>>) -> Self {
        Self::cond(RespCondType::No, code, quip)
    }

    pub fn bad(code: Option<RespTextCode<'a>>, quip: impl Into<Cow<'a, str>>) -> Self {
        Self::cond(RespCondType::Bad, code, quip)
    }

    pub fn bye(quip: impl Into<Cow<'a, str>>) -> Self {
        Self::cond(RespCondType::Bye, None, quip)
    }

    pub fn cond(
        cond: RespCondType,
        code: Option<RespTextCode<'a>>,
        quip: impl Into<Cow<'a, str>>,
    ) -> Self {
        Response::Cond(CondResponse {
            cond,
            code,
            quip: Some(quip.into()),
        })
    }

    /// If this is a condition response, its condition.
    pub fn cond_type(&self) -> Option<RespCondType> {
        match *self {
            Response::Cond(ref c) => Some(c.cond),
            _ => None,
        }
    }
}

impl<'a> ResponseLine<'a> {
    pub fn untagged(response: Response<'a>) -> Self {
        ResponseLine {
            tag: None,
            response,
        }
    }

    pub fn tagged(tag: impl Into<Cow<'a, str>>, response: Response<'a>) -> Self {
        ResponseLine {
            tag: Some(tag.into()),
            response,
        }
    }

    /// Write this line, without the trailing CRLF.
    pub fn write_to<W: Write>(&self, w: &mut LexWriter<W>) -> io::Result<()> {
        match self.tag {
            None => w.verbatim("* ")?,
            Some(ref tag) => {
                w.verbatim(tag)?;
                w.verbatim(" ")?;
            }
        }

        write_response(w, &self.response)
    }

    /// Render this line, CRLF included, into a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = LexWriter::new(Vec::new());
        // Writes into a Vec cannot fail
        let _ = self.write_to(&mut w);
        let mut data = w.into_inner();
        data.extend_from_slice(b"\r\n");
        data
    }
}

fn write_response<W: Write>(
    w: &mut LexWriter<W>,
    response: &Response<'_>,
) -> io::Result<()> {
    match *response {
        Response::Cond(ref cond) => write_cond(w, cond),
        Response::Capability(ref caps) => {
            w.verbatim("CAPABILITY")?;
            write_capabilities(w, caps)
        }
        Response::Flags(ref flags) => {
            w.verbatim("FLAGS ")?;
            write_flag_list(w, flags, false)
        }
        Response::Exists(n) => write!(w_raw(w), "{} EXISTS", n),
        Response::Recent(n) => write!(w_raw(w), "{} RECENT", n),
        Response::Expunge(n) => write!(w_raw(w), "{} EXPUNGE", n),
        Response::Fetch(ref msg) => write_fetch(w, msg),
        Response::List(ref list) => write_list(w, "LIST", list),
        Response::Lsub(ref list) => write_list(w, "LSUB", list),
        Response::Search(ref hits) => {
            w.verbatim("SEARCH")?;
            for hit in hits {
                w.verbatim(" ")?;
                w.num_u32(hit)?;
            }
            Ok(())
        }
        Response::Status(ref status) => write_status(w, status),
        Response::Id(ref params) => write_id(w, params),
    }
}

/// `write!` needs something implementing `Write`; route it through
/// `verbatim_bytes` so everything still goes through the `LexWriter`.
fn w_raw<'w, W: Write>(w: &'w mut LexWriter<W>) -> RawWrite<'w, W> {
    RawWrite(w)
}

struct RawWrite<'w, W>(&'w mut LexWriter<W>);

impl<W: Write> Write for RawWrite<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.verbatim_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn write_cond<W: Write>(
    w: &mut LexWriter<W>,
    cond: &CondResponse<'_>,
) -> io::Result<()> {
    w.verbatim(cond.cond.name())?;
    if let Some(ref code) = cond.code {
        w.verbatim(" [")?;
        write_code(w, code)?;
        w.verbatim("]")?;
    }
    if let Some(ref quip) = cond.quip {
        w.verbatim(" ")?;
        write_text(w, quip)?;
    }
    Ok(())
}

/// Free-form text may not contain line breaks, and we keep it to ASCII.
fn write_text<W: Write>(w: &mut LexWriter<W>, text: &str) -> io::Result<()> {
    let clean: String = text
        .chars()
        .map(|c| {
            if c.is_control() || !c.is_ascii() {
                ' '
            } else {
                c
            }
        })
        .collect();
    w.verbatim(&clean)
}

fn write_code<W: Write>(
    w: &mut LexWriter<W>,
    code: &RespTextCode<'_>,
) -> io::Result<()> {
    match *code {
        RespTextCode::Alert => w.verbatim("ALERT"),
        RespTextCode::Parse => w.verbatim("PARSE"),
        RespTextCode::PermanentFlags(ref flags) => {
            // A read-only snapshot has no permanent flags at all, not even
            // new keywords.
            w.verbatim("PERMANENTFLAGS ")?;
            write_flag_list(w, flags, !flags.is_empty())
        }
        RespTextCode::ReadOnly => w.verbatim("READ-ONLY"),
        RespTextCode::ReadWrite => w.verbatim("READ-WRITE"),
        RespTextCode::TryCreate => w.verbatim("TRYCREATE"),
        RespTextCode::UidNext(uid) => {
            write!(w_raw(w), "UIDNEXT {}", uid.0.get())
        }
        RespTextCode::UidValidity(v) => write!(w_raw(w), "UIDVALIDITY {}", v),
        RespTextCode::Unseen(seqnum) => {
            write!(w_raw(w), "UNSEEN {}", seqnum.0.get())
        }
        RespTextCode::AppendUid(v, uid) => {
            write!(w_raw(w), "APPENDUID {} {}", v, uid.0.get())
        }
        RespTextCode::CopyUid(v, ref from, ref to) => {
            write!(w_raw(w), "COPYUID {} {} {}", v, from, to)
        }
        RespTextCode::ExpungeIssued => w.verbatim("EXPUNGEISSUED"),
        RespTextCode::Nonexistent => w.verbatim("NONEXISTENT"),
        RespTextCode::Cannot => w.verbatim("CANNOT"),
        RespTextCode::AlreadyExists => w.verbatim("ALREADYEXISTS"),
        RespTextCode::ClientBug => w.verbatim("CLIENTBUG"),
        RespTextCode::ServerBug => w.verbatim("SERVERBUG"),
        RespTextCode::Limit => w.verbatim("LIMIT"),
        RespTextCode::BadCharset => w.verbatim("BADCHARSET (UTF-8 US-ASCII)"),
        RespTextCode::Capability(ref caps) => {
            w.verbatim("CAPABILITY")?;
            write_capabilities(w, caps)
        }
    }
}

fn write_capabilities<W: Write>(
    w: &mut LexWriter<W>,
    caps: &[Cow<'_, str>],
) -> io::Result<()> {
    for cap in caps {
        w.verbatim(" ")?;
        w.verbatim(cap)?;
    }
    Ok(())
}

fn write_flag_list<W: Write>(
    w: &mut LexWriter<W>,
    flags: &[Flag],
    wildcard: bool,
) -> io::Result<()> {
    w.verbatim("(")?;
    for (ix, flag) in flags.iter().enumerate() {
        if ix > 0 {
            w.verbatim(" ")?;
        }
        w.flag(flag)?;
    }
    if wildcard {
        if !flags.is_empty() {
            w.verbatim(" ")?;
        }
        w.verbatim("\\*")?;
    }
    w.verbatim(")")
}

fn write_list<W: Write>(
    w: &mut LexWriter<W>,
    kind: &str,
    list: &MailboxList<'_>,
) -> io::Result<()> {
    w.verbatim(kind)?;
    w.verbatim(" (")?;
    for (ix, attr) in list.attributes.iter().enumerate() {
        if ix > 0 {
            w.verbatim(" ")?;
        }
        w.verbatim(attr.name())?;
    }
    w.verbatim(") ")?;
    if list.delimiter.is_empty() {
        w.nil()?;
    } else {
        w.censored_string(&list.delimiter)?;
    }
    w.verbatim(" ")?;
    w.mailbox(&list.name)
}

fn write_status<W: Write>(
    w: &mut LexWriter<W>,
    status: &StatusResponse,
) -> io::Result<()> {
    w.verbatim("STATUS ")?;
    w.mailbox(&status.name)?;
    w.verbatim(" (")?;

    let mut items = Vec::new();
    if let Some(n) = status.messages {
        items.push(format!("MESSAGES {}", n));
    }
    if let Some(n) = status.recent {
        items.push(format!("RECENT {}", n));
    }
    if let Some(uid) = status.uidnext {
        items.push(format!("UIDNEXT {}", uid.0.get()));
    }
    if let Some(v) = status.uidvalidity {
        items.push(format!("UIDVALIDITY {}", v));
    }
    if let Some(n) = status.unseen {
        items.push(format!("UNSEEN {}", n));
    }

    w.verbatim(&items.join(" "))?;
    w.verbatim(")")
}

fn write_id<W: Write>(
    w: &mut LexWriter<W>,
    params: &Option<Vec<(Cow<'_, str>, Option<Cow<'_, str>>)>>,
) -> io::Result<()> {
    w.verbatim("ID ")?;
    let params = match *params {
        None => return w.nil(),
        Some(ref params) => params,
    };

    w.verbatim("(")?;
    for (ix, &(ref key, ref value)) in params.iter().enumerate() {
        if ix > 0 {
            w.verbatim(" ")?;
        }
        w.censored_string(key)?;
        w.verbatim(" ")?;
        w.censored_nstring(value)?;
    }
    w.verbatim(")")
}

fn write_fetch<W: Write>(
    w: &mut LexWriter<W>,
    msg: &FetchedMessage,
) -> io::Result<()> {
    write!(w_raw(w), "{} FETCH (", msg.seqnum.0.get())?;
    for (ix, item) in msg.items.iter().enumerate() {
        if ix > 0 {
            w.verbatim(" ")?;
        }

        match *item {
            FetchedItem::Uid(uid) => write!(w_raw(w), "UID {}", uid.0.get())?,
            FetchedItem::Flags { ref flags, recent } => {
                w.verbatim("FLAGS (")?;
                for (ix, flag) in flags.iter().enumerate() {
                    if ix > 0 {
                        w.verbatim(" ")?;
                    }
                    w.flag(flag)?;
                }
                if recent {
                    if !flags.is_empty() {
                        w.verbatim(" ")?;
                    }
                    w.verbatim("\\Recent")?;
                }
                w.verbatim(")")?;
            }
            FetchedItem::Rfc822Size(size) => {
                w.verbatim("RFC822.SIZE ")?;
                w.num_usize(&size)?;
            }
            FetchedItem::InternalDate(ref date) => {
                w.verbatim("INTERNALDATE ")?;
                w.datetime(date)?;
            }
            FetchedItem::Envelope(ref envelope) => {
                w.verbatim("ENVELOPE ")?;
                write_envelope(w, envelope)?;
            }
            FetchedItem::BodyStructure(ref bs) => {
                w.verbatim("BODYSTRUCTURE ")?;
                write_body_structure(w, bs, true)?;
            }
            FetchedItem::Body(ref bs) => {
                w.verbatim("BODY ")?;
                write_body_structure(w, bs, false)?;
            }
            FetchedItem::Section(ref section, ref data) => {
                write_section_name(w, section)?;
                w.verbatim(" ")?;
                w.literal(data)?;
            }
        }
    }
    w.verbatim(")")
}

fn write_envelope<W: Write>(
    w: &mut LexWriter<W>,
    envelope: &Envelope,
) -> io::Result<()> {
    w.verbatim("(")?;
    w.censored_nstring(&envelope.date)?;
    w.verbatim(" ")?;
    w.encoded_nstring(&envelope.subject)?;
    for addresses in [
        &envelope.from,
        &envelope.sender,
        &envelope.reply_to,
        &envelope.to,
        &envelope.cc,
        &envelope.bcc,
    ] {
        w.verbatim(" ")?;
        write_address_list(w, addresses)?;
    }
    w.verbatim(" ")?;
    w.censored_nstring(&envelope.in_reply_to)?;
    w.verbatim(" ")?;
    w.censored_nstring(&envelope.message_id)?;
    w.verbatim(")")
}

fn write_address_list<W: Write>(
    w: &mut LexWriter<W>,
    addresses: &[EnvelopeAddress],
) -> io::Result<()> {
    if addresses.is_empty() {
        return w.nil();
    }

    w.verbatim("(")?;
    for address in addresses {
        w.verbatim("(")?;
        w.encoded_nstring(&address.name)?;
        w.verbatim(" NIL ")?;
        w.censored_nstring(&address.local)?;
        w.verbatim(" ")?;
        w.censored_nstring(&address.domain)?;
        w.verbatim(")")?;
    }
    w.verbatim(")")
}

fn write_parms<W: Write>(
    w: &mut LexWriter<W>,
    parms: &[(String, String)],
) -> io::Result<()> {
    if parms.is_empty() {
        return w.nil();
    }

    w.verbatim("(")?;
    for (ix, &(ref k, ref v)) in parms.iter().enumerate() {
        if ix > 0 {
            w.verbatim(" ")?;
        }
        w.censored_string(k)?;
        w.verbatim(" ")?;
        w.censored_string(v)?;
    }
    w.verbatim(")")
}

fn write_body_structure<W: Write>(
    w: &mut LexWriter<W>,
    bs: &BodyStructure,
    extended: bool,
) -> io::Result<()> {
    w.verbatim("(")?;

    let (ref typ, ref subtype) = bs.content_type;
    let is_multipart = typ.eq_ignore_ascii_case("multipart");
    let is_message = typ.eq_ignore_ascii_case("message")
        && subtype.eq_ignore_ascii_case("rfc822")
        && 1 == bs.children.len();

    if is_multipart {
        for child in &bs.children {
            write_body_structure(w, child, extended)?;
        }
        // A multipart with no parts can't be expressed; pretend it has one
        // empty text part.
        if bs.children.is_empty() {
            w.verbatim(
                "(\"text\" \"plain\" NIL NIL NIL \"7BIT\" 0 0)",
            )?;
        }
        w.verbatim(" ")?;
        w.censored_string(subtype)?;

        if extended {
            w.verbatim(" ")?;
            write_parms(w, &bs.content_type_parms)?;
            w.verbatim(" ")?;
            write_disposition_and_location(w, bs)?;
        }
        return w.verbatim(")");
    }

    w.censored_string(typ)?;
    w.verbatim(" ")?;
    w.censored_string(subtype)?;
    w.verbatim(" ")?;
    write_parms(w, &bs.content_type_parms)?;
    w.verbatim(" ")?;
    w.censored_nstring(&bs.content_id)?;
    w.verbatim(" ")?;
    w.encoded_nstring(&bs.content_description)?;
    w.verbatim(" ")?;
    w.censored_string(&bs.content_transfer_encoding)?;
    w.verbatim(" ")?;
    w.num_u64(&bs.size_octets)?;

    if is_message {
        let child = &bs.children[0];
        w.verbatim(" ")?;
        write_envelope(w, &child.envelope)?;
        w.verbatim(" ")?;
        write_body_structure(w, child, extended)?;
        w.verbatim(" ")?;
        w.num_u64(&bs.size_lines)?;
    } else if typ.eq_ignore_ascii_case("text") {
        w.verbatim(" ")?;
        w.num_u64(&bs.size_lines)?;
    }

    if extended {
        w.verbatim(" ")?;
        w.censored_nstring(&bs.md5)?;
        w.verbatim(" ")?;
        write_disposition_and_location(w, bs)?;
    }

    w.verbatim(")")
}

fn write_disposition_and_location<W: Write>(
    w: &mut LexWriter<W>,
    bs: &BodyStructure,
) -> io::Result<()> {
    match bs.content_disposition {
        None => w.nil()?,
        Some(ref disposition) => {
            w.verbatim("(")?;
            w.censored_string(disposition)?;
            w.verbatim(" ")?;
            write_parms(w, &bs.content_disposition_parms)?;
            w.verbatim(")")?;
        }
    }
    w.verbatim(" ")?;
    w.censored_nstring(&bs.content_language)?;
    w.verbatim(" ")?;
    w.censored_nstring(&bs.content_location)
}

fn write_section_name<W: Write>(
    w: &mut LexWriter<W>,
    section: &BodySection,
) -> io::Result<()> {
    match section.report_as_legacy {
        Some(Imap2Section::Rfc822) => return w.verbatim("RFC822"),
        Some(Imap2Section::Rfc822Header) => return w.verbatim("RFC822.HEADER"),
        Some(Imap2Section::Rfc822Text) => return w.verbatim("RFC822.TEXT"),
        None => (),
    }

    let mut parts: Vec<String> = section
        .subscripts
        .iter()
        .map(|s| s.to_string())
        .collect();

    match section.leaf_type {
        LeafType::Full | LeafType::Content => (),
        LeafType::Headers if section.header_filter.is_empty() => {
            parts.push("HEADER".to_owned())
        }
        LeafType::Headers => {
            let names = section
                .header_filter
                .iter()
                .map(|h| {
                    let mut v = Vec::new();
                    let mut lw = LexWriter::new(&mut v);
                    let _ = lw.censored_astring(h);
                    String::from_utf8_lossy(&v).into_owned()
                })
                .collect::<Vec<_>>()
                .join(" ");
            parts.push(format!(
                "HEADER.FIELDS{} ({})",
                if section.discard_matching_headers {
                    ".NOT"
                } else {
                    ""
                },
                names
            ));
        }
        LeafType::Mime => parts.push("MIME".to_owned()),
        LeafType::Text => parts.push("TEXT".to_owned()),
    }

    w.verbatim("BODY[")?;
    w.verbatim(&parts.join("."))?;
    w.verbatim("]")?;
    if let Some((start, _)) = section.partial {
        write!(w_raw(w), "<{}>", start)?;
    }
    Ok(())
}
