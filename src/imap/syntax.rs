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

//! The command AST and the nom parsers which build it.
//!
//! Everything here works on a complete command as assembled by the request
//! reader: literals are inline in the buffer, each still introduced by its
//! `{N}\r\n` (or `{N+}\r\n`) marker, and the final line ending has been
//! stripped.
//!
//! The types borrow from that buffer where they can. Sequence sets are left
//! in their raw form since resolving `*` needs the selected mailbox.

use std::borrow::Cow;
use std::str;

use chrono::prelude::*;
use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, tag, tag_no_case, take, take_while1,
                      take_while_m_n},
    character::{complete::digit1, is_digit},
    combinator::{map, map_opt, map_res, opt, value},
    error::{make_error, ErrorKind},
    multi::{fold_many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::account::model::Flag;
use crate::mime::utf7;

// ==================== AST ====================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginCommand<'a> {
    pub userid: Cow<'a, str>,
    pub password: Cow<'a, str>,
}

/// The argument of `SELECT`, `EXAMINE`, `CREATE`, `DELETE`, `SUBSCRIBE` and
/// `UNSUBSCRIBE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxCommand<'a> {
    pub mailbox: Cow<'a, str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameCommand<'a> {
    pub src: Cow<'a, str>,
    pub dst: Cow<'a, str>,
}

/// `LIST` or `LSUB`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListCommand<'a> {
    pub reference: Cow<'a, str>,
    pub pattern: Cow<'a, str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusAtt {
    Messages,
    Recent,
    UidNext,
    UidValidity,
    Unseen,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusCommand<'a> {
    pub mailbox: Cow<'a, str>,
    pub atts: Vec<StatusAtt>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendCommand<'a> {
    pub mailbox: Cow<'a, str>,
    pub flags: Vec<Flag>,
    pub internal_date: Option<DateTime<FixedOffset>>,
    pub message: Cow<'a, [u8]>,
}

/// `ID`. `parameters` is `None` for `ID NIL`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdCommand<'a> {
    pub parameters: Option<Vec<(Cow<'a, str>, Option<Cow<'a, str>>)>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchCommand<'a> {
    pub charset: Option<Cow<'a, str>>,
    pub keys: Vec<SearchKey<'a>>,
}

/// A search key as the client wrote it.
///
/// String operands are left undecoded since their charset is given
/// separately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchKey<'a> {
    All,
    Answered,
    Bcc(Cow<'a, [u8]>),
    Before(NaiveDate),
    Body(Cow<'a, [u8]>),
    Cc(Cow<'a, [u8]>),
    Deleted,
    Draft,
    Flagged,
    From(Cow<'a, [u8]>),
    Header(Cow<'a, [u8]>, Cow<'a, [u8]>),
    Keyword(Cow<'a, str>),
    Larger(u32),
    New,
    Not(Box<SearchKey<'a>>),
    Old,
    On(NaiveDate),
    Or(Box<SearchKey<'a>>, Box<SearchKey<'a>>),
    Recent,
    Seen,
    SentBefore(NaiveDate),
    SentOn(NaiveDate),
    SentSince(NaiveDate),
    Since(NaiveDate),
    Smaller(u32),
    Subject(Cow<'a, [u8]>),
    Text(Cow<'a, [u8]>),
    To(Cow<'a, [u8]>),
    Uid(Cow<'a, str>),
    Unanswered,
    Undeleted,
    Undraft,
    Unflagged,
    Unkeyword(Cow<'a, str>),
    Unseen,
    SequenceSet(Cow<'a, str>),
    And(Vec<SearchKey<'a>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionText<'a> {
    Header,
    HeaderFields {
        not: bool,
        headers: Vec<Cow<'a, str>>,
    },
    Text,
    Mime,
}

/// The part between the brackets of `BODY[...]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionSpec<'a> {
    pub subscripts: Vec<u32>,
    pub text: Option<SectionText<'a>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchAtt<'a> {
    Envelope,
    Flags,
    InternalDate,
    Rfc822,
    Rfc822Header,
    Rfc822Size,
    Rfc822Text,
    Body,
    BodyStructure,
    Uid,
    BodySection {
        peek: bool,
        section: SectionSpec<'a>,
        /// `<offset.count>`
        partial: Option<(u32, u32)>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchTarget<'a> {
    All,
    Fast,
    Full,
    Single(FetchAtt<'a>),
    Multi(Vec<FetchAtt<'a>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchCommand<'a> {
    pub messages: Cow<'a, str>,
    pub target: FetchTarget<'a>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreCommandType {
    Eq,
    Plus,
    Minus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreCommand<'a> {
    pub messages: Cow<'a, str>,
    pub typ: StoreCommandType,
    pub silent: bool,
    pub flags: Vec<Flag>,
}

/// `COPY` or `MOVE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyCommand<'a> {
    pub messages: Cow<'a, str>,
    pub dst: Cow<'a, str>,
}

// ==================== COMMAND PAYLOADS ====================
//
// Each of these parses everything after the command keyword, including the
// leading space if there are arguments.

pub fn login_args(i: &[u8]) -> IResult<&[u8], LoginCommand<'_>> {
    map(
        pair(preceded(sp, astring), preceded(sp, astring)),
        |(userid, password)| LoginCommand { userid, password },
    )(i)
}

pub fn mailbox_args(i: &[u8]) -> IResult<&[u8], MailboxCommand<'_>> {
    map(preceded(sp, mailbox), |mailbox| MailboxCommand { mailbox })(i)
}

pub fn rename_args(i: &[u8]) -> IResult<&[u8], RenameCommand<'_>> {
    map(
        pair(preceded(sp, mailbox), preceded(sp, mailbox)),
        |(src, dst)| RenameCommand { src, dst },
    )(i)
}

pub fn list_args(i: &[u8]) -> IResult<&[u8], ListCommand<'_>> {
    map(
        pair(preceded(sp, list_reference), preceded(sp, list_mailbox)),
        |(reference, pattern)| ListCommand { reference, pattern },
    )(i)
}

pub fn status_args(i: &[u8]) -> IResult<&[u8], StatusCommand<'_>> {
    map(
        pair(
            preceded(sp, mailbox),
            preceded(
                sp,
                delimited(
                    tag("("),
                    separated_list1(sp, status_att),
                    tag(")"),
                ),
            ),
        ),
        |(mailbox, atts)| StatusCommand { mailbox, atts },
    )(i)
}

fn status_att(i: &[u8]) -> IResult<&[u8], StatusAtt> {
    alt((
        value(StatusAtt::Messages, tag_no_case("MESSAGES")),
        value(StatusAtt::Recent, tag_no_case("RECENT")),
        value(StatusAtt::UidNext, tag_no_case("UIDNEXT")),
        value(StatusAtt::UidValidity, tag_no_case("UIDVALIDITY")),
        value(StatusAtt::Unseen, tag_no_case("UNSEEN")),
    ))(i)
}

pub fn append_args(i: &[u8]) -> IResult<&[u8], AppendCommand<'_>> {
    map(
        tuple((
            preceded(sp, mailbox),
            opt(preceded(sp, flag_list)),
            opt(preceded(sp, datetime)),
            preceded(sp, literal),
        )),
        |(mailbox, flags, internal_date, message)| AppendCommand {
            mailbox,
            flags: flags.unwrap_or_default(),
            internal_date,
            message: Cow::Borrowed(message),
        },
    )(i)
}

pub fn id_args(i: &[u8]) -> IResult<&[u8], IdCommand<'_>> {
    map(
        preceded(
            sp,
            alt((
                value(None, kw("NIL")),
                map(
                    delimited(
                        tag("("),
                        separated_list0(
                            sp,
                            pair(terminated(string, sp), nstring),
                        ),
                        tag(")"),
                    ),
                    Some,
                ),
            )),
        ),
        |parameters| IdCommand { parameters },
    )(i)
}

pub fn search_args(i: &[u8]) -> IResult<&[u8], SearchCommand<'_>> {
    map(
        pair(
            opt(preceded(tag_no_case(" CHARSET "), astring)),
            preceded(sp, separated_list1(sp, search_key)),
        ),
        |(charset, keys)| SearchCommand { charset, keys },
    )(i)
}

fn search_key(i: &[u8]) -> IResult<&[u8], SearchKey<'_>> {
    alt((
        map(
            delimited(tag("("), separated_list1(sp, search_key), tag(")")),
            SearchKey::And,
        ),
        map(sequence_set, SearchKey::SequenceSet),
        search_key_word,
    ))(i)
}

fn search_key_word<'a>(i: &'a [u8]) -> IResult<&'a [u8], SearchKey<'a>> {
    fn boxed(k: SearchKey<'_>) -> Box<SearchKey<'_>> {
        Box::new(k)
    }

    let (rest, word) = take_while1(|b: u8| b.is_ascii_alphabetic())(i)?;
    let word = str::from_utf8(word).unwrap_or("").to_ascii_uppercase();
    let text = |i: &'a [u8]| preceded(sp, astring_bytes)(i);
    let day = |i: &'a [u8]| preceded(sp, date)(i);
    let num = |i: &'a [u8]| preceded(sp, number)(i);

    match &word[..] {
        "ALL" => Ok((rest, SearchKey::All)),
        "ANSWERED" => Ok((rest, SearchKey::Answered)),
        "BCC" => map(text, SearchKey::Bcc)(rest),
        "BEFORE" => map(day, SearchKey::Before)(rest),
        "BODY" => map(text, SearchKey::Body)(rest),
        "CC" => map(text, SearchKey::Cc)(rest),
        "DELETED" => Ok((rest, SearchKey::Deleted)),
        "DRAFT" => Ok((rest, SearchKey::Draft)),
        "FLAGGED" => Ok((rest, SearchKey::Flagged)),
        "FROM" => map(text, SearchKey::From)(rest),
        "HEADER" => map(pair(text, text), |(h, v)| SearchKey::Header(h, v))(
            rest,
        ),
        "KEYWORD" => map(preceded(sp, normal_atom), SearchKey::Keyword)(rest),
        "LARGER" => map(num, SearchKey::Larger)(rest),
        "NEW" => Ok((rest, SearchKey::New)),
        "NOT" => map(preceded(sp, search_key), |k| SearchKey::Not(boxed(k)))(
            rest,
        ),
        "OLD" => Ok((rest, SearchKey::Old)),
        "ON" => map(day, SearchKey::On)(rest),
        "OR" => map(
            pair(preceded(sp, search_key), preceded(sp, search_key)),
            |(a, b)| SearchKey::Or(boxed(a), boxed(b)),
        )(rest),
        "RECENT" => Ok((rest, SearchKey::Recent)),
        "SEEN" => Ok((rest, SearchKey::Seen)),
        "SENTBEFORE" => map(day, SearchKey::SentBefore)(rest),
        "SENTON" => map(day, SearchKey::SentOn)(rest),
        "SENTSINCE" => map(day, SearchKey::SentSince)(rest),
        "SINCE" => map(day, SearchKey::Since)(rest),
        "SMALLER" => map(num, SearchKey::Smaller)(rest),
        "SUBJECT" => map(text, SearchKey::Subject)(rest),
        "TEXT" => map(text, SearchKey::Text)(rest),
        "TO" => map(text, SearchKey::To)(rest),
        "UID" => map(preceded(sp, sequence_set), SearchKey::Uid)(rest),
        "UNANSWERED" => Ok((rest, SearchKey::Unanswered)),
        "UNDELETED" => Ok((rest, SearchKey::Undeleted)),
        "UNDRAFT" => Ok((rest, SearchKey::Undraft)),
        "UNFLAGGED" => Ok((rest, SearchKey::Unflagged)),
        "UNKEYWORD" => {
            map(preceded(sp, normal_atom), SearchKey::Unkeyword)(rest)
        }
        "UNSEEN" => Ok((rest, SearchKey::Unseen)),
        _ => Err(nom::Err::Error(make_error(i, ErrorKind::Tag))),
    }
}

pub fn fetch_args(i: &[u8]) -> IResult<&[u8], FetchCommand<'_>> {
    map(
        pair(preceded(sp, sequence_set), preceded(sp, fetch_target)),
        |(messages, target)| FetchCommand { messages, target },
    )(i)
}

fn fetch_target(i: &[u8]) -> IResult<&[u8], FetchTarget<'_>> {
    alt((
        map(
            delimited(tag("("), separated_list1(sp, fetch_att), tag(")")),
            FetchTarget::Multi,
        ),
        // The macros must be tried before the single attributes since `FAST`
        // and `FULL` would otherwise be rejected as unknown words.
        value(FetchTarget::All, kw_word("ALL")),
        value(FetchTarget::Fast, kw_word("FAST")),
        value(FetchTarget::Full, kw_word("FULL")),
        map(fetch_att, FetchTarget::Single),
    ))(i)
}

fn fetch_att(i: &[u8]) -> IResult<&[u8], FetchAtt<'_>> {
    let (rest, word) =
        take_while1(|b: u8| b.is_ascii_alphanumeric() || b'.' == b)(i)?;
    let word = str::from_utf8(word).unwrap_or("").to_ascii_uppercase();
    let has_section = rest.starts_with(b"[");

    match (&word[..], has_section) {
        ("ENVELOPE", false) => Ok((rest, FetchAtt::Envelope)),
        ("FLAGS", false) => Ok((rest, FetchAtt::Flags)),
        ("INTERNALDATE", false) => Ok((rest, FetchAtt::InternalDate)),
        ("RFC822", false) => Ok((rest, FetchAtt::Rfc822)),
        ("RFC822.HEADER", false) => Ok((rest, FetchAtt::Rfc822Header)),
        ("RFC822.SIZE", false) => Ok((rest, FetchAtt::Rfc822Size)),
        ("RFC822.TEXT", false) => Ok((rest, FetchAtt::Rfc822Text)),
        ("BODY", false) => Ok((rest, FetchAtt::Body)),
        ("BODYSTRUCTURE", false) => Ok((rest, FetchAtt::BodyStructure)),
        ("UID", false) => Ok((rest, FetchAtt::Uid)),
        ("BODY", true) | ("BODY.PEEK", true) => {
            let peek = "BODY.PEEK" == word;
            map(
                pair(
                    delimited(tag("["), section_spec, tag("]")),
                    opt(partial),
                ),
                move |(section, partial)| FetchAtt::BodySection {
                    peek,
                    section,
                    partial,
                },
            )(rest)
        }
        _ => Err(nom::Err::Error(make_error(i, ErrorKind::Tag))),
    }
}

fn section_spec(i: &[u8]) -> IResult<&[u8], SectionSpec<'_>> {
    alt((
        map(
            pair(
                separated_list1(tag("."), nz_number),
                opt(preceded(
                    tag("."),
                    alt((value(SectionText::Mime, tag_no_case("MIME")),
                         section_msgtext)),
                )),
            ),
            |(subscripts, text)| SectionSpec { subscripts, text },
        ),
        map(section_msgtext, |text| SectionSpec {
            subscripts: vec![],
            text: Some(text),
        }),
        map(tag(""), |_| SectionSpec::default()),
    ))(i)
}

fn section_msgtext(i: &[u8]) -> IResult<&[u8], SectionText<'_>> {
    alt((
        map(
            pair(
                alt((
                    value(true, tag_no_case("HEADER.FIELDS.NOT")),
                    value(false, tag_no_case("HEADER.FIELDS")),
                )),
                preceded(
                    sp,
                    delimited(tag("("), separated_list1(sp, astring), tag(")")),
                ),
            ),
            |(not, headers)| SectionText::HeaderFields { not, headers },
        ),
        value(SectionText::Header, tag_no_case("HEADER")),
        value(SectionText::Text, tag_no_case("TEXT")),
    ))(i)
}

fn partial(i: &[u8]) -> IResult<&[u8], (u32, u32)> {
    delimited(
        tag("<"),
        pair(number, preceded(tag("."), nz_number)),
        tag(">"),
    )(i)
}

pub fn store_args(i: &[u8]) -> IResult<&[u8], StoreCommand<'_>> {
    map(
        tuple((
            preceded(sp, sequence_set),
            preceded(
                sp,
                alt((
                    value(StoreCommandType::Plus, tag("+")),
                    value(StoreCommandType::Minus, tag("-")),
                    value(StoreCommandType::Eq, tag("")),
                )),
            ),
            preceded(tag_no_case("FLAGS"), opt(tag_no_case(".SILENT"))),
            preceded(sp, alt((flag_list, separated_list1(sp, flag)))),
        )),
        |(messages, typ, silent, flags)| StoreCommand {
            messages,
            typ,
            silent: silent.is_some(),
            flags,
        },
    )(i)
}

pub fn copy_args(i: &[u8]) -> IResult<&[u8], CopyCommand<'_>> {
    map(
        pair(preceded(sp, sequence_set), preceded(sp, mailbox)),
        |(messages, dst)| CopyCommand { messages, dst },
    )(i)
}

pub fn uid_expunge_args(i: &[u8]) -> IResult<&[u8], Cow<'_, str>> {
    preceded(sp, sequence_set)(i)
}

// ==================== PRIMITIVE PARSERS ====================

pub fn sp(i: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(" ")(i)
}

/// A case-insensitive keyword.
pub fn kw<'a>(
    k: &'static str,
) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], &'a [u8]> {
    tag_no_case(k)
}

/// A case-insensitive keyword which is not merely the prefix of a longer
/// word.
fn kw_word<'a>(
    k: &'static str,
) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], &'a [u8]> {
    move |i: &'a [u8]| {
        let (rest, word) = tag_no_case(k)(i)?;
        if rest.first().map_or(false, |b| b.is_ascii_alphanumeric()) {
            Err(nom::Err::Error(make_error(i, ErrorKind::Tag)))
        } else {
            Ok((rest, word))
        }
    }
}

pub fn normal_atom(i: &[u8]) -> IResult<&[u8], Cow<'_, str>> {
    map(
        take_while1(|b| match b {
            0..=b' ' => false,
            127..=255 => false,
            b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b']' => false,
            _ => true,
        }),
        String::from_utf8_lossy,
    )(i)
}

// This isn't formally part of the IMAP syntax definition. It lets us keep
// the backslash prefix of system flags throughout. Garbage like "foo\bar" is
// accepted here but rejected when the value is coerced into a `Flag`.
fn backslash_atom(i: &[u8]) -> IResult<&[u8], Cow<'_, str>> {
    map(
        take_while1(|b| match b {
            0..=b' ' => false,
            127..=255 => false,
            b'(' | b')' | b'{' | b'*' | b'%' | b'"' | b']' => false,
            _ => true,
        }),
        String::from_utf8_lossy,
    )(i)
}

fn astring_atom(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|b| match b {
        0..=b' ' => false,
        127..=255 => false,
        b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' => false,
        _ => true,
    })(i)
}

pub fn tag_atom(i: &[u8]) -> IResult<&[u8], Cow<'_, str>> {
    map(
        take_while1(|b| match b {
            0..=b' ' => false,
            127..=255 => false,
            b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b'+' => false,
            _ => true,
        }),
        String::from_utf8_lossy,
    )(i)
}

fn list_mailbox_atom(i: &[u8]) -> IResult<&[u8], Cow<'_, str>> {
    map(
        take_while1(|b| match b {
            0..=b' ' => false,
            127..=255 => false,
            b'(' | b')' | b'{' | b'\\' | b'"' => false,
            _ => true,
        }),
        String::from_utf8_lossy,
    )(i)
}

pub fn number(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(digit1, |s| {
        str::from_utf8(s).ok().and_then(|s| s.parse::<u32>().ok())
    })(i)
}

fn nz_number(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(number, |n| Some(n).filter(|&n| n > 0))(i)
}

/// A literal, synchronising or not. Returns the content.
pub fn literal(i: &[u8]) -> IResult<&[u8], &[u8]> {
    let (i, len) = delimited(
        tag("{"),
        number,
        alt((tag("+}\r\n"), tag("}\r\n"))),
    )(i)?;
    take(len)(i)
}

fn quoted_char(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(tag("\\"), alt((tag("\\"), tag("\""))))(i)
}

fn quoted_string_content(i: &[u8]) -> IResult<&[u8], &[u8]> {
    alt((quoted_char, is_not("\r\n\"\\")))(i)
}

fn quoted_bytes(i: &[u8]) -> IResult<&[u8], Cow<'_, [u8]>> {
    delimited(
        tag("\""),
        fold_many0(
            quoted_string_content,
            || Cow::Borrowed(&b""[..]),
            |mut accum: Cow<[u8]>, piece| {
                if accum.is_empty() {
                    Cow::Borrowed(piece)
                } else {
                    accum.to_mut().extend_from_slice(piece);
                    accum
                }
            },
        ),
        tag("\""),
    )(i)
}

fn string_bytes(i: &[u8]) -> IResult<&[u8], Cow<'_, [u8]>> {
    alt((quoted_bytes, map(literal, Cow::Borrowed)))(i)
}

/// An astring, undecoded.
pub fn astring_bytes(i: &[u8]) -> IResult<&[u8], Cow<'_, [u8]>> {
    alt((map(astring_atom, Cow::Borrowed), string_bytes))(i)
}

fn lossy(bytes: Cow<'_, [u8]>) -> Cow<'_, str> {
    match bytes {
        Cow::Borrowed(b) => String::from_utf8_lossy(b),
        Cow::Owned(b) => match String::from_utf8(b) {
            Ok(s) => Cow::Owned(s),
            Err(e) => {
                Cow::Owned(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        },
    }
}

pub fn string(i: &[u8]) -> IResult<&[u8], Cow<'_, str>> {
    map(string_bytes, lossy)(i)
}

pub fn astring(i: &[u8]) -> IResult<&[u8], Cow<'_, str>> {
    map(astring_bytes, lossy)(i)
}

pub fn nstring(i: &[u8]) -> IResult<&[u8], Option<Cow<'_, str>>> {
    alt((value(None, kw_word("NIL")), map(string, Some)))(i)
}

fn decode_mailbox(raw: Cow<'_, str>) -> Cow<'_, str> {
    let decoded = match raw {
        Cow::Owned(s) => Cow::Owned(utf7::decode(&s).into_owned()),
        Cow::Borrowed(s) => utf7::decode(s),
    };

    if decoded.eq_ignore_ascii_case("INBOX") && "INBOX" != decoded {
        Cow::Borrowed("INBOX")
    } else {
        decoded
    }
}

/// A mailbox name, decoded from modified UTF-7.
///
/// Any case of `INBOX` is normalised to upper case.
pub fn mailbox(i: &[u8]) -> IResult<&[u8], Cow<'_, str>> {
    map(astring, decode_mailbox)(i)
}

// The reference of LIST is a plain mailbox name, but an empty one is common
// and "INBOX" must not be special.
fn list_reference(i: &[u8]) -> IResult<&[u8], Cow<'_, str>> {
    map(astring, |raw| match raw {
        Cow::Owned(s) => Cow::Owned(utf7::decode(&s).into_owned()),
        Cow::Borrowed(s) => utf7::decode(s),
    })(i)
}

// Read: "mailbox as used by LIST and LSUB", which may contain wildcards.
fn list_mailbox(i: &[u8]) -> IResult<&[u8], Cow<'_, str>> {
    map(alt((list_mailbox_atom, string)), |raw| match raw {
        Cow::Owned(s) => Cow::Owned(utf7::decode(&s).into_owned()),
        Cow::Borrowed(s) => utf7::decode(s),
    })(i)
}

pub fn sequence_set(i: &[u8]) -> IResult<&[u8], Cow<'_, str>> {
    map(is_a("0123456789:*,"), String::from_utf8_lossy)(i)
}

/// A flag. `\Recent` is refused since clients may never set it.
pub fn flag(i: &[u8]) -> IResult<&[u8], Flag> {
    map_res(backslash_atom, |s| s.parse::<Flag>())(i)
}

pub fn flag_list(i: &[u8]) -> IResult<&[u8], Vec<Flag>> {
    delimited(tag("("), separated_list0(sp, flag), tag(")"))(i)
}

fn parse_u32_infallible(i: &[u8]) -> u32 {
    // Only ever called on runs of ASCII digits short enough to fit.
    str::from_utf8(i)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0)
}

fn one_digit(i: &[u8]) -> IResult<&[u8], u32> {
    map(take_while_m_n(1, 1, is_digit), parse_u32_infallible)(i)
}

fn two_digit(i: &[u8]) -> IResult<&[u8], u32> {
    map(take_while_m_n(2, 2, is_digit), parse_u32_infallible)(i)
}

fn four_digit(i: &[u8]) -> IResult<&[u8], u32> {
    map(take_while_m_n(4, 4, is_digit), parse_u32_infallible)(i)
}

fn time_of_day(i: &[u8]) -> IResult<&[u8], (u32, u32, u32)> {
    tuple((
        two_digit,
        preceded(tag(":"), two_digit),
        preceded(tag(":"), two_digit),
    ))(i)
}

fn numeric_zone(i: &[u8]) -> IResult<&[u8], i32> {
    map(
        pair(alt((tag("+"), tag("-"))), pair(two_digit, two_digit)),
        |(sign, (h, m))| {
            let n = (h * 60 + m) as i32;
            if b"-" == sign {
                -n
            } else {
                n
            }
        },
    )(i)
}

static MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct",
    "nov", "dec",
];

fn month(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(take(3usize), |name| {
        str::from_utf8(name).ok().and_then(|name| {
            MONTH_NAMES
                .iter()
                .position(|n| n.eq_ignore_ascii_case(name))
                .map(|ix| ix as u32 + 1)
        })
    })(i)
}

fn date_text(i: &[u8]) -> IResult<&[u8], NaiveDate> {
    map_opt(
        tuple((
            terminated(alt((two_digit, one_digit)), tag("-")),
            terminated(month, tag("-")),
            four_digit,
        )),
        |(d, m, y)| NaiveDate::from_ymd_opt(y as i32, m, d),
    )(i)
}

/// A `SEARCH` date, optionally quoted.
pub fn date(i: &[u8]) -> IResult<&[u8], NaiveDate> {
    alt((date_text, delimited(tag("\""), date_text, tag("\""))))(i)
}

fn datetime_date(i: &[u8]) -> IResult<&[u8], NaiveDate> {
    map_opt(
        tuple((
            terminated(
                alt((two_digit, preceded(tag(" "), one_digit))),
                tag("-"),
            ),
            terminated(month, tag("-")),
            four_digit,
        )),
        |(d, m, y)| NaiveDate::from_ymd_opt(y as i32, m, d),
    )(i)
}

/// The quoted `dd-Mon-yyyy HH:MM:SS +zzzz` of `APPEND`.
pub fn datetime(i: &[u8]) -> IResult<&[u8], DateTime<FixedOffset>> {
    map_opt(
        delimited(
            tag("\""),
            tuple((
                terminated(datetime_date, tag(" ")),
                terminated(time_of_day, tag(" ")),
                numeric_zone,
            )),
            tag("\""),
        ),
        |(date, (h, m, s), zone)| {
            FixedOffset::east_opt(zone * 60).and_then(|offset| {
                date.and_hms_opt(h, m, s).and_then(|datetime| {
                    offset.from_local_datetime(&datetime).latest()
                })
            })
        },
    )(i)
}
