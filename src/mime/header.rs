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

//! Parsing of RFC 5322 header blocks and the structured fields the IMAP
//! layer needs to understand.

use std::borrow::Cow;
use std::str;

use chrono::prelude::*;
use memchr::memchr;
use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, tag_no_case, take, take_while1,
                      take_while_m_n},
    character::complete::char,
    combinator::{map, map_opt, opt, value},
    multi::{fold_many0, many0, many0_count, many1_count, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

type PResult<'a, T> = IResult<&'a [u8], T>;

/// The location of one header field within a message.
///
/// Offsets are absolute within the buffer that was parsed. `end` includes
/// any continuation lines and the final line ending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderField {
    pub start: usize,
    pub colon: Option<usize>,
    pub end: usize,
}

impl HeaderField {
    /// The field name, without surrounding whitespace.
    pub fn name<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let name_end = self.colon.unwrap_or(self.end);
        trim(&data[self.start..name_end])
    }

    pub fn is_named(&self, data: &[u8], name: &str) -> bool {
        self.colon.is_some()
            && self.name(data).eq_ignore_ascii_case(name.as_bytes())
    }

    /// The raw value of the field, starting after the colon and including
    /// any folding and the final line ending.
    pub fn value<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        match self.colon {
            Some(colon) => &data[colon + 1..self.end],
            None => &data[self.end..self.end],
        }
    }

    /// The whole field, name and line ending included.
    pub fn raw<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }
}

/// The header section of a message or body part.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    pub fields: Vec<HeaderField>,
    /// Where the header section starts.
    pub start: usize,
    /// The first byte of the body. This is after the blank line terminating
    /// the headers, or the end of the part if there is no blank line.
    pub body_start: usize,
}

impl HeaderBlock {
    pub fn parse(data: &[u8]) -> Self {
        Self::parse_range(data, 0, data.len())
    }

    /// Parse the headers of the part occupying `data[start..end]`.
    pub fn parse_range(data: &[u8], start: usize, end: usize) -> Self {
        let mut fields = Vec::<HeaderField>::new();
        let mut pos = start;

        while pos < end {
            let line_end = match memchr(b'\n', &data[pos..end]) {
                Some(nl) => pos + nl + 1,
                None => end,
            };
            let line = &data[pos..line_end];

            if b"\r\n" == line || b"\n" == line {
                return HeaderBlock {
                    fields,
                    start,
                    body_start: line_end,
                };
            }

            match (line[0], fields.last_mut()) {
                (b' ', Some(prev)) | (b'\t', Some(prev)) => {
                    prev.end = line_end;
                }
                _ => fields.push(HeaderField {
                    start: pos,
                    colon: memchr(b':', line).map(|c| pos + c),
                    end: line_end,
                }),
            }

            pos = line_end;
        }

        HeaderBlock {
            fields,
            start,
            body_start: end,
        }
    }

    /// Return the raw value of the first field called `name`.
    pub fn get<'a>(&self, data: &'a [u8], name: &str) -> Option<&'a [u8]> {
        self.fields
            .iter()
            .find(|f| f.is_named(data, name))
            .map(|f| f.value(data))
    }

    /// Return the whole header section, including the terminating blank
    /// line if there is one.
    pub fn raw<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.body_start]
    }
}

/// Unfold a raw header value into a single line of text.
///
/// Line endings are removed, leading and trailing whitespace trimmed, and
/// invalid UTF-8 replaced.
pub fn unfold(value: &[u8]) -> String {
    let mut unfolded = Vec::with_capacity(value.len());
    for &b in value {
        if b'\r' != b && b'\n' != b {
            unfolded.push(b);
        }
    }

    String::from_utf8_lossy(trim(&unfolded)).into_owned()
}

fn trim(mut s: &[u8]) -> &[u8] {
    while let Some((&first, rest)) = s.split_first() {
        if !first.is_ascii_whitespace() {
            break;
        }
        s = rest;
    }
    while let Some((&last, rest)) = s.split_last() {
        if !last.is_ascii_whitespace() {
            break;
        }
        s = rest;
    }
    s
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrSpec<'a> {
    pub local: Vec<Cow<'a, [u8]>>,
    pub domain: Vec<Cow<'a, [u8]>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxSpec<'a> {
    pub addr: AddrSpec<'a>,
    pub name: Vec<Cow<'a, [u8]>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupSpec<'a> {
    pub name: Vec<Cow<'a, [u8]>>,
    pub boxes: Vec<MailboxSpec<'a>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address<'a> {
    Mailbox(MailboxSpec<'a>),
    Group(GroupSpec<'a>),
}

/// A parsed `Content-Type` field. Type, subtype, and parameter names are
/// lower-cased.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    pub typ: String,
    pub subtype: String,
    pub parms: Vec<(String, String)>,
}

impl Default for ContentType {
    fn default() -> Self {
        ContentType {
            typ: "text".to_owned(),
            subtype: "plain".to_owned(),
            parms: vec![("charset".to_owned(), "us-ascii".to_owned())],
        }
    }
}

impl ContentType {
    pub fn message_rfc822() -> Self {
        ContentType {
            typ: "message".to_owned(),
            subtype: "rfc822".to_owned(),
            parms: vec![],
        }
    }

    pub fn is_type(&self, typ: &str) -> bool {
        self.typ == typ
    }

    pub fn is(&self, typ: &str, subtype: &str) -> bool {
        self.typ == typ && self.subtype == subtype
    }

    pub fn parm(&self, name: &str) -> Option<&str> {
        self.parms
            .iter()
            .find(|&&(ref k, _)| k == name)
            .map(|&(_, ref v)| v.as_str())
    }
}

/// A parsed `Content-Disposition` field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDisposition {
    pub disposition: String,
    pub parms: Vec<(String, String)>,
}

fn ascii_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

fn digits(i: &[u8], min: usize, max: usize) -> PResult<'_, u32> {
    map_opt(take_while_m_n(min, max, ascii_digit), |d: &[u8]| {
        str::from_utf8(d).ok()?.parse::<u32>().ok()
    })(i)
}

fn digits_1_2(i: &[u8]) -> PResult<'_, u32> {
    digits(i, 1, 2)
}

fn digits_2(i: &[u8]) -> PResult<'_, u32> {
    digits(i, 2, 2)
}

// RFC 5322 3.2.1 "quoted-pair", including the 8-bit clean obsolete syntax.
fn quoted_pair(i: &[u8]) -> PResult<'_, &[u8]> {
    preceded(char('\\'), take(1usize))(i)
}

// RFC 5322 3.2.2 "Folding white space". Unfolding is not done separately, so
// line endings are simply more whitespace.
fn fws(i: &[u8]) -> PResult<'_, &[u8]> {
    map(is_a(" \t\r\n"), |_| &b" "[..])(i)
}

fn ctext(i: &[u8]) -> PResult<'_, &[u8]> {
    is_not("()\\ \t\r\n")(i)
}

fn ccontent(i: &[u8]) -> PResult<'_, ()> {
    alt((
        value((), ctext),
        value((), quoted_pair),
        value((), fws),
        comment,
    ))(i)
}

// RFC 5322 3.2.2 "comment". Recursive.
fn comment(i: &[u8]) -> PResult<'_, ()> {
    value((), delimited(char('('), many0_count(ccontent), char(')')))(i)
}

// RFC 5322 3.2.2 "CFWS". Unlike the formal syntax, this requires at least
// one element; callers wrap it in `opt` where it may be absent.
fn cfws(i: &[u8]) -> PResult<'_, ()> {
    value((), many1_count(alt((value((), fws), comment))))(i)
}

// RFC 5322 3.2.3 "atext", amended by RFC 6532 to include all non-ASCII
// bytes.
fn atext(i: &[u8]) -> PResult<'_, &[u8]> {
    take_while1(|ch: u8| {
        ch.is_ascii_alphanumeric()
            || b"!#$%&'*+-/=?^_`{|}~".contains(&ch)
            || ch >= 0x80
    })(i)
}

fn atom(i: &[u8]) -> PResult<'_, &[u8]> {
    delimited(opt(cfws), atext, opt(cfws))(i)
}

fn qtext(i: &[u8]) -> PResult<'_, &[u8]> {
    is_not(" \t\r\n\\\"")(i)
}

fn qcontent(i: &[u8]) -> PResult<'_, &[u8]> {
    alt((qtext, quoted_pair, fws))(i)
}

// RFC 5322 3.2.4 "quoted-string". Borrows where the content is one
// contiguous run.
fn quoted_string(i: &[u8]) -> PResult<'_, Cow<'_, [u8]>> {
    delimited(
        pair(opt(cfws), char('"')),
        fold_many0(
            qcontent,
            || Cow::Borrowed(&[][..]),
            |mut acc, item| {
                if acc.is_empty() {
                    acc = Cow::Borrowed(item);
                } else {
                    acc.to_mut().extend_from_slice(item);
                }
                acc
            },
        ),
        pair(char('"'), opt(cfws)),
    )(i)
}

fn word(i: &[u8]) -> PResult<'_, Cow<'_, [u8]>> {
    alt((map(atom, Cow::Borrowed), quoted_string))(i)
}

// RFC 5322 4.1 allows bare periods in phrases.
fn obs_dot(i: &[u8]) -> PResult<'_, Cow<'_, [u8]>> {
    terminated(map(char('.'), |_| Cow::Borrowed(&b"."[..])), opt(cfws))(i)
}

fn phrase(i: &[u8]) -> PResult<'_, Vec<Cow<'_, [u8]>>> {
    map(pair(word, many0(alt((word, obs_dot)))), |(head, mut tail)| {
        tail.insert(0, head);
        tail
    })(i)
}

fn day_name(i: &[u8]) -> PResult<'_, ()> {
    value(
        (),
        tuple((opt(cfws), atext, opt(cfws), char(','), opt(cfws))),
    )(i)
}

fn month(i: &[u8]) -> PResult<'_, u32> {
    alt((
        value(1, tag_no_case("jan")),
        value(2, tag_no_case("feb")),
        value(3, tag_no_case("mar")),
        value(4, tag_no_case("apr")),
        value(5, tag_no_case("may")),
        value(6, tag_no_case("jun")),
        value(7, tag_no_case("jul")),
        value(8, tag_no_case("aug")),
        value(9, tag_no_case("sep")),
        value(10, tag_no_case("oct")),
        value(11, tag_no_case("nov")),
        value(12, tag_no_case("dec")),
    ))(i)
}

fn year_digits(i: &[u8]) -> PResult<'_, u32> {
    digits(i, 2, 4)
}

// RFC 5322 4.3 obsolete two and three digit years.
fn year(i: &[u8]) -> PResult<'_, i32> {
    map(
        year_digits,
        |y| match y {
            0..=49 => 2000 + y as i32,
            50..=999 => 1900 + y as i32,
            y => y as i32,
        },
    )(i)
}

fn date(i: &[u8]) -> PResult<'_, (i32, u32, u32)> {
    map(
        tuple((
            opt(cfws),
            digits_1_2,
            opt(cfws),
            month,
            opt(cfws),
            year,
            opt(cfws),
        )),
        |(_, d, _, m, _, y, _)| (y, m, d),
    )(i)
}

fn time_of_day(i: &[u8]) -> PResult<'_, (u32, u32, u32)> {
    map(
        tuple((
            digits_2,
            delimited(opt(cfws), char(':'), opt(cfws)),
            digits_2,
            opt(preceded(
                delimited(opt(cfws), char(':'), opt(cfws)),
                digits_2,
            )),
        )),
        |(h, _, m, s)| (h, m, s.unwrap_or(0)),
    )(i)
}

fn zone_digits(i: &[u8]) -> PResult<'_, u32> {
    digits(i, 4, 4)
}

fn numeric_zone(i: &[u8]) -> PResult<'_, i32> {
    map(
        pair(alt((char('+'), char('-'))), zone_digits),
        |(sign, hhmm)| {
            let seconds = (hhmm / 100 * 3600 + hhmm % 100 * 60) as i32;
            if '-' == sign {
                -seconds
            } else {
                seconds
            }
        },
    )(i)
}

// RFC 5322 4.3 obsolete zones. Military zones are treated as -0000 as the
// RFC recommends.
fn obs_zone(i: &[u8]) -> PResult<'_, i32> {
    alt((
        value(0, tag_no_case("ut")),
        value(0, tag_no_case("gmt")),
        value(-5 * 3600, tag_no_case("est")),
        value(-4 * 3600, tag_no_case("edt")),
        value(-6 * 3600, tag_no_case("cst")),
        value(-5 * 3600, tag_no_case("cdt")),
        value(-7 * 3600, tag_no_case("mst")),
        value(-6 * 3600, tag_no_case("mdt")),
        value(-8 * 3600, tag_no_case("pst")),
        value(-7 * 3600, tag_no_case("pdt")),
        value(0, take_while_m_n(1, 1, |c: u8| c.is_ascii_alphabetic())),
    ))(i)
}

fn date_time(i: &[u8]) -> PResult<'_, Option<DateTime<FixedOffset>>> {
    map(
        tuple((
            opt(day_name),
            date,
            time_of_day,
            opt(cfws),
            alt((numeric_zone, obs_zone)),
            opt(cfws),
        )),
        |(_, (y, mo, d), (h, mi, s), _, zone, _)| {
            FixedOffset::east_opt(zone)?
                .with_ymd_and_hms(y, mo, d, h, mi, s)
                .single()
        },
    )(i)
}

fn local_part(i: &[u8]) -> PResult<'_, Vec<Cow<'_, [u8]>>> {
    separated_list1(char('.'), word)(i)
}

fn obs_domain(i: &[u8]) -> PResult<'_, Vec<Cow<'_, [u8]>>> {
    separated_list1(char('.'), map(atom, Cow::Borrowed))(i)
}

fn dtext(i: &[u8]) -> PResult<'_, &[u8]> {
    is_not("[]\\ \t\r\n")(i)
}

fn domain_literal(i: &[u8]) -> PResult<'_, Vec<u8>> {
    delimited(
        pair(opt(cfws), char('[')),
        fold_many0(
            alt((dtext, quoted_pair, fws)),
            || b"[".to_vec(),
            |mut acc, item| {
                acc.extend_from_slice(item);
                acc
            },
        ),
        pair(char(']'), opt(cfws)),
    )(i)
    .map(|(rest, mut lit)| {
        lit.push(b']');
        (rest, lit)
    })
}

fn domain(i: &[u8]) -> PResult<'_, Vec<Cow<'_, [u8]>>> {
    alt((obs_domain, map(domain_literal, |d| vec![Cow::Owned(d)])))(i)
}

fn addr_spec(i: &[u8]) -> PResult<'_, AddrSpec<'_>> {
    map(
        separated_pair(local_part, char('@'), domain),
        |(local, domain)| AddrSpec { local, domain },
    )(i)
}

// RFC 5322 4.4 obsolete source routes. These are parsed and discarded.
fn obs_route(i: &[u8]) -> PResult<'_, ()> {
    value(
        (),
        tuple((
            many0_count(alt((cfws, value((), char(','))))),
            char('@'),
            domain,
            many0_count(tuple((
                many1_count(alt((cfws, value((), char(','))))),
                char('@'),
                domain,
            ))),
            char(':'),
        )),
    )(i)
}

fn angle_addr(i: &[u8]) -> PResult<'_, AddrSpec<'_>> {
    delimited(
        tuple((opt(cfws), char('<'), opt(obs_route))),
        addr_spec,
        pair(char('>'), opt(cfws)),
    )(i)
}

fn mailbox(i: &[u8]) -> PResult<'_, MailboxSpec<'_>> {
    map(
        alt((pair(opt(phrase), angle_addr), map(addr_spec, |a| (None, a)))),
        |(name, addr)| MailboxSpec {
            name: name.unwrap_or_default(),
            addr,
        },
    )(i)
}

fn obs_list_delim(i: &[u8]) -> PResult<'_, ()> {
    value((), many1_count(tuple((opt(cfws), char(','), opt(cfws)))))(i)
}

fn mailbox_list(i: &[u8]) -> PResult<'_, Vec<MailboxSpec<'_>>> {
    delimited(
        opt(obs_list_delim),
        separated_list1(obs_list_delim, mailbox),
        opt(obs_list_delim),
    )(i)
}

fn group(i: &[u8]) -> PResult<'_, GroupSpec<'_>> {
    map(
        pair(
            terminated(phrase, char(':')),
            terminated(
                opt(mailbox_list),
                tuple((opt(cfws), char(';'), opt(cfws))),
            ),
        ),
        |(name, boxes)| GroupSpec {
            name,
            boxes: boxes.unwrap_or_default(),
        },
    )(i)
}

fn address(i: &[u8]) -> PResult<'_, Address<'_>> {
    alt((map(mailbox, Address::Mailbox), map(group, Address::Group)))(i)
}

fn address_list(i: &[u8]) -> PResult<'_, Vec<Address<'_>>> {
    delimited(
        opt(obs_list_delim),
        separated_list1(obs_list_delim, address),
        opt(obs_list_delim),
    )(i)
}

// RFC 2045 "token"
fn token(i: &[u8]) -> PResult<'_, &[u8]> {
    take_while1(|c: u8| {
        c > b' ' && c < 127 && !b"()<>@,;:\\\"/[]?=".contains(&c)
    })(i)
}

fn padded_token(i: &[u8]) -> PResult<'_, &[u8]> {
    delimited(opt(cfws), token, opt(cfws))(i)
}

fn parameter(i: &[u8]) -> PResult<'_, (String, String)> {
    map(
        separated_pair(
            padded_token,
            char('='),
            alt((map(padded_token, Cow::Borrowed), quoted_string)),
        ),
        |(name, value)| {
            (
                String::from_utf8_lossy(name).to_ascii_lowercase(),
                String::from_utf8_lossy(&value).into_owned(),
            )
        },
    )(i)
}

fn parameters(i: &[u8]) -> PResult<'_, Vec<(String, String)>> {
    many0(preceded(pair(char(';'), opt(cfws)), parameter))(i)
}

fn content_type(i: &[u8]) -> PResult<'_, ContentType> {
    map(
        tuple((padded_token, char('/'), padded_token, parameters)),
        |(typ, _, subtype, parms)| ContentType {
            typ: String::from_utf8_lossy(typ).to_ascii_lowercase(),
            subtype: String::from_utf8_lossy(subtype).to_ascii_lowercase(),
            parms,
        },
    )(i)
}

fn content_disposition(i: &[u8]) -> PResult<'_, ContentDisposition> {
    map(pair(padded_token, parameters), |(disposition, parms)| {
        ContentDisposition {
            disposition: String::from_utf8_lossy(disposition)
                .to_ascii_lowercase(),
            parms,
        }
    })(i)
}

/// Parse an RFC 5322 address list, such as the value of a `From` field.
///
/// Trailing garbage after the last address is ignored.
pub fn parse_address_list(i: &[u8]) -> Option<Vec<Address<'_>>> {
    address_list(i).ok().map(|(_, list)| list)
}

/// Parse an RFC 5322 date-time, including the obsolete syntax.
pub fn parse_datetime(i: &str) -> Option<DateTime<FixedOffset>> {
    date_time(i.as_bytes()).ok().and_then(|(_, dt)| dt)
}

pub fn parse_content_type(i: &[u8]) -> Option<ContentType> {
    content_type(i).ok().map(|(_, ct)| ct)
}

pub fn parse_content_disposition(i: &[u8]) -> Option<ContentDisposition> {
    content_disposition(i).ok().map(|(_, cd)| cd)
}

/// Parse a `Content-Transfer-Encoding`, returning it upper-cased as IMAP
/// reports it.
pub fn parse_content_transfer_encoding(i: &[u8]) -> Option<String> {
    padded_token(i)
        .ok()
        .map(|(_, cte)| String::from_utf8_lossy(cte).to_ascii_uppercase())
}
