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
//! Evaluation of `SEARCH` queries against one message at a time.
//!
//! Searching is a linear scan. Anything that needs the literal is only
//! computed when the query actually looks at the literal.

use std::collections::HashMap;

use chrono::prelude::*;
use lazy_static::lazy_static;
use regex::{self, Regex};

use super::model::*;
use crate::mime::decode;
use crate::mime::header::{self, HeaderBlock};
use crate::mime::part::Part;

lazy_static! {
    static ref NEVER: Regex = Regex::new("[^\\s\\S]").unwrap();
}

/// Everything about a message that a search may consider.
#[derive(Debug)]
pub struct SearchData {
    pub seqnum: Seqnum,
    pub uid: Uid,
    pub flags: FlagSet,
    pub recent: bool,
    pub size: usize,
    pub internal_date: DateTime<FixedOffset>,
    /// Only populated if `needs_literal()` said so.
    pub content: Option<ContentData>,
}

/// The parts of a message that come from its literal.
#[derive(Debug, Default)]
pub struct ContentData {
    /// Decoded header values, keyed by lower-case name.
    pub headers: HashMap<String, Vec<String>>,
    pub sent_date: Option<NaiveDate>,
    /// The decoded text of every textual leaf part.
    pub body: String,
}

impl ContentData {
    pub fn extract(data: &[u8]) -> Self {
        let root = Part::parse(data);
        let mut content = ContentData::default();

        for field in &root.header.fields {
            let name = String::from_utf8_lossy(field.name(data))
                .trim()
                .to_ascii_lowercase();
            let value = header::unfold(field.value(data));
            let value = decode::decode_encoded_words(&value).into_owned();
            content.headers.entry(name).or_default().push(value);
        }

        content.sent_date = root
            .header
            .get(data, "Date")
            .map(header::unfold)
            .and_then(|d| header::parse_datetime(&d))
            .map(|d| d.date_naive());

        root.for_each_leaf(&mut |part| {
            if !part.content_type.is_type("text") {
                return;
            }

            let body = decode::decode_transfer(
                &part.transfer_encoding(data),
                part.body(data),
            );
            if !content.body.is_empty() {
                content.body.push('\n');
            }
            content.body.push_str(&decode::decode_charset(
                part.content_type.parm("charset"),
                &body,
            ));
        });

        content
    }

    fn header_matches(&self, name: &str, pat: &Regex) -> bool {
        self.headers
            .get(name)
            .map_or(false, |values| values.iter().any(|v| pat.is_match(v)))
    }
}

/// Whether evaluating `query` requires the message literal.
pub fn needs_literal(query: &SearchQuery) -> bool {
    match *query {
        SearchQuery::Bcc(_)
        | SearchQuery::Body(_)
        | SearchQuery::Cc(_)
        | SearchQuery::From(_)
        | SearchQuery::Header(..)
        | SearchQuery::SentBefore(_)
        | SearchQuery::SentOn(_)
        | SearchQuery::SentSince(_)
        | SearchQuery::Subject(_)
        | SearchQuery::Text(_)
        | SearchQuery::To(_) => true,

        SearchQuery::Not(ref q) => needs_literal(q),
        SearchQuery::Or(ref a, ref b) => needs_literal(a) || needs_literal(b),
        SearchQuery::And(ref qs) => qs.iter().any(needs_literal),

        _ => false,
    }
}

/// Evaluate `query` against `data`.
pub fn matches(query: &SearchQuery, data: &SearchData) -> bool {
    let content = || data.content.as_ref();
    let header = |name: &str, pat: &str| {
        content().map_or(false, |c| c.header_matches(name, &to_regex(pat)))
    };
    let sent = |f: &dyn Fn(NaiveDate) -> bool| {
        content().and_then(|c| c.sent_date).map_or(false, f)
    };
    let internal = data.internal_date.date_naive();

    match *query {
        SearchQuery::SequenceSet(ref seqnums) => seqnums.contains(data.seqnum),
        SearchQuery::All => true,
        SearchQuery::Answered => data.flags.contains(&Flag::Answered),
        SearchQuery::Bcc(ref pat) => header("bcc", pat),
        SearchQuery::Before(date) => internal < date,
        SearchQuery::Body(ref pat) => {
            content().map_or(false, |c| to_regex(pat).is_match(&c.body))
        }
        SearchQuery::Cc(ref pat) => header("cc", pat),
        SearchQuery::Deleted => data.flags.contains(&Flag::Deleted),
        SearchQuery::Draft => data.flags.contains(&Flag::Draft),
        SearchQuery::Flagged => data.flags.contains(&Flag::Flagged),
        SearchQuery::From(ref pat) => header("from", pat),
        SearchQuery::Header(ref name, ref pat) => {
            let name = name.to_ascii_lowercase();
            // RFC 3501: an empty string matches every message that has the
            // header at all
            content().map_or(false, |c| {
                if pat.is_empty() {
                    c.headers.contains_key(&name)
                } else {
                    c.header_matches(&name, &to_regex(pat))
                }
            })
        }
        SearchQuery::Keyword(ref kw) => {
            data.flags.contains(&Flag::Keyword(kw.clone()))
        }
        SearchQuery::Larger(thresh) => data.size > thresh as usize,
        SearchQuery::New => data.recent && !data.flags.contains(&Flag::Seen),
        SearchQuery::Not(ref q) => !matches(q, data),
        SearchQuery::Old => !data.recent,
        SearchQuery::On(date) => internal == date,
        SearchQuery::Or(ref a, ref b) => matches(a, data) || matches(b, data),
        SearchQuery::Recent => data.recent,
        SearchQuery::Seen => data.flags.contains(&Flag::Seen),
        SearchQuery::SentBefore(date) => sent(&|d| d < date),
        SearchQuery::SentOn(date) => sent(&|d| d == date),
        // RFC 3501 specifies >=, not >
        SearchQuery::SentSince(date) => sent(&|d| d >= date),
        SearchQuery::Since(date) => internal >= date,
        SearchQuery::Smaller(thresh) => data.size < thresh as usize,
        SearchQuery::Subject(ref pat) => header("subject", pat),
        SearchQuery::Text(ref pat) => content().map_or(false, |c| {
            let pat = to_regex(pat);
            pat.is_match(&c.body)
                || c.headers.values().flatten().any(|v| pat.is_match(v))
        }),
        SearchQuery::To(ref pat) => header("to", pat),
        SearchQuery::UidSet(ref uids) => uids.contains(data.uid),
        SearchQuery::Unanswered => !data.flags.contains(&Flag::Answered),
        SearchQuery::Undeleted => !data.flags.contains(&Flag::Deleted),
        SearchQuery::Undraft => !data.flags.contains(&Flag::Draft),
        SearchQuery::Unflagged => !data.flags.contains(&Flag::Flagged),
        SearchQuery::Unkeyword(ref kw) => {
            !data.flags.contains(&Flag::Keyword(kw.clone()))
        }
        SearchQuery::Unseen => !data.flags.contains(&Flag::Seen),
        SearchQuery::And(ref qs) => qs.iter().all(|q| matches(q, data)),
    }
}

/// We use the regex library for substring matching both for its performance
/// and to take advantage of its Unicode-aware case insensitivity.
fn to_regex(pat: &str) -> Regex {
    let mut regex_str = String::new();
    for (ix, chunk) in
        pat.split_whitespace().filter(|s| !s.is_empty()).enumerate()
    {
        if 0 != ix {
            regex_str.push_str("[ \r\n\t]+");
        }
        regex_str.push_str(&regex::escape(chunk));
    }

    match regex::RegexBuilder::new(&regex_str)
        .case_insensitive(true)
        .build()
    {
        Ok(regex) => regex,
        // Only possible if the pattern exceeds the size limit
        Err(_) => NEVER.clone(),
    }
}
