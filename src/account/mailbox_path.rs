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
//! Mailbox name normalisation and `LIST` pattern matching.
//!
//! Names are handled as UTF-8 here; modified UTF-7 is purely a wire concern.

use std::iter;

use regex::Regex;

use crate::support::error::Error;

/// Split a raw mailbox name into its hierarchy levels.
///
/// Empty levels are dropped, and a first level of `inbox` in any case
/// becomes `INBOX`. With an empty delimiter there is no hierarchy, so the
/// whole name is one level.
///
/// It does not check for name safety.
pub fn parse_mailbox_path<'a>(
    path: &'a str,
    delimiter: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    let parts: Box<dyn Iterator<Item = &'a str> + 'a> = if delimiter.is_empty()
    {
        Box::new(iter::once(path))
    } else {
        Box::new(path.split(delimiter))
    };

    parts
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(ix, s)| {
            if 0 == ix && "inbox".eq_ignore_ascii_case(s) {
                "INBOX"
            } else {
                s
            }
        })
}

/// Return the canonical form of `name`.
pub fn normalise(name: &str, delimiter: &str) -> String {
    parse_mailbox_path(name, delimiter)
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Check that `name` (already normalised) may be given to a new mailbox.
pub fn check_new_name(name: &str) -> Result<(), Error> {
    if name.is_empty()
        || name.contains(|c: char| '%' == c || '*' == c || c.is_control())
    {
        Err(Error::UnsafeName)
    } else {
        Ok(())
    }
}

/// The proper ancestors of `name`, outermost first.
pub fn ancestors(name: &str, delimiter: &str) -> Vec<String> {
    let parts: Vec<&str> = parse_mailbox_path(name, delimiter).collect();
    (1..parts.len())
        .map(|depth| parts[..depth].join(delimiter))
        .collect()
}

/// Whether `name` is `ancestor` or one of its inferiors.
pub fn is_within(name: &str, ancestor: &str, delimiter: &str) -> bool {
    name == ancestor
        || (!delimiter.is_empty()
            && name.len() > ancestor.len() + delimiter.len()
            && name.starts_with(ancestor)
            && name[ancestor.len()..].starts_with(delimiter))
}

/// Creates a predicate which identifies which normalised mailbox names match
/// any element of `patterns`, with pattern matching performed as per RFC 3501.
///
/// Each pattern is first normalised by `parse_mailbox_path`.
///
/// This design means that any `LIST` operation needs to walk all mailboxes
/// and then narrow it down, instead of a more ideal recursive filtering.
/// However, the semantics of `*`, particularly the fact that it's permitted in
/// the _middle_ of the path, preclude doing that in any sane (i.e.,
/// non-exponential) way.
pub fn mailbox_path_matcher<'a>(
    patterns: impl IntoIterator<Item = &'a str>,
    delimiter: &str,
) -> impl Fn(&str) -> bool {
    // IMAP delimiters are a single character
    let level = match delimiter.chars().next() {
        None => ".*".to_owned(),
        Some(c) => format!("[^{}]*", regex::escape(&c.to_string())),
    };

    let mut rx = "^(?:".to_owned();
    for (pattern_ix, pattern) in patterns.into_iter().enumerate() {
        if pattern_ix > 0 {
            rx.push('|');
        }

        for (part_ix, part) in parse_mailbox_path(pattern, delimiter).enumerate()
        {
            if part_ix > 0 {
                rx.push_str(&regex::escape(delimiter));
            }

            let mut start = 0;
            for end in part
                .match_indices(|c| '%' == c || '*' == c)
                .map(|(ix, _)| ix)
                .chain(part.len()..=part.len())
            {
                let chunk = &part[start..end];
                start = (end + 1).min(part.len());

                rx.push_str(&regex::escape(chunk));
                match part.get(end..end + 1) {
                    Some("*") => rx.push_str(".*"),
                    Some("%") => rx.push_str(&level),
                    _ => (),
                }
            }
        }
    }
    rx.push_str(")$");

    let rx = Regex::new(&rx).ok();
    move |s| rx.as_ref().map_or(false, |rx| rx.is_match(s))
}
