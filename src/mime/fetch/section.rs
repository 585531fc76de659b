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

//! Extraction of `BODY[section]` content.
//!
//! Parts are addressed by subscripts starting at 1. A non-multipart has a
//! single subscript, 1, referring to itself. Subscripts pass through
//! `message/rfc822` parts into the encapsulated message.
//!
//! After the subscripts comes the leaf specifier:
//!
//! - Nothing. At top level, the whole message. Otherwise, the part content.
//!
//! - `HEADER` and `HEADER.FIELDS[.NOT]`. At top level, the message headers.
//!   Otherwise, the headers of the message encapsulated in a
//!   `message/rfc822` part.
//!
//! - `MIME`. The headers of a part. Not valid at top level.
//!
//! - `TEXT`. At top level, the message content. Otherwise, the content of
//!   the message encapsulated in a `message/rfc822` part.

use crate::mime::header::{HeaderBlock, HeaderField};
use crate::mime::part::Part;

/// Which portion of the addressed part to return.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LeafType {
    /// The whole top-level message, headers and all.
    Full,
    /// At top level, the headers. Below, the headers of the encapsulated
    /// message.
    Headers,
    /// The headers of the part itself.
    Mime,
    /// The content of the part itself.
    Content,
    /// At top level, the content. Below, the content of the encapsulated
    /// message.
    Text,
}

/// Identifies a particular portion of the body to fetch.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct BodySection {
    /// Which subscripts to traverse to find the part in question.
    pub subscripts: Vec<u32>,
    /// Which subsection of the part to read.
    pub leaf_type: LeafType,
    /// Apply filtering to these header names.
    pub header_filter: Vec<String>,
    /// If true, discard headers matching `header_filter`.
    ///
    /// If false, keep only headers matching that filter.
    pub discard_matching_headers: bool,
    /// If set, slice the data produced by the above to this `[start, end)`
    /// range, clamping each endpoint.
    pub partial: Option<(u64, u64)>,
    /// If set, report this section using the given legacy name (e.g.
    /// `RFC822.HEADER` instead of `BODY[HEADER]`).
    pub report_as_legacy: Option<Imap2Section>,
}

impl Default for BodySection {
    fn default() -> Self {
        BodySection {
            subscripts: vec![],
            leaf_type: LeafType::Full,
            header_filter: vec![],
            discard_matching_headers: false,
            partial: None,
            report_as_legacy: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Imap2Section {
    Rfc822,
    Rfc822Header,
    Rfc822Text,
}

impl BodySection {
    /// Whether fetching this section sets `\Seen` when not peeking.
    pub fn sets_seen(&self) -> bool {
        self.report_as_legacy != Some(Imap2Section::Rfc822Header)
    }

    /// Extract this section from `data`, whose structure is `root`.
    ///
    /// At top level, the `hidden_header` field is left out of header
    /// sections unless the client asked for it by name. A part that does not
    /// exist yields empty content.
    pub fn fetch(
        &self,
        data: &[u8],
        root: &Part,
        hidden_header: &str,
    ) -> Vec<u8> {
        let part = match root.locate(&self.subscripts) {
            Some(part) => part,
            None => return vec![],
        };
        let top_level = self.subscripts.is_empty();
        let encapsulated = if top_level {
            part
        } else {
            part.message.as_deref().unwrap_or(part)
        };

        let fetched = match self.leaf_type {
            LeafType::Full => part.whole(data).to_vec(),
            LeafType::Content => part.body(data).to_vec(),
            LeafType::Text => encapsulated.body(data).to_vec(),
            LeafType::Mime => self.headers(data, &part.header, None),
            LeafType::Headers => {
                let hidden = if top_level
                    && (self.header_filter.is_empty()
                        || self.discard_matching_headers)
                {
                    Some(hidden_header)
                } else {
                    None
                };
                self.headers(data, &encapsulated.header, hidden)
            }
        };

        self.slice(fetched)
    }

    fn headers(
        &self,
        data: &[u8],
        block: &HeaderBlock,
        hidden: Option<&str>,
    ) -> Vec<u8> {
        let filtered = !self.header_filter.is_empty();
        let keep = |field: &HeaderField| {
            if hidden.map_or(false, |h| field.is_named(data, h)) {
                return false;
            }

            if !filtered {
                return true;
            }

            let matches = self
                .header_filter
                .iter()
                .any(|name| field.is_named(data, name));
            matches != self.discard_matching_headers
        };

        let mut out = Vec::new();
        for field in block.fields.iter().filter(|f| keep(*f)) {
            out.extend_from_slice(field.raw(data));
            if out.ends_with(b"\r") {
                out.push(b'\n');
            } else if !out.ends_with(b"\n") {
                out.extend_from_slice(b"\r\n");
            }
        }

        let fields_end = block.fields.last().map_or(block.start, |f| f.end);
        if filtered {
            out.extend_from_slice(b"\r\n");
        } else if block.body_start > fields_end {
            // The blank line is only included if the message has one.
            out.extend_from_slice(&data[fields_end..block.body_start]);
        }

        out
    }

    fn slice(&self, mut data: Vec<u8>) -> Vec<u8> {
        if let Some((start, end)) = self.partial {
            let len = data.len() as u64;
            let start = start.min(len) as usize;
            let end = end.min(len).max(start as u64) as usize;
            data.truncate(end);
            data.drain(..start);
        }
        data
    }
}
