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

//! An in-memory view of the MIME structure of a message literal.
//!
//! Parts never copy the literal; they only record byte ranges into it.

use memchr::memchr;

use super::header::{self, ContentType, HeaderBlock};

/// Nesting beyond this depth is treated as opaque content.
const MAX_DEPTH: usize = 20;

#[derive(Clone, Debug)]
pub struct Part {
    pub header: HeaderBlock,
    /// End of the part's body, exclusive.
    pub end: usize,
    pub content_type: ContentType,
    /// Children of a `multipart/*` part.
    pub children: Vec<Part>,
    /// The encapsulated message of a `message/rfc822` part.
    pub message: Option<Box<Part>>,
}

impl Part {
    /// Parse the complete structure of `data`.
    pub fn parse(data: &[u8]) -> Self {
        Self::parse_range(data, 0, data.len(), ContentType::default(), 0)
    }

    fn parse_range(
        data: &[u8],
        start: usize,
        end: usize,
        default_type: ContentType,
        depth: usize,
    ) -> Self {
        let header = HeaderBlock::parse_range(data, start, end);
        let content_type = header
            .get(data, "Content-Type")
            .and_then(header::parse_content_type)
            .unwrap_or(default_type);

        let mut part = Part {
            header,
            end,
            content_type,
            children: vec![],
            message: None,
        };

        if depth >= MAX_DEPTH {
            return part;
        }

        if part.content_type.is_type("multipart") {
            if let Some(boundary) = part.content_type.parm("boundary") {
                let child_type = if part.content_type.is("multipart", "digest")
                {
                    ContentType::message_rfc822()
                } else {
                    ContentType::default()
                };
                part.children = split_multipart(
                    data,
                    part.header.body_start,
                    end,
                    boundary.as_bytes(),
                )
                .into_iter()
                .map(|(s, e)| {
                    Self::parse_range(data, s, e, child_type.clone(), depth + 1)
                })
                .collect();
            }
        } else if part.content_type.is("message", "rfc822") {
            part.message = Some(Box::new(Self::parse_range(
                data,
                part.header.body_start,
                end,
                ContentType::default(),
                depth + 1,
            )));
        }

        part
    }

    pub fn start(&self) -> usize {
        self.header.start
    }

    pub fn body_start(&self) -> usize {
        self.header.body_start
    }

    pub fn whole<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.header.start..self.end]
    }

    pub fn body<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.header.body_start..self.end]
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type.is_type("multipart")
    }

    /// Find the part addressed by an IMAP section path.
    ///
    /// Subscript `1` of a non-multipart part refers to the part itself.
    /// Subscripts reach through `message/rfc822` parts into the encapsulated
    /// message's parts.
    pub fn locate(&self, subscripts: &[u32]) -> Option<&Part> {
        let (&first, rest) = match subscripts.split_first() {
            Some(split) => split,
            None => return Some(self),
        };

        let container = match self.message {
            Some(ref message) => message,
            None => self,
        };

        let child = if container.is_multipart() {
            container.children.get(first.checked_sub(1)? as usize)?
        } else if 1 == first {
            container
        } else {
            return None;
        };

        child.locate(rest)
    }

    /// The transfer encoding of this part, as IMAP reports it.
    pub fn transfer_encoding(&self, data: &[u8]) -> String {
        self.header
            .get(data, "Content-Transfer-Encoding")
            .and_then(header::parse_content_transfer_encoding)
            .unwrap_or_else(|| "7BIT".to_owned())
    }

    /// Visit every leaf part, depth-first.
    pub fn for_each_leaf(&self, f: &mut dyn FnMut(&Part)) {
        if let Some(ref message) = self.message {
            message.for_each_leaf(f);
        } else if self.is_multipart() {
            for child in &self.children {
                child.for_each_leaf(f);
            }
        } else {
            f(self);
        }
    }
}

/// Split the body of a multipart into the ranges of its parts.
///
/// The line ending immediately before each delimiter belongs to the
/// delimiter, not to the preceding part.
fn split_multipart(
    data: &[u8],
    start: usize,
    end: usize,
    boundary: &[u8],
) -> Vec<(usize, usize)> {
    let mut parts = Vec::new();
    let mut current: Option<usize> = None;
    let mut pos = start;

    while pos < end {
        let line_end = match memchr(b'\n', &data[pos..end]) {
            Some(nl) => pos + nl + 1,
            None => end,
        };
        let line = &data[pos..line_end];

        if let Some(closing) = delimiter(line, boundary) {
            if let Some(part_start) = current.take() {
                let mut part_end = pos;
                if part_end > part_start && b'\n' == data[part_end - 1] {
                    part_end -= 1;
                    if part_end > part_start && b'\r' == data[part_end - 1] {
                        part_end -= 1;
                    }
                }
                parts.push((part_start, part_end.max(part_start)));
            }

            if closing {
                return parts;
            }
            current = Some(line_end);
        }

        pos = line_end;
    }

    // Unterminated multipart; the final part runs to the end.
    if let Some(part_start) = current {
        parts.push((part_start, end));
    }

    parts
}

/// If `line` is a delimiter for `boundary`, return whether it is the closing
/// delimiter.
fn delimiter(line: &[u8], boundary: &[u8]) -> Option<bool> {
    let rest = line.strip_prefix(b"--")?.strip_prefix(boundary)?;
    let (closing, rest) = match rest.strip_prefix(b"--") {
        Some(rest) => (true, rest),
        None => (false, rest),
    };

    if rest.iter().all(|b| b.is_ascii_whitespace()) {
        Some(closing)
    } else {
        None
    }
}
