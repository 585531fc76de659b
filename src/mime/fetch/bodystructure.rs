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

use openssl::hash::{hash, MessageDigest};

use super::envelope::Envelope;
use crate::mime::header;
use crate::mime::part::Part;

/// The RFC 3501 `BODYSTRUCTURE` structure, sort of.
///
/// The real structure depends on the content type of each part and on
/// whether the client asked for `BODY` or `BODYSTRUCTURE`. This is the union
/// of every field any form needs; the response encoder picks out the ones it
/// sends.
///
/// An embedded `message/rfc822` part is represented as a part with exactly
/// one child, the encapsulated message.
///
/// The wire forms, with § marking where the extension fields start:
///
/// - `multipart/*`: (child)(child)(...) subtype §
///   (parms) (disposition disposition-parms) language location
/// - `message/rfc822`: type subtype (parms) id description encoding octets
///   (envelope) (bodystructure) lines §
///   md5 (disposition disposition-parms) language location
/// - `text/*`: type subtype (parms) id description encoding octets lines §
///   md5 (disposition disposition-parms) language location
/// - `*/*`: type subtype (parms) id description encoding octets §
///   md5 (disposition disposition-parms) language location
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyStructure {
    pub content_type: (String, String),
    pub content_type_parms: Vec<(String, String)>,
    pub content_disposition: Option<String>,
    pub content_disposition_parms: Vec<(String, String)>,
    pub content_language: Option<String>,
    pub content_location: Option<String>,
    pub content_id: Option<String>,
    pub content_description: Option<String>,
    pub content_transfer_encoding: String,
    /// The length of the content, measured in encoded form.
    pub size_octets: u64,
    /// The number of lines of the content, measured in encoded form.
    pub size_lines: u64,
    /// Lowercase hex MD5 of the content.
    pub md5: Option<String>,
    /// The envelope from this part's own headers.
    pub envelope: Envelope,
    pub children: Vec<BodyStructure>,
}

impl BodyStructure {
    pub fn extract(data: &[u8], part: &Part) -> Self {
        let text = |name: &str| {
            part.header
                .get(data, name)
                .map(header::unfold)
                .filter(|s| !s.is_empty())
        };

        let disposition = part
            .header
            .get(data, "Content-Disposition")
            .and_then(header::parse_content_disposition);
        let body = part.body(data);

        let children = if let Some(ref message) = part.message {
            vec![BodyStructure::extract(data, message)]
        } else {
            part.children
                .iter()
                .map(|child| BodyStructure::extract(data, child))
                .collect()
        };

        BodyStructure {
            content_type: (
                part.content_type.typ.clone(),
                part.content_type.subtype.clone(),
            ),
            content_type_parms: part.content_type.parms.clone(),
            content_disposition: disposition
                .as_ref()
                .map(|d| d.disposition.clone()),
            content_disposition_parms: disposition
                .map(|d| d.parms)
                .unwrap_or_default(),
            content_language: text("Content-Language"),
            content_location: text("Content-Location"),
            content_id: text("Content-ID"),
            content_description: text("Content-Description"),
            content_transfer_encoding: part.transfer_encoding(data),
            size_octets: body.len() as u64,
            // Counting line feeds is enough; line-oriented content ends with
            // a complete line.
            size_lines: memchr::memchr_iter(b'\n', body).count() as u64,
            md5: md5_hex(body),
            envelope: Envelope::extract(data, &part.header),
            children,
        }
    }
}

fn md5_hex(data: &[u8]) -> Option<String> {
    let digest = hash(MessageDigest::md5(), data).ok()?;
    let mut hex = String::with_capacity(32);
    for byte in digest.iter() {
        hex.push_str(&format!("{:02x}", byte));
    }
    Some(hex)
}
