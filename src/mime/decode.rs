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

//! Content decoding used when matching search keys against messages.

use std::borrow::Cow;

use encoding_rs::Encoding;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"=\?([!->@-~]*)\?([bBqQ])\?([!->@-~]*)\?=").unwrap();
    static ref EW_GAP: Regex = Regex::new(r"\?=[ \t]+=\?").unwrap();
}

/// Decode quoted-printable content (RFC 2045 section 6.7).
///
/// Soft line breaks are removed with either line ending. Invalid escapes are
/// passed through unchanged.
pub fn qp_decode(s: &[u8]) -> Cow<'_, [u8]> {
    if !s.contains(&b'=') {
        return Cow::Borrowed(s);
    }

    let mut out = Vec::with_capacity(s.len());
    let mut ix = 0;
    while ix < s.len() {
        let b = s[ix];
        if b'=' != b {
            out.push(b);
            ix += 1;
            continue;
        }

        let tail = &s[ix + 1..];
        if tail.starts_with(b"\r\n") {
            ix += 3;
        } else if tail.starts_with(b"\n") {
            ix += 2;
        } else if let Some(byte) = tail.get(..2).and_then(hex_byte) {
            out.push(byte);
            ix += 3;
        } else {
            out.push(b'=');
            ix += 1;
        }
    }

    Cow::Owned(out)
}

fn hex_byte(digits: &[u8]) -> Option<u8> {
    let hi = (digits[0] as char).to_digit(16)?;
    let lo = (digits[1] as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Decode the body of a part according to its `Content-Transfer-Encoding`.
pub fn decode_transfer<'a>(encoding: &str, body: &'a [u8]) -> Cow<'a, [u8]> {
    if encoding.eq_ignore_ascii_case("quoted-printable") {
        qp_decode(body)
    } else if encoding.eq_ignore_ascii_case("base64") {
        let compact = body
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect::<Vec<u8>>();
        match base64::decode(&compact) {
            Ok(decoded) => Cow::Owned(decoded),
            Err(_) => Cow::Borrowed(body),
        }
    } else {
        Cow::Borrowed(body)
    }
}

/// Convert `content` from the named charset into a `String`.
///
/// Unknown charsets are treated as UTF-8 with replacement.
pub fn decode_charset(charset: Option<&str>, content: &[u8]) -> String {
    match charset.and_then(|c| Encoding::for_label(c.as_bytes())) {
        Some(encoding) => {
            encoding.decode_with_bom_removal(content).0.into_owned()
        }
        None => String::from_utf8_lossy(content).into_owned(),
    }
}

/// Decode any RFC 2047 encoded words in an unfolded header value.
///
/// Whitespace between adjacent encoded words is dropped. Encoded words
/// which cannot be decoded are left as they are.
pub fn decode_encoded_words(value: &str) -> Cow<'_, str> {
    if !value.contains("=?") {
        return Cow::Borrowed(value);
    }

    let joined = EW_GAP.replace_all(value, "?==?");
    let decoded = ENCODED_WORD.replace_all(&joined, |c: &regex::Captures| {
        decode_word(&c[1], &c[2], &c[3]).unwrap_or_else(|| c[0].to_owned())
    });
    Cow::Owned(decoded.into_owned())
}

fn decode_word(charset: &str, xfer: &str, content: &str) -> Option<String> {
    // RFC 2231 language suffix
    let charset = charset.split('*').next().unwrap_or(charset);
    let bytes = if xfer.eq_ignore_ascii_case("q") {
        qp_decode(content.replace('_', " ").as_bytes()).into_owned()
    } else {
        base64::decode(content).ok()?
    };

    let encoding = Encoding::for_label_no_replacement(charset.as_bytes())?;
    Some(encoding.decode_with_bom_removal(&bytes).0.into_owned())
}
