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

//! IMAP's "modified UTF-7" (RFC 3501 section 5.1.3), used for mailbox names
//! on the wire. Names are held as UTF-8 everywhere else.

use std::borrow::Cow;

fn is_direct(ch: char) -> bool {
    (' '..='~').contains(&ch) && '&' != ch
}

fn b64_config() -> base64::Config {
    base64::IMAP_MUTF7.decode_allow_trailing_bits(true)
}

/// Encode `s` for transmission to a client.
///
/// The result is minimal: direct characters are never encoded, and `&` is
/// always written as `&-`.
pub fn encode(s: &str) -> Cow<'_, str> {
    if s.chars().all(is_direct) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 8);
    let mut pending = Vec::<u8>::new();
    for ch in s.chars() {
        if is_direct(ch) {
            flush(&mut out, &mut pending);
            out.push(ch);
        } else if '&' == ch {
            flush(&mut out, &mut pending);
            out.push_str("&-");
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                pending.extend_from_slice(&unit.to_be_bytes());
            }
        }
    }
    flush(&mut out, &mut pending);

    Cow::Owned(out)
}

fn flush(out: &mut String, pending: &mut Vec<u8>) {
    if !pending.is_empty() {
        out.push('&');
        out.push_str(&base64::encode_config(&pending, base64::IMAP_MUTF7));
        out.push('-');
        pending.clear();
    }
}

/// Decode a mailbox name received from a client.
///
/// Decoding is permissive. Raw 8-bit UTF-8 is passed through, a missing
/// terminating `-` is tolerated, and shift sequences that do not decode are
/// kept verbatim.
pub fn decode(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let shifted = &rest[amp + 1..];
        let end = shifted
            .find(|c: char| !is_base64(c))
            .unwrap_or(shifted.len());
        let chunk = &shifted[..end];
        let terminated = shifted[end..].starts_with('-');
        rest = if terminated {
            &shifted[end + 1..]
        } else {
            &shifted[end..]
        };

        if chunk.is_empty() {
            out.push('&');
        } else if let Some(decoded) = decode_chunk(chunk) {
            out.push_str(&decoded);
        } else {
            out.push('&');
            out.push_str(chunk);
            if terminated {
                out.push('-');
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

fn is_base64(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || '+' == ch || ',' == ch
}

fn decode_chunk(chunk: &str) -> Option<String> {
    let bytes = base64::decode_config(chunk, b64_config()).ok()?;
    let units = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect::<Vec<_>>();
    String::from_utf16(&units).ok()
}
