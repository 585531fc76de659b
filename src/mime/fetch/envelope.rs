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

use std::borrow::Cow;

use crate::mime::header::{self, Address, HeaderBlock, MailboxSpec};

/// The `ENVELOPE` structure defined by RFC 3501, in the order the fields are
/// to be sent.
///
/// Values are sent as they appear in the message, unfolded but otherwise
/// undecoded, as RFC 3501 requires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// The `Date` header. Sent in canonical form if it parses, otherwise
    /// verbatim.
    pub date: Option<String>,
    pub subject: Option<String>,
    /// The `From` header.
    ///
    /// Messages with no intelligible `From` do exist, and for those this is
    /// empty and sent as `NIL` despite RFC 3501.
    pub from: Vec<EnvelopeAddress>,
    /// The `Sender` header, or a copy of `from` if absent.
    pub sender: Vec<EnvelopeAddress>,
    /// The `Reply-To` header, or a copy of `from` if absent.
    pub reply_to: Vec<EnvelopeAddress>,
    pub to: Vec<EnvelopeAddress>,
    pub cc: Vec<EnvelopeAddress>,
    pub bcc: Vec<EnvelopeAddress>,
    pub in_reply_to: Option<String>,
    pub message_id: Option<String>,
}

/// An address, or a group delimiter, in an `ENVELOPE`.
///
/// A group starts with an entry with a name in `local` and no domain, and
/// ends with an entry with neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeAddress {
    pub name: Option<String>,
    /// The obsolete source route. Always sent as `NIL`.
    pub routing: (),
    pub local: Option<String>,
    pub domain: Option<String>,
}

impl Envelope {
    /// Extract the envelope from the header block `block` of `data`.
    pub fn extract(data: &[u8], block: &HeaderBlock) -> Self {
        let text = |name: &str| block.get(data, name).map(header::unfold);
        let addresses = |name: &str| {
            block
                .get(data, name)
                .map(address_list)
                .unwrap_or_default()
        };

        let from = addresses("From");
        let mut sender = addresses("Sender");
        if sender.is_empty() {
            sender = from.clone();
        }
        let mut reply_to = addresses("Reply-To");
        if reply_to.is_empty() {
            reply_to = from.clone();
        }

        Envelope {
            date: text("Date").map(|raw| {
                header::parse_datetime(&raw)
                    .map(|dt| dt.to_rfc2822())
                    .unwrap_or(raw)
            }),
            subject: text("Subject"),
            from,
            sender,
            reply_to,
            to: addresses("To"),
            cc: addresses("Cc"),
            bcc: addresses("Bcc"),
            in_reply_to: text("In-Reply-To").filter(|s| !s.is_empty()),
            message_id: text("Message-ID").filter(|s| !s.is_empty()),
        }
    }
}

fn address_list(value: &[u8]) -> Vec<EnvelopeAddress> {
    let mut out = Vec::new();
    for address in header::parse_address_list(value).unwrap_or_default() {
        match address {
            Address::Mailbox(mailbox) => out.push(mailbox_address(mailbox)),
            Address::Group(group) => {
                // RFC 3501 puts the group name in the local part.
                out.push(EnvelopeAddress {
                    name: None,
                    routing: (),
                    local: Some(join(&group.name, " ")),
                    domain: None,
                });
                out.extend(group.boxes.into_iter().map(mailbox_address));
                out.push(EnvelopeAddress::default());
            }
        }
    }
    out
}

fn mailbox_address(mailbox: MailboxSpec<'_>) -> EnvelopeAddress {
    EnvelopeAddress {
        name: Some(join(&mailbox.name, " ")).filter(|s| !s.is_empty()),
        routing: (),
        local: Some(join(&mailbox.addr.local, ".")),
        domain: Some(join(&mailbox.addr.domain, ".")),
    }
}

fn join(parts: &[Cow<'_, [u8]>], sep: &str) -> String {
    parts
        .iter()
        .map(|p| String::from_utf8_lossy(p))
        .collect::<Vec<_>>()
        .join(sep)
}
