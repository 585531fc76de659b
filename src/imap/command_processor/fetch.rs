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

use std::fmt;

use super::defs::*;
use crate::account::model::*;
use crate::mime::fetch::section::*;
use crate::support::error::Error;

impl CommandProcessor {
    pub(super) async fn cmd_fetch(
        &mut self,
        cmd: s::FetchCommand<'_>,
        uid: bool,
        sender: &SendResponse,
    ) -> CmdResult {
        let fetched = if uid {
            let ids = self.parse_uid_range(&cmd.messages)?;
            let request = fetch_request(ids, cmd.target, true)?;
            selected!(self)?.fetch(&request).await
        } else {
            let ids = self.parse_seqnum_range(&cmd.messages)?;
            let request = fetch_request(ids, cmd.target, false)?;
            selected!(self)?.seqnum_fetch(request).await
        };

        let fetched = fetched.map_err(map_error! {
            self,
            NxMessage | ExpungedMessage =>
                (No, Some(r::RespTextCode::ExpungeIssued)),
            UnaddressableMessage =>
                (No, Some(r::RespTextCode::ClientBug)),
        })?;

        for message in fetched {
            send_response(sender, r::Response::Fetch(message)).await;
        }

        Ok(r::Response::ok(if uid {
            "UID FETCH completed"
        } else {
            "FETCH completed"
        }))
    }
}

/// Translate the client's fetch attributes into a `FetchRequest`.
///
/// `force_uid` is set for `UID FETCH`, which always reports the UID.
fn fetch_request<ID>(
    ids: SeqRange<ID>,
    target: s::FetchTarget<'_>,
    force_uid: bool,
) -> PartialResult<FetchRequest<ID>>
where
    SeqRange<ID>: fmt::Debug,
{
    let mut request = FetchRequest {
        ids,
        uid: force_uid,
        flags: false,
        rfc822size: false,
        internal_date: false,
        envelope: false,
        bodystructure: false,
        body: false,
        sections: vec![],
        set_seen: false,
    };

    let atts = match target {
        s::FetchTarget::All => vec![
            s::FetchAtt::Flags,
            s::FetchAtt::InternalDate,
            s::FetchAtt::Rfc822Size,
            s::FetchAtt::Envelope,
        ],
        s::FetchTarget::Fast => vec![
            s::FetchAtt::Flags,
            s::FetchAtt::InternalDate,
            s::FetchAtt::Rfc822Size,
        ],
        s::FetchTarget::Full => vec![
            s::FetchAtt::Flags,
            s::FetchAtt::InternalDate,
            s::FetchAtt::Rfc822Size,
            s::FetchAtt::Envelope,
            s::FetchAtt::Body,
        ],
        s::FetchTarget::Single(att) => vec![att],
        s::FetchTarget::Multi(atts) => atts,
    };

    for att in atts {
        match att {
            s::FetchAtt::Envelope => request.envelope = true,
            s::FetchAtt::Flags => request.flags = true,
            s::FetchAtt::InternalDate => request.internal_date = true,
            s::FetchAtt::Rfc822Size => request.rfc822size = true,
            s::FetchAtt::Body => request.body = true,
            s::FetchAtt::BodyStructure => request.bodystructure = true,
            s::FetchAtt::Uid => request.uid = true,
            s::FetchAtt::Rfc822 => add_section(
                &mut request,
                BodySection {
                    report_as_legacy: Some(Imap2Section::Rfc822),
                    ..BodySection::default()
                },
                false,
            ),
            s::FetchAtt::Rfc822Header => add_section(
                &mut request,
                BodySection {
                    leaf_type: LeafType::Headers,
                    report_as_legacy: Some(Imap2Section::Rfc822Header),
                    ..BodySection::default()
                },
                false,
            ),
            s::FetchAtt::Rfc822Text => add_section(
                &mut request,
                BodySection {
                    leaf_type: LeafType::Text,
                    report_as_legacy: Some(Imap2Section::Rfc822Text),
                    ..BodySection::default()
                },
                false,
            ),
            s::FetchAtt::BodySection {
                peek,
                section,
                partial,
            } => {
                let section = body_section(section, partial)?;
                add_section(&mut request, section, peek);
            }
        }
    }

    Ok(request)
}

fn add_section<ID>(
    request: &mut FetchRequest<ID>,
    section: BodySection,
    peek: bool,
) where
    SeqRange<ID>: fmt::Debug,
{
    request.set_seen |= !peek && section.sets_seen();
    request.sections.push(section);
}

fn body_section(
    spec: s::SectionSpec<'_>,
    partial: Option<(u32, u32)>,
) -> PartialResult<BodySection> {
    let top_level = spec.subscripts.is_empty();
    let mut section = BodySection {
        subscripts: spec.subscripts,
        partial: partial.map(|(offset, count)| {
            let offset = u64::from(offset);
            (offset, offset + u64::from(count))
        }),
        ..BodySection::default()
    };

    match spec.text {
        None if top_level => section.leaf_type = LeafType::Full,
        None => section.leaf_type = LeafType::Content,
        Some(s::SectionText::Header) => section.leaf_type = LeafType::Headers,
        Some(s::SectionText::HeaderFields { not, headers }) => {
            section.leaf_type = LeafType::Headers;
            section.header_filter =
                headers.into_iter().map(|h| h.into_owned()).collect();
            section.discard_matching_headers = not;
        }
        Some(s::SectionText::Text) => section.leaf_type = LeafType::Text,
        Some(s::SectionText::Mime) if top_level => {
            return Err(r::Response::bad(
                Some(r::RespTextCode::ClientBug),
                "MIME is only valid for a subpart",
            ));
        }
        Some(s::SectionText::Mime) => section.leaf_type = LeafType::Mime,
    }

    Ok(section)
}
