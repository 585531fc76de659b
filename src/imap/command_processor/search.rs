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

use encoding_rs::Encoding;

use super::defs::*;
use crate::account::model::*;

impl CommandProcessor {
    pub(super) async fn cmd_search(
        &mut self,
        cmd: s::SearchCommand<'_>,
        uid: bool,
        sender: &SendResponse,
    ) -> CmdResult {
        let encoding = match cmd.charset {
            None => encoding_rs::UTF_8,
            Some(ref charset) => Encoding::for_label(charset.as_bytes())
                .ok_or_else(|| {
                    r::Response::no(
                        Some(r::RespTextCode::BadCharset),
                        "Unsupported charset",
                    )
                })?,
        };

        let query = SearchQuery::And(
            cmd.keys
                .into_iter()
                .map(|k| self.search_query_from_ast(encoding, k))
                .collect::<PartialResult<Vec<_>>>()?,
        );

        let hits: Vec<u32> = if uid {
            selected!(self)?
                .uid_search(&query)
                .map_err(map_error!(self))?
                .into_iter()
                .map(u32::from)
                .collect()
        } else {
            selected!(self)?
                .seqnum_search(&query)
                .map_err(map_error!(self))?
                .into_iter()
                .map(u32::from)
                .collect()
        };

        send_response(sender, r::Response::Search(hits)).await;
        Ok(r::Response::ok(if uid {
            "UID SEARCH completed"
        } else {
            "SEARCH completed"
        }))
    }

    fn search_query_from_ast(
        &mut self,
        encoding: &'static Encoding,
        k: s::SearchKey<'_>,
    ) -> PartialResult<SearchQuery> {
        let text = |raw: &[u8]| -> String {
            encoding.decode_without_bom_handling(raw).0.into_owned()
        };

        Ok(match k {
            s::SearchKey::All => SearchQuery::All,
            s::SearchKey::Answered => SearchQuery::Answered,
            s::SearchKey::Deleted => SearchQuery::Deleted,
            s::SearchKey::Draft => SearchQuery::Draft,
            s::SearchKey::Flagged => SearchQuery::Flagged,
            s::SearchKey::New => SearchQuery::New,
            s::SearchKey::Old => SearchQuery::Old,
            s::SearchKey::Recent => SearchQuery::Recent,
            s::SearchKey::Seen => SearchQuery::Seen,
            s::SearchKey::Unanswered => SearchQuery::Unanswered,
            s::SearchKey::Undeleted => SearchQuery::Undeleted,
            s::SearchKey::Undraft => SearchQuery::Undraft,
            s::SearchKey::Unflagged => SearchQuery::Unflagged,
            s::SearchKey::Unseen => SearchQuery::Unseen,

            s::SearchKey::Bcc(v) => SearchQuery::Bcc(text(&v)),
            s::SearchKey::Body(v) => SearchQuery::Body(text(&v)),
            s::SearchKey::Cc(v) => SearchQuery::Cc(text(&v)),
            s::SearchKey::From(v) => SearchQuery::From(text(&v)),
            s::SearchKey::Subject(v) => SearchQuery::Subject(text(&v)),
            s::SearchKey::Text(v) => SearchQuery::Text(text(&v)),
            s::SearchKey::To(v) => SearchQuery::To(text(&v)),
            s::SearchKey::Header(name, value) => {
                SearchQuery::Header(text(&name), text(&value))
            }

            s::SearchKey::Before(date) => SearchQuery::Before(date),
            s::SearchKey::On(date) => SearchQuery::On(date),
            s::SearchKey::Since(date) => SearchQuery::Since(date),
            s::SearchKey::SentBefore(date) => SearchQuery::SentBefore(date),
            s::SearchKey::SentOn(date) => SearchQuery::SentOn(date),
            s::SearchKey::SentSince(date) => SearchQuery::SentSince(date),

            s::SearchKey::Keyword(kw) => SearchQuery::Keyword(kw.into_owned()),
            s::SearchKey::Unkeyword(kw) => {
                SearchQuery::Unkeyword(kw.into_owned())
            }
            s::SearchKey::Larger(n) => SearchQuery::Larger(n),
            s::SearchKey::Smaller(n) => SearchQuery::Smaller(n),

            s::SearchKey::Uid(ss) => {
                SearchQuery::UidSet(self.parse_uid_range(&ss)?)
            }
            s::SearchKey::SequenceSet(ss) => {
                SearchQuery::SequenceSet(self.parse_seqnum_range(&ss)?)
            }

            s::SearchKey::Not(sub) => SearchQuery::Not(Box::new(
                self.search_query_from_ast(encoding, *sub)?,
            )),
            s::SearchKey::Or(a, b) => SearchQuery::Or(
                Box::new(self.search_query_from_ast(encoding, *a)?),
                Box::new(self.search_query_from_ast(encoding, *b)?),
            ),
            s::SearchKey::And(parts) => SearchQuery::And(
                parts
                    .into_iter()
                    .map(|part| self.search_query_from_ast(encoding, part))
                    .collect::<PartialResult<Vec<_>>>()?,
            ),
        })
    }
}
