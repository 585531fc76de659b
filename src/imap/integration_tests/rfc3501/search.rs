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

use super::super::defs::*;

async fn set_up_search(
    name: &'static str,
) -> (Setup, TestClient<tokio::io::DuplexStream>) {
    let setup = set_up();
    let mut client = setup.connect(name);
    quick_log_in(&mut client).await;
    quick_create(&mut client, name).await;
    quick_append_n(&mut client, name, 5).await;
    quick_append(
        &mut client,
        name,
        "From: Zoë <zoe@example.com>\r\n\
         Subject: Größenänderung\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         Ein längerer Text über nichts.\r\n"
            .as_bytes(),
    )
    .await;
    quick_select(&mut client, name).await;
    (setup, client)
}

#[tokio::test]
async fn flag_keys() {
    let (_setup, mut client) = set_up_search("3501sefk").await;

    ok_command!(client, "STORE 2,4 +FLAGS.SILENT (\\Seen)");
    ok_command!(client, "STORE 3 +FLAGS.SILENT (\\Deleted \\Flagged)");

    let responses = ok_command!(client, "SEARCH SEEN");
    has_line_like(&responses, r"^\* SEARCH 2 4$");
    let responses = ok_command!(client, "SEARCH UNSEEN UNDELETED");
    has_line_like(&responses, r"^\* SEARCH 1 5 6$");
    let responses = ok_command!(client, "SEARCH OR DELETED SEEN");
    has_line_like(&responses, r"^\* SEARCH 2 3 4$");
    let responses = ok_command!(client, "SEARCH NOT FLAGGED 1:3");
    has_line_like(&responses, r"^\* SEARCH 1 2$");
    let responses = ok_command!(client, "SEARCH RECENT");
    has_line_like(&responses, r"^\* SEARCH 1 2 3 4 5 6$");
    let responses = ok_command!(client, "SEARCH NEW");
    has_line_like(&responses, r"^\* SEARCH 1 3 5 6$");
    let responses = ok_command!(client, "SEARCH OLD");
    has_line_like(&responses, r"^\* SEARCH$");
    assert!(responses.last().unwrap().ends_with(" SEARCH completed"));
}

#[tokio::test]
async fn header_and_text_keys() {
    let (_setup, mut client) = set_up_search("3501seht").await;

    let responses = ok_command!(client, "SEARCH SUBJECT \"message 3\"");
    has_line_like(&responses, r"^\* SEARCH 3$");
    let responses = ok_command!(client, "SEARCH FROM sender4");
    has_line_like(&responses, r"^\* SEARCH 4$");
    let responses = ok_command!(client, "SEARCH HEADER Message-ID <2@");
    has_line_like(&responses, r"^\* SEARCH 2$");
    let responses = ok_command!(client, "SEARCH BODY \"number 5\"");
    has_line_like(&responses, r"^\* SEARCH 5$");
    let responses = ok_command!(client, "SEARCH TEXT azure@example.com");
    has_line_like(&responses, r"^\* SEARCH 1 2 3 4 5$");
    let responses = ok_command!(client, "SEARCH LARGER 10000");
    has_line_like(&responses, r"^\* SEARCH$");
}

#[tokio::test]
async fn charsets() {
    let (_setup, mut client) = set_up_search("3501secs").await;

    let responses = client
        .command_with_literal(
            "SEARCH CHARSET UTF-8 SUBJECT",
            "Größe".as_bytes(),
        )
        .await;
    assert_tagged_ok(&responses);
    has_line_like(&responses, r"^\* SEARCH 6$");

    // "längerer" in ISO-8859-1, sent as a literal
    let responses = client
        .command_with_literal(
            "SEARCH CHARSET ISO-8859-1 BODY",
            b"l\xe4ngerer",
        )
        .await;
    assert_tagged_ok(&responses);
    has_line_like(&responses, r"^\* SEARCH 6$");

    let responses = command!(client, "SEARCH CHARSET X-NOPE ALL");
    assert_tagged_code(&responses, "NO [BADCHARSET (UTF-8 US-ASCII)]");
}

#[tokio::test]
async fn uid_search() {
    let (_setup, mut client) = set_up_search("3501seus").await;

    ok_command!(client, "STORE 1:2 +FLAGS.SILENT (\\Deleted)");
    ok_command!(client, "EXPUNGE");

    let responses = ok_command!(client, "SEARCH ALL");
    has_line_like(&responses, r"^\* SEARCH 1 2 3 4$");
    let responses = ok_command!(client, "UID SEARCH ALL");
    has_line_like(&responses, r"^\* SEARCH 3 4 5 6$");
    let responses = ok_command!(client, "UID SEARCH UID 4:5");
    has_line_like(&responses, r"^\* SEARCH 4 5$");
    let responses = ok_command!(client, "SEARCH UID 4:5");
    has_line_like(&responses, r"^\* SEARCH 2 3$");
    assert!(responses.last().unwrap().ends_with(" SEARCH completed"));
}

#[tokio::test]
async fn date_keys() {
    let setup = set_up();
    let mut client = setup.connect("3501sedk");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501sedk").await;
    for date in &["01-Jan-2020 00:00:00 +0000", "15-Jun-2021 12:00:00 +0000"] {
        let responses = client
            .command_with_literal(
                &format!("APPEND 3501sedk \"{}\"", date),
                b"Date: Fri, 1 Mar 2019 10:00:00 +0000\r\n\r\nx\r\n",
            )
            .await;
        assert_tagged_ok_any(&responses);
    }
    quick_select(&mut client, "3501sedk").await;

    let responses = ok_command!(client, "SEARCH BEFORE 1-Feb-2020");
    has_line_like(&responses, r"^\* SEARCH 1$");
    let responses = ok_command!(client, "SEARCH SINCE 1-Feb-2020");
    has_line_like(&responses, r"^\* SEARCH 2$");
    let responses = ok_command!(client, "SEARCH ON 15-Jun-2021");
    has_line_like(&responses, r"^\* SEARCH 2$");
    let responses = ok_command!(client, "SEARCH SENTON 1-Mar-2019");
    has_line_like(&responses, r"^\* SEARCH 1 2$");
    let responses = ok_command!(client, "SEARCH SENTSINCE 2-Mar-2019");
    has_line_like(&responses, r"^\* SEARCH$");
}
