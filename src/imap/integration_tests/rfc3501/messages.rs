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

#[tokio::test]
async fn append_with_flags_and_date() {
    let setup = set_up();
    let mut client = setup.connect("3501meaf");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "saved").await;

    let responses = client
        .command_with_literal(
            "APPEND saved (\\Seen) \"15-Nov-1984 13:37:01 +0730\"",
            b"Subject: x\r\n\r\nhello\r\n",
        )
        .await;
    assert_tagged_code(&responses, "OK [APPENDUID ");
    let tagged = responses.last().unwrap();
    assert!(tagged.contains(" 1] "), "Unexpected {}", tagged);

    let responses = ok_command!(client, "STATUS saved (MESSAGES UNSEEN)");
    has_line_like(&responses, r"^\* STATUS saved \(MESSAGES 1 UNSEEN 0\)$");

    quick_select(&mut client, "saved").await;
    let responses = ok_command!(client, "FETCH 1 (FLAGS INTERNALDATE)");
    has_line_like(
        &responses,
        r#"^\* 1 FETCH \(FLAGS \(\\Seen \\Recent\) INTERNALDATE "15-Nov-1984 13:37:01 \+0730"\)$"#,
    );
}

#[tokio::test]
async fn append_hands_stamped_literal_to_remote() {
    let setup = set_up();
    let mut client = setup.connect("3501mest");
    quick_log_in(&mut client).await;
    quick_append(&mut client, "INBOX", b"Subject: stamp\r\n\r\nbody\r\n").await;

    assert!(setup
        .adapter
        .calls()
        .iter()
        .any(|c| c == "create_message INBOX"));

    quick_select(&mut client, "INBOX").await;
    // The full literal carries the gateway's id
    let responses = ok_command!(client, "FETCH 1 BODY.PEEK[]");
    has_line_like(&responses, r"X-Crymap-Gateway-ID: [0-9a-f]{32}\r\n");

    // but header sections do not show it unless asked for by name
    let responses = ok_command!(client, "FETCH 1 BODY.PEEK[HEADER]");
    has_no_line_like(&responses, "X-Crymap-Gateway-ID");
    let responses = ok_command!(
        client,
        "FETCH 1 BODY.PEEK[HEADER.FIELDS (X-Crymap-Gateway-ID)]"
    );
    has_line_like(&responses, "X-Crymap-Gateway-ID: ");
}

#[tokio::test]
async fn append_to_missing_mailbox() {
    let setup = set_up();
    let mut client = setup.connect("3501meam");
    quick_log_in(&mut client).await;

    let responses = client
        .command_with_literal("APPEND 3501meam", b"Subject: x\r\n\r\n")
        .await;
    assert_tagged_code(&responses, "NO [TRYCREATE]");

    let responses = client
        .command_with_literal(
            "APPEND \"Recovered Messages\"",
            b"Subject: x\r\n\r\n",
        )
        .await;
    assert_tagged_no(&responses);
}

#[tokio::test]
async fn append_to_selected_mailbox() {
    let setup = set_up();
    let mut client = setup.connect("3501meas");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501meas").await;
    quick_select(&mut client, "3501meas").await;

    let responses = client
        .command_with_literal("APPEND 3501meas", &sample_message(1))
        .await;
    assert_tagged_ok_any(&responses);
    has_line_like(&responses, r"^\* 1 EXISTS$");
    has_line_like(&responses, r"^\* 1 RECENT$");
}

#[tokio::test]
async fn copy_messages() {
    let setup = set_up();
    let mut client = setup.connect("3501mecp");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501mecp-src").await;
    quick_create(&mut client, "3501mecp-dst").await;
    quick_append_n(&mut client, "3501mecp-src", 3).await;
    quick_select(&mut client, "3501mecp-src").await;

    ok_command!(client, "STORE 2 +FLAGS.SILENT (\\Flagged)");
    let responses = ok_command!(client, "COPY 2:3 3501mecp-dst");
    assert_tagged_code(&responses, "OK [COPYUID ");
    assert!(
        responses.last().unwrap().contains(" 2:3 1:2] "),
        "{:#?}",
        responses
    );

    // The source is untouched
    let responses = ok_command!(client, "STATUS 3501mecp-src (MESSAGES)");
    has_line_like(&responses, r"\(MESSAGES 3\)$");

    ok_command!(client, "EXAMINE 3501mecp-dst");
    let responses = ok_command!(client, "FETCH 1:* FLAGS");
    has_line_like(
        &responses,
        r"^\* 1 FETCH \(FLAGS \(\\Flagged( \\Recent)?\)\)$",
    );
    has_line_like(&responses, r"^\* 2 FETCH \(FLAGS \((\\Recent)?\)\)$");

    let responses = command!(client, "COPY 1 3501mecp-nx");
    assert_tagged_code(&responses, "NO [TRYCREATE]");
}

#[tokio::test]
async fn uid_copy_of_missing_uids() {
    let setup = set_up();
    let mut client = setup.connect("3501meuc");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501meuc").await;
    quick_append_n(&mut client, "3501meuc", 1).await;
    quick_select(&mut client, "3501meuc").await;

    // Nothing matched, so there is no COPYUID
    let responses = ok_command!(client, "UID COPY 50:60 INBOX");
    assert_tagged_ok(&responses);

    let responses = command!(client, "COPY 5 INBOX");
    assert_tagged_code(&responses, "BAD [CLIENTBUG]");
}
