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

use super::defs::*;

const LOST: &[u8] = b"To: Foo@bar.com\n";

#[tokio::test]
async fn failed_append_is_recovered() {
    let setup = set_up();
    let mut client = setup.connect("recofaar");
    quick_log_in(&mut client).await;

    setup.adapter.fail_next_creates(1);
    let responses = client.command_with_literal("APPEND INBOX", LOST).await;
    assert_tagged_code(&responses, "NO [CANNOT]");
    assert_eq!(1, setup.reporter.messages.lock().unwrap().len());

    let responses =
        ok_command!(client, "STATUS \"Recovered Messages\" (MESSAGES)");
    has_line_like(
        &responses,
        r#"^\* STATUS "Recovered Messages" \(MESSAGES 1\)$"#,
    );
    let responses = ok_command!(client, "LIST \"\" *");
    has_line_like(
        &responses,
        r#"^\* LIST \(\\Noinferiors\) "/" "Recovered Messages"$"#,
    );

    quick_select(&mut client, "\"Recovered Messages\"").await;
    let responses = ok_command!(client, "FETCH 1 BODY[]");
    let line = has_line_like(&responses, r"^\* 1 FETCH ");
    assert!(
        line.ends_with("BODY[] {16}\r\nTo: Foo@bar.com\n)"),
        "{}",
        line
    );

    let responses = ok_command!(client, "MOVE 1 INBOX");
    has_line_like(&responses, r"^\* OK \[COPYUID [0-9]+ 1 1\] ");
    has_line_like(&responses, r"^\* 1 EXPUNGE$");

    let responses = ok_command!(client, "STATUS INBOX (MESSAGES)");
    has_line_like(&responses, r"\(MESSAGES 1\)$");

    quick_select(&mut client, "INBOX").await;
    let responses = ok_command!(client, "FETCH 1 BODY.PEEK[]");
    let line = has_line_like(&responses, r"^\* 1 FETCH ");
    assert!(
        line.contains("X-Crymap-Gateway-ID: "),
        "{}",
        line
    );
    assert!(line.ends_with("To: Foo@bar.com\n)"), "{}", line);

    // Now empty, the recovery mailbox drops out of LIST
    let responses = ok_command!(client, "LIST \"\" *");
    has_no_line_like(&responses, "Recovered");
}

#[tokio::test]
async fn identical_failures_stash_once() {
    let setup = set_up();
    let mut client = setup.connect("recoifso");
    quick_log_in(&mut client).await;

    setup.adapter.fail_next_creates(2);
    for _ in 0..2 {
        let responses =
            client.command_with_literal("APPEND INBOX", LOST).await;
        assert_tagged_no(&responses);
    }

    let responses =
        ok_command!(client, "STATUS \"Recovered Messages\" (MESSAGES)");
    has_line_like(&responses, r"\(MESSAGES 1\)$");
}

#[tokio::test]
async fn recovery_mailbox_is_protected() {
    let setup = set_up();
    let mut client = setup.connect("recormip");
    quick_log_in(&mut client).await;
    quick_append_n(&mut client, "INBOX", 1).await;

    setup.adapter.fail_next_creates(1);
    let responses = client.command_with_literal("APPEND INBOX", LOST).await;
    assert_tagged_no(&responses);

    let responses = command!(client, "DELETE \"Recovered Messages\"");
    assert_tagged_code(&responses, "NO [CANNOT]");
    let responses =
        command!(client, "RENAME \"Recovered Messages\" elsewhere");
    assert_tagged_code(&responses, "NO [CANNOT]");
    let responses =
        command!(client, "RENAME INBOX \"Recovered Messages\"");
    assert_tagged_code(&responses, "NO [CANNOT]");

    quick_select(&mut client, "INBOX").await;
    let responses = command!(client, "COPY 1 \"Recovered Messages\"");
    assert_tagged_code(&responses, "NO [CANNOT]");
    let responses = client
        .command_with_literal("APPEND \"Recovered Messages\"", LOST)
        .await;
    assert_tagged_code(&responses, "NO [CANNOT]");
}

#[tokio::test]
async fn move_out_fails_again() {
    let setup = set_up();
    let mut client = setup.connect("recomofa");
    quick_log_in(&mut client).await;

    setup.adapter.fail_next_creates(1);
    let responses = client.command_with_literal("APPEND INBOX", LOST).await;
    assert_tagged_no(&responses);

    quick_select(&mut client, "\"Recovered Messages\"").await;
    setup.adapter.fail_next_creates(1);
    let responses = command!(client, "MOVE 1 INBOX");
    assert_tagged_code(&responses, "NO [CANNOT]");

    // Still there to try again
    let responses = ok_command!(client, "FETCH 1 UID");
    has_line_like(&responses, r"^\* 1 FETCH \(UID 1\)$");
    ok_command!(client, "MOVE 1 INBOX");
}
