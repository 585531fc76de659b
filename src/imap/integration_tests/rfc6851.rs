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

#[tokio::test]
async fn capability_declared() {
    test_require_capability("MOVE").await;
}

#[tokio::test]
async fn move_half_the_mailbox() {
    let setup = set_up();
    let mut client = setup.connect("6851mhtm");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "6851mhtm").await;
    quick_create(&mut client, "other").await;
    quick_append_n(&mut client, "6851mhtm", 100).await;

    let responses = ok_command!(client, "EXAMINE other");
    let line = has_line_like(&responses, r"^\* OK \[UIDVALIDITY [0-9]+\]");
    let dst_v = line["* OK [UIDVALIDITY ".len()..]
        .split(']')
        .next()
        .unwrap()
        .to_owned();

    quick_select(&mut client, "6851mhtm").await;
    let responses = ok_command!(client, "MOVE 1:50 other");

    // COPYUID is untagged and comes before any EXPUNGE
    assert!(
        responses[0]
            .starts_with(&format!("* OK [COPYUID {} 1:50 1:50] ", dst_v)),
        "{:#?}",
        responses
    );
    assert_eq!(50, count_lines_like(&responses, r"^\* [0-9]+ EXPUNGE$"));
    assert_eq!("* 50 EXPUNGE", responses[1]);
    assert_tagged_ok(&responses);

    let responses =
        ok_command!(client, "STATUS other (MESSAGES UIDNEXT)");
    has_line_like(&responses, r"^\* STATUS other \(MESSAGES 50 UIDNEXT 51\)$");
    let responses = ok_command!(client, "STATUS 6851mhtm (MESSAGES)");
    has_line_like(&responses, r"\(MESSAGES 50\)$");

    let responses = ok_command!(client, "UID SEARCH ALL");
    assert_eq!(
        format!(
            "* SEARCH {}",
            (51..=100).map(|u| u.to_string()).collect::<Vec<_>>().join(" ")
        ),
        responses[0]
    );

    // A single move call went to the remote store
    assert!(setup
        .adapter
        .calls()
        .iter()
        .any(|c| c.starts_with("move_messages 50 ")));
}

#[tokio::test]
async fn uid_move_preserves_flags() {
    let setup = set_up();
    let mut client = setup.connect("6851umpf");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "6851umpf").await;
    quick_create(&mut client, "6851umpf-dst").await;
    quick_append_n(&mut client, "6851umpf", 3).await;
    quick_select(&mut client, "6851umpf").await;

    ok_command!(client, "STORE 2 +FLAGS.SILENT (\\Flagged)");
    let responses = ok_command!(client, "UID MOVE 2 6851umpf-dst");
    has_line_like(&responses, r"^\* OK \[COPYUID [0-9]+ 2 1\] ");
    has_line_like(&responses, r"^\* 2 EXPUNGE$");

    ok_command!(client, "EXAMINE 6851umpf-dst");
    let responses = ok_command!(client, "FETCH 1 FLAGS");
    has_line_like(&responses, r"^\* 1 FETCH \(FLAGS \(\\Flagged");
}

#[tokio::test]
async fn move_requires_writable_source() {
    let setup = set_up();
    let mut client = setup.connect("6851mrws");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "6851mrws").await;
    quick_append_n(&mut client, "6851mrws", 1).await;

    ok_command!(client, "EXAMINE 6851mrws");
    let responses = command!(client, "MOVE 1 INBOX");
    assert_tagged_code(&responses, "NO [CANNOT]");

    quick_select(&mut client, "6851mrws").await;
    let responses = command!(client, "MOVE 1 6851mrws-nx");
    assert_tagged_code(&responses, "NO [TRYCREATE]");
}
