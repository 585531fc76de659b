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
async fn select_reports_mailbox_state() {
    let setup = set_up();
    let mut client = setup.connect("3501sesr");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501sesr").await;
    quick_append_n(&mut client, "3501sesr", 3).await;

    let responses = quick_select(&mut client, "3501sesr").await;
    has_line_like(
        &responses,
        r"^\* FLAGS \(\\Answered \\Flagged \\Deleted \\Seen \\Draft\)$",
    );
    has_line_like(&responses, r"^\* 3 EXISTS$");
    has_line_like(&responses, r"^\* 3 RECENT$");
    has_line_like(&responses, r"^\* OK \[UNSEEN 1\] ");
    has_line_like(&responses, r"^\* OK \[PERMANENTFLAGS \(.*\\Seen.*\)\] ");
    has_line_like(&responses, r"^\* OK \[UIDNEXT 4\] ");
    has_line_like(&responses, r"^\* OK \[UIDVALIDITY [0-9]+\] ");
    assert_tagged_code(&responses, "OK [READ-WRITE] SELECT completed");
}

#[tokio::test]
async fn recent_goes_to_one_session() {
    let setup = set_up();
    let mut client = setup.connect("3501serc");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501serc").await;
    quick_append_n(&mut client, "3501serc", 2).await;

    let responses = quick_select(&mut client, "3501serc").await;
    has_line_like(&responses, r"^\* 2 RECENT$");

    // Selecting again starts a new snapshot, which no longer sees the
    // messages as recent.
    let responses = quick_select(&mut client, "3501serc").await;
    has_line_like(&responses, r"^\* 2 EXISTS$");
    has_line_like(&responses, r"^\* 0 RECENT$");
}

#[tokio::test]
async fn examine_is_read_only() {
    let setup = set_up();
    let mut client = setup.connect("3501seex");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501seex").await;
    quick_append_n(&mut client, "3501seex", 1).await;

    let responses = ok_command!(client, "EXAMINE 3501seex");
    has_line_like(&responses, r"^\* OK \[PERMANENTFLAGS \(\)\] ");
    assert_tagged_code(&responses, "OK [READ-ONLY] EXAMINE completed");

    let responses = command!(client, "STORE 1 +FLAGS (\\Deleted)");
    assert_tagged_code(&responses, "NO [CANNOT]");
    let responses = command!(client, "EXPUNGE");
    assert_tagged_code(&responses, "NO [CANNOT]");

    // Fetching the body does not mark it seen in a read-only snapshot
    let responses = ok_command!(client, "FETCH 1 BODY[]");
    has_no_line_like(&responses, r"\\Seen");
}

#[tokio::test]
async fn select_nonexistent() {
    let setup = set_up();
    let mut client = setup.connect("3501sene");
    quick_log_in(&mut client).await;
    quick_select(&mut client, "INBOX").await;

    let responses = command!(client, "SELECT 3501sene");
    assert_tagged_code(&responses, "NO [NONEXISTENT]");

    // The failed SELECT still left the previous mailbox
    let responses = command!(client, "FETCH 1 FLAGS");
    assert_tagged_no(&responses);
}

#[tokio::test]
async fn close_expunges_silently() {
    let setup = set_up();
    let mut client = setup.connect("3501secl");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501secl").await;
    quick_append_n(&mut client, "3501secl", 3).await;
    quick_select(&mut client, "3501secl").await;

    ok_command!(client, "STORE 2 +FLAGS.SILENT (\\Deleted)");
    let responses = ok_command!(client, "CLOSE");
    has_no_line_like(&responses, r"EXPUNGE");

    let responses = ok_command!(client, "STATUS 3501secl (MESSAGES)");
    has_line_like(&responses, r"^\* STATUS 3501secl \(MESSAGES 2\)$");

    let responses = command!(client, "CLOSE");
    assert_tagged_no(&responses);
}

#[tokio::test]
async fn close_after_examine_keeps_deleted() {
    let setup = set_up();
    let mut client = setup.connect("3501sece");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501sece").await;
    quick_append_n(&mut client, "3501sece", 2).await;
    quick_select(&mut client, "3501sece").await;
    ok_command!(client, "STORE 1 +FLAGS.SILENT (\\Deleted)");

    ok_command!(client, "EXAMINE 3501sece");
    ok_command!(client, "CLOSE");

    let responses = ok_command!(client, "STATUS 3501sece (MESSAGES)");
    has_line_like(&responses, r"^\* STATUS 3501sece \(MESSAGES 2\)$");
}

#[tokio::test]
async fn expunge_reports_descending_seqnums() {
    let setup = set_up();
    let mut client = setup.connect("3501seed");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501seed").await;
    quick_append_n(&mut client, "3501seed", 5).await;
    quick_select(&mut client, "3501seed").await;

    ok_command!(client, "STORE 2,4 +FLAGS.SILENT (\\Deleted)");
    let responses = ok_command!(client, "EXPUNGE");
    let expunges: Vec<&str> = responses
        .iter()
        .filter(|l| l.ends_with(" EXPUNGE"))
        .map(String::as_str)
        .collect();
    assert_eq!(vec!["* 4 EXPUNGE", "* 2 EXPUNGE"], expunges);

    let responses = ok_command!(client, "UID SEARCH ALL");
    has_line_like(&responses, r"^\* SEARCH 1 3 5$");
}
