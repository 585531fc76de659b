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

use std::time::Duration;

use super::defs::*;
use crate::account::model::{Flag, FlagSet, RemoteMailboxId};
use crate::remote::test_adapter::TEST_PASSWORD;
use crate::remote::update::RemoteUpdate;

#[tokio::test]
async fn expunge_seen_by_other_session() {
    let setup = set_up();
    let mut a = setup.connect("multexso");
    quick_log_in(&mut a).await;
    quick_append_n(&mut a, "INBOX", 3).await;
    quick_select(&mut a, "INBOX").await;

    let mut b = setup.connect("multexsoB");
    quick_log_in(&mut b).await;
    quick_select(&mut b, "INBOX").await;

    ok_command!(a, "STORE 1 +FLAGS (\\Deleted)");
    let responses = ok_command!(a, "EXPUNGE");
    has_line_like(&responses, r"^\* 1 EXPUNGE$");

    // FETCH must not shift sequence numbers, so B still sees all three and
    // is told something was expunged.
    let responses = b.command("FETCH 1:* (UID)").await;
    has_line_like(&responses, r"^\* 1 FETCH \(UID 1\)$");
    has_line_like(&responses, r"^\* 2 FETCH \(UID 2\)$");
    has_line_like(&responses, r"^\* 3 FETCH \(UID 3\)$");
    assert_tagged_code(&responses, "OK [EXPUNGEISSUED]");

    let responses = ok_command!(b, "NOOP");
    has_line_like(&responses, r"^\* 1 EXPUNGE$");

    let responses = ok_command!(b, "FETCH 1:* (UID)");
    assert_eq!(
        vec!["* 1 FETCH (UID 2)", "* 2 FETCH (UID 3)"],
        responses[..2].to_vec()
    );
    assert_tagged_ok(&responses);
}

#[tokio::test]
async fn store_to_expunged_message() {
    let setup = set_up();
    let mut a = setup.connect("multstem");
    quick_log_in(&mut a).await;
    quick_append_n(&mut a, "INBOX", 2).await;
    quick_select(&mut a, "INBOX").await;

    let mut b = setup.connect("multstemB");
    quick_log_in(&mut b).await;
    quick_select(&mut b, "INBOX").await;

    ok_command!(a, "STORE 2 +FLAGS.SILENT (\\Deleted)");
    ok_command!(a, "EXPUNGE");

    // The pooled message can still be addressed until B polls
    let responses = b.command("STORE 2 +FLAGS (\\Flagged)").await;
    assert_tagged_code(&responses, "OK [EXPUNGEISSUED]");
    let responses = b.command("FETCH 2 BODY.PEEK[TEXT]").await;
    has_line_like(&responses, r"message number 2");

    let responses = ok_command!(b, "NOOP");
    has_line_like(&responses, r"^\* 2 EXPUNGE$");
}

#[tokio::test]
async fn flag_changes_propagate() {
    let setup = set_up();
    let mut a = setup.connect("multfcpr");
    quick_log_in(&mut a).await;
    quick_append_n(&mut a, "INBOX", 1).await;
    quick_select(&mut a, "INBOX").await;

    let mut b = setup.connect("multfcprB");
    quick_log_in(&mut b).await;
    quick_select(&mut b, "INBOX").await;

    ok_command!(a, "STORE 1 +FLAGS.SILENT (\\Answered)");
    let responses = ok_command!(b, "NOOP");
    has_line_like(&responses, r"^\* 1 FETCH \(FLAGS \(\\Answered\)\)$");

    // Reported only once
    let responses = ok_command!(b, "NOOP");
    assert_eq!(1, responses.len(), "{:#?}", responses);
}

#[tokio::test]
async fn mailbox_deleted_under_session() {
    let setup = set_up();
    let mut a = setup.connect("multmdus");
    quick_log_in(&mut a).await;
    quick_create(&mut a, "multmdus").await;

    let mut b = setup.connect("multmdusB");
    quick_log_in(&mut b).await;
    quick_select(&mut b, "multmdus").await;

    ok_command!(a, "DELETE multmdus");

    b.write_raw(b"t9 NOOP\r\n").await;
    let line = b.read_logical_line().await;
    assert!(line.starts_with("* BYE "), "Unexpected {}", line);
}

#[tokio::test]
async fn remote_arrivals_and_changes() {
    let setup = set_up();
    let mut client = setup.connect("multraac");
    quick_log_in(&mut client).await;
    quick_select(&mut client, "INBOX").await;

    let (message, literal) = setup
        .adapter
        .remote_message("INBOX", b"Subject: pushed\r\n\r\nfrom afar\r\n");
    let remote_id = message.id.clone();
    setup
        .updates
        .send(RemoteUpdate::MessagesCreated(vec![(message, literal)]))
        .await
        .unwrap();

    let responses = noop_until(&mut client, r"^\* 1 EXISTS$").await;
    has_line_like(&responses, r"^\* 1 RECENT$");
    let responses = ok_command!(client, "FETCH 1 BODY.PEEK[HEADER.FIELDS (Subject)]");
    has_line_like(&responses, "Subject: pushed");

    let flags: FlagSet = vec![Flag::Seen, Flag::Flagged].into_iter().collect();
    setup
        .updates
        .send(RemoteUpdate::MessageFlagsUpdated {
            id: remote_id.clone(),
            flags,
        })
        .await
        .unwrap();
    let responses = noop_until(&mut client, r"^\* 1 FETCH \(FLAGS ").await;
    let line = has_line_like(&responses, r"^\* 1 FETCH \(FLAGS ");
    assert!(line.contains("\\Seen"), "{}", line);
    assert!(line.contains("\\Flagged"), "{}", line);

    setup
        .updates
        .send(RemoteUpdate::MailboxCreated {
            id: RemoteMailboxId("label-remote".to_owned()),
            path: vec!["pushed".to_owned(), "child".to_owned()],
        })
        .await
        .unwrap();
    setup
        .updates
        .send(RemoteUpdate::MessagesDeleted(vec![remote_id]))
        .await
        .unwrap();
    noop_until(&mut client, r"^\* 1 EXPUNGE$").await;

    let responses = ok_command!(client, "LIST \"\" pushed*");
    has_line_like(&responses, r#"^\* LIST \(.*\) "/" pushed/child$"#);
}

#[tokio::test]
async fn paused_user_holds_updates() {
    let setup = set_up();
    let mut client = setup.connect("multpuhu");
    quick_log_in(&mut client).await;
    quick_select(&mut client, "INBOX").await;

    setup.server.pause_user(USER).await.unwrap();
    let (message, literal) =
        setup.adapter.remote_message("INBOX", b"Subject: held\r\n\r\n");
    setup
        .updates
        .send(RemoteUpdate::MessagesCreated(vec![(message, literal)]))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let responses = ok_command!(client, "NOOP");
    has_no_line_like(&responses, "EXISTS");

    setup.server.resume_user(USER).await.unwrap();
    noop_until(&mut client, r"^\* 1 EXISTS$").await;
}

#[tokio::test]
async fn removed_user_is_disconnected() {
    let setup = set_up();
    let mut client = setup.connect("multruid");
    quick_log_in(&mut client).await;

    setup.server.remove_user(USER).unwrap();
    assert!(setup.server.remove_user(USER).is_err());

    // Anything that touches the account ends the session
    client.write_raw(b"t9 CREATE multruid\r\n").await;
    let line = client.read_logical_line().await;
    assert!(line.starts_with("* BYE "), "Unexpected {}", line);

    let mut client = setup.connect("multruid2");
    skip_greeting(&mut client).await;
    let responses = command!(client, "LOGIN {} {}", USER, TEST_PASSWORD);
    assert_tagged_no(&responses);
}
