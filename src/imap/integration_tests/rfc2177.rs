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
    test_require_capability("IDLE").await;
}

#[tokio::test]
async fn idle_requires_login() {
    let setup = set_up();
    let mut client = setup.connect("2177irli");
    skip_greeting(&mut client).await;

    let responses = command!(client, "IDLE");
    assert_tagged_no(&responses);

    // The server isn't waiting for DONE
    ok_command!(client, "NOOP");
}

#[tokio::test]
async fn idle_wakes_on_append() {
    let setup = set_up();
    let mut client = setup.connect("2177iwoa");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "2177iwoa").await;

    let mut idler = setup.connect("2177iwoaI");
    quick_log_in(&mut idler).await;
    quick_select(&mut idler, "2177iwoa").await;

    idler.write_raw(b"I1 IDLE\r\n").await;
    assert_eq!("+ Ready", idler.read_logical_line().await);

    quick_append_n(&mut client, "2177iwoa", 1).await;
    assert_eq!("* 1 EXISTS", idler.read_logical_line().await);
    assert_eq!("* 1 RECENT", idler.read_logical_line().await);

    ok_command!(client, "SELECT 2177iwoa");
    ok_command!(client, "STORE 1 +FLAGS.SILENT (\\Flagged)");
    assert_eq!(
        "* 1 FETCH (FLAGS (\\Flagged \\Recent))",
        idler.read_logical_line().await
    );

    ok_command!(client, "STORE 1 +FLAGS.SILENT (\\Deleted)");
    ok_command!(client, "EXPUNGE");
    // The flag change may or may not be seen before the expunge
    let mut line = idler.read_logical_line().await;
    if line.contains("FETCH") {
        line = idler.read_logical_line().await;
    }
    assert_eq!("* 1 EXPUNGE", line);

    idler.write_raw(b"DONE\r\n").await;
    assert_eq!("I1 OK IDLE done", idler.read_logical_line().await);
    ok_command!(idler, "NOOP");
}

#[tokio::test]
async fn idle_without_selection() {
    let setup = set_up();
    let mut client = setup.connect("2177iwse");
    quick_log_in(&mut client).await;

    client.write_raw(b"I1 IDLE\r\n").await;
    assert_eq!("+ Ready", client.read_logical_line().await);
    client.write_raw(b"DONE\r\n").await;
    assert_eq!("I1 OK IDLE done", client.read_logical_line().await);
}

#[tokio::test]
async fn idle_refuses_other_commands() {
    let setup = set_up();
    let mut client = setup.connect("2177irfo");
    quick_log_in(&mut client).await;
    quick_select(&mut client, "INBOX").await;

    client.write_raw(b"I1 IDLE\r\n").await;
    assert_eq!("+ Ready", client.read_logical_line().await);
    client.write_raw(b"I2 NOOP\r\n").await;
    let line = client.read_logical_line().await;
    assert!(line.starts_with("I1 BAD "), "Unexpected {}", line);

    ok_command!(client, "NOOP");
}

#[tokio::test]
async fn delete_mailbox_during_idle() {
    let setup = set_up();
    let mut client = setup.connect("2177dmdi");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "2177dmdi").await;

    let mut victim = setup.connect("2177dmdiV");
    quick_log_in(&mut victim).await;
    quick_select(&mut victim, "2177dmdi").await;

    victim.write_raw(b"I1 IDLE\r\n").await;
    assert_eq!("+ Ready", victim.read_logical_line().await);

    ok_command!(client, "DELETE 2177dmdi");

    let line = victim.read_logical_line().await;
    assert!(line.starts_with("* BYE "), "Unexpected {}", line);
}
