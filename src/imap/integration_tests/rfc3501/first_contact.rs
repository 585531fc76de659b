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
async fn greeting_goodbye() {
    let setup = set_up();
    let mut client = setup.connect("3501fcgg");

    let greeting = client.read_logical_line().await;
    assert!(
        greeting.starts_with("* OK [CAPABILITY IMAP4rev1 "),
        "Bad greeting: {}",
        greeting
    );
    assert!(greeting.ends_with(" ready"));

    let responses = ok_command!(client, "LOGOUT");
    assert_eq!("* BYE Goodbye", responses[0]);
    assert_eq!("t1 OK LOGOUT completed", responses[1]);
}

#[tokio::test]
async fn request_capabilities() {
    let setup = set_up();
    let mut client = setup.connect("3501fcrc");
    skip_greeting(&mut client).await;

    let responses = ok_command!(client, "CAPABILITY");
    assert_eq!(2, responses.len());
    let caps: Vec<&str> = responses[0].split(' ').skip(2).collect();
    for expected in ["IMAP4rev1", "ID", "IDLE", "MOVE", "UIDPLUS", "UNSELECT"] {
        assert!(caps.contains(&expected), "{} missing", expected);
    }
    // No TLS configured
    assert!(!caps.contains(&"STARTTLS"));
    assert_tagged_ok(&responses);
}

#[tokio::test]
async fn noop_in_every_state() {
    let setup = set_up();
    let mut client = setup.connect("3501fcno");
    skip_greeting(&mut client).await;

    let responses = ok_command!(client, "NOOP");
    assert_eq!(vec!["t1 OK NOOP OK".to_owned()], responses);

    ok_command!(client, "LOGIN azure hunter2");
    ok_command!(client, "noop");
    ok_command!(client, "SELECT INBOX");
    ok_command!(client, "NoOp");
    ok_command!(client, "CHECK");
}

#[tokio::test]
async fn disconnect_without_logout() {
    let setup = set_up();
    let mut client = setup.connect("3501fcdc");
    quick_log_in(&mut client).await;
    quick_select(&mut client, "INBOX").await;
    drop(client);

    // The server side shutting down must not upset the user
    let mut client = setup.connect("3501fcdc2");
    quick_log_in(&mut client).await;
    quick_select(&mut client, "INBOX").await;
}
