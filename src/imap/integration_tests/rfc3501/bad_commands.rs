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
async fn unknown_and_malformed_commands() {
    let setup = set_up();
    let mut client = setup.connect("3501bcum");
    skip_greeting(&mut client).await;

    let responses = command!(client, "XYZZY");
    assert_tagged_code(&responses, "BAD [PARSE]");

    let responses = command!(client, "LOGIN azure");
    assert_tagged_code(&responses, "BAD [PARSE]");

    let responses = command!(client, "NOOP extra");
    assert_tagged_code(&responses, "BAD [PARSE]");

    // Nothing that even looks like a tag
    client.write_raw(b"\r\n").await;
    let line = client.read_logical_line().await;
    assert!(line.starts_with("* BAD [PARSE]"), "Unexpected {}", line);

    // The session survives all that
    ok_command!(client, "LOGIN azure hunter2");
}

#[tokio::test]
async fn bad_sequence_sets() {
    let setup = set_up();
    let mut client = setup.connect("3501bcbs");
    quick_log_in(&mut client).await;
    quick_append_n(&mut client, "INBOX", 2).await;
    quick_select(&mut client, "INBOX").await;

    let responses = command!(client, "FETCH 3 FLAGS");
    assert_tagged_code(&responses, "BAD [CLIENTBUG]");

    let responses = command!(client, "FETCH 0 FLAGS");
    assert_tagged_bad(&responses);

    // UIDs out of range are just ignored
    let responses = ok_command!(client, "UID FETCH 100:200 FLAGS");
    assert_eq!(1, responses.len());
}

#[tokio::test]
async fn wrong_state_is_no_not_bad() {
    let setup = set_up();
    let mut client = setup.connect("3501bcws");
    quick_log_in(&mut client).await;

    let responses = command!(client, "LOGIN azure hunter2");
    assert_tagged_no(&responses);
    let responses = command!(client, "STARTTLS");
    assert_tagged_no(&responses);
}
