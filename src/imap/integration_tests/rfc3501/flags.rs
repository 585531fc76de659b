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
async fn store_variants() {
    let setup = set_up();
    let mut client = setup.connect("3501flsv");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501flsv").await;
    quick_append_n(&mut client, "3501flsv", 3).await;
    quick_select(&mut client, "3501flsv").await;

    let responses = ok_command!(client, "STORE 1 +FLAGS (\\Flagged)");
    has_line_like(
        &responses,
        r"^\* 1 FETCH \(FLAGS \(\\Flagged \\Recent\)\)$",
    );
    assert!(responses.last().unwrap().ends_with(" STORE completed"));

    let responses = ok_command!(client, "STORE 1 FLAGS (\\Seen \\Answered)");
    let line = has_line_like(&responses, r"^\* 1 FETCH \(FLAGS ");
    assert!(line.contains("\\Seen"), "{}", line);
    assert!(line.contains("\\Answered"), "{}", line);
    assert!(!line.contains("\\Flagged"), "{}", line);

    let responses = ok_command!(client, "STORE 1 -FLAGS (\\Seen)");
    has_line_like(
        &responses,
        r"^\* 1 FETCH \(FLAGS \(\\Answered \\Recent\)\)$",
    );

    let responses = ok_command!(client, "UID STORE 2:3 +FLAGS (\\Draft)");
    has_line_like(&responses, r"^\* 2 FETCH \(UID 2 FLAGS \(\\Draft \\Recent\)\)$");
    has_line_like(&responses, r"^\* 3 FETCH \(UID 3 FLAGS \(\\Draft \\Recent\)\)$");
    assert!(responses.last().unwrap().ends_with(" UID STORE completed"));
}

#[tokio::test]
async fn silent_store() {
    let setup = set_up();
    let mut client = setup.connect("3501flss");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501flss").await;
    quick_append_n(&mut client, "3501flss", 1).await;
    quick_select(&mut client, "3501flss").await;

    let responses = ok_command!(client, "STORE 1 +FLAGS.SILENT (\\Flagged)");
    assert_eq!(1, responses.len(), "{:#?}", responses);

    let responses = ok_command!(client, "FETCH 1 FLAGS");
    has_line_like(&responses, r"^\* 1 FETCH \(FLAGS \(\\Flagged \\Recent\)\)$");
}

#[tokio::test]
async fn keywords() {
    let setup = set_up();
    let mut client = setup.connect("3501flkw");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501flkw").await;
    quick_append_n(&mut client, "3501flkw", 1).await;
    quick_select(&mut client, "3501flkw").await;

    let responses = ok_command!(client, "STORE 1 +FLAGS ($Important)");
    // A new keyword widens the flags the mailbox advertises
    has_line_like(&responses, r"^\* FLAGS \(.*\$Important.*\)$");
    has_line_like(&responses, r"^\* 1 FETCH \(FLAGS \(\$Important \\Recent\)\)$");

    let responses = ok_command!(client, "SEARCH KEYWORD $Important");
    has_line_like(&responses, r"^\* SEARCH 1$");
}

#[tokio::test]
async fn recent_cannot_be_stored() {
    let setup = set_up();
    let mut client = setup.connect("3501flrc");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501flrc").await;
    quick_append_n(&mut client, "3501flrc", 1).await;
    quick_select(&mut client, "3501flrc").await;

    let responses = command!(client, "STORE 1 +FLAGS (\\Recent)");
    assert_tagged_bad(&responses);

    let responses = command!(client, "STORE 1 +FLAGS (\\Bogus)");
    assert_tagged_bad(&responses);
}

#[tokio::test]
async fn seen_and_flagged_reach_remote() {
    let setup = set_up();
    let mut client = setup.connect("3501flrm");
    quick_log_in(&mut client).await;
    quick_append_n(&mut client, "INBOX", 1).await;
    quick_select(&mut client, "INBOX").await;

    ok_command!(client, "STORE 1 +FLAGS.SILENT (\\Seen \\Flagged)");
    ok_command!(client, "STORE 1 -FLAGS.SILENT (\\Flagged)");

    let calls = setup.adapter.calls();
    assert!(
        calls.iter().any(|c| c.starts_with("mark_seen ")),
        "{:#?}",
        calls
    );
    assert_eq!(
        2,
        calls
            .iter()
            .filter(|c| c.starts_with("mark_flagged "))
            .count(),
        "{:#?}",
        calls
    );
}
