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

const SIMPLE: &[u8] = b"From: Alice <alice@example.com>\r\n\
                        To: azure@example.com\r\n\
                        Subject: Greetings\r\n\
                        Date: Sat, 4 Jul 2020 12:30:00 +0100\r\n\
                        \r\n\
                        Hello there\r\n";

async fn set_up_simple(
    name: &'static str,
) -> (Setup, TestClient<tokio::io::DuplexStream>) {
    let setup = set_up();
    let mut client = setup.connect(name);
    quick_log_in(&mut client).await;
    quick_create(&mut client, name).await;
    quick_append(&mut client, name, SIMPLE).await;
    quick_select(&mut client, name).await;
    (setup, client)
}

#[tokio::test]
async fn fetch_macros() {
    let (_setup, mut client) = set_up_simple("3501fema").await;

    let responses = ok_command!(client, "FETCH 1 FAST");
    has_line_like(
        &responses,
        r#"^\* 1 FETCH \(FLAGS \(\\Recent\) RFC822\.SIZE [0-9]+ INTERNALDATE "[^"]+"\)$"#,
    );

    let responses = ok_command!(client, "FETCH 1 ALL");
    let line = has_line_like(&responses, r"^\* 1 FETCH \(FLAGS ");
    assert!(line.contains(" ENVELOPE ("), "{}", line);
    assert!(line.contains("\"Greetings\""), "{}", line);
    assert!(!line.contains(" BODY "), "{}", line);

    let responses = ok_command!(client, "FETCH 1 FULL");
    let line = has_line_like(&responses, r"^\* 1 FETCH \(FLAGS ");
    assert!(line.contains(" ENVELOPE ("), "{}", line);
    assert!(line.contains(" BODY ("), "{}", line);

    let responses = ok_command!(client, "FETCH 1 (BODYSTRUCTURE)");
    has_line_like(
        &responses,
        r#"(?i)^\* 1 FETCH \(BODYSTRUCTURE \("text" "plain" "#,
    );

    // FETCH macros never set \Seen
    let responses = ok_command!(client, "FETCH 1 FLAGS");
    has_line_like(&responses, r"^\* 1 FETCH \(FLAGS \(\\Recent\)\)$");
}

#[tokio::test]
async fn uid_fetch_includes_uid() {
    let (_setup, mut client) = set_up_simple("3501feui").await;

    let responses = ok_command!(client, "UID FETCH 1 FLAGS");
    has_line_like(&responses, r"^\* 1 FETCH \(UID 1 FLAGS \(\\Recent\)\)$");
    assert_tagged_ok(&responses);
    assert!(responses.last().unwrap().ends_with("UID FETCH completed"));

    // Missing UIDs are silently skipped
    let responses = ok_command!(client, "UID FETCH 2:100 FLAGS");
    assert_eq!(1, responses.len(), "{:#?}", responses);
}

#[tokio::test]
async fn seen_side_effects() {
    let (_setup, mut client) = set_up_simple("3501fese").await;

    let responses = ok_command!(client, "FETCH 1 BODY.PEEK[TEXT]");
    has_no_line_like(&responses, r"\\Seen");

    let responses = ok_command!(client, "FETCH 1 RFC822.HEADER");
    has_line_like(&responses, r"^\* 1 FETCH \(RFC822\.HEADER \{");
    has_no_line_like(&responses, r"\\Seen");

    let responses = ok_command!(client, "FETCH 1 BODY[TEXT]");
    assert_eq!(
        "* 1 FETCH (FLAGS (\\Seen \\Recent) BODY[TEXT] {13}\r\n\
         Hello there\r\n)",
        responses[0]
    );

    // Already seen, so FLAGS is not forced again
    let responses = ok_command!(client, "FETCH 1 RFC822.TEXT");
    assert_eq!("* 1 FETCH (RFC822.TEXT {13}\r\nHello there\r\n)", responses[0]);
}

#[tokio::test]
async fn legacy_rfc822_sets_seen() {
    let (_setup, mut client) = set_up_simple("3501fers").await;

    let responses = ok_command!(client, "FETCH 1 RFC822");
    let line = has_line_like(&responses, r"^\* 1 FETCH \(FLAGS \(\\Seen");
    assert!(line.contains(" RFC822 {"), "{}", line);
    assert!(line.ends_with("Hello there\r\n)"), "{}", line);
}

#[tokio::test]
async fn sections_and_partials() {
    let (_setup, mut client) = set_up_simple("3501fesp").await;

    let responses = ok_command!(
        client,
        "FETCH 1 BODY.PEEK[HEADER.FIELDS (Subject)]"
    );
    assert_eq!(
        "* 1 FETCH (BODY[HEADER.FIELDS (Subject)] {22}\r\n\
         Subject: Greetings\r\n\r\n)",
        responses[0]
    );

    let responses = ok_command!(
        client,
        "FETCH 1 BODY.PEEK[HEADER.FIELDS.NOT (From To Date)]"
    );
    assert_eq!(
        "* 1 FETCH (BODY[HEADER.FIELDS.NOT (From To Date)] {22}\r\n\
         Subject: Greetings\r\n\r\n)",
        responses[0]
    );

    let responses = ok_command!(client, "FETCH 1 BODY.PEEK[TEXT]<6.5>");
    assert_eq!("* 1 FETCH (BODY[TEXT]<6> {5}\r\nthere)", responses[0]);

    let responses = ok_command!(client, "FETCH 1 BODY.PEEK[1]");
    assert_eq!("* 1 FETCH (BODY[1] {13}\r\nHello there\r\n)", responses[0]);

    // Parts that do not exist are empty
    let responses = ok_command!(client, "FETCH 1 BODY.PEEK[3]");
    assert_eq!("* 1 FETCH (BODY[3] {0}\r\n)", responses[0]);

    let responses = command!(client, "FETCH 1 BODY.PEEK[MIME]");
    assert_tagged_bad(&responses);
}

#[tokio::test]
async fn fetch_out_of_range() {
    let (_setup, mut client) = set_up_simple("3501feor").await;

    let responses = command!(client, "FETCH 2 FLAGS");
    assert_tagged_code(&responses, "BAD [CLIENTBUG]");

    let responses = ok_command!(client, "FETCH * UID");
    has_line_like(&responses, r"^\* 1 FETCH \(UID 1\)$");
}
