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
    test_require_capability("ID").await;
}

#[tokio::test]
async fn server_identifies_itself() {
    let mut config = crate::support::system_config::SystemConfig::default();
    config
        .identification
        .insert("support_url".to_owned(), "https://example.com".to_owned());
    let setup = set_up_with_config(config);
    let mut client = setup.connect("2971siis");
    skip_greeting(&mut client).await;

    let responses =
        ok_command!(client, r#"ID ("name" "test" "version" "1.0")"#);
    let line = has_line_like(&responses, r"^\* ID \(");
    assert!(
        line.starts_with(&format!(
            "* ID (\"name\" \"{}\" \"version\" \"{}\"",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )),
        "{}",
        line
    );
    assert!(
        line.contains("\"support-url\" \"https://example.com\""),
        "{}",
        line
    );
}

#[tokio::test]
async fn corner_cases() {
    let setup = set_up();

    // New connection each time to ensure we go through the full logic
    for params in &[
        "NIL",
        r#"("name" NIL "version" "0.1")"#,
        r#"("name" "foo" "version" NIL)"#,
        r#"("name" "foo" "x-foo" "bar")"#,
        "()",
    ] {
        let mut client = setup.connect("2971cc");
        skip_greeting(&mut client).await;
        ok_command!(client, "ID {}", params);
    }
}

#[tokio::test]
async fn id_reaches_remote_calls() {
    let setup = set_up();
    let mut client = setup.connect("2971idrc");
    quick_log_in(&mut client).await;

    ok_command!(client, r#"ID ("name" "Mutt" "version" "2.0")"#);
    quick_create(&mut client, "2971idrc").await;

    let contexts = setup.adapter.label_contexts.lock().unwrap().clone();
    let ctx = contexts.last().expect("no create_label call");
    let id = ctx.imap_id.as_ref().expect("no ID in context");
    assert_eq!(Some("Mutt"), id.name());
    assert_eq!(Some("2.0"), id.version());

    // Only the first exchange counts
    ok_command!(client, r#"ID ("name" "Other")"#);
    quick_create(&mut client, "2971idrc2").await;
    let contexts = setup.adapter.label_contexts.lock().unwrap().clone();
    let id = contexts.last().unwrap().imap_id.as_ref().unwrap();
    assert_eq!(Some("Mutt"), id.name());
}
