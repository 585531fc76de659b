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
async fn create_and_list() {
    let setup = set_up();
    let mut client = setup.connect("3501mbcl");
    quick_log_in(&mut client).await;

    quick_create(&mut client, "3501mbcl/parent/child").await;
    quick_create(&mut client, "3501mbcl/other").await;

    let responses = ok_command!(client, "LIST \"\" *");
    has_line_like(&responses, r#"^\* LIST \(\) "/" INBOX$"#);
    has_line_like(&responses, r#"^\* LIST \(\) "/" 3501mbcl$"#);
    has_line_like(&responses, r#"^\* LIST \(\) "/" 3501mbcl/parent$"#);
    has_line_like(&responses, r#"^\* LIST \(\) "/" 3501mbcl/parent/child$"#);
    has_line_like(&responses, r#"^\* LIST \(\) "/" 3501mbcl/other$"#);
    // Nothing has failed, so there is nothing to recover
    has_no_line_like(&responses, "Recovered");

    let responses = ok_command!(client, "LIST \"\" 3501mbcl/%");
    assert_eq!(3, responses.len(), "{:#?}", responses);
    has_line_like(&responses, r" 3501mbcl/other$");
    has_line_like(&responses, r" 3501mbcl/parent$");

    let responses = ok_command!(client, "LIST 3501mbcl par*");
    assert_eq!(3, responses.len(), "{:#?}", responses);
    has_line_like(&responses, r" 3501mbcl/parent$");
    has_line_like(&responses, r" 3501mbcl/parent/child$");

    let responses = ok_command!(client, "LIST \"\" \"\"");
    has_line_like(&responses, r#"^\* LIST \(\\Noselect\) "/" ""$"#);
}

#[tokio::test]
async fn create_rules() {
    let setup = set_up();
    let mut client = setup.connect("3501mbcr");
    quick_log_in(&mut client).await;

    quick_create(&mut client, "3501mbcr").await;
    let responses = command!(client, "CREATE 3501mbcr");
    assert_tagged_code(&responses, "NO [ALREADYEXISTS]");

    let responses = command!(client, "CREATE inbox");
    assert_tagged_code(&responses, "NO [ALREADYEXISTS]");

    let responses = command!(client, "CREATE \"Recovered Messages\"");
    assert_tagged_code(&responses, "NO [CANNOT]");
    let responses = command!(client, "CREATE \"Recovered Messages/sub\"");
    assert_tagged_code(&responses, "NO [CANNOT]");

    // A trailing delimiter is only a hint that inferiors will follow
    quick_create(&mut client, "3501mbcr2/").await;
    let responses = ok_command!(client, "LIST \"\" 3501mbcr2");
    has_line_like(&responses, r#"^\* LIST \(\) "/" 3501mbcr2$"#);
}

#[tokio::test]
async fn international_names() {
    let setup = set_up();
    let mut client = setup.connect("3501mbin");
    quick_log_in(&mut client).await;

    quick_create(&mut client, "&ZeVnLIqe-").await;
    let responses = ok_command!(client, "LIST \"\" &ZeVnLIqe-");
    has_line_like(&responses, r#"^\* LIST \(\) "/" "&ZeVnLIqe-"$"#);

    let responses =
        ok_command!(client, "STATUS \"&ZeVnLIqe-\" (MESSAGES)");
    has_line_like(&responses, r#"^\* STATUS "&ZeVnLIqe-" \(MESSAGES 0\)$"#);
}

#[tokio::test]
async fn delete_rules() {
    let setup = set_up();
    let mut client = setup.connect("3501mbdr");
    quick_log_in(&mut client).await;

    quick_create(&mut client, "3501mbdr/child").await;
    quick_create(&mut client, "3501mbdr2").await;

    let responses = command!(client, "DELETE INBOX");
    assert_tagged_code(&responses, "NO [CANNOT]");

    let responses = command!(client, "DELETE 3501mbdrX");
    assert_tagged_code(&responses, "NO [NONEXISTENT]");

    ok_command!(client, "DELETE 3501mbdr2");
    let responses = ok_command!(client, "LIST \"\" 3501mbdr2");
    assert_eq!(1, responses.len(), "{:#?}", responses);

    // Deleting a mailbox with inferiors leaves a placeholder
    ok_command!(client, "DELETE 3501mbdr");
    let responses = ok_command!(client, "LIST \"\" 3501mbdr*");
    has_line_like(&responses, r#"^\* LIST \(\\Noselect\) "/" 3501mbdr$"#);
    has_line_like(&responses, r#"^\* LIST \(\) "/" 3501mbdr/child$"#);

    let responses = command!(client, "SELECT 3501mbdr");
    assert_tagged_no(&responses);
}

#[tokio::test]
async fn rename_mailboxes() {
    let setup = set_up();
    let mut client = setup.connect("3501mbrn");
    quick_log_in(&mut client).await;

    quick_create(&mut client, "3501mbrn/sub").await;
    quick_create(&mut client, "3501mbrn-taken").await;
    quick_append_n(&mut client, "3501mbrn", 2).await;

    let responses = command!(client, "RENAME 3501mbrn 3501mbrn-taken");
    assert_tagged_code(&responses, "NO [ALREADYEXISTS]");
    let responses = command!(client, "RENAME 3501mbrnX 3501mbrnY");
    assert_tagged_code(&responses, "NO [NONEXISTENT]");
    let responses = command!(client, "RENAME 3501mbrn 3501mbrn/sub/deeper");
    assert_tagged_code(&responses, "NO [CANNOT]");

    ok_command!(client, "RENAME 3501mbrn 3501mbrn-new/moved");
    let responses = ok_command!(client, "LIST \"\" 3501mbrn*");
    has_line_like(&responses, r#" 3501mbrn-new$"#);
    has_line_like(&responses, r#" 3501mbrn-new/moved$"#);
    has_line_like(&responses, r#" 3501mbrn-new/moved/sub$"#);
    has_no_line_like(&responses, r#" 3501mbrn$"#);
    has_no_line_like(&responses, r#" 3501mbrn/sub$"#);

    let responses =
        ok_command!(client, "STATUS 3501mbrn-new/moved (MESSAGES)");
    has_line_like(&responses, r"\(MESSAGES 2\)$");
}

#[tokio::test]
async fn rename_inbox() {
    let setup = set_up();
    let mut client = setup.connect("3501mbri");
    quick_log_in(&mut client).await;
    quick_append_n(&mut client, "INBOX", 3).await;

    ok_command!(client, "RENAME INBOX 3501mbri");

    let responses = ok_command!(client, "STATUS INBOX (MESSAGES)");
    has_line_like(&responses, r"^\* STATUS INBOX \(MESSAGES 0\)$");
    let responses = ok_command!(client, "STATUS 3501mbri (MESSAGES)");
    has_line_like(&responses, r"^\* STATUS 3501mbri \(MESSAGES 3\)$");

    // INBOX still works normally afterwards
    quick_append_n(&mut client, "INBOX", 1).await;
    let responses = ok_command!(client, "STATUS INBOX (MESSAGES)");
    has_line_like(&responses, r"\(MESSAGES 1\)$");
}

#[tokio::test]
async fn status_items() {
    let setup = set_up();
    let mut client = setup.connect("3501mbst");
    quick_log_in(&mut client).await;
    quick_create(&mut client, "3501mbst").await;
    quick_append_n(&mut client, "3501mbst", 3).await;

    let responses = ok_command!(
        client,
        "STATUS 3501mbst (MESSAGES RECENT UIDNEXT UIDVALIDITY UNSEEN)"
    );
    has_line_like(
        &responses,
        "^\\* STATUS 3501mbst \\(MESSAGES 3 RECENT 3 UIDNEXT 4 \
         UIDVALIDITY [0-9]+ UNSEEN 3\\)$",
    );

    let responses = command!(client, "STATUS 3501mbstX (MESSAGES)");
    assert_tagged_code(&responses, "NO [NONEXISTENT]");
}

#[tokio::test]
async fn subscriptions() {
    let setup = set_up();
    let mut client = setup.connect("3501mbsu");
    quick_log_in(&mut client).await;

    quick_create(&mut client, "3501mbsu/a").await;
    quick_create(&mut client, "3501mbsu/b").await;

    let responses = ok_command!(client, "LSUB \"\" *");
    has_line_like(&responses, r#"^\* LSUB \(\) "/" INBOX$"#);
    has_no_line_like(&responses, "3501mbsu");

    ok_command!(client, "SUBSCRIBE 3501mbsu/a");
    // Subscribing to something that does not exist is allowed
    ok_command!(client, "SUBSCRIBE 3501mbsu-ghost");

    let responses = ok_command!(client, "LSUB \"\" 3501mbsu*");
    has_line_like(&responses, r#"^\* LSUB \(\) "/" 3501mbsu/a$"#);
    has_line_like(&responses, r#"^\* LSUB \(\) "/" 3501mbsu-ghost$"#);
    has_no_line_like(&responses, r" 3501mbsu/b$");

    // The unsubscribed parent appears because `%` cannot see the child
    let responses = ok_command!(client, "LSUB \"\" %");
    has_line_like(&responses, r#"^\* LSUB \(\\Noselect\) "/" 3501mbsu$"#);

    ok_command!(client, "UNSUBSCRIBE 3501mbsu/a");
    ok_command!(client, "UNSUBSCRIBE 3501mbsu/a");
    let responses = ok_command!(client, "LSUB \"\" 3501mbsu/*");
    assert_eq!(1, responses.len(), "{:#?}", responses);
}
