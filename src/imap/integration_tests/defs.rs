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

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
    BufReader, DuplexStream,
};
use tokio::sync::mpsc;

use crate::imap::server::Server;
use crate::remote::test_adapter::{TestAdapter, TEST_PASSWORD};
use crate::remote::update::RemoteUpdate;
use crate::support::reporter::RecordingReporter;
use crate::support::system_config::SystemConfig;
use crate::support::uid_validity::IncrementalUidValidityGenerator;

pub const USER: &str = "azure";

/// How long to wait for any single line before deciding the server hung.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Setup {
    pub server: Server,
    pub adapter: Arc<TestAdapter>,
    pub updates: mpsc::Sender<RemoteUpdate>,
    pub reporter: Arc<RecordingReporter>,
}

pub fn set_up() -> Setup {
    set_up_with_config(SystemConfig::default())
}

/// Must be called from within the test's tokio runtime.
pub fn set_up_with_config(config: SystemConfig) -> Setup {
    crate::init_test_log();

    let reporter = Arc::new(RecordingReporter::default());
    let server = Server::new(config)
        .unwrap()
        .with_reporter(reporter.clone())
        .with_uid_validity_generator(Arc::new(
            IncrementalUidValidityGenerator::new(),
        ));

    let adapter = TestAdapter::new();
    let (updates, rx) = mpsc::channel(16);
    server.add_user(USER, adapter.clone(), rx).unwrap();

    Setup {
        server,
        adapter,
        updates,
        reporter,
    }
}

impl Setup {
    pub fn connect(&self, name: &'static str) -> TestClient<DuplexStream> {
        let (client, server_io) = tokio::io::duplex(1 << 20);
        let server = self.server.clone();
        tokio::spawn(async move {
            // Errors are the client going away mid-command, which several
            // tests do on purpose.
            let _ = server.serve(server_io, name).await;
        });

        TestClient::new(client)
    }
}

pub struct TestClient<S> {
    io: BufReader<S>,
    next_tag: u32,
}

impl<S: AsyncRead + AsyncWrite + Unpin> TestClient<S> {
    pub fn new(io: S) -> Self {
        TestClient {
            io: BufReader::new(io),
            next_tag: 1,
        }
    }

    pub fn into_inner(self) -> S {
        self.io.into_inner()
    }

    pub async fn write_raw(&mut self, data: &[u8]) {
        self.io.get_mut().write_all(data).await.unwrap();
        self.io.get_mut().flush().await.unwrap();
    }

    fn tag(&mut self) -> String {
        let tag = format!("t{}", self.next_tag);
        self.next_tag += 1;
        tag
    }

    /// Read one response line, following any literals it contains. The final
    /// CRLF is removed; line breaks inside literals are kept.
    pub async fn read_logical_line(&mut self) -> String {
        tokio::time::timeout(READ_TIMEOUT, self.read_logical_line_inner())
            .await
            .expect("Timed out waiting for a response line")
    }

    async fn read_logical_line_inner(&mut self) -> String {
        lazy_static::lazy_static! {
            static ref LITERAL: regex::bytes::Regex =
                regex::bytes::Regex::new(r"\{([0-9]+)\}\r\n$").unwrap();
        }

        let mut line = Vec::new();
        loop {
            let start = line.len();
            let nread = self.io.read_until(b'\n', &mut line).await.unwrap();
            assert!(nread > 0, "Unexpected EOF from server");

            let len = LITERAL.captures(&line[start..]).map(|c| {
                std::str::from_utf8(&c[1]).unwrap().parse::<usize>().unwrap()
            });
            match len {
                Some(len) => {
                    let start = line.len();
                    line.resize(start + len, 0);
                    self.io.read_exact(&mut line[start..]).await.unwrap();
                }
                None => break,
            }
        }

        assert!(line.ends_with(b"\r\n"), "Bad line ending: {:?}", line);
        line.truncate(line.len() - 2);
        String::from_utf8_lossy(&line).into_owned()
    }

    /// Read lines until the one tagged with `tag`, which is returned last.
    pub async fn read_until_tagged(&mut self, tag: &str) -> Vec<String> {
        let prefix = format!("{} ", tag);
        let mut lines = Vec::new();
        loop {
            let line = self.read_logical_line().await;
            let done = line.starts_with(&prefix);
            lines.push(line);
            if done {
                return lines;
            }
        }
    }

    pub async fn command(&mut self, command: &str) -> Vec<String> {
        let tag = self.tag();
        self.write_raw(format!("{} {}\r\n", tag, command).as_bytes())
            .await;
        self.read_until_tagged(&tag).await
    }

    /// Run a command that ends with a synchronising literal, waiting for the
    /// continuation before sending it.
    pub async fn command_with_literal(
        &mut self,
        before: &str,
        literal: &[u8],
    ) -> Vec<String> {
        let tag = self.tag();
        self.write_raw(
            format!("{} {} {{{}}}\r\n", tag, before, literal.len()).as_bytes(),
        )
        .await;

        let continuation = self.read_logical_line().await;
        if !continuation.starts_with("+ ") {
            // The server refused the literal outright.
            return vec![continuation];
        }

        self.write_raw(literal).await;
        self.write_raw(b"\r\n").await;
        self.read_until_tagged(&tag).await
    }
}

pub async fn skip_greeting<S: AsyncRead + AsyncWrite + Unpin>(
    client: &mut TestClient<S>,
) {
    let greeting = client.read_logical_line().await;
    assert!(greeting.starts_with("* OK "), "Bad greeting: {}", greeting);
}

pub async fn quick_log_in<S: AsyncRead + AsyncWrite + Unpin>(
    client: &mut TestClient<S>,
) {
    skip_greeting(client).await;
    ok_command!(client, "LOGIN {} {}", USER, TEST_PASSWORD);
}

pub async fn quick_create<S: AsyncRead + AsyncWrite + Unpin>(
    client: &mut TestClient<S>,
    mailbox: &str,
) {
    ok_command!(client, "CREATE {}", mailbox);
}

pub async fn quick_select<S: AsyncRead + AsyncWrite + Unpin>(
    client: &mut TestClient<S>,
    mailbox: &str,
) -> Vec<String> {
    ok_command!(client, "SELECT {}", mailbox)
}

pub async fn quick_append<S: AsyncRead + AsyncWrite + Unpin>(
    client: &mut TestClient<S>,
    mailbox: &str,
    literal: &[u8],
) {
    let responses = client
        .command_with_literal(&format!("APPEND {}", mailbox), literal)
        .await;
    assert_tagged_ok_any(&responses);
}

/// Append `n` small distinct messages to `mailbox`.
pub async fn quick_append_n<S: AsyncRead + AsyncWrite + Unpin>(
    client: &mut TestClient<S>,
    mailbox: &str,
    n: u32,
) {
    for i in 1..=n {
        quick_append(client, mailbox, &sample_message(i)).await;
    }
}

pub fn sample_message(i: u32) -> Vec<u8> {
    format!(
        "From: sender{i}@example.com\r\n\
         To: azure@example.com\r\n\
         Subject: Message {i}\r\n\
         Message-ID: <{i}@example.com>\r\n\
         \r\n\
         This is message number {i}.\r\n",
        i = i,
    )
    .into_bytes()
}

fn tagged_line(responses: &[String]) -> &str {
    responses
        .last()
        .map(String::as_str)
        .expect("No responses at all")
}

fn assert_tagged(responses: &[String], pattern: &str) {
    let line = tagged_line(responses);
    assert!(
        Regex::new(pattern).unwrap().is_match(line),
        "Expected tagged response like {:?}, got {:?}\nAll responses: {:#?}",
        pattern,
        line,
        responses
    );
}

/// The tagged response is `OK` without a response code.
pub fn assert_tagged_ok(responses: &[String]) {
    assert_tagged(responses, r"^t[0-9]+ OK [^\[]");
}

/// The tagged response is `OK`, with or without a response code.
pub fn assert_tagged_ok_any(responses: &[String]) {
    assert_tagged(responses, r"^t[0-9]+ OK\b");
}

pub fn assert_tagged_no(responses: &[String]) {
    assert_tagged(responses, r"^t[0-9]+ NO\b");
}

pub fn assert_tagged_bad(responses: &[String]) {
    assert_tagged(responses, r"^t[0-9]+ BAD\b");
}

/// Assert that the tagged response starts with the given condition and
/// code, e.g. `"NO [TRYCREATE]"`.
pub fn assert_tagged_code(responses: &[String], cond_and_code: &str) {
    let line = tagged_line(responses);
    let rest = line.split_once(' ').map_or("", |(_, rest)| rest);
    assert!(
        rest.starts_with(cond_and_code),
        "Expected tagged {:?}, got {:?}\nAll responses: {:#?}",
        cond_and_code,
        line,
        responses
    );
}

/// Return the first line matching `pattern`, failing if there is none.
pub fn has_line_like<'a>(responses: &'a [String], pattern: &str) -> &'a str {
    let re = Regex::new(pattern).unwrap();
    responses
        .iter()
        .find(|l| re.is_match(l))
        .map(String::as_str)
        .unwrap_or_else(|| {
            panic!("No line like {:?} in {:#?}", pattern, responses)
        })
}

pub fn has_no_line_like(responses: &[String], pattern: &str) {
    let re = Regex::new(pattern).unwrap();
    if let Some(line) = responses.iter().find(|l| re.is_match(l)) {
        panic!("Unexpected line {:?} in {:#?}", line, responses);
    }
}

/// Count the lines matching `pattern`.
pub fn count_lines_like(responses: &[String], pattern: &str) -> usize {
    let re = Regex::new(pattern).unwrap();
    responses.iter().filter(|l| re.is_match(l)).count()
}

/// Repeat `NOOP` until some response matches `pattern`, for changes made
/// asynchronously through the update channel.
pub async fn noop_until<S: AsyncRead + AsyncWrite + Unpin>(
    client: &mut TestClient<S>,
    pattern: &str,
) -> Vec<String> {
    let re = Regex::new(pattern).unwrap();
    for _ in 0..100 {
        let responses = ok_command!(client, "NOOP");
        if responses.iter().any(|l| re.is_match(l)) {
            return responses;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    panic!("Never saw a line like {:?}", pattern);
}

pub async fn test_require_capability(capability: &str) {
    let setup = set_up();
    let mut client = setup.connect("capability");
    skip_greeting(&mut client).await;

    let responses = ok_command!(client, "CAPABILITY");
    let caps = has_line_like(&responses, "^\\* CAPABILITY ");
    assert!(
        caps.split(' ').any(|c| c == capability),
        "{} not in {}",
        capability,
        caps
    );
}
