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

//! The public face of the gateway: user management and the per-connection
//! driver.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, info, trace, warn};
use openssl::ssl::{Ssl, SslAcceptor};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_openssl::SslStream;

use super::command as c;
use super::command_processor::{CommandProcessor, UserDirectory};
use super::request_reader::{Request, RequestReader};
use super::response as r;
use super::response_writer::{write_responses, OutputControl, OutputEvent};
use crate::account::user::User;
use crate::remote::adapter::RemoteAdapter;
use crate::remote::update::RemoteUpdate;
use crate::support::{
    error::Error,
    file_ops::{self, IgnoreKinds},
    log_prefix::LogPrefix,
    reporter::{LogReporter, Reporter},
    system_config::SystemConfig,
    uid_validity::{EpochUidValidityGenerator, UidValidityGenerator},
    user_name::check_user_name,
};

/// How many output events may be queued before the session blocks on the
/// writer.
const OUTPUT_QUEUE: usize = 64;

/// An embedded IMAP server.
///
/// Cloning a `Server` produces another handle to the same users and
/// configuration. The host accepts connections however it likes and hands
/// each stream to `serve` or `serve_tls`.
#[derive(Clone)]
pub struct Server {
    config: Arc<SystemConfig>,
    users: UserDirectory,
    reporter: Arc<dyn Reporter>,
    uid_validity: Arc<dyn UidValidityGenerator>,
    ssl_acceptor: Option<Arc<SslAcceptor>>,
    next_session: Arc<AtomicU64>,
}

impl Server {
    /// Set up a server from `config`.
    ///
    /// This loads the TLS material, if any, and purges users removed by a
    /// previous process.
    pub fn new(config: SystemConfig) -> Result<Self, Error> {
        let ssl_acceptor = match config.tls {
            Some(ref tls) => Some(Arc::new(tls.acceptor()?)),
            None => None,
        };

        if let Some(garbage) = config.deferred_delete_dir() {
            file_ops::purge_garbage(garbage);
        }

        Ok(Server {
            config: Arc::new(config),
            users: Arc::new(RwLock::new(HashMap::new())),
            reporter: Arc::new(LogReporter),
            uid_validity: Arc::new(EpochUidValidityGenerator::new()),
            ssl_acceptor,
            next_session: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Replace the telemetry sink. Only users added afterwards use it for
    /// their own reports.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace the `UIDVALIDITY` source for users added afterwards.
    pub fn with_uid_validity_generator(
        mut self,
        uid_validity: Arc<dyn UidValidityGenerator>,
    ) -> Self {
        self.uid_validity = uid_validity;
        self
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Make `name` available for login.
    ///
    /// `updates` is the channel through which the host reports changes made
    /// on the remote side. Adding a name that is already present replaces
    /// the old user, whose sessions are disconnected.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_user(
        &self,
        name: &str,
        adapter: Arc<dyn RemoteAdapter>,
        updates: mpsc::Receiver<RemoteUpdate>,
    ) -> Result<(), Error> {
        if let Err(problem) = check_user_name(name) {
            warn!("Refusing to add user {:?}: {}", name, problem);
            return Err(Error::UnsafeName);
        }

        let user = User::start(
            name.to_owned(),
            adapter,
            updates,
            Arc::clone(&self.config),
            Arc::clone(&self.uid_validity),
            Arc::clone(&self.reporter),
        )?;

        let old = self.write_users().insert(name.to_owned(), user);
        if let Some(old) = old {
            warn!("Replacing existing user {}", name);
            old.shut_down();
        }

        info!("Added user {}", name);
        Ok(())
    }

    /// Remove `name`, disconnecting its sessions.
    ///
    /// Stored literals are moved into the deferred deletion area and purged
    /// by the next `Server::new`.
    pub fn remove_user(&self, name: &str) -> Result<(), Error> {
        let user = self.write_users().remove(name).ok_or(Error::NxUser)?;
        user.shut_down();

        if let (Some(data_dir), Some(garbage)) =
            (self.config.data_dir.as_ref(), self.config.deferred_delete_dir())
        {
            file_ops::defer_delete(data_dir.join(name), garbage)
                .ignore_not_found()?;
        }

        info!("Removed user {}", name);
        Ok(())
    }

    /// Stop draining the user's update channel and tell the adapter to
    /// pause.
    pub async fn pause_user(&self, name: &str) -> Result<(), Error> {
        self.user(name)?.pause().await;
        Ok(())
    }

    pub async fn resume_user(&self, name: &str) -> Result<(), Error> {
        self.user(name)?.resume().await;
        Ok(())
    }

    /// Serve one plaintext connection until the client logs out or goes
    /// away. `peer` is used only for logging.
    pub async fn serve<S>(&self, io: S, peer: &str) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let log_prefix = LogPrefix::new("imap", peer);
        info!("{} Connection established", log_prefix);

        let max_literal_size = self.config.max_literal_size;
        let mut processor = self.processor(log_prefix.clone(), false);
        let result: Result<(), Error> = async {
            let session = run_session(&mut processor, io, max_literal_size, true);
            let Some(io) = session.await? else {
                return Ok(());
            };

            // The processor only agrees to STARTTLS when TLS is configured.
            let Some(ref acceptor) = self.ssl_acceptor else {
                return Ok(());
            };

            info!("{} Start TLS handshake", log_prefix);
            let io = ssl_accept(acceptor, io).await?;
            info!("{} TLS handshake completed", log_prefix);
            processor.tls_started();

            // A second STARTTLS is always refused, so this cannot hand the
            // stream back again.
            run_session(&mut processor, io, max_literal_size, false).await?;
            Ok(())
        }
        .await;

        log_disconnect(&log_prefix, &result);
        result
    }

    /// Serve one connection with implicit TLS.
    pub async fn serve_tls<S>(&self, io: S, peer: &str) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let log_prefix = LogPrefix::new("imaps", peer);
        let acceptor = self.ssl_acceptor.as_ref().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "TLS is not configured",
            ))
        })?;

        let io = match ssl_accept(acceptor, io).await {
            Ok(io) => io,
            Err(e) => {
                warn!("{} SSL handshake failed: {}", log_prefix, e);
                return Err(e);
            }
        };
        info!("{} Connection established", log_prefix);

        let mut processor = self.processor(log_prefix.clone(), true);
        let result = run_session(
            &mut processor,
            io,
            self.config.max_literal_size,
            true,
        )
        .await
        .map(|_| ());
        log_disconnect(&log_prefix, &result);
        result
    }

    fn processor(
        &self,
        log_prefix: LogPrefix,
        tls_active: bool,
    ) -> CommandProcessor {
        CommandProcessor::new(
            log_prefix,
            Arc::clone(&self.config),
            Arc::clone(&self.users),
            Arc::clone(&self.reporter),
            self.next_session.fetch_add(1, Ordering::Relaxed),
            tls_active,
        )
    }

    fn user(&self, name: &str) -> Result<Arc<User>, Error> {
        self.users
            .read()
            .map_err(|_| Error::NxUser)?
            .get(name)
            .cloned()
            .ok_or(Error::NxUser)
    }

    fn write_users(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<User>>> {
        // Nothing holding this lock can panic midway through an update.
        match self.users.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn log_disconnect(log_prefix: &LogPrefix, result: &Result<(), Error>) {
    match *result {
        Ok(()) => info!("{} Normal client disconnect", log_prefix),
        Err(ref e) => warn!("{} Abnormal client disconnect: {}", log_prefix, e),
    }
}

async fn ssl_accept<S>(
    acceptor: &SslAcceptor,
    io: S,
) -> Result<SslStream<S>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ssl = Ssl::new(acceptor.context())?;
    let mut stream = SslStream::new(ssl, io)?;
    Pin::new(&mut stream).accept().await.map_err(|e| {
        Error::Io(
            e.into_io_error().unwrap_or_else(|e| {
                io::Error::new(io::ErrorKind::Other, e.to_string())
            }),
        )
    })?;
    Ok(stream)
}

/// Drive `processor` over `io` until the session ends.
///
/// Returns the stream, with every buffer drained, if the client asked for
/// and was granted `STARTTLS`.
async fn run_session<S>(
    processor: &mut CommandProcessor,
    io: S,
    max_literal_size: u32,
    greet: bool,
) -> Result<Option<S>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read, write) = tokio::io::split(io);
    let (sender, outputs) = mpsc::channel(OUTPUT_QUEUE);
    let writer = tokio::spawn(write_responses(write, outputs));

    let mut reader = RequestReader::new(read, max_literal_size);

    if greet {
        let _ = sender
            .send(OutputEvent::ResponseLine {
                line: processor.greet(),
                ctl: OutputControl::Flush,
            })
            .await;
    }

    let result = command_loop(processor, &mut reader, &sender).await;
    drop(sender);

    let written = writer
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()));
    let starttls = result?;
    let (write, _) = written??;

    if !starttls {
        return Ok(None);
    }

    // Anything the client sent after STARTTLS was sent in the clear and
    // must not be processed as if it were protected.
    if reader.has_buffered_input() {
        warn!(
            "{} Client pipelined data after STARTTLS; disconnecting",
            processor.log_prefix()
        );
        return Ok(None);
    }

    Ok(Some(reader.into_inner().unsplit(write)))
}

/// Read and execute commands until the session ends.
///
/// Returns whether the loop stopped to begin a TLS handshake.
async fn command_loop<R>(
    processor: &mut CommandProcessor,
    reader: &mut RequestReader<R>,
    sender: &mpsc::Sender<OutputEvent>,
) -> Result<bool, Error>
where
    R: AsyncRead + Unpin,
{
    loop {
        reader.reset_raw();
        let request = match reader.read_command(sender).await {
            Ok(request) => request,
            Err(e) if io::ErrorKind::UnexpectedEof == e.kind() => {
                return Ok(false)
            }
            Err(e) => return Err(e.into()),
        };

        let mut starttls = false;
        let line = match request {
            Request::OutputDisconnected => return Ok(false),
            Request::TooLong(tag) => reject(tag, "Command line too long"),
            Request::LiteralRefused(tag) => reject(tag, "Literal too large"),
            Request::Command(raw) => {
                let sanitised = c::sanitise(&raw);
                trace!("{} >> {}", processor.log_prefix(), sanitised);
                processor.set_command_line(sanitised);

                match c::CommandLine::parse(&raw) {
                    Err(e) => {
                        debug!(
                            "{} Parse error at offset {} of {} bytes: \
                             expected {}",
                            processor.log_prefix(),
                            e.offset,
                            reader.raw().len(),
                            e.expected,
                        );
                        r::ResponseLine {
                            tag: e.tag.map(Cow::Owned),
                            response: r::Response::bad(
                                Some(r::RespTextCode::Parse),
                                "Unrecognised command syntax",
                            ),
                        }
                    }

                    Ok(command_line) => {
                        if matches!(command_line.cmd, c::Command::Idle) {
                            let tag = command_line.tag.into_owned();
                            processor.cmd_idle(tag, reader, sender).await?
                        } else {
                            let is_starttls = matches!(
                                command_line.cmd,
                                c::Command::StartTls
                            );
                            let line = processor
                                .handle_command(command_line, sender)
                                .await;
                            starttls = is_starttls
                                && Some(r::RespCondType::Ok)
                                    == line.response.cond_type();
                            line
                        }
                    }
                }
            }
        };

        let bye = line.tag.is_none()
            && Some(r::RespCondType::Bye) == line.response.cond_type();
        let disconnect = bye || processor.logged_out();
        let ctl = if disconnect {
            OutputControl::Disconnect
        } else {
            OutputControl::Flush
        };

        if sender
            .send(OutputEvent::ResponseLine { line, ctl })
            .await
            .is_err()
            || disconnect
        {
            return Ok(false);
        }

        if starttls {
            return Ok(true);
        }
    }
}

/// Answer a command the reader had to discard.
fn reject(tag: Option<String>, quip: &'static str) -> r::ResponseLine<'static> {
    r::ResponseLine {
        tag: tag.map(Cow::Owned),
        response: r::Response::bad(Some(r::RespTextCode::Limit), quip),
    }
}
