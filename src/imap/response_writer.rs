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

use std::io;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::lex::LexWriter;
use super::response::ResponseLine;

/// An event to be sent to the client.
#[derive(Debug)]
pub enum OutputEvent {
    /// A full response line.
    ResponseLine {
        /// The content to write.
        line: ResponseLine<'static>,
        /// Any special handling for this line.
        ctl: OutputControl,
    },
    /// A continuation line (i.e. "+ {message}\r\n").
    ContinuationLine {
        /// The prompt to send.
        prompt: &'static str,
    },
    /// Flush the buffers immediately if non-empty.
    Flush,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputControl {
    /// No special handling. Written responses may continue to be buffered.
    Buffer,
    /// Flush all internal buffers after writing this response.
    Flush,
    /// Flush all internal buffers and disconnect immediately after writing
    /// this response.
    Disconnect,
}

/// The reason `write_responses` terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputDisconnect {
    /// The disconnect was initiated by `OutputControl::Disconnect`.
    ByControl,
    /// The `OutputEvent` receiver was closed.
    InputClosed,
}

/// Actor for writing responses to the client.
///
/// The actor runs until one of the following:
/// - An error occurs.
/// - `outputs` is disconnected. The writer is handed back, flushed but still
///   open, so the connection can be reused (e.g. by `STARTTLS`).
/// - `OutputControl::Disconnect` is processed. The writer is shut down.
pub async fn write_responses<W: AsyncWrite + Unpin>(
    mut io: W,
    mut outputs: mpsc::Receiver<OutputEvent>,
) -> io::Result<(W, OutputDisconnect)> {
    let mut state = State::new();
    while let Some(evt) = outputs.recv().await {
        // Reset last_flush if there's not actually anything pending.
        if state.text.is_empty() {
            state.last_flush = Instant::now();
        }

        let ctl = match evt {
            OutputEvent::ResponseLine { line, ctl } => {
                let mut w = LexWriter::new(&mut state.text);
                line.write_to(&mut w)?;
                state.text.extend_from_slice(b"\r\n");
                ctl
            }

            OutputEvent::ContinuationLine { prompt } => {
                state.text.extend_from_slice(b"+ ");
                state.text.extend_from_slice(prompt.as_bytes());
                state.text.extend_from_slice(b"\r\n");
                OutputControl::Flush
            }

            OutputEvent::Flush => OutputControl::Flush,
        };

        match ctl {
            OutputControl::Buffer => {
                // Since the client can request commands that take a long time
                // but produce little output, force a flush implicitly if
                // we've had data sitting around for a while.
                if state.text.len() >= TEXT_FLUSH_THRESH
                    || state.last_flush.elapsed() >= Duration::from_secs(3)
                {
                    state.flush(&mut io).await?;
                }
            }

            OutputControl::Flush => state.flush(&mut io).await?,

            OutputControl::Disconnect => {
                state.flush(&mut io).await?;
                io.shutdown().await?;
                return Ok((io, OutputDisconnect::ByControl));
            }
        }
    }

    state.flush(&mut io).await?;
    Ok((io, OutputDisconnect::InputClosed))
}

const TEXT_FLUSH_THRESH: usize = 4096;

struct State {
    text: Vec<u8>,
    /// The last time a flush was completed.
    last_flush: Instant,
}

impl State {
    fn new() -> Self {
        Self {
            text: Vec::with_capacity(TEXT_FLUSH_THRESH * 5 / 4),
            last_flush: Instant::now(),
        }
    }

    async fn flush<W: AsyncWrite + Unpin>(
        &mut self,
        io: &mut W,
    ) -> io::Result<()> {
        if !self.text.is_empty() {
            io.write_all(&self.text).await?;
            self.text.clear();
        }
        io.flush().await?;
        self.last_flush = Instant::now();
        Ok(())
    }
}
