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

//! The integration tests are near "full-stack" tests which run the actual
//! server code, without test-specific modifications and with as little
//! "reaching under the covers" as possible.
//!
//! Every test builds its own `Server` with a single user, `azure`, backed by
//! an in-memory `TestAdapter`. Each "connection" is a `tokio::io::duplex`
//! pipe whose server end is driven by a spawned `Server::serve` task, which
//! presents a reasonable approximation of a real network connection without
//! the tests needing to worry about port numbers and such.
//!
//! The client side speaks raw protocol text. Responses are checked with
//! regular expressions, one logical line (literals included) at a time.

/// Run a command built with `format!` and return every response line, the
/// tagged one last.
macro_rules! command {
    ($client:expr, $($fmt:tt)*) => {
        $client.command(&format!($($fmt)*)).await
    };
}

/// Like `command!`, but assert that the tagged response is `OK`, with or
/// without a response code.
macro_rules! ok_command {
    ($client:expr, $($fmt:tt)*) => {{
        let responses = command!($client, $($fmt)*);
        assert_tagged_ok_any(&responses);
        responses
    }};
}

mod defs;

mod multi_session;
mod recovery;
mod rfc2177;
mod rfc2971;
mod rfc3501;
mod rfc6851;
mod starttls;
