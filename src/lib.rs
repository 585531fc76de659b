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

//! An embeddable IMAP4rev1 server which fronts a remote mail store.
//!
//! The host supplies a `RemoteAdapter` per user and pushes `RemoteUpdate`s
//! describing changes made on the remote side; the gateway keeps the local
//! view that IMAP needs (UIDs, sequence numbers, `\Recent`, deletion
//! semantics) and serves clients over any async byte stream.

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

pub mod account;
pub mod imap;
pub mod mime;
pub mod remote;
pub mod support;

pub use crate::imap::server::Server;
pub use crate::remote::adapter::{
    AdapterError, RemoteAdapter, RemoteLabel, RemoteMessage,
};
pub use crate::remote::context::{ImapId, RequestContext};
pub use crate::remote::update::{BusEvent, RemoteUpdate};
pub use crate::support::error::Error;
pub use crate::support::reporter::{LogReporter, Reporter};
pub use crate::support::system_config::{SystemConfig, TlsConfig};
pub use crate::support::uid_validity::{
    EpochUidValidityGenerator, IncrementalUidValidityGenerator,
    UidValidityGenerator,
};

#[cfg(test)]
static INIT_TEST_LOG: std::sync::Once = std::sync::Once::new();

#[cfg(test)]
fn init_test_log() {
    INIT_TEST_LOG.call_once(|| {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{} [{}][{}] {}",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    message,
                ))
            })
            .level(log::LevelFilter::Debug)
            .chain(std::io::stderr())
            .apply()
            .unwrap();
    })
}
