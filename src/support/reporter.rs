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

//! The error telemetry sink.

use log::{error, warn};

/// Receives reports of unexpected conditions.
///
/// Implementations must not block for long; they are called from within
/// session tasks.
pub trait Reporter: Send + Sync {
    /// Report an unexpected internal error.
    ///
    /// `command` is the sanitised command line that triggered it, if any.
    fn report_error(&self, message: &str, command: Option<&str>);

    /// Report a noteworthy but non-fatal event.
    fn report_message(&self, message: &str);
}

/// The default `Reporter`, which just writes everything to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report_error(&self, message: &str, command: Option<&str>) {
        match command {
            Some(command) => error!("{} (command: {})", message, command),
            None => error!("{}", message),
        }
    }

    fn report_message(&self, message: &str) {
        warn!("{}", message);
    }
}

#[cfg(test)]
pub use self::test_support::RecordingReporter;
