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

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::prelude::*;

use crate::support::error::Error;

/// Produces `UIDVALIDITY` values for newly created mailboxes.
///
/// Every value returned must be strictly greater than every value previously
/// returned by the same generator.
pub trait UidValidityGenerator: Send + Sync {
    fn generate(&self) -> Result<u32, Error>;
}

/// Derives `UIDVALIDITY` from the current time in seconds, bumping past the
/// last value if the clock has not advanced (or went backwards).
#[derive(Debug, Default)]
pub struct EpochUidValidityGenerator {
    last: AtomicU32,
}

impl EpochUidValidityGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UidValidityGenerator for EpochUidValidityGenerator {
    fn generate(&self) -> Result<u32, Error> {
        let now = u32::try_from(Utc::now().timestamp().max(1))
            .map_err(|_| Error::UidValidityExhausted)?;
        bump(&self.last, |last| {
            if now > last {
                Some(now)
            } else {
                last.checked_add(1)
            }
        })
    }
}

/// Hands out 1, 2, 3, ...
///
/// Mostly useful for tests and for hosts that persist the counter elsewhere.
#[derive(Debug, Default)]
pub struct IncrementalUidValidityGenerator {
    last: AtomicU32,
}

impl IncrementalUidValidityGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a generator whose next value is `last + 1`.
    pub fn starting_after(last: u32) -> Self {
        Self {
            last: AtomicU32::new(last),
        }
    }
}

impl UidValidityGenerator for IncrementalUidValidityGenerator {
    fn generate(&self) -> Result<u32, Error> {
        bump(&self.last, |last| last.checked_add(1))
    }
}

fn bump(
    cell: &AtomicU32,
    next: impl Fn(u32) -> Option<u32>,
) -> Result<u32, Error> {
    let mut last = cell.load(Ordering::SeqCst);
    loop {
        let value = next(last).ok_or(Error::UidValidityExhausted)?;
        match cell.compare_exchange(
            last,
            value,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => return Ok(value),
            Err(actual) => last = actual,
        }
    }
}
