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

use serde::{Deserialize, Serialize};

use crate::account::model::Uid;
use crate::support::error::Error;

/// Numeric caps enforced whenever the account layer writes state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ImapLimits {
    /// The most mailboxes one user may have, including INBOX.
    pub max_mailboxes: usize,
    /// The most messages one mailbox may hold.
    pub max_messages_per_mailbox: usize,
    /// The largest UID a mailbox may assign.
    pub max_uid: u32,
    /// The largest `UIDVALIDITY` a mailbox may be created with.
    pub max_uid_validity: u32,
}

impl Default for ImapLimits {
    fn default() -> Self {
        ImapLimits {
            max_mailboxes: 10_000,
            max_messages_per_mailbox: 1_000_000,
            max_uid: u32::MAX,
            max_uid_validity: u32::MAX,
        }
    }
}

impl ImapLimits {
    pub fn check_mailbox_count(&self, existing: usize) -> Result<(), Error> {
        if existing >= self.max_mailboxes {
            Err(Error::TooManyMailboxes)
        } else {
            Ok(())
        }
    }

    /// Check that a mailbox currently holding `existing` messages can take
    /// `adding` more.
    pub fn check_message_count(
        &self,
        existing: usize,
        adding: usize,
    ) -> Result<(), Error> {
        if existing.saturating_add(adding) > self.max_messages_per_mailbox {
            Err(Error::MailboxFull)
        } else {
            Ok(())
        }
    }

    /// Check that UIDs from `next` through `next + adding - 1` are all
    /// allocatable.
    pub fn check_uids(&self, next: Uid, adding: usize) -> Result<(), Error> {
        if 0 == adding {
            return Ok(());
        }

        let last = u64::from(u32::from(next)) + adding as u64 - 1;
        if last > u64::from(self.max_uid) {
            Err(Error::UidSpaceExhausted)
        } else {
            Ok(())
        }
    }

    pub fn check_uid_validity(&self, uid_validity: u32) -> Result<(), Error> {
        if uid_validity > self.max_uid_validity {
            Err(Error::UidValidityExhausted)
        } else {
            Ok(())
        }
    }
}
