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

use super::adapter::RemoteMessage;
use crate::account::model::{FlagSet, RemoteMailboxId, RemoteMessageId};

/// A change made on the remote side, pushed by the host into the channel
/// given to `Server::add_user`.
///
/// Updates are resolved against local state when the update bus applies
/// them, so they may refer to labels and messages created by earlier updates
/// in the same channel.
#[derive(Clone, Debug)]
pub enum RemoteUpdate {
    MailboxCreated {
        id: RemoteMailboxId,
        path: Vec<String>,
    },
    MailboxUpdated {
        id: RemoteMailboxId,
        path: Vec<String>,
    },
    MailboxDeleted {
        id: RemoteMailboxId,
    },
    /// New messages, each placed in the labels listed on the message.
    MessagesCreated(Vec<(RemoteMessage, Vec<u8>)>),
    /// Replace both the flags and the label set of a message.
    MessageUpdated(RemoteMessage),
    MessageMailboxesUpdated {
        id: RemoteMessageId,
        mailboxes: Vec<RemoteMailboxId>,
    },
    MessageFlagsUpdated {
        id: RemoteMessageId,
        flags: FlagSet,
    },
    MessagesDeleted(Vec<RemoteMessageId>),
}

/// What the update bus reports to the adapter's outbound sink once an update
/// has been applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    MailboxCreated {
        name: String,
    },
    MailboxRenamed {
        from: String,
        to: String,
    },
    MailboxDeleted {
        name: String,
    },
    MessagesAdded {
        mailbox: String,
        count: usize,
    },
    MessagesRemoved {
        mailbox: String,
        count: usize,
    },
    FlagsChanged {
        remote: Option<RemoteMessageId>,
        flags: FlagSet,
    },
    MessagesDeleted {
        count: usize,
    },
}
