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

use async_trait::async_trait;
use chrono::prelude::*;
use thiserror::Error;

use super::context::RequestContext;
use super::update::BusEvent;
use crate::account::model::{FlagSet, RemoteMailboxId, RemoteMessageId};

/// Failures reported by a `RemoteAdapter`.
///
/// The gateway never retries on its own; backoff is the adapter's business.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Not found on remote store")]
    NotFound,
    #[error("Rejected by remote store: {0}")]
    Rejected(String),
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

/// A mailbox as the remote store knows it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteLabel {
    pub id: RemoteMailboxId,
    /// The hierarchical name, one element per level.
    pub path: Vec<String>,
}

/// A message as the remote store knows it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteMessage {
    pub id: RemoteMessageId,
    /// The labels the message currently carries.
    pub mailboxes: Vec<RemoteMailboxId>,
    /// Flags tracked remotely. `\Deleted` is ignored if present.
    pub flags: FlagSet,
    pub internal_date: DateTime<FixedOffset>,
}

/// The contract the host implements to connect the gateway to its mail
/// store.
///
/// All methods may suspend. None of them are called with the per-user lock
/// held, so an implementation is free to call back into the gateway.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Check credentials. `Ok(false)` means "wrong password"; `Err` means the
    /// check itself could not be made.
    async fn authorize(
        &self,
        ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> Result<bool, AdapterError>;

    async fn get_label(
        &self,
        ctx: &RequestContext,
        id: &RemoteMailboxId,
    ) -> Result<RemoteLabel, AdapterError>;

    async fn create_label(
        &self,
        ctx: &RequestContext,
        path: &[String],
    ) -> Result<RemoteLabel, AdapterError>;

    async fn update_label(
        &self,
        ctx: &RequestContext,
        id: &RemoteMailboxId,
        path: &[String],
    ) -> Result<(), AdapterError>;

    async fn delete_label(
        &self,
        ctx: &RequestContext,
        id: &RemoteMailboxId,
    ) -> Result<(), AdapterError>;

    /// Fetch a message along with its full literal.
    async fn get_message(
        &self,
        ctx: &RequestContext,
        id: &RemoteMessageId,
    ) -> Result<(RemoteMessage, Vec<u8>), AdapterError>;

    /// Ingest a new message into `mailbox`.
    ///
    /// Returns the message and the literal as the remote store will serve it
    /// from now on. If the remote store recognises the message as one it
    /// already has, it returns the existing message's id.
    async fn create_message(
        &self,
        ctx: &RequestContext,
        mailbox: &RemoteMailboxId,
        literal: &[u8],
        flags: &FlagSet,
        internal_date: DateTime<FixedOffset>,
    ) -> Result<(RemoteMessage, Vec<u8>), AdapterError>;

    async fn add_messages_to_mailbox(
        &self,
        ctx: &RequestContext,
        ids: &[RemoteMessageId],
        mailbox: &RemoteMailboxId,
    ) -> Result<(), AdapterError>;

    async fn remove_messages_from_mailbox(
        &self,
        ctx: &RequestContext,
        ids: &[RemoteMessageId],
        mailbox: &RemoteMailboxId,
    ) -> Result<(), AdapterError>;

    async fn move_messages(
        &self,
        ctx: &RequestContext,
        ids: &[RemoteMessageId],
        from: &RemoteMailboxId,
        to: &RemoteMailboxId,
    ) -> Result<(), AdapterError>;

    async fn mark_messages_seen(
        &self,
        ctx: &RequestContext,
        ids: &[RemoteMessageId],
        seen: bool,
    ) -> Result<(), AdapterError>;

    async fn mark_messages_flagged(
        &self,
        ctx: &RequestContext,
        ids: &[RemoteMessageId],
        flagged: bool,
    ) -> Result<(), AdapterError>;

    /// The label that backs INBOX.
    fn inbox_label(&self) -> RemoteMailboxId {
        RemoteMailboxId("INBOX".to_owned())
    }

    /// Called when the gateway stops draining the update channel.
    async fn pause(&self) {}

    /// Called when the gateway resumes draining the update channel.
    async fn resume(&self) {}

    /// Outbound sink of the update bus. Called by the pump, in bus order,
    /// after each update has been applied.
    fn observe(&self, _event: &BusEvent) {}
}
