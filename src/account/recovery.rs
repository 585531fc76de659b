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
//! The recovery mailbox.
//!
//! When the remote store refuses a message a client is appending, the literal
//! is parked in a purely local mailbox instead so that nothing the client
//! sent is lost. The client can later copy or move it out, which retries the
//! remote ingestion.

use chrono::prelude::*;
use log::{info, warn};
use tiny_keccak::{Hasher, Sha3};

use super::bus::UpdateKind;
use super::literal_store;
use super::model::*;
use super::user::User;
use crate::remote::context::RequestContext;
use crate::support::error::Error;

/// The reserved name of the recovery mailbox.
pub const RECOVERY_MAILBOX_NAME: &str = "Recovered Messages";

pub fn is_recovery_name(name: &str) -> bool {
    RECOVERY_MAILBOX_NAME == name
}

/// The hash used to recognise repeated failed appends of the same message.
pub fn recovery_hash(literal: &[u8], flags: &FlagSet) -> [u8; 32] {
    let mut sha3 = Sha3::v256();
    sha3.update(literal);
    for flag in flags.iter() {
        sha3.update(b"\0");
        sha3.update(flag.to_string().to_ascii_lowercase().as_bytes());
    }

    let mut hash = [0u8; 32];
    sha3.finalize(&mut hash);
    hash
}

/// Park `literal` in the recovery mailbox, creating the mailbox if needed.
///
/// Returns `true` if the message is new to the recovery mailbox, or `false`
/// if an identical stash was already there.
pub async fn stash(
    user: &User,
    literal: &[u8],
    mut flags: FlagSet,
    internal_date: DateTime<FixedOffset>,
) -> Result<bool, Error> {
    let deleted = flags.take_deleted();
    let hash = recovery_hash(literal, &flags);
    let mailbox = ensure_mailbox(user).await?;

    let id = MessageId::generate();
    user.literals.put(id, literal)?;

    let applied = user
        .apply(
            UpdateKind::MessagesCreated {
                mailbox,
                messages: vec![NewMessage {
                    id,
                    remote_id: None,
                    flags,
                    deleted,
                    internal_date,
                    size: literal.len(),
                    recovery_hash: Some(hash),
                }],
            },
            None,
        )
        .await?;

    let fresh = !applied.added.fresh.is_empty();
    if fresh {
        warn!(
            "{}: Stashed {}-byte message {} in {}",
            user.name,
            literal.len(),
            id,
            RECOVERY_MAILBOX_NAME
        );
    }
    Ok(fresh)
}

async fn ensure_mailbox(user: &User) -> Result<MailboxId, Error> {
    let existing = user.lock().recovery_mailbox().map(|mb| mb.id);
    if let Some(id) = existing {
        return Ok(id);
    }

    let created = user
        .apply(
            UpdateKind::MailboxCreated {
                name: RECOVERY_MAILBOX_NAME.to_owned(),
                remote: None,
                recovery: true,
            },
            None,
        )
        .await;

    match created {
        Ok(applied) => applied.mailbox.ok_or(Error::NxMailbox),
        // Another session got there first
        Err(Error::MailboxExists) => user
            .lock()
            .recovery_mailbox()
            .map(|mb| mb.id)
            .ok_or(Error::MailboxExists),
        Err(e) => Err(e),
    }
}

/// Hand a message that has no remote counterpart to the remote store,
/// placing it in `dst`.
///
/// Returns the id of the message the remote store now backs. This is
/// `message` itself unless the remote store recognised the literal as one
/// the gateway already knows, in which case it is that message.
pub async fn ingest(
    user: &User,
    ctx: &RequestContext,
    message: MessageId,
    dst: MailboxId,
) -> Result<MessageId, Error> {
    let (flags, internal_date, dst_remote) = {
        let state = user.lock();
        let record = state.message(message)?;
        let dst_remote = state
            .mailbox(dst)?
            .remote
            .clone()
            .ok_or(Error::RecoveryMailboxReserved)?;
        (record.flags.clone(), record.internal_date, dst_remote)
    };

    let literal = user.literals.get(message)?;
    let stamped = literal_store::stamp_internal_id(
        &literal,
        &user.config.internal_id_header,
        message,
    );

    let (remote, canonical) = user
        .adapter
        .create_message(ctx, &dst_remote, &stamped, &flags, internal_date)
        .await
        .map_err(|e| Error::RemoteCreateFailed(e.to_string()))?;

    let existing = user.lock().message_by_remote(&remote.id);
    if let Some(existing) = existing {
        info!(
            "{}: Remote store matched recovered message {} to {}",
            user.name, message, existing
        );
        return Ok(existing);
    }

    user.literals.put(message, &canonical)?;
    user.apply(
        UpdateKind::MessagesCreated {
            mailbox: dst,
            messages: vec![NewMessage {
                id: message,
                remote_id: Some(remote.id),
                flags,
                deleted: false,
                internal_date,
                size: canonical.len(),
                recovery_hash: None,
            }],
        },
        None,
    )
    .await?;

    info!("{}: Recovered message {} ingested", user.name, message);
    Ok(message)
}
