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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Mailbox does not exist")]
    NxMailbox,
    #[error("Mailbox already exists")]
    MailboxExists,
    #[error("Mailbox cannot be selected")]
    MailboxUnselectable,
    #[error("Mailbox is read-only")]
    MailboxReadOnly,
    #[error("Operation not allowed on INBOX")]
    BadOperationOnInbox,
    #[error("Mailbox name is reserved")]
    RecoveryMailboxReserved,
    #[error("Unsafe mailbox name")]
    UnsafeName,
    #[error("Mailbox cannot be renamed into itself")]
    RenameIntoSelf,
    #[error("Message does not exist")]
    NxMessage,
    #[error("Message has been expunged")]
    ExpungedMessage,
    #[error("Message not addressable by sequence number")]
    UnaddressableMessage,
    #[error("\\Recent may not be stored")]
    RecentFlagNotAllowed,
    #[error("Mailbox message limit reached")]
    MailboxFull,
    #[error("Mailbox limit reached")]
    TooManyMailboxes,
    #[error("UID space exhausted")]
    UidSpaceExhausted,
    #[error("UIDVALIDITY space exhausted")]
    UidValidityExhausted,
    #[error("Unsupported charset")]
    UnknownCharset,
    #[error("No such user")]
    NxUser,
    #[error("Update bus closed")]
    BusClosed,
    #[error("Remote mail store failed: {0}")]
    Remote(String),
    #[error("Remote mail store rejected the message: {0}")]
    RemoteCreateFailed(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Ssl(#[from] openssl::error::ErrorStack),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Produce an equivalent error for a second waiter on the same failure.
    pub fn duplicate(&self) -> Self {
        match *self {
            Error::NxMailbox => Error::NxMailbox,
            Error::MailboxExists => Error::MailboxExists,
            Error::MailboxUnselectable => Error::MailboxUnselectable,
            Error::MailboxReadOnly => Error::MailboxReadOnly,
            Error::BadOperationOnInbox => Error::BadOperationOnInbox,
            Error::RecoveryMailboxReserved => Error::RecoveryMailboxReserved,
            Error::UnsafeName => Error::UnsafeName,
            Error::RenameIntoSelf => Error::RenameIntoSelf,
            Error::NxMessage => Error::NxMessage,
            Error::ExpungedMessage => Error::ExpungedMessage,
            Error::UnaddressableMessage => Error::UnaddressableMessage,
            Error::RecentFlagNotAllowed => Error::RecentFlagNotAllowed,
            Error::MailboxFull => Error::MailboxFull,
            Error::TooManyMailboxes => Error::TooManyMailboxes,
            Error::UidSpaceExhausted => Error::UidSpaceExhausted,
            Error::UidValidityExhausted => Error::UidValidityExhausted,
            Error::UnknownCharset => Error::UnknownCharset,
            Error::NxUser => Error::NxUser,
            Error::BusClosed => Error::BusClosed,
            Error::Remote(ref s) => Error::Remote(s.clone()),
            Error::RemoteCreateFailed(ref s) => {
                Error::RemoteCreateFailed(s.clone())
            }
            Error::Io(ref e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
            Error::Ssl(ref e) => Error::Ssl(e.clone()),
            Error::Config(ref e) => {
                Error::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
            }
        }
    }
}

impl From<crate::remote::adapter::AdapterError> for Error {
    fn from(e: crate::remote::adapter::AdapterError) -> Self {
        Error::Remote(e.to_string())
    }
}
