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

use std::fmt;
use std::sync::Arc;

/// The key/value pairs a client reported with the `ID` command.
///
/// Keys are kept in the order the client sent them. Values may be `NIL`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImapId {
    pub fields: Vec<(String, Option<String>)>,
}

impl ImapId {
    /// Look up a field by case-insensitive key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name")
    }

    pub fn version(&self) -> Option<&str> {
        self.get("version")
    }
}

/// Ambient information about the session on whose behalf an adapter call is
/// made.
///
/// This is threaded explicitly through every call; there is no global
/// "current session".
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Process-unique identifier of the session. 0 for calls made by the
    /// gateway itself rather than on behalf of a client.
    pub session: u64,
    /// What the client reported via `ID`, if it has done so.
    pub imap_id: Option<Arc<ImapId>>,
}

impl RequestContext {
    pub fn new(session: u64) -> Self {
        RequestContext {
            session,
            imap_id: None,
        }
    }

    /// The context used for calls not attributable to any client.
    pub fn internal() -> Self {
        Self::default()
    }

    pub fn with_imap_id(&self, id: ImapId) -> Self {
        RequestContext {
            session: self.session,
            imap_id: Some(Arc::new(id)),
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "session#{}", self.session)?;
        if let Some(ref id) = self.imap_id {
            write!(
                f,
                "[{}/{}]",
                id.name().unwrap_or("unknown"),
                id.version().unwrap_or("unknown")
            )?;
        }
        Ok(())
    }
}
