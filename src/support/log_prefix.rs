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
use std::sync::{Arc, Mutex, MutexGuard};

/// Tracks text that should be included in at the start of every log statement.
///
/// Clones of a `LogPrefix` share the same underlying data.
#[derive(Clone)]
pub struct LogPrefix {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone)]
struct Inner {
    protocol: String,
    peer: String,
    user: Option<String>,
    ua_name: Option<String>,
    ua_version: Option<String>,
}

impl LogPrefix {
    pub fn new(protocol: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                protocol: protocol.into(),
                peer: sanitise(peer.into()),
                user: None,
                ua_name: None,
                ua_version: None,
            })),
        }
    }

    pub fn set_protocol(&self, protocol: impl Into<String>) {
        self.lock().protocol = protocol.into();
    }

    pub fn set_user(&self, user: String) {
        self.lock().user = Some(sanitise(user));
    }

    pub fn set_user_agent(
        &self,
        name: Option<String>,
        version: Option<String>,
    ) {
        let mut inner = self.lock();
        inner.ua_name = name.map(sanitise);
        inner.ua_version = version.map(sanitise);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned prefix is still perfectly usable for logging.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.lock();
        write!(f, "{}:{}", inner.protocol, inner.peer)?;
        if let Some(ref user) = inner.user {
            write!(f, "[~{}]", user)?;
        }

        if inner.ua_name.is_some() || inner.ua_version.is_some() {
            write!(
                f,
                "[{}/{}]",
                inner.ua_name.as_deref().unwrap_or("unknown"),
                inner.ua_version.as_deref().unwrap_or("unknown"),
            )?;
        }

        Ok(())
    }
}

impl fmt::Debug for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LogPrefix({})", self)
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}
