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

//! Storage of message literals, keyed by `MessageId`.
//!
//! Literals are immutable once written. The file-backed store writes each
//! literal atomically to `<root>/literals/<id>` via a staging area in
//! `<root>/tmp`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{info, warn};

use super::model::MessageId;
use crate::mime::header::HeaderBlock;
use crate::support::error::Error;
use crate::support::file_ops::{self, IgnoreKinds};

#[derive(Debug)]
pub enum LiteralStore {
    Memory(Mutex<HashMap<MessageId, Arc<[u8]>>>),
    Files { root: PathBuf },
}

impl LiteralStore {
    pub fn in_memory() -> Self {
        LiteralStore::Memory(Mutex::new(HashMap::new()))
    }

    /// Open (creating if needed) a file-backed store under `root`.
    pub fn open(root: PathBuf) -> Result<Self, Error> {
        fs::create_dir_all(root.join("literals"))?;
        fs::create_dir_all(root.join("tmp"))?;
        Ok(LiteralStore::Files { root })
    }

    pub fn put(&self, id: MessageId, data: &[u8]) -> Result<(), Error> {
        match *self {
            LiteralStore::Memory(ref map) => {
                lock(map).insert(id, Arc::from(data));
                Ok(())
            }
            LiteralStore::Files { ref root } => {
                file_ops::spit(root.join("tmp"), literal_path(root, id), true, data)
                    .map_err(Error::from)
            }
        }
    }

    pub fn get(&self, id: MessageId) -> Result<Arc<[u8]>, Error> {
        match *self {
            LiteralStore::Memory(ref map) => {
                lock(map).get(&id).cloned().ok_or(Error::NxMessage)
            }
            LiteralStore::Files { ref root } => {
                match fs::read(literal_path(root, id)) {
                    Ok(data) => Ok(Arc::from(data)),
                    Err(e) if io::ErrorKind::NotFound == e.kind() => {
                        Err(Error::NxMessage)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    pub fn remove(&self, id: MessageId) -> Result<(), Error> {
        match *self {
            LiteralStore::Memory(ref map) => {
                lock(map).remove(&id);
                Ok(())
            }
            LiteralStore::Files { ref root } => {
                fs::remove_file(literal_path(root, id))
                    .ignore_not_found()
                    .map_err(Error::from)
            }
        }
    }

    /// Delete every stored literal whose id does not satisfy `known`.
    ///
    /// Returns the number of literals deleted.
    pub fn collect_orphans(
        &self,
        known: impl Fn(MessageId) -> bool,
    ) -> Result<usize, Error> {
        match *self {
            LiteralStore::Memory(ref map) => {
                let mut map = lock(map);
                let before = map.len();
                map.retain(|&id, _| known(id));
                Ok(before - map.len())
            }
            LiteralStore::Files { ref root } => {
                let mut deleted = 0;
                for entry in fs::read_dir(root.join("literals"))? {
                    let entry = entry?;
                    let name = entry.file_name();
                    let id = name.to_str().and_then(|n| n.parse().ok());
                    match id {
                        Some(id) if known(id) => {}
                        Some(_) => {
                            fs::remove_file(entry.path()).ignore_not_found()?;
                            deleted += 1;
                        }
                        None => warn!(
                            "Ignoring stray file {} in literal store",
                            entry.path().display()
                        ),
                    }
                }

                if deleted > 0 {
                    info!(
                        "Removed {} orphaned literals from {}",
                        deleted,
                        root.display()
                    );
                }
                Ok(deleted)
            }
        }
    }
}

/// Find the gateway id recorded in the `header` header of `literal`.
pub fn read_internal_id(literal: &[u8], header: &str) -> Option<MessageId> {
    let block = HeaderBlock::parse(literal);
    block
        .fields
        .iter()
        .find(|f| f.is_named(literal, header))
        .and_then(|f| std::str::from_utf8(f.value(literal)).ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Produce a copy of `literal` carrying exactly one `header` header, whose
/// value is `id`.
pub fn stamp_internal_id(
    literal: &[u8],
    header: &str,
    id: MessageId,
) -> Vec<u8> {
    let block = HeaderBlock::parse(literal);
    let mut out = Vec::with_capacity(literal.len() + header.len() + 40);
    out.extend_from_slice(format!("{}: {}\r\n", header, id).as_bytes());

    let mut pos = 0;
    for field in block.fields.iter().filter(|f| f.is_named(literal, header)) {
        out.extend_from_slice(&literal[pos..field.start]);
        pos = field.end;
    }
    out.extend_from_slice(&literal[pos..]);
    out
}

fn literal_path(root: &Path, id: MessageId) -> PathBuf {
    root.join("literals").join(id.to_string())
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
