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

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};
use serde::{Deserialize, Serialize};

use crate::account::limits::ImapLimits;
use crate::support::error::Error;

/// The configuration of an embedded gateway.
///
/// The host usually builds this in code, but it can also be loaded from a
/// TOML file with `SystemConfig::load`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    /// The mailbox hierarchy delimiter.
    ///
    /// If empty, hierarchy is forbidden and every mailbox lives at the top
    /// level.
    pub delimiter: String,

    /// Configuration for TLS.
    ///
    /// Without this, neither `STARTTLS` nor implicit TLS is available.
    pub tls: Option<TlsConfig>,

    /// Where message literals are stored. If unset, literals are kept in
    /// memory.
    pub data_dir: Option<PathBuf>,

    /// Where per-user metadata lives, including the deferred deletion area.
    pub database_dir: Option<PathBuf>,

    /// Numeric caps enforced whenever state is written.
    pub limits: ImapLimits,

    /// Subdirectory of `database_dir` into which removed users are moved
    /// before being purged.
    pub deferred_delete_subdir: String,

    /// The header inserted into every literal the gateway hands to the remote
    /// store, carrying the gateway's own id for the message.
    pub internal_id_header: String,

    /// The largest literal a client may send, in bytes.
    pub max_literal_size: u32,

    /// How many updates the per-user bus holds before producers block.
    pub bus_capacity: usize,

    /// Extra values to report in the ID command.
    /// The main useful value here is `support-url`.
    pub identification: BTreeMap<String, String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            delimiter: "/".to_owned(),
            tls: None,
            data_dir: None,
            database_dir: None,
            limits: ImapLimits::default(),
            deferred_delete_subdir: "deferred_delete".to_owned(),
            internal_id_header: "X-Crymap-Gateway-ID".to_owned(),
            max_literal_size: 50 * 1024 * 1024,
            bus_capacity: 1024,
            identification: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct TlsConfig {
    /// The path to the TLS private key, which must be in PEM format.
    pub private_key: PathBuf,
    /// The path to the TLS certificate chain, which must be in PEM format.
    pub certificate_chain: PathBuf,
}

impl SystemConfig {
    /// Load the configuration from the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// The directory where removed users wait to be purged, if any.
    pub fn deferred_delete_dir(&self) -> Option<PathBuf> {
        self.database_dir
            .as_ref()
            .map(|d| d.join(&self.deferred_delete_subdir))
    }
}

impl TlsConfig {
    /// Build an `SslAcceptor` from the configured key material.
    pub fn acceptor(&self) -> Result<SslAcceptor, Error> {
        let mut builder =
            SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server())?;
        builder.set_private_key_file(&self.private_key, SslFiletype::PEM)?;
        builder.set_certificate_chain_file(&self.certificate_chain)?;
        builder.check_private_key()?;
        Ok(builder.build())
    }
}
