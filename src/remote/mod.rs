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

//! The boundary between the gateway and the host's remote mail store.
//!
//! The host implements `RemoteAdapter` and pushes `RemoteUpdate`s describing
//! changes made on the remote side. Every adapter call carries a
//! `RequestContext` describing the session that caused it.

pub mod adapter;
pub mod context;
#[cfg(test)]
pub mod test_adapter;
pub mod update;
