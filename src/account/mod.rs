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

//! Per-user mail state: the mailbox directory, snapshots, the update bus and
//! everything a session does against them.

pub mod account;
pub mod bus;
pub mod limits;
pub mod literal_store;
pub mod mailbox;
pub mod mailbox_path;
pub mod mailbox_state;
pub mod model;
pub mod recovery;
pub mod search;
pub mod user;
