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

//! Validation of the user names a host registers with `Server::add_user`.
//!
//! A user name doubles as the name of the user's directory under `data_dir`
//! and as the `LOGIN` user id, so it must be harmless in both places.

use std::fmt;

const MAX_LEN: usize = 255;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameProblem {
    Empty,
    TooLong,
    LeadingDot,
    PathSeparator,
    ControlCharacter,
}

impl fmt::Display for NameProblem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            NameProblem::Empty => "name is empty",
            NameProblem::TooLong => "name is too long",
            NameProblem::LeadingDot => "name starts with '.'",
            NameProblem::PathSeparator => "name contains a path separator",
            NameProblem::ControlCharacter => "name contains a control character",
        })
    }
}

pub fn check_user_name(name: &str) -> Result<(), NameProblem> {
    if name.is_empty() {
        return Err(NameProblem::Empty);
    }

    if name.len() > MAX_LEN {
        return Err(NameProblem::TooLong);
    }

    // Covers `.`, `..` and hidden directories
    if name.starts_with('.') {
        return Err(NameProblem::LeadingDot);
    }

    if name.contains(|c| '/' == c || '\\' == c) {
        return Err(NameProblem::PathSeparator);
    }

    if name.chars().any(char::is_control) {
        return Err(NameProblem::ControlCharacter);
    }

    Ok(())
}

pub fn is_safe_user_name(name: &str) -> bool {
    check_user_name(name).is_ok()
}
