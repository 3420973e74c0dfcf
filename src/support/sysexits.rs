//-
// Copyright (c) 2023, Jason Lingle
//
// This file is part of Maildepot.
//
// Maildepot is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Maildepot is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or
// FITNESS FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License
// for more details.
//
// You should have received a copy of the GNU General Public License along with
// Maildepot. If not, see <http://www.gnu.org/licenses/>.

//! Constants from `sysexits.h`, and the mapping from storage errors onto
//! them used by the command line.

use super::error::{Error, ErrorKind};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_NOUSER: Sysexit = Sysexit(67);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_CANTCREAT: Sysexit = Sysexit(73);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_TEMPFAIL: Sysexit = Sysexit(75);
pub const EX_NOPERM: Sysexit = Sysexit(77);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }

    pub fn for_error(error: &Error) -> Self {
        match error {
            Error::NxAccount => EX_NOUSER,
            Error::Io(..) => EX_IOERR,
            _ => match error.kind() {
                ErrorKind::NotFound => EX_NOINPUT,
                ErrorKind::AlreadyExists => EX_CANTCREAT,
                ErrorKind::LogicError | ErrorKind::Validation => EX_DATAERR,
                ErrorKind::Conflict | ErrorKind::Cancelled => EX_TEMPFAIL,
                ErrorKind::Unauthenticated => EX_NOPERM,
                ErrorKind::DanglingReference | ErrorKind::Internal => {
                    EX_SOFTWARE
                },
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_mapping() {
        assert_eq!(EX_NOUSER, Sysexit::for_error(&Error::NxAccount));
        assert_eq!(EX_NOINPUT, Sysexit::for_error(&Error::NxFolder));
        assert_eq!(EX_CANTCREAT, Sysexit::for_error(&Error::FolderExists));
        assert_eq!(EX_DATAERR, Sysexit::for_error(&Error::RenameIntoSelf));
        assert_eq!(EX_TEMPFAIL, Sysexit::for_error(&Error::StaleFolder));
        assert_eq!(EX_SOFTWARE, Sysexit::for_error(&Error::Poisoned));
    }
}
