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

//! Entity identifiers.
//!
//! Every entity is identified by a UUIDv7, which embeds its creation time in
//! the high bits and so sorts by creation order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::support::error::Error;

macro_rules! entity_id {
    ($(#[$meta:meta])* $t:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $t(pub Uuid);

        impl $t {
            /// Generates a fresh, time-ordered id.
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl fmt::Debug for $t {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}({})", stringify!($t), self.0.hyphenated())
            }
        }

        impl FromStr for $t {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Error> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| Error::invalid($what, e.to_string()))
            }
        }
    };
}

entity_id!(AccountId, "account id");
entity_id!(FolderId, "folder id");
entity_id!(MessageId, "message id");
entity_id!(
    /// Identifies one immutable MIME part. Copies of a message share the
    /// source's part ids.
    PartId,
    "part id"
);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ids_are_unique_and_parse_back() {
        let a = FolderId::generate();
        let b = FolderId::generate();
        assert_ne!(a, b);
        assert_eq!(a, a.to_string().parse::<FolderId>().unwrap());
        assert_eq!(a, FolderId::from_bytes(*a.as_bytes()));
        assert_matches!(
            Err(Error::Invalid { .. }),
            "not-a-uuid".parse::<MessageId>()
        );
    }

    #[test]
    fn ids_sort_by_creation() {
        let first = MessageId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = MessageId::generate();
        assert!(first < second);
    }
}
