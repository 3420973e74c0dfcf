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

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// The location of a part within a message's MIME tree, as used by IMAP
/// `BODY[1.2.3]` section specifiers.
///
/// Each element is a 1-based index among siblings; `1.2` is the second child
/// of the first top-level part. The empty path denotes the message as a
/// whole and is never the path of a stored part.
#[derive(
    Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MimePath(Vec<NonZeroU32>);

impl MimePath {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().map(|i| i.get())
    }

    /// The path of the following sibling. The empty path has no siblings and
    /// is returned unchanged.
    pub fn next_sibling(&self) -> Self {
        let mut sibling = self.clone();
        if let Some(last) = sibling.0.last_mut() {
            *last = last.saturating_add(1);
        }
        sibling
    }

    pub fn first_child(&self) -> Self {
        let mut child = self.clone();
        child.0.push(NonZeroU32::MIN);
        child
    }

    /// Whether `self` lies strictly inside the subtree rooted at `other`.
    pub fn is_inside(&self, other: &MimePath) -> bool {
        self.0.len() > other.0.len() && self.0.starts_with(&other.0)
    }
}

impl fmt::Display for MimePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, index) in self.0.iter().enumerate() {
            if ix > 0 {
                write!(f, ".")?;
            }
            write!(f, "{index}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MimePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MimePath({self})")
    }
}

impl FromStr for MimePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.is_empty() {
            return Ok(Self::empty());
        }

        s.split('.')
            .map(|part| {
                part.parse::<NonZeroU32>().map_err(|_| {
                    Error::invalid("MIME path", format!("bad index in {s:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn p(s: &str) -> MimePath {
        s.parse().unwrap()
    }

    #[test]
    fn navigation() {
        assert_eq!("1", MimePath::empty().first_child().to_string());
        assert_eq!("1.2", p("1.1").next_sibling().to_string());
        assert_eq!("1.2.1", p("1.2").first_child().to_string());
        assert_eq!(MimePath::empty(), MimePath::empty().next_sibling());
        assert_eq!(3, p("2.1.4").depth());
        assert_eq!(vec![2, 1, 4], p("2.1.4").indices().collect::<Vec<_>>());
        assert!(p("1.2").is_inside(&p("1")));
        assert!(!p("1").is_inside(&p("1")));
        assert!(!p("2.1").is_inside(&p("1")));
        assert!(p("1").is_inside(&MimePath::empty()));
    }

    #[test]
    fn parsing() {
        assert!(p("").is_empty());
        assert_eq!("1.10.3", p("1.10.3").to_string());
        for bad in ["1.", ".", "1..2", "0", "a", "1.-1", ".1"] {
            assert_matches!(
                Err(Error::Invalid { .. }),
                bad.parse::<MimePath>()
            );
        }
    }
}
