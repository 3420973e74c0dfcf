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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key set on a copied message, naming the message it was copied from.
pub const COPY_OF: &str = "copy_of";

/// A string-keyed annotation map attached to accounts, folders, messages, and
/// change-log entries.
///
/// The storage engine itself only interprets `COPY_OF`; everything else is
/// carried opaquely for extensions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn copies_are_independent() {
        let mut original = Metadata::new();
        original.set("source", "lmtp");

        let mut copy = original.clone();
        copy.set(COPY_OF, "x");
        copy.set("source", "imap");

        assert_eq!(Some("lmtp"), original.get("source"));
        assert_eq!(None, original.get(COPY_OF));
        assert_eq!(2, copy.len());
        assert_eq!(
            vec![(COPY_OF, "x"), ("source", "imap")],
            copy.iter().collect::<Vec<_>>()
        );
        assert_eq!(Some("imap".to_owned()), copy.remove("source"));
    }
}
