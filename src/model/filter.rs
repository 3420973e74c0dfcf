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

//! Folder selection and ordering.
//!
//! A `FolderFilter` is a conjunction of tagged predicates interpreted by
//! `FolderFilter::matches`. Backends are free to use the predicates to narrow
//! what they load (by index range, SQL clause, and so forth), but the final
//! decision for every folder is always made by `matches`, so every backend
//! selects exactly the same folders.

use std::cmp::Ordering;

use regex::Regex;

use super::folder::{is_within, split_parent, Folder, Role};
use super::id::FolderId;

#[derive(Clone, Debug)]
pub enum FolderPredicate {
    /// The folder's path equals this.
    Path(String),
    /// The folder is at this path or anywhere below it.
    PathPrefix(String),
    /// The folder's path matches at least one of these expressions.
    PathRegex(Vec<Regex>),
    /// The folder's parent is exactly this (`None` selects root folders).
    Parent(Option<FolderId>),
    /// The folder's parent has exactly this path.
    ParentPath(String),
    Subscribed(bool),
    HasRole(bool),
    Role(Role),
    /// The folder's name contains this text, ignoring case.
    NameContains(String),
}

impl FolderPredicate {
    pub fn matches(&self, folder: &Folder) -> bool {
        match *self {
            FolderPredicate::Path(ref path) => folder.path == *path,
            FolderPredicate::PathPrefix(ref prefix) => {
                is_within(&folder.path, prefix)
            },
            FolderPredicate::PathRegex(ref rxs) => {
                rxs.iter().any(|rx| rx.is_match(&folder.path))
            },
            FolderPredicate::Parent(parent) => folder.parent_id == parent,
            FolderPredicate::ParentPath(ref parent) => {
                split_parent(&folder.path).0 == Some(parent.as_str())
            },
            FolderPredicate::Subscribed(subscribed) => {
                folder.subscribed == subscribed
            },
            FolderPredicate::HasRole(has) => folder.role.is_some() == has,
            FolderPredicate::Role(role) => folder.role == Some(role),
            FolderPredicate::NameContains(ref needle) => folder
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
        }
    }
}

/// A conjunction of `FolderPredicate`s. The empty filter matches every
/// folder.
#[derive(Clone, Debug, Default)]
pub struct FolderFilter {
    predicates: Vec<FolderPredicate>,
}

impl FolderFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: FolderPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn path(self, path: impl Into<String>) -> Self {
        self.with(FolderPredicate::Path(path.into()))
    }

    pub fn path_prefix(self, prefix: impl Into<String>) -> Self {
        self.with(FolderPredicate::PathPrefix(prefix.into()))
    }

    pub fn path_regex(self, rxs: Vec<Regex>) -> Self {
        self.with(FolderPredicate::PathRegex(rxs))
    }

    pub fn parent(self, parent: Option<FolderId>) -> Self {
        self.with(FolderPredicate::Parent(parent))
    }

    pub fn parent_path(self, parent: impl Into<String>) -> Self {
        self.with(FolderPredicate::ParentPath(parent.into()))
    }

    pub fn subscribed(self, subscribed: bool) -> Self {
        self.with(FolderPredicate::Subscribed(subscribed))
    }

    pub fn has_role(self, has: bool) -> Self {
        self.with(FolderPredicate::HasRole(has))
    }

    pub fn role(self, role: Role) -> Self {
        self.with(FolderPredicate::Role(role))
    }

    pub fn name_contains(self, needle: impl Into<String>) -> Self {
        self.with(FolderPredicate::NameContains(needle.into()))
    }

    pub fn predicates(&self) -> &[FolderPredicate] {
        &self.predicates
    }

    pub fn matches(&self, folder: &Folder) -> bool {
        self.predicates.iter().all(|p| p.matches(folder))
    }

    /// Literal path prefixes which every matching folder's path is known to
    /// start with, if the filter implies any.
    ///
    /// `Some(v)` means every match starts with at least one element of `v`;
    /// `None` means no narrowing is possible.
    pub fn path_hints(&self) -> Option<Vec<String>> {
        self.predicates.iter().find_map(|p| match *p {
            FolderPredicate::Path(ref path) => Some(vec![path.clone()]),
            FolderPredicate::PathPrefix(ref prefix) => {
                Some(vec![prefix.clone()])
            },
            FolderPredicate::ParentPath(ref parent) => {
                Some(vec![format!("{parent}/")])
            },
            FolderPredicate::PathRegex(ref rxs) => rxs
                .iter()
                .map(|rx| literal_prefix(rx.as_str()).map(|(p, _)| p))
                .collect::<Option<Vec<_>>>(),
            _ => None,
        })
    }
}

/// Extracts the literal text an anchored regular expression requires at the
/// start of any match.
///
/// Returns `None` if the pattern is not anchored with `^` or contains
/// alternation. Otherwise, returns the literal prefix and whether the whole
/// pattern was that literal (in which case it is equivalent to a
/// `starts_with` test).
pub fn literal_prefix(pattern: &str) -> Option<(String, bool)> {
    let body = pattern.strip_prefix('^')?;
    if body.contains('|') {
        return None;
    }

    let mut prefix = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) if escaped.is_ascii_punctuation() => {
                    // Any quantifier after this applies to the escaped char,
                    // which may then be absent.
                    if matches!(chars.peek(), Some('*' | '?' | '{')) {
                        return Some((prefix, false));
                    }
                    prefix.push(escaped);
                },
                _ => return Some((prefix, false)),
            },
            '.' | '[' | '(' | '$' | '^' => return Some((prefix, false)),
            '*' | '?' | '{' | '+' => return Some((prefix, false)),
            c => {
                if matches!(chars.peek(), Some('*' | '?' | '{')) {
                    return Some((prefix, false));
                }
                prefix.push(c);
            },
        }
    }

    Some((prefix, true))
}

/// Ordering for folder listings.
///
/// Every order falls back to ascending name, then id, so listings are
/// deterministic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FolderOrder {
    #[default]
    SortOrder,
    SortOrderDesc,
    CreatedAt,
    CreatedAtDesc,
    Name,
    NameDesc,
}

impl FolderOrder {
    pub fn compare(self, a: &Folder, b: &Folder) -> Ordering {
        let primary = match self {
            FolderOrder::SortOrder => a.sort_order.cmp(&b.sort_order),
            FolderOrder::SortOrderDesc => b.sort_order.cmp(&a.sort_order),
            FolderOrder::CreatedAt => a.created_at.cmp(&b.created_at),
            FolderOrder::CreatedAtDesc => b.created_at.cmp(&a.created_at),
            FolderOrder::Name => Ordering::Equal,
            FolderOrder::NameDesc => b.name.cmp(&a.name),
        };

        primary
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    }

    pub fn sort(self, folders: &mut [Folder]) {
        folders.sort_by(|a, b| self.compare(a, b));
    }
}
