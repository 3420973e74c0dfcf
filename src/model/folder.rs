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
use std::str::FromStr;

use chrono::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::id::{AccountId, FolderId};
use super::metadata::Metadata;
use super::uid::Uid;
use crate::support::{
    clock,
    error::Error,
    safe_name::{check_folder_name, PATH_SEPARATOR},
};

/// Special-use roles a folder may carry (RFC 6154, plus `Inbox` and RFC 8457
/// `Important`).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Role {
    Archive,
    Drafts,
    Important,
    Inbox,
    Junk,
    Sent,
    Trash,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Archive,
        Role::Drafts,
        Role::Important,
        Role::Inbox,
        Role::Junk,
        Role::Sent,
        Role::Trash,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::Archive => "Archive",
            Role::Drafts => "Drafts",
            Role::Important => "Important",
            Role::Inbox => "Inbox",
            Role::Junk => "Junk",
            Role::Sent => "Sent",
            Role::Trash => "Trash",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\\{}", self.name())
    }
}

impl FromStr for Role {
    type Err = Error;

    /// Parses a role name case-insensitively, with or without the leading
    /// backslash used by IMAP special-use attributes.
    fn from_str(s: &str) -> Result<Self, Error> {
        let bare = s.strip_prefix('\\').unwrap_or(s);
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.name().eq_ignore_ascii_case(bare))
            .ok_or_else(|| {
                Error::invalid("role", format!("unknown role {s:?}"))
            })
    }
}

/// One node of an account's folder tree.
///
/// `path` is materialised: it always equals the parent's path, the separator,
/// and `name`, or just `name` for a root folder. It is only ever rewritten by
/// the tree operations (create, rename/move, delete), never derived on read.
#[derive(Clone, Debug, PartialEq)]
pub struct Folder {
    pub id: FolderId,
    pub account_id: AccountId,
    pub parent_id: Option<FolderId>,
    pub name: String,
    pub path: String,
    pub role: Option<Role>,
    pub subscribed: bool,
    pub sort_order: u32,
    pub uid_validity: u32,
    /// The next UID the folder will issue. Only advanced by UID reservation.
    pub uid_next: Uid,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The value of `updated_at` when this copy was read from storage.
    ///
    /// An update only succeeds if the stored `updated_at` still equals this.
    pub observed_updated_at: DateTime<Utc>,
}

impl Folder {
    /// Builds a new folder under `parent` (or at the root).
    ///
    /// This does not touch storage; uniqueness of the resulting path is
    /// checked when the folder is created in a repository.
    pub fn new(
        parent: Option<&Folder>,
        account_id: AccountId,
        name: &str,
        role: Option<Role>,
    ) -> Result<Self, Error> {
        check_folder_name(name)?;
        if let Some(parent) = parent {
            if parent.account_id != account_id {
                return Err(Error::ForeignParent);
            }
        }

        let now = clock::now();
        Ok(Self {
            id: FolderId::generate(),
            account_id,
            parent_id: parent.map(|p| p.id),
            name: name.to_owned(),
            path: join_path(parent.map(|p| p.path.as_str()), name),
            role,
            subscribed: false,
            sort_order: 0,
            uid_validity: rand::thread_rng().gen_range(1..=i32::MAX as u32),
            uid_next: Uid::MIN,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
            observed_updated_at: now,
        })
    }

    pub fn set_subscribed(&mut self, subscribed: bool) {
        self.subscribed = subscribed;
        self.touch();
    }

    pub fn set_role(&mut self, role: Option<Role>) {
        self.role = role;
        self.touch();
    }

    pub fn set_sort_order(&mut self, sort_order: u32) {
        self.sort_order = sort_order;
        self.touch();
    }

    pub fn set_metadata(&mut self, key: &str, value: &str) {
        self.metadata.set(key, value);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = clock::now();
    }

    /// Whether `other` lies strictly below this folder.
    pub fn is_ancestor_of(&self, other: &Folder) -> bool {
        self.account_id == other.account_id
            && is_strictly_below(&other.path, &self.path)
    }
}

/// A folder touched by a rename/move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenamedFolder {
    pub id: FolderId,
    pub old_path: String,
    pub new_path: String,
}

/// A folder removed by a delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeletedFolder {
    pub id: FolderId,
    pub path: String,
}

/// Composes a child path.
pub fn join_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{parent}{PATH_SEPARATOR}{name}"),
        None => name.to_owned(),
    }
}

/// Splits a path into its parent path (if any) and final name.
pub fn split_parent(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once(PATH_SEPARATOR) {
        Some((parent, name)) => (Some(parent), name),
        None => (None, path),
    }
}

/// Whether `path` names a folder strictly below `ancestor`.
///
/// This is a path-component test, so `Work2` is not below `Work`.
pub fn is_strictly_below(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len() + 1
        && path.starts_with(ancestor)
        && path[ancestor.len()..].starts_with(PATH_SEPARATOR)
}

/// Whether `path` is `root` itself or lies below it.
pub fn is_within(path: &str, root: &str) -> bool {
    path == root || is_strictly_below(path, root)
}

/// Rewrites the `old_root` prefix of `path` to `new_root`.
///
/// `path` must be within `old_root`.
pub fn rebase_path(path: &str, old_root: &str, new_root: &str) -> String {
    format!("{new_root}{}", &path[old_root.len()..])
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn role_parsing() {
        assert_eq!(Role::Inbox, "inbox".parse::<Role>().unwrap());
        assert_eq!(Role::Sent, "\\Sent".parse::<Role>().unwrap());
        assert_eq!(Role::Junk, "JUNK".parse::<Role>().unwrap());
        assert_matches!(Err(Error::Invalid { .. }), "Flagged".parse::<Role>());
        for role in Role::ALL {
            assert_eq!(role, role.to_string().parse::<Role>().unwrap());
        }
    }

    #[test]
    fn new_folder_paths() {
        let account = AccountId::generate();
        let work = Folder::new(None, account, "Work", None).unwrap();
        assert_eq!("Work", work.path);
        assert_eq!(None, work.parent_id);
        assert_eq!(Uid::MIN, work.uid_next);
        assert!(work.uid_validity > 0 && work.uid_validity <= i32::MAX as u32);

        let reports =
            Folder::new(Some(&work), account, "Reports", Some(Role::Archive))
                .unwrap();
        assert_eq!("Work/Reports", reports.path);
        assert_eq!(Some(work.id), reports.parent_id);
        assert!(work.is_ancestor_of(&reports));
        assert!(!reports.is_ancestor_of(&work));

        assert_matches!(
            Err(Error::Invalid { .. }),
            Folder::new(Some(&work), account, "a/b", None)
        );
        assert_matches!(
            Err(Error::ForeignParent),
            Folder::new(Some(&work), AccountId::generate(), "x", None)
        );
    }

    #[test]
    fn setters_bump_updated_at_only() {
        let mut folder =
            Folder::new(None, AccountId::generate(), "INBOX", None).unwrap();
        let observed = folder.observed_updated_at;

        folder.set_subscribed(true);
        assert!(folder.updated_at > observed);
        let after_subscribe = folder.updated_at;
        folder.set_role(Some(Role::Inbox));
        folder.set_sort_order(3);
        assert!(folder.updated_at > after_subscribe);
        assert_eq!(observed, folder.observed_updated_at);
        assert!(folder.subscribed);
        assert_eq!(Some(Role::Inbox), folder.role);
        assert_eq!(3, folder.sort_order);
    }

    #[test]
    fn path_relations() {
        assert!(is_strictly_below("Work/Reports", "Work"));
        assert!(!is_strictly_below("Work2", "Work"));
        assert!(!is_strictly_below("Work2/x", "Work"));
        assert!(!is_strictly_below("Work", "Work"));
        assert!(!is_strictly_below("Work/", "Work"));
        assert!(is_within("Work", "Work"));
        assert!(!is_within("Workshop", "Work"));
        assert_eq!((Some("a/b"), "c"), split_parent("a/b/c"));
        assert_eq!((None, "a"), split_parent("a"));
        assert_eq!("X/b/c", rebase_path("a/b/c", "a", "X"));
    }

    proptest! {
        #[test]
        fn path_composition_adds_exactly_one_separator(
            names in prop::collection::vec("[a-zA-Z0-9 ]{1,8}", 1..6)
        ) {
            let account = AccountId::generate();
            let mut parent: Option<Folder> = None;
            for name in &names {
                let folder =
                    Folder::new(parent.as_ref(), account, name, None).unwrap();
                if let Some(ref p) = parent {
                    prop_assert_eq!(
                        format!("{}/{}", p.path, folder.name),
                        folder.path.clone()
                    );
                }
                parent = Some(folder);
            }

            let leaf = parent.unwrap();
            prop_assert_eq!(names.join("/"), leaf.path.clone());
            prop_assert_eq!(names.len() - 1, leaf.path.matches('/').count());
        }
    }
}
