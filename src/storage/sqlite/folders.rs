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

//! Folder tree and folder entry queries.
//!
//! Every function here expects to run inside a transaction opened by the
//! caller; on error, the caller is responsible for not committing it.

use std::fmt::Write as _;

use rusqlite::{types::ToSql, OptionalExtension as _};

use super::types::*;
use crate::model::{
    entry::FolderEntry,
    filter::{literal_prefix, FolderFilter, FolderOrder, FolderPredicate},
    folder::{
        is_within, join_path, rebase_path, DeletedFolder, Folder,
        RenamedFolder,
    },
    id::{AccountId, FolderId, MessageId},
    uid::{Uid, UidBlock, UidSet},
};
use crate::support::{
    clock, error::Error, safe_name::check_folder_name,
    safe_name::PATH_SEPARATOR,
};

/// Bounds `[lo, hi)` such that a path is strictly below `path` exactly when
/// it lies in that range: everything starting with `path/` sorts between
/// `path/` and `path0`, since `0` follows `/`.
fn subtree_bounds(path: &str) -> (String, String) {
    let after_separator = char::from(PATH_SEPARATOR as u8 + 1);
    (
        format!("{path}{PATH_SEPARATOR}"),
        format!("{path}{after_separator}"),
    )
}

pub fn folder_by_id(
    cxn: &rusqlite::Connection,
    id: FolderId,
) -> Result<Folder, Error> {
    cxn.prepare_cached(&format!(
        "SELECT {FOLDER_COLUMNS} FROM `folder` WHERE `id` = ?"
    ))?
    .query_row((id,), from_row)
    .optional()?
    .ok_or(Error::NxFolder)
}

pub fn folder_by_path(
    cxn: &rusqlite::Connection,
    account: AccountId,
    path: &str,
) -> Result<Folder, Error> {
    cxn.prepare_cached(&format!(
        "SELECT {FOLDER_COLUMNS} FROM `folder` \
         WHERE `account_id` = ? AND `path` = ?"
    ))?
    .query_row((account, path), from_row)
    .optional()?
    .ok_or(Error::NxFolder)
}

/// Loads the folders matching `filter`.
///
/// The SQL narrows the candidates using whatever predicates translate
/// directly; `FolderFilter::matches` has the final say.
pub fn find_folders(
    cxn: &rusqlite::Connection,
    account: AccountId,
    filter: &FolderFilter,
    order: FolderOrder,
) -> Result<Vec<Folder>, Error> {
    let mut query =
        format!("SELECT {FOLDER_COLUMNS} FROM `folder` WHERE `account_id` = ?");
    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(account)];

    for predicate in filter.predicates() {
        match *predicate {
            FolderPredicate::Path(ref path) => {
                query.push_str(" AND `path` = ?");
                params.push(Box::new(path.clone()));
            },
            FolderPredicate::PathPrefix(ref prefix) => {
                let (lo, hi) = subtree_bounds(prefix);
                query.push_str(
                    " AND (`path` = ? OR (`path` >= ? AND `path` < ?))",
                );
                params.push(Box::new(prefix.clone()));
                params.push(Box::new(lo));
                params.push(Box::new(hi));
            },
            FolderPredicate::PathRegex(ref rxs) => {
                // Only narrow if every expression has a usable prefix, since
                // the expressions are alternatives.
                let prefixes = rxs
                    .iter()
                    .map(|rx| literal_prefix(rx.as_str()))
                    .collect::<Option<Vec<_>>>();
                if let Some(prefixes) = prefixes.filter(|p| !p.is_empty()) {
                    query.push_str(" AND (");
                    for (ix, (prefix, _)) in prefixes.into_iter().enumerate() {
                        if ix > 0 {
                            query.push_str(" OR ");
                        }
                        let _ = write!(
                            query,
                            "substr(`path`, 1, {}) = ?",
                            prefix.chars().count(),
                        );
                        params.push(Box::new(prefix));
                    }
                    query.push(')');
                }
            },
            FolderPredicate::Parent(Some(parent)) => {
                query.push_str(" AND `parent_id` = ?");
                params.push(Box::new(parent));
            },
            FolderPredicate::Parent(None) => {
                query.push_str(" AND `parent_id` IS NULL");
            },
            FolderPredicate::Subscribed(subscribed) => {
                query.push_str(" AND `subscribed` = ?");
                params.push(Box::new(subscribed));
            },
            FolderPredicate::HasRole(true) => {
                query.push_str(" AND `role` IS NOT NULL");
            },
            FolderPredicate::HasRole(false) => {
                query.push_str(" AND `role` IS NULL");
            },
            FolderPredicate::Role(role) => {
                query.push_str(" AND `role` = ?");
                params.push(Box::new(role));
            },
            FolderPredicate::ParentPath(..)
            | FolderPredicate::NameContains(..) => {},
        }
    }

    query.push_str(match order {
        FolderOrder::SortOrder => " ORDER BY `sort_order`, `name`, `id`",
        FolderOrder::SortOrderDesc => {
            " ORDER BY `sort_order` DESC, `name`, `id`"
        },
        FolderOrder::CreatedAt => " ORDER BY `created_at`, `name`, `id`",
        FolderOrder::CreatedAtDesc => {
            " ORDER BY `created_at` DESC, `name`, `id`"
        },
        FolderOrder::Name => " ORDER BY `name`, `id`",
        FolderOrder::NameDesc => " ORDER BY `name` DESC, `id`",
    });

    let mut stmt = cxn.prepare(&query)?;
    let folders = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), from_row)?
        .collect::<Result<Vec<Folder>, _>>()?;
    Ok(folders.into_iter().filter(|f| filter.matches(f)).collect())
}

/// Resolves an optional parent id to its path, checking that it belongs to
/// `account`.
fn parent_path(
    cxn: &rusqlite::Connection,
    account: AccountId,
    parent: Option<FolderId>,
) -> Result<Option<String>, Error> {
    let Some(parent) = parent else {
        return Ok(None);
    };

    let (parent_account, path) = cxn
        .prepare_cached(
            "SELECT `account_id`, `path` FROM `folder` WHERE `id` = ?",
        )?
        .query_row((parent,), from_row::<(AccountId, String)>)
        .optional()?
        .ok_or(Error::NxFolder)?;
    if parent_account != account {
        return Err(Error::ForeignParent);
    }

    Ok(Some(path))
}

pub fn create_folder(
    cxn: &rusqlite::Connection,
    folder: &Folder,
) -> Result<(), Error> {
    if 0 == cxn.query_row(
        "SELECT COUNT(*) FROM `account` WHERE `id` = ?",
        (folder.account_id,),
        from_single::<i64>,
    )? {
        return Err(Error::NxAccount);
    }

    let parent_path = parent_path(cxn, folder.account_id, folder.parent_id)?;
    if folder.path != join_path(parent_path.as_deref(), &folder.name) {
        return Err(Error::invalid(
            "folder path",
            format!("{:?} does not match its parent and name", folder.path),
        ));
    }

    if 0 != cxn.query_row(
        "SELECT COUNT(*) FROM `folder` \
         WHERE `account_id` = ? AND `path` = ?",
        (folder.account_id, &folder.path),
        from_single::<i64>,
    )? {
        return Err(Error::FolderExists);
    }

    cxn.prepare_cached(
        "INSERT INTO `folder` (\
           `id`, `account_id`, `parent_id`, `name`, `path`, `role`, \
           `subscribed`, `sort_order`, `uid_validity`, `uid_next`, \
           `metadata`, `created_at`, `updated_at`\
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?
    .execute((
        folder.id,
        folder.account_id,
        folder.parent_id,
        &folder.name,
        &folder.path,
        folder.role,
        folder.subscribed,
        folder.sort_order,
        folder.uid_validity,
        folder.uid_next,
        Cbor(&folder.metadata),
        Micros(folder.created_at),
        Micros(folder.updated_at),
    ))?;

    Ok(())
}

pub fn update_folder(
    cxn: &rusqlite::Connection,
    folder: &Folder,
) -> Result<Folder, Error> {
    let updated = cxn
        .prepare_cached(&format!(
            "UPDATE `folder` SET \
               `subscribed` = ?, `role` = ?, `sort_order` = ?, \
               `metadata` = ?, `updated_at` = MAX(?, `updated_at` + 1) \
             WHERE `id` = ? AND `updated_at` = ? \
             RETURNING {FOLDER_COLUMNS}"
        ))?
        .query_row(
            (
                folder.subscribed,
                folder.role,
                folder.sort_order,
                Cbor(&folder.metadata),
                Micros(folder.updated_at),
                folder.id,
                Micros(folder.observed_updated_at),
            ),
            from_row,
        )
        .optional()?;

    match updated {
        Some(updated) => Ok(updated),
        None => {
            if 0 == cxn.query_row(
                "SELECT COUNT(*) FROM `folder` WHERE `id` = ?",
                (folder.id,),
                from_single::<i64>,
            )? {
                Err(Error::NxFolder)
            } else {
                Err(Error::StaleFolder)
            }
        },
    }
}

pub fn delete_folder(
    cxn: &rusqlite::Connection,
    id: FolderId,
) -> Result<(), Error> {
    if 0 == cxn.query_row(
        "SELECT COUNT(*) FROM `folder` WHERE `id` = ?",
        (id,),
        from_single::<i64>,
    )? {
        return Err(Error::NxFolder);
    }

    if 0 != cxn.query_row(
        "SELECT COUNT(*) FROM `folder` WHERE `parent_id` = ?",
        (id,),
        from_single::<i64>,
    )? {
        return Err(Error::FolderHasChildren);
    }

    cxn.execute("DELETE FROM `folder` WHERE `id` = ?", (id,))?;
    Ok(())
}

/// The ids and paths of `path` and everything below it, in path order.
fn subtree(
    cxn: &rusqlite::Connection,
    account: AccountId,
    path: &str,
) -> Result<Vec<(FolderId, String)>, Error> {
    let (lo, hi) = subtree_bounds(path);
    cxn.prepare_cached(
        "SELECT `id`, `path` FROM `folder` \
         WHERE `account_id` = ? \
         AND (`path` = ? OR (`path` >= ? AND `path` < ?)) \
         ORDER BY `path`",
    )?
    .query_map((account, path, lo, hi), from_row)?
    .collect::<Result<Vec<_>, _>>()
    .map_err(Into::into)
}

pub fn rename_move(
    cxn: &rusqlite::Connection,
    account: AccountId,
    old_parent: Option<FolderId>,
    new_parent: Option<FolderId>,
    old_name: &str,
    new_name: &str,
) -> Result<Vec<RenamedFolder>, Error> {
    check_folder_name(new_name)?;
    let old_path =
        join_path(parent_path(cxn, account, old_parent)?.as_deref(), old_name);
    let new_parent_path = parent_path(cxn, account, new_parent)?;
    let new_path = join_path(new_parent_path.as_deref(), new_name);

    let root = cxn
        .prepare_cached(
            "SELECT `id` FROM `folder` WHERE `account_id` = ? AND `path` = ?",
        )?
        .query_row((account, &old_path), from_single::<FolderId>)
        .optional()?
        .ok_or(Error::NxFolder)?;

    if old_path == new_path {
        return Ok(vec![]);
    }
    if new_parent_path.is_some_and(|p| is_within(&p, &old_path)) {
        return Err(Error::RenameIntoSelf);
    }
    if 0 != cxn.query_row(
        "SELECT COUNT(*) FROM `folder` WHERE `account_id` = ? AND `path` = ?",
        (account, &new_path),
        from_single::<i64>,
    )? {
        return Err(Error::FolderExists);
    }

    let renamed = subtree(cxn, account, &old_path)?
        .into_iter()
        .map(|(id, path)| RenamedFolder {
            id,
            new_path: rebase_path(&path, &old_path, &new_path),
            old_path: path,
        })
        .collect::<Vec<_>>();

    let (lo, hi) = subtree_bounds(&old_path);
    cxn.prepare_cached(
        "UPDATE `folder` SET `path` = ? || substr(`path`, ?) \
         WHERE `account_id` = ? \
         AND (`path` = ? OR (`path` >= ? AND `path` < ?))",
    )?
    .execute((
        &new_path,
        old_path.chars().count() + 1,
        account,
        &old_path,
        lo,
        hi,
    ))?;

    cxn.prepare_cached(
        "UPDATE `folder` SET \
           `parent_id` = ?, `name` = ?, \
           `updated_at` = MAX(?, `updated_at` + 1) \
         WHERE `id` = ?",
    )?
    .execute((new_parent, new_name, Micros(clock::now()), root))?;

    Ok(renamed)
}

pub fn delete_tree(
    cxn: &rusqlite::Connection,
    root: FolderId,
) -> Result<Vec<DeletedFolder>, Error> {
    let (account, path) = cxn
        .prepare_cached(
            "SELECT `account_id`, `path` FROM `folder` WHERE `id` = ?",
        )?
        .query_row((root,), from_row::<(AccountId, String)>)
        .optional()?
        .ok_or(Error::NxFolder)?;

    let deleted = subtree(cxn, account, &path)?
        .into_iter()
        .map(|(id, path)| DeletedFolder { id, path })
        .collect::<Vec<_>>();

    // Descendants and entries go by cascade
    cxn.execute("DELETE FROM `folder` WHERE `id` = ?", (root,))?;
    Ok(deleted)
}

pub fn next_uid(
    cxn: &rusqlite::Connection,
    folder: FolderId,
    n: u32,
) -> Result<UidBlock, Error> {
    if 0 == n {
        return Err(Error::invalid("UID count", "must be positive"));
    }

    let first = cxn
        .prepare_cached(
            "UPDATE `folder` SET `uid_next` = `uid_next` + ?1 \
             WHERE `id` = ?2 AND `uid_next` + ?1 <= ?3 \
             RETURNING `uid_next` - ?1",
        )?
        .query_row((n, folder, u32::MAX), from_single::<Uid>)
        .optional()?;

    match first {
        Some(first) => Ok(UidBlock { first, len: n }),
        None => {
            if 0 == cxn.query_row(
                "SELECT COUNT(*) FROM `folder` WHERE `id` = ?",
                (folder,),
                from_single::<i64>,
            )? {
                Err(Error::NxFolder)
            } else {
                Err(Error::FolderFull)
            }
        },
    }
}

fn require_folder(
    cxn: &rusqlite::Connection,
    folder: FolderId,
) -> Result<(), Error> {
    if 0 == cxn.query_row(
        "SELECT COUNT(*) FROM `folder` WHERE `id` = ?",
        (folder,),
        from_single::<i64>,
    )? {
        return Err(Error::NxFolder);
    }
    Ok(())
}

pub fn create_entries(
    cxn: &rusqlite::Connection,
    entries: &[FolderEntry],
) -> Result<(), Error> {
    for entry in entries {
        let uid_next = cxn
            .prepare_cached("SELECT `uid_next` FROM `folder` WHERE `id` = ?")?
            .query_row((entry.folder_id,), from_single::<Uid>)
            .optional()?
            .ok_or(Error::NxFolder)?;

        if 0 == cxn
            .prepare_cached("SELECT COUNT(*) FROM `message` WHERE `id` = ?")?
            .query_row((entry.message_id,), from_single::<i64>)?
        {
            return Err(Error::DanglingEntry);
        }

        if entry.uid >= uid_next {
            return Err(Error::UnallocatedUid);
        }

        if 0 != cxn
            .prepare_cached(
                "SELECT COUNT(*) FROM `folder_entry` \
                 WHERE `folder_id` = ? AND `uid` = ?",
            )?
            .query_row((entry.folder_id, entry.uid), from_single::<i64>)?
        {
            return Err(Error::UidInUse);
        }

        cxn.prepare_cached(
            "INSERT INTO `folder_entry` (`folder_id`, `uid`, `message_id`) \
             VALUES (?, ?, ?)",
        )?
        .execute((entry.folder_id, entry.uid, entry.message_id))?;
    }

    Ok(())
}

pub fn entries(
    cxn: &rusqlite::Connection,
    folder: FolderId,
    uids: &UidSet,
) -> Result<Vec<FolderEntry>, Error> {
    require_folder(cxn, folder)?;

    let mut stmt = cxn.prepare_cached(
        "SELECT `uid`, `message_id` FROM `folder_entry` \
         WHERE `folder_id` = ? AND `uid` BETWEEN ? AND ? \
         ORDER BY `uid`",
    )?;

    let mut found = Vec::new();
    for (start, end) in uids.ranges() {
        for row in stmt.query_map(
            (folder, start, end),
            from_row::<(Uid, MessageId)>,
        )? {
            let (uid, message_id) = row?;
            found.push(FolderEntry {
                folder_id: folder,
                message_id,
                uid,
            });
        }
    }

    Ok(found)
}

pub fn entries_for_message(
    cxn: &rusqlite::Connection,
    message: MessageId,
) -> Result<Vec<FolderEntry>, Error> {
    let mut stmt = cxn.prepare_cached(
        "SELECT `folder_id`, `uid` FROM `folder_entry` \
         WHERE `message_id` = ? \
         ORDER BY `folder_id`, `uid`",
    )?;
    let found = stmt
        .query_map((message,), from_row::<(FolderId, Uid)>)?
        .map(|row| {
            row.map(|(folder_id, uid)| FolderEntry {
                folder_id,
                message_id: message,
                uid,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(found)
}

pub fn count_entries(
    cxn: &rusqlite::Connection,
    folder: FolderId,
    uids: &UidSet,
) -> Result<usize, Error> {
    require_folder(cxn, folder)?;

    let mut stmt = cxn.prepare_cached(
        "SELECT COUNT(*) FROM `folder_entry` \
         WHERE `folder_id` = ? AND `uid` BETWEEN ? AND ?",
    )?;
    let mut count = 0;
    for (start, end) in uids.ranges() {
        count += stmt.query_row((folder, start, end), from_single::<usize>)?;
    }
    Ok(count)
}

pub fn delete_entries(
    cxn: &rusqlite::Connection,
    folder: FolderId,
    uids: &UidSet,
) -> Result<Vec<FolderEntry>, Error> {
    let doomed = entries(cxn, folder, uids)?;

    let mut stmt = cxn.prepare_cached(
        "DELETE FROM `folder_entry` \
         WHERE `folder_id` = ? AND `uid` BETWEEN ? AND ?",
    )?;
    for (start, end) in uids.ranges() {
        stmt.execute((folder, start, end))?;
    }

    Ok(doomed)
}

pub fn replace_entries(
    cxn: &rusqlite::Connection,
    old: &[FolderEntry],
    new: &[FolderEntry],
) -> Result<(), Error> {
    for entry in old {
        let deleted = cxn
            .prepare_cached(
                "DELETE FROM `folder_entry` \
                 WHERE `folder_id` = ? AND `uid` = ? AND `message_id` = ?",
            )?
            .execute((entry.folder_id, entry.uid, entry.message_id))?;
        if 0 == deleted {
            return Err(Error::NxEntry);
        }
    }

    create_entries(cxn, new)
}
