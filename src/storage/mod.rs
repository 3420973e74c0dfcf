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

//! Persistence contracts consumed by the use cases, and their backends.
//!
//! The general guidelines are:
//!
//! 1. Every repository call is atomic unless otherwise noted.
//! 2. Every call checks its `Context` before touching storage and gives up
//!    promptly once it is cancelled.
//! 3. Backend failures that have a domain meaning (absence, uniqueness) are
//!    translated to the specific `Error` variant here; everything else is
//!    passed through as an internal error.
//! 4. The concept of a database transaction does not escape this module,
//!    except through `FolderRepo::folder_tx`.

use chrono::prelude::*;

use crate::model::{
    account::{Account, AccountOrder},
    changelog::{ChangeEntry, ChangeScope},
    entry::FolderEntry,
    filter::{FolderFilter, FolderOrder},
    folder::{DeletedFolder, Folder, RenamedFolder},
    id::{AccountId, FolderId, MessageId},
    message::{Flag, FlagChange, Message},
    uid::{UidBlock, UidSet},
};
use crate::support::{context::Context, error::Error};

pub mod auth;
pub mod blob;
pub mod memory;
pub mod sqlite;


pub trait AccountRepo {
    /// Fails with `AccountExists` if the name is taken.
    fn create_account(
        &self,
        ctx: &Context,
        account: &Account,
    ) -> Result<(), Error>;

    fn account_by_id(
        &self,
        ctx: &Context,
        id: AccountId,
    ) -> Result<Account, Error>;

    fn account_by_name(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<Account, Error>;

    /// Lists accounts created strictly after `created_after`, if given.
    fn list_accounts(
        &self,
        ctx: &Context,
        created_after: Option<DateTime<Utc>>,
        order: AccountOrder,
    ) -> Result<Vec<Account>, Error>;

    /// Deletes the account along with all of its folders and their entries.
    /// Messages themselves are untouched.
    fn delete_account(&self, ctx: &Context, id: AccountId) -> Result<(), Error>;
}

pub trait FolderRepo {
    fn folder_by_id(&self, ctx: &Context, id: FolderId)
        -> Result<Folder, Error>;

    fn folder_by_path(
        &self,
        ctx: &Context,
        account: AccountId,
        path: &str,
    ) -> Result<Folder, Error>;

    fn find_folders(
        &self,
        ctx: &Context,
        account: AccountId,
        filter: &FolderFilter,
        order: FolderOrder,
    ) -> Result<Vec<Folder>, Error>;

    fn count_folders(
        &self,
        ctx: &Context,
        account: AccountId,
        filter: &FolderFilter,
    ) -> Result<usize, Error>;

    /// Inserts `folder` as built by `Folder::new`.
    ///
    /// Fails with `NxFolder` if the parent does not exist, `ForeignParent` if
    /// it belongs to another account, and `FolderExists` if the path is
    /// taken.
    fn create_folder(&self, ctx: &Context, folder: &Folder)
        -> Result<(), Error>;

    /// Compare-and-swap of the folder's mutable fields (subscription, role,
    /// sort order, metadata).
    ///
    /// Succeeds only if the stored `updated_at` equals the caller's
    /// `observed_updated_at`, failing with `StaleFolder` otherwise and
    /// `NxFolder` if the folder no longer exists. On success, returns the
    /// folder as now stored, with a new `updated_at` strictly greater than
    /// the old one.
    fn update_folder(
        &self,
        ctx: &Context,
        folder: &Folder,
    ) -> Result<Folder, Error>;

    /// Deletes a single folder and its entries. Fails with
    /// `FolderHasChildren` if any folder has it as parent.
    fn delete_folder(&self, ctx: &Context, id: FolderId) -> Result<(), Error>;

    /// Relocates the folder `old_name` under `old_parent` to be `new_name`
    /// under `new_parent`, rewriting its path and those of all its
    /// descendants in one atomic step.
    ///
    /// Returns every folder touched, the moved folder first, then its
    /// descendants in path order.
    fn rename_move(
        &self,
        ctx: &Context,
        account: AccountId,
        old_parent: Option<FolderId>,
        new_parent: Option<FolderId>,
        old_name: &str,
        new_name: &str,
    ) -> Result<Vec<RenamedFolder>, Error>;

    /// Deletes `root` and every folder below it, with their entries,
    /// returning what was removed (root first, then in path order).
    fn delete_tree(
        &self,
        ctx: &Context,
        root: FolderId,
    ) -> Result<Vec<DeletedFolder>, Error>;

    /// Atomically reserves `n` consecutive UIDs from the folder's counter.
    fn next_uid(
        &self,
        ctx: &Context,
        folder: FolderId,
        n: u32,
    ) -> Result<UidBlock, Error>;

    /// Inserts entries. Fails with `DanglingEntry` if a message does not
    /// exist, `UidInUse` if a UID is taken, and `UnallocatedUid` if a UID was
    /// never reserved from its folder. Nothing is inserted on failure.
    fn create_entries(
        &self,
        ctx: &Context,
        entries: &[FolderEntry],
    ) -> Result<(), Error>;

    fn count_entries(
        &self,
        ctx: &Context,
        folder: FolderId,
        uids: &UidSet,
    ) -> Result<usize, Error>;

    /// Fetches the entries of `folder` whose UIDs are in `uids`, ascending by
    /// UID.
    fn entries(
        &self,
        ctx: &Context,
        folder: FolderId,
        uids: &UidSet,
    ) -> Result<Vec<FolderEntry>, Error>;

    /// Fetches every entry which files `message`, in any folder of any
    /// account, ordered by folder id and then UID.
    fn entries_for_message(
        &self,
        ctx: &Context,
        message: MessageId,
    ) -> Result<Vec<FolderEntry>, Error>;

    /// Deletes the entries of `folder` whose UIDs are in `uids`, returning
    /// those removed, ascending by UID.
    fn delete_entries(
        &self,
        ctx: &Context,
        folder: FolderId,
        uids: &UidSet,
    ) -> Result<Vec<FolderEntry>, Error>;

    /// Atomically removes `old` and inserts `new`.
    ///
    /// Fails with `NxEntry`, changing nothing, if any of `old` is not
    /// currently present exactly as given; `new` is checked as for
    /// `create_entries`.
    fn replace_entries(
        &self,
        ctx: &Context,
        old: &[FolderEntry],
        new: &[FolderEntry],
    ) -> Result<(), Error>;

    /// Runs `f` against a transactional view of this repository.
    ///
    /// If `f` fails, nothing it did is kept. In a read-only transaction,
    /// writes fail with `ReadOnlyTransaction`. Calling this on a view that is
    /// already transactional runs `f` in the enclosing transaction.
    fn folder_tx(
        &self,
        ctx: &Context,
        read_only: bool,
        f: &mut dyn FnMut(&dyn FolderRepo) -> Result<(), Error>,
    ) -> Result<(), Error>;
}

pub trait MessageRepo {
    /// Inserts all of `messages`, or none of them.
    fn create_messages(
        &self,
        ctx: &Context,
        messages: &[Message],
    ) -> Result<(), Error>;

    fn message_by_id(
        &self,
        ctx: &Context,
        id: MessageId,
    ) -> Result<Message, Error>;

    /// Fetches the given messages, in the order requested, silently skipping
    /// any that do not exist.
    fn messages_by_ids(
        &self,
        ctx: &Context,
        ids: &[MessageId],
    ) -> Result<Vec<Message>, Error>;

    /// Atomically applies `change` to the current flags of a message.
    ///
    /// Returns the new flags, or `None` if the change left them as they
    /// were, in which case `updated_at` is not bumped either.
    fn change_message_flags(
        &self,
        ctx: &Context,
        id: MessageId,
        change: &FlagChange,
    ) -> Result<Option<Vec<Flag>>, Error>;

    /// Hard-deletes messages and every folder entry referring to them. Parts
    /// no longer referenced by any message are removed too. Fails with
    /// `NxMessage`, deleting nothing, if any id does not exist.
    fn delete_messages(
        &self,
        ctx: &Context,
        ids: &[MessageId],
    ) -> Result<(), Error>;
}

pub trait ChangeLogRepo {
    /// Appends entries in order, stamping each with a fresh `at` strictly
    /// after that of every entry already in the log. The `at` the entries
    /// carry on the way in is ignored.
    fn append_changes(
        &self,
        ctx: &Context,
        changes: &[ChangeEntry],
    ) -> Result<(), Error>;

    /// Entries in `scope`, in append order (and so by timestamp), and only
    /// those strictly after `since` if given. At most `limit` are returned,
    /// if given.
    fn changes(
        &self,
        ctx: &Context,
        scope: ChangeScope,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<ChangeEntry>, Error>;

    /// The timestamp of the latest entry in `scope`, or the zero time if
    /// there is none.
    fn last_change_time(
        &self,
        ctx: &Context,
        scope: ChangeScope,
    ) -> Result<DateTime<Utc>, Error>;
}
