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

//! A complete backend kept entirely in memory.
//!
//! The folder hierarchy is an explicit arena: folder records indexed by id,
//! each with a parent back-reference and a set of children, plus a unique
//! (account, path) index. Subtree operations walk the tree rather than
//! scanning paths.
//!
//! All state sits behind one mutex, so every call is trivially atomic. A
//! folder transaction holds the mutex for its whole duration; the callback
//! must only use the transactional view it is given.

use std::cell::RefCell;
use std::sync::{Mutex, MutexGuard};

use chrono::prelude::*;

use self::state::State;
use super::{AccountRepo, ChangeLogRepo, FolderRepo, MessageRepo};
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

mod state;

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, ctx: &Context) -> Result<MutexGuard<'_, State>, Error> {
        ctx.check()?;
        self.state.lock().map_err(|_| Error::Poisoned)
    }
}

/// The view of a `MemoryStore` given to a folder transaction callback.
struct MemoryTx<'a> {
    state: RefCell<&'a mut State>,
    read_only: bool,
}

/// Uniform access to the state behind either a store or a transaction, so
/// that both share one `FolderRepo` implementation.
trait StateAccess {
    fn read<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&State) -> Result<R, Error>,
    ) -> Result<R, Error>;

    fn write<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&mut State) -> Result<R, Error>,
    ) -> Result<R, Error>;

    fn transaction(
        &self,
        ctx: &Context,
        read_only: bool,
        f: &mut dyn FnMut(&dyn FolderRepo) -> Result<(), Error>,
    ) -> Result<(), Error>;
}

impl StateAccess for MemoryStore {
    fn read<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&State) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let state = self.lock(ctx)?;
        f(&*state)
    }

    fn write<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&mut State) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut state = self.lock(ctx)?;
        f(&mut *state)
    }

    fn transaction(
        &self,
        ctx: &Context,
        read_only: bool,
        f: &mut dyn FnMut(&dyn FolderRepo) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let mut state = self.lock(ctx)?;
        let snapshot = (!read_only).then(|| state.tree.clone());
        let result = f(&MemoryTx {
            state: RefCell::new(&mut *state),
            read_only,
        });

        if let (Err(_), Some(snapshot)) = (&result, snapshot) {
            state.tree = snapshot;
        }
        result
    }
}

impl StateAccess for MemoryTx<'_> {
    fn read<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&State) -> Result<R, Error>,
    ) -> Result<R, Error> {
        ctx.check()?;
        let state = self.state.borrow();
        f(&**state)
    }

    fn write<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&mut State) -> Result<R, Error>,
    ) -> Result<R, Error> {
        ctx.check()?;
        if self.read_only {
            return Err(Error::ReadOnlyTransaction);
        }
        let mut state = self.state.borrow_mut();
        f(&mut **state)
    }

    fn transaction(
        &self,
        ctx: &Context,
        read_only: bool,
        f: &mut dyn FnMut(&dyn FolderRepo) -> Result<(), Error>,
    ) -> Result<(), Error> {
        ctx.check()?;
        if self.read_only && !read_only {
            return Err(Error::ReadOnlyTransaction);
        }
        f(self)
    }
}

impl<T: StateAccess> FolderRepo for T {
    fn folder_by_id(
        &self,
        ctx: &Context,
        id: FolderId,
    ) -> Result<Folder, Error> {
        self.read(ctx, |s| s.tree.folder_by_id(id))
    }

    fn folder_by_path(
        &self,
        ctx: &Context,
        account: AccountId,
        path: &str,
    ) -> Result<Folder, Error> {
        self.read(ctx, |s| s.tree.folder_by_path(account, path))
    }

    fn find_folders(
        &self,
        ctx: &Context,
        account: AccountId,
        filter: &FolderFilter,
        order: FolderOrder,
    ) -> Result<Vec<Folder>, Error> {
        self.read(ctx, |s| Ok(s.tree.find_folders(account, filter, order)))
    }

    fn count_folders(
        &self,
        ctx: &Context,
        account: AccountId,
        filter: &FolderFilter,
    ) -> Result<usize, Error> {
        self.read(ctx, |s| {
            Ok(s.tree
                .find_folders(account, filter, FolderOrder::default())
                .len())
        })
    }

    fn create_folder(
        &self,
        ctx: &Context,
        folder: &Folder,
    ) -> Result<(), Error> {
        self.write(ctx, |s| s.create_folder(folder))
    }

    fn update_folder(
        &self,
        ctx: &Context,
        folder: &Folder,
    ) -> Result<Folder, Error> {
        self.write(ctx, |s| s.tree.update_folder(folder))
    }

    fn delete_folder(&self, ctx: &Context, id: FolderId) -> Result<(), Error> {
        self.write(ctx, |s| s.tree.delete_folder(id))
    }

    fn rename_move(
        &self,
        ctx: &Context,
        account: AccountId,
        old_parent: Option<FolderId>,
        new_parent: Option<FolderId>,
        old_name: &str,
        new_name: &str,
    ) -> Result<Vec<RenamedFolder>, Error> {
        self.write(ctx, |s| {
            s.tree.rename_move(
                account, old_parent, new_parent, old_name, new_name,
            )
        })
    }

    fn delete_tree(
        &self,
        ctx: &Context,
        root: FolderId,
    ) -> Result<Vec<DeletedFolder>, Error> {
        self.write(ctx, |s| s.tree.delete_tree(root))
    }

    fn next_uid(
        &self,
        ctx: &Context,
        folder: FolderId,
        n: u32,
    ) -> Result<UidBlock, Error> {
        self.write(ctx, |s| s.tree.next_uid(folder, n))
    }

    fn create_entries(
        &self,
        ctx: &Context,
        entries: &[FolderEntry],
    ) -> Result<(), Error> {
        self.write(ctx, |s| s.create_entries(entries))
    }

    fn count_entries(
        &self,
        ctx: &Context,
        folder: FolderId,
        uids: &UidSet,
    ) -> Result<usize, Error> {
        self.read(ctx, |s| s.tree.entries(folder, uids).map(|e| e.len()))
    }

    fn entries(
        &self,
        ctx: &Context,
        folder: FolderId,
        uids: &UidSet,
    ) -> Result<Vec<FolderEntry>, Error> {
        self.read(ctx, |s| s.tree.entries(folder, uids))
    }

    fn entries_for_message(
        &self,
        ctx: &Context,
        message: MessageId,
    ) -> Result<Vec<FolderEntry>, Error> {
        self.read(ctx, |s| Ok(s.tree.entries_for_message(message)))
    }

    fn delete_entries(
        &self,
        ctx: &Context,
        folder: FolderId,
        uids: &UidSet,
    ) -> Result<Vec<FolderEntry>, Error> {
        self.write(ctx, |s| s.tree.delete_entries(folder, uids))
    }

    fn replace_entries(
        &self,
        ctx: &Context,
        old: &[FolderEntry],
        new: &[FolderEntry],
    ) -> Result<(), Error> {
        self.write(ctx, |s| s.replace_entries(old, new))
    }

    fn folder_tx(
        &self,
        ctx: &Context,
        read_only: bool,
        f: &mut dyn FnMut(&dyn FolderRepo) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.transaction(ctx, read_only, f)
    }
}

impl AccountRepo for MemoryStore {
    fn create_account(
        &self,
        ctx: &Context,
        account: &Account,
    ) -> Result<(), Error> {
        self.write(ctx, |s| s.create_account(account))
    }

    fn account_by_id(
        &self,
        ctx: &Context,
        id: AccountId,
    ) -> Result<Account, Error> {
        self.read(ctx, |s| s.account_by_id(id))
    }

    fn account_by_name(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<Account, Error> {
        self.read(ctx, |s| s.account_by_name(name))
    }

    fn list_accounts(
        &self,
        ctx: &Context,
        created_after: Option<DateTime<Utc>>,
        order: AccountOrder,
    ) -> Result<Vec<Account>, Error> {
        self.read(ctx, |s| Ok(s.list_accounts(created_after, order)))
    }

    fn delete_account(
        &self,
        ctx: &Context,
        id: AccountId,
    ) -> Result<(), Error> {
        self.write(ctx, |s| s.delete_account(id))
    }
}

impl MessageRepo for MemoryStore {
    fn create_messages(
        &self,
        ctx: &Context,
        messages: &[Message],
    ) -> Result<(), Error> {
        self.write(ctx, |s| {
            s.create_messages(messages);
            Ok(())
        })
    }

    fn message_by_id(
        &self,
        ctx: &Context,
        id: MessageId,
    ) -> Result<Message, Error> {
        self.read(ctx, |s| s.message_by_id(id))
    }

    fn messages_by_ids(
        &self,
        ctx: &Context,
        ids: &[MessageId],
    ) -> Result<Vec<Message>, Error> {
        self.read(ctx, |s| Ok(s.messages_by_ids(ids)))
    }

    fn change_message_flags(
        &self,
        ctx: &Context,
        id: MessageId,
        change: &FlagChange,
    ) -> Result<Option<Vec<Flag>>, Error> {
        self.write(ctx, |s| s.change_message_flags(id, change))
    }

    fn delete_messages(
        &self,
        ctx: &Context,
        ids: &[MessageId],
    ) -> Result<(), Error> {
        self.write(ctx, |s| s.delete_messages(ids))
    }
}

impl ChangeLogRepo for MemoryStore {
    fn append_changes(
        &self,
        ctx: &Context,
        changes: &[ChangeEntry],
    ) -> Result<(), Error> {
        self.write(ctx, |s| {
            s.append_changes(changes);
            Ok(())
        })
    }

    fn changes(
        &self,
        ctx: &Context,
        scope: ChangeScope,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<ChangeEntry>, Error> {
        self.read(ctx, |s| Ok(s.changes(scope, since, limit)))
    }

    fn last_change_time(
        &self,
        ctx: &Context,
        scope: ChangeScope,
    ) -> Result<DateTime<Utc>, Error> {
        self.read(ctx, |s| Ok(s.last_change_time(scope)))
    }
}
