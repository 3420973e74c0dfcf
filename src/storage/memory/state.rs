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

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::prelude::*;

use crate::model::{
    account::{Account, AccountOrder},
    changelog::{ChangeEntry, ChangeScope},
    entry::FolderEntry,
    filter::{FolderFilter, FolderOrder},
    folder::{join_path, rebase_path, DeletedFolder, Folder, RenamedFolder},
    id::{AccountId, FolderId, MessageId},
    message::{Flag, FlagChange, Message},
    uid::{Uid, UidBlock, UidSet},
};
use crate::support::{clock, error::Error, safe_name::check_folder_name};

/// Everything the in-memory backend holds.
#[derive(Default)]
pub(super) struct State {
    accounts: BTreeMap<AccountId, Account>,
    pub(super) tree: Tree,
    messages: HashMap<MessageId, Message>,
    /// In append order, which is also strictly increasing `at` order.
    changes: Vec<ChangeEntry>,
}

/// The folder arena and entries: the part of `State` a folder transaction
/// can modify, and therefore the part it snapshots.
#[derive(Clone, Default)]
pub(super) struct Tree {
    folders: HashMap<FolderId, FolderNode>,
    paths: BTreeMap<(AccountId, String), FolderId>,
    entries: HashMap<FolderId, BTreeMap<Uid, MessageId>>,
}

#[derive(Clone)]
struct FolderNode {
    folder: Folder,
    children: BTreeSet<FolderId>,
}

impl State {
    pub(super) fn create_account(
        &mut self,
        account: &Account,
    ) -> Result<(), Error> {
        if self.accounts.values().any(|a| a.name == account.name) {
            return Err(Error::AccountExists);
        }

        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    pub(super) fn account_by_id(
        &self,
        id: AccountId,
    ) -> Result<Account, Error> {
        self.accounts.get(&id).cloned().ok_or(Error::NxAccount)
    }

    pub(super) fn account_by_name(&self, name: &str) -> Result<Account, Error> {
        self.accounts
            .values()
            .find(|a| a.name == name)
            .cloned()
            .ok_or(Error::NxAccount)
    }

    pub(super) fn list_accounts(
        &self,
        created_after: Option<DateTime<Utc>>,
        order: AccountOrder,
    ) -> Vec<Account> {
        let mut accounts = self
            .accounts
            .values()
            .filter(|a| {
                created_after.map_or(true, |after| a.created_at > after)
            })
            .cloned()
            .collect::<Vec<_>>();
        accounts.sort_by(|a, b| order.compare(a, b));
        accounts
    }

    pub(super) fn delete_account(
        &mut self,
        id: AccountId,
    ) -> Result<(), Error> {
        self.accounts.remove(&id).ok_or(Error::NxAccount)?;
        let doomed = self
            .tree
            .paths
            .range((id, String::new())..)
            .take_while(|&(&(account, _), _)| account == id)
            .map(|(_, &folder)| folder)
            .collect::<Vec<_>>();
        for folder in doomed {
            self.tree.remove(folder);
        }
        Ok(())
    }

    pub(super) fn create_entries(
        &mut self,
        entries: &[FolderEntry],
    ) -> Result<(), Error> {
        self.check_new_entries(entries, &HashSet::new())?;
        self.tree.insert_entries(entries);
        Ok(())
    }

    pub(super) fn replace_entries(
        &mut self,
        old: &[FolderEntry],
        new: &[FolderEntry],
    ) -> Result<(), Error> {
        for entry in old {
            let present = self
                .tree
                .entries
                .get(&entry.folder_id)
                .and_then(|e| e.get(&entry.uid));
            if present != Some(&entry.message_id) {
                return Err(Error::NxEntry);
            }
        }

        let freed = old
            .iter()
            .map(|e| (e.folder_id, e.uid))
            .collect::<HashSet<_>>();
        self.check_new_entries(new, &freed)?;

        for entry in old {
            if let Some(entries) = self.tree.entries.get_mut(&entry.folder_id) {
                entries.remove(&entry.uid);
            }
        }
        self.tree.insert_entries(new);
        Ok(())
    }

    /// Validates `entries` for insertion, treating the UIDs in `freed` as
    /// available even if currently in use.
    fn check_new_entries(
        &self,
        entries: &[FolderEntry],
        freed: &HashSet<(FolderId, Uid)>,
    ) -> Result<(), Error> {
        let mut claimed = HashSet::with_capacity(entries.len());
        for entry in entries {
            let node = self.tree.node(entry.folder_id)?;
            if !self.messages.contains_key(&entry.message_id) {
                return Err(Error::DanglingEntry);
            }
            if entry.uid >= node.folder.uid_next {
                return Err(Error::UnallocatedUid);
            }

            let key = (entry.folder_id, entry.uid);
            let in_use = self
                .tree
                .entries
                .get(&entry.folder_id)
                .is_some_and(|e| e.contains_key(&entry.uid))
                && !freed.contains(&key);
            if in_use || !claimed.insert(key) {
                return Err(Error::UidInUse);
            }
        }

        Ok(())
    }

    pub(super) fn create_messages(&mut self, messages: &[Message]) {
        for message in messages {
            self.messages.insert(message.id, message.clone());
        }
    }

    pub(super) fn message_by_id(
        &self,
        id: MessageId,
    ) -> Result<Message, Error> {
        self.messages.get(&id).cloned().ok_or(Error::NxMessage)
    }

    pub(super) fn messages_by_ids(&self, ids: &[MessageId]) -> Vec<Message> {
        ids.iter()
            .filter_map(|id| self.messages.get(id))
            .cloned()
            .collect()
    }

    pub(super) fn change_message_flags(
        &mut self,
        id: MessageId,
        change: &FlagChange,
    ) -> Result<Option<Vec<Flag>>, Error> {
        let message = self.messages.get_mut(&id).ok_or(Error::NxMessage)?;
        let flags = change.apply(&message.flags);
        if flags == message.flags {
            return Ok(None);
        }

        message.flags = flags.clone();
        message.updated_at = clock::now_after(message.updated_at);
        Ok(Some(flags))
    }

    pub(super) fn delete_messages(
        &mut self,
        ids: &[MessageId],
    ) -> Result<(), Error> {
        if !ids.iter().all(|id| self.messages.contains_key(id)) {
            return Err(Error::NxMessage);
        }

        let ids = ids.iter().copied().collect::<HashSet<_>>();
        self.messages.retain(|id, _| !ids.contains(id));
        for entries in self.tree.entries.values_mut() {
            entries.retain(|_, message| !ids.contains(message));
        }
        Ok(())
    }

    pub(super) fn append_changes(&mut self, changes: &[ChangeEntry]) {
        for change in changes {
            let at = self
                .changes
                .last()
                .map_or_else(clock::now, |last| clock::now_after(last.at));
            self.changes.push(ChangeEntry {
                at,
                ..change.clone()
            });
        }
    }

    pub(super) fn changes(
        &self,
        scope: ChangeScope,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Vec<ChangeEntry> {
        let start = since.map_or(0, |since| {
            self.changes.partition_point(|c| c.at <= since)
        });
        self.changes[start..]
            .iter()
            .filter(|c| c.is_in(scope))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub(super) fn last_change_time(&self, scope: ChangeScope) -> DateTime<Utc> {
        self.changes
            .iter()
            .rev()
            .find(|c| c.is_in(scope))
            .map_or_else(clock::zero, |c| c.at)
    }

    pub(super) fn create_folder(
        &mut self,
        folder: &Folder,
    ) -> Result<(), Error> {
        if !self.accounts.contains_key(&folder.account_id) {
            return Err(Error::NxAccount);
        }
        self.tree.create_folder(folder)
    }
}

impl Tree {
    fn node(&self, id: FolderId) -> Result<&FolderNode, Error> {
        self.folders.get(&id).ok_or(Error::NxFolder)
    }

    fn node_mut(&mut self, id: FolderId) -> Result<&mut FolderNode, Error> {
        self.folders.get_mut(&id).ok_or(Error::NxFolder)
    }

    /// Resolves an optional parent to its path, checking it belongs to
    /// `account`.
    fn parent_path(
        &self,
        account: AccountId,
        parent: Option<FolderId>,
    ) -> Result<Option<&str>, Error> {
        let Some(parent) = parent else {
            return Ok(None);
        };

        let parent = &self.node(parent)?.folder;
        if parent.account_id != account {
            return Err(Error::ForeignParent);
        }
        Ok(Some(&parent.path))
    }

    pub(super) fn folder_by_id(&self, id: FolderId) -> Result<Folder, Error> {
        self.node(id).map(|n| n.folder.clone())
    }

    pub(super) fn folder_by_path(
        &self,
        account: AccountId,
        path: &str,
    ) -> Result<Folder, Error> {
        let id = self
            .paths
            .get(&(account, path.to_owned()))
            .ok_or(Error::NxFolder)?;
        self.folder_by_id(*id)
    }

    pub(super) fn find_folders(
        &self,
        account: AccountId,
        filter: &FolderFilter,
        order: FolderOrder,
    ) -> Vec<Folder> {
        let candidates: BTreeSet<FolderId> = match filter.path_hints() {
            Some(hints) => hints
                .into_iter()
                .flat_map(|hint| {
                    self.paths
                        .range((account, hint.clone())..)
                        .take_while(move |&(&(a, ref path), _)| {
                            a == account && path.starts_with(&hint)
                        })
                        .map(|(_, &id)| id)
                })
                .collect(),
            None => self
                .paths
                .range((account, String::new())..)
                .take_while(|&(&(a, _), _)| a == account)
                .map(|(_, &id)| id)
                .collect(),
        };

        let mut folders = candidates
            .into_iter()
            .filter_map(|id| self.folders.get(&id))
            .map(|n| &n.folder)
            .filter(|f| filter.matches(f))
            .cloned()
            .collect::<Vec<_>>();
        order.sort(&mut folders);
        folders
    }

    pub(super) fn create_folder(
        &mut self,
        folder: &Folder,
    ) -> Result<(), Error> {
        let parent_path =
            self.parent_path(folder.account_id, folder.parent_id)?;
        if folder.path != join_path(parent_path, &folder.name) {
            return Err(Error::invalid(
                "folder path",
                format!("{:?} does not match its parent and name", folder.path),
            ));
        }

        let key = (folder.account_id, folder.path.clone());
        if self.paths.contains_key(&key) {
            return Err(Error::FolderExists);
        }

        if let Some(parent) = folder.parent_id {
            self.node_mut(parent)?.children.insert(folder.id);
        }
        self.paths.insert(key, folder.id);
        self.entries.insert(folder.id, BTreeMap::new());
        let mut folder = folder.clone();
        folder.observed_updated_at = folder.updated_at;
        self.folders.insert(
            folder.id,
            FolderNode {
                folder,
                children: BTreeSet::new(),
            },
        );
        Ok(())
    }

    pub(super) fn update_folder(
        &mut self,
        folder: &Folder,
    ) -> Result<Folder, Error> {
        let stored = &mut self.node_mut(folder.id)?.folder;
        if stored.updated_at != folder.observed_updated_at {
            return Err(Error::StaleFolder);
        }

        stored.subscribed = folder.subscribed;
        stored.role = folder.role;
        stored.sort_order = folder.sort_order;
        stored.metadata = folder.metadata.clone();
        stored.updated_at = folder
            .updated_at
            .max(stored.updated_at + chrono::Duration::microseconds(1));
        stored.observed_updated_at = stored.updated_at;
        Ok(stored.clone())
    }

    pub(super) fn delete_folder(&mut self, id: FolderId) -> Result<(), Error> {
        if !self.node(id)?.children.is_empty() {
            return Err(Error::FolderHasChildren);
        }

        self.remove(id);
        Ok(())
    }

    pub(super) fn rename_move(
        &mut self,
        account: AccountId,
        old_parent: Option<FolderId>,
        new_parent: Option<FolderId>,
        old_name: &str,
        new_name: &str,
    ) -> Result<Vec<RenamedFolder>, Error> {
        check_folder_name(new_name)?;
        let old_path =
            join_path(self.parent_path(account, old_parent)?, old_name);
        let new_path =
            join_path(self.parent_path(account, new_parent)?, new_name);
        let root = *self
            .paths
            .get(&(account, old_path.clone()))
            .ok_or(Error::NxFolder)?;

        if old_path == new_path {
            return Ok(vec![]);
        }
        if new_parent.is_some_and(|p| p == root || self.is_below(p, root)) {
            return Err(Error::RenameIntoSelf);
        }
        if self.paths.contains_key(&(account, new_path.clone())) {
            return Err(Error::FolderExists);
        }

        let subtree = self.subtree(root);
        let mut renamed = Vec::with_capacity(subtree.len());
        for &id in &subtree {
            let old = self.paths_key(id);
            self.paths.remove(&(account, old.clone()));
            renamed.push(RenamedFolder {
                id,
                new_path: rebase_path(&old, &old_path, &new_path),
                old_path: old,
            });
        }
        for r in &renamed {
            self.paths.insert((account, r.new_path.clone()), r.id);
            if let Some(node) = self.folders.get_mut(&r.id) {
                node.folder.path = r.new_path.clone();
            }
        }

        if let Some(parent) = old_parent {
            self.node_mut(parent)?.children.remove(&root);
        }
        if let Some(parent) = new_parent {
            self.node_mut(parent)?.children.insert(root);
        }
        let moved = &mut self.node_mut(root)?.folder;
        moved.parent_id = new_parent;
        moved.name = new_name.to_owned();
        moved.updated_at = clock::now_after(moved.updated_at);
        moved.observed_updated_at = moved.updated_at;

        Ok(renamed)
    }

    pub(super) fn delete_tree(
        &mut self,
        root: FolderId,
    ) -> Result<Vec<DeletedFolder>, Error> {
        self.node(root)?;
        let deleted = self
            .subtree(root)
            .into_iter()
            .map(|id| DeletedFolder {
                id,
                path: self.paths_key(id),
            })
            .collect::<Vec<_>>();

        // Children first so that every removal sees a leaf
        for d in deleted.iter().rev() {
            self.remove(d.id);
        }
        Ok(deleted)
    }

    pub(super) fn next_uid(
        &mut self,
        id: FolderId,
        n: u32,
    ) -> Result<UidBlock, Error> {
        let folder = &mut self.node_mut(id)?.folder;
        let (block, uid_next) = UidBlock::reserve(folder.uid_next, n)?;
        folder.uid_next = uid_next;
        Ok(block)
    }

    pub(super) fn entries(
        &self,
        folder: FolderId,
        uids: &UidSet,
    ) -> Result<Vec<FolderEntry>, Error> {
        self.node(folder)?;
        let Some(entries) = self.entries.get(&folder) else {
            return Ok(vec![]);
        };

        let mut found = Vec::new();
        for (start, end) in uids.ranges() {
            found.extend(entries.range(start..=end).map(|(&uid, &message_id)| {
                FolderEntry {
                    folder_id: folder,
                    message_id,
                    uid,
                }
            }));
        }
        Ok(found)
    }

    pub(super) fn entries_for_message(
        &self,
        message: MessageId,
    ) -> Vec<FolderEntry> {
        let mut found = self
            .entries
            .iter()
            .flat_map(|(&folder_id, entries)| {
                entries
                    .iter()
                    .filter(move |&(_, &id)| id == message)
                    .map(move |(&uid, &message_id)| FolderEntry {
                        folder_id,
                        message_id,
                        uid,
                    })
            })
            .collect::<Vec<_>>();
        found.sort_by_key(|e| (e.folder_id, e.uid));
        found
    }

    pub(super) fn delete_entries(
        &mut self,
        folder: FolderId,
        uids: &UidSet,
    ) -> Result<Vec<FolderEntry>, Error> {
        let doomed = self.entries(folder, uids)?;
        if let Some(entries) = self.entries.get_mut(&folder) {
            for entry in &doomed {
                entries.remove(&entry.uid);
            }
        }
        Ok(doomed)
    }

    fn insert_entries(&mut self, entries: &[FolderEntry]) {
        for entry in entries {
            self.entries
                .entry(entry.folder_id)
                .or_default()
                .insert(entry.uid, entry.message_id);
        }
    }

    fn paths_key(&self, id: FolderId) -> String {
        self.folders
            .get(&id)
            .map(|n| n.folder.path.clone())
            .unwrap_or_default()
    }

    /// Whether `id` lies strictly below `ancestor`, by walking parent links.
    fn is_below(&self, id: FolderId, ancestor: FolderId) -> bool {
        let mut cursor = self.folders.get(&id).and_then(|n| n.folder.parent_id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor =
                self.folders.get(&current).and_then(|n| n.folder.parent_id);
        }
        false
    }

    /// `root` followed by all its descendants in path order.
    fn subtree(&self, root: FolderId) -> Vec<FolderId> {
        let mut below = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.folders.get(&id) {
                stack.extend(node.children.iter().copied());
                if id != root {
                    below.push((node.folder.path.as_str(), id));
                }
            }
        }
        below.sort_unstable();

        let mut all = Vec::with_capacity(below.len() + 1);
        all.push(root);
        all.extend(below.into_iter().map(|(_, id)| id));
        all
    }

    /// Unlinks a single folder and its entries, ignoring children.
    fn remove(&mut self, id: FolderId) {
        let Some(node) = self.folders.remove(&id) else {
            return;
        };

        self.paths
            .remove(&(node.folder.account_id, node.folder.path.clone()));
        self.entries.remove(&id);
        if let Some(parent) = node
            .folder
            .parent_id
            .and_then(|p| self.folders.get_mut(&p))
        {
            parent.children.remove(&id);
        }
    }
}
