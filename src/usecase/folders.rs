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

use log::{debug, info, warn};

use super::defs::*;
use crate::model::{
    account::Account,
    changelog::{ChangeEntry, ChangeType},
    filter::FolderFilter,
    folder::{
        is_strictly_below, join_path, DeletedFolder, Folder, RenamedFolder,
        Role,
    },
    id::{AccountId, FolderId},
    message::Flag,
    tree::sort_as_tree,
    uid::UidSet,
};
use crate::storage::FolderRepo;
use crate::support::{
    context::Context, error::Error, safe_name::split_folder_path,
};

impl Depot {
    /// Looks a folder up by path.
    pub fn folder(
        &self,
        ctx: &Context,
        account: &Account,
        path: &str,
    ) -> Result<Folder, Error> {
        self.repos.folders.folder_by_path(ctx, account.id, path)
    }

    /// Creates the folder at `path`, along with any of its ancestors that do
    /// not exist yet. `role` applies only to the folder at `path` itself.
    pub fn create_folder(
        &self,
        ctx: &Context,
        account: &Account,
        path: &str,
        role: Option<Role>,
    ) -> Result<Folder, Error> {
        let components = split_folder_path(path)?;
        let Some((name, ancestors)) = components.split_last() else {
            return Err(Error::invalid("folder path", "empty path"));
        };

        let mut changes = Vec::new();
        let folder = self.in_folder_tx(ctx, |tx| {
            changes.clear();
            let parent =
                ensure_path(tx, ctx, account.id, ancestors, &mut changes)?;
            let folder = Folder::new(parent.as_ref(), account.id, name, role)?;
            tx.create_folder(ctx, &folder)?;
            changes.push(created(&folder));
            Ok(folder)
        })?;

        info!(
            "{} Created folder {:?} ({})",
            self.log_prefix, folder.path, folder.id,
        );
        self.record(ctx, &changes)?;
        Ok(folder)
    }

    /// Renames or moves the folder at `old_path` to `new_path`, carrying its
    /// descendants along. Missing ancestors of `new_path` are created.
    ///
    /// Returns every folder whose path changed, the renamed folder first.
    /// Renaming a folder to its current path does nothing.
    pub fn rename_folder(
        &self,
        ctx: &Context,
        account: &Account,
        old_path: &str,
        new_path: &str,
    ) -> Result<Vec<RenamedFolder>, Error> {
        let components = split_folder_path(new_path)?;
        let Some((new_name, new_ancestors)) = components.split_last() else {
            return Err(Error::invalid("folder path", "empty path"));
        };

        if old_path == new_path {
            return Ok(vec![]);
        }
        if is_strictly_below(new_path, old_path) {
            return Err(Error::RenameIntoSelf);
        }

        let mut changes = Vec::new();
        let renamed = self.in_folder_tx(ctx, |tx| {
            changes.clear();
            let source = tx.folder_by_path(ctx, account.id, old_path)?;
            let new_parent = ensure_path(
                tx,
                ctx,
                account.id,
                new_ancestors,
                &mut changes,
            )?;
            tx.rename_move(
                ctx,
                account.id,
                source.parent_id,
                new_parent.map(|p| p.id),
                &source.name,
                new_name,
            )
        })?;

        info!(
            "{} Renamed folder {old_path:?} to {new_path:?} \
             ({} folder(s) affected)",
            self.log_prefix,
            renamed.len(),
        );
        changes.extend(renamed.iter().map(|r| {
            ChangeEntry::folder(
                ChangeType::FolderRenamed,
                account.id,
                r.id,
                Some(r.old_path.as_str()),
                Some(r.new_path.as_str()),
            )
        }));
        self.record(ctx, &changes)?;
        Ok(renamed)
    }

    /// Deletes the folder at `path`.
    ///
    /// Without `recursive`, this fails with `FolderHasChildren` if the folder
    /// has any children; with it, the children are deleted too. Messages
    /// filed in deleted folders are not themselves deleted.
    pub fn delete_folder(
        &self,
        ctx: &Context,
        account: &Account,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<DeletedFolder>, Error> {
        let deleted = self.in_folder_tx(ctx, |tx| {
            let folder = tx.folder_by_path(ctx, account.id, path)?;
            if recursive {
                tx.delete_tree(ctx, folder.id)
            } else {
                tx.delete_folder(ctx, folder.id)?;
                Ok(vec![DeletedFolder {
                    id: folder.id,
                    path: folder.path,
                }])
            }
        })?;

        info!(
            "{} Deleted folder {path:?} ({} folder(s) removed)",
            self.log_prefix,
            deleted.len(),
        );
        let changes = deleted
            .iter()
            .map(|d| {
                ChangeEntry::folder(
                    ChangeType::FolderDeleted,
                    account.id,
                    d.id,
                    Some(d.path.as_str()),
                    None,
                )
            })
            .collect::<Vec<_>>();
        self.record(ctx, &changes)?;
        Ok(deleted)
    }

    /// Writes the mutable fields of `folder` back to storage.
    ///
    /// `folder` must have been read from this depot; if it has been modified
    /// since, this fails with `StaleFolder` and the caller should re-read and
    /// try again.
    pub fn update_folder(
        &self,
        ctx: &Context,
        account: &Account,
        folder: &Folder,
    ) -> Result<Folder, Error> {
        if folder.account_id != account.id {
            return Err(Error::NxFolder);
        }

        let updated = match self.repos.folders.update_folder(ctx, folder) {
            Ok(updated) => updated,
            Err(Error::StaleFolder) => {
                warn!(
                    "{} Rejected stale update to {:?}",
                    self.log_prefix, folder.path,
                );
                return Err(Error::StaleFolder);
            },
            Err(e) => return Err(e),
        };

        debug!("{} Updated folder {:?}", self.log_prefix, updated.path);
        self.record(
            ctx,
            &[ChangeEntry::folder(
                ChangeType::FolderUpdated,
                account.id,
                updated.id,
                Some(updated.path.as_str()),
                Some(updated.path.as_str()),
            )],
        )?;
        Ok(updated)
    }

    pub fn subscribe(
        &self,
        ctx: &Context,
        account: &Account,
        path: &str,
    ) -> Result<Folder, Error> {
        self.modify_folder(ctx, account, path, |f| f.set_subscribed(true))
    }

    pub fn unsubscribe(
        &self,
        ctx: &Context,
        account: &Account,
        path: &str,
    ) -> Result<Folder, Error> {
        self.modify_folder(ctx, account, path, |f| f.set_subscribed(false))
    }

    pub fn set_role(
        &self,
        ctx: &Context,
        account: &Account,
        path: &str,
        role: Option<Role>,
    ) -> Result<Folder, Error> {
        self.modify_folder(ctx, account, path, |f| f.set_role(role))
    }

    pub fn set_sort_order(
        &self,
        ctx: &Context,
        account: &Account,
        path: &str,
        sort_order: u32,
    ) -> Result<Folder, Error> {
        self.modify_folder(ctx, account, path, |f| {
            f.set_sort_order(sort_order)
        })
    }

    /// One read-modify-write round through `update_folder`. Losing a race
    /// with another writer fails with `StaleFolder`; nothing is retried.
    fn modify_folder(
        &self,
        ctx: &Context,
        account: &Account,
        path: &str,
        modify: impl FnOnce(&mut Folder),
    ) -> Result<Folder, Error> {
        let mut folder = self.folder(ctx, account, path)?;
        modify(&mut folder);
        self.update_folder(ctx, account, &folder)
    }

    /// Returns the folder at `path` together with its message statistics.
    pub fn folder_status(
        &self,
        ctx: &Context,
        account: &Account,
        path: &str,
    ) -> Result<(Folder, FolderStats), Error> {
        let folder = self.folder(ctx, account, path)?;
        let stats = self.stats(ctx, folder.id)?;
        Ok((folder, stats))
    }

    fn stats(
        &self,
        ctx: &Context,
        folder: FolderId,
    ) -> Result<FolderStats, Error> {
        let entries = self.repos.folders.entries(ctx, folder, &UidSet::all())?;
        let messages = self.load_messages(ctx, &entries)?;

        let mut stats = FolderStats::default();
        // Entries whose message has just been deleted are skipped.
        let filed = entries.iter().filter_map(|e| messages.get(&e.message_id));
        for message in filed {
            stats.messages += 1;
            if !message.has_flag(&Flag::Seen) {
                stats.unseen += 1;
            }
            if message.has_flag(&Flag::Deleted) {
                stats.deleted += 1;
            }
            stats.size += message.size();
        }

        Ok(stats)
    }

    /// Lists the folders of `account` matching `request.filter`.
    pub fn list_folders(
        &self,
        ctx: &Context,
        account: &Account,
        request: &ListRequest,
    ) -> Result<Vec<FolderListing>, Error> {
        let folders = self.repos.folders.find_folders(
            ctx,
            account.id,
            &request.filter,
            request.order,
        )?;
        debug!(
            "{} Listing matched {} folder(s)",
            self.log_prefix,
            folders.len(),
        );

        let options = request.options;
        let mut listings = Vec::with_capacity(folders.len());
        for folder in &folders {
            let has_matching_descendants = options.descendant_matches.then(|| {
                folders
                    .iter()
                    .any(|other| is_strictly_below(&other.path, &folder.path))
            });

            let has_children = if options.children {
                let children = FolderFilter::all().parent(Some(folder.id));
                Some(
                    0 != self
                        .repos
                        .folders
                        .count_folders(ctx, account.id, &children)?,
                )
            } else {
                None
            };

            let stats = if options.stats {
                Some(self.stats(ctx, folder.id)?)
            } else {
                None
            };

            listings.push(FolderListing {
                folder: folder.clone(),
                has_matching_descendants,
                has_children,
                stats,
            });
        }

        if options.tree {
            listings = sort_as_tree(listings);
        }
        Ok(listings)
    }
}

/// Walks `names` down from the root, creating each folder that does not
/// exist yet, and returns the last one (`None` if `names` is empty).
fn ensure_path(
    tx: &dyn FolderRepo,
    ctx: &Context,
    account: AccountId,
    names: &[&str],
    changes: &mut Vec<ChangeEntry>,
) -> Result<Option<Folder>, Error> {
    let mut parent = None::<Folder>;
    for &name in names {
        let path = join_path(parent.as_ref().map(|p| p.path.as_str()), name);
        let folder = match tx.folder_by_path(ctx, account, &path) {
            Ok(folder) => folder,
            Err(Error::NxFolder) => {
                let folder = Folder::new(parent.as_ref(), account, name, None)?;
                tx.create_folder(ctx, &folder)?;
                changes.push(created(&folder));
                folder
            },
            Err(e) => return Err(e),
        };
        parent = Some(folder);
    }

    Ok(parent)
}

fn created(folder: &Folder) -> ChangeEntry {
    ChangeEntry::folder(
        ChangeType::FolderCreated,
        folder.account_id,
        folder.id,
        None,
        Some(folder.path.as_str()),
    )
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use rayon::prelude::*;

    use super::*;
    use crate::model::{
        changelog::ChangeScope, filter::FolderOrder, message::FlagChange,
    };

    fn change_types(
        fixture: &TestFixture,
        folder: FolderId,
    ) -> Vec<ChangeType> {
        fixture
            .depot
            .repos
            .changes
            .changes(&fixture.ctx, ChangeScope::Folder(folder), None, None)
            .unwrap()
            .into_iter()
            .map(|c| c.change_type)
            .collect()
    }

    #[test]
    fn create_makes_missing_ancestors() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;

        let leaf = depot
            .create_folder(ctx, &fixture.alice, "a/b/c", Some(Role::Archive))
            .unwrap();
        assert_eq!("a/b/c", leaf.path);
        assert_eq!(Some(Role::Archive), leaf.role);
        assert_eq!(vec!["a", "a/b", "a/b/c"], fixture.paths());

        let b = fixture.folder("a/b");
        assert_eq!(Some(b.id), leaf.parent_id);
        assert_eq!(None, b.role);
        assert_eq!(
            vec![ChangeType::FolderCreated],
            change_types(&fixture, b.id),
        );

        // Existing ancestors are reused
        fixture.mkdir("a/d");
        assert_eq!(
            Some(fixture.folder("a").id),
            fixture.folder("a/d").parent_id,
        );

        assert_matches!(
            Err(Error::FolderExists),
            depot.create_folder(ctx, &fixture.alice, "a/b", None),
        );
        for bad in ["", "a//b", "/a", "a/", "a/*", "a/../b"] {
            assert_matches!(
                Err(Error::Invalid { .. }),
                depot.create_folder(ctx, &fixture.alice, bad, None),
            );
        }
        assert_eq!(vec!["a", "a/b", "a/b/c", "a/d"], fixture.paths());
    }

    #[test]
    fn rename_carries_descendants() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;

        let work = fixture.mkdir("Work");
        let reports = fixture.mkdir("Work/Reports");
        assert_eq!(Some(work.id), reports.parent_id);

        let renamed = depot
            .rename_folder(ctx, &fixture.alice, "Work", "Projects")
            .unwrap();
        assert!(renamed.contains(&RenamedFolder {
            id: work.id,
            old_path: "Work".to_owned(),
            new_path: "Projects".to_owned(),
        }));
        assert!(renamed.contains(&RenamedFolder {
            id: reports.id,
            old_path: "Work/Reports".to_owned(),
            new_path: "Projects/Reports".to_owned(),
        }));
        assert_eq!(vec!["Projects", "Projects/Reports"], fixture.paths());
        assert_eq!(
            vec![ChangeType::FolderCreated, ChangeType::FolderRenamed],
            change_types(&fixture, reports.id),
        );
    }

    #[test]
    fn rename_moves_into_new_hierarchy() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;

        fixture.mkdir("Work/Reports");
        fixture.mkdir("Home");

        // Work2 is a sibling of Work, not a descendant
        depot.rename_folder(ctx, alice, "Work", "Work2/Old").unwrap();
        assert_eq!(
            vec!["Home", "Work2", "Work2/Old", "Work2/Old/Reports"],
            fixture.paths(),
        );

        assert!(depot
            .rename_folder(ctx, alice, "Home", "Home")
            .unwrap()
            .is_empty());
        assert_matches!(
            Err(Error::RenameIntoSelf),
            depot.rename_folder(ctx, alice, "Work2", "Work2/Old/Reports/X"),
        );
        assert_matches!(
            Err(Error::FolderExists),
            depot.rename_folder(ctx, alice, "Home", "Work2/Old"),
        );
        assert_matches!(
            Err(Error::NxFolder),
            depot.rename_folder(ctx, alice, "Nowhere", "Somewhere/Else"),
        );
        // Nothing was left behind by the failed attempt
        assert_eq!(
            vec!["Home", "Work2", "Work2/Old", "Work2/Old/Reports"],
            fixture.paths(),
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            depot.rename_folder(ctx, alice, "Home", "Ho%me"),
        );
    }

    #[test]
    fn delete_single_or_recursive() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;

        let work = fixture.mkdir("Work");
        fixture.mkdir("Work/A/B");
        fixture.mkdir("Work2");
        fixture.append("Work/A", "filed");

        assert_matches!(
            Err(Error::FolderHasChildren),
            depot.delete_folder(ctx, alice, "Work", false),
        );
        let deleted =
            depot.delete_folder(ctx, alice, "Work/A/B", false).unwrap();
        assert_eq!(1, deleted.len());
        assert_eq!("Work/A/B", deleted[0].path);

        let deleted = depot.delete_folder(ctx, alice, "Work", true).unwrap();
        assert_eq!(
            vec!["Work", "Work/A"],
            deleted.iter().map(|d| d.path.as_str()).collect::<Vec<_>>(),
        );
        assert_eq!(vec!["Work2"], fixture.paths());
        assert_eq!(
            vec![ChangeType::FolderCreated, ChangeType::FolderDeleted],
            change_types(&fixture, work.id),
        );
        assert_matches!(
            Err(Error::NxFolder),
            depot.delete_folder(ctx, alice, "Work", true),
        );
    }

    #[test]
    fn setters_and_stale_updates() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;

        let inbox = fixture.mkdir("INBOX");
        assert!(depot.subscribe(ctx, alice, "INBOX").unwrap().subscribed);
        depot.set_role(ctx, alice, "INBOX", Some(Role::Inbox)).unwrap();
        let folder = depot.set_sort_order(ctx, alice, "INBOX", 3).unwrap();
        assert!(folder.subscribed);
        assert_eq!(Some(Role::Inbox), folder.role);
        assert_eq!(3, folder.sort_order);
        assert!(!depot.unsubscribe(ctx, alice, "INBOX").unwrap().subscribed);

        // `inbox` was read before all of the above
        let mut stale = inbox.clone();
        stale.set_metadata("colour", "red");
        assert_matches!(
            Err(Error::StaleFolder),
            depot.update_folder(ctx, alice, &stale),
        );
        assert_eq!(None, fixture.folder("INBOX").metadata.get("colour"));

        let bob = depot.create_account(ctx, "bob").unwrap();
        assert_matches!(
            Err(Error::NxFolder),
            depot.update_folder(ctx, &bob, &fixture.folder("INBOX")),
        );

        assert_eq!(
            vec![ChangeType::FolderCreated]
                .into_iter()
                .chain([ChangeType::FolderUpdated; 4])
                .collect::<Vec<_>>(),
            change_types(&fixture, inbox.id),
        );
    }

    #[test]
    fn concurrent_updates_from_one_snapshot() {
        let fixture = TestFixture::new();
        let snapshot = fixture.mkdir("INBOX");

        let results = (0..8u32)
            .into_par_iter()
            .map(|n| {
                let mut folder = snapshot.clone();
                folder.set_sort_order(n);
                fixture.depot.update_folder(
                    &fixture.ctx,
                    &fixture.alice,
                    &folder,
                )
            })
            .collect::<Vec<_>>();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(1, winners);
        assert!(results
            .iter()
            .all(|r| matches!(r, Ok(_) | Err(Error::StaleFolder))));
        assert_eq!(
            vec![ChangeType::FolderCreated, ChangeType::FolderUpdated],
            change_types(&fixture, snapshot.id),
        );
    }

    #[test]
    fn list_with_options() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;

        fixture.mkdir("b/x");
        fixture.mkdir("a/y");
        fixture.mkdir("a/z/deep");
        depot.set_sort_order(ctx, alice, "a", 1).unwrap();
        depot.set_sort_order(ctx, alice, "b", 2).unwrap();
        depot.subscribe(ctx, alice, "a/z/deep").unwrap();
        depot.subscribe(ctx, alice, "a").unwrap();

        fixture.append("a/y", "one");
        fixture.append("a/y", "two");
        let (seen, _) = depot
            .fetch(ctx, alice, fixture.folder("a/y").id, &UidSet::all())
            .unwrap()
            .remove(0);
        depot
            .store_flags(
                ctx,
                alice,
                fixture.folder("a/y").id,
                &UidSet::just(seen.uid),
                &FlagChange::Add(vec![Flag::Seen, Flag::Deleted]),
            )
            .unwrap();

        let listing = depot
            .list_folders(
                ctx,
                alice,
                &ListRequest {
                    filter: FolderFilter::all(),
                    order: FolderOrder::SortOrder,
                    options: ListOptions {
                        tree: true,
                        children: true,
                        stats: true,
                        descendant_matches: false,
                    },
                },
            )
            .unwrap();
        assert_eq!(
            vec!["a", "a/y", "a/z", "a/z/deep", "b", "b/x"],
            listing
                .iter()
                .map(|l| l.folder.path.as_str())
                .collect::<Vec<_>>(),
        );
        let by_path = listing
            .iter()
            .map(|l| (l.folder.path.as_str(), l))
            .collect::<HashMap<_, _>>();
        assert_eq!(Some(true), by_path["a/z"].has_children);
        assert_eq!(Some(false), by_path["a/y"].has_children);
        assert_eq!(None, by_path["a"].has_matching_descendants);

        let stats = by_path["a/y"].stats.unwrap();
        assert_eq!(2, stats.messages);
        assert_eq!(1, stats.unseen);
        assert_eq!(1, stats.deleted);
        assert_eq!(stats, depot.folder_status(ctx, alice, "a/y").unwrap().1);
        assert_eq!(Some(FolderStats::default()), by_path["b"].stats);

        let subscribed = depot
            .list_folders(
                ctx,
                alice,
                &ListRequest {
                    filter: FolderFilter::all().subscribed(true),
                    order: FolderOrder::Name,
                    options: ListOptions {
                        descendant_matches: true,
                        tree: true,
                        ..ListOptions::default()
                    },
                },
            )
            .unwrap();
        // a/z is not subscribed, so a/z/deep is listed as a root after a
        assert_eq!(
            vec![("a", Some(true)), ("a/z/deep", Some(false))],
            subscribed
                .iter()
                .map(|l| (l.folder.path.as_str(), l.has_matching_descendants))
                .collect::<Vec<_>>(),
        );
    }
}
