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

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::model::{
    changelog::ChangeEntry,
    entry::FolderEntry,
    filter::{FolderFilter, FolderOrder},
    folder::Folder,
    id::{FolderId, MessageId},
    tree::TreeNode,
};
use crate::storage::{
    auth::{Authenticator, TrustingAuthenticator},
    blob::{BlobStore, FsBlobStore, MemoryBlobStore},
    memory::MemoryStore,
    sqlite::SqliteStore,
    AccountRepo, ChangeLogRepo, FolderRepo, MessageRepo,
};
use crate::support::{
    context::Context,
    error::Error,
    log_prefix::LogPrefix,
    system_config::{Backend, SystemConfig},
};

/// The four repositories a `Depot` works against.
///
/// Normally all four are views of the same store, but they are kept apart so
/// that any one of them can be wrapped independently.
#[derive(Clone)]
pub struct Repos {
    pub accounts: Arc<dyn AccountRepo + Send + Sync>,
    pub folders: Arc<dyn FolderRepo + Send + Sync>,
    pub messages: Arc<dyn MessageRepo + Send + Sync>,
    pub changes: Arc<dyn ChangeLogRepo + Send + Sync>,
}

impl Repos {
    pub fn from_store<S>(store: S) -> Self
    where
        S: AccountRepo
            + FolderRepo
            + MessageRepo
            + ChangeLogRepo
            + Send
            + Sync
            + 'static,
    {
        let store = Arc::new(store);
        Self {
            accounts: Arc::clone(&store) as Arc<dyn AccountRepo + Send + Sync>,
            folders: Arc::clone(&store) as Arc<dyn FolderRepo + Send + Sync>,
            messages: Arc::clone(&store) as Arc<dyn MessageRepo + Send + Sync>,
            changes: store as Arc<dyn ChangeLogRepo + Send + Sync>,
        }
    }
}

/// The mailbox storage engine as seen by a protocol server.
///
/// A `Depot` is cheap to clone; clones share everything but may be given
/// their own `LogPrefix` with `with_log_prefix`.
#[derive(Clone)]
pub struct Depot {
    pub(super) repos: Repos,
    pub(super) blobs: Arc<dyn BlobStore>,
    pub(super) auth: Arc<dyn Authenticator>,
    pub(super) log_prefix: LogPrefix,
}

impl Depot {
    pub fn new(
        repos: Repos,
        blobs: Arc<dyn BlobStore>,
        auth: Arc<dyn Authenticator>,
        log_prefix: LogPrefix,
    ) -> Self {
        Self {
            repos,
            blobs,
            auth,
            log_prefix,
        }
    }

    /// Opens the backend selected by `config`.
    ///
    /// Deployments authenticate upstream of this crate, so the depot trusts
    /// the usernames it is given; use `new` to plug in a real
    /// `Authenticator`.
    pub fn open(
        config: &SystemConfig,
        log_prefix: LogPrefix,
    ) -> Result<Self, Error> {
        let auth = Arc::new(TrustingAuthenticator);
        match config.storage.backend {
            Backend::Memory => {
                warn!(
                    "{log_prefix} Using volatile in-memory storage; \
                     nothing will be persisted"
                );
                Ok(Self::new(
                    Repos::from_store(MemoryStore::new()),
                    Arc::new(MemoryBlobStore::new()),
                    auth,
                    log_prefix,
                ))
            },

            Backend::Sqlite => {
                let storage = &config.storage;
                if let Some(parent) = storage.database.parent() {
                    fs::create_dir_all(parent)?;
                }

                let store = SqliteStore::open(
                    &log_prefix,
                    &storage.database,
                    Duration::from_secs(storage.busy_timeout_secs),
                )?;
                let blobs = FsBlobStore::new(storage.blob_root.clone())?;
                info!(
                    "{log_prefix} Opened {}",
                    storage.database.display(),
                );
                Ok(Self::new(
                    Repos::from_store(store),
                    Arc::new(blobs),
                    auth,
                    log_prefix,
                ))
            },
        }
    }

    pub fn log_prefix(&self) -> &LogPrefix {
        &self.log_prefix
    }

    /// Returns a clone of `self` which logs with `log_prefix`.
    pub fn with_log_prefix(&self, log_prefix: LogPrefix) -> Self {
        Self {
            log_prefix,
            ..self.clone()
        }
    }

    /// Runs `f` in a read-write folder transaction and returns its result.
    pub(super) fn in_folder_tx<R>(
        &self,
        ctx: &Context,
        mut f: impl FnMut(&dyn FolderRepo) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut result = None;
        self.repos.folders.folder_tx(ctx, false, &mut |tx| {
            result = Some(f(tx)?);
            Ok(())
        })?;
        result.ok_or(Error::NoTransactionResult)
    }

    /// Appends `changes` to the change log after the operation that produced
    /// them has been committed.
    ///
    /// By then there is nothing to roll back, so a failure here is logged
    /// and reported but leaves the committed change in place.
    pub(super) fn record(
        &self,
        ctx: &Context,
        changes: &[ChangeEntry],
    ) -> Result<(), Error> {
        if changes.is_empty() {
            return Ok(());
        }

        self.repos
            .changes
            .append_changes(ctx, changes)
            .map_err(|e| {
                warn!(
                    "{} Failed to record {} change(s): {e}",
                    self.log_prefix,
                    changes.len(),
                );
                e
            })
    }
}

/// Parameters for `Depot::list_folders`.
#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    pub filter: FolderFilter,
    pub order: FolderOrder,
    pub options: ListOptions,
}

/// What to return alongside each folder from a listing.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListOptions {
    /// Report whether any folder strictly below each result also matched the
    /// filter.
    pub descendant_matches: bool,
    /// Report whether each result has any child at all.
    pub children: bool,
    /// Compute message statistics for each result.
    pub stats: bool,
    /// Reorder the results so that parents come before their children,
    /// keeping the requested order among siblings.
    pub tree: bool,
}

/// One folder in the result of `Depot::list_folders`.
#[derive(Clone, Debug, PartialEq)]
pub struct FolderListing {
    pub folder: Folder,
    /// Set if `ListOptions::descendant_matches` was requested.
    pub has_matching_descendants: Option<bool>,
    /// Set if `ListOptions::children` was requested.
    pub has_children: Option<bool>,
    /// Set if `ListOptions::stats` was requested.
    pub stats: Option<FolderStats>,
}

impl TreeNode for FolderListing {
    fn node_id(&self) -> FolderId {
        self.folder.id
    }

    fn node_parent(&self) -> Option<FolderId> {
        self.folder.parent_id
    }
}

/// Message statistics for one folder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FolderStats {
    pub messages: usize,
    /// Messages without `\Seen`.
    pub unseen: usize,
    /// Messages with `\Deleted`.
    pub deleted: usize,
    /// Total size in octets.
    pub size: u64,
}

/// The result of `Depot::copy_by_uid`.
///
/// `source_entries` and `target_entries` correspond positionally. Entries
/// whose message vanished while the copy was in progress are left out of
/// both, so they can be shorter than `requested`.
#[derive(Clone, Debug, PartialEq)]
pub struct CopyOutcome {
    /// How many source entries the UID set resolved to.
    pub requested: usize,
    pub source_entries: Vec<FolderEntry>,
    pub target_entries: Vec<FolderEntry>,
    pub target_folder: FolderId,
    /// The new messages, in the same order as `target_entries`.
    pub copies: Vec<MessageId>,
}

impl CopyOutcome {
    pub fn fulfilled(&self) -> usize {
        self.target_entries.len()
    }

    pub fn is_partial(&self) -> bool {
        self.fulfilled() < self.requested
    }
}

/// The result of `Depot::move_by_uid`.
///
/// `source_entries` and `target_entries` correspond positionally.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveOutcome {
    pub source_entries: Vec<FolderEntry>,
    pub target_entries: Vec<FolderEntry>,
    pub target_folder: FolderId,
}

#[cfg(test)]
pub(super) struct TestFixture {
    pub(super) depot: Depot,
    pub(super) ctx: Context,
    pub(super) alice: crate::model::account::Account,
}

#[cfg(test)]
impl TestFixture {
    pub(super) fn new() -> Self {
        Self::with_repos(Repos::from_store(MemoryStore::new()))
    }

    pub(super) fn with_repos(repos: Repos) -> Self {
        let depot = Depot::new(
            repos,
            Arc::new(MemoryBlobStore::new()),
            Arc::new(TrustingAuthenticator),
            LogPrefix::new("test"),
        );
        let ctx = Context::background();
        let alice = depot.create_account(&ctx, "alice").unwrap();
        Self { depot, ctx, alice }
    }

    pub(super) fn mkdir(&self, path: &str) -> Folder {
        self.depot
            .create_folder(&self.ctx, &self.alice, path, None)
            .unwrap()
    }

    pub(super) fn folder(&self, path: &str) -> Folder {
        self.depot.folder(&self.ctx, &self.alice, path).unwrap()
    }

    pub(super) fn append(&self, path: &str, body: &str) -> FolderEntry {
        self.depot
            .append(
                &self.ctx,
                &self.alice,
                path,
                crate::model::message::test_support::new_message(body),
            )
            .unwrap()
            .0
    }

    pub(super) fn paths(&self) -> Vec<String> {
        let mut paths = self
            .depot
            .list_folders(&self.ctx, &self.alice, &ListRequest::default())
            .unwrap()
            .into_iter()
            .map(|l| l.folder.path)
            .collect::<Vec<_>>();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn open_sqlite_from_config() {
        let root = TempDir::new().unwrap();
        let config_path = root.path().join("maildepot.toml");
        fs::write(
            &config_path,
            "[storage]\ndatabase = \"data/depot.sqlite\"\n",
        )
        .unwrap();
        let config = SystemConfig::load(&config_path).unwrap();

        let ctx = Context::background();
        {
            let depot = Depot::open(&config, LogPrefix::new("test")).unwrap();
            let alice = depot.create_account(&ctx, "alice").unwrap();
            depot.create_folder(&ctx, &alice, "INBOX", None).unwrap();
        }

        assert!(root.path().join("data/depot.sqlite").is_file());
        assert!(root.path().join("blobs").is_dir());

        let depot = Depot::open(&config, LogPrefix::new("test")).unwrap();
        let alice = depot.account(&ctx, "alice").unwrap();
        depot.folder(&ctx, &alice, "INBOX").unwrap();
    }

    #[test]
    fn open_memory_from_config() {
        let config = SystemConfig::parse("[storage]\nbackend = \"memory\"\n")
            .unwrap();
        let ctx = Context::background();
        let depot = Depot::open(&config, LogPrefix::new("test")).unwrap();
        depot.create_account(&ctx, "alice").unwrap();
        let accounts = depot
            .list_accounts(&ctx, None, Default::default())
            .unwrap();
        assert_eq!(1, accounts.len());
    }
}
