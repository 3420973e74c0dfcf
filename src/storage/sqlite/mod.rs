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

//! The SQLite backend.
//!
//! One connection serves the whole store. Each repository call runs in its
//! own transaction: deferred for reads, immediate for writes, so that a
//! writer holds the database lock from its first read onward and the
//! check-then-write sequences in here are atomic.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::prelude::*;

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
use crate::support::{
    context::Context, error::Error, log_prefix::LogPrefix,
};

mod accounts;
mod changes;
mod folders;
mod messages;
mod migrations;
mod types;

/// How many SQLite VM instructions run between cancellation checks.
const PROGRESS_INTERVAL: i32 = 1000;

pub struct SqliteStore {
    cxn: Mutex<rusqlite::Connection>,
    busy_timeout: Duration,
}

impl SqliteStore {
    pub fn open(
        log_prefix: &LogPrefix,
        path: &Path,
        busy_timeout: Duration,
    ) -> Result<Self, Error> {
        let mut cxn = rusqlite::Connection::open(path)?;
        cxn.pragma_update(None, "foreign_keys", true)?;
        cxn.pragma_update(None, "journal_mode", "PERSIST")?;
        cxn.pragma_update(None, "journal_size_limit", 1024 * 1024)?;
        cxn.busy_timeout(busy_timeout)?;
        migrations::apply_migrations(
            log_prefix,
            &mut cxn,
            migrations::MIGRATIONS,
        )?;

        Ok(Self {
            cxn: Mutex::new(cxn),
            busy_timeout,
        })
    }

    /// Runs `f` on the connection with `ctx` wired in: the busy timeout is
    /// capped by the deadline, and in-flight statements are interrupted once
    /// `ctx` is done.
    fn with_cxn<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&mut rusqlite::Connection) -> Result<R, Error>,
    ) -> Result<R, Error> {
        ctx.check()?;
        let mut cxn: MutexGuard<'_, rusqlite::Connection> =
            self.cxn.lock().map_err(|_| Error::Poisoned)?;

        let busy_timeout = ctx
            .remaining()
            .map_or(self.busy_timeout, |r| r.min(self.busy_timeout));
        cxn.busy_timeout(busy_timeout)?;
        let watched = ctx.clone();
        cxn.progress_handler(
            PROGRESS_INTERVAL,
            Some(move || watched.is_done()),
        );

        let result = f(&mut cxn);
        cxn.progress_handler(PROGRESS_INTERVAL, None::<fn() -> bool>);

        // An interrupted statement surfaces as an opaque SQLite error; report
        // why it was interrupted instead.
        match result {
            Err(Error::Sqlite(e)) => match ctx.check() {
                Err(done) => Err(done),
                Ok(()) => Err(Error::Sqlite(e)),
            },
            result => result,
        }
    }

    fn read<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&rusqlite::Connection) -> Result<R, Error>,
    ) -> Result<R, Error> {
        self.with_cxn(ctx, |cxn| {
            let txn = cxn.read_tx()?;
            let result = f(&txn)?;
            txn.commit()?;
            Ok(result)
        })
    }

    fn write<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&rusqlite::Connection) -> Result<R, Error>,
    ) -> Result<R, Error> {
        self.with_cxn(ctx, |cxn| {
            let txn = cxn.write_tx()?;
            let result = f(&txn)?;
            txn.commit()?;
            Ok(result)
        })
    }

    fn transaction(
        &self,
        ctx: &Context,
        read_only: bool,
        f: &mut dyn FnMut(&dyn FolderRepo) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.with_cxn(ctx, |cxn| {
            let txn = if read_only {
                cxn.read_tx()?
            } else {
                cxn.write_tx()?
            };
            f(&SqliteTx {
                cxn: &txn,
                read_only,
            })?;
            txn.commit()?;
            Ok(())
        })
    }
}

/// The view of a `SqliteStore` given to a folder transaction callback.
struct SqliteTx<'a> {
    cxn: &'a rusqlite::Connection,
    read_only: bool,
}

impl SqliteTx<'_> {
    fn read<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&rusqlite::Connection) -> Result<R, Error>,
    ) -> Result<R, Error> {
        ctx.check()?;
        f(self.cxn)
    }

    fn write<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&rusqlite::Connection) -> Result<R, Error>,
    ) -> Result<R, Error> {
        ctx.check()?;
        if self.read_only {
            return Err(Error::ReadOnlyTransaction);
        }

        // A failed call leaves no partial effects behind, even if the caller
        // carries on with the transaction.
        self.cxn.execute_batch("SAVEPOINT `folder_tx_write`")?;
        match f(self.cxn) {
            Ok(result) => {
                self.cxn.execute_batch("RELEASE `folder_tx_write`")?;
                Ok(result)
            },
            Err(e) => {
                // If this fails too, the enclosing transaction is abandoned
                // when the error reaches it.
                let _ = self.cxn.execute_batch(
                    "ROLLBACK TO `folder_tx_write`; RELEASE `folder_tx_write`",
                );
                Err(e)
            },
        }
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

macro_rules! folder_repo_impl {
    ($t:ty) => {
        impl FolderRepo for $t {
            fn folder_by_id(
                &self,
                ctx: &Context,
                id: FolderId,
            ) -> Result<Folder, Error> {
                self.read(ctx, |cxn| folders::folder_by_id(cxn, id))
            }

            fn folder_by_path(
                &self,
                ctx: &Context,
                account: AccountId,
                path: &str,
            ) -> Result<Folder, Error> {
                self.read(ctx, |cxn| {
                    folders::folder_by_path(cxn, account, path)
                })
            }

            fn find_folders(
                &self,
                ctx: &Context,
                account: AccountId,
                filter: &FolderFilter,
                order: FolderOrder,
            ) -> Result<Vec<Folder>, Error> {
                self.read(ctx, |cxn| {
                    folders::find_folders(cxn, account, filter, order)
                })
            }

            fn count_folders(
                &self,
                ctx: &Context,
                account: AccountId,
                filter: &FolderFilter,
            ) -> Result<usize, Error> {
                self.read(ctx, |cxn| {
                    folders::find_folders(
                        cxn,
                        account,
                        filter,
                        FolderOrder::default(),
                    )
                    .map(|f| f.len())
                })
            }

            fn create_folder(
                &self,
                ctx: &Context,
                folder: &Folder,
            ) -> Result<(), Error> {
                self.write(ctx, |cxn| folders::create_folder(cxn, folder))
            }

            fn update_folder(
                &self,
                ctx: &Context,
                folder: &Folder,
            ) -> Result<Folder, Error> {
                self.write(ctx, |cxn| folders::update_folder(cxn, folder))
            }

            fn delete_folder(
                &self,
                ctx: &Context,
                id: FolderId,
            ) -> Result<(), Error> {
                self.write(ctx, |cxn| folders::delete_folder(cxn, id))
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
                self.write(ctx, |cxn| {
                    folders::rename_move(
                        cxn, account, old_parent, new_parent, old_name,
                        new_name,
                    )
                })
            }

            fn delete_tree(
                &self,
                ctx: &Context,
                root: FolderId,
            ) -> Result<Vec<DeletedFolder>, Error> {
                self.write(ctx, |cxn| folders::delete_tree(cxn, root))
            }

            fn next_uid(
                &self,
                ctx: &Context,
                folder: FolderId,
                n: u32,
            ) -> Result<UidBlock, Error> {
                self.write(ctx, |cxn| folders::next_uid(cxn, folder, n))
            }

            fn create_entries(
                &self,
                ctx: &Context,
                entries: &[FolderEntry],
            ) -> Result<(), Error> {
                self.write(ctx, |cxn| folders::create_entries(cxn, entries))
            }

            fn count_entries(
                &self,
                ctx: &Context,
                folder: FolderId,
                uids: &UidSet,
            ) -> Result<usize, Error> {
                self.read(ctx, |cxn| folders::count_entries(cxn, folder, uids))
            }

            fn entries(
                &self,
                ctx: &Context,
                folder: FolderId,
                uids: &UidSet,
            ) -> Result<Vec<FolderEntry>, Error> {
                self.read(ctx, |cxn| folders::entries(cxn, folder, uids))
            }

            fn entries_for_message(
                &self,
                ctx: &Context,
                message: MessageId,
            ) -> Result<Vec<FolderEntry>, Error> {
                self.read(ctx, |cxn| {
                    folders::entries_for_message(cxn, message)
                })
            }

            fn delete_entries(
                &self,
                ctx: &Context,
                folder: FolderId,
                uids: &UidSet,
            ) -> Result<Vec<FolderEntry>, Error> {
                self.write(ctx, |cxn| {
                    folders::delete_entries(cxn, folder, uids)
                })
            }

            fn replace_entries(
                &self,
                ctx: &Context,
                old: &[FolderEntry],
                new: &[FolderEntry],
            ) -> Result<(), Error> {
                self.write(ctx, |cxn| folders::replace_entries(cxn, old, new))
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
    };
}

folder_repo_impl!(SqliteStore);
folder_repo_impl!(SqliteTx<'_>);

impl AccountRepo for SqliteStore {
    fn create_account(
        &self,
        ctx: &Context,
        account: &Account,
    ) -> Result<(), Error> {
        self.write(ctx, |cxn| accounts::create_account(cxn, account))
    }

    fn account_by_id(
        &self,
        ctx: &Context,
        id: AccountId,
    ) -> Result<Account, Error> {
        self.read(ctx, |cxn| accounts::account_by_id(cxn, id))
    }

    fn account_by_name(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<Account, Error> {
        self.read(ctx, |cxn| accounts::account_by_name(cxn, name))
    }

    fn list_accounts(
        &self,
        ctx: &Context,
        created_after: Option<DateTime<Utc>>,
        order: AccountOrder,
    ) -> Result<Vec<Account>, Error> {
        self.read(ctx, |cxn| {
            accounts::list_accounts(cxn, created_after, order)
        })
    }

    fn delete_account(
        &self,
        ctx: &Context,
        id: AccountId,
    ) -> Result<(), Error> {
        self.write(ctx, |cxn| accounts::delete_account(cxn, id))
    }
}

impl MessageRepo for SqliteStore {
    fn create_messages(
        &self,
        ctx: &Context,
        messages: &[Message],
    ) -> Result<(), Error> {
        self.write(ctx, |cxn| messages::create_messages(cxn, messages))
    }

    fn message_by_id(
        &self,
        ctx: &Context,
        id: MessageId,
    ) -> Result<Message, Error> {
        self.read(ctx, |cxn| messages::message_by_id(cxn, id))
    }

    fn messages_by_ids(
        &self,
        ctx: &Context,
        ids: &[MessageId],
    ) -> Result<Vec<Message>, Error> {
        self.read(ctx, |cxn| messages::messages_by_ids(cxn, ids))
    }

    fn change_message_flags(
        &self,
        ctx: &Context,
        id: MessageId,
        change: &FlagChange,
    ) -> Result<Option<Vec<Flag>>, Error> {
        self.write(ctx, |cxn| messages::change_message_flags(cxn, id, change))
    }

    fn delete_messages(
        &self,
        ctx: &Context,
        ids: &[MessageId],
    ) -> Result<(), Error> {
        self.write(ctx, |cxn| messages::delete_messages(cxn, ids))
    }
}

impl ChangeLogRepo for SqliteStore {
    fn append_changes(
        &self,
        ctx: &Context,
        changes: &[ChangeEntry],
    ) -> Result<(), Error> {
        self.write(ctx, |cxn| changes::append_changes(cxn, changes))
    }

    fn changes(
        &self,
        ctx: &Context,
        scope: ChangeScope,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<ChangeEntry>, Error> {
        self.read(ctx, |cxn| changes::changes(cxn, scope, since, limit))
    }

    fn last_change_time(
        &self,
        ctx: &Context,
        scope: ChangeScope,
    ) -> Result<DateTime<Utc>, Error> {
        self.read(ctx, |cxn| changes::last_change_time(cxn, scope))
    }
}

trait ConnectionExt {
    fn read_tx(&mut self) -> rusqlite::Result<rusqlite::Transaction<'_>>;
    fn write_tx(&mut self) -> rusqlite::Result<rusqlite::Transaction<'_>>;
    fn enable_write(&mut self, enabled: bool) -> rusqlite::Result<()>;
}

impl ConnectionExt for rusqlite::Connection {
    fn read_tx(&mut self) -> rusqlite::Result<rusqlite::Transaction<'_>> {
        self.enable_write(false)?;
        self.transaction_with_behavior(rusqlite::TransactionBehavior::Deferred)
    }

    fn write_tx(&mut self) -> rusqlite::Result<rusqlite::Transaction<'_>> {
        self.enable_write(true)?;
        self.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
    }

    #[cfg(debug_assertions)]
    fn enable_write(&mut self, enabled: bool) -> rusqlite::Result<()> {
        // Reads run with writes disabled in debug builds, so that a write
        // sneaking into a read path fails loudly.
        self.execute(
            if enabled {
                "PRAGMA query_only = false"
            } else {
                "PRAGMA query_only = true"
            },
            (),
        )?;
        Ok(())
    }

    #[cfg(not(debug_assertions))]
    fn enable_write(&mut self, _: bool) -> rusqlite::Result<()> {
        Ok(())
    }
}
