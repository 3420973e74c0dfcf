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

use log::{info, warn};

use super::defs::*;
use crate::model::{
    account::Account,
    changelog::{ChangeEntry, ChangeType},
    entry::FolderEntry,
    folder::Folder,
    id::FolderId,
    message::Message,
    uid::UidSet,
};
use crate::support::{context::Context, error::Error};

impl Depot {
    /// Copies the messages filed in `source` under `uids` into the folder at
    /// `target_path`.
    ///
    /// Each message is copied as a new message sharing the original's parts.
    /// Messages deleted concurrently between reading the source entries and
    /// loading the messages are skipped; the outcome reports how many were
    /// requested and how many were copied. Once the copies start being
    /// written, any failure aborts the whole operation.
    pub fn copy_by_uid(
        &self,
        ctx: &Context,
        account: &Account,
        source: FolderId,
        uids: &UidSet,
        target_path: &str,
    ) -> Result<CopyOutcome, Error> {
        let source = self.owned_folder(ctx, account, source)?;
        let target = self.folder(ctx, account, target_path)?;

        let requested = self.repos.folders.entries(ctx, source.id, uids)?;
        let messages = self.load_messages(ctx, &requested)?;

        let mut outcome = CopyOutcome {
            requested: requested.len(),
            source_entries: Vec::with_capacity(requested.len()),
            target_entries: Vec::with_capacity(requested.len()),
            target_folder: target.id,
            copies: Vec::with_capacity(requested.len()),
        };
        let mut copies = Vec::with_capacity(requested.len());
        for entry in requested {
            let Some(message) = messages.get(&entry.message_id) else {
                warn!(
                    "{} UID {} in {:?} vanished during copy",
                    self.log_prefix,
                    entry.uid.get(),
                    source.path,
                );
                continue;
            };

            copies.push(message.derive_copy());
            outcome.source_entries.push(entry);
        }

        if copies.is_empty() {
            return Ok(outcome);
        }

        outcome.target_entries = self
            .persist_copies(ctx, &target, &copies)
            .map_err(|e| e.abort("copy"))?;
        outcome.copies = copies.iter().map(|m| m.id).collect();

        info!(
            "{} Copied {}/{} message(s) from {:?} to {:?}",
            self.log_prefix,
            outcome.fulfilled(),
            outcome.requested,
            source.path,
            target.path,
        );
        let changes = outcome
            .target_entries
            .iter()
            .zip(&copies)
            .map(|(entry, message)| {
                ChangeEntry::message(
                    ChangeType::MessageCreated,
                    account.id,
                    Some(entry.folder_id),
                    entry.message_id,
                    Some(entry.uid),
                    &message.flags,
                )
            })
            .collect::<Vec<_>>();
        self.record(ctx, &changes)?;

        Ok(outcome)
    }

    /// Reserves UIDs in `target` for `copies`, then writes the copies and
    /// their entries.
    fn persist_copies(
        &self,
        ctx: &Context,
        target: &Folder,
        copies: &[Message],
    ) -> Result<Vec<FolderEntry>, Error> {
        let block = self.repos.folders.next_uid(
            ctx,
            target.id,
            u32::try_from(copies.len()).map_err(|_| Error::FolderFull)?,
        )?;
        self.repos.messages.create_messages(ctx, copies)?;

        let entries = copies
            .iter()
            .zip(block.iter())
            .map(|(message, uid)| FolderEntry {
                folder_id: target.id,
                message_id: message.id,
                uid,
            })
            .collect::<Vec<_>>();
        self.repos.folders.create_entries(ctx, &entries)?;
        Ok(entries)
    }

    /// Moves the entries filed in `source` under `uids` into the folder at
    /// `target_path`.
    ///
    /// The messages themselves are untouched; only the entries move, in one
    /// atomic step, so that a message is never lost or duplicated.
    pub fn move_by_uid(
        &self,
        ctx: &Context,
        account: &Account,
        source: FolderId,
        uids: &UidSet,
        target_path: &str,
    ) -> Result<MoveOutcome, Error> {
        let source = self.owned_folder(ctx, account, source)?;
        let target = self.folder(ctx, account, target_path)?;

        let source_entries = self.repos.folders.entries(ctx, source.id, uids)?;
        let mut outcome = MoveOutcome {
            source_entries,
            target_entries: Vec::new(),
            target_folder: target.id,
        };
        if outcome.source_entries.is_empty() {
            return Ok(outcome);
        }

        outcome.target_entries = self
            .replace_into(ctx, &target, &outcome.source_entries)
            .map_err(|e| e.abort("move"))?;

        info!(
            "{} Moved {} message(s) from {:?} to {:?}",
            self.log_prefix,
            outcome.target_entries.len(),
            source.path,
            target.path,
        );
        let mut changes =
            Vec::with_capacity(2 * outcome.source_entries.len());
        for (old, new) in
            outcome.source_entries.iter().zip(&outcome.target_entries)
        {
            changes.push(ChangeEntry::message(
                ChangeType::MessageDeleted,
                account.id,
                Some(old.folder_id),
                old.message_id,
                Some(old.uid),
                &[],
            ));
            changes.push(ChangeEntry::message(
                ChangeType::MessageCreated,
                account.id,
                Some(new.folder_id),
                new.message_id,
                Some(new.uid),
                &[],
            ));
        }
        self.record(ctx, &changes)?;

        Ok(outcome)
    }

    fn replace_into(
        &self,
        ctx: &Context,
        target: &Folder,
        old: &[FolderEntry],
    ) -> Result<Vec<FolderEntry>, Error> {
        let block = self.repos.folders.next_uid(
            ctx,
            target.id,
            u32::try_from(old.len()).map_err(|_| Error::FolderFull)?,
        )?;
        let new = old
            .iter()
            .zip(block.iter())
            .map(|(entry, uid)| FolderEntry {
                folder_id: target.id,
                message_id: entry.message_id,
                uid,
            })
            .collect::<Vec<_>>();
        self.repos.folders.replace_entries(ctx, old, &new)?;
        Ok(new)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::model::{
        id::MessageId,
        message::{Flag, FlagChange},
        metadata::COPY_OF,
        uid::Uid,
    };
    use crate::storage::{memory::MemoryStore, MessageRepo};
    use crate::support::error::ErrorKind;

    #[test]
    fn copy_all() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;
        let inbox = fixture.mkdir("INBOX");
        let archive = fixture.mkdir("Archive");

        for body in ["one", "two", "three"] {
            fixture.append("INBOX", body);
        }
        depot
            .store_flags(
                ctx,
                alice,
                inbox.id,
                &UidSet::just(Uid::u(2)),
                &FlagChange::Add(vec![Flag::Seen]),
            )
            .unwrap();
        // Make the target UIDs differ from the source ones
        depot.repos.folders.next_uid(ctx, archive.id, 10).unwrap();

        let outcome = depot
            .copy_by_uid(ctx, alice, inbox.id, &UidSet::all(), "Archive")
            .unwrap();
        assert_eq!(3, outcome.requested);
        assert_eq!(3, outcome.fulfilled());
        assert!(!outcome.is_partial());
        assert_eq!(archive.id, outcome.target_folder);
        assert_eq!(
            vec![Uid::u(11), Uid::u(12), Uid::u(13)],
            outcome
                .target_entries
                .iter()
                .map(|e| e.uid)
                .collect::<Vec<_>>(),
        );

        let source = depot
            .fetch(ctx, alice, inbox.id, &UidSet::all())
            .unwrap();
        assert_eq!(
            outcome.source_entries,
            source.iter().map(|&(e, _)| e).collect::<Vec<_>>(),
        );

        let target = depot
            .fetch(ctx, alice, archive.id, &UidSet::all())
            .unwrap();
        for (((src_entry, original), (dst_entry, copy)), &copy_id) in
            source.iter().zip(&target).zip(&outcome.copies)
        {
            assert_ne!(original.id, copy.id);
            assert_eq!(copy_id, copy.id);
            assert_eq!(dst_entry.message_id, copy.id);
            assert_ne!(src_entry.uid, dst_entry.uid);
            assert_eq!(
                Some(original.id.to_string().as_str()),
                copy.metadata.get(COPY_OF),
            );
            assert_eq!(original.flags, copy.flags);
            assert_eq!(original.parts(), copy.parts());
            assert_eq!(original.received_at, copy.received_at);
        }

        // An empty selection copies nothing
        let outcome = depot
            .copy_by_uid(
                ctx,
                alice,
                inbox.id,
                &UidSet::just(Uid::u(99)),
                "Archive",
            )
            .unwrap();
        assert_eq!(0, outcome.requested);
        assert!(outcome.copies.is_empty());
        assert_eq!(Uid::u(14), fixture.folder("Archive").uid_next);
    }

    /// Wraps a `MemoryStore` so that one message is deleted just as the
    /// messages of a copy are being loaded.
    struct VanishingMessages {
        store: Arc<MemoryStore>,
        victim: Mutex<Option<MessageId>>,
    }

    impl MessageRepo for VanishingMessages {
        fn create_messages(
            &self,
            ctx: &Context,
            messages: &[Message],
        ) -> Result<(), Error> {
            self.store.create_messages(ctx, messages)
        }

        fn message_by_id(
            &self,
            ctx: &Context,
            id: MessageId,
        ) -> Result<Message, Error> {
            self.store.message_by_id(ctx, id)
        }

        fn messages_by_ids(
            &self,
            ctx: &Context,
            ids: &[MessageId],
        ) -> Result<Vec<Message>, Error> {
            if let Some(victim) = self.victim.lock().unwrap().take() {
                self.store.delete_messages(ctx, &[victim])?;
            }
            self.store.messages_by_ids(ctx, ids)
        }

        fn change_message_flags(
            &self,
            ctx: &Context,
            id: MessageId,
            change: &FlagChange,
        ) -> Result<Option<Vec<Flag>>, Error> {
            self.store.change_message_flags(ctx, id, change)
        }

        fn delete_messages(
            &self,
            ctx: &Context,
            ids: &[MessageId],
        ) -> Result<(), Error> {
            self.store.delete_messages(ctx, ids)
        }
    }

    #[test]
    fn copy_tolerates_vanished_message() {
        let store = Arc::new(MemoryStore::new());
        let vanishing = Arc::new(VanishingMessages {
            store: Arc::clone(&store),
            victim: Mutex::new(None),
        });
        let fixture = TestFixture::with_repos(Repos {
            accounts: store.clone(),
            folders: store.clone(),
            messages: vanishing.clone(),
            changes: store,
        });
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;
        let inbox = fixture.mkdir("INBOX");
        let archive = fixture.mkdir("Archive");

        let entries = ["one", "two", "three", "four"]
            .into_iter()
            .map(|body| fixture.append("INBOX", body))
            .collect::<Vec<_>>();
        *vanishing.victim.lock().unwrap() = Some(entries[1].message_id);

        let outcome = depot
            .copy_by_uid(ctx, alice, inbox.id, &UidSet::all(), "Archive")
            .unwrap();
        assert_eq!(4, outcome.requested);
        assert_eq!(3, outcome.fulfilled());
        assert!(outcome.is_partial());
        assert_eq!(
            vec![entries[0], entries[2], entries[3]],
            outcome.source_entries,
        );
        assert_eq!(3, outcome.copies.len());
        assert_eq!(
            vec![Uid::u(1), Uid::u(2), Uid::u(3)],
            outcome
                .target_entries
                .iter()
                .map(|e| e.uid)
                .collect::<Vec<_>>(),
        );
        assert_eq!(
            3,
            depot
                .fetch(ctx, alice, archive.id, &UidSet::all())
                .unwrap()
                .len(),
        );
        // The source folder no longer refers to the deleted message
        assert_eq!(
            3,
            depot
                .fetch(ctx, alice, inbox.id, &UidSet::all())
                .unwrap()
                .len(),
        );
    }

    #[test]
    fn copy_errors() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;
        let inbox = fixture.mkdir("INBOX");
        let archive = fixture.mkdir("Archive");
        fixture.append("INBOX", "one");
        fixture.append("INBOX", "two");

        assert_matches!(
            Err(Error::NxFolder),
            depot.copy_by_uid(ctx, alice, inbox.id, &UidSet::all(), "Nope"),
        );
        let bob = depot.create_account(ctx, "bob").unwrap();
        depot.create_folder(ctx, &bob, "Archive", None).unwrap();
        assert_matches!(
            Err(Error::NxFolder),
            depot.copy_by_uid(ctx, &bob, inbox.id, &UidSet::all(), "Archive"),
        );

        // Leave room for only one more UID in the target
        depot
            .repos
            .folders
            .next_uid(ctx, archive.id, u32::MAX - 2)
            .unwrap();
        let err = depot
            .copy_by_uid(ctx, alice, inbox.id, &UidSet::all(), "Archive")
            .unwrap_err();
        assert_eq!(ErrorKind::Internal, err.kind());
        assert_matches!(
            Error::Aborted {
                operation: "copy",
                ..
            },
            err,
        );
        assert_eq!(
            0,
            depot
                .fetch(ctx, alice, archive.id, &UidSet::all())
                .unwrap()
                .len(),
        );

        let cancelled = Context::background();
        cancelled.cancel();
        assert_matches!(
            Err(Error::Cancelled),
            depot.copy_by_uid(
                &cancelled,
                alice,
                inbox.id,
                &UidSet::all(),
                "INBOX",
            ),
        );
    }

    #[test]
    fn move_keeps_message_identity() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;
        let inbox = fixture.mkdir("INBOX");
        let archive = fixture.mkdir("Archive");

        let entries = ["one", "two", "three"]
            .into_iter()
            .map(|body| fixture.append("INBOX", body))
            .collect::<Vec<_>>();
        fixture.append("Archive", "old");

        let mut moved = UidSet::new();
        moved.insert(Uid::u(1), Uid::u(2));
        let outcome = depot
            .move_by_uid(ctx, alice, inbox.id, &moved, "Archive")
            .unwrap();
        assert_eq!(archive.id, outcome.target_folder);
        assert_eq!(entries[..2], outcome.source_entries[..]);
        assert_eq!(
            vec![
                (entries[0].message_id, Uid::u(2)),
                (entries[1].message_id, Uid::u(3)),
            ],
            outcome
                .target_entries
                .iter()
                .map(|e| (e.message_id, e.uid))
                .collect::<Vec<_>>(),
        );

        assert_eq!(
            vec![entries[2]],
            depot
                .fetch(ctx, alice, inbox.id, &UidSet::all())
                .unwrap()
                .into_iter()
                .map(|(e, _)| e)
                .collect::<Vec<_>>(),
        );
        let archived = depot
            .fetch(ctx, alice, archive.id, &UidSet::all())
            .unwrap();
        assert_eq!(3, archived.len());
        assert_eq!(entries[0].message_id, archived[1].1.id);
        assert_eq!(
            entries[0].message_id,
            depot
                .repos
                .messages
                .message_by_id(ctx, entries[0].message_id)
                .unwrap()
                .id,
        );

        // Moving nothing is a no-op that reserves no UIDs
        let outcome = depot
            .move_by_uid(ctx, alice, inbox.id, &moved, "Archive")
            .unwrap();
        assert!(outcome.source_entries.is_empty());
        assert!(outcome.target_entries.is_empty());
        assert_eq!(Uid::u(4), fixture.folder("Archive").uid_next);

        assert_matches!(
            Err(Error::NxFolder),
            depot.move_by_uid(ctx, alice, inbox.id, &moved, "Nope"),
        );
    }
}
