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

use std::collections::HashMap;
use std::io::{self, Read};
use std::slice;

use log::{debug, info};

use super::defs::*;
use crate::model::{
    account::Account,
    changelog::{ChangeEntry, ChangeType},
    entry::FolderEntry,
    folder::Folder,
    id::{AccountId, FolderId, MessageId},
    message::{
        BlobRef, Flag, FlagChange, Message, NewMessage, PartBody,
    },
    mime_path::MimePath,
    uid::UidSet,
};
use crate::support::{context::Context, error::Error};

impl Depot {
    /// Stores a new message and files it at the end of the folder at
    /// `path`.
    ///
    /// The message is validated in full before anything is written.
    pub fn append(
        &self,
        ctx: &Context,
        account: &Account,
        path: &str,
        data: NewMessage,
    ) -> Result<(FolderEntry, Message), Error> {
        let message = Message::new(data)?;
        let folder = self.folder(ctx, account, path)?;

        self.repos
            .messages
            .create_messages(ctx, slice::from_ref(&message))?;
        let block = self.repos.folders.next_uid(ctx, folder.id, 1)?;
        debug!(
            "{} Reserved UID {} in {:?}",
            self.log_prefix,
            block.first.get(),
            folder.path,
        );
        let entry = FolderEntry {
            folder_id: folder.id,
            message_id: message.id,
            uid: block.first,
        };
        self.repos.folders.create_entries(ctx, &[entry])?;

        info!(
            "{} Appended {} to {:?} as UID {}",
            self.log_prefix,
            message.id,
            folder.path,
            entry.uid.get(),
        );
        self.record(
            ctx,
            &[ChangeEntry::message(
                ChangeType::MessageCreated,
                account.id,
                Some(folder.id),
                message.id,
                Some(entry.uid),
                &message.flags,
            )],
        )?;
        Ok((entry, message))
    }

    /// Fetches the messages filed in `folder` under `uids`, ascending by
    /// UID.
    ///
    /// Entries whose message has been deleted since the entries were read
    /// are silently left out.
    pub fn fetch(
        &self,
        ctx: &Context,
        account: &Account,
        folder: FolderId,
        uids: &UidSet,
    ) -> Result<Vec<(FolderEntry, Message)>, Error> {
        let folder = self.owned_folder(ctx, account, folder)?;
        let entries = self.repos.folders.entries(ctx, folder.id, uids)?;
        let messages = self.load_messages(ctx, &entries)?;
        Ok(entries
            .into_iter()
            .filter_map(|e| {
                messages.get(&e.message_id).map(|m| (e, m.clone()))
            })
            .collect())
    }

    /// Changes the flags of the messages filed in `folder` under `uids`.
    ///
    /// Flags belong to the message, so the change is visible through every
    /// folder it is filed in. Each message's flags are changed atomically
    /// in the store, so concurrent stores to the same message all take
    /// effect. Returns each entry with the flags its message now has.
    pub fn store_flags(
        &self,
        ctx: &Context,
        account: &Account,
        folder: FolderId,
        uids: &UidSet,
        change: &FlagChange,
    ) -> Result<Vec<(FolderEntry, Vec<Flag>)>, Error> {
        let mut results = Vec::new();
        let mut changes = Vec::new();
        for (entry, message) in self.fetch(ctx, account, folder, uids)? {
            let flags = match self.repos.messages.change_message_flags(
                ctx,
                message.id,
                change,
            ) {
                Ok(Some(flags)) => flags,
                Ok(None) => {
                    results.push((entry, message.flags));
                    continue;
                },
                Err(Error::NxMessage) => continue,
                Err(e) => return Err(e),
            };

            changes.push(ChangeEntry::message(
                ChangeType::MessageUpdated,
                account.id,
                Some(entry.folder_id),
                message.id,
                Some(entry.uid),
                &flags,
            ));
            results.push((entry, flags));
        }

        self.record(ctx, &changes)?;
        Ok(results)
    }

    /// Removes the entries for `uids` from `folder`, returning those
    /// removed.
    ///
    /// The messages themselves are kept, as they may be filed elsewhere.
    pub fn expunge(
        &self,
        ctx: &Context,
        account: &Account,
        folder: FolderId,
        uids: &UidSet,
    ) -> Result<Vec<FolderEntry>, Error> {
        let folder = self.owned_folder(ctx, account, folder)?;
        let removed = self.repos.folders.delete_entries(ctx, folder.id, uids)?;
        info!(
            "{} Expunged {} message(s) from {:?}",
            self.log_prefix,
            removed.len(),
            folder.path,
        );

        let changes = removed
            .iter()
            .map(|e| {
                ChangeEntry::message(
                    ChangeType::MessageDeleted,
                    account.id,
                    Some(e.folder_id),
                    e.message_id,
                    Some(e.uid),
                    &[],
                )
            })
            .collect::<Vec<_>>();
        self.record(ctx, &changes)?;
        Ok(removed)
    }

    /// Deletes a message outright, removing it from every folder.
    ///
    /// The message must be filed in a folder of `account`. A deletion is
    /// recorded for each entry removed, under the account owning its folder.
    pub fn delete_message(
        &self,
        ctx: &Context,
        account: &Account,
        id: MessageId,
    ) -> Result<(), Error> {
        let filed = self.visible_filing(ctx, account, id)?;
        self.repos.messages.delete_messages(ctx, &[id])?;
        info!(
            "{} Deleted message {id} from {} folder(s)",
            self.log_prefix,
            filed.len(),
        );

        let changes = filed
            .iter()
            .map(|&(entry, owner)| {
                ChangeEntry::message(
                    ChangeType::MessageDeleted,
                    owner,
                    Some(entry.folder_id),
                    id,
                    Some(entry.uid),
                    &[],
                )
            })
            .collect::<Vec<_>>();
        self.record(ctx, &changes)
    }

    /// Stores `data` as a new external blob, to be referenced by a part of a
    /// message appended later.
    pub fn write_blob(
        &self,
        ctx: &Context,
        data: &mut dyn Read,
    ) -> Result<BlobRef, Error> {
        let blob = BlobRef::generate();
        let mut writer = self.blobs.create(ctx, &blob)?;
        let len = io::copy(data, &mut writer)?;
        writer.finish()?;
        debug!("{} Wrote {:?} ({len} octets)", self.log_prefix, blob);
        Ok(blob)
    }

    /// Opens the body of the part at `path` within a message for reading,
    /// wherever that body is stored.
    ///
    /// The message must be filed in a folder of `account`.
    pub fn open_part(
        &self,
        ctx: &Context,
        account: &Account,
        message: MessageId,
        path: &MimePath,
    ) -> Result<Box<dyn Read + Send>, Error> {
        self.visible_filing(ctx, account, message)?;
        let message = self.repos.messages.message_by_id(ctx, message)?;
        let part = message.part(path).ok_or(Error::NxPart)?;
        match *part.body() {
            PartBody::Inline(ref data) => {
                Ok(Box::new(io::Cursor::new(data.clone())))
            },
            PartBody::External(ref blob) => self.blobs.open(ctx, blob),
        }
    }

    /// Looks up a folder by id, hiding folders of other accounts.
    pub(super) fn owned_folder(
        &self,
        ctx: &Context,
        account: &Account,
        id: FolderId,
    ) -> Result<Folder, Error> {
        let folder = self.repos.folders.folder_by_id(ctx, id)?;
        if folder.account_id != account.id {
            return Err(Error::NxFolder);
        }
        Ok(folder)
    }

    /// Finds every entry filing message `id`, each with the account owning
    /// its folder.
    ///
    /// Fails with `NxMessage` unless at least one of those folders belongs
    /// to `account`, so that messages of other accounts stay hidden.
    fn visible_filing(
        &self,
        ctx: &Context,
        account: &Account,
        id: MessageId,
    ) -> Result<Vec<(FolderEntry, AccountId)>, Error> {
        let mut filed = Vec::new();
        for entry in self.repos.folders.entries_for_message(ctx, id)? {
            match self.repos.folders.folder_by_id(ctx, entry.folder_id) {
                Ok(folder) => filed.push((entry, folder.account_id)),
                Err(Error::NxFolder) => (),
                Err(e) => return Err(e),
            }
        }

        if filed.iter().any(|&(_, owner)| owner == account.id) {
            Ok(filed)
        } else {
            Err(Error::NxMessage)
        }
    }

    /// Loads the messages referenced by `entries`, keyed by id. Messages
    /// which no longer exist are absent from the result.
    pub(super) fn load_messages(
        &self,
        ctx: &Context,
        entries: &[FolderEntry],
    ) -> Result<HashMap<MessageId, Message>, Error> {
        let ids = entries.iter().map(|e| e.message_id).collect::<Vec<_>>();
        Ok(self
            .repos
            .messages
            .messages_by_ids(ctx, &ids)?
            .into_iter()
            .map(|m| (m.id, m))
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{
        changelog::{ChangePayload, ChangeScope},
        content::ContentPartData,
        message::{test_support::new_message, NewPart},
        uid::Uid,
    };

    fn read_all(mut reader: Box<dyn Read + Send>) -> Vec<u8> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        data
    }

    #[test]
    fn append_and_fetch() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;
        let inbox = fixture.mkdir("INBOX");

        let mut data = new_message("first");
        data.flags = vec![Flag::Draft];
        let (first, message) =
            depot.append(ctx, alice, "INBOX", data).unwrap();
        let second = fixture.append("INBOX", "second");
        assert_eq!(Uid::u(1), first.uid);
        assert_eq!(Uid::u(2), second.uid);

        let fetched =
            depot.fetch(ctx, alice, inbox.id, &UidSet::all()).unwrap();
        assert_eq!(2, fetched.len());
        assert_eq!((first, message.clone()), fetched[0]);
        assert_eq!(second, fetched[1].0);

        let changes = depot
            .repos
            .changes
            .changes(ctx, ChangeScope::Message(message.id), None, None)
            .unwrap();
        assert_eq!(1, changes.len());
        assert_eq!(ChangeType::MessageCreated, changes[0].change_type);
        assert_eq!(Some(inbox.id), changes[0].folder_id);

        assert_matches!(
            Err(Error::NxFolder),
            depot.append(ctx, alice, "Outbox", new_message("lost")),
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            depot.append(ctx, alice, "INBOX", NewMessage::default()),
        );
        assert_eq!(Uid::u(3), fixture.folder("INBOX").uid_next);

        let bob = depot.create_account(ctx, "bob").unwrap();
        assert_matches!(
            Err(Error::NxFolder),
            depot.fetch(ctx, &bob, inbox.id, &UidSet::all()),
        );
    }

    #[test]
    fn store_flag_modes() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;
        let inbox = fixture.mkdir("INBOX");

        let first = fixture.append("INBOX", "one");
        fixture.append("INBOX", "two");
        let all = UidSet::all();
        let flags_of = |uid: Uid| {
            depot
                .fetch(ctx, alice, inbox.id, &UidSet::just(uid))
                .unwrap()
                .remove(0)
                .1
                .flags
        };

        depot
            .store_flags(
                ctx,
                alice,
                inbox.id,
                &all,
                &FlagChange::Add(vec![
                    Flag::Seen,
                    Flag::Keyword("$Work".to_owned()),
                ]),
            )
            .unwrap();
        let result = depot
            .store_flags(
                ctx,
                alice,
                inbox.id,
                &UidSet::just(first.uid),
                &FlagChange::Remove(vec![Flag::Seen]),
            )
            .unwrap();
        assert_eq!(
            vec![(first, vec![Flag::Keyword("$work".to_owned())])],
            result,
        );
        assert_eq!(
            vec![Flag::Seen, Flag::Keyword("$Work".to_owned())],
            flags_of(Uid::u(2)),
        );

        depot
            .store_flags(
                ctx,
                alice,
                inbox.id,
                &all,
                &FlagChange::Replace(vec![Flag::Flagged, Flag::Flagged]),
            )
            .unwrap();
        assert_eq!(vec![Flag::Flagged], flags_of(Uid::u(1)));
        assert_eq!(vec![Flag::Flagged], flags_of(Uid::u(2)));

        let changes = depot
            .repos
            .changes
            .changes(ctx, ChangeScope::Message(first.message_id), None, None)
            .unwrap()
            .into_iter()
            .map(|c| c.change_type)
            .collect::<Vec<_>>();
        assert_eq!(
            vec![
                ChangeType::MessageCreated,
                ChangeType::MessageUpdated,
                ChangeType::MessageUpdated,
                ChangeType::MessageUpdated,
            ],
            changes,
        );
    }

    #[test]
    fn expunge_keeps_messages() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;
        let inbox = fixture.mkdir("INBOX");

        let first = fixture.append("INBOX", "one");
        let second = fixture.append("INBOX", "two");

        assert_eq!(
            vec![first],
            depot
                .expunge(ctx, alice, inbox.id, &UidSet::just(first.uid))
                .unwrap(),
        );
        depot
            .repos
            .messages
            .message_by_id(ctx, first.message_id)
            .unwrap();
        assert_eq!(
            vec![second],
            depot
                .fetch(ctx, alice, inbox.id, &UidSet::all())
                .unwrap()
                .into_iter()
                .map(|(e, _)| e)
                .collect::<Vec<_>>(),
        );
        // UIDs are never reused
        assert_eq!(Uid::u(3), fixture.append("INBOX", "three").uid);

        depot.delete_message(ctx, alice, second.message_id).unwrap();
        assert_eq!(
            1,
            depot
                .fetch(ctx, alice, inbox.id, &UidSet::all())
                .unwrap()
                .len(),
        );
        assert_matches!(
            Err(Error::NxMessage),
            depot.delete_message(ctx, alice, second.message_id),
        );
    }

    #[test]
    fn part_bodies() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;
        fixture.mkdir("INBOX");

        let body = b"a large attachment".to_vec();
        let blob = depot.write_blob(ctx, &mut &body[..]).unwrap();

        let mut data = new_message("inline");
        data.parts.push(NewPart {
            path: "2".parse().unwrap(),
            content: Some(ContentPartData {
                content_type: "application/octet-stream".to_owned(),
                size: body.len() as u32,
                ..ContentPartData::default()
            }),
            inline: None,
            external: Some(blob),
        });
        let (_, message) = depot.append(ctx, alice, "INBOX", data).unwrap();

        assert_eq!(
            body,
            read_all(
                depot
                    .open_part(ctx, alice, message.id, &"2".parse().unwrap())
                    .unwrap()
            ),
        );
        let inline = message.part(&"1.1".parse().unwrap()).unwrap();
        let PartBody::Inline(ref expected) = *inline.body() else {
            panic!("test message part 1.1 is not inline");
        };
        assert_eq!(
            *expected,
            read_all(
                depot
                    .open_part(ctx, alice, message.id, &"1.1".parse().unwrap())
                    .unwrap()
            ),
        );

        let open = |account: &Account, id: MessageId, path: &str| {
            depot
                .open_part(ctx, account, id, &path.parse().unwrap())
                .map(|_| ())
        };
        assert_matches!(Err(Error::NxPart), open(alice, message.id, "3"));
        assert_matches!(
            Err(Error::NxMessage),
            open(alice, MessageId::generate(), "1"),
        );

        let bob = depot.create_account(ctx, "bob").unwrap();
        assert_matches!(Err(Error::NxMessage), open(&bob, message.id, "2"));
    }

    #[test]
    fn delete_message_everywhere() {
        let fixture = TestFixture::new();
        let depot = &fixture.depot;
        let ctx = &fixture.ctx;
        let alice = &fixture.alice;
        let inbox = fixture.mkdir("INBOX");
        let archive = fixture.mkdir("Archive");

        let entry = fixture.append("INBOX", "one");
        fixture.append("Archive", "two");
        let block = depot.repos.folders.next_uid(ctx, archive.id, 1).unwrap();
        let filed_again = FolderEntry {
            folder_id: archive.id,
            message_id: entry.message_id,
            uid: block.first,
        };
        depot.repos.folders.create_entries(ctx, &[filed_again]).unwrap();

        let bob = depot.create_account(ctx, "bob").unwrap();
        assert_matches!(
            Err(Error::NxMessage),
            depot.delete_message(ctx, &bob, entry.message_id),
        );
        assert_eq!(
            2,
            depot
                .repos
                .folders
                .entries_for_message(ctx, entry.message_id)
                .unwrap()
                .len(),
        );

        let cursor = depot
            .repos
            .changes
            .last_change_time(ctx, ChangeScope::Account(alice.id))
            .unwrap();
        depot.delete_message(ctx, alice, entry.message_id).unwrap();

        let deleted_from = |folder: &Folder| {
            let scope = ChangeScope::Folder(folder.id);
            depot
                .repos
                .changes
                .changes(ctx, scope, Some(cursor), None)
                .unwrap()
                .into_iter()
                .map(|c| (c.change_type, c.account_id, c.payload))
                .collect::<Vec<_>>()
        };
        let deleted = |uid| {
            vec![(
                ChangeType::MessageDeleted,
                alice.id,
                ChangePayload::Message {
                    uid: Some(uid),
                    flags: vec![],
                },
            )]
        };
        assert_eq!(deleted(entry.uid), deleted_from(&inbox));
        assert_eq!(deleted(filed_again.uid), deleted_from(&archive));

        assert!(depot
            .fetch(ctx, alice, inbox.id, &UidSet::all())
            .unwrap()
            .is_empty());
        assert_eq!(
            1,
            depot
                .fetch(ctx, alice, archive.id, &UidSet::all())
                .unwrap()
                .len(),
        );
    }
}
