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

//! The append-only change ledger used for incremental synchronisation.

use std::fmt;
use std::str::FromStr;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use super::id::{AccountId, FolderId, MessageId};
use super::message::Flag;
use super::metadata::Metadata;
use super::uid::Uid;
use crate::support::{clock, error::Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeType {
    AccountCreated,
    AccountDeleted,
    FolderCreated,
    FolderRenamed,
    FolderUpdated,
    FolderDeleted,
    MessageCreated,
    MessageUpdated,
    MessageDeleted,
}

impl ChangeType {
    const ALL: [ChangeType; 9] = [
        ChangeType::AccountCreated,
        ChangeType::AccountDeleted,
        ChangeType::FolderCreated,
        ChangeType::FolderRenamed,
        ChangeType::FolderUpdated,
        ChangeType::FolderDeleted,
        ChangeType::MessageCreated,
        ChangeType::MessageUpdated,
        ChangeType::MessageDeleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::AccountCreated => "account.created",
            ChangeType::AccountDeleted => "account.deleted",
            ChangeType::FolderCreated => "folder.created",
            ChangeType::FolderRenamed => "folder.renamed",
            ChangeType::FolderUpdated => "folder.updated",
            ChangeType::FolderDeleted => "folder.deleted",
            ChangeType::MessageCreated => "message.created",
            ChangeType::MessageUpdated => "message.updated",
            ChangeType::MessageDeleted => "message.deleted",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        ChangeType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::invalid("change type", s.to_owned()))
    }
}

/// The typed body of a change entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ChangePayload {
    Account,
    Folder {
        /// The path before the change; `None` on creation.
        old_path: Option<String>,
        /// The path after the change; `None` on deletion.
        new_path: Option<String>,
    },
    Message {
        uid: Option<Uid>,
        /// The flags after the change.
        flags: Vec<Flag>,
    },
}

/// One immutable entry in the change log.
///
/// `at` is assigned by the change log when the entry is appended, and
/// doubles as the synchronisation cursor: a consumer that has seen
/// everything up to `at` asks for entries strictly after it.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEntry {
    pub at: DateTime<Utc>,
    pub change_type: ChangeType,
    pub account_id: AccountId,
    pub folder_id: Option<FolderId>,
    pub message_id: Option<MessageId>,
    pub metadata: Metadata,
    pub payload: ChangePayload,
}

impl ChangeEntry {
    pub fn account(change_type: ChangeType, account_id: AccountId) -> Self {
        Self {
            at: clock::now(),
            change_type,
            account_id,
            folder_id: None,
            message_id: None,
            metadata: Metadata::new(),
            payload: ChangePayload::Account,
        }
    }

    pub fn folder(
        change_type: ChangeType,
        account_id: AccountId,
        folder_id: FolderId,
        old_path: Option<&str>,
        new_path: Option<&str>,
    ) -> Self {
        Self {
            at: clock::now(),
            change_type,
            account_id,
            folder_id: Some(folder_id),
            message_id: None,
            metadata: Metadata::new(),
            payload: ChangePayload::Folder {
                old_path: old_path.map(str::to_owned),
                new_path: new_path.map(str::to_owned),
            },
        }
    }

    pub fn message(
        change_type: ChangeType,
        account_id: AccountId,
        folder_id: Option<FolderId>,
        message_id: MessageId,
        uid: Option<Uid>,
        flags: &[Flag],
    ) -> Self {
        Self {
            at: clock::now(),
            change_type,
            account_id,
            folder_id,
            message_id: Some(message_id),
            metadata: Metadata::new(),
            payload: ChangePayload::Message {
                uid,
                flags: flags.to_vec(),
            },
        }
    }

    /// The entry's timestamp as an opaque, monotonically increasing
    /// modification sequence (microseconds since the epoch).
    pub fn mod_seq(&self) -> u64 {
        u64::try_from(self.at.timestamp_micros()).unwrap_or(0)
    }

    pub fn is_in(&self, scope: ChangeScope) -> bool {
        match scope {
            ChangeScope::Account(id) => self.account_id == id,
            ChangeScope::Folder(id) => self.folder_id == Some(id),
            ChangeScope::Message(id) => self.message_id == Some(id),
        }
    }
}

/// Selects the entries relevant to one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeScope {
    Account(AccountId),
    Folder(FolderId),
    Message(MessageId),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn change_type_names_round_trip() {
        for t in ChangeType::ALL {
            assert_eq!(t, t.as_str().parse::<ChangeType>().unwrap());
        }
        assert_eq!("folder.renamed", ChangeType::FolderRenamed.to_string());
        assert_matches!(
            Err(Error::Invalid { .. }),
            "folder.exploded".parse::<ChangeType>()
        );
    }

    #[test]
    fn scopes() {
        let account = AccountId::generate();
        let folder = FolderId::generate();
        let message = MessageId::generate();
        let entry = ChangeEntry::message(
            ChangeType::MessageCreated,
            account,
            Some(folder),
            message,
            Some(Uid::u(4)),
            &[Flag::Seen],
        );

        assert!(entry.is_in(ChangeScope::Account(account)));
        assert!(entry.is_in(ChangeScope::Folder(folder)));
        assert!(entry.is_in(ChangeScope::Message(message)));
        assert!(!entry.is_in(ChangeScope::Folder(FolderId::generate())));
        assert_eq!(entry.at.timestamp_micros() as u64, entry.mod_seq());

        let later = ChangeEntry::account(ChangeType::AccountDeleted, account);
        assert!(later.mod_seq() > entry.mod_seq());
        assert!(!later.is_in(ChangeScope::Message(message)));
    }
}
