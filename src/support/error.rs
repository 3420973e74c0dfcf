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

use std::io;

use thiserror::Error;

/// The broad category of an `Error`.
///
/// The protocol layer decides what a remote client sees based solely on the
/// kind; the specific variant is for logs and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    LogicError,
    Validation,
    DanglingReference,
    Conflict,
    Cancelled,
    Unauthenticated,
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("No such account")]
    NxAccount,
    #[error("No such folder")]
    NxFolder,
    #[error("No such message")]
    NxMessage,
    #[error("No such folder entry")]
    NxEntry,
    #[error("No such message part")]
    NxPart,
    #[error("No such blob")]
    NxBlob,
    #[error("Account already exists")]
    AccountExists,
    #[error("Folder already exists")]
    FolderExists,
    #[error("UID already in use in folder")]
    UidInUse,
    #[error("Blob already exists")]
    BlobExists,
    #[error("Folder has children")]
    FolderHasChildren,
    #[error("Cannot move folder into its own subtree")]
    RenameIntoSelf,
    #[error("Parent folder belongs to a different account")]
    ForeignParent,
    #[error("Folder UID space exhausted")]
    FolderFull,
    #[error("UID was never allocated by folder")]
    UnallocatedUid,
    #[error("Write attempted in read-only transaction")]
    ReadOnlyTransaction,
    #[error("Invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
    #[error("Folder entry references a message that does not exist")]
    DanglingEntry,
    #[error("Folder was modified or deleted since it was read")]
    StaleFolder,
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Lock poisoned by a panicked writer")]
    Poisoned,
    #[error("Transaction committed without producing a result")]
    NoTransactionResult,
    #[error("{operation} aborted: {source}")]
    Aborted {
        operation: &'static str,
        source: Box<Error>,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Cbor(#[from] serde_cbor::error::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Wraps `self` as the cause of an aborted multi-step operation.
    ///
    /// Cancellation passes through unchanged so that callers can still tell
    /// it apart from a backend failure.
    pub fn abort(self, operation: &'static str) -> Self {
        match self.kind() {
            ErrorKind::Cancelled => self,
            _ => Error::Aborted {
                operation,
                source: Box::new(self),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::NxAccount
            | Error::NxFolder
            | Error::NxMessage
            | Error::NxEntry
            | Error::NxPart
            | Error::NxBlob => ErrorKind::NotFound,

            Error::AccountExists
            | Error::FolderExists
            | Error::UidInUse
            | Error::BlobExists => ErrorKind::AlreadyExists,

            Error::FolderHasChildren
            | Error::RenameIntoSelf
            | Error::ForeignParent
            | Error::FolderFull
            | Error::UnallocatedUid
            | Error::ReadOnlyTransaction => ErrorKind::LogicError,

            Error::Invalid { .. } => ErrorKind::Validation,
            Error::DanglingEntry => ErrorKind::DanglingReference,
            Error::StaleFolder => ErrorKind::Conflict,
            Error::Cancelled | Error::DeadlineExceeded => ErrorKind::Cancelled,
            Error::InvalidCredentials => ErrorKind::Unauthenticated,

            Error::Poisoned
            | Error::NoTransactionResult
            | Error::Aborted { .. }
            | Error::Io(..)
            | Error::Sqlite(..)
            | Error::Cbor(..)
            | Error::Toml(..) => ErrorKind::Internal,
        }
    }

    /// Text that may be shown to a remote client.
    ///
    /// Internal errors never leak their cause; the protocol layer attaches
    /// its own correlation id to those.
    pub fn caller_text(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal storage error".to_owned(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn abort_wraps_everything_but_cancellation() {
        assert_eq!(
            ErrorKind::Internal,
            Error::NxMessage.abort("copy").kind()
        );
        assert_matches!(
            Error::Aborted {
                operation: "copy",
                ..
            },
            Error::UidInUse.abort("copy")
        );
        assert_matches!(Error::Cancelled, Error::Cancelled.abort("copy"));
        assert_matches!(
            Error::DeadlineExceeded,
            Error::DeadlineExceeded.abort("move")
        );
    }

    #[test]
    fn internal_text_is_opaque() {
        let err =
            Error::Io(io::Error::new(io::ErrorKind::Other, "disk on fire"));
        assert_eq!("Internal storage error", err.caller_text());
        assert_eq!("No such folder", Error::NxFolder.caller_text());
        assert_eq!(
            "Invalid folder name: contains path separator",
            Error::invalid("folder name", "contains path separator")
                .caller_text()
        );
    }
}
