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

//! Bindings for our model types to `rusqlite`.

use std::str::FromStr;

use chrono::prelude::*;
use rusqlite::types::{
    FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::model::{
    account::Account,
    changelog::{ChangeEntry, ChangeType},
    folder::{Folder, Role},
    id::{AccountId, FolderId, MessageId, PartId},
    message::{BlobRef, Flag},
    mime_path::MimePath,
    uid::Uid,
};
use crate::support::clock;

macro_rules! uuid_sql {
    ($t:ident) => {
        impl ToSql for $t {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::Borrowed(ValueRef::Blob(self.as_bytes())))
            }
        }

        impl FromSql for $t {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                <[u8; 16]>::column_result(value).map(Self::from_bytes)
            }
        }
    };
}

uuid_sql!(AccountId);
uuid_sql!(FolderId);
uuid_sql!(MessageId);
uuid_sql!(PartId);

/// Parses a text column through `FromStr`.
fn parse_text<T: FromStr>(value: ValueRef<'_>) -> FromSqlResult<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let ValueRef::Text(as_str) = value else {
        return Err(FromSqlError::InvalidType);
    };
    let Ok(as_str) = std::str::from_utf8(as_str) else {
        return Err(FromSqlError::InvalidType);
    };
    T::from_str(as_str).map_err(|e| FromSqlError::Other(Box::new(e)))
}

impl ToSql for Uid {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(Value::Integer(i64::from(self.get()))))
    }
}

impl FromSql for Uid {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let inner = u32::column_result(value)?;
        Self::of(inner).ok_or(FromSqlError::OutOfRange(inner.into()))
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.name().as_bytes())))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

impl ToSql for ChangeType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.as_str().as_bytes())))
    }
}

impl FromSql for ChangeType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

impl ToSql for BlobRef {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.as_str().as_bytes())))
    }
}

impl FromSql for BlobRef {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        String::column_result(value).and_then(|s| {
            BlobRef::new(s).map_err(|e| FromSqlError::Other(Box::new(e)))
        })
    }
}

impl ToSql for MimePath {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(Value::Text(self.to_string())))
    }
}

impl FromSql for MimePath {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

/// A timestamp stored as integer microseconds since the epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Micros(pub DateTime<Utc>);

impl ToSql for Micros {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(Value::Integer(self.0.timestamp_micros())))
    }
}

impl FromSql for Micros {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let inner = i64::column_result(value)?;
        clock::from_micros(inner)
            .ok_or(FromSqlError::OutOfRange(inner))
            .map(Self)
    }
}

/// A flag set stored as space-separated text.
///
/// Neither system flags nor keywords can contain spaces, so this is
/// unambiguous.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlagList(pub Vec<Flag>);

impl ToSql for FlagList {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        Ok(ToSqlOutput::Owned(Value::Text(joined)))
    }
}

impl FromSql for FlagList {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = String::column_result(value)?;
        text.split_whitespace()
            .map(Flag::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Structured data stored as a CBOR blob.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cbor<T>(pub T);

impl<T: Serialize> ToSql for Cbor<T> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        serde_cbor::to_vec(&self.0)
            .map(|data| ToSqlOutput::Owned(Value::Blob(data)))
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
    }
}

impl<T: DeserializeOwned> FromSql for Cbor<T> {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let ValueRef::Blob(data) = value else {
            return Err(FromSqlError::InvalidType);
        };
        serde_cbor::from_slice(data)
            .map(Self)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// The columns selected wherever a full `Folder` is loaded.
pub const FOLDER_COLUMNS: &str = "`id`, `account_id`, `parent_id`, `name`, \
     `path`, `role`, `subscribed`, `sort_order`, `uid_validity`, \
     `uid_next`, `metadata`, `created_at`, `updated_at`";

impl FromRow for Folder {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let updated_at = row.get::<_, Micros>("updated_at")?.0;
        Ok(Self {
            id: row.get("id")?,
            account_id: row.get("account_id")?,
            parent_id: row.get("parent_id")?,
            name: row.get("name")?,
            path: row.get("path")?,
            role: row.get("role")?,
            subscribed: row.get("subscribed")?,
            sort_order: row.get("sort_order")?,
            uid_validity: row.get("uid_validity")?,
            uid_next: row.get("uid_next")?,
            metadata: row.get::<_, Cbor<_>>("metadata")?.0,
            created_at: row.get::<_, Micros>("created_at")?.0,
            updated_at,
            observed_updated_at: updated_at,
        })
    }
}

pub const ACCOUNT_COLUMNS: &str =
    "`id`, `name`, `metadata`, `created_at`, `updated_at`";

impl FromRow for Account {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            metadata: row.get::<_, Cbor<_>>("metadata")?.0,
            created_at: row.get::<_, Micros>("created_at")?.0,
            updated_at: row.get::<_, Micros>("updated_at")?.0,
        })
    }
}

pub const CHANGE_COLUMNS: &str = "`at`, `type`, `account_id`, `folder_id`, \
     `message_id`, `metadata`, `payload`";

impl FromRow for ChangeEntry {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            at: row.get::<_, Micros>("at")?.0,
            change_type: row.get("type")?,
            account_id: row.get("account_id")?,
            folder_id: row.get("folder_id")?,
            message_id: row.get("message_id")?,
            metadata: row.get::<_, Cbor<_>>("metadata")?.0,
            payload: row.get::<_, Cbor<_>>("payload")?.0,
        })
    }
}

pub fn from_row<T: FromRow>(row: &rusqlite::Row<'_>) -> rusqlite::Result<T> {
    T::from_row(row)
}

pub fn from_single<T: FromSql>(row: &rusqlite::Row<'_>) -> rusqlite::Result<T> {
    row.get(0)
}

pub trait FromRow: Sized {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

macro_rules! from_row_tuple {
    ($($ix:tt: $t:ident),*) => {
        impl<$($t: FromSql,)*> FromRow
        for ($($t,)*) {
            fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
                Ok(($(row.get($ix)?,)*))
            }
        }
    }
}

from_row_tuple!(0: A);
from_row_tuple!(0: A, 1: B);
from_row_tuple!(0: A, 1: B, 2: C);
from_row_tuple!(0: A, 1: B, 2: C, 3: D);
from_row_tuple!(0: A, 1: B, 2: C, 3: D, 4: E);
from_row_tuple!(0: A, 1: B, 2: C, 3: D, 4: E, 5: F);
from_row_tuple!(0: A, 1: B, 2: C, 3: D, 4: E, 5: F, 6: G);
from_row_tuple!(0: A, 1: B, 2: C, 3: D, 4: E, 5: F, 6: G, 7: H);
