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

use chrono::prelude::*;
use rusqlite::OptionalExtension as _;

use super::types::*;
use crate::model::{
    account::{Account, AccountOrder},
    id::AccountId,
};
use crate::support::error::Error;

pub fn create_account(
    cxn: &rusqlite::Connection,
    account: &Account,
) -> Result<(), Error> {
    if 0 != cxn.query_row(
        "SELECT COUNT(*) FROM `account` WHERE `name` = ?",
        (&account.name,),
        from_single::<i64>,
    )? {
        return Err(Error::AccountExists);
    }

    cxn.execute(
        "INSERT INTO `account` (\
           `id`, `name`, `metadata`, `created_at`, `updated_at`\
         ) VALUES (?, ?, ?, ?, ?)",
        (
            account.id,
            &account.name,
            Cbor(&account.metadata),
            Micros(account.created_at),
            Micros(account.updated_at),
        ),
    )?;
    Ok(())
}

pub fn account_by_id(
    cxn: &rusqlite::Connection,
    id: AccountId,
) -> Result<Account, Error> {
    cxn.prepare_cached(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM `account` WHERE `id` = ?"
    ))?
    .query_row((id,), from_row)
    .optional()?
    .ok_or(Error::NxAccount)
}

pub fn account_by_name(
    cxn: &rusqlite::Connection,
    name: &str,
) -> Result<Account, Error> {
    cxn.prepare_cached(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM `account` WHERE `name` = ?"
    ))?
    .query_row((name,), from_row)
    .optional()?
    .ok_or(Error::NxAccount)
}

pub fn list_accounts(
    cxn: &rusqlite::Connection,
    created_after: Option<DateTime<Utc>>,
    order: AccountOrder,
) -> Result<Vec<Account>, Error> {
    let order = match order {
        AccountOrder::CreatedAt => "`created_at`, `id`",
        AccountOrder::Name => "`name`, `id`",
    };

    cxn.prepare_cached(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM `account` \
         WHERE ?1 IS NULL OR `created_at` > ?1 \
         ORDER BY {order}"
    ))?
    .query_map((created_after.map(Micros),), from_row)?
    .collect::<Result<Vec<_>, _>>()
    .map_err(Into::into)
}

/// Deletes the account. Its folders, and their entries, go by cascade.
pub fn delete_account(
    cxn: &rusqlite::Connection,
    id: AccountId,
) -> Result<(), Error> {
    if 0 == cxn.execute("DELETE FROM `account` WHERE `id` = ?", (id,))? {
        return Err(Error::NxAccount);
    }
    Ok(())
}
