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

use super::types::*;
use crate::model::changelog::{ChangeEntry, ChangeScope};
use crate::support::{clock, error::Error};

fn scope_column(scope: ChangeScope) -> &'static str {
    match scope {
        ChangeScope::Account(_) => "`account_id`",
        ChangeScope::Folder(_) => "`folder_id`",
        ChangeScope::Message(_) => "`message_id`",
    }
}

fn scope_key(scope: ChangeScope) -> [u8; 16] {
    match scope {
        ChangeScope::Account(id) => *id.as_bytes(),
        ChangeScope::Folder(id) => *id.as_bytes(),
        ChangeScope::Message(id) => *id.as_bytes(),
    }
}

pub fn append_changes(
    cxn: &rusqlite::Connection,
    changes: &[ChangeEntry],
) -> Result<(), Error> {
    let mut stmt = cxn.prepare_cached(
        "INSERT INTO `change_log` (\
           `at`, `type`, `account_id`, `folder_id`, `message_id`, \
           `metadata`, `payload`\
         ) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )?;

    let mut last = cxn
        .prepare_cached("SELECT MAX(`at`) FROM `change_log`")?
        .query_row((), from_single::<Option<Micros>>)?
        .map(|m| m.0);
    for change in changes {
        let at = last.map_or_else(clock::now, clock::now_after);
        last = Some(at);
        stmt.execute((
            Micros(at),
            change.change_type,
            change.account_id,
            change.folder_id,
            change.message_id,
            Cbor(&change.metadata),
            Cbor(&change.payload),
        ))?;
    }

    Ok(())
}

pub fn changes(
    cxn: &rusqlite::Connection,
    scope: ChangeScope,
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
) -> Result<Vec<ChangeEntry>, Error> {
    // LIMIT -1 means no limit
    let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));

    cxn.prepare_cached(&format!(
        "SELECT {CHANGE_COLUMNS} FROM `change_log` \
         WHERE {} = ?1 AND (?2 IS NULL OR `at` > ?2) \
         ORDER BY `at`, `seq` \
         LIMIT ?3",
        scope_column(scope),
    ))?
    .query_map((scope_key(scope), since.map(Micros), limit), from_row)?
    .collect::<Result<Vec<_>, _>>()
    .map_err(Into::into)
}

pub fn last_change_time(
    cxn: &rusqlite::Connection,
    scope: ChangeScope,
) -> Result<DateTime<Utc>, Error> {
    let last = cxn
        .prepare_cached(&format!(
            "SELECT MAX(`at`) FROM `change_log` WHERE {} = ?",
            scope_column(scope),
        ))?
        .query_row((scope_key(scope),), from_single::<Option<Micros>>)?;
    Ok(last.map_or_else(clock::zero, |m| m.0))
}
