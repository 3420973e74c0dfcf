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

use log::info;

use super::types::*;
use crate::support::{clock, error::Error, log_prefix::LogPrefix};

pub static MIGRATIONS: &[&str] = &[include_str!("depot.v1.sql")];

/// Brings the schema of `cxn` up to date with `migrations`, where element `i`
/// upgrades the schema from version `i` to `i + 1`.
pub fn apply_migrations(
    log_prefix: &LogPrefix,
    cxn: &mut rusqlite::Connection,
    migrations: &[&str],
) -> Result<(), Error> {
    let latest_version = migrations.len();

    if Ok(Some(latest_version))
        == cxn.query_row(
            "SELECT MAX(`version`) FROM `migration`",
            (),
            from_single::<Option<usize>>,
        )
    {
        return Ok(());
    }

    let txn = cxn
        .transaction_with_behavior(rusqlite::TransactionBehavior::Exclusive)?;
    txn.execute(
        "CREATE TABLE IF NOT EXISTS `migration` (\
         `version` INTEGER NOT NULL PRIMARY KEY, \
         `applied_at` INTEGER NOT NULL\
         ) STRICT",
        (),
    )?;

    let current_version = txn
        .query_row(
            "SELECT MAX(`version`) FROM `migration`",
            (),
            from_single::<Option<usize>>,
        )?
        .unwrap_or(0);

    for (version, migration) in migrations
        .iter()
        .copied()
        .enumerate()
        .map(|(ix, migration)| (ix + 1, migration))
        .skip(current_version)
    {
        info!("{log_prefix} Applying #{version} migration");
        txn.execute_batch(migration)?;
        txn.execute(
            "INSERT INTO `migration` (`version`, `applied_at`) \
             VALUES (?, ?)",
            (version, Micros(clock::now())),
        )?;
    }

    txn.commit()?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn migrations_apply_once_and_resume() {
        let log_prefix = LogPrefix::new("test");
        let mut cxn = rusqlite::Connection::open_in_memory().unwrap();

        apply_migrations(&log_prefix, &mut cxn, &["CREATE TABLE a (x) STRICT"])
            .unwrap_err();
        apply_migrations(
            &log_prefix,
            &mut cxn,
            &["CREATE TABLE `a` (`x` INTEGER) STRICT"],
        )
        .unwrap();
        // Re-running with an extra migration only applies the new one
        apply_migrations(
            &log_prefix,
            &mut cxn,
            &[
                "CREATE TABLE `a` (`x` INTEGER) STRICT",
                "CREATE TABLE `b` (`y` INTEGER) STRICT",
            ],
        )
        .unwrap();

        assert_eq!(
            2,
            cxn.query_row(
                "SELECT MAX(`version`) FROM `migration`",
                (),
                from_single::<i64>,
            )
            .unwrap()
        );
        cxn.execute("INSERT INTO `b` (`y`) VALUES (1)", ()).unwrap();
    }
}
