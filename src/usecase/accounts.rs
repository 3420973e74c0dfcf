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
use log::{info, warn};

use super::defs::*;
use crate::model::{
    account::{Account, AccountOrder},
    changelog::{ChangeEntry, ChangeType},
};
use crate::support::{context::Context, error::Error};

impl Depot {
    pub fn create_account(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<Account, Error> {
        let account = Account::new(name)?;
        self.repos.accounts.create_account(ctx, &account)?;
        info!(
            "{} Created account {:?} ({})",
            self.log_prefix, account.name, account.id,
        );
        self.record(
            ctx,
            &[ChangeEntry::account(ChangeType::AccountCreated, account.id)],
        )?;
        Ok(account)
    }

    /// Looks an account up by name.
    pub fn account(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<Account, Error> {
        self.repos.accounts.account_by_name(ctx, name)
    }

    pub fn list_accounts(
        &self,
        ctx: &Context,
        created_after: Option<DateTime<Utc>>,
        order: AccountOrder,
    ) -> Result<Vec<Account>, Error> {
        self.repos.accounts.list_accounts(ctx, created_after, order)
    }

    /// Deletes the named account along with all its folders.
    pub fn delete_account(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<(), Error> {
        let account = self.repos.accounts.account_by_name(ctx, name)?;
        self.repos.accounts.delete_account(ctx, account.id)?;
        info!(
            "{} Deleted account {:?} ({})",
            self.log_prefix, account.name, account.id,
        );
        self.record(
            ctx,
            &[ChangeEntry::account(ChangeType::AccountDeleted, account.id)],
        )
    }

    /// Verifies the given credentials and returns the account they unlock,
    /// along with a depot for the session whose log lines name that account.
    ///
    /// `self` and its other clones keep their log prefix unchanged. Unknown
    /// accounts are indistinguishable from bad passwords.
    pub fn authenticate(
        &self,
        ctx: &Context,
        username: &str,
        password: &str,
    ) -> Result<(Account, Depot), Error> {
        let result = self
            .auth
            .login(ctx, username, password)
            .and_then(|name| self.repos.accounts.account_by_name(ctx, &name));
        match result {
            Ok(account) => {
                let session =
                    self.with_log_prefix(self.log_prefix.deep_clone());
                session.log_prefix.set_account(account.name.clone());
                info!("{} Authenticated", session.log_prefix);
                Ok((account, session))
            },
            Err(Error::InvalidCredentials) | Err(Error::NxAccount) => {
                warn!(
                    "{} Rejected login attempt for {:?}",
                    self.log_prefix, username,
                );
                Err(Error::InvalidCredentials)
            },
            Err(e) => Err(e),
        }
    }
}
