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

use std::cmp::Ordering;

use chrono::prelude::*;

use super::id::AccountId;
use super::metadata::Metadata;
use crate::support::{clock, error::Error, safe_name::check_account_name};

#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub id: AccountId,
    /// Globally unique.
    pub name: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: &str) -> Result<Self, Error> {
        check_account_name(name)?;
        let now = clock::now();
        Ok(Self {
            id: AccountId::generate(),
            name: name.to_owned(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Ordering for account listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AccountOrder {
    #[default]
    CreatedAt,
    Name,
}

impl AccountOrder {
    pub fn compare(self, a: &Account, b: &Account) -> Ordering {
        match self {
            AccountOrder::CreatedAt => a
                .created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id)),
            AccountOrder::Name => {
                a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
            },
        }
    }
}
