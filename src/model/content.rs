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

//! Already-parsed structural metadata for messages and their parts.
//!
//! The storage engine never parses MIME itself; whoever ingests a message
//! supplies these.

use std::collections::BTreeMap;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposition {
    pub value: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub mailbox: String,
    pub host: String,
}

/// The RFC 3501 `ENVELOPE` of a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub date: Option<DateTime<Utc>>,
    pub subject: String,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: Vec<String>,
    pub message_id: String,
}

/// Top-level content description of a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentData {
    /// e.g. `multipart/mixed`.
    pub content_type: String,
    pub params: BTreeMap<String, String>,
    pub disposition: Option<Disposition>,
    pub language: Vec<String>,
    pub location: String,
    pub envelope: Envelope,
}

/// Content description of one MIME part.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentPartData {
    pub content_type: String,
    pub params: BTreeMap<String, String>,
    pub disposition: Option<Disposition>,
    pub language: Vec<String>,
    pub location: String,

    pub id: String,
    pub description: String,
    pub encoding: String,
    /// Size of the (encoded) body in octets.
    pub size: u32,
    pub num_lines: u64,

    /// Set for `message/rfc822` parts.
    pub envelope: Option<Envelope>,
}
