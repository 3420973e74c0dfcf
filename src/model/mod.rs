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

//! The domain model: plain data types and the rules that can be checked
//! without touching storage.

pub mod account;
pub mod changelog;
pub mod content;
pub mod entry;
pub mod filter;
pub mod folder;
pub mod id;
pub mod message;
pub mod metadata;
pub mod mime_path;
pub mod tree;
pub mod uid;
