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

use super::id::{FolderId, MessageId};
use super::uid::Uid;

/// Places one message into one folder under a folder-local UID.
///
/// `(folder_id, uid)` is unique. Deleting an entry never deletes the message;
/// deleting the message deletes every entry referring to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FolderEntry {
    pub folder_id: FolderId,
    pub message_id: MessageId,
    pub uid: Uid,
}
