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

use rusqlite::OptionalExtension as _;

use super::types::*;
use crate::model::{
    content::{ContentData, ContentPartData},
    id::{MessageId, PartId},
    message::{BlobRef, Flag, FlagChange, Message, Part, PartBody},
    metadata::Metadata,
    mime_path::MimePath,
};
use crate::support::{clock, error::Error};

pub fn create_messages(
    cxn: &rusqlite::Connection,
    messages: &[Message],
) -> Result<(), Error> {
    for message in messages {
        cxn.prepare_cached(
            "INSERT INTO `message` (\
               `id`, `received_at`, `created_at`, `updated_at`, \
               `metadata`, `flags`, `content`\
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?
        .execute((
            message.id,
            Micros(message.received_at),
            Micros(message.created_at),
            Micros(message.updated_at),
            Cbor(&message.metadata),
            FlagList(message.flags.clone()),
            Cbor(&message.content),
        ))?;

        for (ordinal, part) in message.parts().iter().enumerate() {
            let (inline, external) = match *part.body() {
                PartBody::Inline(ref data) => (Some(data.as_slice()), None),
                PartBody::External(ref blob) => (None, Some(blob)),
            };

            // Copies share their source's parts, which may already exist
            cxn.prepare_cached(
                "INSERT OR IGNORE INTO `part` (\
                   `id`, `path`, `content`, `inline`, `external`\
                 ) VALUES (?, ?, ?, ?, ?)",
            )?
            .execute((
                part.id(),
                part.path(),
                Cbor(part.content()),
                inline,
                external,
            ))?;

            cxn.prepare_cached(
                "INSERT INTO `message_part` (\
                   `message_id`, `ordinal`, `part_id`\
                 ) VALUES (?, ?, ?)",
            )?
            .execute((message.id, ordinal, part.id()))?;
        }
    }

    Ok(())
}

fn load_parts(
    cxn: &rusqlite::Connection,
    id: MessageId,
) -> Result<Vec<Part>, Error> {
    let rows = cxn
        .prepare_cached(
            "SELECT `part`.`id`, `part`.`path`, `part`.`content`, \
                    `part`.`inline`, `part`.`external` \
             FROM `message_part` \
             JOIN `part` ON `part`.`id` = `message_part`.`part_id` \
             WHERE `message_part`.`message_id` = ? \
             ORDER BY `message_part`.`ordinal`",
        )?
        .query_map(
            (id,),
            from_row::<(
                PartId,
                MimePath,
                Cbor<ContentPartData>,
                Option<Vec<u8>>,
                Option<BlobRef>,
            )>,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, path, content, inline, external)| {
            let body = match (inline, external) {
                (Some(data), None) => PartBody::Inline(data),
                (None, Some(blob)) => PartBody::External(blob),
                _ => {
                    return Err(Error::invalid(
                        "stored part",
                        format!("{id} does not have exactly one body"),
                    ))
                },
            };
            Ok(Part::restore(id, path, content.0, body))
        })
        .collect()
}

pub fn message_by_id(
    cxn: &rusqlite::Connection,
    id: MessageId,
) -> Result<Message, Error> {
    let (received_at, created_at, updated_at, metadata, flags, content) = cxn
        .prepare_cached(
            "SELECT `received_at`, `created_at`, `updated_at`, \
                    `metadata`, `flags`, `content` \
             FROM `message` WHERE `id` = ?",
        )?
        .query_row(
            (id,),
            from_row::<(
                Micros,
                Micros,
                Micros,
                Cbor<Metadata>,
                FlagList,
                Cbor<ContentData>,
            )>,
        )
        .optional()?
        .ok_or(Error::NxMessage)?;

    Ok(Message::restore(
        id,
        received_at.0,
        created_at.0,
        updated_at.0,
        metadata.0,
        flags.0,
        content.0,
        load_parts(cxn, id)?,
    ))
}

pub fn messages_by_ids(
    cxn: &rusqlite::Connection,
    ids: &[MessageId],
) -> Result<Vec<Message>, Error> {
    let mut messages = Vec::with_capacity(ids.len());
    for &id in ids {
        match message_by_id(cxn, id) {
            Ok(message) => messages.push(message),
            Err(Error::NxMessage) => {},
            Err(e) => return Err(e),
        }
    }
    Ok(messages)
}

/// Must run inside a write transaction, which makes the read and the
/// update one atomic step.
pub fn change_message_flags(
    cxn: &rusqlite::Connection,
    id: MessageId,
    change: &FlagChange,
) -> Result<Option<Vec<Flag>>, Error> {
    let FlagList(current) = cxn
        .prepare_cached("SELECT `flags` FROM `message` WHERE `id` = ?")?
        .query_row((id,), from_single::<FlagList>)
        .optional()?
        .ok_or(Error::NxMessage)?;

    let flags = change.apply(&current);
    if flags == current {
        return Ok(None);
    }

    cxn.prepare_cached(
        "UPDATE `message` SET \
           `flags` = ?, `updated_at` = MAX(?, `updated_at` + 1) \
         WHERE `id` = ?",
    )?
    .execute((FlagList(flags.clone()), Micros(clock::now()), id))?;
    Ok(Some(flags))
}

/// Deletes the messages, along with (by cascade) their entries, then any
/// parts no longer used by any message.
pub fn delete_messages(
    cxn: &rusqlite::Connection,
    ids: &[MessageId],
) -> Result<(), Error> {
    let mut parts = Vec::new();
    for &id in ids {
        if 0 == cxn
            .prepare_cached("SELECT COUNT(*) FROM `message` WHERE `id` = ?")?
            .query_row((id,), from_single::<i64>)?
        {
            return Err(Error::NxMessage);
        }

        let mut stmt = cxn.prepare_cached(
            "SELECT `part_id` FROM `message_part` WHERE `message_id` = ?",
        )?;
        for part in stmt.query_map((id,), from_single::<PartId>)? {
            parts.push(part?);
        }
    }

    for &id in ids {
        cxn.prepare_cached("DELETE FROM `message` WHERE `id` = ?")?
            .execute((id,))?;
    }

    for part in parts {
        cxn.prepare_cached(
            "DELETE FROM `part` WHERE `id` = ?1 AND NOT EXISTS (\
               SELECT 1 FROM `message_part` WHERE `part_id` = ?1\
             )",
        )?
        .execute((part,))?;
    }

    Ok(())
}
