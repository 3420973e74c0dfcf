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

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use super::content::{ContentData, ContentPartData};
use super::id::{MessageId, PartId};
use super::metadata::{Metadata, COPY_OF};
use super::mime_path::MimePath;
use crate::support::{clock, error::Error, safe_name::is_safe_name};

/// A message flag.
///
/// System flags are represented as top-level enum values. Keywords are in the
/// `Keyword` case.
///
/// The `Display` format of this type is the exact string value that would be
/// sent over the wire. `FromStr` does the reverse conversion, and also
/// understands non-standard casing of the system flags.
#[derive(Clone, Serialize, Deserialize)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Seen,
    Keyword(String),
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Keyword(ref kw) => write!(f, "{kw}"),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.eq_ignore_ascii_case("\\answered") {
            Ok(Flag::Answered)
        } else if s.eq_ignore_ascii_case("\\deleted") {
            Ok(Flag::Deleted)
        } else if s.eq_ignore_ascii_case("\\draft") {
            Ok(Flag::Draft)
        } else if s.eq_ignore_ascii_case("\\flagged") {
            Ok(Flag::Flagged)
        } else if s.eq_ignore_ascii_case("\\seen") {
            Ok(Flag::Seen)
        } else if s.starts_with('\\') {
            Err(Error::invalid("flag", format!("unknown system flag {s}")))
        } else if !s.is_empty() && s.bytes().all(is_atom_char) {
            Ok(Flag::Keyword(s.to_owned()))
        } else {
            Err(Error::invalid("flag", format!("bad keyword {s:?}")))
        }
    }
}

fn is_atom_char(ch: u8) -> bool {
    !matches!(
        ch,
        0..=b' '
            | 127..=255
            | b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b']'
    )
}

impl PartialEq for Flag {
    fn eq(&self, other: &Flag) -> bool {
        match (self, other) {
            (&Flag::Answered, &Flag::Answered) => true,
            (&Flag::Deleted, &Flag::Deleted) => true,
            (&Flag::Draft, &Flag::Draft) => true,
            (&Flag::Flagged, &Flag::Flagged) => true,
            (&Flag::Seen, &Flag::Seen) => true,
            // Keywords are matched ASCII case-insensitively, as clients
            // expect.
            (&Flag::Keyword(ref a), &Flag::Keyword(ref b)) => {
                a.eq_ignore_ascii_case(b)
            },
            _ => false,
        }
    }
}

impl Eq for Flag {}

/// Appends the flags in `add` not already in `flags`.
pub fn merge_flags(flags: &mut Vec<Flag>, add: impl IntoIterator<Item = Flag>) {
    for flag in add {
        if !flags.contains(&flag) {
            flags.push(flag);
        }
    }
}

/// A change to the flags of one message.
///
/// Stores apply it to the message's current flags in a single atomic step,
/// so concurrent changes from different sessions never undo each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlagChange {
    Add(Vec<Flag>),
    Remove(Vec<Flag>),
    Replace(Vec<Flag>),
}

impl FlagChange {
    /// The flags that result from applying this change to `flags`, without
    /// duplicates.
    pub fn apply(&self, flags: &[Flag]) -> Vec<Flag> {
        let mut result = Vec::with_capacity(flags.len());
        match *self {
            FlagChange::Add(ref add) => {
                merge_flags(&mut result, flags.iter().cloned());
                merge_flags(&mut result, add.iter().cloned());
            },
            FlagChange::Remove(ref remove) => merge_flags(
                &mut result,
                flags.iter().filter(|f| !remove.contains(f)).cloned(),
            ),
            FlagChange::Replace(ref replace) => {
                merge_flags(&mut result, replace.iter().cloned());
            },
        }
        result
    }
}

/// An opaque reference into the blob store.
///
/// This is a relative path of one or more `/`-separated components, each of
/// which must be a safe file name.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(path: impl Into<String>) -> Result<Self, Error> {
        let path = path.into();
        if path.split('/').all(is_safe_name) {
            Ok(Self(path))
        } else {
            Err(Error::invalid("blob path", format!("unsafe path {path:?}")))
        }
    }

    /// A fresh, unique reference, fanned out over 256 directories by the
    /// final (random) octet of a time-ordered id.
    pub fn generate() -> Self {
        let id = uuid::Uuid::now_v7().simple().to_string();
        Self(format!("{}/{}", &id[30..], id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BlobRef({})", self.0)
    }
}

/// Where a part's body lives.
#[derive(Clone, PartialEq, Eq)]
pub enum PartBody {
    Inline(Vec<u8>),
    External(BlobRef),
}

impl fmt::Debug for PartBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PartBody::Inline(ref data) => {
                write!(f, "Inline({} octets)", data.len())
            },
            PartBody::External(ref blob) => write!(f, "External({})", blob.0),
        }
    }
}

/// One MIME part of a message. Immutable once attached.
#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    id: PartId,
    path: MimePath,
    content: ContentPartData,
    body: PartBody,
}

impl Part {
    /// Reassembles a part loaded from storage.
    pub fn restore(
        id: PartId,
        path: MimePath,
        content: ContentPartData,
        body: PartBody,
    ) -> Self {
        Self {
            id,
            path,
            content,
            body,
        }
    }

    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn path(&self) -> &MimePath {
        &self.path
    }

    pub fn content(&self) -> &ContentPartData {
        &self.content
    }

    pub fn body(&self) -> &PartBody {
        &self.body
    }
}

/// A stored message.
///
/// `flags` and `metadata` may change over the message's life; everything
/// else is fixed at creation. Parts are shared (not duplicated) between a
/// message and its copies.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Metadata,
    pub flags: Vec<Flag>,
    pub content: ContentData,
    parts: Arc<[Part]>,
}

/// Input for a new message.
#[derive(Clone, Debug, Default)]
pub struct NewMessage {
    /// The IMAP internal date. Defaults to the creation time.
    pub received_at: Option<DateTime<Utc>>,
    pub flags: Vec<Flag>,
    pub content: Option<ContentData>,
    pub parts: Vec<NewPart>,
}

/// Input for one part of a new message.
#[derive(Clone, Debug, Default)]
pub struct NewPart {
    pub path: MimePath,
    pub content: Option<ContentPartData>,
    pub inline: Option<Vec<u8>>,
    pub external: Option<BlobRef>,
}

impl NewPart {
    fn into_part(self) -> Result<Part, String> {
        if self.path.is_empty() {
            return Err("empty part path".to_owned());
        }

        let content = self.content.ok_or("no content data")?;
        let body = match (self.inline, self.external) {
            (Some(inline), None) => {
                if inline.len() != content.size as usize {
                    return Err(format!(
                        "inline body ({} octets) does not match size ({})",
                        inline.len(),
                        content.size,
                    ));
                }
                PartBody::Inline(inline)
            },
            (None, Some(external)) => PartBody::External(external),
            (None, None) => return Err("no body content".to_owned()),
            (Some(_), Some(_)) => {
                return Err("both inline and external body".to_owned())
            },
        };

        Ok(Part {
            id: PartId::generate(),
            path: self.path,
            content,
            body,
        })
    }
}

impl Message {
    /// Validates `data` and builds a new message from it.
    ///
    /// All validation happens here, before anything reaches storage.
    pub fn new(data: NewMessage) -> Result<Self, Error> {
        let content = data
            .content
            .ok_or_else(|| Error::invalid("message", "no content data"))?;
        if data.parts.is_empty() {
            return Err(Error::invalid("message", "no parts"));
        }

        let mut parts = Vec::with_capacity(data.parts.len());
        for (ix, part) in data.parts.into_iter().enumerate() {
            let part = part.into_part().map_err(|reason| {
                Error::invalid("message part", format!("index {ix}: {reason}"))
            })?;
            if parts.iter().any(|p: &Part| p.path == part.path) {
                return Err(Error::invalid(
                    "message part",
                    format!("index {ix}: duplicate path {}", part.path),
                ));
            }
            parts.push(part);
        }

        let mut flags = Vec::with_capacity(data.flags.len());
        merge_flags(&mut flags, data.flags);

        let now = clock::now();
        Ok(Self {
            id: MessageId::generate(),
            received_at: data.received_at.unwrap_or(now),
            created_at: now,
            updated_at: now,
            metadata: Metadata::new(),
            flags,
            content,
            parts: parts.into(),
        })
    }

    /// Reassembles a message loaded from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: MessageId,
        received_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        metadata: Metadata,
        flags: Vec<Flag>,
        content: ContentData,
        parts: Vec<Part>,
    ) -> Self {
        Self {
            id,
            received_at,
            created_at,
            updated_at,
            metadata,
            flags,
            content,
            parts: parts.into(),
        }
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, path: &MimePath) -> Option<&Part> {
        self.parts.iter().find(|p| p.path == *path)
    }

    pub fn has_flag(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Whether `self` and `other` share the same part storage.
    pub fn shares_parts_with(&self, other: &Message) -> bool {
        Arc::ptr_eq(&self.parts, &other.parts)
    }

    /// Total size in octets: the sum of the sizes of the leaf parts (those
    /// with no parts nested inside them), since container parts' sizes
    /// include their children.
    pub fn size(&self) -> u64 {
        self.parts
            .iter()
            .filter(|p| !self.parts.iter().any(|q| q.path.is_inside(&p.path)))
            .map(|p| u64::from(p.content.size))
            .sum()
    }

    /// Derives a copy of this message.
    ///
    /// The copy has a new id and fresh creation/update times, the same
    /// received time, flags, content, and (shared) parts, and metadata
    /// recording the source's id under `COPY_OF`. `self` is not modified.
    pub fn derive_copy(&self) -> Message {
        let mut metadata = self.metadata.clone();
        metadata.set(COPY_OF, self.id.to_string());

        let now = clock::now();
        Message {
            id: MessageId::generate(),
            received_at: self.received_at,
            created_at: now,
            updated_at: now,
            metadata,
            flags: self.flags.clone(),
            content: self.content.clone(),
            parts: Arc::clone(&self.parts),
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// A valid two-part message: a multipart container with one inline text
    /// part.
    pub fn new_message(body: &str) -> NewMessage {
        NewMessage {
            received_at: None,
            flags: vec![],
            content: Some(ContentData {
                content_type: "multipart/mixed".to_owned(),
                ..ContentData::default()
            }),
            parts: vec![
                NewPart {
                    path: "1".parse().unwrap(),
                    content: Some(ContentPartData {
                        content_type: "multipart/alternative".to_owned(),
                        size: body.len() as u32 + 100,
                        ..ContentPartData::default()
                    }),
                    inline: Some(vec![b'x'; body.len() + 100]),
                    external: None,
                },
                NewPart {
                    path: "1.1".parse().unwrap(),
                    content: Some(ContentPartData {
                        content_type: "text/plain".to_owned(),
                        size: body.len() as u32,
                        ..ContentPartData::default()
                    }),
                    inline: Some(body.as_bytes().to_vec()),
                    external: None,
                },
            ],
        }
    }
}

#[cfg(test)]
mod test {
    use super::test_support::new_message;
    use super::*;

    #[test]
    fn flag_parsing() {
        assert_eq!(Flag::Seen, "\\SEEN".parse::<Flag>().unwrap());
        assert_eq!(
            Flag::Keyword("$Junk".to_owned()),
            "$junk".parse::<Flag>().unwrap()
        );
        assert_eq!("\\Flagged", Flag::Flagged.to_string());
        assert_matches!(Err(Error::Invalid { .. }), "\\Recent".parse::<Flag>());
        assert_matches!(Err(Error::Invalid { .. }), "a b".parse::<Flag>());
        assert_matches!(Err(Error::Invalid { .. }), "".parse::<Flag>());

        let mut flags = vec![Flag::Seen];
        merge_flags(
            &mut flags,
            vec![
                Flag::Seen,
                Flag::Keyword("x".to_owned()),
                Flag::Keyword("X".to_owned()),
            ],
        );
        assert_eq!(vec![Flag::Seen, Flag::Keyword("x".to_owned())], flags);
    }

    #[test]
    fn flag_changes() {
        let work = || Flag::Keyword("$Work".to_owned());
        let current = [Flag::Seen, work()];

        assert_eq!(
            vec![Flag::Seen, work(), Flag::Flagged],
            FlagChange::Add(vec![Flag::Flagged, Flag::Seen]).apply(&current),
        );
        assert_eq!(
            vec![Flag::Seen],
            FlagChange::Remove(vec![Flag::Keyword("$work".to_owned())])
                .apply(&current),
        );
        assert_eq!(
            vec![Flag::Deleted],
            FlagChange::Replace(vec![Flag::Deleted, Flag::Deleted])
                .apply(&current),
        );
        assert_eq!(
            current.to_vec(),
            FlagChange::Remove(vec![Flag::Draft]).apply(&current),
        );
    }

    #[test]
    fn blob_refs() {
        assert!(BlobRef::new("ab/0189abcd").is_ok());
        assert_matches!(Err(Error::Invalid { .. }), BlobRef::new(""));
        assert_matches!(
            Err(Error::Invalid { .. }),
            BlobRef::new("/etc/passwd")
        );
        assert_matches!(Err(Error::Invalid { .. }), BlobRef::new("a/../b"));
        assert_matches!(Err(Error::Invalid { .. }), BlobRef::new("a//b"));

        let fresh = BlobRef::generate();
        assert!(BlobRef::new(fresh.as_str()).is_ok());
        assert_ne!(fresh, BlobRef::generate());
    }

    #[test]
    fn new_message_defaults() {
        let mut data = new_message("hello");
        data.flags = vec![Flag::Seen, Flag::Seen];
        let message = Message::new(data).unwrap();

        assert_eq!(message.created_at, message.received_at);
        assert_eq!(vec![Flag::Seen], message.flags);
        assert_eq!(2, message.parts().len());
        assert_eq!(5, message.size());
        assert_eq!(
            Some(&PartBody::Inline(b"hello".to_vec())),
            message.part(&"1.1".parse().unwrap()).map(Part::body)
        );
    }

    #[test]
    fn new_message_validation() {
        let check = |f: &dyn Fn(&mut NewMessage)| {
            let mut data = new_message("hello");
            f(&mut data);
            Message::new(data)
        };

        assert_matches!(
            Err(Error::Invalid { .. }),
            check(&|m| m.content = None)
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            check(&|m| m.parts.clear())
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            check(&|m| m.parts[1].content = None)
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            check(&|m| m.parts[1].inline = None)
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            check(&|m| {
                m.parts[1].external = Some(BlobRef::new("b").unwrap())
            })
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            check(&|m| m.parts[1].inline = Some(b"hello!".to_vec()))
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            check(&|m| m.parts[1].path = MimePath::empty())
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            check(&|m| m.parts[1].path = "1".parse().unwrap())
        );
        assert_matches!(
            Ok(_),
            check(&|m| {
                m.parts[1].inline = None;
                m.parts[1].external = Some(BlobRef::new("b").unwrap());
            })
        );
    }

    #[test]
    fn derive_copy() {
        let mut data = new_message("hello");
        data.flags = vec![Flag::Flagged];
        let mut source = Message::new(data).unwrap();
        source.metadata.set("origin", "lmtp");
        let before = source.clone();

        let copy = source.derive_copy();
        assert_eq!(before, source);
        assert_ne!(source.id, copy.id);
        assert!(copy.created_at > source.created_at);
        assert_eq!(source.received_at, copy.received_at);
        assert_eq!(
            Some(source.id.to_string().as_str()),
            copy.metadata.get(COPY_OF)
        );
        assert_eq!(Some("lmtp"), copy.metadata.get("origin"));
        assert_eq!(None, source.metadata.get(COPY_OF));
        assert_eq!(source.flags, copy.flags);
        assert!(copy.shares_parts_with(&source));
        assert_eq!(
            source.parts().iter().map(Part::id).collect::<Vec<_>>(),
            copy.parts().iter().map(Part::id).collect::<Vec<_>>()
        );
    }
}
