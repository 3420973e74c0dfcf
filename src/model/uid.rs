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

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;
use std::ops::Bound::{Excluded, Included, Unbounded};

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// A folder-local message identifier.
///
/// UIDs are issued strictly sequentially by the owning folder, starting from
/// 1, and are never reused within one UID validity epoch.
#[derive(
    Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct Uid(pub NonZeroU32);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self.0.get())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

impl Uid {
    pub const MIN: Self = Uid(NonZeroU32::MIN);
    pub const MAX: Self = Uid(NonZeroU32::MAX);

    pub fn of(uid: u32) -> Option<Self> {
        NonZeroU32::new(uid).map(Uid)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Uid)
    }

    #[cfg(test)]
    pub fn u(uid: u32) -> Self {
        Uid::of(uid).unwrap()
    }
}

/// A contiguous run of freshly reserved UIDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UidBlock {
    pub first: Uid,
    pub len: u32,
}

impl UidBlock {
    /// Computes the block reserved when a folder whose counter is at
    /// `uid_next` is advanced by `n`, along with the new counter value.
    ///
    /// Fails with `FolderFull` if the counter would pass `u32::MAX`; the last
    /// issuable UID is therefore `u32::MAX - 1`.
    pub fn reserve(uid_next: Uid, n: u32) -> Result<(Self, Uid), Error> {
        if 0 == n {
            return Err(Error::invalid("UID count", "must be positive"));
        }

        let end = uid_next
            .get()
            .checked_add(n)
            .and_then(Uid::of)
            .ok_or(Error::FolderFull)?;
        Ok((
            UidBlock {
                first: uid_next,
                len: n,
            },
            end,
        ))
    }

    pub fn last(&self) -> Uid {
        Uid::of(self.first.get().saturating_add(self.len.saturating_sub(1)))
            .unwrap_or(self.first)
    }

    pub fn iter(&self) -> impl Iterator<Item = Uid> {
        (self.first.get()..self.first.get().saturating_add(self.len))
            .filter_map(Uid::of)
    }

    pub fn to_set(&self) -> UidSet {
        UidSet::range(self.first, self.last())
    }
}

/// A set of UIDs, as used in IMAP `UID` commands.
///
/// Internally, this is maintained as a minimal sorted set of inclusive
/// ranges: overlapping or adjacent intervals are fused on insertion, so no UID
/// is ever listed twice. It does not maintain information on the original
/// fragmentation, ordering, or duplication.
///
/// The `Display` format is the minimal IMAP wire format. IMAP cannot
/// represent an empty set; `Display` produces an empty string in that case.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UidSet {
    parts: BTreeMap<u32, u32>,
}

impl UidSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every possible UID.
    pub fn all() -> Self {
        Self::range(Uid::MIN, Uid::MAX)
    }

    pub fn just(uid: Uid) -> Self {
        Self::range(uid, uid)
    }

    /// A set of one inclusive range. The endpoints may be given in either
    /// order.
    pub fn range(start: Uid, end: Uid) -> Self {
        let mut this = Self::new();
        this.insert(start, end);
        this
    }

    /// Insert the given inclusive range into this set. The endpoints may be
    /// given in either order.
    pub fn insert(&mut self, start: Uid, end: Uid) {
        self.insert_raw(start.get().min(end.get()), start.get().max(end.get()));
    }

    fn insert_raw(&mut self, start_incl: u32, mut end_incl: u32) {
        // Fuse with any later ranges this one overlaps or touches.
        while let Some((following_start, following_end)) = self
            .parts
            .range((Excluded(start_incl), Unbounded))
            .next()
            .map(|(&start, &end)| (start, end))
        {
            if following_start - 1 > end_incl {
                break;
            }

            end_incl = end_incl.max(following_end);
            self.parts.remove(&following_start);
        }

        let preceding = self
            .parts
            .range((Unbounded, Included(end_incl)))
            .next_back()
            .map(|(&start, &end)| (start, end));
        if let Some((preceding_start, preceding_end)) = preceding {
            if preceding_end.saturating_add(1) >= start_incl {
                if start_incl < preceding_start {
                    self.parts.remove(&preceding_start);
                    self.parts.insert(start_incl, end_incl.max(preceding_end));
                } else {
                    self.parts
                        .insert(preceding_start, end_incl.max(preceding_end));
                }
                return;
            }
        }

        self.parts.insert(start_incl, end_incl);
    }

    pub fn contains(&self, uid: Uid) -> bool {
        let v = uid.get();
        self.parts
            .range(..=v)
            .next_back()
            .is_some_and(|(_, &end)| end >= v)
    }

    /// The inclusive ranges making up this set, ascending and disjoint.
    pub fn ranges(&self) -> impl Iterator<Item = (Uid, Uid)> + '_ {
        self.parts.iter().filter_map(|(&start, &end)| {
            Some((Uid::of(start)?, Uid::of(end)?))
        })
    }

    /// All members of this set no greater than `max`, strictly ascending.
    pub fn items(&self, max: Uid) -> impl Iterator<Item = Uid> + '_ {
        let max = max.get();
        self.parts
            .iter()
            .filter(move |&(&start, _)| start <= max)
            .flat_map(move |(&start, &end)| start..=end.min(max))
            .filter_map(Uid::of)
    }

    /// Parse the IMAP format of a UID set.
    ///
    /// `splat` is used as the value of elements which specify `*`.
    pub fn parse(raw: &str, splat: Uid) -> Result<Self, Error> {
        fn element(r: &str, splat: Uid) -> Result<u32, Error> {
            if "*" == r {
                return Ok(splat.get());
            }

            r.parse::<u32>()
                .ok()
                .filter(|&v| v != 0)
                .ok_or_else(|| {
                    Error::invalid("UID set", format!("bad UID {r:?}"))
                })
        }

        let mut this = Self::new();
        for part in raw.split(',') {
            let mut subs = part.split(':');
            match (subs.next(), subs.next(), subs.next()) {
                (Some(only), None, None) => {
                    let only = element(only, splat)?;
                    this.insert_raw(only, only);
                },
                (Some(start), Some(end), None) => {
                    let start = element(start, splat)?;
                    let end = element(end, splat)?;
                    this.insert_raw(start.min(end), end.max(start));
                },
                _ => {
                    return Err(Error::invalid(
                        "UID set",
                        format!("bad range {part:?}"),
                    ))
                },
            }
        }

        Ok(this)
    }

    /// The number of UIDs in this set.
    pub fn len(&self) -> usize {
        self.parts
            .iter()
            .map(|(&start, &end)| (end - start) as usize + 1)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn max(&self) -> Option<Uid> {
        self.parts.values().next_back().copied().and_then(Uid::of)
    }
}

impl FromIterator<Uid> for UidSet {
    fn from_iter<I: IntoIterator<Item = Uid>>(iter: I) -> Self {
        let mut this = Self::new();
        for uid in iter {
            this.insert(uid, uid);
        }
        this
    }
}

impl fmt::Display for UidSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, (&start, &end)) in self.parts.iter().enumerate() {
            let delim = if 0 == ix { "" } else { "," };

            if start == end {
                write!(f, "{delim}{start}")?;
            } else {
                write!(f, "{delim}{start}:{end}")?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for UidSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Uid {self}]")
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn assert_set(
        expected_content: &[u32],
        expected_string: &str,
        set: UidSet,
    ) {
        let actual: Vec<u32> = set.items(Uid::MAX).map(Uid::get).collect();
        assert_eq!(expected_content, &actual[..]);
        assert_eq!(expected_string, &set.to_string());
    }

    #[test]
    fn uid_set_parsing() {
        let p = |s| UidSet::parse(s, Uid::u(10)).unwrap();

        assert_set(&[1], "1", p("1"));
        assert_set(&[10], "10", p("*"));
        assert_set(&[1, 2], "1:2", p("2:1"));
        assert_set(&[9, 10], "9:10", p("*:9"));
        assert_set(&[1, 3, 5], "1,3,5", p("3,5,1"));
        assert_set(&[1, 2, 9, 10], "1:2,9:10", p("*:9,2:1"));

        // Adjacent and overlapping intervals collapse
        assert_set(&[1, 2, 3, 4], "1:4", p("1,2,3,4"));
        assert_set(&[1, 2, 3, 4], "1:4", p("1:2,3:4"));
        assert_set(&[1, 2, 3, 4], "1:4", p("2:3,1:4"));
        assert_set(&[1, 2, 3, 4], "1:4", p("1:4,2,4"));
        assert_set(&[1, 2, 3, 4], "1:4", p("2,4:1,3"));

        assert_matches!(
            Err(Error::Invalid { .. }),
            UidSet::parse("", Uid::MIN)
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            UidSet::parse("0", Uid::MIN)
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            UidSet::parse("1:2:3", Uid::MIN)
        );
        assert_matches!(
            Err(Error::Invalid { .. }),
            UidSet::parse("1,x", Uid::MIN)
        );
    }

    #[test]
    fn uid_set_extremes() {
        let all = UidSet::all();
        assert_eq!(u32::MAX as usize, all.len());
        assert!(all.contains(Uid::MAX));
        assert_eq!(format!("1:{}", u32::MAX), all.to_string());

        let mut set = UidSet::just(Uid::MAX);
        set.insert(Uid::u(u32::MAX - 1), Uid::u(u32::MAX - 1));
        assert_eq!(
            format!("{}:{}", u32::MAX - 1, u32::MAX),
            set.to_string()
        );
    }

    #[test]
    fn uid_block_reservation() {
        let (block, next) = UidBlock::reserve(Uid::u(5), 3).unwrap();
        assert_eq!(Uid::u(5), block.first);
        assert_eq!(Uid::u(7), block.last());
        assert_eq!(Uid::u(8), next);
        assert_eq!(
            vec![5, 6, 7],
            block.iter().map(Uid::get).collect::<Vec<_>>()
        );
        assert_eq!("5:7", block.to_set().to_string());

        assert_matches!(
            Err(Error::Invalid { .. }),
            UidBlock::reserve(Uid::MIN, 0)
        );
        assert_matches!(
            Ok(_),
            UidBlock::reserve(Uid::u(u32::MAX - 2), 2)
        );

        // The last issuable UID is u32::MAX - 1
        let (block, next) =
            UidBlock::reserve(Uid::u(u32::MAX - 1), 1).unwrap();
        assert_eq!(Uid::u(u32::MAX - 1), block.last());
        assert_eq!(Uid::MAX, next);
        assert_matches!(
            Err(Error::FolderFull),
            UidBlock::reserve(Uid::MAX, 1)
        );
        assert_matches!(
            Err(Error::FolderFull),
            UidBlock::reserve(Uid::u(u32::MAX - 1), 2)
        );
    }

    proptest! {
        #[test]
        fn uid_set_properties(
            ranges in prop::collection::vec((1u32..30, 0u32..=10), 1..=5)
        ) {
            let mut expected = Vec::new();
            let mut set = UidSet::new();

            for &(start, extent) in &ranges {
                set.insert(Uid::u(start + extent), Uid::u(start));
                expected.extend(start..=start + extent);
            }

            expected.sort();
            expected.dedup();

            let actual: Vec<u32> = set.items(Uid::MAX).map(Uid::get).collect();
            prop_assert_eq!(&expected, &actual);
            prop_assert_eq!(expected.len(), set.len());

            for i in 1..50 {
                prop_assert_eq!(
                    expected.contains(&i),
                    set.contains(Uid::u(i)),
                    "Bad contains result for {}",
                    i
                );
            }

            prop_assert_eq!(
                &set,
                &UidSet::parse(&set.to_string(), Uid::MAX).unwrap()
            );
            prop_assert_eq!(
                &set,
                &actual.into_iter().map(Uid::u).collect::<UidSet>()
            );
        }
    }
}
