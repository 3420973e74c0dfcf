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

//! Process-wide timestamp source.
//!
//! Every timestamp handed out is truncated to whole microseconds (so it
//! survives a round trip through the database unchanged) and is strictly
//! greater than every timestamp handed out before it in this process, even if
//! the wall clock steps backwards. Change-log cursors and optimistic
//! concurrency anchors both rely on this.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::prelude::*;

static LAST_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

pub fn now() -> DateTime<Utc> {
    let wall = Utc::now().timestamp_micros();
    let mut prev = LAST_MICROS.load(Ordering::Relaxed);
    loop {
        let next = wall.max(prev.saturating_add(1));
        match LAST_MICROS.compare_exchange_weak(
            prev,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return from_micros(next).unwrap_or_default(),
            Err(actual) => prev = actual,
        }
    }
}

/// A fresh timestamp which is also strictly after `prev`, which may have
/// come from another process or a clock that has since stepped backwards.
pub fn now_after(prev: DateTime<Utc>) -> DateTime<Utc> {
    now().max(prev + chrono::Duration::microseconds(1))
}

/// The "zero time", returned when there is nothing to report.
pub fn zero() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

pub fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(
        micros.div_euclid(1_000_000),
        (micros.rem_euclid(1_000_000) * 1000) as u32,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strictly_increasing() {
        let mut prev = now();
        for _ in 0..10_000 {
            let next = now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn now_after_future() {
        let future = now() + chrono::Duration::hours(1);
        assert_eq!(
            future + chrono::Duration::microseconds(1),
            now_after(future)
        );
        let past = now();
        assert!(now_after(past) > past);
    }

    #[test]
    fn micros_round_trip() {
        let t = now();
        assert_eq!(Some(t), from_micros(t.timestamp_micros()));
        assert_eq!(0, t.timestamp_subsec_nanos() % 1000);
        assert_eq!(Some(zero()), from_micros(0));
        assert_eq!(
            Some(Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap()
                + chrono::Duration::microseconds(999_999)),
            from_micros(-1),
        );
    }
}
