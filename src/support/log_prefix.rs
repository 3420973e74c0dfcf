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
use std::sync::{Arc, Mutex};

/// Tracks text that should be included at the start of every log statement.
///
/// Clones of a `LogPrefix` share the same underlying data, so a session layer
/// can set the account once it is known and every use case it handed the
/// prefix to picks it up.
#[derive(Clone)]
pub struct LogPrefix {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone)]
struct Inner {
    component: String,
    account: Option<String>,
    session: Option<String>,
}

impl LogPrefix {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                component: component.into(),
                account: None,
                session: None,
            })),
        }
    }

    /// Makes an independent copy, whose later changes are not shared with
    /// `self`.
    pub fn deep_clone(&self) -> Self {
        let inner = self.lock().clone();
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn set_account(&self, account: String) {
        self.lock().account = Some(sanitise(account));
    }

    pub fn set_session(&self, session: String) {
        self.lock().session = Some(sanitise(session));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // The guarded data is plain strings, so a panic mid-update cannot
        // leave it in a state worse than stale.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.lock();
        write!(f, "{}", inner.component)?;
        match (&inner.account, &inner.session) {
            (None, None) => Ok(()),
            (Some(account), None) => write!(f, "[{account}]"),
            (None, Some(session)) => write!(f, "[session={session}]"),
            (Some(account), Some(session)) => {
                write!(f, "[{account} session={session}]")
            },
        }
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn format_and_sharing() {
        let prefix = LogPrefix::new("folders");
        assert_eq!("folders", prefix.to_string());

        let shared = prefix.clone();
        let detached = prefix.deep_clone();
        shared.set_account("alice\r\n".to_owned());
        assert_eq!("folders[alice]", prefix.to_string());
        assert_eq!("folders", detached.to_string());

        prefix.set_session("s1".to_owned());
        assert_eq!("folders[alice session=s1]", shared.to_string());
    }

    #[test]
    fn long_values_truncated() {
        let prefix = LogPrefix::new("x");
        prefix.set_account("a".repeat(100));
        assert_eq!(format!("x[{}]", "a".repeat(64)), prefix.to_string());
    }
}
