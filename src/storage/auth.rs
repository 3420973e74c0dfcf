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

//! Credential verification is delegated entirely to an `Authenticator`; the
//! rest of the crate only ever sees the canonical account name it returns.

use crate::support::{context::Context, error::Error};

pub trait Authenticator: Send + Sync {
    /// Verifies `password` for `username`, returning the canonical name of
    /// the account to use, or `InvalidCredentials`.
    fn login(
        &self,
        ctx: &Context,
        username: &str,
        password: &str,
    ) -> Result<String, Error>;
}

impl<F> Authenticator for F
where
    F: Fn(&str, &str) -> Result<String, Error> + Send + Sync,
{
    fn login(
        &self,
        ctx: &Context,
        username: &str,
        password: &str,
    ) -> Result<String, Error> {
        ctx.check()?;
        self(username, password)
    }
}

/// Accepts any user name as-is without checking the password.
///
/// For deployments where a proxy in front of the server has already
/// authenticated the connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrustingAuthenticator;

impl Authenticator for TrustingAuthenticator {
    fn login(
        &self,
        ctx: &Context,
        username: &str,
        _password: &str,
    ) -> Result<String, Error> {
        ctx.check()?;
        if username.is_empty() {
            return Err(Error::InvalidCredentials);
        }

        Ok(username.to_owned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn trusting_authenticator() {
        let ctx = Context::background();
        assert_eq!(
            "alice",
            TrustingAuthenticator.login(&ctx, "alice", "").unwrap()
        );
        assert_matches!(
            Err(Error::InvalidCredentials),
            TrustingAuthenticator.login(&ctx, "", "hunter2")
        );
    }

    #[test]
    fn closures_authenticate() {
        let auth = |user: &str, pass: &str| {
            if "hunter2" == pass {
                Ok(user.to_lowercase())
            } else {
                Err(Error::InvalidCredentials)
            }
        };

        let ctx = Context::background();
        assert_eq!("bob", auth.login(&ctx, "Bob", "hunter2").unwrap());
        assert_matches!(
            Err(Error::InvalidCredentials),
            auth.login(&ctx, "Bob", "*******")
        );

        ctx.cancel();
        assert_matches!(
            Err(Error::Cancelled),
            auth.login(&ctx, "Bob", "hunter2")
        );
    }
}
