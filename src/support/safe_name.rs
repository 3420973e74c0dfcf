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

use super::error::Error;

/// The separator between components of a folder path.
pub const PATH_SEPARATOR: char = '/';

/// Determine whether the given name is "safe" for use as a file system
/// element.
///
/// This excludes empty names and patterns that cause directory traversal or
/// hidden files, as well as anything containing a path separator or ASCII
/// control characters. Blob store paths are validated component-wise with
/// this.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty() &&
        // Block directory traversal through .. and creation of hidden files on
        // UNIX
        !name.starts_with('.') &&
        !name.contains('/') &&
        !name.contains('\\') &&
        !name.contains(|c| c < ' ' || c == '\x7F')
}

/// Validate a single folder name (one path component).
///
/// Names must be non-empty, must not contain the path separator or control
/// characters, must not be `.` or `..`, and must not contain the IMAP list
/// wildcards `*` and `%`.
pub fn check_folder_name(name: &str) -> Result<(), Error> {
    let reason = if name.is_empty() {
        "empty name"
    } else if name.contains(PATH_SEPARATOR) {
        "contains path separator"
    } else if "." == name || ".." == name {
        "reserved name"
    } else if name.contains(|c: char| c.is_control()) {
        "contains control characters"
    } else if name.contains(|c| '*' == c || '%' == c) {
        "contains list wildcard"
    } else {
        return Ok(());
    };

    Err(Error::invalid("folder name", reason))
}

/// Split a full folder path into its components, validating each one.
pub fn split_folder_path(path: &str) -> Result<Vec<&str>, Error> {
    let parts = path.split(PATH_SEPARATOR).collect::<Vec<_>>();
    for part in &parts {
        check_folder_name(part)?;
    }
    Ok(parts)
}

/// Validate an account name.
pub fn check_account_name(name: &str) -> Result<(), Error> {
    let reason = if name.is_empty() {
        "empty name"
    } else if name.contains(|c: char| c.is_control() || c.is_whitespace()) {
        "contains whitespace or control characters"
    } else if name.len() > 255 {
        "too long"
    } else {
        return Ok(());
    };

    Err(Error::invalid("account name", reason))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_safe_name() {
        assert!(is_safe_name("foo"));
        assert!(is_safe_name("Entwürfe"));
        assert!(is_safe_name("foo.bar"));
        assert!(is_safe_name("01890a5d-ac96-774b-bcce-b302099a8057"));
        assert!(!is_safe_name(""));
        assert!(!is_safe_name("."));
        assert!(!is_safe_name(".."));
        assert!(!is_safe_name(".hidden"));
        assert!(!is_safe_name("foo/bar"));
        assert!(!is_safe_name("foo\\bar"));
        assert!(!is_safe_name("foo\0"));
        assert!(!is_safe_name("fo\x7Fo"));
    }

    #[test]
    fn test_check_folder_name() {
        assert!(check_folder_name("INBOX").is_ok());
        assert!(check_folder_name("Entwürfe").is_ok());
        assert!(check_folder_name("郵便").is_ok());
        assert!(check_folder_name(".config").is_ok());
        assert!(check_folder_name("folder #1").is_ok());
        assert_matches!(Err(Error::Invalid { .. }), check_folder_name(""));
        assert_matches!(Err(Error::Invalid { .. }), check_folder_name("a/b"));
        assert_matches!(Err(Error::Invalid { .. }), check_folder_name(".."));
        assert_matches!(Err(Error::Invalid { .. }), check_folder_name("a\rb"));
        assert_matches!(Err(Error::Invalid { .. }), check_folder_name("a*"));
        assert_matches!(Err(Error::Invalid { .. }), check_folder_name("%"));
    }

    #[test]
    fn test_split_folder_path() {
        assert_eq!(vec!["Work"], split_folder_path("Work").unwrap());
        assert_eq!(
            vec!["Work", "Reports", "2023"],
            split_folder_path("Work/Reports/2023").unwrap()
        );
        assert_matches!(Err(Error::Invalid { .. }), split_folder_path(""));
        assert_matches!(Err(Error::Invalid { .. }), split_folder_path("/Work"));
        assert_matches!(Err(Error::Invalid { .. }), split_folder_path("Work/"));
        assert_matches!(Err(Error::Invalid { .. }), split_folder_path("a//b"));
    }

    #[test]
    fn test_check_account_name() {
        assert!(check_account_name("alice").is_ok());
        assert!(check_account_name("alice@example.com").is_ok());
        assert_matches!(Err(Error::Invalid { .. }), check_account_name(""));
        assert_matches!(Err(Error::Invalid { .. }), check_account_name("a b"));
        assert_matches!(
            Err(Error::Invalid { .. }),
            check_account_name(&"x".repeat(256))
        );
    }
}
