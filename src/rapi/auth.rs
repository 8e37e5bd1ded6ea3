//! RAPI HTTP basic auth against a users file with roles {read, write}
//! (SPEC_FULL.md §6), grounded on `security/authentication.rs`'s
//! `argon2` password-hash idiom.

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use axum::http::{HeaderMap, StatusCode};
use base64::Engine;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Read,
    Write,
}

pub struct UsersFile {
    /// username -> (argon2 hash, role)
    entries: HashMap<String, (String, Role)>,
}

impl UsersFile {
    pub fn from_lines(lines: &str) -> Self {
        let mut entries = HashMap::new();
        for line in lines.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(user), Some(hash), Some(role)) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };
            let role = if role == "write" { Role::Write } else { Role::Read };
            entries.insert(user.to_string(), (hash.to_string(), role));
        }
        Self { entries }
    }

    pub fn authenticate(&self, user: &str, password: &str) -> Option<Role> {
        let (hash, role) = self.entries.get(user)?;
        let parsed = PasswordHash::new(hash).ok()?;
        Argon2::default().verify_password(password.as_bytes(), &parsed).ok()?;
        Some(*role)
    }
}

pub fn extract_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

pub fn required_role_for(method: &axum::http::Method) -> Role {
    if method == axum::http::Method::GET {
        Role::Read
    } else {
        Role::Write
    }
}

pub fn unauthorized() -> StatusCode {
    StatusCode::UNAUTHORIZED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_user_is_rejected() {
        let users = UsersFile::from_lines("");
        assert!(users.authenticate("nobody", "pw").is_none());
    }

    #[test]
    fn parses_role_column() {
        // hash is irrelevant here, only the role-column parsing is tested.
        let users = UsersFile::from_lines("alice somehash write\nbob otherhash read\n");
        assert_eq!(users.entries.get("alice").unwrap().1, Role::Write);
        assert_eq!(users.entries.get("bob").unwrap().1, Role::Read);
    }
}
