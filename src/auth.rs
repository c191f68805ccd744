//! Authentication for the resource routes: HTTP Basic credentials checked by an
//! `Authenticator` backend.

use crate::config::AuthnConfig;
use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const BASIC_SCHEME: &str = "Basic";

/// Credential backend.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> bool;
}

/// Users and passwords from the app config.
pub struct StaticAuthenticator {
    users: BTreeMap<String, [u8; 32]>,
}

fn digest(s: &str) -> [u8; 32] {
    Sha256::digest(s.as_bytes()).into()
}

impl StaticAuthenticator {
    pub fn new(users: &BTreeMap<String, String>) -> Self {
        StaticAuthenticator {
            users: users.iter().map(|(u, p)| (u.clone(), digest(p))).collect(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> bool {
        let given = digest(password);
        match self.users.get(username) {
            Some(stored) => stored.iter().zip(given.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0,
            None => false,
        }
    }
}

pub fn authenticator_for(config: &AuthnConfig) -> Arc<dyn Authenticator> {
    match config {
        AuthnConfig::HttpBasic { users } => Arc::new(StaticAuthenticator::new(users)),
    }
}

/// Decode an `Authorization: Basic ...` value into user and password.
pub fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BASIC_SCHEME) {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Middleware: reject requests without valid Basic credentials.
pub async fn require_basic(
    State(auth): State<Arc<dyn Authenticator>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let credentials = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic);
    let Some((user, password)) = credentials else {
        return Err(AppError::Unauthorized { scheme: BASIC_SCHEME });
    };
    if !auth.authenticate(&user, &password).await {
        tracing::warn!(user = %user, "authentication failed");
        return Err(AppError::Unauthorized { scheme: BASIC_SCHEME });
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_header() {
        let v = format!("Basic {}", STANDARD.encode("alice:s3:cret"));
        assert_eq!(parse_basic(&v), Some(("alice".into(), "s3:cret".into())));
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic !!!"), None);
    }

    #[tokio::test]
    async fn static_users() {
        let users = BTreeMap::from([("alice".to_string(), "secret".to_string())]);
        let auth = StaticAuthenticator::new(&users);
        assert!(auth.authenticate("alice", "secret").await);
        assert!(!auth.authenticate("alice", "wrong").await);
        assert!(!auth.authenticate("bob", "secret").await);
    }
}
