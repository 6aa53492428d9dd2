use sha2::{Digest, Sha256};
use std::fmt;

/// Tokens outlive a restart of the sidecar but not a day.
pub const TOKEN_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Decoded session identity. The wire form is
/// `<userId>.<issuedAtMillis>.<hexSha256(userId.issuedAtMillis.secret)>`,
/// signed with the per-store secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub issued_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Malformed,
    BadSignature,
    Expired,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "session token is malformed"),
            TokenError::BadSignature => write!(f, "session token signature mismatch"),
            TokenError::Expired => write!(f, "session token expired"),
        }
    }
}

impl std::error::Error for TokenError {}

pub fn issue(user_id: &str, issued_at_ms: i64, secret: &str) -> String {
    format!(
        "{}.{}.{}",
        user_id,
        issued_at_ms,
        signature(user_id, issued_at_ms, secret)
    )
}

pub fn decode(token: &str, secret: &str, now_ms: i64) -> Result<Session, TokenError> {
    // User ids may themselves contain '.', so split from the right.
    let mut parts = token.rsplitn(3, '.');
    let sig = parts.next().ok_or(TokenError::Malformed)?;
    let ts = parts.next().ok_or(TokenError::Malformed)?;
    let user_id = parts.next().ok_or(TokenError::Malformed)?;
    if user_id.is_empty() || sig.is_empty() {
        return Err(TokenError::Malformed);
    }
    let issued_at_ms: i64 = ts.parse().map_err(|_| TokenError::Malformed)?;
    if signature(user_id, issued_at_ms, secret) != sig {
        return Err(TokenError::BadSignature);
    }
    if now_ms - issued_at_ms > TOKEN_TTL_MS {
        return Err(TokenError::Expired);
    }
    Ok(Session {
        user_id: user_id.to_string(),
        issued_at_ms,
    })
}

fn signature(user_id: &str, issued_at_ms: i64, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b".");
    hasher.update(issued_at_ms.to_string().as_bytes());
    hasher.update(b".");
    hasher.update(secret.as_bytes());
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
