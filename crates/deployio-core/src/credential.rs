//! Upstream OAuth credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::UserId;

/// An access/refresh token pair with expiries. Always written as a unit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

// Tokens stay out of logs.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_token", &"[REDACTED]")
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

/// A user's stored credential pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: UserId,
    pub tokens: TokenPair,
}

impl Credential {
    pub fn access_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.tokens.access_expires_at > now
    }

    pub fn refresh_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.tokens.refresh_expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validity_is_strictly_before_expiry() {
        let now = Utc::now();
        let credential = Credential {
            user_id: UserId::new(1),
            tokens: TokenPair {
                access_token: "a".to_string(),
                access_expires_at: now,
                refresh_token: "r".to_string(),
                refresh_expires_at: now + Duration::days(30),
            },
        };

        assert!(!credential.access_valid_at(now));
        assert!(credential.access_valid_at(now - Duration::seconds(1)));
        assert!(credential.refresh_valid_at(now));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let pair = TokenPair {
            access_token: "ghu_secret".to_string(),
            access_expires_at: Utc::now(),
            refresh_token: "ghr_secret".to_string(),
            refresh_expires_at: Utc::now(),
        };
        let printed = format!("{pair:?}");
        assert!(!printed.contains("ghu_secret"));
        assert!(!printed.contains("ghr_secret"));
    }
}
