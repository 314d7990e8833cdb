use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth token pair as held in the token store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Expired means "within the refresh window", not strictly past
    /// expiry. Refreshing five minutes early avoids racing the upstream
    /// clock.
    pub fn is_expired(&self) -> bool {
        Utc::now() + Duration::minutes(5) >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_expiring_in(minutes: i64) -> Token {
        Token {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_at: Utc::now() + Duration::minutes(minutes),
        }
    }

    #[test]
    fn token_inside_refresh_window_counts_as_expired() {
        assert!(token_expiring_in(3).is_expired());
        assert!(token_expiring_in(-1).is_expired());
    }

    #[test]
    fn fresh_token_is_not_expired() {
        assert!(!token_expiring_in(60).is_expired());
    }
}
