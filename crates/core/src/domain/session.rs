use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::account::AccountId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Server-side sign-in record referenced by the session cookie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub account_id: AccountId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn issue(
        id: SessionId,
        account_id: AccountId,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self { id, account_id, created_at: now, expires_at: now + lifetime }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Sliding renewal kicks in once less than half of `lifetime` remains.
    pub fn needs_renewal(&self, now: DateTime<Utc>, lifetime: Duration) -> bool {
        !self.is_expired(now) && self.expires_at - now < lifetime / 2
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{Session, SessionId};
    use crate::domain::account::AccountId;

    fn session(lifetime: Duration) -> Session {
        Session::issue(
            SessionId("S-1".to_string()),
            AccountId("ACC-1".to_string()),
            Utc::now(),
            lifetime,
        )
    }

    #[test]
    fn fresh_session_is_live_and_not_due_for_renewal() {
        let lifetime = Duration::days(30);
        let session = session(lifetime);
        let now = session.created_at + Duration::days(1);
        assert!(!session.is_expired(now));
        assert!(!session.needs_renewal(now, lifetime));
    }

    #[test]
    fn session_past_half_life_needs_renewal() {
        let lifetime = Duration::days(30);
        let session = session(lifetime);
        let now = session.created_at + Duration::days(16);
        assert!(session.needs_renewal(now, lifetime));
    }

    #[test]
    fn expired_session_is_not_renewed() {
        let lifetime = Duration::days(30);
        let session = session(lifetime);
        let now = session.expires_at;
        assert!(session.is_expired(now));
        assert!(!session.needs_renewal(now, lifetime));
    }
}
