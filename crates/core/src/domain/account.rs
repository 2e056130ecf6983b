use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub lockout_end: Option<DateTime<Utc>>,
}

impl Account {
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.lockout_end.map(|end| end > now).unwrap_or(false)
    }
}

/// Input for creating a local account; the user name is the email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccount {
    pub email: String,
}

impl NewAccount {
    pub fn user_name(&self) -> &str {
        &self.email
    }

    /// Field-level problems with the supplied email, empty when acceptable.
    pub fn validation_errors(&self) -> Vec<String> {
        let email = self.email.trim();
        if email.is_empty() {
            return vec!["The Email field is required.".to_string()];
        }

        let valid_shape = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !email.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if valid_shape {
            Vec::new()
        } else {
            vec!["The Email field is not a valid e-mail address.".to_string()]
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalLoginKey {
    pub provider: String,
    pub provider_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLogin {
    pub key: ExternalLoginKey,
    pub provider_display_name: String,
    pub account_id: AccountId,
}

/// Identity asserted by an external provider after a completed round trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub provider: String,
    pub provider_key: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl ExternalIdentity {
    pub fn login_key(&self) -> ExternalLoginKey {
        ExternalLoginKey { provider: self.provider.clone(), provider_key: self.provider_key.clone() }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{Account, AccountId, NewAccount};

    fn account(lockout_end: Option<chrono::DateTime<Utc>>) -> Account {
        Account {
            id: AccountId("ACC-1".to_string()),
            user_name: "jane@example.com".to_string(),
            email: "jane@example.com".to_string(),
            created_at: Utc::now(),
            lockout_end,
        }
    }

    #[test]
    fn lockout_in_future_locks_account() {
        let now = Utc::now();
        assert!(account(Some(now + Duration::minutes(5))).is_locked_out(now));
    }

    #[test]
    fn elapsed_lockout_does_not_lock_account() {
        let now = Utc::now();
        assert!(!account(Some(now - Duration::minutes(5))).is_locked_out(now));
        assert!(!account(None).is_locked_out(now));
    }

    #[test]
    fn email_validation_flags_missing_and_malformed_values() {
        let missing = NewAccount { email: "   ".to_string() }.validation_errors();
        assert_eq!(missing, vec!["The Email field is required.".to_string()]);

        for malformed in ["jane", "@example.com", "jane@", "ja ne@example.com", "a@b@c"] {
            let errors = NewAccount { email: malformed.to_string() }.validation_errors();
            assert_eq!(errors.len(), 1, "`{malformed}` should be rejected");
        }

        assert!(NewAccount { email: "jane@example.com".to_string() }.validation_errors().is_empty());
    }
}
