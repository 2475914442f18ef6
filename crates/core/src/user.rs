use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult, require_non_blank};
use crate::id::UserId;

/// Portal user profile. There is no authentication; users are plain records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
}

impl NewUser {
    pub fn validate(&self) -> DomainResult<()> {
        require_non_blank("email", &self.email)?;
        if !self.email.contains('@') {
            return Err(DomainError::validation(format!("invalid email: {}", self.email)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_needs_an_at_sign() {
        let user = NewUser {
            email: "nobody".to_string(),
            name: None,
        };
        assert!(user.validate().is_err());

        let user = NewUser {
            email: "ops@example.com".to_string(),
            name: Some("Ops".to_string()),
        };
        assert!(user.validate().is_ok());
    }
}
