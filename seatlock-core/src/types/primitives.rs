use serde::{Deserialize, Serialize};

/// Identity of a caller. Only `user_id` takes part in locking; email and
/// name ride along as display payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl Participant {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_email: None,
            user_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }
}

impl From<&str> for Participant {
    fn from(user_id: &str) -> Self {
        Participant::new(user_id)
    }
}

/// Who currently holds the editing lease on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderIdentity {
    pub user_id: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
}
