use serde::{Deserialize, Serialize};

/// Identity of an authenticated caller, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "uid")]
    pub user_id: String,
    pub email: String,
}
