//! User profile, persisted alongside the record collection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub username: String,
    #[serde(default = "default_notifications")]
    pub prefers_notifications: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_file_name: Option<String>,
}

fn default_notifications() -> bool {
    true
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            username: "wayne113_".to_string(),
            prefers_notifications: true,
            profile_image_file_name: None,
        }
    }
}
