use serde::{Deserialize, Serialize};

/// A user or bot account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

impl User {
    /// Returns `true` if the username matches, ignoring case and a leading `@`.
    pub fn has_username(&self, name: &str) -> bool {
        match &self.username {
            Some(own) => own.eq_ignore_ascii_case(name.trim_start_matches('@')),
            None => false,
        }
    }

    /// First and last name joined by a space.
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

/// The kind of a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
    /// Any chat type the model does not know yet.
    #[serde(other)]
    Other,
}

impl ChatType {
    /// Returns `true` for both basic groups and supergroups.
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

/// A private chat, group, supergroup or channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ChatType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl Chat {
    /// Returns `true` if the chat username matches, ignoring case and a leading `@`.
    pub fn has_username(&self, name: &str) -> bool {
        match &self.username {
            Some(own) => own.eq_ignore_ascii_case(name.trim_start_matches('@')),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_type_fallback() {
        let chat: Chat = serde_json::from_value(json!({"id": 1, "type": "forum"})).unwrap();
        assert_eq!(chat.kind, ChatType::Other);

        let chat: Chat = serde_json::from_value(json!({"id": 1, "type": "supergroup"})).unwrap();
        assert!(chat.kind.is_group());
    }

    #[test]
    fn test_username_match_ignores_case_and_at() {
        let user: User =
            serde_json::from_value(json!({"id": 7, "first_name": "Ann", "username": "AnnBot"}))
                .unwrap();
        assert!(user.has_username("@annbot"));
        assert!(!user.has_username("ann"));
        assert_eq!(user.full_name(), "Ann");
    }
}
