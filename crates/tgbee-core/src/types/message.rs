use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::chat::{Chat, User};
use super::poll::Poll;

/// A message, edited message or channel post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub date: i64,
    pub chat: Chat,
    #[serde(rename = "from", default, skip_serializing_if = "Option::is_none")]
    pub from_user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_chat: Option<Chat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<MessageEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caption_entities: Vec<MessageEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message: Option<Box<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_origin: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_group_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_chat_members: Vec<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_chat_member: Option<User>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photo: Vec<PhotoSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<FileAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<FileAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<FileAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker: Option<FileAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<FileAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<FileAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_note: Option<FileAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<Venue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<Poll>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<Value>,
}

impl Message {
    /// The text of a text message, or the caption of a media message.
    pub fn text_or_caption(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// Returns `true` if the message was forwarded from elsewhere.
    pub fn is_forwarded(&self) -> bool {
        self.forward_date.is_some() || self.forward_origin.is_some()
    }

    /// Returns `true` if any entity of the text or caption is a link.
    pub fn has_link(&self) -> bool {
        self.entities
            .iter()
            .chain(&self.caption_entities)
            .any(|e| matches!(e.kind.as_str(), "url" | "text_link"))
    }
}

/// A formatting or semantic span of a message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One size of a photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_unique_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// The shared shape of audio, document, animation, sticker, video, voice and
/// video-note attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub file_id: String,
    pub file_unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub phone_number: String,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub location: Location,
    pub title: String,
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_maps_from_field() {
        let msg: Message = serde_json::from_value(json!({
            "message_id": 10,
            "date": 1700000000,
            "chat": {"id": -100, "type": "group", "title": "bees"},
            "from": {"id": 42, "first_name": "Ann"},
            "caption": "look",
            "photo": [{"file_id": "a", "file_unique_id": "b", "width": 1, "height": 1}],
            "entities": [{"type": "url", "offset": 0, "length": 4}]
        }))
        .unwrap();

        assert_eq!(msg.from_user.as_ref().map(|u| u.id), Some(42));
        assert_eq!(msg.text_or_caption(), Some("look"));
        assert_eq!(msg.photo.len(), 1);
        assert!(msg.has_link());
        assert!(!msg.is_forwarded());
    }
}
