//! Leaf filters that inspect update fields.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use tgbee_core::{ChatType, Message, TypeSet, Update, UpdateKind, UpdateType};

use super::command::Command;

/// A user or chat reference: numeric id or username.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Id(i64),
    Username(String),
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<i32> for Identity {
    fn from(id: i32) -> Self {
        Self::Id(i64::from(id))
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self::Username(name.to_string())
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Self::Username(name)
    }
}

/// A set of ids and lowercase usernames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct IdentitySet {
    ids: HashSet<i64>,
    usernames: HashSet<String>,
}

impl IdentitySet {
    pub(crate) fn new<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Identity>,
    {
        let mut set = Self::default();
        for item in items {
            match item.into() {
                Identity::Id(id) => {
                    set.ids.insert(id);
                }
                Identity::Username(name) => {
                    set.usernames
                        .insert(name.trim_start_matches('@').to_ascii_lowercase());
                }
            }
        }
        set
    }

    fn matches(&self, id: i64, username: Option<&str>) -> bool {
        self.ids.contains(&id)
            || username.is_some_and(|u| self.usernames.contains(&u.to_ascii_lowercase()))
    }
}

impl fmt::Display for IdentitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.ids.iter().map(i64::to_string).collect();
        ids.sort();
        let mut names: Vec<_> = self.usernames.iter().map(|u| format!("@{u}")).collect();
        names.sort();
        ids.extend(names);
        f.write_str(&ids.join(","))
    }
}

/// Message contents that can be tested for presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Content {
    Text,
    Caption,
    Reply,
    Forwarded,
    NewChatMembers,
    LeftChatMember,
    Photo,
    Audio,
    Document,
    Animation,
    Sticker,
    Video,
    Voice,
    VideoNote,
    Contact,
    Location,
    Venue,
    WebPage,
    Game,
}

impl Content {
    fn present(self, m: &Message) -> bool {
        match self {
            Self::Text => m.text.is_some(),
            Self::Caption => m.caption.is_some(),
            Self::Reply => m.reply_to_message.is_some(),
            Self::Forwarded => m.is_forwarded(),
            Self::NewChatMembers => !m.new_chat_members.is_empty(),
            Self::LeftChatMember => m.left_chat_member.is_some(),
            Self::Photo => !m.photo.is_empty(),
            Self::Audio => m.audio.is_some(),
            Self::Document => m.document.is_some(),
            Self::Animation => m.animation.is_some(),
            Self::Sticker => m.sticker.is_some(),
            Self::Video => m.video.is_some(),
            Self::Voice => m.voice.is_some(),
            Self::VideoNote => m.video_note.is_some(),
            Self::Contact => m.contact.is_some(),
            Self::Location => m.location.is_some(),
            Self::Venue => m.venue.is_some(),
            Self::WebPage => m.has_link(),
            Self::Game => m.game.is_some(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Caption => "caption",
            Self::Reply => "reply",
            Self::Forwarded => "forwarded",
            Self::NewChatMembers => "new_chat_members",
            Self::LeftChatMember => "left_chat_member",
            Self::Photo => "photo",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Animation => "animation",
            Self::Sticker => "sticker",
            Self::Video => "video",
            Self::Voice => "voice",
            Self::VideoNote => "video_note",
            Self::Contact => "contact",
            Self::Location => "location",
            Self::Venue => "venue",
            Self::WebPage => "web_page",
            Self::Game => "game",
        }
    }
}

/// Types that carry a sender.
const WITH_USER: TypeSet = TypeSet::MESSAGES
    .with(UpdateType::InlineQuery)
    .with(UpdateType::ChosenInlineResult)
    .with(UpdateType::CallbackQuery)
    .with(UpdateType::ShippingQuery)
    .with(UpdateType::PreCheckoutQuery)
    .with(UpdateType::PollAnswer)
    .with(UpdateType::MyChatMember)
    .with(UpdateType::ChatMember)
    .with(UpdateType::ChatJoinRequest);

/// Types that can carry a chat.
const WITH_CHAT: TypeSet = TypeSet::MESSAGES
    .with(UpdateType::CallbackQuery)
    .with(UpdateType::PollAnswer)
    .with(UpdateType::MyChatMember)
    .with(UpdateType::ChatMember)
    .with(UpdateType::ChatJoinRequest);

#[derive(Debug, Clone)]
pub(crate) enum Primitive {
    Has(Content),
    TextContains(String),
    CaptionContains(String),
    Command(Command),
    Regex(Regex),
    Users(IdentitySet),
    Chats(IdentitySet),
    ChatTypes(Vec<ChatType>),
    UpdateTypes(TypeSet),
    Poll,
    CallbackData(Option<String>),
}

impl Primitive {
    pub(crate) fn evaluate(&self, update: &Update) -> bool {
        match self {
            Self::Has(content) => update.message().is_some_and(|m| content.present(m)),
            Self::TextContains(needle) => update.text().is_some_and(|t| t.contains(needle.as_str())),
            Self::CaptionContains(needle) => update
                .message()
                .and_then(|m| m.caption.as_deref())
                .is_some_and(|c| c.contains(needle.as_str())),
            Self::Command(cmd) => update.text().is_some_and(|t| cmd.matches_text(t)),
            Self::Regex(re) => update.text().is_some_and(|t| re.is_match(t)),
            Self::Users(set) => update
                .from_user()
                .is_some_and(|u| set.matches(u.id, u.username.as_deref())),
            Self::Chats(set) => update
                .chat()
                .is_some_and(|c| set.matches(c.id, c.username.as_deref())),
            Self::ChatTypes(kinds) => update.chat().is_some_and(|c| kinds.contains(&c.kind)),
            Self::UpdateTypes(types) => types.contains(update.update_type()),
            Self::Poll => match &update.kind {
                UpdateKind::Poll(_) => true,
                _ => update.message().is_some_and(|m| m.poll.is_some()),
            },
            Self::CallbackData(prefix) => match &update.kind {
                UpdateKind::CallbackQuery(q) => match (&q.data, prefix) {
                    (Some(data), Some(prefix)) => data.starts_with(prefix.as_str()),
                    (Some(_), None) => true,
                    (None, _) => false,
                },
                _ => false,
            },
        }
    }

    pub(crate) fn applicable_types(&self) -> TypeSet {
        match self {
            Self::Has(_)
            | Self::TextContains(_)
            | Self::CaptionContains(_)
            | Self::Command(_)
            | Self::Regex(_) => TypeSet::MESSAGES,
            Self::Users(_) => WITH_USER,
            Self::Chats(_) | Self::ChatTypes(_) => WITH_CHAT,
            Self::UpdateTypes(types) => *types,
            Self::Poll => TypeSet::MESSAGES.with(UpdateType::Poll),
            Self::CallbackData(_) => TypeSet::single(UpdateType::CallbackQuery),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Has(content) => f.write_str(content.name()),
            Self::TextContains(s) => write!(f, "text({s:?})"),
            Self::CaptionContains(s) => write!(f, "caption({s:?})"),
            Self::Command(cmd) => {
                let prefix = cmd.prefix_list().first().map(String::as_str).unwrap_or("");
                let names: Vec<_> = cmd.names().iter().map(|n| format!("{prefix}{n}")).collect();
                write!(f, "command({})", names.join(","))
            }
            Self::Regex(re) => write!(f, "regex({})", re.as_str()),
            Self::Users(set) => write!(f, "user({set})"),
            Self::Chats(set) => write!(f, "chat({set})"),
            Self::ChatTypes(kinds) => {
                let names: Vec<_> = kinds.iter().map(|k| format!("{k:?}").to_lowercase()).collect();
                write!(f, "chat_type({})", names.join(","))
            }
            Self::UpdateTypes(types) => write!(f, "update_type({types:?})"),
            Self::Poll => f.write_str("poll"),
            Self::CallbackData(None) => f.write_str("callback_data"),
            Self::CallbackData(Some(p)) => write!(f, "callback_data({p:?})"),
        }
    }
}
