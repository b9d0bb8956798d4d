//! The inbound event model.
//!
//! An [`Update`] is the unit the remote service delivers: a monotonically
//! increasing `update_id` plus exactly one payload. The payload key decides the
//! [`UpdateKind`] variant; keys this crate does not know decode into
//! [`UpdateKind::Unknown`] instead of failing, so a newer server never stalls
//! the polling watermark.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer, Error as _};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::UnknownUpdateType;
use crate::types::*;

macro_rules! update_kinds {
    ($( $(#[$doc:meta])* $variant:ident($payload:ty) => $name:literal ),+ $(,)?) => {
        /// The variant tag of an [`Update`].
        ///
        /// The handler registry partitions its entries by this tag.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum UpdateType {
            $( $variant, )+
            /// A payload kind this crate does not model.
            Unknown,
        }

        impl UpdateType {
            /// Every tag, in declaration order.
            pub const ALL: &'static [UpdateType] = &[$( UpdateType::$variant, )+ UpdateType::Unknown];

            /// The payload key used by the Bot API.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )+
                    Self::Unknown => "unknown",
                }
            }
        }

        impl FromStr for UpdateType {
            type Err = UnknownUpdateType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $name => Ok(Self::$variant), )+
                    "unknown" => Ok(Self::Unknown),
                    other => Err(UnknownUpdateType(other.to_string())),
                }
            }
        }

        /// The payload of an [`Update`].
        #[derive(Debug, Clone, PartialEq)]
        pub enum UpdateKind {
            $( $(#[$doc])* $variant($payload), )+
            /// A payload under a key this crate does not model.
            Unknown {
                /// The payload key.
                kind: String,
                /// The raw payload.
                payload: Value,
            },
        }

        impl UpdateKind {
            /// Returns the tag of this payload.
            pub fn update_type(&self) -> UpdateType {
                match self {
                    $( Self::$variant(_) => UpdateType::$variant, )+
                    Self::Unknown { .. } => UpdateType::Unknown,
                }
            }

            fn decode(kind: &str, payload: Value) -> Result<Self, serde_json::Error> {
                match kind {
                    $( $name => serde_json::from_value(payload).map(Self::$variant), )+
                    _ => Ok(Self::Unknown { kind: kind.to_string(), payload }),
                }
            }

            fn serialize_entry<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
                match self {
                    $( Self::$variant(payload) => map.serialize_entry($name, payload), )+
                    Self::Unknown { kind, payload } => map.serialize_entry(kind, payload),
                }
            }
        }
    };
}

update_kinds! {
    /// A new incoming message.
    Message(Message) => "message",
    /// A new version of a message that was edited.
    EditedMessage(Message) => "edited_message",
    /// A new incoming channel post.
    ChannelPost(Message) => "channel_post",
    /// A new version of a channel post that was edited.
    EditedChannelPost(Message) => "edited_channel_post",
    InlineQuery(InlineQuery) => "inline_query",
    ChosenInlineResult(ChosenInlineResult) => "chosen_inline_result",
    CallbackQuery(CallbackQuery) => "callback_query",
    ShippingQuery(ShippingQuery) => "shipping_query",
    PreCheckoutQuery(PreCheckoutQuery) => "pre_checkout_query",
    /// A poll state change.
    Poll(Poll) => "poll",
    PollAnswer(PollAnswer) => "poll_answer",
    /// The bot's own membership status changed.
    MyChatMember(ChatMemberUpdated) => "my_chat_member",
    ChatMember(ChatMemberUpdated) => "chat_member",
    ChatJoinRequest(ChatJoinRequest) => "chat_join_request",
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for UpdateType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UpdateType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

// ============================================================================
// TypeSet
// ============================================================================

/// A compact set of [`UpdateType`]s.
///
/// Filters and extractors report the update variants they can apply to as a
/// `TypeSet`; registration intersects them to reject handlers that can never
/// run.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeSet(u16);

impl TypeSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// The four message-bearing variants.
    pub const MESSAGES: Self = Self::EMPTY
        .with(UpdateType::Message)
        .with(UpdateType::EditedMessage)
        .with(UpdateType::ChannelPost)
        .with(UpdateType::EditedChannelPost);

    /// Every variant, including [`UpdateType::Unknown`].
    pub const fn all() -> Self {
        Self((1 << UpdateType::ALL.len()) - 1)
    }

    pub const fn single(ty: UpdateType) -> Self {
        Self(1 << ty as u16)
    }

    /// Returns this set with `ty` added.
    pub const fn with(self, ty: UpdateType) -> Self {
        Self(self.0 | 1 << ty as u16)
    }

    pub fn contains(self, ty: UpdateType) -> bool {
        self.0 & (1 << ty as u16) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_all(self) -> bool {
        self == Self::all()
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Iterates the members in declaration order.
    pub fn iter(self) -> impl Iterator<Item = UpdateType> {
        UpdateType::ALL
            .iter()
            .copied()
            .filter(move |ty| self.contains(*ty))
    }
}

impl FromIterator<UpdateType> for TypeSet {
    fn from_iter<I: IntoIterator<Item = UpdateType>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl From<UpdateType> for TypeSet {
    fn from(ty: UpdateType) -> Self {
        Self::single(ty)
    }
}

impl std::ops::BitAnd for TypeSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl std::ops::BitOr for TypeSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("{*}");
        }
        f.debug_set().entries(self.iter().map(UpdateType::as_str)).finish()
    }
}

// ============================================================================
// Update
// ============================================================================

/// One inbound event. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Sequence identifier assigned by the remote service.
    pub update_id: i64,
    /// The variant payload.
    pub kind: UpdateKind,
}

impl Update {
    pub fn new(update_id: i64, kind: UpdateKind) -> Self {
        Self { update_id, kind }
    }

    pub fn update_type(&self) -> UpdateType {
        self.kind.update_type()
    }

    /// The message of a message, edited message, channel post or edited
    /// channel post update.
    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => Some(m),
            _ => None,
        }
    }

    /// The user that caused the update, if the variant has one.
    pub fn from_user(&self) -> Option<&User> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => m.from_user.as_ref(),
            UpdateKind::InlineQuery(q) => Some(&q.from),
            UpdateKind::ChosenInlineResult(r) => Some(&r.from),
            UpdateKind::CallbackQuery(q) => Some(&q.from),
            UpdateKind::ShippingQuery(q) => Some(&q.from),
            UpdateKind::PreCheckoutQuery(q) => Some(&q.from),
            UpdateKind::PollAnswer(a) => a.user.as_ref(),
            UpdateKind::MyChatMember(c) | UpdateKind::ChatMember(c) => Some(&c.from),
            UpdateKind::ChatJoinRequest(r) => Some(&r.from),
            UpdateKind::Poll(_) | UpdateKind::Unknown { .. } => None,
        }
    }

    /// The chat the update happened in, if the variant has one.
    pub fn chat(&self) -> Option<&Chat> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => Some(&m.chat),
            UpdateKind::CallbackQuery(q) => q.message.as_ref().map(|m| &m.chat),
            UpdateKind::MyChatMember(c) | UpdateKind::ChatMember(c) => Some(&c.chat),
            UpdateKind::ChatJoinRequest(r) => Some(&r.chat),
            UpdateKind::PollAnswer(a) => a.voter_chat.as_ref(),
            _ => None,
        }
    }

    /// The text of a message-bearing update.
    pub fn text(&self) -> Option<&str> {
        self.message().and_then(|m| m.text.as_deref())
    }
}

impl Serialize for Update {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("update_id", &self.update_id)?;
        self.kind.serialize_entry(&mut map)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Update {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = Map::<String, Value>::deserialize(deserializer)?;

        let update_id = map
            .remove("update_id")
            .ok_or_else(|| D::Error::missing_field("update_id"))?
            .as_i64()
            .ok_or_else(|| D::Error::custom("update_id must be an integer"))?;

        let (key, payload) = map
            .into_iter()
            .next()
            .ok_or_else(|| D::Error::custom("update carries no payload"))?;

        let kind = UpdateKind::decode(&key, payload)
            .map_err(|e| D::Error::custom(format!("invalid `{key}` payload: {e}")))?;

        Ok(Self { update_id, kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_json(update_id: i64, text: &str) -> Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": 1,
                "date": 0,
                "chat": {"id": 5, "type": "private", "first_name": "Ann"},
                "from": {"id": 5, "first_name": "Ann"},
                "text": text
            }
        })
    }

    #[test]
    fn test_decode_message_update() {
        let update: Update = serde_json::from_value(message_json(7, "/start")).unwrap();
        assert_eq!(update.update_id, 7);
        assert_eq!(update.update_type(), UpdateType::Message);
        assert_eq!(update.text(), Some("/start"));
        assert_eq!(update.from_user().map(|u| u.id), Some(5));
        assert_eq!(update.chat().map(|c| c.kind), Some(ChatType::Private));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 9,
            "message_reaction": {"chat": {"id": 1}}
        }))
        .unwrap();

        assert_eq!(update.update_type(), UpdateType::Unknown);
        match &update.kind {
            UpdateKind::Unknown { kind, .. } => assert_eq!(kind, "message_reaction"),
            other => panic!("unexpected kind: {other:?}"),
        }
        assert!(update.message().is_none());
        assert!(update.from_user().is_none());
    }

    #[test]
    fn test_decode_rejects_missing_id_and_payload() {
        assert!(serde_json::from_value::<Update>(json!({"message": {}})).is_err());
        assert!(serde_json::from_value::<Update>(json!({"update_id": 1})).is_err());
    }

    #[test]
    fn test_decode_callback_query() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 3,
            "callback_query": {
                "id": "q1",
                "from": {"id": 8, "first_name": "Bo"},
                "chat_instance": "x",
                "data": "vote:yes"
            }
        }))
        .unwrap();

        assert_eq!(update.update_type(), UpdateType::CallbackQuery);
        assert_eq!(update.from_user().map(|u| u.id), Some(8));
        assert!(update.chat().is_none());
    }

    #[test]
    fn test_serialize_keeps_payload_key() {
        let update: Update = serde_json::from_value(message_json(11, "hi")).unwrap();
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["update_id"], 11);
        assert_eq!(value["message"]["text"], "hi");
        assert_eq!(value["message"]["from"]["id"], 5);
    }

    #[test]
    fn test_update_type_names() {
        for ty in UpdateType::ALL {
            assert_eq!(ty.as_str().parse::<UpdateType>().unwrap(), *ty);
        }
        assert!("bogus".parse::<UpdateType>().is_err());
    }

    #[test]
    fn test_type_set_operations() {
        let messages = TypeSet::MESSAGES;
        assert_eq!(messages.len(), 4);
        assert!(messages.contains(UpdateType::ChannelPost));
        assert!(!messages.contains(UpdateType::CallbackQuery));

        let callbacks = TypeSet::single(UpdateType::CallbackQuery);
        assert!((messages & callbacks).is_empty());
        assert_eq!((messages | callbacks).len(), 5);
        assert!(TypeSet::all().is_all());
        assert_eq!(TypeSet::all().len(), UpdateType::ALL.len());

        let collected: TypeSet = [UpdateType::Poll, UpdateType::Poll].into_iter().collect();
        assert_eq!(collected.iter().collect::<Vec<_>>(), vec![UpdateType::Poll]);
    }
}
