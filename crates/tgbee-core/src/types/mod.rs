//! Typed payloads carried by updates.
//!
//! Only the fields the dispatch layer and the built-in filters inspect are
//! modelled; unknown fields are ignored on decode.

mod chat;
mod member;
mod message;
mod poll;
mod query;

pub use chat::{Chat, ChatType, User};
pub use member::{ChatJoinRequest, ChatMember, ChatMemberUpdated};
pub use message::{Contact, FileAttachment, Location, Message, MessageEntity, PhotoSize, Venue};
pub use poll::{Poll, PollAnswer, PollOption};
pub use query::{CallbackQuery, ChosenInlineResult, InlineQuery, PreCheckoutQuery, ShippingQuery};
