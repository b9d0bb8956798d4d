//! Parameter extraction for handler functions.
//!
//! Every handler argument implements [`FromContext`]. Besides extracting a
//! value, each extractor declares the update variants it can succeed on; a
//! handler's accepted variants are the intersection over its arguments, and
//! registration rejects handlers whose filter shares none of them.

use std::sync::Arc;

use tgbee_core::{
    BoxedApi, CallbackQuery, Chat, InlineQuery, Message, TypeSet, Update, UpdateKind, UpdateType,
    User,
};

use crate::context::HandlerContext;
use crate::error::{ExtractError, ExtractResult};
use crate::filter::parse_command;

/// A type that can be extracted from a [`HandlerContext`].
///
/// A failed extraction surfaces as a handler failure at dispatch time.
pub trait FromContext: Sized {
    /// Update variants on which extraction can succeed.
    fn accepted_types() -> TypeSet {
        TypeSet::all()
    }

    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self>;
}

fn mismatch(expected: TypeSet, ctx: &HandlerContext) -> ExtractError {
    ExtractError::TypeMismatch {
        expected,
        got: ctx.update().update_type(),
    }
}

impl FromContext for Arc<HandlerContext> {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        Ok(Arc::clone(ctx))
    }
}

impl FromContext for Arc<Update> {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        Ok(ctx.update_arc())
    }
}

/// The API handle, for handlers that send more than a reply.
impl FromContext for BoxedApi {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        Ok(Arc::clone(ctx.api()))
    }
}

impl FromContext for Message {
    fn accepted_types() -> TypeSet {
        TypeSet::MESSAGES
    }

    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        ctx.update()
            .message()
            .cloned()
            .ok_or_else(|| mismatch(Self::accepted_types(), ctx))
    }
}

impl FromContext for CallbackQuery {
    fn accepted_types() -> TypeSet {
        TypeSet::single(UpdateType::CallbackQuery)
    }

    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        match &ctx.update().kind {
            UpdateKind::CallbackQuery(q) => Ok(q.clone()),
            _ => Err(mismatch(Self::accepted_types(), ctx)),
        }
    }
}

impl FromContext for InlineQuery {
    fn accepted_types() -> TypeSet {
        TypeSet::single(UpdateType::InlineQuery)
    }

    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        match &ctx.update().kind {
            UpdateKind::InlineQuery(q) => Ok(q.clone()),
            _ => Err(mismatch(Self::accepted_types(), ctx)),
        }
    }
}

/// The user that caused the update.
impl FromContext for User {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        ctx.update()
            .from_user()
            .cloned()
            .ok_or(ExtractError::Missing("sender"))
    }
}

impl FromContext for Chat {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        ctx.update()
            .chat()
            .cloned()
            .ok_or(ExtractError::Missing("chat"))
    }
}

/// Extraction never fails; the variant set is unconstrained.
impl<T: FromContext> FromContext for Option<T> {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        Ok(T::from_context(ctx).ok())
    }
}

/// The parsed command of a message text.
///
/// Any run of ASCII punctuation at the start of the text counts as prefix,
/// so the extractor works with whatever prefixes the filter accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArgs {
    pub name: String,
    pub mention: Option<String>,
    pub args: String,
}

impl CommandArgs {
    /// Arguments split on whitespace.
    pub fn split(&self) -> Vec<&str> {
        self.args.split_whitespace().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl FromContext for CommandArgs {
    fn accepted_types() -> TypeSet {
        TypeSet::MESSAGES
    }

    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        let text = ctx
            .update()
            .text()
            .ok_or_else(|| mismatch(Self::accepted_types(), ctx))?
            .trim_start();
        let prefix_len = text
            .bytes()
            .take_while(|b| b.is_ascii_punctuation() && *b != b'@')
            .count();
        let parsed =
            parse_command(text, &[&text[..prefix_len]]).ok_or(ExtractError::Missing("command"))?;
        if parsed.prefix.is_empty() {
            return Err(ExtractError::Missing("command"));
        }
        Ok(Self {
            name: parsed.name.to_string(),
            mention: parsed.mention.map(str::to_string),
            args: parsed.args.to_string(),
        })
    }
}
