//! Filter algebra.
//!
//! A [`Filter`] is an immutable boolean expression over an [`Update`]. Leaves
//! inspect update fields; [`and_of`], [`or_of`], [`xor_of`] and [`not_of`]
//! combine filters into new ones without touching their operands. Evaluation
//! is a pure tree walk: `AND`/`OR` short-circuit left to right, and a leaf
//! evaluated against a variant it does not understand yields `false`.
//!
//! # Example
//!
//! ```rust,ignore
//! use tgbee_framework::filter::{self, Filter};
//!
//! let start_in_private = filter::command(["start"]) & filter::private();
//! let media = filter::any_of([filter::photo(), filter::video(), filter::document()]);
//! let not_from_bots = !Filter::custom("from_bot", |u| {
//!     u.from_user().is_some_and(|user| user.is_bot)
//! });
//! ```
//!
//! Every filter also reports the set of update variants it can possibly
//! match ([`Filter::applicable_types`]); the registry uses it to place an
//! entry in the right partitions and to reject handlers that could never run.

mod command;
mod primitives;

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tgbee_core::{ChatType, TypeSet, Update, UpdateType};

pub use command::{Command, ParsedCommand, parse_command};
pub use primitives::{Content, Identity};

use primitives::{IdentitySet, Primitive};

/// A user-supplied predicate. Must be pure and must not block.
pub type PredicateFn = Arc<dyn Fn(&Update) -> bool + Send + Sync>;

enum Node {
    Always,
    Never,
    Primitive(Primitive),
    Custom {
        name: String,
        types: TypeSet,
        predicate: PredicateFn,
    },
    And(Filter, Filter),
    Or(Filter, Filter),
    Xor(Filter, Filter),
    Not(Filter),
}

/// An immutable predicate over updates.
///
/// Cloning is cheap: the expression tree is shared.
#[derive(Clone)]
pub struct Filter {
    node: Arc<Node>,
}

impl Filter {
    fn from_node(node: Node) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    fn primitive(p: Primitive) -> Self {
        Self::from_node(Node::Primitive(p))
    }

    /// Matches every update.
    pub fn always() -> Self {
        Self::from_node(Node::Always)
    }

    /// Matches nothing.
    pub fn never() -> Self {
        Self::from_node(Node::Never)
    }

    /// Wraps a predicate that may apply to any update variant.
    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Update) -> bool + Send + Sync + 'static,
    {
        Self::custom_for(name, TypeSet::all(), predicate)
    }

    /// Wraps a predicate that only applies to the given variants.
    ///
    /// The predicate is not called for other variants.
    pub fn custom_for<F>(name: impl Into<String>, types: impl Into<TypeSet>, predicate: F) -> Self
    where
        F: Fn(&Update) -> bool + Send + Sync + 'static,
    {
        Self::from_node(Node::Custom {
            name: name.into(),
            types: types.into(),
            predicate: Arc::new(predicate),
        })
    }

    /// Evaluates the filter against an update.
    pub fn evaluate(&self, update: &Update) -> bool {
        match &*self.node {
            Node::Always => true,
            Node::Never => false,
            Node::Primitive(p) => p.evaluate(update),
            Node::Custom {
                types, predicate, ..
            } => types.contains(update.update_type()) && predicate(update),
            Node::And(a, b) => a.evaluate(update) && b.evaluate(update),
            Node::Or(a, b) => a.evaluate(update) || b.evaluate(update),
            Node::Xor(a, b) => a.evaluate(update) != b.evaluate(update),
            Node::Not(f) => !f.evaluate(update),
        }
    }

    /// The update variants this filter can possibly match.
    ///
    /// This is an over-approximation: `NOT` is never narrowed.
    pub fn applicable_types(&self) -> TypeSet {
        match &*self.node {
            Node::Always => TypeSet::all(),
            Node::Never => TypeSet::EMPTY,
            Node::Primitive(p) => p.applicable_types(),
            Node::Custom { types, .. } => *types,
            Node::And(a, b) => a.applicable_types() & b.applicable_types(),
            Node::Or(a, b) | Node::Xor(a, b) => a.applicable_types() | b.applicable_types(),
            Node::Not(_) => TypeSet::all(),
        }
    }

    pub fn and(self, other: Filter) -> Filter {
        and_of(self, other)
    }

    pub fn or(self, other: Filter) -> Filter {
        or_of(self, other)
    }

    pub fn xor(self, other: Filter) -> Filter {
        xor_of(self, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Filter {
        not_of(self)
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.node {
            Node::Always => f.write_str("always"),
            Node::Never => f.write_str("never"),
            Node::Primitive(p) => write!(f, "{p}"),
            Node::Custom { name, .. } => f.write_str(name),
            Node::And(a, b) => write!(f, "({a} & {b})"),
            Node::Or(a, b) => write!(f, "({a} | {b})"),
            Node::Xor(a, b) => write!(f, "({a} ^ {b})"),
            Node::Not(inner) => write!(f, "!{inner}"),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter({self})")
    }
}

// ============================================================================
// Combinators
// ============================================================================

/// Matches when both filters match. `b` is not evaluated when `a` fails.
pub fn and_of(a: Filter, b: Filter) -> Filter {
    Filter::from_node(Node::And(a, b))
}

/// Matches when either filter matches. `b` is not evaluated when `a` matches.
pub fn or_of(a: Filter, b: Filter) -> Filter {
    Filter::from_node(Node::Or(a, b))
}

/// Matches when exactly one of the filters matches.
pub fn xor_of(a: Filter, b: Filter) -> Filter {
    Filter::from_node(Node::Xor(a, b))
}

/// Inverts a filter. Double negation collapses back to the operand.
pub fn not_of(f: Filter) -> Filter {
    if let Node::Not(inner) = &*f.node {
        return inner.clone();
    }
    Filter::from_node(Node::Not(f))
}

/// Conjunction of all filters; `always` when empty.
pub fn all_of(filters: impl IntoIterator<Item = Filter>) -> Filter {
    filters
        .into_iter()
        .reduce(and_of)
        .unwrap_or_else(Filter::always)
}

/// Disjunction of all filters; `never` when empty.
pub fn any_of(filters: impl IntoIterator<Item = Filter>) -> Filter {
    filters
        .into_iter()
        .reduce(or_of)
        .unwrap_or_else(Filter::never)
}

impl std::ops::BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        and_of(self, rhs)
    }
}

impl std::ops::BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        or_of(self, rhs)
    }
}

impl std::ops::BitXor for Filter {
    type Output = Filter;

    fn bitxor(self, rhs: Filter) -> Filter {
        xor_of(self, rhs)
    }
}

impl std::ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        not_of(self)
    }
}

impl From<Command> for Filter {
    fn from(cmd: Command) -> Self {
        Filter::primitive(Primitive::Command(cmd))
    }
}

// ============================================================================
// Built-in filters
// ============================================================================

/// Messages with text.
pub fn text() -> Filter {
    Filter::primitive(Primitive::Has(Content::Text))
}

/// Messages whose text contains `needle`.
pub fn text_contains(needle: impl Into<String>) -> Filter {
    Filter::primitive(Primitive::TextContains(needle.into()))
}

/// Messages invoking one of `names` with the `/` prefix.
///
/// Use [`Command`] for custom prefixes or bot-username checks.
pub fn command<I, S>(names: I) -> Filter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Command::new(names).into()
}

/// Messages whose text matches `pattern` anywhere.
pub fn regex(pattern: &str) -> Result<Filter, regex::Error> {
    Ok(regex_of(Regex::new(pattern)?))
}

/// Like [`regex`] with a pre-compiled expression.
pub fn regex_of(re: Regex) -> Filter {
    Filter::primitive(Primitive::Regex(re))
}

/// Updates caused by one of the given users (ids or usernames).
pub fn user<I, T>(users: I) -> Filter
where
    I: IntoIterator<Item = T>,
    T: Into<Identity>,
{
    Filter::primitive(Primitive::Users(IdentitySet::new(users)))
}

/// Updates happening in one of the given chats (ids or usernames).
pub fn chat<I, T>(chats: I) -> Filter
where
    I: IntoIterator<Item = T>,
    T: Into<Identity>,
{
    Filter::primitive(Primitive::Chats(IdentitySet::new(chats)))
}

/// Updates from chats of the given kinds.
pub fn chat_type(kinds: impl IntoIterator<Item = ChatType>) -> Filter {
    Filter::primitive(Primitive::ChatTypes(kinds.into_iter().collect()))
}

pub fn private() -> Filter {
    chat_type([ChatType::Private])
}

/// Basic groups and supergroups.
pub fn group() -> Filter {
    chat_type([ChatType::Group, ChatType::Supergroup])
}

pub fn channel() -> Filter {
    chat_type([ChatType::Channel])
}

/// Updates of a single variant.
pub fn update_type(ty: UpdateType) -> Filter {
    update_types([ty])
}

/// Updates of any of the given variants.
pub fn update_types(types: impl IntoIterator<Item = UpdateType>) -> Filter {
    Filter::primitive(Primitive::UpdateTypes(types.into_iter().collect()))
}

/// Messages carrying the given kind of content.
pub fn has(content: Content) -> Filter {
    Filter::primitive(Primitive::Has(content))
}

/// Messages with a caption.
pub fn caption() -> Filter {
    has(Content::Caption)
}

/// Messages whose caption contains `needle`.
pub fn caption_contains(needle: impl Into<String>) -> Filter {
    Filter::primitive(Primitive::CaptionContains(needle.into()))
}

/// Poll updates and messages that carry a poll.
pub fn poll() -> Filter {
    Filter::primitive(Primitive::Poll)
}

/// Callback queries carrying data.
pub fn callback_data() -> Filter {
    Filter::primitive(Primitive::CallbackData(None))
}

/// Callback queries whose data starts with `prefix`.
pub fn callback_data_prefix(prefix: impl Into<String>) -> Filter {
    Filter::primitive(Primitive::CallbackData(Some(prefix.into())))
}

pub fn inline_query() -> Filter {
    update_type(UpdateType::InlineQuery)
}

macro_rules! content_filters {
    ($( $(#[$doc:meta])* $fn_name:ident => $content:ident ),+ $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $fn_name() -> Filter {
                has(Content::$content)
            }
        )+
    };
}

content_filters! {
    /// Replies to another message.
    reply => Reply,
    forwarded => Forwarded,
    /// Service messages announcing joined members.
    new_chat_members => NewChatMembers,
    left_chat_member => LeftChatMember,
    photo => Photo,
    audio => Audio,
    document => Document,
    animation => Animation,
    sticker => Sticker,
    video => Video,
    voice => Voice,
    video_note => VideoNote,
    contact => Contact,
    location => Location,
    venue => Venue,
    /// Messages containing a link.
    web_page => WebPage,
    game => Game,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tgbee_core::Update;

    fn message(text: &str, chat_type: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "date": 0,
                "chat": {"id": -7, "type": chat_type, "username": "hive"},
                "from": {"id": 42, "first_name": "Ann", "username": "ann"},
                "text": text
            }
        }))
        .unwrap()
    }

    fn callback(data: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": 2,
            "callback_query": {
                "id": "q",
                "from": {"id": 42, "first_name": "Ann"},
                "chat_instance": "c",
                "data": data
            }
        }))
        .unwrap()
    }

    fn samples() -> Vec<Update> {
        vec![
            message("/start", "private"),
            message("hello there", "group"),
            message("/help me", "supergroup"),
            callback("vote:1"),
        ]
    }

    #[test]
    fn test_primitives() {
        let start = message("/start", "private");
        assert!(command(["start"]).evaluate(&start));
        assert!(text().evaluate(&start));
        assert!(private().evaluate(&start));
        assert!(!group().evaluate(&start));
        assert!(user([42]).evaluate(&start));
        assert!(user(["@ANN"]).evaluate(&start));
        assert!(!user([1]).evaluate(&start));
        assert!(chat(["hive"]).evaluate(&start));
        assert!(chat([-7]).evaluate(&start));
        assert!(regex(r"^/st").unwrap().evaluate(&start));
        assert!(!photo().evaluate(&start));
        assert!(!reply().evaluate(&start));

        let cb = callback("vote:1");
        assert!(callback_data_prefix("vote:").evaluate(&cb));
        assert!(!callback_data_prefix("poll:").evaluate(&cb));
        assert!(user([42]).evaluate(&cb));
    }

    #[test]
    fn test_non_applicable_variant_is_false() {
        let cb = callback("/start");
        assert!(!command(["start"]).evaluate(&cb));
        assert!(!text().evaluate(&cb));
        assert!(!private().evaluate(&cb));
        assert!(!callback_data().evaluate(&message("x", "private")));
    }

    #[test]
    fn test_and_or_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = {
            let calls = Arc::clone(&calls);
            Filter::custom("count", move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            })
        };
        let update = message("hi", "private");

        assert!(!and_of(Filter::never(), counter.clone()).evaluate(&update));
        assert!(or_of(Filter::always(), counter.clone()).evaluate(&update));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(and_of(Filter::always(), counter).evaluate(&update));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_algebraic_laws() {
        let a = command(["start"]);
        let b = private();
        let c = text_contains("hello");

        for update in samples() {
            let ab = and_of(a.clone(), b.clone()).evaluate(&update);
            let ba = and_of(b.clone(), a.clone()).evaluate(&update);
            assert_eq!(ab, ba);

            let ab = or_of(a.clone(), b.clone()).evaluate(&update);
            let ba = or_of(b.clone(), a.clone()).evaluate(&update);
            assert_eq!(ab, ba);

            let left = and_of(and_of(a.clone(), b.clone()), c.clone()).evaluate(&update);
            let right = and_of(a.clone(), and_of(b.clone(), c.clone())).evaluate(&update);
            assert_eq!(left, right);

            let left = or_of(or_of(a.clone(), b.clone()), c.clone()).evaluate(&update);
            let right = or_of(a.clone(), or_of(b.clone(), c.clone())).evaluate(&update);
            assert_eq!(left, right);

            let double = not_of(not_of(a.clone()));
            assert_eq!(double.evaluate(&update), a.evaluate(&update));

            let x = xor_of(a.clone(), b.clone()).evaluate(&update);
            assert_eq!(x, a.evaluate(&update) != b.evaluate(&update));
        }
    }

    #[test]
    fn test_double_negation_collapses() {
        let f = command(["start"]);
        assert_eq!(not_of(not_of(f.clone())).to_string(), f.to_string());
        assert_eq!((!f).to_string(), "!command(/start)");
    }

    #[test]
    fn test_applicable_types() {
        assert_eq!(command(["x"]).applicable_types(), TypeSet::MESSAGES);
        assert!(
            (command(["x"]) & callback_data())
                .applicable_types()
                .is_empty()
        );
        let either = command(["x"]) | callback_data();
        assert_eq!(either.applicable_types().len(), 5);
        assert!((!command(["x"])).applicable_types().is_all());
        assert!(Filter::never().applicable_types().is_empty());
        assert_eq!(
            update_type(UpdateType::Poll).applicable_types(),
            TypeSet::single(UpdateType::Poll)
        );
    }

    #[test]
    fn test_custom_for_skips_other_variants() {
        let f = Filter::custom_for("cb_only", UpdateType::CallbackQuery, |_| true);
        assert!(f.evaluate(&callback("x")));
        assert!(!f.evaluate(&message("x", "private")));
    }

    #[test]
    fn test_folds_and_display() {
        assert!(all_of([]).evaluate(&message("x", "private")));
        assert!(!any_of([]).evaluate(&message("x", "private")));

        let f = all_of([command(["start"]), private()]);
        assert_eq!(f.to_string(), "(command(/start) & chat_type(private))");
        assert_eq!(format!("{f:?}"), "Filter((command(/start) & chat_type(private)))");
    }

    #[test]
    fn test_invalid_regex() {
        assert!(regex("(").is_err());
    }
}
