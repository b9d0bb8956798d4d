//! Command parsing shared by the [`command`](super::command) filter and the
//! [`CommandArgs`](crate::extractor::CommandArgs) extractor.

/// A command split out of a message text, e.g. `/ban@beebot 42 spam`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// The prefix that introduced the command (`/`).
    pub prefix: &'a str,
    /// The command name without prefix or mention (`ban`).
    pub name: &'a str,
    /// The bot the command was addressed to (`beebot`).
    pub mention: Option<&'a str>,
    /// Everything after the first whitespace, trimmed at the start (`42 spam`).
    pub args: &'a str,
}

/// Parses `text` as a command introduced by one of `prefixes`.
///
/// The longest matching prefix wins, so `["/", "//"]` treats `//x` as `x`.
pub fn parse_command<'a, S: AsRef<str>>(
    text: &'a str,
    prefixes: &[S],
) -> Option<ParsedCommand<'a>> {
    let text = text.trim_start();
    let (head, args) = match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i..].trim_start()),
        None => (text, ""),
    };

    let prefix_len = prefixes
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| head.starts_with(*p))
        .map(str::len)
        .max()?;

    let body = &head[prefix_len..];
    let (name, mention) = match body.split_once('@') {
        Some((name, mention)) => (name, Some(mention)),
        None => (body, None),
    };
    if name.is_empty() {
        return None;
    }

    Some(ParsedCommand {
        prefix: &head[..prefix_len],
        name,
        mention,
        args,
    })
}

/// Matches message texts that start with one of a set of commands.
///
/// Names compare case-insensitively. A `@mention` suffix is accepted when no
/// bot username is configured, and must match it otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    names: Vec<String>,
    prefixes: Vec<String>,
    bot_username: Option<String>,
}

impl Command {
    /// Creates a command matcher with the default `/` prefix.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            prefixes: vec!["/".to_string()],
            bot_username: None,
        }
    }

    /// Replaces the accepted prefixes.
    pub fn prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Only accept `@mentions` addressed to this bot.
    pub fn bot_username(mut self, username: impl Into<String>) -> Self {
        let username = username.into();
        self.bot_username = Some(username.trim_start_matches('@').to_string());
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn prefix_list(&self) -> &[String] {
        &self.prefixes
    }

    /// Returns `true` if `text` invokes one of the commands.
    pub fn matches_text(&self, text: &str) -> bool {
        let Some(parsed) = parse_command(text, &self.prefixes) else {
            return false;
        };
        let name_ok = self
            .names
            .iter()
            .any(|n| n.eq_ignore_ascii_case(parsed.name));
        let mention_ok = match (parsed.mention, &self.bot_username) {
            (Some(mention), Some(own)) => mention.eq_ignore_ascii_case(own),
            _ => true,
        };
        name_ok && mention_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_parts() {
        let parsed = parse_command("/ban@BeeBot 42  spam", &["/"]).unwrap();
        assert_eq!(parsed.prefix, "/");
        assert_eq!(parsed.name, "ban");
        assert_eq!(parsed.mention, Some("BeeBot"));
        assert_eq!(parsed.args, "42  spam");

        assert!(parse_command("hello", &["/"]).is_none());
        assert!(parse_command("/", &["/"]).is_none());
        assert!(parse_command("/@bot", &["/"]).is_none());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let parsed = parse_command("!!go", &["!", "!!"]).unwrap();
        assert_eq!(parsed.prefix, "!!");
        assert_eq!(parsed.name, "go");
    }

    #[test]
    fn test_command_matching() {
        let cmd = Command::new(["start", "help"]);
        assert!(cmd.matches_text("/start"));
        assert!(cmd.matches_text("/START now"));
        assert!(cmd.matches_text("/help@anybot"));
        assert!(!cmd.matches_text("/starting"));
        assert!(!cmd.matches_text("start"));

        let cmd = Command::new(["start"]).prefixes(["!", "/"]).bot_username("@beebot");
        assert!(cmd.matches_text("!start"));
        assert!(cmd.matches_text("/start@BEEBOT"));
        assert!(!cmd.matches_text("/start@otherbot"));
    }
}
