//! Display-name extraction from User ID strings.
//!
//! Two grammars are understood:
//!
//! - [`Grammar::Loose`]: `Name [(comment) ]<email>`, the layout `gpg
//!   --gen-key` produces, matched with a regular expression.
//! - [`Grammar::Mailbox`]: RFC 2822 address lists, including groups, quoted
//!   strings and comments. Only mailboxes with a display name contribute.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::packet::PacketList;
use crate::types::Mailbox;

static LOOSE_USER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^(]*) ((\([^)]*\)) )?(<[^>]*>)").expect("static regex is valid")
});

/// A User ID grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Grammar {
    /// RFC 2822 mailbox / address-list syntax.
    Mailbox,
    /// `Name (comment) <email>` matched by regular expression.
    Loose,
}

impl Grammar {
    /// Names this grammar finds in `user_id`, or `None` if it does not parse.
    pub fn names(self, user_id: &str) -> Option<Vec<String>> {
        match self {
            Self::Loose => parse_loose(user_id).map(|name| vec![name]),
            Self::Mailbox => parse_mailboxes(user_id)
                .map(|list| list.into_iter().filter_map(|m| m.phrase).collect()),
        }
    }
}

/// What to do with a User ID that no grammar accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum UnparsablePolicy {
    /// Log and ignore the User ID.
    #[default]
    Skip,
    /// Reject the whole key.
    Abort,
}

/// A User ID that none of the configured grammars accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsableUserId(pub String);

/// Applies an ordered list of grammars to every User ID of a key.
#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    grammars: Vec<Grammar>,
    policy: UnparsablePolicy,
}

impl Default for IdentityExtractor {
    fn default() -> Self {
        Self::new(vec![Grammar::Mailbox, Grammar::Loose], UnparsablePolicy::Skip)
    }
}

impl IdentityExtractor {
    pub fn new(grammars: Vec<Grammar>, policy: UnparsablePolicy) -> Self {
        Self { grammars, policy }
    }

    pub fn grammars(&self) -> &[Grammar] {
        &self.grammars
    }

    pub fn policy(&self) -> UnparsablePolicy {
        self.policy
    }

    /// Display names from every User ID packet, in packet order.
    ///
    /// Every grammar is tried on every User ID and the names they produce
    /// are concatenated, so repeats are expected.
    pub fn extract_names(&self, packets: &PacketList) -> Result<Vec<String>, UnparsableUserId> {
        self.names_from_user_ids(packets.user_ids())
    }

    pub fn names_from_user_ids<I, S>(&self, user_ids: I) -> Result<Vec<String>, UnparsableUserId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = Vec::new();

        for user_id in user_ids {
            let user_id = user_id.as_ref();
            let mut parsed = false;
            for grammar in &self.grammars {
                if let Some(found) = grammar.names(user_id) {
                    parsed = true;
                    names.extend(found);
                }
            }

            if !parsed {
                match self.policy {
                    UnparsablePolicy::Skip => {
                        debug!(user_id, "skipping unparsable user id");
                    }
                    UnparsablePolicy::Abort => {
                        return Err(UnparsableUserId(user_id.to_string()));
                    }
                }
            }
        }

        Ok(names)
    }
}

/// Name part of a `Name [(comment) ]<email>` User ID.
pub fn parse_loose(user_id: &str) -> Option<String> {
    LOOSE_USER_ID
        .captures(user_id)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parses an RFC 2822 address list.
///
/// Group members are flattened into the result; the group's own name is not
/// a mailbox and is dropped. Returns `None` unless the whole input parses.
pub fn parse_mailboxes(input: &str) -> Option<Vec<Mailbox>> {
    let mut parser = MailboxParser::new(input);
    let list = parser.address_list()?;
    parser.skip_cfws()?;
    parser.at_end().then_some(list)
}

struct MailboxParser {
    chars: Vec<char>,
    pos: usize,
}

impl MailboxParser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skips folding whitespace and (nested) comments.
    ///
    /// Returns whether anything was skipped, or `None` on an unterminated
    /// comment.
    fn skip_cfws(&mut self) -> Option<bool> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.pos += 1,
                Some('(') => self.comment()?,
                _ => return Some(self.pos != start),
            }
        }
    }

    fn comment(&mut self) -> Option<()> {
        let mut depth = 0usize;
        loop {
            match self.peek()? {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Some(());
                    }
                }
                '\\' => self.pos += 1,
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn atom(&mut self) -> Option<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_atext) {
            self.pos += 1;
        }
        (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
    }

    fn quoted_string(&mut self) -> Option<String> {
        if !self.eat('"') {
            return None;
        }
        let mut out = String::new();
        loop {
            match self.peek()? {
                '"' => {
                    self.pos += 1;
                    return Some(out);
                }
                '\\' => {
                    self.pos += 1;
                    out.push(self.peek()?);
                }
                c => out.push(c),
            }
            self.pos += 1;
        }
    }

    fn word(&mut self) -> Option<String> {
        if self.peek() == Some('"') {
            self.quoted_string()
        } else {
            self.atom()
        }
    }

    /// `phrase = 1*word`, also accepting the obsolete form with bare dots.
    ///
    /// Words are joined with a single space wherever whitespace or comments
    /// separated them in the input.
    fn phrase(&mut self) -> Option<String> {
        let start = self.pos;
        self.skip_cfws()?;
        let Some(first) = self.word() else {
            self.pos = start;
            return None;
        };
        let mut out = first;

        loop {
            let before = self.pos;
            let spaced = match self.skip_cfws() {
                Some(spaced) => spaced,
                None => {
                    self.pos = before;
                    break;
                }
            };

            let next = if self.peek() == Some('.') {
                self.pos += 1;
                Some(".".to_string())
            } else {
                self.word()
            };

            match next {
                Some(word) => {
                    if spaced {
                        out.push(' ');
                    }
                    out.push_str(&word);
                }
                None => {
                    self.pos = before;
                    break;
                }
            }
        }

        Some(out)
    }

    fn dot_atom(&mut self) -> Option<String> {
        let mut out = self.atom()?;
        while self.peek() == Some('.') {
            self.pos += 1;
            out.push('.');
            out.push_str(&self.atom()?);
        }
        Some(out)
    }

    fn domain_literal(&mut self) -> Option<String> {
        if !self.eat('[') {
            return None;
        }
        let mut out = String::from("[");
        loop {
            match self.peek()? {
                ']' => {
                    self.pos += 1;
                    out.push(']');
                    return Some(out);
                }
                '[' => return None,
                '\\' => {
                    self.pos += 1;
                    out.push(self.peek()?);
                }
                c if c.is_whitespace() => {}
                c => out.push(c),
            }
            self.pos += 1;
        }
    }

    fn addr_spec(&mut self) -> Option<String> {
        self.skip_cfws()?;
        let local = if self.peek() == Some('"') {
            let quoted = self.quoted_string()?;
            format!("\"{quoted}\"")
        } else {
            self.dot_atom()?
        };
        self.skip_cfws()?;
        if !self.eat('@') {
            return None;
        }
        self.skip_cfws()?;
        let domain = if self.peek() == Some('[') {
            self.domain_literal()?
        } else {
            self.dot_atom()?
        };
        self.skip_cfws()?;
        Some(format!("{local}@{domain}"))
    }

    fn angle_addr(&mut self) -> Option<String> {
        self.skip_cfws()?;
        if !self.eat('<') {
            return None;
        }
        let address = self.addr_spec()?;
        if !self.eat('>') {
            return None;
        }
        self.skip_cfws()?;
        Some(address)
    }

    fn mailbox(&mut self) -> Option<Mailbox> {
        let start = self.pos;

        if let Some(phrase) = self.phrase() {
            if let Some(address) = self.angle_addr() {
                return Some(Mailbox {
                    phrase: Some(phrase),
                    address,
                });
            }
        }
        self.pos = start;

        if let Some(address) = self.angle_addr() {
            return Some(Mailbox {
                phrase: None,
                address,
            });
        }
        self.pos = start;

        let address = self.addr_spec()?;
        Some(Mailbox {
            phrase: None,
            address,
        })
    }

    fn group(&mut self) -> Option<Vec<Mailbox>> {
        self.phrase()?;
        if !self.eat(':') {
            return None;
        }

        let mut members = Vec::new();
        self.skip_cfws()?;
        if self.peek() != Some(';') {
            members.push(self.mailbox()?);
            while self.eat(',') {
                members.push(self.mailbox()?);
            }
        }

        if !self.eat(';') {
            return None;
        }
        self.skip_cfws()?;
        Some(members)
    }

    fn address(&mut self) -> Option<Vec<Mailbox>> {
        let start = self.pos;
        if let Some(members) = self.group() {
            return Some(members);
        }
        self.pos = start;
        self.mailbox().map(|m| vec![m])
    }

    fn address_list(&mut self) -> Option<Vec<Mailbox>> {
        let mut list = self.address()?;
        while self.eat(',') {
            list.extend(self.address()?);
        }
        Some(list)
    }
}

fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~".contains(c) || !c.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::parse_packets;

    fn mailbox(phrase: Option<&str>, address: &str) -> Mailbox {
        Mailbox {
            phrase: phrase.map(str::to_string),
            address: address.to_string(),
        }
    }

    fn user_id_packets(user_ids: &[&str]) -> PacketList {
        let mut data = Vec::new();
        for uid in user_ids {
            data.push(0xCD);
            data.push(uid.len() as u8);
            data.extend(uid.as_bytes());
        }
        parse_packets(&data).unwrap()
    }

    #[test]
    fn test_loose_with_comment() {
        assert_eq!(
            parse_loose("Jane Doe (note) <jane@example.org>").as_deref(),
            Some("Jane Doe")
        );
    }

    #[test]
    fn test_loose_without_comment() {
        assert_eq!(
            parse_loose("Jane Doe <jane@example.org>").as_deref(),
            Some("Jane Doe")
        );
    }

    #[test]
    fn test_loose_rejects_bare_address() {
        assert_eq!(parse_loose("jane@example.org"), None);
        assert_eq!(parse_loose("Jane Doe"), None);
    }

    #[test]
    fn test_mailbox_name_addr() {
        assert_eq!(
            parse_mailboxes("Jane Doe <jane@example.org>"),
            Some(vec![mailbox(Some("Jane Doe"), "jane@example.org")])
        );
    }

    #[test]
    fn test_mailbox_comment_is_not_part_of_name() {
        assert_eq!(
            parse_mailboxes("Jane Doe (work key) <jane@example.org>"),
            Some(vec![mailbox(Some("Jane Doe"), "jane@example.org")])
        );
        assert_eq!(
            parse_mailboxes("Jane (a (nested) note) Doe <jane@example.org>"),
            Some(vec![mailbox(Some("Jane Doe"), "jane@example.org")])
        );
    }

    #[test]
    fn test_mailbox_quoted_phrase() {
        assert_eq!(
            parse_mailboxes(r#""Doe, Jane \"JD\"" <jane@example.org>"#),
            Some(vec![mailbox(Some(r#"Doe, Jane "JD""#), "jane@example.org")])
        );
    }

    #[test]
    fn test_mailbox_obsolete_phrase_with_dots() {
        assert_eq!(
            parse_mailboxes("Roger G. Coram <roger@example.org>"),
            Some(vec![mailbox(Some("Roger G. Coram"), "roger@example.org")])
        );
    }

    #[test]
    fn test_mailbox_utf8_phrase() {
        assert_eq!(
            parse_mailboxes("Zoë Åström <zoe@example.org>"),
            Some(vec![mailbox(Some("Zoë Åström"), "zoe@example.org")])
        );
    }

    #[test]
    fn test_mailbox_without_phrase() {
        assert_eq!(
            parse_mailboxes("jane@example.org"),
            Some(vec![mailbox(None, "jane@example.org")])
        );
        assert_eq!(
            parse_mailboxes("<jane@example.org>"),
            Some(vec![mailbox(None, "jane@example.org")])
        );
    }

    #[test]
    fn test_mailbox_list_and_group() {
        let parsed =
            parse_mailboxes("Team: Jane Doe <jane@example.org>, bob@example.org;, Eve <eve@[192.0.2.1]>")
                .unwrap();
        assert_eq!(
            parsed,
            vec![
                mailbox(Some("Jane Doe"), "jane@example.org"),
                mailbox(None, "bob@example.org"),
                mailbox(Some("Eve"), "eve@[192.0.2.1]"),
            ]
        );
    }

    #[test]
    fn test_mailbox_empty_group() {
        assert_eq!(parse_mailboxes("Undisclosed recipients:;"), Some(vec![]));
    }

    #[test]
    fn test_mailbox_rejects_garbage() {
        assert_eq!(parse_mailboxes("Jane Doe"), None);
        assert_eq!(parse_mailboxes("Jane Doe <jane@example.org"), None);
        assert_eq!(parse_mailboxes("Jane (unterminated <jane@example.org>"), None);
        assert_eq!(parse_mailboxes("Jane Doe <jane@example.org> trailing"), None);
        assert_eq!(parse_mailboxes(""), None);
    }

    #[test]
    fn test_grammar_names() {
        assert_eq!(
            Grammar::Mailbox.names("jane@example.org"),
            Some(Vec::<String>::new())
        );
        assert_eq!(
            Grammar::Loose.names("Jane Doe (note) <jane@example.org>"),
            Some(vec!["Jane Doe".to_string()])
        );
        assert_eq!(Grammar::Loose.names("jane@example.org"), None);
    }

    #[test]
    fn test_extract_names_union_of_grammars() {
        let packets = user_id_packets(&["Jane Doe (note) <jane@example.org>", "J. Doe <j@example.org>"]);
        let names = IdentityExtractor::default().extract_names(&packets).unwrap();
        assert_eq!(names, vec!["Jane Doe", "Jane Doe", "J. Doe", "J. Doe"]);
    }

    #[test]
    fn test_extract_names_single_grammar() {
        let packets = user_id_packets(&["Jane Doe <jane@example.org>"]);
        let extractor = IdentityExtractor::new(vec![Grammar::Loose], UnparsablePolicy::Skip);
        assert_eq!(extractor.extract_names(&packets).unwrap(), vec!["Jane Doe"]);
    }

    #[test]
    fn test_extract_names_skip_policy() {
        let packets = user_id_packets(&["just some text", "Jane Doe <jane@example.org>"]);
        let extractor = IdentityExtractor::new(vec![Grammar::Loose], UnparsablePolicy::Skip);
        assert_eq!(extractor.extract_names(&packets).unwrap(), vec!["Jane Doe"]);
    }

    #[test]
    fn test_extract_names_abort_policy() {
        let packets = user_id_packets(&["Jane Doe <jane@example.org>", "just some text"]);
        let extractor = IdentityExtractor::new(vec![Grammar::Loose], UnparsablePolicy::Abort);
        let err = extractor.extract_names(&packets).unwrap_err();
        assert_eq!(err, UnparsableUserId("just some text".to_string()));
    }

    #[test]
    fn test_extract_names_phraseless_is_not_unparsable() {
        let packets = user_id_packets(&["jane@example.org"]);
        let extractor = IdentityExtractor::new(vec![Grammar::Mailbox], UnparsablePolicy::Abort);
        assert!(extractor.extract_names(&packets).unwrap().is_empty());
    }
}
