//! IRCv3 tag map and convenience accessors for the tags twitch sends.
//!
//! Tag values are unescaped while parsing. A tag that is present without a value (`badge-info=`
//! or just `badge-info`) is kept as a key but reads as `None`, exactly like an absent tag.
//!
//! # Examples
//!
//! ```
//! use tirc::irc::IrcMessage;
//!
//! let msg = IrcMessage::parse(
//!     "@badge-info=;badges=moderator/1;color=#FF0000 :nick!user@host PRIVMSG #foo :hi",
//! )
//! .unwrap();
//! assert_eq!(msg.tags().color(), Some("#FF0000"));
//! assert_eq!(msg.tags().get("badge-info"), None);
//! assert!(msg.tags().contains_key("badge-info"));
//! ```

use std::borrow::Cow;
use std::fmt;
use std::iter::FromIterator;
use std::str::FromStr;

use fnv::FnvHashMap;
use nom::bytes::complete::take_till1;
use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map_res};
use nom::multi::{separated_list0, separated_list1};
use nom::sequence::{separated_pair, tuple};
use nom::IResult;

use crate::Error;

/// Map of IRCv3 tags. Iteration order is unspecified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(FnvHashMap<String, Option<String>>);

impl Tags {
    /// Parse the tag segment of a line, without the leading `@`
    pub(crate) fn parse(raw: &str) -> Tags {
        raw.split(';')
            .filter(|tag| !tag.is_empty())
            .map(|tag| {
                let mut parts = tag.splitn(2, '=');
                let key = parts.next().unwrap_or_default();
                let value = parts.next().map(unescape_tag_value);
                (key, value)
            })
            .collect()
    }

    /// Get a tag value by its key. `None` for tags that are not present as well as tags that
    /// are set but empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.as_deref())
    }

    /// Gets a tag value, returns an Error if the value is not set or empty.
    pub fn required(&self, key: &str) -> Result<&str, Error> {
        self.get(key)
            .ok_or_else(|| Error::TagParseError(key.to_string(), String::new()))
    }

    /// Whether the key was sent at all, with or without a value
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set a tag. Empty values are stored as absent.
    pub fn insert<K: Into<String>>(&mut self, key: K, value: Option<String>) {
        self.0
            .insert(key.into(), value.filter(|value| !value.is_empty()));
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no tags were sent
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over all tags
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> + '_ {
        self.0
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_deref()))
    }

    /// `badge-info` tag. Metadata related to the chat badges in the `badges` tag.
    pub fn badge_info(&self) -> Result<Vec<Badge<'_>>, Error> {
        self.get("badge-info")
            .map_or(Ok(vec![]), |badges| parse_badges(badges, "badge-info"))
    }

    /// `badges` tag. List of chat badges and the version of each badge
    pub fn badges(&self) -> Result<Vec<Badge<'_>>, Error> {
        self.get("badges")
            .map_or(Ok(vec![]), |badges| parse_badges(badges, "badges"))
    }

    /// `color` tag
    #[inline]
    pub fn color(&self) -> Option<&str> {
        self.get("color")
    }

    /// `display-name` tag
    #[inline]
    pub fn display_name(&self) -> Option<&str> {
        self.get("display-name")
    }

    /// `user-id` tag
    #[inline]
    pub fn user_id(&self) -> Option<&str> {
        self.get("user-id")
    }

    /// `id` tag, the message UUID
    #[inline]
    pub fn id(&self) -> Option<&str> {
        self.get("id")
    }

    /// `mod` tag
    #[inline]
    pub fn is_mod(&self) -> bool {
        matches!(self.get("mod"), Some("1"))
    }

    /// `tmi-sent-ts` tag
    pub fn sent_timestamp(&self) -> Result<u64, Error> {
        let tag = self.required("tmi-sent-ts")?;
        u64::from_str(tag).map_err(|_| Error::TagParseError("tmi-sent-ts".into(), tag.into()))
    }

    /// `emote-sets` tag split on `,`, empty entries dropped. Empty when the tag is missing.
    pub fn emote_sets(&self) -> Vec<&str> {
        self.get("emote-sets")
            .map(|sets| sets.split(',').filter(|set| !set.is_empty()).collect())
            .unwrap_or_default()
    }

    /// `emotes` tag
    ///
    /// # Examples
    /// ```
    /// # use tirc::irc::IrcMessage;
    /// use tirc::event::tags::EmoteReplacement;
    ///
    /// let msg = IrcMessage::parse(
    ///     "@emotes=25:0-4,12-16/1902:6-10 :ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #ronni :Kappa Keepo Kappa",
    /// )
    /// .unwrap();
    /// assert_eq!(msg.tags().emotes().unwrap(), vec![
    ///     EmoteReplacement { emote_id: "25".into(), indices: vec![(0, 4), (12, 16)] },
    ///     EmoteReplacement { emote_id: "1902".into(), indices: vec![(6, 10)] },
    /// ]);
    /// ```
    pub fn emotes(&self) -> Result<Vec<EmoteReplacement>, Error> {
        self.get("emotes").map_or(Ok(vec![]), parse_emotes)
    }
}

impl<K, V> FromIterator<(K, Option<V>)> for Tags
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        let mut tags = Tags::default();
        for (key, value) in iter {
            tags.insert(key, value.map(Into::into));
        }
        tags
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            f.write_str(key)?;
            if let Some(value) = value {
                write!(f, "={}", escape_tag_value(value))?;
            }
        }
        Ok(())
    }
}

/// Badges from the `badges` and `badge-info` tags
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Badge<'a> {
    /// Badge name
    pub badge: &'a str,
    /// Badge "version", meaning depends on the badge
    pub version: &'a str,
}

/// Replacement instruction for an emote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmoteReplacement {
    /// Emote ID
    pub emote_id: String,
    /// Start and end index of the emote in the message
    pub indices: Vec<(usize, usize)>,
}

fn unescape_tag_value(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }
    let mut unescaped = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => unescaped.push(';'),
            Some('s') => unescaped.push(' '),
            Some('r') => unescaped.push('\r'),
            Some('n') => unescaped.push('\n'),
            Some(other) => unescaped.push(other),
            // a trailing lone backslash is dropped
            None => {}
        }
    }
    unescaped
}

fn escape_tag_value(value: &str) -> Cow<'_, str> {
    if !value.contains(|c| matches!(c, ';' | ' ' | '\\' | '\r' | '\n')) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        match c {
            ';' => escaped.push_str("\\:"),
            ' ' => escaped.push_str("\\s"),
            '\\' => escaped.push_str("\\\\"),
            '\r' => escaped.push_str("\\r"),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

fn parse_badges<'a>(input: &'a str, tag_name: &str) -> Result<Vec<Badge<'a>>, Error> {
    all_consuming(separated_list0(char(','), parse_badge))(input)
        .map(|(_, badges)| badges)
        .map_err(|_| Error::TagParseError(tag_name.to_string(), input.to_string()))
}

fn parse_badge(input: &str) -> IResult<&str, Badge<'_>> {
    let (remaining, (badge, _, version)) = tuple((
        take_till1(|c| c == '/' || c == ','),
        char('/'),
        take_till1(|c| c == ','),
    ))(input)?;
    Ok((remaining, Badge { badge, version }))
}

fn take_usize(input: &str) -> IResult<&str, usize> {
    map_res(digit1, usize::from_str)(input)
}

fn parse_emote(input: &str) -> IResult<&str, EmoteReplacement> {
    let (rem, (emote_id, indices)) = separated_pair(
        take_till1(|c| c == ':'),
        char(':'),
        separated_list1(char(','), separated_pair(take_usize, char('-'), take_usize)),
    )(input)?;
    Ok((
        rem,
        EmoteReplacement {
            emote_id: emote_id.to_string(),
            indices,
        },
    ))
}

fn parse_emotes(input: &str) -> Result<Vec<EmoteReplacement>, Error> {
    all_consuming(separated_list0(char('/'), parse_emote))(input)
        .map(|(_, replacements)| replacements)
        .map_err(|_| Error::TagParseError("emotes".to_string(), input.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_and_missing_values_are_absent() {
        let tags = Tags::parse("badge-info=;badges=moderator/1;color=#FF0000;flag");
        assert_eq!(tags.len(), 4);
        assert_eq!(tags.get("badge-info"), None);
        assert_eq!(tags.get("flag"), None);
        assert_eq!(tags.get("missing"), None);
        assert!(tags.contains_key("badge-info"));
        assert!(!tags.contains_key("missing"));
        assert_eq!(tags.get("badges"), Some("moderator/1"));
        assert_eq!(tags.color(), Some("#FF0000"));
    }

    #[test]
    fn test_value_split_on_first_equals() {
        let tags = Tags::parse("system-msg=a=b");
        assert_eq!(tags.get("system-msg"), Some("a=b"));
    }

    #[test]
    fn test_unescape() {
        let tags = Tags::parse(r"system-msg=5\sgift\ssubs\:\sthanks\\");
        assert_eq!(tags.get("system-msg"), Some(r"5 gift subs; thanks\"));
    }

    #[test]
    fn test_display_escapes() {
        let tags: Tags = vec![("msg", Some("a b;c"))].into_iter().collect();
        assert_eq!(tags.to_string(), r"msg=a\sb\:c");
        assert_eq!(Tags::parse(&tags.to_string()), tags);
    }

    #[test]
    fn test_badge_parsing() {
        let tags = Tags::parse("badges=broadcaster/1,subscriber/12,sub-gifter/5");
        assert_eq!(
            tags.badges().unwrap(),
            vec![
                Badge {
                    badge: "broadcaster",
                    version: "1"
                },
                Badge {
                    badge: "subscriber",
                    version: "12"
                },
                Badge {
                    badge: "sub-gifter",
                    version: "5"
                }
            ]
        );
        assert_eq!(tags.badge_info().unwrap(), vec![]);
        assert!(Tags::parse("badges=broken").badges().is_err());
    }

    #[test]
    fn test_emote_sets() {
        let tags = Tags::parse("emote-sets=300,301,");
        assert_eq!(tags.emote_sets(), vec!["300", "301"]);
        assert!(Tags::parse("emote-sets=").emote_sets().is_empty());
        assert!(Tags::default().emote_sets().is_empty());
    }

    #[test]
    fn test_emotes() {
        let tags = Tags::parse("emotes=emotesv2_abc:0-4/25:6-10,12-16");
        assert_eq!(
            tags.emotes().unwrap(),
            vec![
                EmoteReplacement {
                    emote_id: "emotesv2_abc".into(),
                    indices: vec![(0, 4)]
                },
                EmoteReplacement {
                    emote_id: "25".into(),
                    indices: vec![(6, 10), (12, 16)]
                }
            ]
        );
        assert!(Tags::parse("emotes=25:x-y").emotes().is_err());
    }

    #[test]
    fn test_flags() {
        let tags = Tags::parse("mod=1;tmi-sent-ts=1507246572675");
        assert!(tags.is_mod());
        assert_eq!(tags.sent_timestamp().unwrap(), 1_507_246_572_675);
        assert!(!Tags::parse("mod=0").is_mod());
        assert!(Tags::default().sent_timestamp().is_err());
    }
}
