//! Parser for twitch flavored IRC
//!
//! A line has the shape `[@tags ][:prefix ]COMMAND[ params]`. Parameters are separated by single
//! spaces, a parameter starting with `:` consumes the rest of the line.
//!
//! ```
//! use tirc::irc::IrcMessage;
//!
//! let msg = IrcMessage::parse(":ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #foo :hello world").unwrap();
//! assert_eq!(msg.command(), "PRIVMSG");
//! assert_eq!(msg.params(), &["#foo", "hello world"]);
//! assert_eq!(msg.sender(), Some("ronni"));
//! ```

use std::fmt;

use nom::bytes::complete::{take_till1, take_until};
use nom::character::complete::char;
use nom::combinator::{cut, opt};
use nom::sequence::{preceded, terminated};
use nom::IResult;
use smallvec::SmallVec;

use crate::event::tags::Tags;
use crate::Error;

/// Command parameters of a message
pub type Params<'a> = SmallVec<[&'a str; 4]>;

/// A parsed IRC line. Borrows the line it was parsed from, tags are unescaped into owned strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage<'a> {
    tags: Tags,
    prefix: Option<&'a str>,
    command: &'a str,
    params: Params<'a>,
}

impl<'a> IrcMessage<'a> {
    /// Parse a single line without its line terminator
    pub fn parse(line: &'a str) -> Result<IrcMessage<'a>, Error> {
        match message(line) {
            Ok((_, msg)) => Ok(msg),
            Err(err) => Err(Error::IrcParseError(format!("{} in line {:?}", err, line))),
        }
    }

    /// Tags, empty if the line had none
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Full prefix without the leading `:`
    pub fn prefix(&self) -> Option<&'a str> {
        self.prefix
    }

    /// Username part of the prefix, the text before `!`
    pub fn sender(&self) -> Option<&'a str> {
        self.prefix
            .and_then(|prefix| prefix.find('!').map(|idx| &prefix[..idx]))
    }

    /// Command name or numeric, as received
    pub fn command(&self) -> &'a str {
        self.command
    }

    /// Case insensitive command comparison
    pub fn is_command(&self, name: &str) -> bool {
        self.command.eq_ignore_ascii_case(name)
    }

    /// All parameters, the trailing one without its `:`
    pub fn params(&self) -> &[&'a str] {
        &self.params
    }

    /// Get a parameter by index
    pub fn param(&self, index: usize) -> Option<&'a str> {
        self.params.get(index).copied()
    }

    /// Get a parameter by index, returns an Error if it does not exist
    pub fn try_param(&self, index: usize) -> Result<&'a str, Error> {
        self.param(index)
            .ok_or_else(|| Error::MissingIrcCommandParameter(index, self.to_string()))
    }
}

impl fmt::Display for IrcMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            write!(f, "@{} ", self.tags)?;
        }
        if let Some(prefix) = self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(self.command)?;
        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {}", param)?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }
        Ok(())
    }
}

/// Split a websocket frame into lines and parse each one. Empty lines are skipped, a line that
/// fails to parse does not affect the others.
pub fn parse_frame<'a>(
    frame: &'a str,
) -> impl Iterator<Item = (&'a str, Result<IrcMessage<'a>, Error>)> + 'a {
    frame
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| (line, IrcMessage::parse(line)))
}

/// Parse an IRC message
fn message(input: &str) -> IResult<&str, IrcMessage<'_>> {
    let (input, tags) = irc_tags(input)?;
    let (input, prefix) = irc_prefix(input)?;
    let (input, command) = command(input)?;
    let (input, params) = command_params(input)?;
    Ok((
        input,
        IrcMessage {
            tags,
            prefix,
            command,
            params,
        },
    ))
}

/// Parse the tag segment. Once a line starts with `@` the segment must end with a space.
fn irc_tags(input: &str) -> IResult<&str, Tags> {
    let (rem, raw) = opt(preceded(
        char('@'),
        cut(terminated(take_until(" "), char(' '))),
    ))(input)?;
    Ok((rem, raw.map(Tags::parse).unwrap_or_default()))
}

fn irc_prefix(input: &str) -> IResult<&str, Option<&str>> {
    opt(preceded(
        char(':'),
        cut(terminated(take_until(" "), char(' '))),
    ))(input)
}

/// Parse an IRC command name, anything up to the next space
fn command(input: &str) -> IResult<&str, &str> {
    take_till1(|c| c == ' ')(input)
}

/// Parse IRC command parameters. Consecutive spaces produce empty middle parameters.
fn command_params(input: &str) -> IResult<&str, Params<'_>> {
    let mut params = Params::new();
    let mut rest = match input.strip_prefix(' ') {
        Some(rest) => rest,
        None => return Ok((input, params)),
    };
    while !rest.is_empty() {
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing);
            rest = &rest[rest.len()..];
            break;
        }
        match rest.find(' ') {
            Some(idx) => {
                params.push(&rest[..idx]);
                rest = &rest[idx + 1..];
            }
            None => {
                params.push(rest);
                rest = &rest[rest.len()..];
            }
        }
    }
    Ok((rest, params))
}
