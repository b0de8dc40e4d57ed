//! Stdin control commands

use std::fmt;

/// One line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Flip an effect between ON and OFF
    Toggle(String),
    /// Set an effect's wet mix
    Wet { name: String, wet: f32 },
    /// Set any live parameter by name
    Set {
        name: String,
        param: String,
        value: f32,
    },
    /// Print the chain
    List,
    /// Print the metrics snapshot as JSON
    Metrics,
    /// Clear all effect state
    Reset,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    MissingEffectName,
    BadWet,
    BadSet,
    Unknown(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty command"),
            ParseError::MissingEffectName => write!(f, "usage: toggle <effect name>"),
            ParseError::BadWet => write!(f, "usage: wet <effect name> <0.0-1.0>"),
            ParseError::BadSet => write!(f, "usage: set <effect name> <param> <value>"),
            ParseError::Unknown(cmd) => write!(f, "unknown command '{}' (try 'help')", cmd),
        }
    }
}

impl std::error::Error for ParseError {}

impl Command {
    pub const HELP: &'static str =
        "commands: toggle <name> | wet <name> <0-1> | set <name> <param> <value> | list | metrics | reset | help | quit";

    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "" => Err(ParseError::Empty),
            "toggle" | "t" if rest.is_empty() => Err(ParseError::MissingEffectName),
            "toggle" | "t" => Ok(Command::Toggle(rest.to_string())),
            "wet" => parse_wet(rest),
            "set" => parse_set(rest),
            "list" | "ls" => Ok(Command::List),
            "metrics" | "m" => Ok(Command::Metrics),
            "reset" => Ok(Command::Reset),
            "help" | "?" => Ok(Command::Help),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            _ => Err(ParseError::Unknown(word.to_string())),
        }
    }
}

/// `<name...> <value>`; the name may contain spaces
fn parse_wet(args: &str) -> Result<Command, ParseError> {
    let (name, value) = args.rsplit_once(char::is_whitespace).ok_or(ParseError::BadWet)?;
    let wet: f32 = value.parse().map_err(|_| ParseError::BadWet)?;
    let name = name.trim();
    if name.is_empty() || !wet.is_finite() {
        return Err(ParseError::BadWet);
    }
    Ok(Command::Wet {
        name: name.to_string(),
        wet,
    })
}

/// `<name...> <param> <value>`
fn parse_set(args: &str) -> Result<Command, ParseError> {
    let (head, value) = args.rsplit_once(char::is_whitespace).ok_or(ParseError::BadSet)?;
    let value: f32 = value.parse().map_err(|_| ParseError::BadSet)?;
    let (name, param) = head.trim().rsplit_once(char::is_whitespace).ok_or(ParseError::BadSet)?;
    let name = name.trim();
    if name.is_empty() || !value.is_finite() {
        return Err(ParseError::BadSet);
    }
    Ok(Command::Set {
        name: name.to_string(),
        param: param.to_ascii_lowercase(),
        value,
    })
}
