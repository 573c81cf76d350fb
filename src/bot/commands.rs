use std::fmt;

/// Every command the bot understands. Adding one here forces the dispatcher
/// match to handle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Leave,
    Play { clip: String },
    List,
    Upload,
}

/// Why a `(name, args)` pair did not map to a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Unrecognized(String),
    MissingArgument {
        command: &'static str,
        usage: &'static str,
    },
}

impl Command {
    /// Interpreta un comando ya separado en nombre y argumentos.
    pub fn parse(name: &str, args: &[&str]) -> Result<Self, ParseError> {
        match name.to_ascii_lowercase().as_str() {
            "join" => Ok(Command::Join),
            "leave" => Ok(Command::Leave),
            "play" => {
                // `-nombre` es como aparece en la lista
                let clip = args
                    .first()
                    .map(|arg| arg.trim_start_matches('-'))
                    .filter(|clip| !clip.is_empty())
                    .ok_or(ParseError::MissingArgument {
                        command: "play",
                        usage: "play <clip>",
                    })?;
                Ok(Command::Play {
                    clip: clip.to_string(),
                })
            }
            "list" => Ok(Command::List),
            "upload" => Ok(Command::Upload),
            _ => Err(ParseError::Unrecognized(name.to_string())),
        }
    }

    /// Splits a chat message into a command if it starts with `prefix`.
    /// Returns `None` for messages that are not addressed to the bot.
    pub fn from_message(content: &str, prefix: &str) -> Option<Result<Self, ParseError>> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        let mut words = rest.split_whitespace();
        let name = words.next()?;
        let args: Vec<&str> = words.collect();
        Some(Self::parse(name, &args))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Join => "join",
            Command::Leave => "leave",
            Command::Play { .. } => "play",
            Command::List => "list",
            Command::Upload => "upload",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Play { clip } => write!(f, "play {}", clip),
            other => f.write_str(other.name()),
        }
    }
}
