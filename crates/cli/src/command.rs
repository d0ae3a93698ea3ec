//! Line commands of the terminal front end

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("Unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),

    #[error("Invalid argument for `{command}`: {value}")]
    InvalidArgument { command: &'static str, value: String },
}

/// One line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Resume,
    Stop,
    Save,
    Clear,
    /// Load a text file as the document
    Open(PathBuf),
    /// Use the rest of the line as the document
    Say(String),
    /// Select a voice by id, or show the current one
    Voice(Option<String>),
    Rate(f32),
    Pitch(f32),
    Chunk(usize),
    Voices,
    /// Re-enumerate device voices and reload the AI voice catalog
    RefreshVoices,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  play | pause | resume | stop     playback control
  say <text>                       read the given text
  open <path>                      read a text file
  voice [id]                       select a voice or show the current one
  voices [refresh]                 list voices, or reload the voice list
  rate <0.1-10> | pitch <0-2>      voice parameters
  chunk <n>                        characters per spoken unit
  status                           playback position
  save | clear                     store or forget the session
  quit                             save and exit";

/// Parse a line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "play" => Command::Play,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "stop" => Command::Stop,
        "save" => Command::Save,
        "clear" => Command::Clear,
        "open" | "load" => Command::Open(PathBuf::from(required("open", rest)?)),
        "say" => Command::Say(required("say", rest)?.to_string()),
        "voice" => Command::Voice((!rest.is_empty()).then(|| rest.to_string())),
        "rate" => Command::Rate(number("rate", rest)?),
        "pitch" => Command::Pitch(number("pitch", rest)?),
        "chunk" => {
            let size: usize = number("chunk", rest)?;
            if size == 0 {
                return Err(CommandError::InvalidArgument {
                    command: "chunk",
                    value: rest.to_string(),
                });
            }
            Command::Chunk(size)
        }
        "voices" => match rest {
            "" => Command::Voices,
            "refresh" => Command::RefreshVoices,
            other => {
                return Err(CommandError::InvalidArgument {
                    command: "voices",
                    value: other.to_string(),
                })
            }
        },
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return Err(CommandError::Unknown(name.to_string())),
    };

    Ok(Some(command))
}

fn required<'a>(command: &'static str, rest: &'a str) -> Result<&'a str, CommandError> {
    if rest.is_empty() {
        Err(CommandError::MissingArgument(command))
    } else {
        Ok(rest)
    }
}

fn number<T: std::str::FromStr>(command: &'static str, rest: &str) -> Result<T, CommandError> {
    required(command, rest)?
        .parse()
        .map_err(|_| CommandError::InvalidArgument {
            command,
            value: rest.to_string(),
        })
}
