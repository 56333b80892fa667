//! External command parsing.
//!
//! Inbound bridge lines (relayed by the peripherals runner) are parsed
//! in the main loop into [`SessionCommand`]s. The grammar is flat:
//! one keyword, optional arguments, whitespace-separated.
//!
//! | Line | Command |
//! |------|---------|
//! | `kill` | terminate the session |
//! | `pause` | clear the run flag; listeners stop draining |
//! | `resume` | set the run flag |
//! | `hold` | block the root decision maker |
//! | `write <channel> <text…>` | inject a chat action |
//! | `stop` | send every bot to its safe idle location |

use hive_types::ErrorCode;
use thiserror::Error;

/// A parsed external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Terminate the session.
    Kill,
    /// Clear the run flag.
    Pause,
    /// Set the run flag.
    Resume,
    /// Block the root decision maker.
    Hold,
    /// Inject a chat action.
    Write {
        /// Chat channel name.
        channel: String,
        /// Message text.
        text: String,
    },
    /// Send every bot to its safe idle location.
    Stop,
}

/// Parses one bridge line.
///
/// # Errors
///
/// [`CommandError::Empty`] for blank lines,
/// [`CommandError::Unknown`] for unrecognized keywords,
/// [`CommandError::MissingArgument`] when `write` lacks its channel
/// or text.
///
/// # Example
///
/// ```
/// use hive_runtime::commands::{parse_command, SessionCommand};
///
/// assert_eq!(parse_command("pause").unwrap(), SessionCommand::Pause);
/// assert_eq!(
///     parse_command("write party on my way").unwrap(),
///     SessionCommand::Write {
///         channel: "party".into(),
///         text: "on my way".into(),
///     },
/// );
/// ```
pub fn parse_command(line: &str) -> Result<SessionCommand, CommandError> {
    let mut parts = line.split_whitespace();
    let Some(keyword) = parts.next() else {
        return Err(CommandError::Empty);
    };

    match keyword.to_ascii_lowercase().as_str() {
        "kill" => Ok(SessionCommand::Kill),
        "pause" => Ok(SessionCommand::Pause),
        "resume" => Ok(SessionCommand::Resume),
        "hold" => Ok(SessionCommand::Hold),
        "stop" => Ok(SessionCommand::Stop),
        "write" => {
            let channel = parts
                .next()
                .ok_or(CommandError::MissingArgument("channel"))?
                .to_string();
            let text = parts.collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return Err(CommandError::MissingArgument("text"));
            }
            Ok(SessionCommand::Write { channel, text })
        }
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Command parsing errors.
///
/// | Error | Code | Recoverable |
/// |-------|------|-------------|
/// | [`Empty`](CommandError::Empty) | `COMMAND_EMPTY` | No |
/// | [`Unknown`](CommandError::Unknown) | `COMMAND_UNKNOWN` | No |
/// | [`MissingArgument`](CommandError::MissingArgument) | `COMMAND_MISSING_ARGUMENT` | No |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The line was blank.
    #[error("empty command")]
    Empty,

    /// The keyword is not part of the grammar.
    #[error("unknown command: {0}")]
    Unknown(String),

    /// `write` without channel or text.
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
}

impl ErrorCode for CommandError {
    fn code(&self) -> &'static str {
        match self {
            Self::Empty => "COMMAND_EMPTY",
            Self::Unknown(_) => "COMMAND_UNKNOWN",
            Self::MissingArgument(_) => "COMMAND_MISSING_ARGUMENT",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
