pub mod auth;
pub mod client;
pub mod command;
pub mod config;
pub mod dbsize;
pub mod del;
pub mod executable;
pub mod exists;
pub mod get;
pub mod ping;
pub mod quit;
pub mod select;
pub mod set;

use bytes::Bytes;
use std::{str, vec};
use strum_macros::IntoStaticStr;
use thiserror::Error as ThisError;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::session::Session;
use crate::store::Store;

use auth::Auth;
use client::Client;
use command::Command as Command_;
use config::Config;
use dbsize::DBSize;
use del::Del;
use exists::Exists;
use get::Get;
use ping::Ping;
use quit::Quit;
use select::Select;
use set::Set;

#[derive(Debug, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Command {
    DBSize(DBSize),
    Del(Del),
    Exists(Exists),
    Get(Get),
    Set(Set),

    Auth(Auth),
    Client(Client),
    Command(Command_),
    Config(Config),
    Ping(Ping),
    Quit(Quit),
    Select(Select),
}

impl Command {
    /// Lowercase command name, for logs.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Commands a password protected server answers before the client authenticated.
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Command::Auth(_) | Command::Quit(_))
    }
}

impl Executable for Command {
    fn exec(self, store: &Store, session: &mut Session) -> Frame {
        match self {
            Command::Auth(cmd) => cmd.exec(store, session),
            Command::Client(cmd) => cmd.exec(store, session),
            Command::Command(cmd) => cmd.exec(store, session),
            Command::Config(cmd) => cmd.exec(store, session),
            Command::DBSize(cmd) => cmd.exec(store, session),
            Command::Del(cmd) => cmd.exec(store, session),
            Command::Exists(cmd) => cmd.exec(store, session),
            Command::Get(cmd) => cmd.exec(store, session),
            Command::Ping(cmd) => cmd.exec(store, session),
            Command::Quit(cmd) => cmd.exec(store, session),
            Command::Select(cmd) => cmd.exec(store, session),
            Command::Set(cmd) => cmd.exec(store, session),
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = CommandParserError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the Redis server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandParserError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame,
                })
            }
        };

        let mut parts = frames.into_iter();
        let command_name = parse_command_name(parts.next())?;

        let name = command_name.to_lowercase();
        let parser = &mut CommandParser {
            command: name.clone(),
            parts,
        };

        let command = match &name[..] {
            "auth" => Auth::try_from(&mut *parser).map(Command::Auth),
            "client" => Client::try_from(&mut *parser).map(Command::Client),
            "command" => Command_::try_from(&mut *parser).map(Command::Command),
            "config" => Config::try_from(&mut *parser).map(Command::Config),
            "dbsize" => DBSize::try_from(&mut *parser).map(Command::DBSize),
            "del" => Del::try_from(&mut *parser).map(Command::Del),
            "exists" => Exists::try_from(&mut *parser).map(Command::Exists),
            "get" => Get::try_from(&mut *parser).map(Command::Get),
            "ping" => Ping::try_from(&mut *parser).map(Command::Ping),
            "quit" => Quit::try_from(&mut *parser).map(Command::Quit),
            "select" => Select::try_from(&mut *parser).map(Command::Select),
            "set" => Set::try_from(&mut *parser).map(Command::Set),
            _ => {
                return Err(CommandParserError::UnknownCommand {
                    command: command_name,
                })
            }
        };

        // Running out of arguments means the client sent too few of them.
        command.map_err(|err| match err {
            CommandParserError::EndOfStream => {
                CommandParserError::WrongNumberOfArguments { command: name }
            }
            err => err,
        })
    }
}

fn parse_command_name(frame: Option<Frame>) -> Result<String, CommandParserError> {
    match frame {
        Some(Frame::Simple(s)) => Ok(s),
        // Names are matched against ASCII, anything else ends up as an unknown command.
        Some(Frame::Bulk(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Some(frame) => Err(CommandParserError::InvalidFrame {
            expected: "simple or bulk string".to_string(),
            actual: frame,
        }),
        None => Err(CommandParserError::EndOfStream),
    }
}

pub struct CommandParser {
    command: String,
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        let frame = self
            .parts
            .next()
            .ok_or(CommandParserError::EndOfStream)?;

        match frame {
            // Both `Simple` and `Bulk` representation may be strings. While errors are stored as
            // strings, they are considered separate types.
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    /// Next argument as a string, used for subcommands. Invalid UTF-8 is replaced, such names
    /// never match and only show up in error messages.
    fn next_string(&mut self) -> Result<String, CommandParserError> {
        let bytes = self.next_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn next_integer(&mut self) -> Result<i64, CommandParserError> {
        let bytes = self.next_bytes()?;

        str::from_utf8(&bytes[..])
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(CommandParserError::NotAnInteger)
    }

    /// Consumes every argument left.
    fn remaining(&mut self) -> Result<Vec<Bytes>, CommandParserError> {
        let mut args = Vec::with_capacity(self.parts.len());
        while self.has_remaining() {
            args.push(self.next_bytes()?);
        }
        Ok(args)
    }

    fn has_remaining(&self) -> bool {
        self.parts.len() > 0
    }

    /// Fails if the client sent more arguments than the command takes.
    fn finish(&mut self) -> Result<(), CommandParserError> {
        if self.has_remaining() {
            return Err(CommandParserError::WrongNumberOfArguments {
                command: self.command.clone(),
            });
        }
        Ok(())
    }
}

/// Errors answered to the client with an error reply. None of them closes the connection.
#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("ERR Protocol error: expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("ERR unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("ERR unknown subcommand '{subcommand}'. Try {} HELP.", .command.to_uppercase())]
    UnknownSubcommand { command: String, subcommand: String },
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongNumberOfArguments { command: String },
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
    #[error("ERR syntax error")]
    SyntaxError,
    #[error("ERR attempting to extract a value failed due to the frame being fully consumed")]
    EndOfStream,
}

impl From<CommandParserError> for Frame {
    fn from(err: CommandParserError) -> Self {
        Frame::Error(err.to_string())
    }
}
