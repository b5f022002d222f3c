use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::session::Session;
use crate::store::Store;

/// `COMMAND [subcommand ...]`, sent by interactive clients on connect to fetch command docs.
/// Replies with an empty list, clients fall back to their built-in tables.
///
/// Ref: <https://redis.io/docs/latest/commands/command/>
#[derive(Debug, PartialEq)]
pub struct Command {
    pub args: Vec<Bytes>,
}

impl Executable for Command {
    fn exec(self, _store: &Store, _session: &mut Session) -> Frame {
        Frame::Array(vec![])
    }
}

impl TryFrom<&mut CommandParser> for Command {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let args = parser.remaining()?;
        Ok(Self { args })
    }
}
