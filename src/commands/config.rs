use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::session::Session;
use crate::store::Store;

/// `CONFIG GET parameter [parameter ...]`. Benchmark tools and clients query the configuration
/// on connect; no parameter is exposed, so the reply is always an empty list.
///
/// Ref: <https://redis.io/docs/latest/commands/config-get/>
#[derive(Debug, PartialEq)]
pub struct Config {
    pub parameters: Vec<Bytes>,
}

impl Executable for Config {
    fn exec(self, _store: &Store, _session: &mut Session) -> Frame {
        Frame::Array(vec![])
    }
}

impl TryFrom<&mut CommandParser> for Config {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let subcommand = parser.next_string()?;

        match &subcommand.to_lowercase()[..] {
            "get" => {
                let parameter = parser.next_bytes()?;
                let mut parameters = vec![parameter];
                parameters.extend(parser.remaining()?);
                Ok(Self { parameters })
            }
            _ => Err(CommandParserError::UnknownSubcommand {
                command: "config".to_string(),
                subcommand,
            }),
        }
    }
}
