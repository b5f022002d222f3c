use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::session::Session;
use crate::store::Store;

/// The subset of `CLIENT` subcommands client libraries send while setting up a connection.
///
/// Ref: <https://redis.io/docs/latest/commands/client/>
#[derive(Debug, PartialEq)]
pub enum Client {
    SetName(Bytes),
    GetName,
    /// Library name and version reported by the client. Accepted and dropped.
    SetInfo { attribute: Bytes, value: Bytes },
}

impl Executable for Client {
    fn exec(self, _store: &Store, session: &mut Session) -> Frame {
        match self {
            Client::SetName(name) => {
                if name.iter().any(|byte| !(b'!'..=b'~').contains(byte)) {
                    return Frame::Error(
                        "ERR Client names cannot contain spaces, newlines or special characters."
                            .to_string(),
                    );
                }
                session.set_name(name);
                Frame::Simple("OK".to_string())
            }
            Client::GetName => session
                .name()
                .map_or(Frame::Null, |name| Frame::Bulk(name.clone())),
            Client::SetInfo { .. } => Frame::Simple("OK".to_string()),
        }
    }
}

impl TryFrom<&mut CommandParser> for Client {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let subcommand = parser.next_string()?;

        let client = match &subcommand.to_lowercase()[..] {
            "setname" => Client::SetName(parser.next_bytes()?),
            "getname" => Client::GetName,
            "setinfo" => Client::SetInfo {
                attribute: parser.next_bytes()?,
                value: parser.next_bytes()?,
            },
            _ => {
                return Err(CommandParserError::UnknownSubcommand {
                    command: "client".to_string(),
                    subcommand,
                })
            }
        };
        parser.finish()?;

        Ok(client)
    }
}
