use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::session::Session;
use crate::store::Store;

/// Ask the server to close the connection once the reply has been sent.
///
/// Ref: <https://redis.io/docs/latest/commands/quit/>
#[derive(Debug, PartialEq)]
pub struct Quit;

impl Executable for Quit {
    fn exec(self, _store: &Store, session: &mut Session) -> Frame {
        session.close();
        Frame::Simple("OK".to_string())
    }
}

impl TryFrom<&mut CommandParser> for Quit {
    type Error = CommandParserError;

    fn try_from(_parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self)
    }
}
