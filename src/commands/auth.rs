use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::session::Session;
use crate::store::Store;

/// Authenticates the current connection. The single argument form checks the password of the
/// `default` user, the two argument form also names the user.
///
/// Ref: <https://redis.io/docs/latest/commands/auth/>
#[derive(Debug, PartialEq)]
pub struct Auth {
    pub username: Option<Bytes>,
    pub password: Bytes,
}

impl Executable for Auth {
    fn exec(self, _store: &Store, session: &mut Session) -> Frame {
        match session.authenticate(self.username.as_deref(), &self.password) {
            Ok(()) => Frame::Simple("OK".to_string()),
            Err(err) => Frame::Error(err.to_string()),
        }
    }
}

impl TryFrom<&mut CommandParser> for Auth {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let first = parser.next_bytes()?;
        let second = match parser.next_bytes() {
            Ok(second) => Some(second),
            Err(CommandParserError::EndOfStream) => None,
            Err(err) => return Err(err),
        };
        parser.finish()?;

        let auth = match second {
            Some(password) => Self {
                username: Some(first),
                password,
            },
            None => Self {
                username: None,
                password: first,
            },
        };
        Ok(auth)
    }
}
