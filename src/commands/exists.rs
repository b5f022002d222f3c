use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::session::Session;
use crate::store::Store;

/// Returns how many of the specified keys exist. A key mentioned several times is counted as
/// many times.
///
/// Ref: <https://redis.io/docs/latest/commands/exists/>
#[derive(Debug, PartialEq)]
pub struct Exists {
    pub keys: Vec<Bytes>,
}

impl Executable for Exists {
    fn exec(self, store: &Store, _session: &mut Session) -> Frame {
        Frame::Integer(store.exists(&self.keys) as i64)
    }
}

impl TryFrom<&mut CommandParser> for Exists {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_bytes()?;

        let mut keys = vec![key];
        keys.extend(parser.remaining()?);

        Ok(Self { keys })
    }
}
