use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::session::Session;
use crate::store::Store;

/// Select the logical database having the specified zero-based numeric index. The server has a
/// single keyspace, so only database 0 exists.
///
/// Ref: <https://redis.io/docs/latest/commands/select>
#[derive(Debug, PartialEq)]
pub struct Select {
    pub index: i64,
}

impl Executable for Select {
    fn exec(self, _store: &Store, _session: &mut Session) -> Frame {
        if self.index == 0 {
            Frame::Simple("OK".to_string())
        } else {
            Frame::Error("ERR DB index is out of range".to_string())
        }
    }
}

impl TryFrom<&mut CommandParser> for Select {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let index = parser.next_integer()?;
        parser.finish()?;
        Ok(Self { index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use bytes::Bytes;

    fn select(index: &'static str) -> Result<Command, CommandParserError> {
        Command::try_from(Frame::Array(vec![
            Frame::Bulk(Bytes::from("SELECT")),
            Frame::Bulk(Bytes::from(index)),
        ]))
    }

    #[test]
    fn database_zero() {
        let result = select("0")
            .unwrap()
            .exec(&Store::new(), &mut Session::default());

        assert_eq!(result, Frame::Simple("OK".to_string()));
    }

    #[test]
    fn other_databases() {
        let result = select("3")
            .unwrap()
            .exec(&Store::new(), &mut Session::default());

        assert_eq!(
            result,
            Frame::Error("ERR DB index is out of range".to_string())
        );
    }

    #[test]
    fn not_an_integer() {
        assert_eq!(select("zero"), Err(CommandParserError::NotAnInteger));
    }
}
