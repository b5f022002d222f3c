use crate::frame::Frame;
use crate::session::Session;
use crate::store::Store;

/// A parsed command, ready to run against the keyspace on behalf of one connection.
///
/// Execution is synchronous: store locks are taken and released inside `exec`, never held across
/// an `.await` of the caller.
pub trait Executable {
    fn exec(self, store: &Store, session: &mut Session) -> Frame;
}
