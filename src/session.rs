use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error as ThisError;

/// The only user the server knows about.
const DEFAULT_USER: &[u8] = b"default";

/// State of a single client connection that outlives the command being executed.
#[derive(Debug)]
pub struct Session {
    password: Option<Arc<str>>,
    authenticated: bool,
    name: Option<Bytes>,
    closing: bool,
}

#[derive(Debug, ThisError, PartialEq)]
pub enum AuthError {
    #[error("ERR AUTH <password> called without any password configured for the default user. Are you sure your configuration is correct?")]
    NoPasswordConfigured,
    #[error("WRONGPASS invalid username-password pair or user is disabled.")]
    WrongPass,
}

impl Session {
    /// Without a password every connection starts authenticated.
    pub fn new(password: Option<Arc<str>>) -> Session {
        Session {
            authenticated: password.is_none(),
            password,
            name: None,
            closing: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Checks the credentials sent with `AUTH`. A failed attempt leaves the session as it was.
    pub fn authenticate(
        &mut self,
        username: Option<&[u8]>,
        password: &[u8],
    ) -> Result<(), AuthError> {
        let expected = self
            .password
            .as_deref()
            .ok_or(AuthError::NoPasswordConfigured)?;

        if username.map_or(true, |username| username == DEFAULT_USER)
            && expected.as_bytes() == password
        {
            self.authenticated = true;
            Ok(())
        } else {
            Err(AuthError::WrongPass)
        }
    }

    pub fn name(&self) -> Option<&Bytes> {
        self.name.as_ref()
    }

    pub fn set_name(&mut self, name: Bytes) {
        self.name = Some(name);
    }

    /// Asks the connection handler to hang up once the current reply has been written.
    pub fn close(&mut self) {
        self.closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(None)
    }
}
