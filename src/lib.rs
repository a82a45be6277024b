//! Compose multi-part email messages and hand them to an SMTP relay
//! through a scoped session.
//!
//! The flow is: open a session with [`with_session`], build one or more
//! [`Email`] values, and call [`MailSession::send`] for each. Sessions
//! support a dummy mode that substitutes a configured recipient list on
//! the envelope, and a build-only mode that never touches the network.

pub mod content;
pub mod error;
pub mod message;
pub mod recipient;
pub mod session;

#[cfg(test)]
mod tests;

pub use content::Content;
pub use error::{Error, Result};
pub use message::{Email, EmailBuilder};
pub use recipient::{emailsplit, formataddr, Recipient, RecipientList};
pub use session::{
    with_session, LoginCredentials, MailSession, MailTransport, SendReceipt, SessionOptions,
    SmtpRelay,
};

/// Submission port used when the server string carries no port of its
/// own.
pub const DEFAULT_PORT: u16 = 587;
