use std::str::FromStr;
use std::time::Duration;

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::SmtpTransport;
use lettre::{Address, Transport};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::Email;
use crate::recipient::{emailsplit, RecipientList};
use crate::DEFAULT_PORT;

/// One-shot handoff of a rendered message to the relay: formatted
/// address strings in, full wire-format text in, nothing cached.
pub trait MailTransport {
    fn transmit(&mut self, from_addr: &str, to_addrs: &[String], message: &str) -> Result<()>;
}

/// [`MailTransport`] over a blocking SMTP connection.
pub struct SmtpRelay {
    transport: SmtpTransport,
}

impl SmtpRelay {
    pub fn new(transport: SmtpTransport) -> Self {
        SmtpRelay { transport }
    }
}

// The envelope wants bare addresses, so the display-name wrapping is
// stripped back off here.
fn bare_address(formatted: &str) -> Result<Address> {
    let (_, address) = emailsplit(formatted);
    Ok(Address::from_str(&address)?)
}

impl MailTransport for SmtpRelay {
    fn transmit(&mut self, from_addr: &str, to_addrs: &[String], message: &str) -> Result<()> {
        let from = bare_address(from_addr)?;
        let to = to_addrs
            .iter()
            .map(|each| bare_address(each))
            .collect::<Result<Vec<_>>>()?;
        let envelope = Envelope::new(Some(from), to)?;
        debug!("handing {} bytes to the relay", message.len());
        self.transport.send_raw(&envelope, message.as_bytes())?;
        Ok(())
    }
}

/// What one [`MailSession::send`] call actually did.
///
/// `specified_to_addrs` always records the email's own recipients, even
/// when dummy mode substituted the envelope.
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub from_addr: String,
    pub to_addrs: Vec<String>,
    pub specified_to_addrs: Vec<String>,
    pub transmitted: bool,
}

/// A sending session over one scoped relay connection, or over nothing
/// at all in build-only mode.
pub struct MailSession {
    transport: Option<Box<dyn MailTransport>>,
    dummy_send_only: bool,
    dummy_recipients: RecipientList,
    actually_send: bool,
}

impl MailSession {
    pub fn new(
        transport: Box<dyn MailTransport>,
        dummy_send_only: bool,
        dummy_recipients: RecipientList,
    ) -> Self {
        MailSession {
            transport: Some(transport),
            dummy_send_only,
            dummy_recipients,
            actually_send: true,
        }
    }

    /// A session that builds messages but never touches the network.
    pub fn offline(dummy_send_only: bool, dummy_recipients: RecipientList) -> Self {
        MailSession {
            transport: None,
            dummy_send_only,
            dummy_recipients,
            actually_send: false,
        }
    }

    /// Hand one message to the relay.
    ///
    /// With `dummy_send_only` the session's configured dummy recipients
    /// replace the email's real ones on the envelope. Without
    /// `actually_send` the message is still fully assembled but nothing
    /// is transmitted and no error can come from the transport.
    pub fn send(&mut self, email: &Email) -> Result<SendReceipt> {
        let specified_to_addrs = email.to_addresses();

        let to_addrs = if self.dummy_send_only {
            warn!(
                "dummy send only: suppressing real recipients [{}]",
                specified_to_addrs.join(", ")
            );
            self.dummy_recipients.formatted()
        } else {
            specified_to_addrs.clone()
        };

        let from_addr = email.source().formatted();
        // Assembled unconditionally; a dry run still exercises the full
        // message build.
        let message = email.formatted()?;

        let mut transmitted = false;
        if self.actually_send {
            if let Some(transport) = self.transport.as_mut() {
                transport.transmit(&from_addr, &to_addrs, &message)?;
                info!("message handed off for {} recipients", to_addrs.len());
                transmitted = true;
            }
        }

        Ok(SendReceipt {
            from_addr,
            to_addrs,
            specified_to_addrs,
            transmitted,
        })
    }
}

/// Connection settings for [`with_session`], shaped for embedding in a
/// caller's own configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// `host` or `host:port`; the port defaults to 587.
    pub server: String,
    #[serde(default)]
    pub credentials: Option<LoginCredentials>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub dummy_send_only: bool,
    /// Comma separated recipients substituted on every dummy send.
    #[serde(default)]
    pub dummy_recipients: Option<String>,
    #[serde(default = "default_actually_send")]
    pub actually_send: bool,
    /// Connect timeout; there is no per-send timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

fn default_actually_send() -> bool {
    true
}

fn default_timeout_secs() -> f64 {
    2.0
}

impl SessionOptions {
    pub fn new(server: impl Into<String>) -> Self {
        SessionOptions {
            server: server.into(),
            credentials: None,
            debug: false,
            dummy_send_only: false,
            dummy_recipients: None,
            actually_send: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn split_server(server: &str) -> Result<(String, u16)> {
    match server.split_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| Error::ServerAddress(server.to_string()))?;
            Ok((host.to_string(), port))
        }
        None => Ok((server.to_string(), DEFAULT_PORT)),
    }
}

/// Run `f` with a [`MailSession`], tearing the relay connection down on
/// every exit path.
///
/// With `actually_send` unset this yields an offline session and never
/// performs network I/O.
pub fn with_session<T>(
    options: &SessionOptions,
    f: impl FnOnce(&mut MailSession) -> Result<T>,
) -> Result<T> {
    let dummy_recipients = options
        .dummy_recipients
        .as_deref()
        .map(RecipientList::parse)
        .unwrap_or_default();

    if !options.actually_send {
        debug!("sending disabled, yielding an offline session");
        let mut session = MailSession::offline(options.dummy_send_only, dummy_recipients);
        return f(&mut session);
    }

    let (host, port) = split_server(&options.server)?;
    if options.debug {
        debug!(
            "connecting to {}:{} with timeout {}s",
            host, port, options.timeout_secs
        );
    }

    let mut builder = SmtpTransport::builder_dangerous(host.as_str())
        .port(port)
        .timeout(Some(Duration::from_secs_f64(options.timeout_secs)))
        // Upgrade to TLS when the server offers it, stay plain otherwise.
        .tls(Tls::Opportunistic(TlsParameters::new(host.clone())?));

    if let Some(creds) = &options.credentials {
        if options.debug {
            debug!("will authenticate as {}", creds.username);
        }
        builder = builder.credentials(Credentials::new(
            creds.username.clone(),
            creds.password.clone(),
        ));
    }

    let transport = builder.build();

    // Force the greeting handshake now so an unreachable relay fails
    // here rather than on the first send.
    transport.test_connection()?;
    info!("-- connected to {}:{}", host, port);

    let mut session = MailSession::new(
        Box::new(SmtpRelay::new(transport)),
        options.dummy_send_only,
        dummy_recipients,
    );

    // The transport and its pooled connections are dropped with the
    // session when this scope ends, failure or not.
    f(&mut session)
}
