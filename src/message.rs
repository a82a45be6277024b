use std::collections::BTreeMap;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use lettre::message::header::{self, Header, HeaderName, HeaderValue};
use lettre::message::{Attachment, Body, Mailbox, Message, MultiPart, SinglePart};
use lettre::Address;
use log::debug;
use serde::Serialize;

use crate::content::Content;
use crate::error::{Error, Result};
use crate::recipient::{Recipient, RecipientList};

// lettre ships no Return-Path header type, so carry one ourselves.
#[derive(Debug, Clone)]
struct ReturnPath(String);

impl Header for ReturnPath {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("Return-Path")
    }

    fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(ReturnPath(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// A composed message.
///
/// The transmittable representation is derived on demand from the current
/// field values, never cached.
#[derive(Debug, Clone)]
pub struct Email {
    source: Recipient,
    subject: String,
    to: RecipientList,
    cc: RecipientList,
    bcc: RecipientList,
    reply_to: Option<Recipient>,
    return_path: Option<Recipient>,
    text_body: Option<String>,
    html_body: Option<String>,
    attachments: Vec<(String, Content)>,
}

/// Builder for [`Email`]. Only the source address is required; a message
/// with neither text nor html body is permitted and yields an empty
/// multi-part body.
#[derive(Debug, Default)]
pub struct EmailBuilder {
    source: Option<Recipient>,
    subject: String,
    to: RecipientList,
    cc: RecipientList,
    bcc: RecipientList,
    reply_to: Option<Recipient>,
    return_path: Option<Recipient>,
    text_body: Option<String>,
    html_body: Option<String>,
    attachments: Vec<(String, Content)>,
}

impl EmailBuilder {
    pub fn source(mut self, source: impl Into<Recipient>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn to(mut self, to: impl Into<RecipientList>) -> Self {
        self.to = to.into();
        self
    }

    pub fn cc(mut self, cc: impl Into<RecipientList>) -> Self {
        self.cc = cc.into();
        self
    }

    pub fn bcc(mut self, bcc: impl Into<RecipientList>) -> Self {
        self.bcc = bcc.into();
        self
    }

    pub fn reply_to(mut self, reply_to: impl Into<Recipient>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn return_path(mut self, return_path: impl Into<Recipient>) -> Self {
        self.return_path = Some(return_path.into());
        self
    }

    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text_body = Some(text.into());
        self
    }

    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    /// Append an attachment. Attach order is the order of these calls.
    pub fn attachment(mut self, filename: impl Into<String>, content: impl Into<Content>) -> Self {
        self.attachments.push((filename.into(), content.into()));
        self
    }

    pub fn build(self) -> Result<Email> {
        let source = self
            .source
            .ok_or_else(|| Error::Build("source address required".to_string()))?;
        Ok(Email {
            source,
            subject: self.subject,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            return_path: self.return_path,
            text_body: self.text_body,
            html_body: self.html_body,
            attachments: self.attachments,
        })
    }
}

// Serialized shape of the export; field order here is the stable order of
// the rendered JSON.
#[derive(Debug, Serialize)]
struct EmailExport {
    source: String,
    subject: String,
    to: String,
    cc: String,
    bcc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    html_body: Option<String>,
    attachments: BTreeMap<String, String>,
}

impl Email {
    pub fn builder() -> EmailBuilder {
        EmailBuilder::default()
    }

    pub fn source(&self) -> &Recipient {
        &self.source
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn to(&self) -> &RecipientList {
        &self.to
    }

    pub fn cc(&self) -> &RecipientList {
        &self.cc
    }

    pub fn bcc(&self) -> &RecipientList {
        &self.bcc
    }

    pub fn reply_to(&self) -> Option<&Recipient> {
        self.reply_to.as_ref()
    }

    pub fn return_path(&self) -> Option<&Recipient> {
        self.return_path.as_ref()
    }

    pub fn text_body(&self) -> Option<&str> {
        self.text_body.as_deref()
    }

    pub fn html_body(&self) -> Option<&str> {
        self.html_body.as_deref()
    }

    pub fn attachments(&self) -> &[(String, Content)] {
        &self.attachments
    }

    /// All recipients: to, then cc, then bcc, each in its own order.
    pub fn recipients(&self) -> RecipientList {
        self.to.concat(&self.cc).concat(&self.bcc)
    }

    /// The formatted strings of [`Email::recipients`].
    pub fn to_addresses(&self) -> Vec<String> {
        self.recipients().formatted()
    }

    /// Assemble the transmittable multi-part message.
    pub fn message(&self) -> Result<Message> {
        let mut builder = Message::builder()
            .from(mailbox(&self.source)?)
            .subject(self.subject.clone());

        for each in self.to.iter() {
            builder = builder.to(mailbox(each)?);
        }
        for each in self.cc.iter() {
            builder = builder.cc(mailbox(each)?);
        }
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(mailbox(reply_to)?);
        }
        if let Some(return_path) = &self.return_path {
            builder = builder.header(ReturnPath(return_path.formatted()));
        }

        Ok(builder.multipart(self.body()?)?)
    }

    /// Full wire-format text of the assembled message.
    pub fn formatted(&self) -> Result<String> {
        Ok(String::from_utf8(self.message()?.formatted())?)
    }

    pub fn as_json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.export())?)
    }

    /// Pretty-printed export with stable field order.
    pub fn to_json_text(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    fn export(&self) -> EmailExport {
        EmailExport {
            source: self.source.formatted(),
            subject: self.subject.clone(),
            to: self.to.to_string(),
            cc: self.cc.to_string(),
            bcc: self.bcc.to_string(),
            reply_to: self.reply_to.as_ref().map(Recipient::formatted),
            return_path: self.return_path.as_ref().map(Recipient::formatted),
            text_body: self.text_body.clone(),
            html_body: self.html_body.clone(),
            attachments: self
                .attachments
                .iter()
                .map(|(filename, content)| (filename.clone(), BASE64.encode(content.as_bytes())))
                .collect(),
        }
    }

    fn body(&self) -> Result<MultiPart> {
        // Clients that prefer the richer part pick the last alternative,
        // so html goes after plain text.
        let mut alternative = MultiPart::alternative().build();
        if let Some(text) = &self.text_body {
            alternative = alternative.singlepart(SinglePart::plain(text.clone()));
        }
        if let Some(html) = &self.html_body {
            alternative = alternative.singlepart(SinglePart::html(html.clone()));
        }

        if self.attachments.is_empty() {
            return Ok(alternative);
        }

        let mut mixed = MultiPart::mixed().multipart(alternative);
        for (filename, content) in &self.attachments {
            let content_type = guessed_content_type(filename)?;
            let part =
                Attachment::new(filename.clone()).body(Body::new(content.clone().into_bytes()), content_type);
            mixed = mixed.singlepart(part);
        }
        Ok(mixed)
    }
}

fn mailbox(recipient: &Recipient) -> Result<Mailbox> {
    let address = Address::from_str(recipient.address())?;
    let name = if recipient.name().is_empty() {
        None
    } else {
        Some(recipient.name().to_string())
    };
    Ok(Mailbox::new(name, address))
}

// Guess from the filename extension; fall back to the generic
// bag-of-bits type when no guess exists.
fn guessed_content_type(filename: &str) -> Result<header::ContentType> {
    let guessed = mime_guess::from_path(filename).first();
    let ctype = match &guessed {
        Some(mime) => mime.essence_str(),
        None => {
            debug!("no content type guess for {}, treating as binary", filename);
            "application/octet-stream"
        }
    };
    header::ContentType::parse(ctype).map_err(|_| Error::ContentType(ctype.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Email {
        Email::builder()
            .source(("Captain Test", "test@example.com"))
            .subject("hi")
            .to([("Citizen A", "a@example.com"), ("Citizen B", "b@example.com")])
            .cc([("Citizen CC", "cc@example.com")])
            .bcc([("Citizen BCC", "bcc@example.com")])
            .text_body("hello")
            .build()
            .unwrap()
    }

    #[test]
    fn recipients_concatenate_to_cc_bcc_in_order() {
        assert_eq!(
            sample().to_addresses(),
            vec![
                "Citizen A <a@example.com>",
                "Citizen B <b@example.com>",
                "Citizen CC <cc@example.com>",
                "Citizen BCC <bcc@example.com>",
            ]
        );
    }

    #[test]
    fn missing_source_is_a_build_error() {
        assert!(Email::builder().subject("hi").build().is_err());
    }

    #[test]
    fn wire_format_carries_headers_and_attachment_types() {
        let email = Email::builder()
            .source(("Captain Test", "test@example.com"))
            .subject("hi")
            .to("a@example.com")
            .reply_to("Replies <replies@example.com>")
            .return_path("bounces@example.com")
            .text_body("hello")
            .html_body("<em>hello</em>")
            .attachment("blah.csv", "abc\u{2026}")
            .attachment("x.binary", b"abc")
            .build()
            .unwrap();

        let rendered = email.formatted().unwrap();
        assert!(rendered.contains("Subject: hi"));
        assert!(rendered.contains("Reply-To: "));
        assert!(rendered.contains("Return-Path: "));
        assert!(rendered.contains("blah.csv"));
        assert!(rendered.contains("x.binary"));
        assert!(rendered.contains("text/csv"));
        assert!(rendered.contains("application/octet-stream"));
        // html is the later alternative
        let text_at = rendered.find("text/plain").unwrap();
        let html_at = rendered.find("text/html").unwrap();
        assert!(text_at < html_at);
    }

    #[test]
    fn cc_header_only_present_when_cc_given() {
        let with_cc = sample().formatted().unwrap();
        assert!(with_cc.contains("Cc: "));

        let without_cc = Email::builder()
            .source("test@example.com")
            .to("a@example.com")
            .text_body("hello")
            .build()
            .unwrap()
            .formatted()
            .unwrap();
        assert!(!without_cc.contains("Cc: "));
    }
}
