use std::cell::RefCell;
use std::rc::Rc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::Result;
use crate::message::Email;
use crate::recipient::RecipientList;
use crate::session::{with_session, MailSession, MailTransport, SessionOptions};

// Records every transmit call instead of talking to a relay.
struct RecordingTransport {
    calls: Rc<RefCell<Vec<(String, Vec<String>, String)>>>,
}

impl MailTransport for RecordingTransport {
    fn transmit(&mut self, from_addr: &str, to_addrs: &[String], message: &str) -> Result<()> {
        self.calls.borrow_mut().push((
            from_addr.to_string(),
            to_addrs.to_vec(),
            message.to_string(),
        ));
        Ok(())
    }
}

fn sample_email() -> Email {
    Email::builder()
        .source(("Captain Test", "test@example.com"))
        .subject("hi")
        .to([("Citizen A", "a@example.com"), ("Citizen B", "b@example.com")])
        .cc([("Citizen CC", "cc@example.com")])
        .bcc([("Citizen BCC", "bcc@example.com")])
        .text_body("hello")
        .html_body("A test <em>markdown</em> message.")
        .attachment("blah.csv", "abc\u{2026}")
        .attachment("x.binary", b"abc")
        .build()
        .unwrap()
}

#[test]
fn dummy_send_substitutes_the_configured_recipients() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut session = MailSession::new(
        Box::new(RecordingTransport {
            calls: Rc::clone(&calls),
        }),
        true,
        RecipientList::parse("Captain Dummy <developer@example.com>"),
    );

    let email = sample_email();
    let receipt = session.send(&email).unwrap();

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    let (from_addr, to_addrs, message) = &calls[0];
    assert_eq!(from_addr, "Captain Test <test@example.com>");
    assert_eq!(
        to_addrs,
        &["Captain Dummy <developer@example.com>".to_string()]
    );
    assert!(message.contains("Subject: hi"));
    assert!(message.contains("blah.csv"));
    assert!(message.contains("x.binary"));

    // The suppressed real recipients stay visible on the receipt.
    assert_eq!(
        receipt.specified_to_addrs,
        vec![
            "Citizen A <a@example.com>",
            "Citizen B <b@example.com>",
            "Citizen CC <cc@example.com>",
            "Citizen BCC <bcc@example.com>",
        ]
    );
    assert_eq!(
        receipt.to_addrs,
        vec!["Captain Dummy <developer@example.com>"]
    );
    assert!(receipt.transmitted);
}

#[test]
fn live_send_uses_the_email_recipients() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut session = MailSession::new(
        Box::new(RecordingTransport {
            calls: Rc::clone(&calls),
        }),
        false,
        RecipientList::new(),
    );

    session.send(&sample_email()).unwrap();

    let calls = calls.borrow();
    assert_eq!(calls[0].1.len(), 4);
    assert_eq!(calls[0].1[0], "Citizen A <a@example.com>");
}

#[test]
fn offline_session_builds_but_never_transmits() {
    let mut session = MailSession::offline(true, RecipientList::parse("dev@example.com"));
    let receipt = session.send(&sample_email()).unwrap();
    assert!(!receipt.transmitted);
    assert_eq!(receipt.to_addrs, vec!["dev@example.com"]);
}

#[test]
fn with_session_offline_never_touches_the_network() {
    let mut options = SessionOptions::new("smtp.example.com");
    options.dummy_send_only = true;
    options.dummy_recipients = Some("Captain Dummy <developer@example.com>".to_string());
    options.actually_send = false;

    let receipt = with_session(&options, |session| session.send(&sample_email())).unwrap();
    assert!(!receipt.transmitted);
    assert_eq!(
        receipt.to_addrs,
        vec!["Captain Dummy <developer@example.com>"]
    );
}

#[test]
fn json_export_omits_unset_fields_and_always_carries_attachments() {
    let email = Email::builder()
        .source(("A B", "a@example.com"))
        .subject("s")
        .to("b@example.com")
        .text_body("hello")
        .attachment("blah.csv", "abc\u{2026}")
        .build()
        .unwrap();

    let value = email.as_json_value().unwrap();
    assert_eq!(value["source"], "A B <a@example.com>");
    assert_eq!(value["to"], "b@example.com");
    assert_eq!(value["text_body"], "hello");
    assert!(value.get("html_body").is_none());
    assert!(value.get("reply_to").is_none());
    assert!(value.get("return_path").is_none());
    assert_eq!(
        value["attachments"]["blah.csv"],
        BASE64.encode("abc\u{2026}".as_bytes())
    );

    let bare = Email::builder().source("a@example.com").build().unwrap();
    let bare_value = bare.as_json_value().unwrap();
    assert!(bare_value.get("text_body").is_none());
    assert_eq!(bare_value["attachments"], serde_json::json!({}));
}

#[test]
fn json_text_is_stable_and_indented() {
    let email = sample_email();
    assert_eq!(email.to_json_text().unwrap(), email.to_json_text().unwrap());
    assert!(email.to_json_text().unwrap().starts_with("{\n"));
}
