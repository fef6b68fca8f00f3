//! Property tests for the `sender,text` line convention.
//!
//! Verifies:
//! 1. Any valid sender and any single-line text survive encode → parse.
//! 2. Parsing never panics on arbitrary input.
//! 3. Parsing always splits on the first comma.

use proptest::prelude::*;
use relaychat_proto::line::{ChatLine, LineError, validate_sender};

/// Sender names as a client would accept them.
fn arb_sender() -> impl Strategy<Value = String> {
    "[^,\r\n]{1,32}".prop_filter("must survive trimming", |s| {
        validate_sender(s).as_deref() == Ok(s.as_str())
    })
}

/// Message text: any single line, commas allowed.
fn arb_text() -> impl Strategy<Value = String> {
    "[^\r\n]{0,256}"
}

proptest! {
    #[test]
    fn encoded_lines_parse_back(sender in arb_sender(), text in arb_text()) {
        let line = ChatLine::new(sender, text);
        let parsed = ChatLine::parse(&line.to_wire()).unwrap();
        prop_assert_eq!(parsed, line);
    }

    #[test]
    fn parse_never_panics(raw in ".*") {
        let _ = ChatLine::parse(&raw);
    }

    #[test]
    fn split_is_at_first_comma(raw in "[^\r\n]*") {
        match raw.find(',') {
            Some(idx) => {
                let line = ChatLine::parse(&raw).unwrap();
                prop_assert_eq!(&line.sender, &raw[..idx]);
                prop_assert_eq!(&line.text, &raw[idx + 1..]);
                prop_assert!(!line.sender.contains(','));
            }
            None => prop_assert_eq!(ChatLine::parse(&raw), Err(LineError::MissingDelimiter)),
        }
    }
}
