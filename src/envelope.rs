//! Envelope parsing boundary (spec §1 Non-goals: "RFC 822 header
//! parsing" is out of scope for THE CORE; this is the trait seam the
//! core calls through, plus a small default implementation sufficient
//! to exercise `fetch_headers` end to end — spec.md's distillation
//! assumes a collaborator without specifying its shape).

use crate::header::Envelope;

/// Parses the RFC 822 header block streamed back by `TOP n 0` (or a
/// full `RETR` when TOP is unsupported) into an [`Envelope`].
///
/// A real deployment plugs in a full header parser; this trait exists
/// so the cache coordinator never has to know which one.
pub trait EnvelopeParser: Send + Sync {
    fn parse(&self, header_block: &[u8]) -> Envelope;
}

/// A minimal line-oriented parser: recognizes `Subject`, `From`, `To`,
/// `Date`, and `Message-ID`, unfolding continuation lines (leading
/// whitespace) per RFC 822 §3.1.1. Anything else is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderLineParser;

impl EnvelopeParser for HeaderLineParser {
    fn parse(&self, header_block: &[u8]) -> Envelope {
        let text = String::from_utf8_lossy(header_block);
        let mut env = Envelope::default();
        let mut current_field: Option<&'static str> = None;

        for raw_line in text.split("\r\n").flat_map(|l| l.split('\n')) {
            if raw_line.is_empty() {
                break; // header/body separator
            }
            if raw_line.starts_with(' ') || raw_line.starts_with('\t') {
                if let Some(field) = current_field {
                    append_continuation(&mut env, field, raw_line.trim());
                }
                continue;
            }
            let Some((name, value)) = raw_line.split_once(':') else {
                current_field = None;
                continue;
            };
            let value = value.trim().to_string();
            current_field = match name.to_ascii_lowercase().as_str() {
                "subject" => {
                    env.subject = Some(value);
                    Some("subject")
                }
                "from" => {
                    env.from = Some(value);
                    Some("from")
                }
                "to" => {
                    env.to = Some(value);
                    Some("to")
                }
                "date" => {
                    env.date = Some(value);
                    Some("date")
                }
                "message-id" => {
                    env.message_id = Some(value);
                    Some("message-id")
                }
                _ => None,
            };
        }

        env
    }
}

fn append_continuation(env: &mut Envelope, field: &str, cont: &str) {
    let target = match field {
        "subject" => &mut env.subject,
        "from" => &mut env.from,
        "to" => &mut env.to,
        "date" => &mut env.date,
        "message-id" => &mut env.message_id,
        _ => return,
    };
    if let Some(existing) = target {
        existing.push(' ');
        existing.push_str(cont);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_fields() {
        let raw = b"Subject: hello\r\nFrom: a@b.com\r\nTo: c@d.com\r\nDate: today\r\nMessage-ID: <1@x>\r\n\r\nbody";
        let env = HeaderLineParser.parse(raw);
        assert_eq!(env.subject.as_deref(), Some("hello"));
        assert_eq!(env.from.as_deref(), Some("a@b.com"));
        assert_eq!(env.message_id.as_deref(), Some("<1@x>"));
    }

    #[test]
    fn unfolds_continuation_lines() {
        let raw = b"Subject: hello\r\n world\r\n\r\nbody";
        let env = HeaderLineParser.parse(raw);
        assert_eq!(env.subject.as_deref(), Some("hello world"));
    }

    #[test]
    fn stops_at_blank_line() {
        let raw = b"Subject: hello\r\n\r\nSubject: forged-in-body\r\n";
        let env = HeaderLineParser.parse(raw);
        assert_eq!(env.subject.as_deref(), Some("hello"));
    }
}
