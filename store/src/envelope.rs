/*!
The envelope model and its on-disk format.

An envelope is written as newline-delimited parts:

```text
{"event_id":"9ec79c33ec9942ab8353589fcb2e04dc"}
{"type":"session","length":42}
{"sid":"f9c8...","init":true,"status":"ok"}
{"type":"attachment","length":5,"filename":"a.txt"}
hello
```

The first line is the envelope header. Each item is a header line carrying at least its `type` and the `length` of its payload, followed by exactly that many payload bytes and a newline. Payloads may contain arbitrary bytes, including newlines. If an item header has no `length` then its payload runs to the next newline.
*/

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/**
The header line of an envelope.

Fields that aren't recognized are preserved through [`EnvelopeHeader::other`].
*/
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/**
The header line of an item within an envelope.

The payload length isn't stored here; it's computed from the payload whenever the envelope is written.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct ItemHeader {
    pub ty: String,
    pub other: Map<String, Value>,
}

#[derive(Serialize)]
struct WriteItemHeader<'a> {
    #[serde(rename = "type")]
    ty: &'a str,
    length: usize,
    #[serde(flatten)]
    other: &'a Map<String, Value>,
}

#[derive(Deserialize)]
struct ReadItemHeader {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    length: Option<usize>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

/**
A typed item within an envelope.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeItem {
    pub header: ItemHeader,
    pub payload: Vec<u8>,
}

impl EnvelopeItem {
    pub fn new(ty: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        EnvelopeItem {
            header: ItemHeader {
                ty: ty.into(),
                other: Map::new(),
            },
            payload: payload.into(),
        }
    }

    /**
    Create a `session` item.
    */
    pub fn session(session: &Session) -> Result<Self, Error> {
        Ok(EnvelopeItem::new(
            ITEM_TYPE_SESSION,
            serde_json::to_vec(session).map_err(Error::parse)?,
        ))
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.header.other.insert(key.into(), value.into());
        self
    }

    pub fn ty(&self) -> &str {
        &self.header.ty
    }

    /**
    The rate-limit category this item counts against.
    */
    pub fn data_category(&self) -> DataCategory {
        DataCategory::from_item_type(&self.header.ty)
    }

    /**
    Try read the payload of a `session` item.

    This method returns `None` if the item isn't a session, or if its payload isn't a valid session.
    */
    pub fn as_session(&self) -> Option<Session> {
        if self.header.ty != ITEM_TYPE_SESSION {
            return None;
        }

        serde_json::from_slice(&self.payload).ok()
    }
}

pub const ITEM_TYPE_SESSION: &str = "session";

/**
The parts of a session update needed to re-home it.

Everything else in the payload is preserved through [`Session::other`].
*/
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub sid: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub init: bool,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl Session {
    pub fn new(sid: impl Into<String>) -> Self {
        Session {
            sid: sid.into(),
            init: false,
            other: Map::new(),
        }
    }

    pub fn with_init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }
}

/**
A bundle of items persisted and evicted as a unit.
*/
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub items: Vec<EnvelopeItem>,
}

/**
The result of leniently parsing an [`Envelope`].
*/
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEnvelope {
    pub envelope: Envelope,
    /**
    Whether parsing stopped early on a corrupt item.

    If this is `true` then [`ParsedEnvelope::envelope`] contains only the items before the corrupt one.
    */
    pub truncated: bool,
}

impl Envelope {
    pub fn new() -> Self {
        Envelope::default()
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.header.event_id = Some(event_id.into());
        self
    }

    pub fn with_item(mut self, item: EnvelopeItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn push(&mut self, item: EnvelopeItem) {
        self.items.push(item);
    }

    /**
    Write the envelope in its on-disk format.
    */
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();

        serde_json::to_writer(&mut buf, &self.header).map_err(Error::parse)?;
        buf.push(b'\n');

        for item in &self.items {
            serde_json::to_writer(
                &mut buf,
                &WriteItemHeader {
                    ty: &item.header.ty,
                    length: item.payload.len(),
                    other: &item.header.other,
                },
            )
            .map_err(Error::parse)?;
            buf.push(b'\n');

            buf.extend_from_slice(&item.payload);
            buf.push(b'\n');
        }

        Ok(buf)
    }

    /**
    Parse an envelope from its on-disk format.

    Parsing only fails if the envelope header is unreadable. A corrupt item ends parsing, returning the items read so far.
    */
    pub fn parse(bytes: &[u8]) -> Result<ParsedEnvelope, Error> {
        let (header, mut rest) = split_line(bytes);

        let header: EnvelopeHeader = serde_json::from_slice(header).map_err(Error::parse)?;

        let mut items = Vec::new();
        let mut truncated = false;

        while !rest.iter().all(|b| b.is_ascii_whitespace()) {
            let (item_header, after_header) = split_line(rest);

            let Ok(item_header) = serde_json::from_slice::<ReadItemHeader>(item_header) else {
                truncated = true;
                break;
            };

            let (payload, after_payload) = match item_header.length {
                Some(length) => {
                    if after_header.len() < length {
                        truncated = true;
                        break;
                    }

                    let (payload, after_payload) = after_header.split_at(length);

                    (
                        payload,
                        after_payload.strip_prefix(b"\n").unwrap_or(after_payload),
                    )
                }
                None => split_line(after_header),
            };

            items.push(EnvelopeItem {
                header: ItemHeader {
                    ty: item_header.ty,
                    other: item_header.other,
                },
                payload: payload.to_vec(),
            });

            rest = after_payload;
        }

        Ok(ParsedEnvelope {
            envelope: Envelope { header, items },
            truncated,
        })
    }
}

fn split_line(bytes: &[u8]) -> (&[u8], &[u8]) {
    match bytes.iter().position(|b| *b == b'\n') {
        Some(i) => (&bytes[..i], &bytes[i + 1..]),
        None => (bytes, &[]),
    }
}

/**
A rate-limit category.

The discriminants are stable and may be passed across an FFI or persisted.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataCategory {
    All = 0,
    Default = 1,
    Error = 2,
    Session = 3,
    Transaction = 4,
    Attachment = 5,
    UserFeedback = 6,
    Profile = 7,
    MetricBucket = 8,
    Replay = 9,
    ProfileChunk = 10,
    Span = 11,
    LogItem = 12,
    TraceMetric = 13,
    Unknown = 14,
}

impl DataCategory {
    /**
    Get the category for an envelope item type.

    Item types without a category of their own count against [`DataCategory::Default`].
    */
    pub fn from_item_type(ty: &str) -> Self {
        match ty {
            "event" => DataCategory::Error,
            "session" | "sessions" => DataCategory::Session,
            "transaction" => DataCategory::Transaction,
            "attachment" => DataCategory::Attachment,
            "user_report" | "feedback" => DataCategory::UserFeedback,
            "profile" => DataCategory::Profile,
            "statsd" | "metric_meta" => DataCategory::MetricBucket,
            "replay_video" | "replay_event" | "replay_recording" => DataCategory::Replay,
            "profile_chunk" => DataCategory::ProfileChunk,
            "span" => DataCategory::Span,
            "log" => DataCategory::LogItem,
            "trace_metric" => DataCategory::TraceMetric,
            _ => DataCategory::Default,
        }
    }

    /**
    Get the category with the given name, as it appears in rate-limit headers.
    */
    pub fn from_name(name: &str) -> Self {
        match name {
            "" => DataCategory::All,
            "default" => DataCategory::Default,
            "error" => DataCategory::Error,
            "session" => DataCategory::Session,
            "transaction" => DataCategory::Transaction,
            "attachment" => DataCategory::Attachment,
            "user_report" => DataCategory::UserFeedback,
            "profile" => DataCategory::Profile,
            "metric_bucket" => DataCategory::MetricBucket,
            "replay" => DataCategory::Replay,
            "profile_chunk" => DataCategory::ProfileChunk,
            "span" => DataCategory::Span,
            "log_item" => DataCategory::LogItem,
            "trace_metric" => DataCategory::TraceMetric,
            _ => DataCategory::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::All => "",
            DataCategory::Default => "default",
            DataCategory::Error => "error",
            DataCategory::Session => "session",
            DataCategory::Transaction => "transaction",
            DataCategory::Attachment => "attachment",
            DataCategory::UserFeedback => "user_report",
            DataCategory::Profile => "profile",
            DataCategory::MetricBucket => "metric_bucket",
            DataCategory::Replay => "replay",
            DataCategory::ProfileChunk => "profile_chunk",
            DataCategory::Span => "span",
            DataCategory::LogItem => "log_item",
            DataCategory::TraceMetric => "trace_metric",
            DataCategory::Unknown => "unknown",
        }
    }
}

impl From<DataCategory> for u8 {
    fn from(category: DataCategory) -> u8 {
        category as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ErrorKind;

    fn envelope() -> Envelope {
        Envelope::new()
            .with_event_id("9ec79c33ec9942ab8353589fcb2e04dc")
            .with_item(EnvelopeItem::session(&Session::new("a").with_init(true)).unwrap())
            .with_item(
                EnvelopeItem::new("attachment", b"line 1\nline 2".to_vec())
                    .with_header("filename", "a.txt"),
            )
            .with_item(EnvelopeItem::new("event", b"{}".to_vec()))
    }

    #[test]
    fn write_format() {
        let bytes = Envelope::new()
            .with_item(EnvelopeItem::new("event", b"{}".to_vec()))
            .to_bytes()
            .unwrap();

        assert_eq!(
            "{}\n{\"type\":\"event\",\"length\":2}\n{}\n",
            String::from_utf8(bytes).unwrap()
        );
    }

    #[test]
    fn parse_written() {
        let envelope = envelope();

        let parsed = Envelope::parse(&envelope.to_bytes().unwrap()).unwrap();

        assert!(!parsed.truncated);
        assert_eq!(envelope, parsed.envelope);
        assert_eq!(b"line 1\nline 2", &*parsed.envelope.items[1].payload);
    }

    #[test]
    fn parse_without_length() {
        let parsed =
            Envelope::parse(b"{}\n{\"type\":\"event\"}\n{\"a\":1}\n{\"type\":\"log\",\"length\":2}\n{}")
                .unwrap();

        assert!(!parsed.truncated);
        assert_eq!(2, parsed.envelope.items.len());
        assert_eq!(b"{\"a\":1}", &*parsed.envelope.items[0].payload);
        assert_eq!("log", parsed.envelope.items[1].ty());
    }

    #[test]
    fn parse_truncated_payload() {
        let mut bytes = envelope().to_bytes().unwrap();
        bytes.truncate(bytes.len() - 2);

        let parsed = Envelope::parse(&bytes).unwrap();

        assert!(parsed.truncated);
        assert_eq!(2, parsed.envelope.items.len());
    }

    #[test]
    fn parse_corrupt_item_header() {
        let parsed = Envelope::parse(
            b"{}\n{\"type\":\"event\",\"length\":2}\n{}\nnot json\n{\"type\":\"event\",\"length\":2}\n{}\n",
        )
        .unwrap();

        assert!(parsed.truncated);
        assert_eq!(1, parsed.envelope.items.len());
    }

    #[test]
    fn parse_corrupt_header() {
        let err = Envelope::parse(b"\x00\x01\x02").unwrap_err();

        assert_eq!(ErrorKind::Parse, err.kind());
    }

    #[test]
    fn session_preserves_unknown_fields() {
        let item = EnvelopeItem::new(
            "session",
            b"{\"sid\":\"a\",\"status\":\"ok\",\"errors\":1}".to_vec(),
        );

        let session = item.as_session().unwrap();

        assert_eq!("a", session.sid);
        assert!(!session.init);
        assert_eq!(Some(&Value::from("ok")), session.other.get("status"));

        let rewritten = EnvelopeItem::session(&session.with_init(true)).unwrap();
        let reparsed: Value = serde_json::from_slice(&rewritten.payload).unwrap();

        assert_eq!(Value::from(true), reparsed["init"]);
        assert_eq!(Value::from(1), reparsed["errors"]);
    }

    #[test]
    fn as_session_requires_session_type() {
        assert!(EnvelopeItem::new("event", b"{\"sid\":\"a\"}".to_vec())
            .as_session()
            .is_none());
        assert!(EnvelopeItem::new("session", b"garbage".to_vec())
            .as_session()
            .is_none());
    }

    #[test]
    fn data_categories() {
        for (ty, category, code) in [
            ("event", DataCategory::Error, 2),
            ("session", DataCategory::Session, 3),
            ("transaction", DataCategory::Transaction, 4),
            ("attachment", DataCategory::Attachment, 5),
            ("profile", DataCategory::Profile, 7),
            ("replay_video", DataCategory::Replay, 9),
            ("span", DataCategory::Span, 11),
            ("log", DataCategory::LogItem, 12),
            ("trace_metric", DataCategory::TraceMetric, 13),
            ("client_report", DataCategory::Default, 1),
        ] {
            assert_eq!(category, DataCategory::from_item_type(ty), "{ty}");
            assert_eq!(code, u8::from(category));
            assert_eq!(category, DataCategory::from_name(category.as_str()));
        }

        assert_eq!(DataCategory::Unknown, DataCategory::from_name("nope"));
    }
}
