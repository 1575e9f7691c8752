//! Single-byte-tagged frames exchanged over the task socket.
//!
//! Inbound (server to client) messages are binary:
//!   [tag: u8][output bytes]
//! where the tag is `'h'` for replayed history and `'a'` for live output.
//!
//! Outbound (client to server) messages are text:
//!   [tag: char][payload]
//! with `'p'` ping (no payload), `'i'` input (raw characters) and
//! `'r'` resize (JSON screen size).

use bytes::Bytes;
use thiserror::Error;

use crate::PtyScreenSize;

pub const HISTORY_TAG: u8 = b'h';
pub const ACTUAL_TAG: u8 = b'a';

pub const PING_TAG: char = 'p';
pub const INPUT_TAG: char = 'i';
pub const RESIZE_TAG: char = 'r';

/// Maximum output bytes the backend packs into one inbound frame.
pub const OUTPUT_CHUNK_BYTES: usize = 16 * 1024;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown frame tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("unknown client frame tag: {0:?}")]
    UnknownClientTag(char),

    #[error("invalid resize payload: {0}")]
    Resize(#[from] serde_json::Error),
}

/// Which output stream an inbound frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Output recorded before this viewer connected.
    History,
    /// Output produced after the viewer connected.
    Actual,
}

impl OutputKind {
    pub fn tag(self) -> u8 {
        match self {
            OutputKind::History => HISTORY_TAG,
            OutputKind::Actual => ACTUAL_TAG,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            HISTORY_TAG => Some(OutputKind::History),
            ACTUAL_TAG => Some(OutputKind::Actual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub kind: OutputKind,
    pub payload: Bytes,
}

/// Split a binary socket message into its tag and payload.
///
/// The payload is a zero-copy slice of `raw`.
pub fn decode(raw: impl Into<Bytes>) -> Result<InboundFrame, FrameError> {
    let raw = raw.into();
    let Some(&tag) = raw.first() else {
        return Err(FrameError::Empty);
    };
    let kind = OutputKind::from_tag(tag).ok_or(FrameError::UnknownTag(tag))?;
    Ok(InboundFrame {
        kind,
        payload: raw.slice(1..),
    })
}

/// Build one inbound frame. Used by servers and test fixtures.
pub fn encode_output(kind: OutputKind, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + payload.len());
    frame.push(kind.tag());
    frame.extend_from_slice(payload);
    frame
}

/// Split `payload` into frames of at most [`OUTPUT_CHUNK_BYTES`] output bytes.
/// An empty payload yields no frames.
pub fn encode_output_chunks(kind: OutputKind, payload: &[u8]) -> impl Iterator<Item = Vec<u8>> + '_ {
    payload
        .chunks(OUTPUT_CHUNK_BYTES)
        .map(move |chunk| encode_output(kind, chunk))
}

pub fn encode_ping() -> String {
    PING_TAG.to_string()
}

pub fn encode_input(chars: &str) -> String {
    let mut frame = String::with_capacity(1 + chars.len());
    frame.push(INPUT_TAG);
    frame.push_str(chars);
    frame
}

pub fn encode_resize(size: &PtyScreenSize) -> Result<String, FrameError> {
    let json = serde_json::to_string(size)?;
    let mut frame = String::with_capacity(1 + json.len());
    frame.push(RESIZE_TAG);
    frame.push_str(&json);
    Ok(frame)
}

/// A decoded outbound (client to server) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Ping,
    Input(String),
    Resize(PtyScreenSize),
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String, FrameError> {
        match self {
            ClientFrame::Ping => Ok(encode_ping()),
            ClientFrame::Input(chars) => Ok(encode_input(chars)),
            ClientFrame::Resize(size) => encode_resize(size),
        }
    }

    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let mut chars = text.chars();
        let Some(tag) = chars.next() else {
            return Err(FrameError::Empty);
        };
        let rest = chars.as_str();
        match tag {
            PING_TAG => Ok(ClientFrame::Ping),
            INPUT_TAG => Ok(ClientFrame::Input(rest.to_string())),
            RESIZE_TAG => Ok(ClientFrame::Resize(serde_json::from_str(rest)?)),
            other => Err(FrameError::UnknownClientTag(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_splits_tag_and_payload() {
        let frame = decode(b"hhello".to_vec()).unwrap();
        assert_eq!(frame.kind, OutputKind::History);
        assert_eq!(&frame.payload[..], b"hello");

        let frame = decode(b"a\x1b[31mred".to_vec()).unwrap();
        assert_eq!(frame.kind, OutputKind::Actual);
        assert_eq!(&frame.payload[..], b"\x1b[31mred");
    }

    #[test]
    fn decode_tag_only_gives_empty_payload() {
        let frame = decode(vec![ACTUAL_TAG]).unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn decode_rejects_empty_and_unknown() {
        assert!(matches!(decode(Vec::new()), Err(FrameError::Empty)));
        assert!(matches!(
            decode(b"zdata".to_vec()),
            Err(FrameError::UnknownTag(b'z'))
        ));
    }

    #[test]
    fn output_chunks_respect_limit_and_order() {
        let data: Vec<u8> = (0..OUTPUT_CHUNK_BYTES * 2 + 10)
            .map(|i| (i % 251) as u8)
            .collect();
        let frames: Vec<Vec<u8>> = encode_output_chunks(OutputKind::History, &data).collect();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f[0] == HISTORY_TAG));
        assert_eq!(frames[2].len(), 11);

        let joined: Vec<u8> = frames.iter().flat_map(|f| f[1..].to_vec()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn output_chunks_empty_payload_yields_nothing() {
        assert_eq!(encode_output_chunks(OutputKind::Actual, &[]).count(), 0);
    }

    #[test]
    fn ping_is_tag_only() {
        assert_eq!(encode_ping(), "p");
        assert_eq!(ClientFrame::parse(&encode_ping()).unwrap(), ClientFrame::Ping);
    }

    #[test]
    fn input_round_trips_through_parse() {
        for c in ["a", "\r", "\n", "\u{1b}", "é", "日", "\u{1b}[A"] {
            let encoded = encode_input(c);
            assert!(encoded.starts_with(INPUT_TAG));
            assert_eq!(
                ClientFrame::parse(&encoded).unwrap(),
                ClientFrame::Input(c.to_string())
            );
        }
    }

    #[test]
    fn resize_carries_json_size() {
        let size = PtyScreenSize {
            x: 800,
            y: 600,
            cols: 100,
            rows: 30,
        };
        let encoded = encode_resize(&size).unwrap();
        assert_eq!(encoded, r#"r{"x":800,"y":600,"cols":100,"rows":30}"#);
        assert_eq!(
            ClientFrame::parse(&encoded).unwrap(),
            ClientFrame::Resize(size)
        );
    }

    #[test]
    fn parse_rejects_bad_resize_json() {
        assert!(matches!(
            ClientFrame::parse("r{not json"),
            Err(FrameError::Resize(_))
        ));
    }

    #[test]
    fn parse_rejects_unknown_tag() {
        assert!(matches!(
            ClientFrame::parse("x"),
            Err(FrameError::UnknownClientTag('x'))
        ));
        assert!(matches!(ClientFrame::parse(""), Err(FrameError::Empty)));
    }

    #[test]
    fn parse_keeps_non_latin_tag() {
        for (text, tag) in [("€1", '€'), ("ÿ", 'ÿ'), ("日本", '日')] {
            match ClientFrame::parse(text) {
                Err(FrameError::UnknownClientTag(c)) => assert_eq!(c, tag),
                other => panic!("expected unknown tag for {text:?}, got {other:?}"),
            }
        }
        let err = ClientFrame::parse("€").unwrap_err();
        assert_eq!(err.to_string(), "unknown client frame tag: '€'");
    }
}
