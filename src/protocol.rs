use serde::{Deserialize, Serialize};

/// Status string carried by every acknowledgement we send.
pub const ACK_RECEIVED: &str = "received";

/// Datagrams on the discovery channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Announcement {
    Discover { name: String, port: u16 },
    Goodbye { name: String, port: u16 },
}

impl Announcement {
    pub fn name(&self) -> &str {
        match self {
            Announcement::Discover { name, .. } | Announcement::Goodbye { name, .. } => name,
        }
    }

    /// The sender's message-exchange port.
    pub fn port(&self) -> u16 {
        match self {
            Announcement::Discover { port, .. } | Announcement::Goodbye { port, .. } => *port,
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Records on a message-exchange connection, one JSON object per line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Message {
        name: String,
        port: u16,
        text: String,
    },
    Ack {
        #[serde(default = "default_ack_status")]
        status: String,
    },
}

fn default_ack_status() -> String {
    ACK_RECEIVED.to_string()
}

impl Frame {
    pub fn ack() -> Self {
        Frame::Ack {
            status: default_ack_status(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Message { .. } => "message",
            Frame::Ack { .. } => "ack",
        }
    }

    /// Encode as a single line (no trailing newline; the codec adds it).
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcement_wire_format() {
        let msg = Announcement::Discover {
            name: "alice".into(),
            port: 5001,
        };
        let json: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "discover", "name": "alice", "port": 5001})
        );
    }

    #[test]
    fn decodes_reference_goodbye() {
        let msg = Announcement::decode(br#"{"type":"goodbye","name":"bob","port":5002}"#).unwrap();
        assert_eq!(msg.name(), "bob");
        assert_eq!(msg.port(), 5002);
        assert!(matches!(msg, Announcement::Goodbye { .. }));
    }

    #[test]
    fn rejects_malformed_announcements() {
        assert!(Announcement::decode(b"not json").is_err());
        assert!(Announcement::decode(br#"{"type":"discover","name":"x"}"#).is_err());
        assert!(Announcement::decode(br#"{"type":"hello","name":"x","port":1}"#).is_err());
        assert!(Announcement::decode(br#"{"type":"discover","name":"x","port":70000}"#).is_err());
    }

    #[test]
    fn ack_without_status_is_accepted() {
        let frame = Frame::decode(r#"{"type":"ack"}"#).unwrap();
        assert_eq!(frame, Frame::ack());
    }

    #[test]
    fn message_frame_is_single_line() {
        let frame = Frame::Message {
            name: "alice".into(),
            port: 5001,
            text: "line one\nline two".into(),
        };
        let line = frame.encode().unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(Frame::decode(&line).unwrap(), frame);
    }

    #[test]
    fn discovery_records_are_not_frames() {
        assert!(Frame::decode(r#"{"type":"discover","name":"x","port":1}"#).is_err());
    }
}
