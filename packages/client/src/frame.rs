//! Wire frames of the chat WebSocket.
//!
//! Every frame is `<TAG><JSON>`: a four letter upper-case type tag followed
//! (optionally after whitespace) by a JSON body. The tag decides which payload
//! shape the body has.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::DecodeError;

pub const LOGIN_TAG: &str = "LOGI";
pub const MESSAGE_TAG: &str = "MESG";
pub const SYSTEM_TAG: &str = "SYEV";

/// `SYEV` category of a user joining a channel.
pub const JOIN_CATEGORY: u32 = 10000;
/// `SYEV` category of a user leaving a channel.
pub const LEAVE_CATEGORY: u32 = 10001;

const TAG_LEN: usize = 4;

/// Login acknowledgement sent by the server right after the handshake.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LoginFrame {
    /// Session key for the chat REST API
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
}

/// Author of a chat message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sender {
    pub name: String,
    #[serde(default)]
    pub guest_id: Option<String>,
}

/// Channel object some frames embed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChannelInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub channel_url: Option<String>,
    #[serde(default)]
    pub custom_type: Option<String>,
    #[serde(default)]
    pub disappearing_message: Option<Value>,
}

/// `MESG`: a chat message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageFrame {
    pub channel_url: String,
    #[serde(default)]
    pub message: String,
    pub user: Sender,
    #[serde(default)]
    pub channel: Option<ChannelInfo>,
    #[serde(default)]
    pub msg_id: Option<u64>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Someone who joined a channel, as reported in a join event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JoinedUser {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub inviter: Option<Inviter>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Inviter {
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Sub-event of a `SYEV` frame. Fields the vendor omitted stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    Join { users: Vec<JoinedUser> },
    Leave { nickname: Option<String> },
    Other { data: Value },
}

/// `SYEV`: a system event in a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemFrame {
    pub category: u32,
    pub channel_url: String,
    pub channel: Option<ChannelInfo>,
    pub event: SystemEvent,
}

#[derive(Deserialize)]
struct RawSystemFrame {
    cat: u32,
    channel_url: String,
    #[serde(default)]
    channel: Option<ChannelInfo>,
    #[serde(default)]
    data: Value,
}

impl From<RawSystemFrame> for SystemFrame {
    fn from(raw: RawSystemFrame) -> Self {
        let event = match raw.cat {
            JOIN_CATEGORY => SystemEvent::Join {
                users: raw
                    .data
                    .get("users")
                    .and_then(Value::as_array)
                    .map(|users| {
                        users
                            .iter()
                            .map(|user| {
                                serde_json::from_value(user.clone()).unwrap_or_default()
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            LEAVE_CATEGORY => SystemEvent::Leave {
                nickname: raw
                    .data
                    .get("nickname")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            _ => SystemEvent::Other { data: raw.data },
        };

        Self {
            category: raw.cat,
            channel_url: raw.channel_url,
            channel: raw.channel,
            event,
        }
    }
}

/// Frame with a tag that gets no special treatment.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericFrame {
    pub tag: String,
    /// Parsed body, `Null` when the frame had none
    pub body: Value,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum EventFrame {
    Login(LoginFrame),
    Message(MessageFrame),
    System(SystemFrame),
    Other(GenericFrame),
}

impl EventFrame {
    pub fn tag(&self) -> &str {
        match self {
            EventFrame::Login(_) => LOGIN_TAG,
            EventFrame::Message(_) => MESSAGE_TAG,
            EventFrame::System(_) => SYSTEM_TAG,
            EventFrame::Other(frame) => &frame.tag,
        }
    }

    pub fn channel_url(&self) -> Option<&str> {
        match self {
            EventFrame::Message(frame) => Some(&frame.channel_url),
            EventFrame::System(frame) => Some(&frame.channel_url),
            EventFrame::Login(_) | EventFrame::Other(_) => None,
        }
    }

    pub fn channel(&self) -> Option<&ChannelInfo> {
        match self {
            EventFrame::Message(frame) => frame.channel.as_ref(),
            EventFrame::System(frame) => frame.channel.as_ref(),
            EventFrame::Login(_) | EventFrame::Other(_) => None,
        }
    }
}

/// Decode a raw WebSocket payload.
pub fn decode(raw: &[u8]) -> Result<EventFrame, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)?;
    decode_str(text)
}

/// Decode a text WebSocket payload.
pub fn decode_str(text: &str) -> Result<EventFrame, DecodeError> {
    let text = text.trim();
    let tag = text
        .get(..TAG_LEN)
        .filter(|tag| tag.bytes().all(|b| b.is_ascii_uppercase()))
        .ok_or_else(|| DecodeError::InvalidTag(text.chars().take(TAG_LEN).collect()))?;
    let body = text[TAG_LEN..].trim_start();

    match tag {
        LOGIN_TAG => parse_payload(tag, body).map(EventFrame::Login),
        MESSAGE_TAG => parse_payload(tag, body).map(EventFrame::Message),
        SYSTEM_TAG => parse_payload::<RawSystemFrame>(tag, body)
            .map(|raw| EventFrame::System(raw.into())),
        _ => {
            let body = if body.is_empty() {
                Value::Null
            } else {
                parse_json(tag, body)?
            };
            Ok(EventFrame::Other(GenericFrame {
                tag: tag.to_string(),
                body,
            }))
        }
    }
}

fn parse_json(tag: &str, body: &str) -> Result<Value, DecodeError> {
    serde_json::from_str(body).map_err(|source| DecodeError::Json {
        tag: tag.to_string(),
        source,
    })
}

fn parse_payload<T>(tag: &str, body: &str) -> Result<T, DecodeError>
where
    T: for<'de> Deserialize<'de>,
{
    if body.is_empty() {
        return Err(DecodeError::MissingBody {
            tag: tag.to_string(),
        });
    }

    let value = parse_json(tag, body)?;
    serde_json::from_value(value).map_err(|source| DecodeError::Payload {
        tag: tag.to_string(),
        source,
    })
}

/// A message the bot sends to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text { channel_url: String, text: String },
    /// Vendor sticker/reaction, sent as an empty message with a `snoomoji` payload
    Snoomoji {
        channel_url: String,
        snoomoji: String,
    },
}

impl OutboundMessage {
    pub fn text(channel_url: impl Into<String>, text: impl Into<String>) -> Self {
        OutboundMessage::Text {
            channel_url: channel_url.into(),
            text: text.into(),
        }
    }

    pub fn snoomoji(channel_url: impl Into<String>, snoomoji: impl Into<String>) -> Self {
        OutboundMessage::Snoomoji {
            channel_url: channel_url.into(),
            snoomoji: snoomoji.into(),
        }
    }

    pub fn channel_url(&self) -> &str {
        match self {
            OutboundMessage::Text { channel_url, .. }
            | OutboundMessage::Snoomoji { channel_url, .. } => channel_url,
        }
    }

    /// Encode as a `MESG` wire frame.
    pub fn encode(&self, req_id: u64) -> String {
        let (message, data) = match self {
            OutboundMessage::Text { text, .. } => (
                text.as_str(),
                json!({
                    "v1": {
                        "preview_collapsed": false,
                        "embed_data": {},
                        "hidePreview": false,
                        "highlights": [],
                        "message_body": text,
                    }
                }),
            ),
            OutboundMessage::Snoomoji { snoomoji, .. } => {
                ("", json!({ "v1": { "snoomoji": snoomoji } }))
            }
        };

        let body = json!({
            "channel_url": self.channel_url(),
            "message": message,
            // The vendor expects `data` as a JSON-encoded string.
            "data": data.to_string(),
            "mention_type": "users",
            "req_id": req_id.to_string(),
        });

        format!("{}{}\n", MESSAGE_TAG, body)
    }
}
