//! JSON wire protocol.
//!
//! Every WebSocket text frame carries one envelope:
//! ```text
//! { "event": "<event name>", "data": "<JSON-encoded payload string>" }
//! ```
//!
//! Inbound events are named by kind (`add item`, `remove item`, `subscribe`,
//! `unsubscribe`). Outbound list updates use the list id itself as the event
//! name, with `data` holding `{name?, items}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Item, ListDocument};

pub const EVENT_ADD_ITEM: &str = "add item";
pub const EVENT_REMOVE_ITEM: &str = "remove item";
pub const EVENT_SUBSCRIBE: &str = "subscribe";
pub const EVENT_UNSUBSCRIBE: &str = "unsubscribe";

/// Outer frame shared by both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    /// JSON document, encoded as a string
    pub data: String,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// Payload of `add item`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    /// Content text
    pub item: String,
    /// List id
    pub id: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, rename = "textColor")]
    pub text_color: String,
}

impl AddItem {
    pub fn new(id: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            id: id.into(),
            color: String::new(),
            text_color: String::new(),
        }
    }

    pub fn with_colors(mut self, color: impl Into<String>, text_color: impl Into<String>) -> Self {
        self.color = color.into();
        self.text_color = text_color.into();
        self
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        require("id", &self.id)?;
        require("item", &self.item)
    }
}

/// Payload of `remove item`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub item: String,
    pub id: String,
}

impl RemoveItem {
    pub fn new(id: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            id: id.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        require("id", &self.id)?;
        require("item", &self.item)
    }
}

/// Payload of `subscribe` / `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
}

/// A decoded, validated inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Add(AddItem),
    Remove(RemoveItem),
    Subscribe(String),
    Unsubscribe(String),
}

impl Request {
    /// Decode a text frame into a request.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope = Envelope::decode(text)?;
        Self::from_envelope(&envelope)
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        match envelope.event.as_str() {
            EVENT_ADD_ITEM => {
                let req: AddItem = parse_payload(&envelope.data)?;
                req.validate()?;
                Ok(Self::Add(req))
            }
            EVENT_REMOVE_ITEM => {
                let req: RemoveItem = parse_payload(&envelope.data)?;
                req.validate()?;
                Ok(Self::Remove(req))
            }
            EVENT_SUBSCRIBE | EVENT_UNSUBSCRIBE => {
                let sub: Subscription = parse_payload(&envelope.data)?;
                require("id", &sub.id)?;
                if envelope.event == EVENT_SUBSCRIBE {
                    Ok(Self::Subscribe(sub.id))
                } else {
                    Ok(Self::Unsubscribe(sub.id))
                }
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Encode into a text frame (client side).
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let (event, data) = match self {
            Self::Add(req) => (EVENT_ADD_ITEM, to_payload(req)?),
            Self::Remove(req) => (EVENT_REMOVE_ITEM, to_payload(req)?),
            Self::Subscribe(id) => (EVENT_SUBSCRIBE, to_payload(&Subscription { id: id.clone() })?),
            Self::Unsubscribe(id) => {
                (EVENT_UNSUBSCRIBE, to_payload(&Subscription { id: id.clone() })?)
            }
        };
        Envelope::new(event, data).encode()
    }

    /// List this request targets.
    pub fn list_id(&self) -> &str {
        match self {
            Self::Add(req) => &req.id,
            Self::Remove(req) => &req.id,
            Self::Subscribe(id) | Self::Unsubscribe(id) => id,
        }
    }
}

/// Outbound list state. `name` is left out entirely when the list has none.
#[derive(Debug, Serialize)]
pub struct ListState<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    pub items: Vec<ItemState<'a>>,
}

/// Outbound view of an [`Item`]. Colors the client never sent are omitted.
#[derive(Debug, Serialize)]
pub struct ItemState<'a> {
    pub item: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    pub color: &'a str,
    #[serde(rename = "textColor", skip_serializing_if = "is_blank")]
    pub text_color: &'a str,
    pub created: i64,
}

fn is_blank(value: &&str) -> bool {
    value.is_empty()
}

impl<'a> From<&'a Item> for ItemState<'a> {
    fn from(item: &'a Item) -> Self {
        Self {
            item: &item.item,
            color: &item.color,
            text_color: &item.text_color,
            created: item.created,
        }
    }
}

impl<'a> From<&'a ListDocument> for ListState<'a> {
    fn from(doc: &'a ListDocument) -> Self {
        Self {
            name: doc.name.as_deref(),
            items: doc.items.iter().map(ItemState::from).collect(),
        }
    }
}

/// Build the text frame announcing `doc` on topic `list_id`.
pub fn encode_update(list_id: &str, doc: &ListDocument) -> Result<String, ProtocolError> {
    let data = to_payload(&ListState::from(doc))?;
    Envelope::new(list_id, data).encode()
}

/// Parse the `data` of an outbound update (client side).
pub fn decode_update(data: &str) -> Result<ListDocument, ProtocolError> {
    parse_payload(data)
}

fn parse_payload<T: for<'de> Deserialize<'de>>(data: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(data).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

fn to_payload<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(value).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

fn require(field: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.is_empty() {
        Err(ProtocolError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Wire-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("missing or empty field '{0}'")]
    MissingField(&'static str),
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("connection closed")]
    ConnectionClosed,
}
