use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Content type applied to messages when none is given.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// A message as carried by the broker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    /// The payload.
    pub body: Bytes,

    /// The routing subject. On the publish side this is the topic id.
    pub subject: Option<String>,

    /// MIME type of the payload.
    pub content_type: Option<String>,
}

impl Message {
    /// Creates a message with the given body and no subject or content type.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            subject: None,
            content_type: None,
        }
    }

    /// Creates a JSON message from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn json<T>(value: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize + ?Sized,
    {
        Ok(Self {
            body: Bytes::from(serde_json::to_vec(value)?),
            subject: None,
            content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
        })
    }

    /// Sets the routing subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The routing subject, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// The content type, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body rendered as text and cut at `max_chars`, for log lines.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        String::from_utf8_lossy(&self.body)
            .chars()
            .take(max_chars)
            .collect()
    }
}

impl From<serde_json::Value> for Message {
    fn from(value: serde_json::Value) -> Self {
        Self {
            body: Bytes::from(value.to_string()),
            subject: None,
            content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
        }
    }
}

impl From<Bytes> for Message {
    fn from(body: Bytes) -> Self {
        Self::new(body)
    }
}

impl From<String> for Message {
    fn from(body: String) -> Self {
        Self::new(body)
    }
}

impl From<&'static str> for Message {
    fn from(body: &'static str) -> Self {
        Self::new(body)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message(subject={}, body={})",
            self.subject().unwrap_or("-"),
            String::from_utf8_lossy(&self.body)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_from_value_is_json() {
        let message = Message::from(json!({"flight": "KL1234"}));

        assert_eq!(message.content_type(), Some(DEFAULT_CONTENT_TYPE));
        assert_eq!(
            message.decode_json::<serde_json::Value>().unwrap(),
            json!({"flight": "KL1234"})
        );
    }

    #[test]
    fn test_preview_cuts_on_chars() {
        let message = Message::new("αβγδε");

        assert_eq!(message.preview(3), "αβγ");
        assert_eq!(message.preview(100), "αβγδε");
    }

    #[test]
    fn test_display_includes_subject() {
        let message = Message::new("hi").with_subject("arrivals.brussels");

        assert_eq!(
            message.to_string(),
            "Message(subject=arrivals.brussels, body=hi)"
        );
    }
}
