//! Message data model
//!
//! One `Message` is one unit of communication queued for a client. Three
//! variants are deliverable text from the server or other clients; the
//! fourth carries a raw line read from the client's own connection, to be
//! interpreted by its send loop rather than written out.

/// A single message queued for delivery to (or interpretation by) a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Server-originated informational text
    Notice(String),
    /// Private message from another client
    Tell { from: String, text: String },
    /// Public message from another client
    Broadcast { from: String, text: String },
    /// A raw line produced by this client's own receive loop, not yet
    /// interpreted
    Command(String),
}

impl Message {
    /// Render the wire line for this message, without the trailing newline.
    ///
    /// Returns `None` for [`Message::Command`], which is interpreted rather
    /// than delivered.
    pub fn render(&self) -> Option<String> {
        match self {
            Message::Notice(text) => Some(format!("*** {text}")),
            Message::Tell { from, text } => Some(format!("*{from}*: {text}")),
            Message::Broadcast { from, text } => Some(format!("<{from}>: {text}")),
            Message::Command(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_render() {
        let msg = Message::Notice("alice has connected".to_string());
        assert_eq!(msg.render().unwrap(), "*** alice has connected");
    }

    #[test]
    fn test_tell_render() {
        let msg = Message::Tell {
            from: "alice".to_string(),
            text: "psst".to_string(),
        };
        assert_eq!(msg.render().unwrap(), "*alice*: psst");
    }

    #[test]
    fn test_broadcast_render() {
        let msg = Message::Broadcast {
            from: "bob".to_string(),
            text: "hello all".to_string(),
        };
        assert_eq!(msg.render().unwrap(), "<bob>: hello all");
    }

    #[test]
    fn test_command_has_no_rendering() {
        let msg = Message::Command("/quit".to_string());
        assert!(msg.render().is_none());
    }
}
