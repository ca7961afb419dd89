//! Per-session display queues behind `GET /messages`.
//!
//! Opening the stream registers a queue under the caller's `session.id`. HTTP
//! dispatches under that session display into it; the dispatch closes it when done.

use crate::interaction::{DisplayStyle, Interaction, PromptError, PromptKind};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub style: DisplayStyle,
    pub text: String,
}

impl DisplayMessage {
    /// Wire form: `{"<style>": "<text>"}`.
    pub fn to_json(&self) -> String {
        let mut frame = Map::new();
        frame.insert(self.style.name().to_string(), Value::String(self.text.clone()));
        Value::Object(frame).to_string()
    }
}

#[derive(Debug, Default)]
pub struct MessageQueues {
    queues: Mutex<HashMap<String, UnboundedSender<DisplayMessage>>>,
}

impl MessageQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the queue of a session, replacing (and ending) any earlier stream.
    pub fn open(&self, session_id: &str) -> UnboundedReceiver<DisplayMessage> {
        let (sender, receiver) = unbounded_channel();
        if self
            .queues
            .lock()
            .insert(session_id.to_string(), sender)
            .is_some()
        {
            debug!("Replaced an open message stream");
        }
        receiver
    }

    /// Drop the session's queue. The stream ends once queued messages are sent.
    pub fn close(&self, session_id: &str) -> bool {
        self.queues.lock().remove(session_id).is_some()
    }

    pub fn is_open(&self, session_id: &str) -> bool {
        self.queues.lock().contains_key(session_id)
    }

    /// Interaction for one HTTP dispatch under `session_id`.
    pub fn interaction(&self, session_id: Option<&str>) -> SessionInteraction {
        SessionInteraction {
            sender: session_id.and_then(|id| self.queues.lock().get(id).cloned()),
        }
    }
}

/// HTTP interaction: never prompts; displays go to the session's open stream.
#[derive(Debug)]
pub struct SessionInteraction {
    sender: Option<UnboundedSender<DisplayMessage>>,
}

impl Interaction for SessionInteraction {
    fn can_prompt(&self) -> bool {
        false
    }

    fn prompt(&self, _message: &str, _kind: PromptKind) -> Result<Option<String>, PromptError> {
        Ok(None)
    }

    fn display(&self, message: &str, style: DisplayStyle) {
        let delivered = self.sender.as_ref().is_some_and(|sender| {
            sender
                .send(DisplayMessage {
                    style,
                    text: message.to_string(),
                })
                .is_ok()
        });
        if !delivered {
            debug!(message = %message, "Display dropped, no message stream open");
        }
    }
}
