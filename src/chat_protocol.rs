//! Wire protocol for the streaming chat endpoint
//!
//! The endpoint speaks a record-separated JSON framing: every message is a
//! JSON object terminated by the ASCII record separator (0x1e), and a single
//! websocket text payload may carry several records. The first exchange is a
//! handshake (`{"protocol":"json","version":1}`) acknowledged by an object
//! with no `type` field; after that, numeric `type` codes drive the session.
//!
//! Frame decoding and response accumulation are pure so the whole state
//! machine is testable without a live socket; the transport lives in
//! [`crate::chat_session`].

use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Record separator terminating every protocol message
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Invocation id used for the single prompt per session
const INVOCATION_ID: &str = "0";

/// One decoded protocol frame
#[derive(Debug, Clone, PartialEq)]
pub enum ChatFrame {
    /// Handshake acknowledgement (an object with no `type` and no `error`)
    HandshakeAck,
    /// Complete answer delivered in one piece (type 1, target
    /// "onPromptResponse"); replaces anything accumulated so far
    FinalAnswer(String),
    /// Incremental answer fragment (type 2); appended in arrival order
    StreamItem(String),
    /// End of the invocation (type 3), optionally carrying the full answer
    Completion {
        /// Authoritative full answer, replacing accumulated fragments
        result: Option<String>,
    },
    /// Keep-alive ping (type 6); must be answered with a pong
    Ping,
    /// Server-reported error; the session fails immediately
    Error(String),
    /// Recognized framing but no content this client acts on
    Ignored,
}

#[derive(Serialize)]
struct Handshake {
    protocol: &'static str,
    version: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptArgument {
    question: String,
    application_id: String,
    id: String,
    tracking_id: String,
    conversation_histories: Vec<Value>,
    conversation_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Invocation {
    arguments: Vec<PromptArgument>,
    invocation_id: &'static str,
    target: &'static str,
    #[serde(rename = "type")]
    message_type: u8,
}

/// Encode the opening handshake record
pub fn encode_handshake() -> String {
    format!(r#"{{"protocol":"json","version":1}}{RECORD_SEPARATOR}"#)
}

/// Encode the pong reply to a keep-alive ping
pub fn encode_pong() -> String {
    format!(r#"{{"type":6}}{RECORD_SEPARATOR}"#)
}

/// Encode a prompt invocation with a fresh conversation id and no history
pub fn encode_invocation(question: &str, tracking_id: &str) -> Result<String> {
    let invocation = Invocation {
        arguments: vec![PromptArgument {
            question: question.to_string(),
            application_id: String::new(),
            id: String::new(),
            tracking_id: tracking_id.to_string(),
            conversation_histories: Vec::new(),
            conversation_id: Uuid::new_v4().to_string(),
        }],
        invocation_id: INVOCATION_ID,
        target: "SendPrompt",
        message_type: 1,
    };
    let mut encoded = serde_json::to_string(&invocation)?;
    encoded.push(RECORD_SEPARATOR);
    Ok(encoded)
}

/// Decode every record in one websocket text payload.
///
/// Records that are not valid JSON are skipped rather than failing the
/// session; a malformed keep-alive should not abort an otherwise healthy
/// stream.
pub fn decode_frames(payload: &str) -> Vec<ChatFrame> {
    payload
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| serde_json::from_str::<Value>(record).ok())
        .map(|message| decode_message(&message))
        .collect()
}

fn decode_message(message: &Value) -> ChatFrame {
    if let Some(error) = message.get("error") {
        let detail = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return ChatFrame::Error(detail);
    }

    let Some(message_type) = message.get("type").and_then(Value::as_i64) else {
        return ChatFrame::HandshakeAck;
    };

    match message_type {
        1 => {
            let is_prompt_response =
                message.get("target").and_then(Value::as_str) == Some("onPromptResponse");
            let answer = message
                .get("arguments")
                .and_then(Value::as_array)
                .and_then(|args| args.first())
                .and_then(|arg| arg.get("answer"))
                .and_then(Value::as_str);
            match (is_prompt_response, answer) {
                (true, Some(text)) => ChatFrame::FinalAnswer(text.to_string()),
                _ => ChatFrame::Ignored,
            }
        }
        2 => match message.get("item").and_then(Value::as_str) {
            Some(item) => ChatFrame::StreamItem(item.to_string()),
            None => ChatFrame::Ignored,
        },
        3 => ChatFrame::Completion {
            result: message.get("result").and_then(Value::as_str).map(str::to_string),
        },
        6 => ChatFrame::Ping,
        _ => ChatFrame::Ignored,
    }
}

/// What the transport loop should do after applying a frame
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStep {
    /// Keep reading
    Continue,
    /// Send a pong record, then keep reading
    SendPong,
    /// The invocation is complete; close the socket after a short grace
    Close,
    /// The server reported an error; abort the session
    Fail(String),
}

/// Accumulates the answer text across the frames of one invocation
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    text: String,
}

impl ResponseAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one frame into the accumulated answer and report the next
    /// transport step.
    pub fn apply(&mut self, frame: ChatFrame) -> SessionStep {
        match frame {
            ChatFrame::HandshakeAck | ChatFrame::Ignored => SessionStep::Continue,
            ChatFrame::FinalAnswer(text) => {
                self.text = text;
                SessionStep::Continue
            }
            ChatFrame::StreamItem(item) => {
                self.text.push_str(&item);
                SessionStep::Continue
            }
            ChatFrame::Completion { result } => {
                if let Some(text) = result {
                    self.text = text;
                }
                SessionStep::Close
            }
            ChatFrame::Ping => SessionStep::SendPong,
            ChatFrame::Error(detail) => SessionStep::Fail(detail),
        }
    }

    /// The accumulated answer, or `None` when nothing arrived
    pub fn into_text(self) -> Option<String> {
        if self.text.is_empty() { None } else { Some(self.text) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(record: &str) -> ChatFrame {
        let mut payload = record.to_string();
        payload.push(RECORD_SEPARATOR);
        let mut frames = decode_frames(&payload);
        assert_eq!(frames.len(), 1, "expected exactly one frame in {record}");
        frames.remove(0)
    }

    #[test]
    fn test_handshake_ack() {
        assert_eq!(frame("{}"), ChatFrame::HandshakeAck);
    }

    #[test]
    fn test_stream_item_and_final_answer() {
        assert_eq!(frame(r#"{"type":2}"#), ChatFrame::Ignored);
        assert_eq!(
            frame(r#"{"type":2,"item":"partial "}"#),
            ChatFrame::StreamItem("partial ".to_string())
        );
        assert_eq!(
            frame(r#"{"type":1,"target":"onPromptResponse","arguments":[{"answer":"full"}]}"#),
            ChatFrame::FinalAnswer("full".to_string())
        );
    }

    #[test]
    fn test_completion_ping_error() {
        assert_eq!(frame(r#"{"type":3}"#), ChatFrame::Completion { result: None });
        assert_eq!(
            frame(r#"{"type":3,"result":"done"}"#),
            ChatFrame::Completion { result: Some("done".to_string()) }
        );
        assert_eq!(frame(r#"{"type":6}"#), ChatFrame::Ping);
        assert_eq!(frame(r#"{"error":"boom"}"#), ChatFrame::Error("boom".to_string()));
    }

    #[test]
    fn test_multiple_records_in_one_payload() {
        let payload = format!(
            "{}{sep}{}{sep}",
            r#"{"type":2,"item":"a"}"#,
            r#"{"type":3}"#,
            sep = RECORD_SEPARATOR
        );
        let frames = decode_frames(&payload);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], ChatFrame::StreamItem("a".to_string()));
        assert_eq!(frames[1], ChatFrame::Completion { result: None });
    }

    #[test]
    fn test_invalid_record_is_skipped() {
        let payload = format!("not json{sep}{{\"type\":6}}{sep}", sep = RECORD_SEPARATOR);
        let frames = decode_frames(&payload);
        assert_eq!(frames, vec![ChatFrame::Ping]);
    }

    #[test]
    fn test_accumulator_appends_then_completion_overwrites() {
        let mut acc = ResponseAccumulator::new();
        assert_eq!(acc.apply(ChatFrame::StreamItem("hel".into())), SessionStep::Continue);
        assert_eq!(acc.apply(ChatFrame::StreamItem("lo".into())), SessionStep::Continue);
        assert_eq!(
            acc.apply(ChatFrame::Completion { result: Some("authoritative".into()) }),
            SessionStep::Close
        );
        assert_eq!(acc.into_text().as_deref(), Some("authoritative"));
    }

    #[test]
    fn test_accumulator_final_answer_overwrites_fragments() {
        let mut acc = ResponseAccumulator::new();
        acc.apply(ChatFrame::StreamItem("draft".into()));
        acc.apply(ChatFrame::FinalAnswer("final".into()));
        assert_eq!(acc.apply(ChatFrame::Completion { result: None }), SessionStep::Close);
        assert_eq!(acc.into_text().as_deref(), Some("final"));
    }

    #[test]
    fn test_accumulator_empty_session_yields_none() {
        let mut acc = ResponseAccumulator::new();
        acc.apply(ChatFrame::HandshakeAck);
        assert_eq!(acc.apply(ChatFrame::Completion { result: None }), SessionStep::Close);
        assert!(acc.into_text().is_none());
    }

    #[test]
    fn test_encoded_records_are_terminated() {
        assert!(encode_handshake().ends_with(RECORD_SEPARATOR));
        assert!(encode_pong().ends_with(RECORD_SEPARATOR));
        let invocation = encode_invocation("estimate these", "track-1").unwrap();
        assert!(invocation.ends_with(RECORD_SEPARATOR));

        let parsed: Value =
            serde_json::from_str(invocation.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(parsed["type"], 1);
        assert_eq!(parsed["target"], "SendPrompt");
        assert_eq!(parsed["invocationId"], "0");
        assert_eq!(parsed["arguments"][0]["question"], "estimate these");
        assert_eq!(parsed["arguments"][0]["trackingId"], "track-1");
        assert!(parsed["arguments"][0]["conversationId"].as_str().is_some());
    }
}
