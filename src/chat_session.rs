//! Websocket transport for one streaming prompt invocation
//!
//! Each prompt gets a fresh socket: connect, handshake, send the invocation,
//! accumulate the streamed answer, close. The protocol state machine itself
//! lives in [`crate::chat_protocol`]; this module only moves frames across
//! the wire and enforces the session deadline.

use crate::chat_protocol::{
    ResponseAccumulator, SessionStep, decode_frames, encode_handshake, encode_invocation,
    encode_pong,
};
use crate::error::{Result, RoistatError};
use futures::{SinkExt, StreamExt};
use tokio::time::{Duration, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, warn};

/// Hard deadline for one prompt session
pub const SESSION_TIMEOUT_SECS: u64 = 60;

/// Pause between handshake and invocation so the server finishes its setup
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Grace period between the completion frame and our close, letting any
/// trailing records drain
const CLOSE_GRACE: Duration = Duration::from_millis(100);

/// Connection parameters for the streaming chat endpoint
#[derive(Debug, Clone)]
pub struct ChatEndpoint {
    /// Service origin, e.g. `https://platform.example.com`
    pub origin: String,
    /// Account scope for the socket URL
    pub account_id: String,
    /// Tenant scope for the socket URL
    pub tenant_id: String,
}

impl ChatEndpoint {
    /// Build the websocket URL, mapping the origin's HTTP scheme onto the
    /// matching websocket scheme.
    pub fn url(&self) -> Result<String> {
        if self.account_id.is_empty() {
            return Err(RoistatError::MissingContext("accountId".to_string()));
        }
        if self.tenant_id.is_empty() {
            return Err(RoistatError::MissingContext("tenantId".to_string()));
        }
        Ok(format!(
            "{}/hero-ai-chat/chatbot?accountId={}&tenantId={}",
            ws_origin(&self.origin),
            self.account_id,
            self.tenant_id
        ))
    }
}

fn ws_origin(origin: &str) -> String {
    if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if origin.starts_with("ws://") || origin.starts_with("wss://") {
        origin.to_string()
    } else {
        format!("wss://{origin}")
    }
}

/// Send one prompt and return the complete streamed answer.
///
/// Resolves with whatever text accumulated by the time the socket closes;
/// a session that closes with no text at all fails with
/// [`RoistatError::ClosedWithoutResponse`].
pub async fn send_prompt(endpoint: &ChatEndpoint, question: &str, tracking_id: &str) -> Result<String> {
    let url = endpoint.url()?;
    debug!(%url, "opening chat session");

    let (stream, _response) = connect_async(url.as_str()).await?;
    let (mut sink, mut source) = stream.split();

    sink.send(WsMessage::Text(encode_handshake())).await?;
    sleep(SETTLE_DELAY).await;
    sink.send(WsMessage::Text(encode_invocation(question, tracking_id)?)).await?;

    let deadline = sleep(Duration::from_secs(SESSION_TIMEOUT_SECS));
    tokio::pin!(deadline);

    let mut accumulator = ResponseAccumulator::new();
    let close_code: String = 'session: loop {
        tokio::select! {
            _ = &mut deadline => {
                warn!(timeout_secs = SESSION_TIMEOUT_SECS, "chat session deadline hit, closing");
                let _ = sink.send(WsMessage::Close(None)).await;
                break 'session "timeout".to_string();
            }
            message = source.next() => match message {
                Some(Ok(WsMessage::Text(payload))) => {
                    for frame in decode_frames(&payload) {
                        match accumulator.apply(frame) {
                            SessionStep::Continue => {}
                            SessionStep::SendPong => {
                                sink.send(WsMessage::Text(encode_pong())).await?;
                            }
                            SessionStep::Close => {
                                sleep(CLOSE_GRACE).await;
                                let _ = sink.send(WsMessage::Close(None)).await;
                                break 'session "complete".to_string();
                            }
                            SessionStep::Fail(detail) => {
                                let _ = sink.send(WsMessage::Close(None)).await;
                                return Err(RoistatError::AiStream(detail));
                            }
                        }
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    break 'session frame
                        .map(|f| f.code.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break 'session "closed".to_string(),
            }
        }
    };

    accumulator.into_text().ok_or(RoistatError::ClosedWithoutResponse(close_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_scheme_mapping() {
        let endpoint = ChatEndpoint {
            origin: "https://platform.example.com".to_string(),
            account_id: "acct-1".to_string(),
            tenant_id: "tenant-1".to_string(),
        };
        assert_eq!(
            endpoint.url().unwrap(),
            "wss://platform.example.com/hero-ai-chat/chatbot?accountId=acct-1&tenantId=tenant-1"
        );

        let plain = ChatEndpoint { origin: "http://localhost:8080".to_string(), ..endpoint.clone() };
        assert!(plain.url().unwrap().starts_with("ws://localhost:8080/"));

        let bare = ChatEndpoint { origin: "platform.example.com".to_string(), ..endpoint };
        assert!(bare.url().unwrap().starts_with("wss://platform.example.com/"));
    }

    #[test]
    fn test_url_requires_context() {
        let endpoint = ChatEndpoint {
            origin: "https://platform.example.com".to_string(),
            account_id: String::new(),
            tenant_id: "tenant-1".to_string(),
        };
        assert!(matches!(endpoint.url(), Err(RoistatError::MissingContext(_))));
    }
}
