//! Wire types for the xg2g gateway.
//!
//! This crate defines the JSON bodies, headers and enums exchanged between
//! the gateway's intent endpoint, its clients and the external execution
//! layer that actually starts transcoders.
//!
//! # Intent flow
//!
//! ```text
//! client --POST /intents {IntentRequest}--> gateway
//!        <--202 {IntentResponse} | 4xx/5xx {Problem}--
//! gateway --publish "session.start" {StartSessionEvent}--> executor
//! ```
//!
//! # Example
//!
//! ```rust
//! use xg2g_protocol::{IntentMode, IntentRequest, IntentType};
//!
//! let req: IntentRequest = serde_json::from_str(
//!     r#"{"serviceRef":"1:0:19:283D:3FB:1:C00000:0:0:0:","params":{"mode":"live"}}"#,
//! ).unwrap();
//! assert_eq!(req.intent_type(), IntentType::StreamStart);
//! assert_eq!(req.mode().unwrap(), IntentMode::Live);
//! ```

pub mod error;
pub mod types;

pub use error::{Problem, ProblemCode, ProtocolError};
pub use types::{
    IntentMode, IntentRequest, IntentResponse, IntentType, PlaybackMode, PlaybackProtocol,
    ReasonCode, SessionState, StartSessionEvent, StopSessionEvent, EVENT_START_SESSION,
    EVENT_STOP_SESSION, HEADER_CORRELATION_ID, HEADER_IDEMPOTENCY_KEY, HEADER_RETRY_AFTER,
};
