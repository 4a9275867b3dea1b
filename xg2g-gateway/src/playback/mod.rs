//! Playback decisions: which mode and protocol a client gets for a piece of
//! media.
//!
//! - [`engine`]: truth-based decisions from server-side media facts and a
//!   resolved capability set
//! - [`client_table`]: user-agent table for paths without a truth lookup
//! - [`codec`]: output codec selection when transcoding

pub mod capabilities;
pub mod client_table;
pub mod codec;
pub mod engine;
pub mod profile;
pub mod truth;

pub use capabilities::PlaybackCapabilities;
pub use client_table::{decide as decide_for_client, ClientDecision, ClientProfile, MediaInfo, Policy};
pub use codec::{select_codec, CodecChoice, CodecInput, ServerCapabilities};
pub use engine::{decide, Decision, PlaybackDecisionEngine, PlaybackError, ResolveRequest};
pub use profile::{Headers, HeaderProfileResolver, ProfileResolver, HEADER_PLAYBACK_CAPABILITIES};
pub use truth::{CatalogTruthProvider, MediaState, MediaTruth, MediaTruthProvider};
