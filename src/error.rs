//! Error taxonomy for the bridge.
//!
//! Every failure is surfaced to the caller as an explicit result value;
//! none are fatal to the process. Timeouts disarm the affected bridge so
//! the peer remains usable for subsequent calls.

use thiserror::Error;

/// Errors returned by [`Peer`](crate::peer::Peer) operations.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The engine factory (runtime pair + API) could not be constructed.
    #[error("failed to create engine factory: {0}")]
    FactoryCreateFailed(String),

    /// The engine rejected the peer connection configuration or constraints.
    #[error("failed to create peer connection: {0}")]
    EngineCreateFailed(String),

    /// SDP generation did not complete before the deadline. The underlying
    /// engine operation is not cancelled; its late result is discarded.
    #[error("SDP generation timed out")]
    GenerationTimeout,

    /// The engine reported a failure while generating an offer or answer.
    #[error("SDP generation failed: {0}")]
    GenerationFailed(String),

    /// The engine rejected a local or remote description, or the apply
    /// wait hit its deadline.
    #[error("failed to apply session description: {0}")]
    DescriptionApplyFailed(String),

    /// Malformed SDP or ICE candidate text; the engine was not touched.
    #[error("parse error: {0}")]
    ParseError(String),

    /// The engine declined the replacement configuration; the cached
    /// configuration is unchanged.
    #[error("configuration rejected: {0}")]
    ConfigurationRejected(String),

    /// The engine declined a structurally valid ICE candidate (e.g. no
    /// remote description yet).
    #[error("ICE candidate rejected: {0}")]
    CandidateRejected(String),

    /// A second offer/answer generation was started while one is still in
    /// flight on this peer. Generation calls must be serialized per peer.
    #[error("an SDP generation call is already in flight")]
    GenerationInFlight,

    /// The operation requires an open peer connection (`open` not called,
    /// or creation failed).
    #[error("peer connection not opened")]
    NotConnected,
}
