//! Engine callback -> foreign event translation.
//!
//! Engine callbacks run on the signaling context and must never be stalled
//! by a slow foreign handler. Each callback performs one non-blocking
//! channel send; a dispatcher task on the worker runtime drains the channel
//! and invokes the registered sink.

use std::sync::Arc;

use log::trace;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::signaling_state::RTCSignalingState;

// Signaling states as FFI-stable integers
pub const SIGNALING_STATE_STABLE: u32 = 0;
pub const SIGNALING_STATE_HAVE_LOCAL_OFFER: u32 = 1;
pub const SIGNALING_STATE_HAVE_LOCAL_PRANSWER: u32 = 2;
pub const SIGNALING_STATE_HAVE_REMOTE_OFFER: u32 = 3;
pub const SIGNALING_STATE_HAVE_REMOTE_PRANSWER: u32 = 4;
pub const SIGNALING_STATE_CLOSED: u32 = 5;

/// Map the engine state to its FFI integer.
pub fn signaling_state_code(state: RTCSignalingState) -> u32 {
    match state {
        RTCSignalingState::Stable => SIGNALING_STATE_STABLE,
        RTCSignalingState::HaveLocalOffer => SIGNALING_STATE_HAVE_LOCAL_OFFER,
        RTCSignalingState::HaveLocalPranswer => SIGNALING_STATE_HAVE_LOCAL_PRANSWER,
        RTCSignalingState::HaveRemoteOffer => SIGNALING_STATE_HAVE_REMOTE_OFFER,
        RTCSignalingState::HaveRemotePranswer => SIGNALING_STATE_HAVE_REMOTE_PRANSWER,
        RTCSignalingState::Closed => SIGNALING_STATE_CLOSED,
        _ => SIGNALING_STATE_STABLE,
    }
}

/// ICE candidate value type, shared by outbound events and inbound
/// submissions. JSON field names follow the browser convention so the
/// foreign signaling layer can pass candidates through verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u16,
    pub candidate: String,
}

impl IceCandidate {
    /// Parse a browser-style candidate JSON object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to a browser-style candidate JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Normalized event descriptor pushed to the foreign caller.
pub enum PeerEvent {
    SignalingStateChanged(RTCSignalingState),
    NegotiationNeeded,
    IceCandidateDiscovered(IceCandidate),
    IceGatheringComplete,
    /// A data channel opened by the remote side; ownership of the handle
    /// transfers to the caller.
    DataChannelOpened(Arc<RTCDataChannel>),
}

/// Receives translated events on the worker context. A slow implementation
/// delays later events but never the engine's signaling thread.
pub trait EventSink: Send + Sync + 'static {
    fn on_event(&self, event: PeerEvent);
}

/// Fans engine callbacks out to the sink without blocking the callers.
#[derive(Clone)]
pub struct EventTranslator {
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl EventTranslator {
    /// Start the dispatcher task on the worker runtime.
    pub fn spawn(sink: Arc<dyn EventSink>, worker: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PeerEvent>();
        worker.spawn(async move {
            while let Some(event) = rx.recv().await {
                sink.on_event(event);
            }
            trace!("event dispatcher stopped");
        });
        Self { tx }
    }

    /// Queue an event; never blocks. Events after the dispatcher stopped
    /// are dropped.
    pub fn dispatch(&self, event: PeerEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;
    use tokio::runtime::Runtime;

    struct ChannelSink(std_mpsc::Sender<u32>);

    impl EventSink for ChannelSink {
        fn on_event(&self, event: PeerEvent) {
            let tag = match event {
                PeerEvent::SignalingStateChanged(state) => signaling_state_code(state),
                PeerEvent::NegotiationNeeded => 100,
                PeerEvent::IceCandidateDiscovered(_) => 101,
                PeerEvent::IceGatheringComplete => 102,
                PeerEvent::DataChannelOpened(_) => 103,
            };
            let _ = self.0.send(tag);
        }
    }

    #[test]
    fn test_dispatch_preserves_order() {
        let rt = Runtime::new().unwrap();
        let (tx, rx) = std_mpsc::channel();
        let translator = EventTranslator::spawn(Arc::new(ChannelSink(tx)), rt.handle());

        translator.dispatch(PeerEvent::SignalingStateChanged(
            RTCSignalingState::HaveLocalOffer,
        ));
        translator.dispatch(PeerEvent::NegotiationNeeded);
        translator.dispatch(PeerEvent::IceGatheringComplete);

        let timeout = Duration::from_secs(1);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), SIGNALING_STATE_HAVE_LOCAL_OFFER);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), 100);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), 102);
    }

    #[test]
    fn test_candidate_json_round_trip() {
        let candidate = IceCandidate {
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
            candidate: "candidate:1966762133 1 udp 2122260223 192.168.1.20 47299 typ host"
                .to_string(),
        };

        let json = candidate.to_json();
        assert!(json.contains("\"sdpMid\""));
        assert!(json.contains("\"sdpMLineIndex\""));
        assert_eq!(IceCandidate::from_json(&json).unwrap(), candidate);
    }
}
