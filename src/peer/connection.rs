//! Peer coordinator.
//!
//! Owns the engine factory, the peer-connection handle, the completion
//! bridges and the event translator, and turns the engine's asynchronous
//! completions into blocking results for the foreign caller.

use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice::candidate::candidate_base::unmarshal_candidate;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;

use crate::bridge::{AckBridge, CompletionBridge, WaitError, BRIDGE_TIMEOUT};
use crate::config::Configuration;
use crate::error::PeerError;
use crate::events::{EventSink, EventTranslator, IceCandidate, PeerEvent};

use super::threads::ThreadPair;

#[derive(Clone, Copy)]
enum Generation {
    Offer,
    Answer,
}

impl Generation {
    fn label(self) -> &'static str {
        match self {
            Generation::Offer => "offer",
            Generation::Answer => "answer",
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Local,
    Remote,
}

/// Coordinator between a foreign caller issuing blocking calls and the
/// asynchronous negotiation engine.
///
/// Calls block the invoking thread until resolution or deadline; the
/// foreign runtime is expected to offload them onto its own worker units.
/// Offer/answer generation is serialized per peer (a concurrent generation
/// call fails with [`PeerError::GenerationInFlight`]). Description-apply
/// calls use a fresh acknowledgement per call; the engine itself rejects
/// out-of-order application.
pub struct Peer {
    threads: ThreadPair,
    api: API,
    translator: EventTranslator,
    pc: Mutex<Option<Arc<RTCPeerConnection>>>,
    config: Mutex<Configuration>,
    sdp_bridge: CompletionBridge<RTCSessionDescription>,
    /// Locally created data channel; at most one per peer in this design.
    channel: Mutex<Option<Arc<RTCDataChannel>>>,
}

impl Peer {
    /// Build the engine factory and start the execution contexts.
    ///
    /// The factory is fixed to DTLS/SCTP data channels; no media codecs
    /// are registered.
    pub fn create(sink: Arc<dyn EventSink>) -> Result<Arc<Self>, PeerError> {
        let threads = ThreadPair::new()?;

        let mut media_engine = MediaEngine::default();
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| PeerError::FactoryCreateFailed(format!("interceptors: {e}")))?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let translator = EventTranslator::spawn(sink, threads.worker());
        let sdp_bridge = CompletionBridge::new(threads.signaling().clone());

        Ok(Arc::new(Self {
            threads,
            api,
            translator,
            pc: Mutex::new(None),
            config: Mutex::new(Configuration::default()),
            sdp_bridge,
            channel: Mutex::new(None),
        }))
    }

    /// Construct the engine connection with the given configuration and
    /// install the callback handlers.
    pub fn open(&self, config: Configuration) -> Result<(), PeerError> {
        let pc = self
            .threads
            .signaling()
            .block_on(self.api.new_peer_connection(config.to_rtc()))
            .map_err(|e| PeerError::EngineCreateFailed(e.to_string()))?;
        let pc = Arc::new(pc);

        self.install_handlers(&pc);

        *self.pc.lock() = Some(pc);
        *self.config.lock() = config;
        Ok(())
    }

    fn install_handlers(&self, pc: &Arc<RTCPeerConnection>) {
        let translator = self.translator.clone();
        pc.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
            translator.dispatch(PeerEvent::SignalingStateChanged(state));
            Box::pin(async {})
        }));

        let translator = self.translator.clone();
        pc.on_negotiation_needed(Box::new(move || {
            translator.dispatch(PeerEvent::NegotiationNeeded);
            Box::pin(async {})
        }));

        // A `None` candidate is the engine's end-of-gathering marker.
        let translator = self.translator.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            match candidate {
                Some(c) => match c.to_json() {
                    Ok(init) => {
                        translator.dispatch(PeerEvent::IceCandidateDiscovered(IceCandidate {
                            sdp_mid: init.sdp_mid.unwrap_or_default(),
                            sdp_mline_index: init.sdp_mline_index.unwrap_or(0),
                            candidate: init.candidate,
                        }))
                    }
                    Err(e) => warn!("dropping unserializable ICE candidate: {e}"),
                },
                None => translator.dispatch(PeerEvent::IceGatheringComplete),
            }
            Box::pin(async {})
        }));

        let translator = self.translator.clone();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            translator.dispatch(PeerEvent::DataChannelOpened(dc));
            Box::pin(async {})
        }));
    }

    fn engine(&self) -> Result<Arc<RTCPeerConnection>, PeerError> {
        self.pc.lock().clone().ok_or(PeerError::NotConnected)
    }

    /// Generate an SDP offer. Blocks until the engine resolves or the
    /// deadline elapses; on timeout the engine operation keeps running and
    /// its late result is discarded.
    pub fn create_offer(&self) -> Result<RTCSessionDescription, PeerError> {
        self.generate(Generation::Offer)
    }

    /// Generate an SDP answer; requires an applied remote offer.
    pub fn create_answer(&self) -> Result<RTCSessionDescription, PeerError> {
        self.generate(Generation::Answer)
    }

    fn generate(&self, kind: Generation) -> Result<RTCSessionDescription, PeerError> {
        let pc = self.engine()?;
        let (completion, pending) = self
            .sdp_bridge
            .arm()
            .map_err(|_| PeerError::GenerationInFlight)?;

        let label = kind.label();
        self.threads.signaling().spawn(async move {
            let result = match kind {
                Generation::Offer => pc.create_offer(None).await,
                Generation::Answer => pc.create_answer(None).await,
            };
            match result {
                Ok(desc) => completion.succeed(desc),
                Err(e) => {
                    warn!("{label} generation failed: {e}");
                    completion.fail();
                }
            }
        });

        match self.sdp_bridge.wait(pending, BRIDGE_TIMEOUT) {
            Ok(desc) => Ok(desc),
            Err(WaitError::TimedOut) => {
                warn!("{label} generation timed out after {BRIDGE_TIMEOUT:?}");
                Err(PeerError::GenerationTimeout)
            }
            Err(WaitError::Failed) => Err(PeerError::GenerationFailed(format!(
                "engine did not produce an {label}"
            ))),
        }
    }

    /// Apply a locally generated description. The engine takes ownership.
    pub fn set_local_description(&self, desc: RTCSessionDescription) -> Result<(), PeerError> {
        self.apply_description(desc, Direction::Local)
    }

    /// Apply a description received from the remote peer.
    pub fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<(), PeerError> {
        self.apply_description(desc, Direction::Remote)
    }

    fn apply_description(
        &self,
        desc: RTCSessionDescription,
        direction: Direction,
    ) -> Result<(), PeerError> {
        let pc = self.engine()?;
        let (ack, bridge) = AckBridge::new(self.threads.signaling().clone());

        self.threads.signaling().spawn(async move {
            let result = match direction {
                Direction::Local => pc.set_local_description(desc).await,
                Direction::Remote => pc.set_remote_description(desc).await,
            };
            ack.resolve(result.map_err(|e| e.to_string()));
        });

        bridge
            .wait(BRIDGE_TIMEOUT)
            .map_err(|e| PeerError::DescriptionApplyFailed(e.to_string()))
    }

    /// Submit a remote ICE candidate. Malformed candidate text fails with
    /// [`PeerError::ParseError`] before the engine is touched.
    pub fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), PeerError> {
        let raw = candidate
            .candidate
            .strip_prefix("candidate:")
            .unwrap_or(&candidate.candidate);
        unmarshal_candidate(raw)
            .map_err(|e| PeerError::ParseError(format!("invalid candidate: {e}")))?;

        let pc = self.engine()?;
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: Some(candidate.sdp_mid.clone()),
            sdp_mline_index: Some(candidate.sdp_mline_index),
            username_fragment: None,
        };
        self.threads
            .signaling()
            .block_on(pc.add_ice_candidate(init))
            .map_err(|e| PeerError::CandidateRejected(e.to_string()))
    }

    /// Current negotiation-phase state, read-only.
    pub fn signaling_state(&self) -> RTCSignalingState {
        match self.pc.lock().as_ref() {
            Some(pc) => pc.signaling_state(),
            None => RTCSignalingState::Unspecified,
        }
    }

    /// Replace the configuration. Engine validation is authoritative; the
    /// cached copy is updated only when the engine accepts.
    pub fn set_configuration(&self, config: Configuration) -> Result<(), PeerError> {
        let pc = self.engine()?;
        self.threads
            .signaling()
            .block_on(pc.set_configuration(config.to_rtc()))
            .map_err(|e| PeerError::ConfigurationRejected(e.to_string()))?;
        *self.config.lock() = config;
        Ok(())
    }

    /// The cached configuration (last accepted by the engine).
    pub fn configuration(&self) -> Configuration {
        self.config.lock().clone()
    }

    /// Create a data channel. The peer retains its own reference; the
    /// returned reference belongs to the caller.
    pub fn create_data_channel(
        &self,
        label: &str,
        options: Option<RTCDataChannelInit>,
    ) -> Result<Arc<RTCDataChannel>, PeerError> {
        let pc = self.engine()?;
        let dc = self
            .threads
            .signaling()
            .block_on(pc.create_data_channel(label, options))
            .map_err(|e| PeerError::EngineCreateFailed(format!("data channel: {e}")))?;
        *self.channel.lock() = Some(dc.clone());
        Ok(dc)
    }

    /// Request engine-side shutdown. Idempotent; safe with callbacks still
    /// in flight (spawned tasks hold their own references).
    pub fn close(&self) {
        let pc = self.pc.lock().clone();
        if let Some(pc) = pc {
            if let Err(e) = self.threads.signaling().block_on(pc.close()) {
                warn!("engine close failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BundlePolicy, IceServerConfig};
    use std::sync::mpsc;
    use std::time::Duration;

    struct RecordingSink(mpsc::Sender<PeerEvent>);

    impl EventSink for RecordingSink {
        fn on_event(&self, event: PeerEvent) {
            let _ = self.0.send(event);
        }
    }

    fn new_peer() -> (Arc<Peer>, mpsc::Receiver<PeerEvent>) {
        let (tx, rx) = mpsc::channel();
        let peer = Peer::create(Arc::new(RecordingSink(tx))).unwrap();
        (peer, rx)
    }

    fn wait_for_gathering_complete(rx: &mpsc::Receiver<PeerEvent>) {
        let deadline = Duration::from_secs(10);
        loop {
            match rx.recv_timeout(deadline) {
                Ok(PeerEvent::IceGatheringComplete) => return,
                Ok(_) => continue,
                Err(e) => panic!("gathering did not complete: {e}"),
            }
        }
    }

    #[test]
    fn test_generation_before_open_fails() {
        let (peer, _events) = new_peer();
        assert!(matches!(peer.create_offer(), Err(PeerError::NotConnected)));
    }

    #[test]
    fn test_concurrent_generation_fails_loudly() {
        let (peer, _events) = new_peer();
        peer.open(Configuration::default()).unwrap();

        // Hold the bridge armed, as an in-flight generation would.
        let _armed = peer.sdp_bridge.arm().unwrap();
        assert!(matches!(
            peer.create_offer(),
            Err(PeerError::GenerationInFlight)
        ));
    }

    #[test]
    fn test_answer_without_remote_offer_fails() {
        let (peer, _events) = new_peer();
        peer.open(Configuration::default()).unwrap();

        assert!(matches!(
            peer.create_answer(),
            Err(PeerError::GenerationFailed(_))
        ));

        // The bridge re-armed; the peer remains usable.
        peer.create_data_channel("data", None).unwrap();
        let offer = peer.create_offer().unwrap();
        assert!(!offer.sdp.is_empty());
    }

    #[test]
    fn test_malformed_candidate_is_parse_error() {
        let (peer, _events) = new_peer();
        peer.open(Configuration::default()).unwrap();
        let state_before = peer.signaling_state();

        let bad = IceCandidate {
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
            candidate: "definitely not a candidate".to_string(),
        };
        assert!(matches!(
            peer.add_ice_candidate(&bad),
            Err(PeerError::ParseError(_))
        ));
        assert_eq!(peer.signaling_state(), state_before);
    }

    #[test]
    fn test_valid_candidate_without_remote_description_is_rejected() {
        let (peer, _events) = new_peer();
        peer.open(Configuration::default()).unwrap();

        let candidate = IceCandidate {
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
            candidate: "candidate:1966762133 1 udp 2122260223 192.168.1.20 47299 typ host"
                .to_string(),
        };
        assert!(matches!(
            peer.add_ice_candidate(&candidate),
            Err(PeerError::CandidateRejected(_))
        ));
    }

    #[test]
    fn test_rejected_configuration_leaves_cache_unchanged() {
        let (peer, _events) = new_peer();
        peer.open(Configuration::default()).unwrap();
        let cached = peer.configuration();
        let state_before = peer.signaling_state();

        // The engine refuses bundle-policy changes on a live connection.
        let mut changed = cached.clone();
        changed.bundle_policy = BundlePolicy::MaxBundle;
        assert!(matches!(
            peer.set_configuration(changed),
            Err(PeerError::ConfigurationRejected(_))
        ));

        assert_eq!(peer.configuration(), cached);
        assert_eq!(peer.signaling_state(), state_before);
    }

    #[test]
    fn test_accepted_configuration_updates_cache() {
        let (peer, _events) = new_peer();
        peer.open(Configuration::default()).unwrap();

        let mut config = peer.configuration();
        config
            .ice_servers
            .push(IceServerConfig::stun("stun:stun.l.google.com:19302"));
        peer.set_configuration(config.clone()).unwrap();
        assert_eq!(peer.configuration(), config);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (peer, _events) = new_peer();
        peer.open(Configuration::default()).unwrap();
        peer.close();
        peer.close();
    }

    #[test]
    fn test_offer_answer_scenario() {
        let (a, a_events) = new_peer();
        let (b, b_events) = new_peer();
        a.open(Configuration::default()).unwrap();
        b.open(Configuration::default()).unwrap();

        // Data channel first, so the offer carries an application section.
        a.create_data_channel("data", None).unwrap();

        let offer = a.create_offer().unwrap();
        assert!(!offer.sdp.is_empty());
        a.set_local_description(offer.clone()).unwrap();
        assert_eq!(a.signaling_state(), RTCSignalingState::HaveLocalOffer);

        b.set_remote_description(offer).unwrap();
        assert_eq!(b.signaling_state(), RTCSignalingState::HaveRemoteOffer);

        let answer = b.create_answer().unwrap();
        assert!(!answer.sdp.is_empty());
        b.set_local_description(answer.clone()).unwrap();
        a.set_remote_description(answer).unwrap();
        assert_eq!(a.signaling_state(), RTCSignalingState::Stable);
        assert_eq!(b.signaling_state(), RTCSignalingState::Stable);

        wait_for_gathering_complete(&a_events);
        wait_for_gathering_complete(&b_events);

        a.close();
        b.close();
    }
}
