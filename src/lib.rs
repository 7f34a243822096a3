//! rtc-bridge: blocking C bridge over an asynchronous WebRTC negotiation
//! engine.
//!
//! Exposes peer-connection setup, SDP offer/answer generation, description
//! application and ICE candidate exchange as single blocking calls with
//! fixed deadlines, so a foreign runtime can drive negotiation from plain
//! worker threads.
//!
//! ## Features
//!
//! - **Blocking surface**: every call resolves or fails within 3 seconds
//! - **Re-armable bridges**: a timed-out generation never wedges the peer
//! - **Handle tables**: opaque `u64` handles, no pointers across the boundary
//! - **Callback events**: state, candidates and remote channels pushed
//!   without ever blocking the engine's signaling thread

#![allow(non_snake_case)]

use std::ffi::{c_char, CString};

pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod ffi;
pub mod peer;
pub mod registry;
pub mod sdp;

use ffi::{
    error_code, set_error, string_from_ptr, string_into_raw, CallbackSink, ConfigurationFFI,
    DataChannelOptionsFFI, PeerCallbacks, RTCB_ERROR_ARGUMENT, RTCB_ERROR_FACTORY,
    RTCB_ERROR_HANDLE, RTCB_OK,
};
use registry::{CHANNELS, DESCRIPTIONS, INVALID_HANDLE, PEERS};

// ============================================================================
// Internal helpers
// ============================================================================

/// One-time logger setup; later calls are no-ops.
fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();
}

fn fail(code: i32) -> i32 {
    set_error(code);
    code
}

fn fail_handle(code: i32) -> u64 {
    set_error(code);
    INVALID_HANDLE
}

unsafe fn configuration_from_ptr(config: *const ConfigurationFFI) -> config::Configuration {
    if config.is_null() {
        config::Configuration::default()
    } else {
        (*config).to_config()
    }
}

// ============================================================================
// Peer lifecycle
// ============================================================================

/// Create a peer coordinator and register its event callbacks.
///
/// Starts the peer's signaling and worker contexts and builds the engine
/// factory. The connection itself is not constructed until
/// [`RTCB_CreatePeerConnection`].
///
/// # Arguments
/// * `callbacks` - Event callbacks; may be null for no callbacks
///
/// # Returns
/// Peer handle, or 0 on failure.
///
/// # Safety
/// `callbacks` must be null or point to a valid [`PeerCallbacks`].
#[no_mangle]
pub unsafe extern "C" fn RTCB_InitializePeer(callbacks: *const PeerCallbacks) -> u64 {
    init_logging();

    let callbacks = if callbacks.is_null() {
        PeerCallbacks::default()
    } else {
        *callbacks
    };

    match peer::Peer::create(CallbackSink::new(callbacks)) {
        Ok(peer) => PEERS.insert(peer),
        Err(e) => {
            log::error!("peer initialization failed: {e}");
            fail_handle(RTCB_ERROR_FACTORY)
        }
    }
}

/// Construct the engine connection for a peer.
///
/// # Arguments
/// * `peer` - Peer handle
/// * `config` - Configuration; null for defaults (no ICE servers)
///
/// # Returns
/// RTCB_OK, or an error code.
///
/// # Safety
/// `config` must be null or point to a valid [`ConfigurationFFI`].
#[no_mangle]
pub unsafe extern "C" fn RTCB_CreatePeerConnection(
    peer: u64,
    config: *const ConfigurationFFI,
) -> i32 {
    let Some(peer) = PEERS.get(peer) else {
        return fail(RTCB_ERROR_HANDLE);
    };
    match peer.open(configuration_from_ptr(config)) {
        Ok(()) => RTCB_OK,
        Err(e) => {
            log::error!("peer connection failed: {e}");
            fail(error_code(&e))
        }
    }
}

/// Close a peer's engine connection. Idempotent; the peer handle stays
/// valid until [`RTCB_ReleasePeer`].
#[no_mangle]
pub extern "C" fn RTCB_Close(peer: u64) -> i32 {
    let Some(peer) = PEERS.get(peer) else {
        return fail(RTCB_ERROR_HANDLE);
    };
    peer.close();
    RTCB_OK
}

/// Release a peer handle. Closes the connection if still open; in-flight
/// engine tasks keep their own references and finish safely.
#[no_mangle]
pub extern "C" fn RTCB_ReleasePeer(peer: u64) -> i32 {
    let Some(peer) = PEERS.take(peer) else {
        return fail(RTCB_ERROR_HANDLE);
    };
    peer.close();
    RTCB_OK
}

// ============================================================================
// Offer / answer generation
// ============================================================================

/// Generate an SDP offer. Blocks for at most the bridge deadline.
///
/// # Returns
/// Description handle, or 0 on failure (release with
/// [`RTCB_ReleaseDescription`] if not applied).
#[no_mangle]
pub extern "C" fn RTCB_CreateOffer(peer: u64) -> u64 {
    let Some(peer) = PEERS.get(peer) else {
        return fail_handle(RTCB_ERROR_HANDLE);
    };
    match peer.create_offer() {
        Ok(desc) => DESCRIPTIONS.insert(desc),
        Err(e) => fail_handle(error_code(&e)),
    }
}

/// Generate an SDP answer; requires an applied remote offer.
///
/// # Returns
/// Description handle, or 0 on failure.
#[no_mangle]
pub extern "C" fn RTCB_CreateAnswer(peer: u64) -> u64 {
    let Some(peer) = PEERS.get(peer) else {
        return fail_handle(RTCB_ERROR_HANDLE);
    };
    match peer.create_answer() {
        Ok(desc) => DESCRIPTIONS.insert(desc),
        Err(e) => fail_handle(error_code(&e)),
    }
}

// ============================================================================
// Session descriptions
// ============================================================================

/// Serialize a description to SDP text.
///
/// # Returns
/// Newly allocated string (release with [`RTCB_FreeString`]), or null for
/// an unknown handle.
#[no_mangle]
pub extern "C" fn RTCB_SerializeSdp(desc: u64) -> *mut c_char {
    match DESCRIPTIONS.get(desc) {
        Some(desc) => string_into_raw(&sdp::serialize(&desc)),
        None => {
            set_error(RTCB_ERROR_HANDLE);
            std::ptr::null_mut()
        }
    }
}

/// The description's negotiation role ("offer", "answer", "pranswer").
///
/// # Returns
/// Newly allocated string (release with [`RTCB_FreeString`]), or null.
#[no_mangle]
pub extern "C" fn RTCB_SdpType(desc: u64) -> *mut c_char {
    match DESCRIPTIONS.get(desc) {
        Some(desc) => string_into_raw(&sdp::type_str(&desc)),
        None => {
            set_error(RTCB_ERROR_HANDLE);
            std::ptr::null_mut()
        }
    }
}

/// Parse SDP text into a description handle.
///
/// # Arguments
/// * `sdp_type` - "offer", "answer" or "pranswer"
/// * `text` - SDP body (null-terminated)
///
/// # Returns
/// Description handle, or 0 on parse failure.
///
/// # Safety
/// Both pointers must be null-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn RTCB_DeserializeSdp(
    sdp_type: *const c_char,
    text: *const c_char,
) -> u64 {
    let (Some(kind), Some(text)) = (string_from_ptr(sdp_type), string_from_ptr(text)) else {
        return fail_handle(RTCB_ERROR_ARGUMENT);
    };
    match sdp::deserialize(&kind, &text) {
        Ok(desc) => DESCRIPTIONS.insert(desc),
        Err(e) => {
            log::warn!("{e}");
            fail_handle(error_code(&e))
        }
    }
}

/// Apply a description as the local end of negotiation. Consumes the
/// description handle on success and failure alike.
#[no_mangle]
pub extern "C" fn RTCB_SetLocalDescription(peer: u64, desc: u64) -> i32 {
    let Some(peer) = PEERS.get(peer) else {
        return fail(RTCB_ERROR_HANDLE);
    };
    let Some(desc) = DESCRIPTIONS.take(desc) else {
        return fail(RTCB_ERROR_HANDLE);
    };
    match peer.set_local_description(desc) {
        Ok(()) => RTCB_OK,
        Err(e) => fail(error_code(&e)),
    }
}

/// Apply a description received from the remote peer. Consumes the
/// description handle on success and failure alike.
#[no_mangle]
pub extern "C" fn RTCB_SetRemoteDescription(peer: u64, desc: u64) -> i32 {
    let Some(peer) = PEERS.get(peer) else {
        return fail(RTCB_ERROR_HANDLE);
    };
    let Some(desc) = DESCRIPTIONS.take(desc) else {
        return fail(RTCB_ERROR_HANDLE);
    };
    match peer.set_remote_description(desc) {
        Ok(()) => RTCB_OK,
        Err(e) => fail(error_code(&e)),
    }
}

/// Release an unapplied description handle.
#[no_mangle]
pub extern "C" fn RTCB_ReleaseDescription(desc: u64) -> i32 {
    if DESCRIPTIONS.remove(desc) {
        RTCB_OK
    } else {
        fail(RTCB_ERROR_HANDLE)
    }
}

// ============================================================================
// ICE and configuration
// ============================================================================

/// Submit a remote ICE candidate.
///
/// # Arguments
/// * `peer` - Peer handle
/// * `sdp_mid` - media section id (null-terminated)
/// * `sdp_mline_index` - media line index
/// * `candidate` - candidate attribute text (null-terminated)
///
/// # Safety
/// String pointers must be null-terminated.
#[no_mangle]
pub unsafe extern "C" fn RTCB_AddIceCandidate(
    peer: u64,
    sdp_mid: *const c_char,
    sdp_mline_index: u32,
    candidate: *const c_char,
) -> i32 {
    let Some(peer) = PEERS.get(peer) else {
        return fail(RTCB_ERROR_HANDLE);
    };
    let Some(candidate_text) = string_from_ptr(candidate) else {
        return fail(RTCB_ERROR_ARGUMENT);
    };
    let candidate = events::IceCandidate {
        sdp_mid: string_from_ptr(sdp_mid).unwrap_or_default(),
        sdp_mline_index: sdp_mline_index as u16,
        candidate: candidate_text,
    };
    match peer.add_ice_candidate(&candidate) {
        Ok(()) => RTCB_OK,
        Err(e) => {
            log::warn!("{e}");
            fail(error_code(&e))
        }
    }
}

/// Current signaling state as a SIGNALING_STATE_* value. Returns -1 for an
/// unknown handle.
#[no_mangle]
pub extern "C" fn RTCB_GetSignalingState(peer: u64) -> i32 {
    match PEERS.get(peer) {
        Some(peer) => events::signaling_state_code(peer.signaling_state()) as i32,
        None => {
            set_error(RTCB_ERROR_HANDLE);
            -1
        }
    }
}

/// Replace a live peer's configuration. On rejection the previous
/// configuration stays in effect.
///
/// # Safety
/// `config` must be null or point to a valid [`ConfigurationFFI`].
#[no_mangle]
pub unsafe extern "C" fn RTCB_SetConfiguration(
    peer: u64,
    config: *const ConfigurationFFI,
) -> i32 {
    let Some(peer) = PEERS.get(peer) else {
        return fail(RTCB_ERROR_HANDLE);
    };
    match peer.set_configuration(configuration_from_ptr(config)) {
        Ok(()) => RTCB_OK,
        Err(e) => {
            log::warn!("{e}");
            fail(error_code(&e))
        }
    }
}

// ============================================================================
// Data channels
// ============================================================================

/// Create a data channel on a peer.
///
/// # Arguments
/// * `peer` - Peer handle
/// * `label` - Channel label (null-terminated)
/// * `options` - Channel options; null for engine defaults
///
/// # Returns
/// Channel handle, or 0 on failure (release with
/// [`RTCB_ReleaseDataChannel`]).
///
/// # Safety
/// `label` must be a null-terminated string; `options` must be null or
/// point to a valid [`DataChannelOptionsFFI`].
#[no_mangle]
pub unsafe extern "C" fn RTCB_CreateDataChannel(
    peer: u64,
    label: *const c_char,
    options: *const DataChannelOptionsFFI,
) -> u64 {
    let Some(peer) = PEERS.get(peer) else {
        return fail_handle(RTCB_ERROR_HANDLE);
    };
    let Some(label) = string_from_ptr(label) else {
        return fail_handle(RTCB_ERROR_ARGUMENT);
    };
    let init = if options.is_null() {
        None
    } else {
        Some((*options).to_init())
    };
    match peer.create_data_channel(&label, init) {
        Ok(channel) => CHANNELS.insert(channel),
        Err(e) => {
            log::warn!("{e}");
            fail_handle(error_code(&e))
        }
    }
}

/// A data channel's label.
///
/// # Returns
/// Newly allocated string (release with [`RTCB_FreeString`]), or null.
#[no_mangle]
pub extern "C" fn RTCB_DataChannelLabel(channel: u64) -> *mut c_char {
    match CHANNELS.get(channel) {
        Some(channel) => string_into_raw(channel.label()),
        None => {
            set_error(RTCB_ERROR_HANDLE);
            std::ptr::null_mut()
        }
    }
}

/// Release a data channel handle. The channel itself stays open for as
/// long as the engine holds it.
#[no_mangle]
pub extern "C" fn RTCB_ReleaseDataChannel(channel: u64) -> i32 {
    if CHANNELS.remove(channel) {
        RTCB_OK
    } else {
        fail(RTCB_ERROR_HANDLE)
    }
}

// ============================================================================
// Errors and memory
// ============================================================================

/// The calling thread's last error code (RTCB_OK if none).
#[no_mangle]
pub extern "C" fn RTCB_LastError() -> i32 {
    ffi::get_error()
}

/// Release a string returned by this library.
///
/// # Safety
/// `ptr` must be null or a pointer previously returned by this library
/// and not yet freed.
#[no_mangle]
pub unsafe extern "C" fn RTCB_FreeString(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// Re-exported for embedders using the rlib directly.
pub use config::{BundlePolicy, Configuration, IceServerConfig, IceTransportPolicy};
pub use error::PeerError;
pub use events::{EventSink, IceCandidate, PeerEvent};
pub use peer::Peer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_invalid_handles_are_rejected() {
        assert_eq!(RTCB_Close(0), RTCB_ERROR_HANDLE);
        assert_eq!(RTCB_ReleasePeer(9999), RTCB_ERROR_HANDLE);
        assert_eq!(RTCB_CreateOffer(9999), INVALID_HANDLE);
        assert_eq!(RTCB_GetSignalingState(9999), -1);
        assert_eq!(RTCB_ReleaseDescription(9999), RTCB_ERROR_HANDLE);
        assert_eq!(RTCB_ReleaseDataChannel(9999), RTCB_ERROR_HANDLE);
        assert_eq!(RTCB_LastError(), RTCB_ERROR_HANDLE);
    }

    #[test]
    fn test_full_negotiation_over_ffi() {
        unsafe {
            let a = RTCB_InitializePeer(std::ptr::null());
            let b = RTCB_InitializePeer(std::ptr::null());
            assert_ne!(a, INVALID_HANDLE);
            assert_ne!(b, INVALID_HANDLE);

            assert_eq!(RTCB_CreatePeerConnection(a, std::ptr::null()), RTCB_OK);
            assert_eq!(RTCB_CreatePeerConnection(b, std::ptr::null()), RTCB_OK);

            let label = CString::new("data").unwrap();
            let channel = RTCB_CreateDataChannel(a, label.as_ptr(), std::ptr::null());
            assert_ne!(channel, INVALID_HANDLE);

            let offer = RTCB_CreateOffer(a);
            assert_ne!(offer, INVALID_HANDLE);

            // Copy the offer over the "wire" as text.
            let offer_text = RTCB_SerializeSdp(offer);
            assert!(!offer_text.is_null());
            let offer_type = CString::new("offer").unwrap();
            let remote_offer = RTCB_DeserializeSdp(offer_type.as_ptr(), offer_text);
            assert_ne!(remote_offer, INVALID_HANDLE);
            RTCB_FreeString(offer_text);

            assert_eq!(RTCB_SetLocalDescription(a, offer), RTCB_OK);
            assert_eq!(RTCB_SetRemoteDescription(b, remote_offer), RTCB_OK);

            let answer = RTCB_CreateAnswer(b);
            assert_ne!(answer, INVALID_HANDLE);
            let answer_text = RTCB_SerializeSdp(answer);
            let answer_type = CString::new("answer").unwrap();
            let remote_answer = RTCB_DeserializeSdp(answer_type.as_ptr(), answer_text);
            assert_ne!(remote_answer, INVALID_HANDLE);
            RTCB_FreeString(answer_text);

            assert_eq!(RTCB_SetLocalDescription(b, answer), RTCB_OK);
            assert_eq!(RTCB_SetRemoteDescription(a, remote_answer), RTCB_OK);

            assert_eq!(
                RTCB_GetSignalingState(a),
                events::SIGNALING_STATE_STABLE as i32
            );
            assert_eq!(
                RTCB_GetSignalingState(b),
                events::SIGNALING_STATE_STABLE as i32
            );

            assert_eq!(RTCB_ReleaseDataChannel(channel), RTCB_OK);
            assert_eq!(RTCB_ReleasePeer(a), RTCB_OK);
            assert_eq!(RTCB_ReleasePeer(b), RTCB_OK);
        }
    }

    #[test]
    fn test_description_handles_are_consumed_on_apply() {
        unsafe {
            let peer = RTCB_InitializePeer(std::ptr::null());
            assert_eq!(RTCB_CreatePeerConnection(peer, std::ptr::null()), RTCB_OK);

            let label = CString::new("consumed").unwrap();
            RTCB_CreateDataChannel(peer, label.as_ptr(), std::ptr::null());

            let offer = RTCB_CreateOffer(peer);
            assert_ne!(offer, INVALID_HANDLE);
            assert_eq!(RTCB_SetLocalDescription(peer, offer), RTCB_OK);

            // The handle was taken by the apply.
            assert_eq!(RTCB_ReleaseDescription(offer), RTCB_ERROR_HANDLE);

            assert_eq!(RTCB_ReleasePeer(peer), RTCB_OK);
        }
    }
}
