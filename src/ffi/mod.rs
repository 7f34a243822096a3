//! Foreign-boundary support: error codes, marshaling structs and the
//! callback sink.
//!
//! Everything crossing the boundary is either a `u64` handle, an `i32`
//! code, a null-terminated string or a `#[repr(C)]` struct defined here.

use std::cell::Cell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

use webrtc::data_channel::data_channel_init::RTCDataChannelInit;

use crate::config::{BundlePolicy, Configuration, IceServerConfig, IceTransportPolicy};
use crate::error::PeerError;
use crate::events::{signaling_state_code, EventSink, PeerEvent};
use crate::registry::CHANNELS;

// Error codes
pub const RTCB_OK: i32 = 0;
pub const RTCB_ERROR_HANDLE: i32 = 1;
pub const RTCB_ERROR_ARGUMENT: i32 = 2;
pub const RTCB_ERROR_FACTORY: i32 = 3;
pub const RTCB_ERROR_ENGINE: i32 = 4;
pub const RTCB_ERROR_TIMEOUT: i32 = 5;
pub const RTCB_ERROR_GENERATION: i32 = 6;
pub const RTCB_ERROR_APPLY: i32 = 7;
pub const RTCB_ERROR_PARSE: i32 = 8;
pub const RTCB_ERROR_CONFIG: i32 = 9;
pub const RTCB_ERROR_CANDIDATE: i32 = 10;
pub const RTCB_ERROR_BUSY: i32 = 11;
pub const RTCB_ERROR_NOT_OPEN: i32 = 12;

thread_local! {
    static LAST_ERROR: Cell<i32> = const { Cell::new(RTCB_OK) };
}

/// Set the last error code
pub fn set_error(error: i32) {
    LAST_ERROR.with(|e| e.set(error));
}

/// Get the last error code
pub fn get_error() -> i32 {
    LAST_ERROR.with(|e| e.get())
}

/// Map an internal error to its boundary code.
pub fn error_code(error: &PeerError) -> i32 {
    match error {
        PeerError::FactoryCreateFailed(_) => RTCB_ERROR_FACTORY,
        PeerError::EngineCreateFailed(_) => RTCB_ERROR_ENGINE,
        PeerError::GenerationTimeout => RTCB_ERROR_TIMEOUT,
        PeerError::GenerationFailed(_) => RTCB_ERROR_GENERATION,
        PeerError::DescriptionApplyFailed(_) => RTCB_ERROR_APPLY,
        PeerError::ParseError(_) => RTCB_ERROR_PARSE,
        PeerError::ConfigurationRejected(_) => RTCB_ERROR_CONFIG,
        PeerError::CandidateRejected(_) => RTCB_ERROR_CANDIDATE,
        PeerError::GenerationInFlight => RTCB_ERROR_BUSY,
        PeerError::NotConnected => RTCB_ERROR_NOT_OPEN,
    }
}

/// Copy a C string; `None` for null pointers or invalid UTF-8.
///
/// # Safety
/// `ptr` must be null or point to a null-terminated string.
pub unsafe fn string_from_ptr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(str::to_owned)
}

/// Hand a string to the caller; release with the matching free function.
pub fn string_into_raw(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// ICE server descriptor (FFI-safe).
///
/// `username`/`credential` may be null for STUN servers.
#[repr(C)]
pub struct IceServerFFI {
    pub urls: *const *const c_char,
    pub url_count: u32,
    pub username: *const c_char,
    pub credential: *const c_char,
}

impl IceServerFFI {
    /// # Safety
    /// Pointers must satisfy the struct's field contracts.
    pub unsafe fn to_config(&self) -> IceServerConfig {
        let mut urls = Vec::with_capacity(self.url_count as usize);
        if !self.urls.is_null() {
            for i in 0..self.url_count as usize {
                if let Some(url) = string_from_ptr(*self.urls.add(i)) {
                    urls.push(url);
                }
            }
        }
        IceServerConfig {
            urls,
            username: string_from_ptr(self.username),
            credential: string_from_ptr(self.credential),
        }
    }
}

/// Peer configuration (FFI-safe). Policy fields use the stable integer
/// values of [`IceTransportPolicy`] and [`BundlePolicy`].
#[repr(C)]
pub struct ConfigurationFFI {
    pub ice_servers: *const IceServerFFI,
    pub ice_server_count: u32,
    pub ice_transport_policy: u32,
    pub bundle_policy: u32,
}

impl ConfigurationFFI {
    /// # Safety
    /// `ice_servers` must be null or point to `ice_server_count` entries.
    pub unsafe fn to_config(&self) -> Configuration {
        let mut ice_servers = Vec::with_capacity(self.ice_server_count as usize);
        if !self.ice_servers.is_null() {
            for i in 0..self.ice_server_count as usize {
                ice_servers.push((*self.ice_servers.add(i)).to_config());
            }
        }
        Configuration {
            ice_servers,
            ice_transport_policy: IceTransportPolicy::from_u32(self.ice_transport_policy),
            bundle_policy: BundlePolicy::from_u32(self.bundle_policy),
        }
    }
}

/// Data channel options (FFI-safe). `-1` means "unset" for the numeric
/// fields; `protocol` may be null.
#[repr(C)]
pub struct DataChannelOptionsFFI {
    /// Nonzero for ordered delivery (the default).
    pub ordered: u32,
    pub max_packet_lifetime_ms: i32,
    pub max_retransmits: i32,
    pub protocol: *const c_char,
    /// Pre-negotiated channel id, or -1 for in-band negotiation.
    pub negotiated_id: i32,
}

impl DataChannelOptionsFFI {
    /// # Safety
    /// `protocol` must be null or a null-terminated string.
    pub unsafe fn to_init(&self) -> RTCDataChannelInit {
        RTCDataChannelInit {
            ordered: Some(self.ordered != 0),
            max_packet_life_time: u16_or_unset(self.max_packet_lifetime_ms),
            max_retransmits: u16_or_unset(self.max_retransmits),
            protocol: string_from_ptr(self.protocol),
            negotiated: u16_or_unset(self.negotiated_id),
        }
    }
}

fn u16_or_unset(value: i32) -> Option<u16> {
    u16::try_from(value).ok()
}

/// Called on signaling state changes (SIGNALING_STATE_* constants).
pub type SignalingStateCallback = unsafe extern "C" fn(state: u32, user: *mut c_void);

/// Called when the engine wants a renegotiation.
pub type NegotiationNeededCallback = unsafe extern "C" fn(user: *mut c_void);

/// Called per discovered local ICE candidate.
///
/// # Arguments
/// * `candidate` - candidate attribute text (null-terminated)
/// * `sdp_mid` - media section id (null-terminated)
/// * `sdp_mline_index` - media line index
/// * `user` - user data pointer
pub type IceCandidateCallback = unsafe extern "C" fn(
    candidate: *const c_char,
    sdp_mid: *const c_char,
    sdp_mline_index: u32,
    user: *mut c_void,
);

/// Called once local candidate gathering finishes.
pub type IceGatheringCompleteCallback = unsafe extern "C" fn(user: *mut c_void);

/// Called when the remote side opens a data channel. The handle is owned
/// by the callee and must be released.
pub type DataChannelCallback =
    unsafe extern "C" fn(channel: u64, label: *const c_char, user: *mut c_void);

/// Peer event callbacks structure (FFI-safe)
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PeerCallbacks {
    pub on_signaling_state: Option<SignalingStateCallback>,
    pub on_negotiation_needed: Option<NegotiationNeededCallback>,
    pub on_ice_candidate: Option<IceCandidateCallback>,
    pub on_ice_gathering_complete: Option<IceGatheringCompleteCallback>,
    pub on_data_channel: Option<DataChannelCallback>,
    /// User data pointer passed to all callbacks
    pub user_data: *mut c_void,
}

// Safety: Callbacks are function pointers, user_data is opaque
unsafe impl Send for PeerCallbacks {}
unsafe impl Sync for PeerCallbacks {}

impl Default for PeerCallbacks {
    fn default() -> Self {
        Self {
            on_signaling_state: None,
            on_negotiation_needed: None,
            on_ice_candidate: None,
            on_ice_gathering_complete: None,
            on_data_channel: None,
            user_data: std::ptr::null_mut(),
        }
    }
}

/// Event sink that forwards onto the registered C callbacks. Runs on the
/// worker context, so a slow callee never stalls the engine.
pub struct CallbackSink {
    callbacks: PeerCallbacks,
}

impl CallbackSink {
    pub fn new(callbacks: PeerCallbacks) -> Arc<Self> {
        Arc::new(Self { callbacks })
    }
}

impl EventSink for CallbackSink {
    fn on_event(&self, event: PeerEvent) {
        let user = self.callbacks.user_data;
        match event {
            PeerEvent::SignalingStateChanged(state) => {
                if let Some(callback) = self.callbacks.on_signaling_state {
                    unsafe { callback(signaling_state_code(state), user) };
                }
            }
            PeerEvent::NegotiationNeeded => {
                if let Some(callback) = self.callbacks.on_negotiation_needed {
                    unsafe { callback(user) };
                }
            }
            PeerEvent::IceCandidateDiscovered(candidate) => {
                if let Some(callback) = self.callbacks.on_ice_candidate {
                    if let (Ok(text), Ok(mid)) = (
                        CString::new(candidate.candidate),
                        CString::new(candidate.sdp_mid),
                    ) {
                        unsafe {
                            callback(
                                text.as_ptr(),
                                mid.as_ptr(),
                                u32::from(candidate.sdp_mline_index),
                                user,
                            )
                        };
                    }
                }
            }
            PeerEvent::IceGatheringComplete => {
                if let Some(callback) = self.callbacks.on_ice_gathering_complete {
                    unsafe { callback(user) };
                }
            }
            PeerEvent::DataChannelOpened(channel) => {
                if let Some(callback) = self.callbacks.on_data_channel {
                    let label = channel.label().to_owned();
                    let handle = CHANNELS.insert(channel);
                    if let Ok(label) = CString::new(label) {
                        unsafe { callback(handle, label.as_ptr(), user) };
                    }
                }
            }
        }
    }
}
