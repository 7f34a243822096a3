//! Caller-facing configuration and its translation to engine types.

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;

/// ICE transport policy, FFI-stable values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum IceTransportPolicy {
    /// All candidate types are gathered.
    #[default]
    All = 0,
    /// Only relay (TURN) candidates are gathered.
    Relay = 1,
}

impl IceTransportPolicy {
    /// Map an FFI integer; unknown values fall back to `All`.
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => IceTransportPolicy::Relay,
            _ => IceTransportPolicy::All,
        }
    }

    fn to_rtc(self) -> RTCIceTransportPolicy {
        match self {
            IceTransportPolicy::All => RTCIceTransportPolicy::All,
            IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
        }
    }
}

/// SDP bundle policy, FFI-stable values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum BundlePolicy {
    #[default]
    Balanced = 0,
    MaxCompat = 1,
    MaxBundle = 2,
}

impl BundlePolicy {
    /// Map an FFI integer; unknown values fall back to `Balanced`.
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => BundlePolicy::MaxCompat,
            2 => BundlePolicy::MaxBundle,
            _ => BundlePolicy::Balanced,
        }
    }

    fn to_rtc(self) -> RTCBundlePolicy {
        match self {
            BundlePolicy::Balanced => RTCBundlePolicy::Balanced,
            BundlePolicy::MaxCompat => RTCBundlePolicy::MaxCompat,
            BundlePolicy::MaxBundle => RTCBundlePolicy::MaxBundle,
        }
    }
}

/// ICE server descriptor (STUN or TURN).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// Create a STUN-only server config
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }

    /// Create a TURN server config with credentials
    pub fn turn(url: &str, username: &str, credential: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: Some(username.to_string()),
            credential: Some(credential.to_string()),
        }
    }

    /// Convert to webrtc-rs RTCIceServer
    fn to_rtc_ice_server(&self) -> RTCIceServer {
        RTCIceServer {
            urls: self.urls.clone(),
            username: self.username.clone().unwrap_or_default(),
            credential: self.credential.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Peer connection configuration owned by the caller.
///
/// Replaceable on a live peer; the engine validates the replacement and the
/// cached copy is only updated when the engine accepts it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub ice_servers: Vec<IceServerConfig>,
    pub ice_transport_policy: IceTransportPolicy,
    pub bundle_policy: BundlePolicy,
}

impl Configuration {
    /// Build the engine-side configuration.
    pub(crate) fn to_rtc(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|s| s.to_rtc_ice_server())
                .collect(),
            ice_transport_policy: self.ice_transport_policy.to_rtc(),
            bundle_policy: self.bundle_policy.to_rtc(),
            ..Default::default()
        }
    }
}
