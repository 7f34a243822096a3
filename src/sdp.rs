//! Session description codec seam.
//!
//! SDP text parsing and serialization are owned by the engine; this module
//! only selects the typed constructor and maps errors.

use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::error::PeerError;

/// Parse serialized SDP text into a typed engine description.
///
/// `kind` is the negotiation role: "offer", "answer" or "pranswer".
pub fn deserialize(kind: &str, text: &str) -> Result<RTCSessionDescription, PeerError> {
    let result = match kind {
        "offer" => RTCSessionDescription::offer(text.to_string()),
        "answer" => RTCSessionDescription::answer(text.to_string()),
        "pranswer" => RTCSessionDescription::pranswer(text.to_string()),
        other => {
            return Err(PeerError::ParseError(format!(
                "unknown description type '{other}'"
            )))
        }
    };
    result.map_err(|e| PeerError::ParseError(format!("invalid {kind} SDP: {e}")))
}

/// Serialize a description back to SDP text.
pub fn serialize(desc: &RTCSessionDescription) -> String {
    desc.sdp.clone()
}

/// The description type as its wire string ("offer", "answer", ...).
pub fn type_str(desc: &RTCSessionDescription) -> String {
    desc.sdp_type.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER_SDP: &str = "v=0\r\n\
        o=- 862074658506459623 2 IN IP4 127.0.0.1\r\n\
        s=-\r\n\
        t=0 0\r\n\
        a=group:BUNDLE 0\r\n\
        m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
        c=IN IP4 0.0.0.0\r\n\
        a=ice-ufrag:yxYb\r\n\
        a=ice-pwd:05iMxO9GujD2fUWXSoi0ByNd\r\n\
        a=fingerprint:sha-256 F2:25:D6:25:D6:8F:76:E4:72:1B:03:E2:6A:8F:77:92:EC:04:1F:0A:12:C6:B8:E3:B0:52:23:27:7E:9F:22:A2\r\n\
        a=setup:actpass\r\n\
        a=mid:0\r\n\
        a=sctp-port:5000\r\n\
        a=candidate:1966762133 1 udp 2122260223 192.168.1.20 47299 typ host\r\n";

    #[test]
    fn test_round_trip_preserves_body() {
        let desc = deserialize("offer", OFFER_SDP).unwrap();
        let text = serialize(&desc);
        assert_eq!(text, OFFER_SDP);

        let again = deserialize("offer", &text).unwrap();
        assert_eq!(serialize(&again), OFFER_SDP);
        assert_eq!(type_str(&again), "offer");
    }

    #[test]
    fn test_malformed_sdp_is_parse_error() {
        let err = deserialize("offer", "this is not sdp").unwrap_err();
        assert!(matches!(err, PeerError::ParseError(_)));
    }

    #[test]
    fn test_unknown_type_is_parse_error() {
        let err = deserialize("statement", OFFER_SDP).unwrap_err();
        assert!(matches!(err, PeerError::ParseError(_)));
    }
}
