//! Tests for the signaling wire format and negotiation routing

use super::signaling::{classify_signal, SignalAction};
use super::types::*;

#[test]
fn offer_round_trips_on_type_and_sdp() {
    let offer = SignalingMessage::Offer {
        sdp: "v=0\r\no=- 123 456 IN IP4 127.0.0.1\r\n".to_string(),
    };
    let json = offer.encode().unwrap();
    assert!(json.contains("\"type\":\"offer\""));

    let parsed = SignalingMessage::decode(&json).unwrap();
    assert_eq!(parsed.kind(), MessageKind::Offer);
    assert_eq!(parsed, offer);
}

#[test]
fn answer_round_trips_on_type_and_sdp() {
    let answer = SignalingMessage::Answer {
        sdp: "v=0\r\no=- 789 101 IN IP4 127.0.0.1\r\n".to_string(),
    };
    let json = answer.encode().unwrap();
    assert!(json.contains("\"type\":\"answer\""));

    let parsed = SignalingMessage::decode(&json).unwrap();
    assert_eq!(parsed, answer);
}

#[test]
fn candidate_uses_browser_field_names() {
    let msg = SignalingMessage::Candidate {
        candidate: "candidate:1 1 UDP 2130706431 192.168.1.1 54321 typ host".to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    };
    let json = msg.encode().unwrap();
    assert!(json.contains("\"type\":\"candidate\""));
    assert!(json.contains("\"sdpMid\":\"0\""));
    assert!(json.contains("\"sdpMLineIndex\":0"));
    assert!(!json.contains("usernameFragment"));

    assert_eq!(SignalingMessage::decode(&json).unwrap(), msg);
}

#[test]
fn candidate_optional_fields_may_be_absent() {
    let parsed =
        SignalingMessage::decode(r#"{"type":"candidate","candidate":"candidate:1"}"#).unwrap();
    match parsed {
        SignalingMessage::Candidate {
            candidate,
            sdp_mid,
            sdp_mline_index,
            ..
        } => {
            assert_eq!(candidate, "candidate:1");
            assert!(sdp_mid.is_none());
            assert!(sdp_mline_index.is_none());
        }
        other => panic!("expected candidate, got {:?}", other),
    }
}

#[test]
fn decode_rejects_missing_type() {
    assert!(SignalingMessage::decode(r#"{"sdp":"v=0"}"#).is_err());
}

#[test]
fn decode_rejects_unknown_type() {
    assert!(SignalingMessage::decode(r#"{"type":"hello","sdp":"v=0"}"#).is_err());
}

#[test]
fn decode_rejects_non_json() {
    assert!(SignalingMessage::decode("not-json").is_err());
}

#[test]
fn answer_before_offer_is_not_accepted() {
    // the offerer has not sent its offer yet
    assert_eq!(
        classify_signal(
            Role::Offerer,
            SessionState::SignalingConnected,
            MessageKind::Answer
        ),
        SignalAction::Ignore
    );
}

#[test]
fn answer_pairs_only_with_an_outstanding_offer() {
    assert_eq!(
        classify_signal(Role::Offerer, SessionState::Offering, MessageKind::Answer),
        SignalAction::ApplyAnswer
    );
    assert_eq!(
        classify_signal(
            Role::Offerer,
            SessionState::DescriptionExchanged,
            MessageKind::Answer
        ),
        SignalAction::Ignore
    );
    assert_eq!(
        classify_signal(Role::Answerer, SessionState::Answering, MessageKind::Answer),
        SignalAction::Ignore
    );
}

#[test]
fn offer_routes_by_role() {
    assert_eq!(
        classify_signal(Role::Answerer, SessionState::Answering, MessageKind::Offer),
        SignalAction::ApplyOffer
    );
    // two offerers in one session cannot negotiate
    assert_eq!(
        classify_signal(Role::Offerer, SessionState::Offering, MessageKind::Offer),
        SignalAction::Reject
    );
    // a second offer after negotiation is stale traffic, not a failure
    assert_eq!(
        classify_signal(
            Role::Answerer,
            SessionState::DescriptionExchanged,
            MessageKind::Offer
        ),
        SignalAction::Ignore
    );
}

#[test]
fn candidates_apply_until_the_session_ends() {
    assert_eq!(
        classify_signal(Role::Offerer, SessionState::Offering, MessageKind::Candidate),
        SignalAction::ApplyCandidate
    );
    assert_eq!(
        classify_signal(
            Role::Answerer,
            SessionState::TrackAndChannelActive,
            MessageKind::Candidate
        ),
        SignalAction::ApplyCandidate
    );
    assert_eq!(
        classify_signal(Role::Offerer, SessionState::Failed, MessageKind::Candidate),
        SignalAction::Ignore
    );
}

#[test]
fn session_config_defaults() {
    let config = SessionConfig::default();
    assert!(config.relay_url.starts_with("ws://"));
    assert!(!config.stun_servers.is_empty());
    assert!(config.heartbeat_interval_ms < config.channel_wait_ms);
    assert!(config.max_buffered_bytes > 0);
}

#[test]
fn display_names() {
    assert_eq!(Role::Offerer.to_string(), "offerer");
    assert_eq!(Role::Answerer.to_string(), "answerer");
    assert_eq!(SessionState::TrackAndChannelActive.to_string(), "track-and-channel-active");
    assert_eq!(MessageKind::Candidate.to_string(), "candidate");
}
