//! Wire-frame classification
//!
//! The relay forwards frames verbatim; the only decoding it performs is
//! reading the `type` field to decide whether a frame is eligible for
//! forwarding at all.

use thiserror::Error;

/// Message types the relay is willing to forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardKind {
    Offer,
    Answer,
    Candidate,
}

impl std::fmt::Display for ForwardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardKind::Offer => write!(f, "offer"),
            ForwardKind::Answer => write!(f, "answer"),
            ForwardKind::Candidate => write!(f, "candidate"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("frame is not valid JSON: {0}")]
    Unparseable(#[from] serde_json::Error),
    #[error("frame has no usable \"type\" field")]
    MissingType,
    #[error("unsupported message type \"{0}\"")]
    Unsupported(String),
}

/// Classify a raw text frame by its `type` field.
///
/// No structural validation happens beyond that field; the caller forwards
/// the original frame text on success.
pub fn classify(frame: &str) -> Result<ForwardKind, EnvelopeError> {
    let value: serde_json::Value = serde_json::from_str(frame)?;
    match value.get("type").and_then(|t| t.as_str()) {
        Some("offer") => Ok(ForwardKind::Offer),
        Some("answer") => Ok(ForwardKind::Answer),
        Some("candidate") => Ok(ForwardKind::Candidate),
        Some(other) => Err(EnvelopeError::Unsupported(other.to_string())),
        None => Err(EnvelopeError::MissingType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_forwardable_types() {
        assert_eq!(
            classify(r#"{"type":"offer","sdp":"v=0"}"#).unwrap(),
            ForwardKind::Offer
        );
        assert_eq!(
            classify(r#"{"type":"answer","sdp":"v=0"}"#).unwrap(),
            ForwardKind::Answer
        );
        assert_eq!(
            classify(r#"{"type":"candidate","candidate":"candidate:1"}"#).unwrap(),
            ForwardKind::Candidate
        );
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            classify("not-json"),
            Err(EnvelopeError::Unparseable(_))
        ));
    }

    #[test]
    fn rejects_missing_type() {
        assert!(matches!(
            classify(r#"{"sdp":"v=0"}"#),
            Err(EnvelopeError::MissingType)
        ));
        // a non-string type is as useless as an absent one
        assert!(matches!(
            classify(r#"{"type":42}"#),
            Err(EnvelopeError::MissingType)
        ));
    }

    #[test]
    fn rejects_unsupported_type() {
        match classify(r#"{"type":"hello"}"#) {
            Err(EnvelopeError::Unsupported(t)) => assert_eq!(t, "hello"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn extra_fields_are_not_validated() {
        assert_eq!(
            classify(r#"{"type":"offer","sdp":"v=0","anything":{"goes":true}}"#).unwrap(),
            ForwardKind::Offer
        );
    }
}
