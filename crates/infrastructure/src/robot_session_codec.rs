//! Wire codec for the robot session websocket, grounded on the teacher's
//! `error.rs` convention of mapping everything through `AppError` before it
//! reaches a transport boundary.
//!
//! Frames are carried as `axum::extract::ws::Message::Text` websocket text
//! frames, each holding the direct `serde_json` tagged-enum serialization of
//! a `RobotFrame`. No additional envelope (version byte, length prefix) is
//! layered on top: the tagged `type` field is itself the discriminator, and
//! the session is versioned at the HTTP upgrade route rather than per frame.

use axum::extract::ws::Message;
use casare_application::RobotFrame;
use casare_core::{AppError, AppResult};

/// Serializes a frame to the websocket message that carries it.
pub fn encode_frame(frame: &RobotFrame) -> AppResult<Message> {
    let payload = serde_json::to_string(frame)
        .map_err(|error| AppError::Internal(format!("failed to encode robot frame: {error}")))?;
    Ok(Message::Text(payload.into()))
}

/// Decodes an inbound websocket message into a frame.
///
/// Returns `Ok(None)` for messages that carry no application frame (ping,
/// pong, binary, close) rather than erroring, since these are ordinary
/// websocket protocol traffic the caller should simply ignore.
pub fn decode_frame(message: &Message) -> AppResult<Option<RobotFrame>> {
    match message {
        Message::Text(text) => {
            let frame = serde_json::from_str(text.as_str()).map_err(|error| {
                AppError::Validation(format!("malformed robot frame: {error}"))
            })?;
            Ok(Some(frame))
        }
        Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Close(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_frame, encode_frame};
    use casare_application::RobotFrame;
    use casare_domain::RobotId;

    #[test]
    fn round_trips_a_frame_through_the_wire_encoding() {
        let frame = RobotFrame::RegisterAck { robot_id: RobotId::new() };
        let message = encode_frame(&frame).expect("encodes");
        let decoded = decode_frame(&message).expect("decodes").expect("is a frame");
        assert_eq!(frame, decoded);
    }

    #[test]
    fn rejects_malformed_text_frames() {
        let message = axum::extract::ws::Message::Text("not json".into());
        assert!(decode_frame(&message).is_err());
    }

    #[test]
    fn ignores_non_text_protocol_frames() {
        let message = axum::extract::ws::Message::Ping(Vec::new().into());
        assert!(decode_frame(&message).expect("no error").is_none());
    }
}
