use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid task payload: {source}")]
pub struct DecodeError {
    /// Identifier salvaged from the payload, when one was present and well-typed.
    pub video_id: Option<i64>,
    #[source]
    pub source: serde_json::Error,
}

/// One unit of work: a video and the directory holding its chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTask {
    pub video_id: i64,
    pub path: PathBuf,
}

pub fn parse_task(payload: &[u8]) -> Result<VideoTask, DecodeError> {
    serde_json::from_slice(payload).map_err(|source| DecodeError {
        video_id: recover_video_id(payload),
        source,
    })
}

fn recover_video_id(payload: &[u8]) -> Option<i64> {
    serde_json::from_slice::<Value>(payload)
        .ok()?
        .get("video_id")?
        .as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_payload() {
        let task = parse_task(br#"{"video_id": 1, "path": "/media/uploads/1"}"#).unwrap();
        assert_eq!(
            task,
            VideoTask {
                video_id: 1,
                path: PathBuf::from("/media/uploads/1"),
            }
        );
    }

    #[test]
    fn ignores_unknown_fields() {
        let task =
            parse_task(br#"{"video_id": 3, "path": "/tmp/3", "uploaded_by": "alice"}"#).unwrap();
        assert_eq!(task.video_id, 3);
    }

    #[test]
    fn missing_path_keeps_video_id() {
        let err = parse_task(br#"{"video_id": 42}"#).unwrap_err();
        assert_eq!(err.video_id, Some(42));
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn mistyped_video_id_is_not_recovered() {
        let err = parse_task(br#"{"video_id": "42", "path": "/tmp/42"}"#).unwrap_err();
        assert_eq!(err.video_id, None);
    }

    #[test]
    fn garbage_payload_has_no_identity() {
        let err = parse_task(b"\x00\x01not json").unwrap_err();
        assert_eq!(err.video_id, None);
    }
}
