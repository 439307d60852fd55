//! Media relay frame protocol
//!
//! The telephony provider relays call audio over a websocket as JSON text
//! frames. Inbound frames carry base64 μ-law at 8kHz; outbound frames mirror
//! the same `media` shape and are followed by a `mark` per chunk so the far
//! side can report playback progress.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use call_agent_core::{mulaw, resample};

use crate::PipelineError;

/// Frame received from the telephony media relay
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundFrame {
    Connected,
    Start {
        #[serde(default)]
        stream_id: Option<String>,
        #[serde(default)]
        start: Option<StartInfo>,
    },
    Media {
        media: MediaPayload,
    },
    Mark {
        #[serde(default)]
        mark: Option<MarkInfo>,
    },
    Stop,
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(text).map_err(|e| PipelineError::Protocol(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StartInfo {
    #[serde(default)]
    pub call_control_id: Option<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaFormat {
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaPayload {
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
}

impl MediaPayload {
    /// Audio originated by the caller; untagged frames count as caller audio
    pub fn is_caller_track(&self) -> bool {
        match self.track.as_deref() {
            None => true,
            Some(track) => track.starts_with("inbound"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarkInfo {
    pub name: String,
}

/// Frame sent back to the telephony media relay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundFrame {
    Media { media: OutboundMedia },
    Mark { mark: OutboundMark },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMark {
    pub name: String,
}

impl OutboundFrame {
    pub fn media(payload: String) -> Self {
        OutboundFrame::Media {
            media: OutboundMedia { payload },
        }
    }

    pub fn mark(name: impl Into<String>) -> Self {
        OutboundFrame::Mark {
            mark: OutboundMark { name: name.into() },
        }
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        serde_json::to_string(self).map_err(|e| PipelineError::Protocol(e.to_string()))
    }
}

/// base64 μ-law at `telephony_rate` -> linear PCM at `target_rate`
pub fn decode_inbound_audio(
    payload: &str,
    telephony_rate: u32,
    target_rate: u32,
) -> Result<Vec<i16>, PipelineError> {
    let companded = BASE64
        .decode(payload)
        .map_err(|e| PipelineError::Codec(format!("invalid base64 payload: {}", e)))?;
    let linear = mulaw::expand(&companded);
    Ok(resample(&linear, telephony_rate, target_rate))
}

/// Linear PCM at `source_rate` -> base64 μ-law at `telephony_rate`
pub fn encode_outbound_audio(samples: &[i16], source_rate: u32, telephony_rate: u32) -> String {
    let narrow = resample(samples, source_rate, telephony_rate);
    BASE64.encode(mulaw::compress(&narrow))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_media_frame() {
        let text = r#"{"event":"media","sequence_number":"4","media":{"track":"inbound","chunk":"2","timestamp":"5","payload":"//8="}}"#;
        match InboundFrame::parse(text).unwrap() {
            InboundFrame::Media { media } => {
                assert!(media.is_caller_track());
                assert_eq!(media.payload, "//8=");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_parse_lifecycle_frames() {
        assert_eq!(
            InboundFrame::parse(r#"{"event":"stop","stop":{}}"#).unwrap(),
            InboundFrame::Stop
        );
        assert_eq!(
            InboundFrame::parse(r#"{"event":"connected","version":"1.0.0"}"#).unwrap(),
            InboundFrame::Connected
        );
        assert_eq!(
            InboundFrame::parse(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#).unwrap(),
            InboundFrame::Unknown
        );
        let start = InboundFrame::parse(
            r#"{"event":"start","stream_id":"s1","start":{"call_control_id":"v3:x","media_format":{"encoding":"PCMU","sample_rate":8000}}}"#,
        )
        .unwrap();
        assert!(matches!(start, InboundFrame::Start { stream_id: Some(ref s), .. } if s == "s1"));
        assert!(InboundFrame::parse("not json").is_err());
    }

    #[test]
    fn test_track_filter() {
        let outbound = MediaPayload {
            payload: String::new(),
            track: Some("outbound".to_string()),
        };
        assert!(!outbound.is_caller_track());
        let inbound = MediaPayload {
            payload: String::new(),
            track: Some("inbound_track".to_string()),
        };
        assert!(inbound.is_caller_track());
    }

    #[test]
    fn test_outbound_frames_serialize() {
        let media = OutboundFrame::media("AAAA".to_string()).to_json().unwrap();
        assert_eq!(media, r#"{"event":"media","media":{"payload":"AAAA"}}"#);
        let mark = OutboundFrame::mark("chunk-1").to_json().unwrap();
        assert_eq!(mark, r#"{"event":"mark","mark":{"name":"chunk-1"}}"#);
    }

    #[test]
    fn test_inbound_decode_upsamples() {
        let payload = BASE64.encode(vec![0xFFu8; 160]);
        let pcm = decode_inbound_audio(&payload, 8000, 16000).unwrap();
        assert_eq!(pcm.len(), 320);
        assert!(pcm.iter().all(|&s| s == 0));
        assert!(decode_inbound_audio("%%%", 8000, 16000).is_err());
    }

    #[test]
    fn test_outbound_encode_downsamples() {
        let pcm = vec![1000i16; 480];
        let payload = encode_outbound_audio(&pcm, 24000, 8000);
        let bytes = BASE64.decode(payload).unwrap();
        assert_eq!(bytes.len(), 160);
    }
}
