use std::collections::HashMap;

use serde::Deserialize;

/// Twilio Media Stream WebSocket event types.
#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
#[serde(rename_all = "lowercase")]
#[allow(dead_code)]
pub enum StreamEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    Start {
        /// Duplicate of `start.streamSid`; not every sender includes it.
        #[serde(default, rename = "streamSid")]
        stream_sid: Option<String>,
        start: StartMetadata,
    },
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },
    Dtmf {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        dtmf: DtmfPayload,
    },
    Stop {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Connected { .. } => "connected",
            StreamEvent::Start { .. } => "start",
            StreamEvent::Media { .. } => "media",
            StreamEvent::Mark { .. } => "mark",
            StreamEvent::Dtmf { .. } => "dtmf",
            StreamEvent::Stop { .. } => "stop",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct StartMetadata {
    pub stream_sid: String,
    pub call_sid: String,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
    /// `<Parameter>` values from the TwiML `<Stream>` element.
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channels: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    pub payload: String, // base64-encoded mu-law audio
}

#[derive(Debug, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DtmfPayload {
    pub digit: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_event() {
        let event: StreamEvent = serde_json::from_str(
            r#"{
                "event": "start",
                "sequenceNumber": "1",
                "start": {
                    "accountSid": "AC1",
                    "streamSid": "MZ1",
                    "callSid": "CA1",
                    "tracks": ["inbound"],
                    "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1},
                    "customParameters": {"lang": "en"}
                },
                "streamSid": "MZ1"
            }"#,
        )
        .unwrap();

        let StreamEvent::Start { stream_sid, start } = event else {
            panic!("expected start event");
        };
        assert_eq!(stream_sid.as_deref(), Some("MZ1"));
        assert_eq!(start.call_sid, "CA1");
        assert_eq!(start.tracks, vec!["inbound"]);
        assert_eq!(start.media_format.unwrap().sample_rate, Some(8000));
        assert_eq!(start.custom_parameters.get("lang").map(String::as_str), Some("en"));
    }

    #[test]
    fn start_ids_come_from_start_object() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"event":"start","start":{"streamSid":"MZ1","callSid":"CA1"}}"#,
        )
        .unwrap();

        let StreamEvent::Start { stream_sid, start } = event else {
            panic!("expected start event");
        };
        assert!(stream_sid.is_none());
        assert_eq!(start.stream_sid, "MZ1");
        assert_eq!(start.call_sid, "CA1");
    }

    #[test]
    fn parses_dtmf_and_mark() {
        let dtmf: StreamEvent = serde_json::from_str(
            r#"{
                "event": "dtmf",
                "streamSid": "MZ1",
                "sequenceNumber": "5",
                "dtmf": {"track": "inbound_track", "digit": "7"}
            }"#,
        )
        .unwrap();
        assert!(matches!(dtmf, StreamEvent::Dtmf { ref dtmf, .. } if dtmf.digit == "7"));

        let mark: StreamEvent = serde_json::from_str(
            r#"{"event":"mark","streamSid":"MZ1","sequenceNumber":"6","mark":{"name":"dtmf-7"}}"#,
        )
        .unwrap();
        assert_eq!(mark.name(), "mark");
    }

    #[test]
    fn rejects_unknown_event() {
        assert!(serde_json::from_str::<StreamEvent>(r#"{"event":"bogus"}"#).is_err());
    }
}
