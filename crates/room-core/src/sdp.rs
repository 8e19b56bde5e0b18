//! Label extraction from session descriptions
//!
//! The conference bridge labels every forwarded media section with the call
//! id of the participant it carries (`a=label:`), and the section's
//! `a=msid:<stream> <track>` names the track the phone will later report
//! the remote video under.

/// Correlation between a participant call id and a remote track id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMapping {
    pub label: String,
    pub stream_id: String,
}

#[derive(Default)]
struct Section {
    label: Option<String>,
    msid: Option<String>,
}

impl Section {
    fn into_mapping(self) -> Option<LabelMapping> {
        let label = self.label?;
        // `msid:<stream id> <track id>`
        let stream_id = self.msid?.split_whitespace().nth(1)?.to_string();
        Some(LabelMapping { label, stream_id })
    }
}

/// Every labelled media section that carries an msid with a track part
pub fn parse_label_mappings(sdp: &str) -> Vec<LabelMapping> {
    let mut mappings = Vec::new();
    let mut section: Option<Section> = None;

    for line in sdp.lines().map(str::trim) {
        if line.starts_with("m=") {
            if let Some(done) = section.replace(Section::default()) {
                mappings.extend(done.into_mapping());
            }
            continue;
        }
        let Some(current) = section.as_mut() else {
            // Session level attributes
            continue;
        };
        if let Some(label) = line.strip_prefix("a=label:") {
            current.label = Some(label.trim().to_string());
        } else if let Some(msid) = line.strip_prefix("a=msid:") {
            current.msid = Some(msid.trim().to_string());
        }
    }

    if let Some(done) = section {
        mappings.extend(done.into_mapping());
    }
    mappings
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
o=- 1 2 IN IP4 10.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=msid-semantic: WMS\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=mid:0\r\n\
a=msid:room-audio room-audio-track\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
a=mid:1\r\n\
a=label:call-42\r\n\
a=msid:{stream-a} track-a\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
a=mid:2\r\n\
a=label:call-43\r\n\
a=msid:stream-b track-b\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
a=mid:3\r\n\
a=label:call-44\r\n";

    #[test]
    fn maps_labels_to_track_ids() {
        let mappings = parse_label_mappings(OFFER);
        assert_eq!(
            mappings,
            vec![
                LabelMapping {
                    label: "call-42".to_string(),
                    stream_id: "track-a".to_string(),
                },
                LabelMapping {
                    label: "call-43".to_string(),
                    stream_id: "track-b".to_string(),
                },
            ]
        );
    }

    #[test]
    fn ignores_garbage() {
        assert!(parse_label_mappings("").is_empty());
        assert!(parse_label_mappings("a=label:x\na=msid:s t\n").is_empty());
        assert!(parse_label_mappings("m=video 9 RTP/AVP 96\na=label:x\na=msid:only-stream\n").is_empty());
    }
}
