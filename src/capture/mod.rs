//! # Capture Replay
//!
//! Offline analysis: feed previously captured traffic through the same
//! decode path the live client uses.
//!
//! Each captured TCP segment is treated as one transport delivery and
//! decoded as one frame with a caller-supplied key/IV. Captures are
//! untrusted mixed traffic, so per-packet decode failures are skipped, not
//! fatal; only a malformed capture file itself aborts the replay.

pub mod pcap;

use crate::core::cipher::CipherContext;
use crate::core::framer::decode_frame;
use crate::error::{ProtocolError, Result};
use serde_json::Value;
use std::io::Read;
use tracing::{debug, info};

pub use pcap::{tcp_payload, PcapReader};

/// Counters for one replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Records read from the capture.
    pub packets: u64,
    /// Frames decoded to JSON and emitted.
    pub decoded: u64,
    /// TCP payloads that failed frame or JSON decoding.
    pub skipped: u64,
}

/// Replay a capture, emitting every decoded JSON payload.
///
/// # Errors
/// Only capture-level failures (bad magic, truncated records) are returned;
/// decode failures for individual packets increment `skipped` and the
/// replay continues.
pub fn decode_capture<R, F>(
    input: R,
    cipher: Option<&CipherContext>,
    mut emit: F,
) -> Result<CaptureSummary>
where
    R: Read,
    F: FnMut(&Value),
{
    let mut reader = PcapReader::new(input)?;
    let linktype = reader.linktype();
    let mut summary = CaptureSummary::default();

    while let Some(record) = reader.next_record()? {
        summary.packets += 1;

        let Some(payload) = tcp_payload(linktype, &record.data) else {
            continue;
        };

        let decoded = decode_frame(payload, cipher)
            .and_then(|plain| serde_json::from_slice::<Value>(&plain).map_err(ProtocolError::from));

        match decoded {
            Ok(value) => {
                emit(&value);
                summary.decoded += 1;
            }
            Err(e) => {
                summary.skipped += 1;
                debug!(error = %e, packet = summary.packets, "skipping undecodable packet");
            }
        }
    }

    info!(
        packets = summary.packets,
        decoded = summary.decoded,
        skipped = summary.skipped,
        "capture replay finished"
    );
    Ok(summary)
}


#[cfg(test)]
mod tests {
    use super::testutil::{ipv4_tcp_packet, pcap_bytes};
    use super::*;
    use crate::core::framer::encode_frame;

    fn cipher() -> CipherContext {
        CipherContext::new(b"0123456789ABCDEF", b"ABCDEF0123456789").unwrap()
    }

    #[test]
    fn test_replay_decodes_protocol_frames() {
        let frames = [
            encode_frame(br#"{"cmd":"on"}"#, Some(&cipher())).unwrap(),
            encode_frame(br#"{"ping":1}"#, None).unwrap(),
        ];
        let packets: Vec<Vec<u8>> = frames.iter().map(|f| ipv4_tcp_packet(f)).collect();
        let capture = pcap_bytes(true, pcap::LINKTYPE_ETHERNET, &packets);

        let mut values = Vec::new();
        let summary =
            decode_capture(&capture[..], Some(&cipher()), |v| values.push(v.clone())).unwrap();

        assert_eq!(summary.packets, 2);
        assert_eq!(summary.decoded, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(values[0], serde_json::json!({"cmd": "on"}));
        assert_eq!(values[1], serde_json::json!({"ping": 1}));
    }

    #[test]
    fn test_replay_skips_unrelated_traffic() {
        let packets = vec![
            ipv4_tcp_packet(b"GET / HTTP/1.1\r\n\r\n"),
            ipv4_tcp_packet(&encode_frame(br#"{"cmd":"on"}"#, Some(&cipher())).unwrap()),
            ipv4_tcp_packet(&[0x10, 0xDE, 0xAD]), // misaligned ciphertext
        ];
        let capture = pcap_bytes(true, pcap::LINKTYPE_ETHERNET, &packets);

        let mut values = Vec::new();
        let summary =
            decode_capture(&capture[..], Some(&cipher()), |v| values.push(v.clone())).unwrap();

        assert_eq!(summary.packets, 3);
        assert_eq!(summary.decoded, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(values, [serde_json::json!({"cmd": "on"})]);
    }

    #[test]
    fn test_replay_without_cipher_reads_plaintext_only() {
        let packets = vec![
            ipv4_tcp_packet(&encode_frame(br#"{"ping":1}"#, None).unwrap()),
            ipv4_tcp_packet(&encode_frame(br#"{"cmd":"on"}"#, Some(&cipher())).unwrap()),
        ];
        let capture = pcap_bytes(true, pcap::LINKTYPE_ETHERNET, &packets);

        let summary = decode_capture(&capture[..], None, |_| {}).unwrap();
        assert_eq!(summary.decoded, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_replay_fails_on_malformed_capture() {
        assert!(decode_capture(&b"garbage"[..], None, |_| {}).is_err());
    }
}
