//! Codec invariants exercised through the public API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use speaker_protocol::core::{BLOCK_SIZE, HEADER_ENCRYPTED, HEADER_PLAINTEXT};
use speaker_protocol::{decode_frame, encode_frame, CipherContext, FrameReader, ProtocolError};
use std::io::Cursor;

const KEY: &[u8] = b"0123456789ABCDEF";
const IV: &[u8] = b"ABCDEF0123456789";

fn cipher() -> CipherContext {
    CipherContext::new(KEY, IV).unwrap()
}

#[test]
fn end_to_end_encrypted_scenario() {
    // AES-128 key and IV from the protocol's reference exchange: 12 bytes
    // of JSON pad to exactly one block.
    let frame = encode_frame(br#"{"cmd":"on"}"#, Some(&cipher())).unwrap();

    assert_eq!(frame.len(), 1 + BLOCK_SIZE);
    assert_eq!(frame[0], HEADER_ENCRYPTED);
    assert_eq!(decode_frame(&frame, Some(&cipher())).unwrap(), br#"{"cmd":"on"}"#);
}

#[test]
fn end_to_end_plaintext_scenario() {
    let mut frame = vec![HEADER_PLAINTEXT];
    frame.extend_from_slice(br#"{"ping":1}"#);

    // No cipher context required for plaintext frames.
    assert_eq!(decode_frame(&frame, None).unwrap(), br#"{"ping":1}"#);
}

#[test]
fn streaming_reader_matches_per_delivery_decode() {
    let frame = encode_frame(br#"{"eq":"bass"}"#, Some(&cipher())).unwrap();

    let mut reader = FrameReader::with_cipher(Cursor::new(frame.clone()), cipher());
    assert_eq!(
        reader.read_frame().unwrap().unwrap(),
        decode_frame(&frame, Some(&cipher())).unwrap()
    );
}

#[test]
fn padding_rejection_is_an_error_not_data() {
    // A zero block is deterministically invalid PKCS#7 under this key/IV.
    let mut frame = vec![HEADER_ENCRYPTED];
    frame.extend_from_slice(&[0u8; BLOCK_SIZE]);

    assert!(matches!(
        decode_frame(&frame, Some(&cipher())).unwrap_err(),
        ProtocolError::InvalidPadding
    ));
}

proptest! {
    // Round-trip: decode(encode(P)) == P for any payload, plaintext path.
    #[test]
    fn prop_plaintext_roundtrip(payload in prop::collection::vec(any::<u8>(), 0..4096)) {
        let frame = encode_frame(&payload, None).unwrap();
        prop_assert_eq!(frame[0], HEADER_PLAINTEXT);
        prop_assert_eq!(decode_frame(&frame, None).unwrap(), payload);
    }
}

proptest! {
    // Round-trip for every AES key size.
    #[test]
    fn prop_encrypted_roundtrip(
        payload in prop::collection::vec(any::<u8>(), 0..2048),
        key_len in prop::sample::select(vec![16usize, 24, 32]),
    ) {
        let key: Vec<u8> = (0..key_len as u8).collect();
        let cipher = CipherContext::new(&key, IV).unwrap();

        let frame = encode_frame(&payload, Some(&cipher)).unwrap();
        prop_assert_eq!(frame[0], HEADER_ENCRYPTED);
        prop_assert_eq!((frame.len() - 1) % BLOCK_SIZE, 0);
        prop_assert!(frame.len() - 1 > payload.len());
        prop_assert_eq!(decode_frame(&frame, Some(&cipher)).unwrap(), payload);
    }
}

proptest! {
    // Any ciphertext that is not a positive multiple of the block size is
    // rejected before the cipher ever runs.
    #[test]
    fn prop_misaligned_ciphertext_rejected(
        mut body in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        if body.len() % BLOCK_SIZE == 0 {
            body.push(0xAB);
        }
        let mut frame = vec![HEADER_ENCRYPTED];
        frame.extend_from_slice(&body);

        prop_assert!(matches!(
            decode_frame(&frame, Some(&cipher())).unwrap_err(),
            ProtocolError::MisalignedCiphertext(_)
        ));
    }
}

proptest! {
    // Unknown header bytes are per-frame decode errors.
    #[test]
    fn prop_unknown_header_rejected(
        header in any::<u8>().prop_filter("known headers", |h| *h != HEADER_PLAINTEXT && *h != HEADER_ENCRYPTED),
        body in prop::collection::vec(any::<u8>(), 0..128),
    ) {
        let mut frame = vec![header];
        frame.extend_from_slice(&body);

        prop_assert!(matches!(
            decode_frame(&frame, Some(&cipher())).unwrap_err(),
            ProtocolError::InvalidHeader(h) if h == header
        ));
    }
}
