//! AES-CBC cipher context for encrypted frames.
//!
//! The key and IV are fixed for the lifetime of a connection and are always
//! caller-supplied; key length selects the AES variant (16/24/32 bytes →
//! AES-128/192/256). Each frame is processed by a fresh CBC instance
//! initialized from the static IV, so every message decrypts standalone —
//! the same property the offline capture tool relies on when it replays
//! packets out of context.

use crate::error::{ProtocolError, Result};
use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::fmt;
use zeroize::Zeroizing;

/// AES block size in bytes; encrypted payloads are always a positive
/// multiple of this.
pub const BLOCK_SIZE: usize = 16;

/// Key plus initialization vector for one connection.
///
/// Encrypt and decrypt never share running state: every call constructs its
/// own block-mode instance, and the writer/reader sides each hold their own
/// clone of this context.
#[derive(Clone)]
pub struct CipherContext {
    key: Zeroizing<Vec<u8>>,
    iv: [u8; BLOCK_SIZE],
}

impl CipherContext {
    /// Build a cipher context, validating key and IV lengths.
    ///
    /// # Errors
    /// `InvalidKeyLength` unless the key is 16, 24 or 32 bytes;
    /// `InvalidIvLength` unless the IV is exactly 16 bytes.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        if !matches!(key.len(), 16 | 24 | 32) {
            return Err(ProtocolError::InvalidKeyLength(key.len()));
        }

        let iv: [u8; BLOCK_SIZE] = iv
            .try_into()
            .map_err(|_| ProtocolError::InvalidIvLength(iv.len()))?;

        Ok(Self {
            key: Zeroizing::new(key.to_vec()),
            iv,
        })
    }

    /// Key length in bytes (16, 24 or 32).
    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    /// PKCS#7-pad and CBC-encrypt one payload.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self.key.len() {
            16 => self.encrypt_with::<cbc::Encryptor<Aes128>>(plaintext),
            24 => self.encrypt_with::<cbc::Encryptor<Aes192>>(plaintext),
            32 => self.encrypt_with::<cbc::Encryptor<Aes256>>(plaintext),
            n => Err(ProtocolError::InvalidKeyLength(n)),
        }
    }

    /// CBC-decrypt one payload and validate/strip the PKCS#7 padding.
    ///
    /// # Errors
    /// `MisalignedCiphertext` unless the input is a positive multiple of the
    /// block size; `InvalidPadding` when the final block does not carry
    /// valid PKCS#7 padding.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(ProtocolError::MisalignedCiphertext(ciphertext.len()));
        }

        match self.key.len() {
            16 => self.decrypt_with::<cbc::Decryptor<Aes128>>(ciphertext),
            24 => self.decrypt_with::<cbc::Decryptor<Aes192>>(ciphertext),
            32 => self.decrypt_with::<cbc::Decryptor<Aes256>>(ciphertext),
            n => Err(ProtocolError::InvalidKeyLength(n)),
        }
    }

    fn encrypt_with<C>(&self, plaintext: &[u8]) -> Result<Vec<u8>>
    where
        C: KeyIvInit + BlockEncryptMut,
    {
        let enc = C::new_from_slices(&self.key, &self.iv)
            .map_err(|_| ProtocolError::InvalidKeyLength(self.key.len()))?;
        Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    fn decrypt_with<C>(&self, ciphertext: &[u8]) -> Result<Vec<u8>>
    where
        C: KeyIvInit + BlockDecryptMut,
    {
        let dec = C::new_from_slices(&self.key, &self.iv)
            .map_err(|_| ProtocolError::InvalidKeyLength(self.key.len()))?;
        dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| ProtocolError::InvalidPadding)
    }
}

// Key material stays out of logs.
impl fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherContext")
            .field("key_len", &self.key.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789ABCDEF";
    const IV: &[u8] = b"ABCDEF0123456789";

    #[test]
    fn test_known_answer_aes128() {
        // {"cmd":"on"} is 12 bytes; PKCS#7 pads it to one 16-byte block.
        let cipher = CipherContext::new(KEY, IV).unwrap();
        let ct = cipher.encrypt(br#"{"cmd":"on"}"#).unwrap();
        assert_eq!(
            ct,
            [
                0x13, 0xF5, 0xE3, 0x79, 0x53, 0xB2, 0x67, 0x2C, 0x19, 0x2F, 0x7E, 0x00, 0x9A,
                0x1A, 0x1C, 0x5B,
            ]
        );
        assert_eq!(cipher.decrypt(&ct).unwrap(), br#"{"cmd":"on"}"#);
    }

    #[test]
    fn test_roundtrip_all_key_sizes() {
        let iv = b"ABCDEF0123456789";
        for key in [
            &b"0123456789ABCDEF"[..],
            &b"0123456789ABCDEF01234567"[..],
            &b"0123456789ABCDEF0123456789ABCDEF"[..],
        ] {
            let cipher = CipherContext::new(key, iv).unwrap();
            let plaintext = br#"{"volume":{"level":42}}"#;
            let ct = cipher.encrypt(plaintext).unwrap();
            assert_eq!(ct.len() % BLOCK_SIZE, 0);
            assert!(ct.len() > plaintext.len());
            assert_eq!(cipher.decrypt(&ct).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_empty_plaintext_pads_to_one_block() {
        let cipher = CipherContext::new(KEY, IV).unwrap();
        let ct = cipher.encrypt(b"").unwrap();
        assert_eq!(ct.len(), BLOCK_SIZE);
        assert_eq!(cipher.decrypt(&ct).unwrap(), b"");
    }

    #[test]
    fn test_block_boundary_plaintext_gains_full_padding_block() {
        let cipher = CipherContext::new(KEY, IV).unwrap();
        let plaintext = [0x41u8; 32];
        let ct = cipher.encrypt(&plaintext).unwrap();
        assert_eq!(ct.len(), 48);
        assert_eq!(cipher.decrypt(&ct).unwrap(), plaintext);
    }

    #[test]
    fn test_misaligned_ciphertext_rejected() {
        let cipher = CipherContext::new(KEY, IV).unwrap();
        for len in [1, 15, 17, 31] {
            let err = cipher.decrypt(&vec![0u8; len]).unwrap_err();
            assert!(matches!(err, ProtocolError::MisalignedCiphertext(n) if n == len));
        }
    }

    #[test]
    fn test_empty_ciphertext_rejected() {
        let cipher = CipherContext::new(KEY, IV).unwrap();
        assert!(matches!(
            cipher.decrypt(b"").unwrap_err(),
            ProtocolError::MisalignedCiphertext(0)
        ));
    }

    #[test]
    fn test_invalid_padding_rejected() {
        // A zero block under this key/IV decrypts to a final byte of 0xA7,
        // which can never be valid PKCS#7 padding.
        let cipher = CipherContext::new(KEY, IV).unwrap();
        assert!(matches!(
            cipher.decrypt(&[0u8; BLOCK_SIZE]).unwrap_err(),
            ProtocolError::InvalidPadding
        ));
    }

    #[test]
    fn test_bad_key_lengths_rejected() {
        for len in [0, 8, 15, 17, 33, 64] {
            let err = CipherContext::new(&vec![0u8; len], IV).unwrap_err();
            assert!(matches!(err, ProtocolError::InvalidKeyLength(n) if n == len));
        }
    }

    #[test]
    fn test_bad_iv_length_rejected() {
        let err = CipherContext::new(KEY, b"short").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidIvLength(5)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let cipher = CipherContext::new(KEY, IV).unwrap();
        let rendered = format!("{cipher:?}");
        assert!(!rendered.contains("0123456789ABCDEF"));
        assert!(rendered.contains("key_len"));
    }
}
