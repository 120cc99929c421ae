//! Envelope crypto: base64 transport encoding around AES-128-CBC with PKCS#7 padding.

use aes::Aes128;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use std::{fmt, string::FromUtf8Error};
use thiserror::Error;

use crate::dto::Envelope;

pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 16;

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("AES-128 key must be 16 bytes, got {0}")]
    Length(usize),

    #[error("AES key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Pre-shared AES-128 key, loaded once at startup and shared by every request.
#[derive(Clone)]
pub struct SharedKey([u8; KEY_SIZE]);

impl SharedKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let key: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| KeyError::Length(bytes.len()))?;
        Ok(Self(key))
    }

    pub fn from_hex(encoded: &str) -> Result<Self, KeyError> {
        Self::from_bytes(&hex::decode(encoded.trim())?)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

// Keep key material out of logs and panic messages.
impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{field} is not valid base64: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("IV must be exactly 16 bytes, got {0}")]
    IvLength(usize),

    #[error("ciphertext length {0} is not a positive multiple of 16")]
    CiphertextLength(usize),

    #[error("invalid PKCS#7 padding")]
    Padding,

    #[error("plaintext is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

impl CodecError {
    /// True when the failure happened before any cryptography ran.
    pub fn is_transport_encoding(&self) -> bool {
        matches!(self, CodecError::Base64 { .. })
    }
}

/// Decode a base64 ciphertext and IV and decrypt them into UTF-8 plaintext.
pub fn decode(payload_b64: &str, iv_b64: &str, key: &SharedKey) -> Result<String, CodecError> {
    let ciphertext = decode_base64("payload", payload_b64)?;
    let iv = decode_base64("iv", iv_b64)?;
    let plain = decrypt(&ciphertext, &iv, key)?;

    Ok(String::from_utf8(plain)?)
}

pub fn decrypt(ciphertext: &[u8], iv: &[u8], key: &SharedKey) -> Result<Vec<u8>, CodecError> {
    if iv.len() != BLOCK_SIZE {
        return Err(CodecError::IvLength(iv.len()));
    }
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CodecError::CiphertextLength(ciphertext.len()));
    }

    Aes128CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|_| CodecError::IvLength(iv.len()))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CodecError::Padding)
}

pub fn encrypt(plaintext: &[u8], iv: &[u8; BLOCK_SIZE], key: &SharedKey) -> Vec<u8> {
    Aes128CbcEnc::new(key.as_bytes().into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Encrypt `plaintext` under a fresh random IV the way a tracker does before posting it.
pub fn seal(plaintext: &str, key: &SharedKey) -> Envelope {
    let mut iv = [0u8; BLOCK_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = encrypt(plaintext.as_bytes(), &iv, key);

    Envelope {
        payload: BASE64_STANDARD.encode(ciphertext),
        iv: BASE64_STANDARD.encode(iv),
    }
}

fn decode_base64(field: &'static str, encoded: &str) -> Result<Vec<u8>, CodecError> {
    BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|source| CodecError::Base64 { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    const IV: [u8; BLOCK_SIZE] = *b"fedcba9876543210";

    fn key() -> SharedKey {
        SharedKey::from_bytes(b"16chaveaesexempl").unwrap()
    }

    fn b64(bytes: &[u8]) -> String {
        BASE64_STANDARD.encode(bytes)
    }

    #[test]
    fn decrypt_reverses_encrypt() {
        let plaintexts = [
            "",
            "x",
            "exactly16bytes!!",
            r#"{"device":"dev1","lat":10.5,"lon":-20.25,"time":"12:00"}"#,
            "pressão 1013.25 hPa, temperatura 21.4 °C",
        ];

        for plaintext in plaintexts {
            let ciphertext = encrypt(plaintext.as_bytes(), &IV, &key());
            assert_eq!(ciphertext.len() % BLOCK_SIZE, 0);

            let decoded = decode(&b64(&ciphertext), &b64(&IV), &key()).unwrap();
            assert_eq!(decoded, plaintext);
        }
    }

    #[test]
    fn encrypt_matches_known_cbc_vector() {
        // NIST SP 800-38A F.2.1, first block, followed by one block of padding.
        let key = SharedKey::from_hex("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let iv: [u8; BLOCK_SIZE] = hex::decode("000102030405060708090a0b0c0d0e0f")
            .unwrap()
            .try_into()
            .unwrap();
        let plaintext = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();

        let ciphertext = encrypt(&plaintext, &iv, &key);

        assert_eq!(ciphertext.len(), 2 * BLOCK_SIZE);
        assert_eq!(hex::encode(&ciphertext[..BLOCK_SIZE]), "7649abac8119b246cee98e9b12e9197d");
        assert_eq!(decrypt(&ciphertext, &iv, &key).unwrap(), plaintext);
    }

    #[test]
    fn sealed_envelope_decodes_with_the_same_key() {
        let envelope = seal(r#"{"device":"abc"}"#, &key());

        assert_eq!(
            decode(&envelope.payload, &envelope.iv, &key()).unwrap(),
            r#"{"device":"abc"}"#
        );
    }

    #[test]
    fn sealing_twice_uses_different_ivs() {
        let first = seal("same", &key());
        let second = seal("same", &key());

        assert_ne!(first.iv, second.iv);
        assert_ne!(first.payload, second.payload);
    }

    #[test]
    fn iv_of_wrong_length_is_a_decrypt_error() {
        let ciphertext = encrypt(b"hello", &IV, &key());

        for len in [0, 8, 15, 17, 32] {
            let iv = vec![7u8; len];
            let err = decode(&b64(&ciphertext), &b64(&iv), &key()).unwrap_err();

            assert!(matches!(err, CodecError::IvLength(n) if n == len));
            assert!(!err.is_transport_encoding());
        }
    }

    #[test]
    fn malformed_base64_names_the_field() {
        let err = decode("not base64!!", &b64(&IV), &key()).unwrap_err();
        assert!(matches!(err, CodecError::Base64 { field: "payload", .. }));
        assert!(err.is_transport_encoding());

        let err = decode(&b64(&[0u8; 16]), "%%%", &key()).unwrap_err();
        assert!(matches!(err, CodecError::Base64 { field: "iv", .. }));
    }

    #[test]
    fn ciphertext_not_aligned_to_block_size_is_rejected() {
        for len in [0, 1, 15, 17, 31] {
            let err = decrypt(&vec![0u8; len], &IV, &key()).unwrap_err();
            assert!(matches!(err, CodecError::CiphertextLength(n) if n == len));
        }
    }

    #[test]
    fn tampered_padding_is_never_corrected() {
        // A 16 byte plaintext gets a full block of 0x10 padding. Flipping bits in the
        // first ciphertext block flips the same bits in the decrypted padding block.
        let ciphertext = encrypt(b"exactly16bytes!!", &IV, &key());
        assert_eq!(ciphertext.len(), 32);

        for forged_last_byte in [0x00u8, 0x11, 0x02, 0xff] {
            let mut tampered = ciphertext.clone();
            tampered[15] ^= 0x10 ^ forged_last_byte;

            let err = decrypt(&tampered, &IV, &key()).unwrap_err();
            assert!(matches!(err, CodecError::Padding), "byte {forged_last_byte:#x}");
        }
    }

    #[test]
    fn invalid_utf8_is_reported_separately_from_padding() {
        let ciphertext = encrypt(&[0xff, 0xfe, 0xfd], &IV, &key());

        let err = decode(&b64(&ciphertext), &b64(&IV), &key()).unwrap_err();
        assert!(matches!(err, CodecError::Utf8(_)));
    }

    #[test]
    fn shared_key_requires_sixteen_bytes() {
        assert!(matches!(
            SharedKey::from_bytes(b"16chaveaesexemplo"),
            Err(KeyError::Length(17))
        ));
        assert!(matches!(SharedKey::from_hex("zz"), Err(KeyError::Hex(_))));
        assert!(SharedKey::from_hex("00112233445566778899aabbccddeeff").is_ok());
        assert_eq!(format!("{:?}", key()), "SharedKey(..)");
    }
}
