/// Envelope sealing
///
/// Symmetric encryption of relay payloads with the session key. Wire form
/// is base64(iv || ciphertext), the type-0 envelope of the WalletConnect
/// crypto spec. Key agreement happens outside this crate.
///
use base64ct::{Base64, Encoding};
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

use crate::error::{Error, Result};

pub const IV_LENGTH: usize = 12;

pub fn seal(plain_text: &str, sym_key: [u8; 32]) -> Result<String> {
    let mut iv = vec![0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&sym_key));
    let sealed = cipher.encrypt(Nonce::from_slice(&iv), plain_text.as_bytes())?;

    let mut bytes = iv;
    bytes.extend_from_slice(&sealed);
    Ok(Base64::encode_string(&bytes))
}

pub fn open(encoded: &str, sym_key: [u8; 32]) -> Result<String> {
    let bytes = Base64::decode_vec(encoded)
        .map_err(|e| Error::Format(format!("bad base64 envelope: {e}")))?;
    if bytes.len() <= IV_LENGTH {
        return Err(Error::Format("envelope too short".to_string()));
    }

    let (iv, sealed) = bytes.split_at(IV_LENGTH);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&sym_key));
    let decrypted = cipher.decrypt(Nonce::from_slice(iv), sealed)?;
    Ok(String::from_utf8(decrypted)?)
}
