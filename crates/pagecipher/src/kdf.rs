//! Key derivation for the page format.
//!
//! Two-step scheme. The expensive step stretches a raw in-memory key into
//! the page encryption key; the cheap step turns an encryption key into the
//! MAC key by re-running PBKDF2 for 2 iterations over the salt with every
//! byte XORed by 0x3a. Newer clients hold the *output* of the expensive
//! step directly, so candidate testing against them only pays the cheap
//! step.

use pbkdf2::pbkdf2_hmac_array;
use sha1::Sha1;
use sha2::Sha512;

use crate::profile::{CipherProfile, HashKind, KEY_LEN, MAC_SALT_XOR, SALT_LEN};

/// The pair of keys needed to authenticate and decrypt pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageKeys {
    /// AES-256-CBC page body key.
    pub enc_key: [u8; KEY_LEN],
    /// HMAC key authenticating page bodies.
    pub mac_key: [u8; KEY_LEN],
}

/// PBKDF2 with the profile's hash.
fn stretch(hash: HashKind, password: &[u8], salt: &[u8], rounds: u32) -> [u8; KEY_LEN] {
    match hash {
        HashKind::Sha1 => pbkdf2_hmac_array::<Sha1, KEY_LEN>(password, salt, rounds),
        HashKind::Sha512 => pbkdf2_hmac_array::<Sha512, KEY_LEN>(password, salt, rounds),
    }
}

/// The MAC-key salt: each salt byte XORed with 0x3a.
pub fn mac_salt(salt: &[u8; SALT_LEN]) -> [u8; SALT_LEN] {
    let mut out = [0u8; SALT_LEN];
    for (o, s) in out.iter_mut().zip(salt.iter()) {
        *o = s ^ MAC_SALT_XOR;
    }
    out
}

/// Derive both page keys from a raw key (full two-step derivation).
///
/// This is the ~100 ms path: `kdf_iters` iterations for the encryption key,
/// then the cheap MAC-key step.
pub fn derive_from_raw(profile: &CipherProfile, raw_key: &[u8], salt: &[u8; SALT_LEN]) -> PageKeys {
    let enc_key = stretch(profile.hash, raw_key, salt, profile.kdf_iters);
    derive_from_enc(profile, &enc_key, salt)
}

/// Derive page keys from an already-stretched encryption key.
///
/// Only the 2-iteration MAC-key step runs; `enc_key` passes through
/// unchanged. This is the ~1 ms path used for derived-key candidates.
pub fn derive_from_enc(
    profile: &CipherProfile,
    enc_key: &[u8; KEY_LEN],
    salt: &[u8; SALT_LEN],
) -> PageKeys {
    let mac_key = stretch(profile.hash, enc_key, &mac_salt(salt), profile.mac_kdf_iters);
    PageKeys {
        enc_key: *enc_key,
        mac_key,
    }
}
