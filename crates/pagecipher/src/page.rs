//! Page authentication and decryption.
//!
//! Every page authenticates independently: the HMAC tag in the reserve
//! region covers the encrypted body, the IV, and the 1-based page number in
//! little-endian. Page 1 is special only in that its first 16 bytes are the
//! clear-text salt and are excluded from both the MAC extent and the
//! ciphertext.
//!
//! The validation entry points are total: any wrong-sized input is a plain
//! `false`. Only [`decrypt_page`] surfaces errors, because its caller has
//! already committed to a key.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha512;

use crate::error::{CipherError, CipherResult};
use crate::kdf::{derive_from_enc, derive_from_raw, PageKeys};
use crate::profile::{CipherProfile, HashKind, KEY_LEN, SALT_LEN};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Verify a page's HMAC tag in constant time.
///
/// `page_no` is 1-based, matching the on-disk MAC extent. Returns `false`
/// for any page that is not exactly `profile.page_size` bytes.
pub fn authenticate_page(
    profile: &CipherProfile,
    page: &[u8],
    page_no: u32,
    mac_key: &[u8; KEY_LEN],
    first_page: bool,
) -> bool {
    if page.len() != profile.page_size {
        return false;
    }

    let body = &page[profile.body_start(first_page)..profile.tag_start()];
    let tag = &page[profile.tag_start()..profile.tag_start() + profile.hmac_len];

    // Both hashes emit a tag of exactly `hmac_len`; verify_slice compares in
    // constant time.
    match profile.hash {
        HashKind::Sha512 => {
            let Ok(mut mac) = Hmac::<Sha512>::new_from_slice(mac_key) else {
                return false;
            };
            mac.update(body);
            mac.update(&page_no.to_le_bytes());
            mac.verify_slice(tag).is_ok()
        }
        HashKind::Sha1 => {
            let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(mac_key) else {
                return false;
            };
            mac.update(body);
            mac.update(&page_no.to_le_bytes());
            mac.verify_slice(tag).is_ok()
        }
    }
}

/// Test a raw key against a first page (full KDF, ~100 ms).
pub fn validate_raw(profile: &CipherProfile, page1: &[u8], raw_key: &[u8]) -> bool {
    if page1.len() != profile.page_size || raw_key.is_empty() {
        return false;
    }
    let salt: [u8; SALT_LEN] = match page1[..SALT_LEN].try_into() {
        Ok(s) => s,
        Err(_) => return false,
    };
    let keys = derive_from_raw(profile, raw_key, &salt);
    authenticate_page(profile, page1, 1, &keys.mac_key, true)
}

/// Test an already-derived encryption key against a first page (~1 ms).
pub fn validate_derived(profile: &CipherProfile, page1: &[u8], enc_key: &[u8]) -> bool {
    if page1.len() != profile.page_size {
        return false;
    }
    let enc_key: [u8; KEY_LEN] = match enc_key.try_into() {
        Ok(k) => k,
        Err(_) => return false,
    };
    let salt: [u8; SALT_LEN] = match page1[..SALT_LEN].try_into() {
        Ok(s) => s,
        Err(_) => return false,
    };
    let keys = derive_from_enc(profile, &enc_key, &salt);
    authenticate_page(profile, page1, 1, &keys.mac_key, true)
}

/// Decrypt one page, returning body plaintext with the reserve appended.
///
/// The page must authenticate under `keys.mac_key` first; a mismatch is
/// [`CipherError::BadAuth`], never silently-garbled plaintext. On page 1
/// the clear-text salt is excluded, so the output is 16 bytes shorter than
/// the page.
pub fn decrypt_page(
    profile: &CipherProfile,
    page: &[u8],
    page_no: u32,
    keys: &PageKeys,
    first_page: bool,
) -> CipherResult<Vec<u8>> {
    if page.len() != profile.page_size {
        return Err(CipherError::bad_input(format!(
            "page must be {} bytes, got {}",
            profile.page_size,
            page.len()
        )));
    }
    if !authenticate_page(profile, page, page_no, &keys.mac_key, first_page) {
        return Err(CipherError::bad_auth(page_no));
    }

    let body = &page[profile.body_start(first_page)..profile.reserve_start()];
    if body.is_empty() || body.len() % crate::profile::AES_BLOCK != 0 {
        return Err(CipherError::bad_input(format!(
            "ciphertext body must be a non-empty multiple of 16, got {}",
            body.len()
        )));
    }

    let iv = &page[profile.reserve_start()..profile.reserve_start() + profile.iv_len];
    let mut buf = body.to_vec();
    let decryptor = Aes256CbcDec::new_from_slices(&keys.enc_key, iv)
        .map_err(|e| CipherError::bad_input(format!("AES-CBC init: {e}")))?;
    decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| CipherError::bad_input(format!("AES-CBC decrypt: {e}")))?;

    buf.extend_from_slice(&page[profile.reserve_start()..]);
    Ok(buf)
}
