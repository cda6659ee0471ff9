//! Shared test fixtures: synthetic page-encrypted databases.
//!
//! Builds authenticated pages by the inverse construction of
//! `pagecipher::decrypt_page`, so validators and search tests run against
//! real cryptography without needing production captures. The embedded key
//! and salt literals are the values recovered from a 4.1.7 client's
//! session and message databases.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use aes::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::Sha512;

use pagecipher::{derive_from_enc, CipherProfile, HashKind, KEY_LEN, SALT_LEN};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

pub const SESSION_KEY_HEX: &str =
    "33d81c8d3b58873d4c50e18868854eb130e4e80909df687e27608ae2d2071fee";
pub const SESSION_SALT_HEX: &str = "b8f04a11e11f401028117c32ec1c5743";
pub const MESSAGE_KEY_HEX: &str =
    "17776688cb3630f2753b08c2e180d35213c29e2d033903972a56517fb48d08f6";
pub const MESSAGE_SALT_HEX: &str = "8ed123e42fe685e72abe09d875a93538";

pub fn key32(hex_str: &str) -> [u8; KEY_LEN] {
    hex::decode(hex_str).unwrap().try_into().unwrap()
}

pub fn salt16(hex_str: &str) -> [u8; SALT_LEN] {
    hex::decode(hex_str).unwrap().try_into().unwrap()
}

fn page_tag(profile: &CipherProfile, mac_key: &[u8], body: &[u8], page_no: u32) -> Vec<u8> {
    match profile.hash {
        HashKind::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(mac_key).unwrap();
            mac.update(body);
            mac.update(&page_no.to_le_bytes());
            mac.finalize().into_bytes()[..profile.hmac_len].to_vec()
        }
        HashKind::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(mac_key).unwrap();
            mac.update(body);
            mac.update(&page_no.to_le_bytes());
            mac.finalize().into_bytes()[..profile.hmac_len].to_vec()
        }
    }
}

/// Build one authenticated page for `enc_key`/`salt`.
pub fn build_page(
    profile: &CipherProfile,
    enc_key: &[u8; KEY_LEN],
    salt: &[u8; SALT_LEN],
    page_no: u32,
) -> Vec<u8> {
    let keys = derive_from_enc(profile, enc_key, salt);
    let first_page = page_no == 1;
    let mut rng = rand::thread_rng();

    let body_len = profile.reserve_start() - profile.body_start(first_page);
    let mut body = vec![0u8; body_len];
    rng.fill_bytes(&mut body);

    let mut iv = vec![0u8; profile.iv_len];
    rng.fill_bytes(&mut iv);

    let n = body.len();
    Aes256CbcEnc::new_from_slices(&keys.enc_key, &iv)
        .unwrap()
        .encrypt_padded_mut::<NoPadding>(&mut body, n)
        .unwrap();

    let mut page = Vec::with_capacity(profile.page_size);
    if first_page {
        page.extend_from_slice(salt);
    }
    page.extend_from_slice(&body);
    page.extend_from_slice(&iv);
    let tag = page_tag(
        profile,
        &keys.mac_key,
        &page[profile.body_start(first_page)..],
        page_no,
    );
    page.extend_from_slice(&tag);
    page.resize(profile.page_size, 0);
    page
}

/// Write a small synthetic database (`pages` authenticated pages).
pub fn write_db(
    path: &Path,
    profile: &CipherProfile,
    enc_key: &[u8; KEY_LEN],
    salt: &[u8; SALT_LEN],
    pages: u32,
) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut f = File::create(path).unwrap();
    for page_no in 1..=pages {
        f.write_all(&build_page(profile, enc_key, salt, page_no))
            .unwrap();
    }
}

/// Lay out a data directory shaped like a real v4 account: the primary
/// message database plus a session database, keyed by the capture literals.
pub fn write_v4_data_dir(data_dir: &Path) {
    let profile = CipherProfile::v4();
    write_db(
        &data_dir
            .join("db_storage")
            .join("message")
            .join("message_0.db"),
        &profile,
        &key32(MESSAGE_KEY_HEX),
        &salt16(MESSAGE_SALT_HEX),
        2,
    );
    write_db(
        &data_dir
            .join("db_storage")
            .join("session")
            .join("session.db"),
        &profile,
        &key32(SESSION_KEY_HEX),
        &salt16(SESSION_SALT_HEX),
        2,
    );
}
