//! Bulk database decryption.
//!
//! Turns page-encrypted databases back into plain SQLite files. With a raw
//! key the expensive KDF runs once per file (the salt differs per
//! database); with a derived-key list each file is matched by the cheap
//! path, trying the next key on an authentication miss before surfacing.
//! Decrypted output replaces the clear-text salt with the standard SQLite
//! magic, and a file that already starts with the magic passes through
//! untouched.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use pagecipher::{
    decrypt_page, derive_from_enc, derive_from_raw, page, CipherError, CipherProfile, PageKeys,
    SALT_LEN,
};

use crate::errors::{ExtractError, ExtractResult};
use crate::model::DataKey;
use crate::validator::collect_db_files;

/// Magic bytes opening every plain SQLite database.
pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Decrypt one database file into memory.
pub fn decrypt_db_file(
    profile: &CipherProfile,
    path: &Path,
    key: &DataKey,
) -> ExtractResult<Vec<u8>> {
    let buf = fs::read(path)?;

    // Already plaintext; nothing to do.
    if buf.starts_with(SQLITE_HEADER) {
        debug!(path = %path.display(), "database is not encrypted, passing through");
        return Ok(buf);
    }
    if buf.len() < profile.page_size {
        return Err(
            CipherError::short_file(path.display().to_string(), buf.len(), profile.page_size)
                .into(),
        );
    }

    let keys = resolve_keys(profile, &buf[..profile.page_size], key)?;

    // Pages authenticate and decrypt independently; fan out.
    let page_size = profile.page_size;
    let total_pages = buf.len() / page_size;
    let pages = (0..total_pages)
        .into_par_iter()
        .map(|i| {
            let page = &buf[i * page_size..(i + 1) * page_size];
            decrypt_page(profile, page, (i + 1) as u32, &keys, i == 0)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(buf.len());
    out.extend_from_slice(SQLITE_HEADER);
    for page in pages {
        out.extend_from_slice(&page);
    }
    Ok(out)
}

/// Decrypt one database file to `dest`, returning the written path.
pub fn decrypt_to_file(
    profile: &CipherProfile,
    src: &Path,
    dest: &Path,
    key: &DataKey,
) -> ExtractResult<PathBuf> {
    let plain = decrypt_db_file(profile, src, key)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, plain)?;
    Ok(dest.to_path_buf())
}

/// Decrypt every database under `db_root` into a mirrored tree at
/// `out_dir`. Per-file failures are logged and skipped; returns the number
/// of files decrypted.
pub fn decrypt_db_tree(
    profile: &CipherProfile,
    db_root: &Path,
    out_dir: &Path,
    key: &DataKey,
) -> ExtractResult<usize> {
    let files = collect_db_files(db_root);
    debug!(count = files.len(), root = %db_root.display(), "decrypting database tree");

    let decrypted = AtomicUsize::new(0);
    files.par_iter().for_each(|src| {
        let rel = src.strip_prefix(db_root).unwrap_or(src);
        let dest = out_dir.join(rel);
        match decrypt_to_file(profile, src, &dest, key) {
            Ok(_) => {
                decrypted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(path = %src.display(), error = %e, "failed to decrypt database");
            }
        }
    });
    Ok(decrypted.load(Ordering::Relaxed))
}

/// Convert a raw hex key into the `0x`-prefixed SQLCipher raw-key form
/// (stretched encryption key followed by the file's salt), which stock
/// SQLCipher accepts without re-running the KDF.
pub fn sqlcipher_raw_key(
    profile: &CipherProfile,
    raw_hex: &str,
    db_path: &Path,
) -> ExtractResult<String> {
    let pass = Zeroizing::new(
        hex::decode(raw_hex).map_err(|e| ExtractError::MalformedKey(format!("invalid hex: {e}")))?,
    );

    let mut salt = [0u8; SALT_LEN];
    File::open(db_path)?.read_exact(&mut salt)?;

    let keys = derive_from_raw(profile, &pass, &salt);
    let mut raw = Vec::with_capacity(keys.enc_key.len() + salt.len());
    raw.extend_from_slice(&keys.enc_key);
    raw.extend_from_slice(&salt);
    Ok(format!("0x{}", hex::encode(raw)))
}

/// Pick the page keys for one file's first page.
fn resolve_keys(
    profile: &CipherProfile,
    first_page: &[u8],
    key: &DataKey,
) -> ExtractResult<PageKeys> {
    let salt: [u8; SALT_LEN] = first_page[..SALT_LEN]
        .try_into()
        .map_err(|_| CipherError::bad_input("first page shorter than the salt"))?;

    match key {
        DataKey::Raw(raw) => Ok(derive_from_raw(profile, raw, &salt)),
        DataKey::Derived(candidates) => {
            for candidate in candidates {
                if page::validate_derived(profile, first_page, candidate) {
                    return Ok(derive_from_enc(profile, candidate, &salt));
                }
            }
            // No derived key fits this database's salt.
            Err(CipherError::bad_auth(1).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testfix::{key32, salt16, write_db, MESSAGE_KEY_HEX, MESSAGE_SALT_HEX, SESSION_KEY_HEX, SESSION_SALT_HEX};
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_decrypt_with_derived_key_list() {
        let tmp = TempDir::new().unwrap();
        let profile = CipherProfile::v4();
        let db = tmp.path().join("session.db");
        write_db(
            &db,
            &profile,
            &key32(SESSION_KEY_HEX),
            &salt16(SESSION_SALT_HEX),
            3,
        );

        // The wrong key is tried first and skipped by the salt match.
        let key = DataKey::Derived(vec![key32(MESSAGE_KEY_HEX), key32(SESSION_KEY_HEX)]);
        let plain = decrypt_db_file(&profile, &db, &key).unwrap();

        assert!(plain.starts_with(SQLITE_HEADER));
        // Salt replaced by header: same total length as the input.
        assert_eq!(plain.len(), 3 * profile.page_size);
    }

    #[test]
    fn test_decrypt_fails_when_no_derived_key_matches() {
        let tmp = TempDir::new().unwrap();
        let profile = CipherProfile::v4();
        let db = tmp.path().join("session.db");
        write_db(
            &db,
            &profile,
            &key32(SESSION_KEY_HEX),
            &salt16(SESSION_SALT_HEX),
            1,
        );

        let key = DataKey::Derived(vec![key32(MESSAGE_KEY_HEX)]);
        let err = decrypt_db_file(&profile, &db, &key).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Cipher(CipherError::BadAuth { page_no: 1 })
        ));
    }

    #[test]
    fn test_decrypt_with_raw_key() {
        let tmp = TempDir::new().unwrap();
        let profile = CipherProfile::v4();
        let raw = key32("8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92");
        let salt = salt16(SESSION_SALT_HEX);
        let keys = derive_from_raw(&profile, &raw, &salt);

        let db = tmp.path().join("message_0.db");
        write_db(&db, &profile, &keys.enc_key, &salt, 2);

        let plain = decrypt_db_file(&profile, &db, &DataKey::Raw(raw)).unwrap();
        assert!(plain.starts_with(SQLITE_HEADER));
        assert_eq!(plain.len(), 2 * profile.page_size);
    }

    #[test]
    fn test_plaintext_database_passes_through() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("plain.db");
        let mut content = SQLITE_HEADER.to_vec();
        content.extend_from_slice(&[0x77; 100]);
        File::create(&db).unwrap().write_all(&content).unwrap();

        let key = DataKey::Derived(vec![key32(SESSION_KEY_HEX)]);
        let out = decrypt_db_file(&CipherProfile::v4(), &db, &key).unwrap();
        assert_eq!(out, content);
    }

    #[test]
    fn test_short_file_is_distinct_error() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("stub.db");
        File::create(&db).unwrap().write_all(&[1u8; 64]).unwrap();

        let key = DataKey::Derived(vec![key32(SESSION_KEY_HEX)]);
        let err = decrypt_db_file(&CipherProfile::v4(), &db, &key).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Cipher(CipherError::ShortFile { got: 64, .. })
        ));
    }

    #[test]
    fn test_decrypt_tree_mirrors_layout_and_skips_failures() {
        let tmp = TempDir::new().unwrap();
        let profile = CipherProfile::v4();
        let root = tmp.path().join("db_storage");
        write_db(
            &root.join("message").join("message_0.db"),
            &profile,
            &key32(MESSAGE_KEY_HEX),
            &salt16(MESSAGE_SALT_HEX),
            1,
        );
        write_db(
            &root.join("session").join("session.db"),
            &profile,
            &key32(SESSION_KEY_HEX),
            &salt16(SESSION_SALT_HEX),
            1,
        );
        // A database no key matches: logged and skipped.
        write_db(
            &root.join("biz").join("biz.db"),
            &profile,
            &[0x99u8; 32],
            &[0x42u8; 16],
            1,
        );

        let out = tmp.path().join("decrypted");
        let key = DataKey::Derived(vec![key32(MESSAGE_KEY_HEX), key32(SESSION_KEY_HEX)]);
        let count = decrypt_db_tree(&profile, &root, &out, &key).unwrap();

        assert_eq!(count, 2);
        assert!(out.join("message").join("message_0.db").exists());
        assert!(out.join("session").join("session.db").exists());
        assert!(!out.join("biz").join("biz.db").exists());
    }

    #[test]
    fn test_sqlcipher_raw_key_shape() {
        let tmp = TempDir::new().unwrap();
        let profile = CipherProfile {
            kdf_iters: 16,
            ..CipherProfile::v4()
        };
        let db = tmp.path().join("x.db");
        File::create(&db).unwrap().write_all(&[0x21u8; 64]).unwrap();

        let raw_hex = "8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92";
        let out = sqlcipher_raw_key(&profile, raw_hex, &db).unwrap();
        assert!(out.starts_with("0x"));
        // 32-byte stretched key + 16-byte salt = 96 hex chars.
        assert_eq!(out.len(), 2 + 96);
        assert!(out.ends_with(&hex::encode([0x21u8; 16])));
    }
}
