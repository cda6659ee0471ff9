//! Candidate-key validation against the account's databases.
//!
//! A raw key is account-wide: it authenticates against every database's
//! salt, so testing it against the primary database is sufficient. A
//! derived key is per-database (the salt is baked in by the KDF), so one
//! memory pass has to be validated against *every* database the account
//! holds; stopping at the first match would leave the other databases'
//! keys undiscovered in the same buffer. The validator therefore opens the
//! whole `db_storage/` tree up front and tracks which databases have been
//! matched, giving the brute-force scanner a cheap completion signal.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use pagecipher::{page, CipherProfile, DbFile};

use crate::errors::{ExtractError, ExtractResult};
use crate::imgkey::ImgKeyValidator;
use crate::model::Platform;

/// Index of the primary database in the matched set.
const PRIMARY_INDEX: i32 = -1;

/// Relative path of the database used for raw-key validation.
pub fn primary_db_rel(platform: Platform, version: u8) -> PathBuf {
    match (platform, version) {
        (Platform::Windows, 3) => ["Msg", "Misc.db"].iter().collect(),
        (Platform::Darwin, 3) => ["Message", "msg_0.db"].iter().collect(),
        _ => ["db_storage", "message", "message_0.db"].iter().collect(),
    }
}

/// Validates key candidates for one account.
#[derive(Debug)]
pub struct Validator {
    profile: CipherProfile,
    db_file: DbFile,
    extra_db_files: Vec<DbFile>,
    img_validator: Option<ImgKeyValidator>,
    /// Databases already matched by a derived key: -1 = primary, 0.. = extras.
    matched: Mutex<HashSet<i32>>,
    matched_count: AtomicUsize,
    total_db_count: usize,
}

impl Validator {
    /// Open the primary database and, for derived-key generations, every
    /// other database under `db_storage/` plus the image-key sampler.
    ///
    /// Extra databases that cannot be opened are skipped with a debug log;
    /// a broken session database must not disable raw-key extraction.
    pub fn new(platform: Platform, version: u8, data_dir: &Path) -> ExtractResult<Self> {
        let profile = CipherProfile::for_version(version)
            .ok_or(ExtractError::UnsupportedProfile(version))?;

        let db_path = data_dir.join(primary_db_rel(platform, version));
        let db_file = DbFile::open(&db_path, profile.page_size)?;

        let mut extra_db_files = Vec::new();
        let mut img_validator = None;
        if profile.derived_keys {
            img_validator = Some(ImgKeyValidator::new(data_dir));

            for path in collect_db_files(&data_dir.join("db_storage")) {
                if path == db_path {
                    continue;
                }
                match DbFile::open(&path, profile.page_size) {
                    Ok(f) => extra_db_files.push(f),
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "skipping unreadable database");
                    }
                }
            }
        }

        let total_db_count = if profile.derived_keys {
            extra_db_files.len() + 1
        } else {
            0
        };
        debug!(total_db_count, "validator ready");

        Ok(Validator {
            profile,
            db_file,
            extra_db_files,
            img_validator,
            matched: Mutex::new(HashSet::new()),
            matched_count: AtomicUsize::new(0),
            total_db_count,
        })
    }

    pub fn profile(&self) -> &CipherProfile {
        &self.profile
    }

    /// Test a raw key against the primary database (full KDF).
    pub fn validate_raw(&self, key: &[u8]) -> bool {
        page::validate_raw(&self.profile, self.db_file.first_page(), key)
    }

    /// Test a derived key against every not-yet-matched database.
    ///
    /// On the first match the database's index is marked and the match
    /// count bumped exactly once, even under concurrent workers.
    pub fn validate_derived(&self, key: &[u8]) -> bool {
        if !self.profile.derived_keys {
            return false;
        }

        if !self.is_matched(PRIMARY_INDEX)
            && page::validate_derived(&self.profile, self.db_file.first_page(), key)
        {
            self.mark_matched(PRIMARY_INDEX);
            return true;
        }

        for (i, extra) in self.extra_db_files.iter().enumerate() {
            let idx = i as i32;
            if self.is_matched(idx) {
                continue;
            }
            if page::validate_derived(&self.profile, extra.first_page(), key) {
                self.mark_matched(idx);
                return true;
            }
        }
        false
    }

    /// Test an image key, if an image sampler was set up.
    pub fn validate_img(&self, key: &[u8]) -> bool {
        self.img_validator
            .as_ref()
            .map_or(false, |v| v.validate(key))
    }

    /// XOR byte recovered by the last successful image-key validation.
    pub fn img_xor_key(&self) -> Option<u8> {
        self.img_validator.as_ref().and_then(|v| v.xor_key())
    }

    /// Whether every database has a derived key. Cheap; polled from the
    /// brute-force scanner as its completion signal.
    pub fn all_derived_found(&self) -> bool {
        self.total_db_count > 0
            && self.matched_count.load(Ordering::SeqCst) >= self.total_db_count
    }

    pub fn total_db_count(&self) -> usize {
        self.total_db_count
    }

    pub fn matched_count(&self) -> usize {
        self.matched_count.load(Ordering::SeqCst)
    }

    fn is_matched(&self, idx: i32) -> bool {
        self.matched.lock().contains(&idx)
    }

    fn mark_matched(&self, idx: i32) {
        let mut matched = self.matched.lock();
        if matched.insert(idx) {
            self.matched_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Collect database files under `dir`, skipping full-text-search shards.
///
/// Mirrors the account layout rules: directories whose name contains `fts`
/// are pruned, and only `*.db` files without `fts` in the name are kept.
/// Results are sorted for reproducibility.
pub(crate) fn collect_db_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk_db_dir(dir, &mut out);
    out.sort();
    out
}

fn walk_db_dir(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if path.is_dir() {
            if name.contains("fts") {
                continue;
            }
            walk_db_dir(&path, out);
        } else if name.ends_with(".db") && !name.contains("fts") {
            out.push(path);
        }
    }
}
