//! Extraction orchestration.
//!
//! Wires the validator and search engine together for one target process:
//! checks the preconditions that would otherwise surface as opaque memory
//! read failures, runs the pipeline under a fresh cancellation token, and
//! maps an empty outcome to [`ExtractError::NoValidKey`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::errors::{ExtractError, ExtractResult};
use crate::memory::ChunkSource;
use crate::model::{DataKey, Platform, ProcessStatus, ProcessTarget, IMG_KEY_LEN};
use crate::platform::host_integrity_enabled;
use crate::search::SearchEngine;
use crate::validator::Validator;

/// Orchestrates one key extraction.
pub struct Extractor {
    platform: Platform,
    version: u8,
    validator: Option<Arc<Validator>>,
}

impl Extractor {
    pub fn new(platform: Platform, version: u8) -> Self {
        Extractor {
            platform,
            version,
            validator: None,
        }
    }

    /// Attach the validator built from the account's data directory.
    pub fn set_validator(&mut self, validator: Arc<Validator>) {
        self.validator = Some(validator);
    }

    /// Search `proc`'s memory (as streamed by `source`) for the account's
    /// keys.
    ///
    /// Returns the data key plus the image key when one was confirmed.
    /// Refuses with a distinguished error when the process is offline, the
    /// host blocks memory reads, no validator is attached, or the profile
    /// has no extraction support.
    pub fn extract(
        &self,
        proc: &ProcessTarget,
        source: Box<dyn ChunkSource>,
    ) -> ExtractResult<(DataKey, Option<[u8; IMG_KEY_LEN]>)> {
        if proc.status == ProcessStatus::Offline {
            return Err(ExtractError::ProcessOffline);
        }
        if host_integrity_enabled(self.platform) {
            return Err(ExtractError::HostIntegrityEnabled);
        }
        let validator = self
            .validator
            .as_ref()
            .ok_or(ExtractError::ValidatorNotSet)?;
        if !validator.profile().derived_keys || self.version != 4 {
            return Err(ExtractError::UnsupportedProfile(self.version));
        }

        debug!(pid = proc.pid, platform = %self.platform, "starting extraction");

        let token = CancelToken::new();
        let engine = SearchEngine::new(Arc::clone(validator));
        let outcome = engine.run(source, &token)?;

        match outcome.data_key {
            Some(data_key) => {
                info!(pid = proc.pid, "extraction succeeded");
                Ok((data_key, outcome.img_key))
            }
            // An empty outcome on a cancelled token means the producer
            // failed mid-run, not that the search was exhaustive.
            None if token.is_cancelled() => Err(ExtractError::Cancelled),
            None => Err(ExtractError::NoValidKey),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::dump::DumpFileSource;
    use crate::testfix::{key32, write_v4_data_dir, SESSION_KEY_HEX};
    use rand::RngCore;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn dump_with_key(key: &[u8]) -> NamedTempFile {
        let mut dump = vec![0u8; 8 * 1024];
        rand::thread_rng().fill_bytes(&mut dump);
        dump[2048..2048 + key.len()].copy_from_slice(key);
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&dump).unwrap();
        f.flush().unwrap();
        f
    }

    fn source_for(f: &NamedTempFile) -> Box<dyn crate::memory::ChunkSource> {
        Box::new(DumpFileSource::open(f.path()).unwrap())
    }

    #[test]
    fn test_offline_process_is_refused() {
        let ext = Extractor::new(Platform::Windows, 4);
        let dump = dump_with_key(&[0u8; 32]);
        let proc = ProcessTarget {
            pid: 1,
            status: ProcessStatus::Offline,
        };
        assert!(matches!(
            ext.extract(&proc, source_for(&dump)).unwrap_err(),
            ExtractError::ProcessOffline
        ));
    }

    #[test]
    fn test_missing_validator_is_refused() {
        let ext = Extractor::new(Platform::Windows, 4);
        let dump = dump_with_key(&[0u8; 32]);
        assert!(matches!(
            ext.extract(&ProcessTarget::online(1), source_for(&dump))
                .unwrap_err(),
            ExtractError::ValidatorNotSet
        ));
    }

    #[test]
    fn test_extracts_derived_key_from_dump() {
        let tmp = TempDir::new().unwrap();
        write_v4_data_dir(tmp.path());
        let validator =
            Arc::new(Validator::new(Platform::Windows, 4, tmp.path()).unwrap());

        let mut ext = Extractor::new(Platform::Windows, 4);
        ext.set_validator(validator);

        let session_key = key32(SESSION_KEY_HEX);
        let dump = dump_with_key(&session_key);
        let (data_key, img_key) = ext
            .extract(&ProcessTarget::online(4242), source_for(&dump))
            .unwrap();

        assert_eq!(data_key, DataKey::Derived(vec![session_key]));
        assert!(img_key.is_none());
    }

    #[test]
    fn test_keyless_dump_is_no_valid_key() {
        let tmp = TempDir::new().unwrap();
        write_v4_data_dir(tmp.path());
        let validator =
            Arc::new(Validator::new(Platform::Windows, 4, tmp.path()).unwrap());

        let mut ext = Extractor::new(Platform::Windows, 4);
        ext.set_validator(validator);

        let dump = dump_with_key(&[0xaau8; 32]);
        assert!(matches!(
            ext.extract(&ProcessTarget::online(1), source_for(&dump))
                .unwrap_err(),
            ExtractError::NoValidKey
        ));
    }
}
