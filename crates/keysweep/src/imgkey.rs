//! Image-key validation.
//!
//! Version 4 clients obfuscate image blobs: the head of each `.dat` file is
//! AES-128-ECB encrypted under a 16-byte key, and the decrypted bytes are a
//! known image magic XORed with a single obfuscation byte. A candidate key
//! is accepted when some sampled file decrypts to a magic under a
//! *consistent* XOR byte; that byte is cached for the image pipeline.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, KeyInit};
use aes::Aes128;
use parking_lot::Mutex;
use tracing::debug;

use crate::model::IMG_KEY_LEN;

/// Image formats recognized after trial decryption.
const IMAGE_MAGICS: [&[u8]; 4] = [
    &[0xff, 0xd8, 0xff],       // JPEG
    &[0x89, 0x50, 0x4e, 0x47], // PNG
    &[0x47, 0x49, 0x46, 0x38], // GIF
    &[0x42, 0x4d],             // BMP
];

/// Sampled file headers are one AES block.
const SAMPLE_LEN: usize = 16;

/// Files smaller than this are placeholders, not images.
const MIN_FILE_LEN: u64 = 64;

/// How many candidate files to sample from the data directory.
const MAX_SAMPLES: usize = 16;

/// Validates 16-byte image keys against sampled image files.
#[derive(Debug)]
pub struct ImgKeyValidator {
    samples: Vec<[u8; SAMPLE_LEN]>,
    xor_key: Mutex<Option<u8>>,
}

impl ImgKeyValidator {
    /// Sample obfuscated image headers from `data_dir`.
    ///
    /// Construction never fails: a directory with no usable `.dat` files
    /// just yields a validator that rejects every key.
    pub fn new(data_dir: &Path) -> Self {
        let mut samples = Vec::new();
        collect_samples(data_dir, &mut samples);
        debug!(
            dir = %data_dir.display(),
            count = samples.len(),
            "sampled image file headers"
        );
        ImgKeyValidator {
            samples,
            xor_key: Mutex::new(None),
        }
    }

    /// Test a candidate image key. Total: wrong-sized keys are `false`.
    pub fn validate(&self, key: &[u8]) -> bool {
        if key.len() != IMG_KEY_LEN {
            return false;
        }
        let Ok(cipher) = Aes128::new_from_slice(key) else {
            return false;
        };

        for sample in &self.samples {
            let mut block = GenericArray::clone_from_slice(sample);
            cipher.decrypt_block(&mut block);

            if let Some(xor) = match_magic(&block) {
                debug!(xor = format!("{xor:#04x}"), "image key validated");
                *self.xor_key.lock() = Some(xor);
                return true;
            }
        }
        false
    }

    /// The obfuscation byte recovered by the last successful validation.
    pub fn xor_key(&self) -> Option<u8> {
        *self.xor_key.lock()
    }

    /// Number of sampled headers available for validation.
    #[allow(dead_code)]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

/// If `block` is a known magic under one consistent XOR byte, return it.
fn match_magic(block: &[u8]) -> Option<u8> {
    for magic in IMAGE_MAGICS {
        let xor = block[0] ^ magic[0];
        if magic
            .iter()
            .zip(block.iter())
            .all(|(m, b)| b ^ m == xor)
        {
            return Some(xor);
        }
    }
    None
}

fn collect_samples(dir: &Path, out: &mut Vec<[u8; SAMPLE_LEN]>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        if out.len() >= MAX_SAMPLES {
            return;
        }
        let path = entry.path();
        if path.is_dir() {
            collect_samples(&path, out);
            continue;
        }
        if path.extension().map_or(true, |e| e != "dat") {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.len() < MIN_FILE_LEN {
            continue;
        }
        let mut header = [0u8; SAMPLE_LEN];
        if File::open(&path)
            .and_then(|mut f| f.read_exact(&mut header))
            .is_ok()
        {
            out.push(header);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncrypt;
    use std::io::Write;
    use tempfile::TempDir;

    const KEY: [u8; 16] = [0x11; 16];
    const XOR: u8 = 0x5a;

    /// Write a fake obfuscated image: AES-128-ECB(magic ^ xor || filler).
    fn write_dat(dir: &Path, name: &str, magic: &[u8], xor: u8) {
        let mut block = [0u8; 16];
        for (i, b) in block.iter_mut().enumerate() {
            *b = magic.get(i).copied().unwrap_or(0x77) ^ xor;
        }
        let cipher = Aes128::new_from_slice(&KEY).unwrap();
        let mut enc = GenericArray::clone_from_slice(&block);
        cipher.encrypt_block(&mut enc);

        let mut content = enc.to_vec();
        content.resize(256, 0xee);
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(&content).unwrap();
    }

    #[test]
    fn test_validate_accepts_key_and_caches_xor() {
        let tmp = TempDir::new().unwrap();
        write_dat(tmp.path(), "a.dat", &[0xff, 0xd8, 0xff], XOR);

        let v = ImgKeyValidator::new(tmp.path());
        assert_eq!(v.sample_count(), 1);
        assert!(v.validate(&KEY));
        assert_eq!(v.xor_key(), Some(XOR));
    }

    #[test]
    fn test_validate_rejects_wrong_key() {
        let tmp = TempDir::new().unwrap();
        write_dat(tmp.path(), "a.dat", &[0x89, 0x50, 0x4e, 0x47], XOR);

        let v = ImgKeyValidator::new(tmp.path());
        assert!(!v.validate(&[0x22; 16]));
        assert!(!v.validate(&KEY[..8])); // wrong size
        assert_eq!(v.xor_key(), None);
    }

    #[test]
    fn test_scan_skips_non_dat_and_short_files() {
        let tmp = TempDir::new().unwrap();
        File::create(tmp.path().join("note.txt"))
            .unwrap()
            .write_all(&[0u8; 256])
            .unwrap();
        File::create(tmp.path().join("tiny.dat"))
            .unwrap()
            .write_all(&[0u8; 8])
            .unwrap();

        let v = ImgKeyValidator::new(tmp.path());
        assert_eq!(v.sample_count(), 0);
        assert!(!v.validate(&KEY));
    }

    #[test]
    fn test_scan_recurses_into_subdirectories() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("msg").join("attach");
        fs::create_dir_all(&sub).unwrap();
        write_dat(&sub, "img.dat", &[0x47, 0x49, 0x46, 0x38], 0x00);

        let v = ImgKeyValidator::new(tmp.path());
        assert_eq!(v.sample_count(), 1);
        assert!(v.validate(&KEY));
        // An XOR byte of zero is still a valid recovery.
        assert_eq!(v.xor_key(), Some(0x00));
    }
}
