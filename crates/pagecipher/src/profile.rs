//! Cipher profiles for the two on-disk page formats.
//!
//! Both client generations store databases in a SQLCipher-style page format:
//! a 16-byte salt in clear at the head of page 1, AES-256-CBC page bodies,
//! and a per-page reserve region holding the IV and an HMAC tag. The
//! generations differ in the KDF hash, the iteration count, and the tag
//! length; everything downstream (derivation, authentication, decryption)
//! is parameterized over a [`CipherProfile`] so the same code serves both.

/// Key length for both the encryption key and the MAC key.
pub const KEY_LEN: usize = 32;

/// Length of the per-database salt stored in clear on page 1.
pub const SALT_LEN: usize = 16;

/// AES block size; the reserve region is rounded up to this.
pub const AES_BLOCK: usize = 16;

/// Byte XORed into each salt byte to form the MAC-key salt.
pub const MAC_SALT_XOR: u8 = 0x3a;

/// Hash function used by the PBKDF2 steps and the page HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Sha1,
    Sha512,
}

/// Parameters of one on-disk page format generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherProfile {
    /// Client generation this profile decodes (3 or 4).
    pub version: u8,
    /// Page size in bytes.
    pub page_size: usize,
    /// IV length inside the reserve region.
    pub iv_len: usize,
    /// HMAC tag length inside the reserve region.
    pub hmac_len: usize,
    /// Iteration count for the expensive raw-key KDF step.
    pub kdf_iters: u32,
    /// Iteration count for the cheap MAC-key derivation step.
    pub mac_kdf_iters: u32,
    /// Hash backing both PBKDF2 and the page HMAC.
    pub hash: HashKind,
    /// Whether this generation holds post-KDF keys in process memory.
    pub derived_keys: bool,
}

impl CipherProfile {
    /// The 4.x format: PBKDF2-HMAC-SHA512, 256 000 iterations, 64-byte tag.
    pub const fn v4() -> Self {
        CipherProfile {
            version: 4,
            page_size: 4096,
            iv_len: 16,
            hmac_len: 64,
            kdf_iters: 256_000,
            mac_kdf_iters: 2,
            hash: HashKind::Sha512,
            derived_keys: true,
        }
    }

    /// The 3.x format: PBKDF2-HMAC-SHA1, 64 000 iterations, 20-byte tag.
    pub const fn v3() -> Self {
        CipherProfile {
            version: 3,
            page_size: 4096,
            iv_len: 16,
            hmac_len: 20,
            kdf_iters: 64_000,
            mac_kdf_iters: 2,
            hash: HashKind::Sha1,
            derived_keys: false,
        }
    }

    /// Look up the profile for a client major version.
    pub fn for_version(version: u8) -> Option<Self> {
        match version {
            3 => Some(Self::v3()),
            4 => Some(Self::v4()),
            _ => None,
        }
    }

    /// Size of the trailing reserve region (IV + tag, rounded up to the AES
    /// block so the ciphertext body stays block-aligned).
    ///
    /// 80 bytes for v4 (16 + 64), 48 for v3 (16 + 20 rounded up).
    pub const fn reserve(&self) -> usize {
        let raw = self.iv_len + self.hmac_len;
        if raw % AES_BLOCK == 0 {
            raw
        } else {
            (raw / AES_BLOCK + 1) * AES_BLOCK
        }
    }

    /// Offset at which the encrypted body starts within a page.
    pub const fn body_start(&self, first_page: bool) -> usize {
        if first_page {
            SALT_LEN
        } else {
            0
        }
    }

    /// Offset at which the reserve region starts within a page.
    pub const fn reserve_start(&self) -> usize {
        self.page_size - self.reserve()
    }

    /// Offset of the HMAC tag within a page.
    pub const fn tag_start(&self) -> usize {
        self.reserve_start() + self.iv_len
    }
}
