//! Page-level cryptography for SQLCipher-style encrypted message databases.
//!
//! Implements the on-disk page format used by the desktop messaging client's
//! databases: a clear 16-byte salt at the head of page 1, AES-256-CBC page
//! bodies, and a per-page reserve carrying the IV and an HMAC tag over
//! `body || IV || LE32(page_number)`. It provides:
//!
//! - [`CipherProfile`] data for both format generations (v3 and v4)
//! - Key derivation: the expensive raw-key stretch and the cheap
//!   derived-key MAC step ([`derive_from_raw`], [`derive_from_enc`])
//! - Total boolean key validation against a first page
//!   ([`validate_raw`], [`validate_derived`])
//! - Authenticated page decryption ([`decrypt_page`])
//! - [`DbFile`], a shareable handle owning a database's first page
//!
//! # Example
//!
//! ```rust,ignore
//! use pagecipher::{CipherProfile, DbFile, validate_derived};
//!
//! let profile = CipherProfile::v4();
//! let db = DbFile::open("db_storage/message/message_0.db", profile.page_size)?;
//! if validate_derived(&profile, db.first_page(), &candidate) {
//!     println!("key accepted for {}", db.path().display());
//! }
//! ```

pub mod dbfile;
pub mod error;
pub mod kdf;
pub mod page;
pub mod profile;

// Re-export key types at crate root.
pub use dbfile::DbFile;
pub use error::{CipherError, CipherResult};
pub use kdf::{derive_from_enc, derive_from_raw, mac_salt, PageKeys};
pub use page::{authenticate_page, decrypt_page, validate_derived, validate_raw};
pub use profile::{CipherProfile, HashKind, KEY_LEN, MAC_SALT_XOR, SALT_LEN};
