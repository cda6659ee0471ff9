//! Core data model: target process description and the extracted key type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ExtractError;
use pagecipher::KEY_LEN;

/// Length of the image-obfuscation key.
pub const IMG_KEY_LEN: usize = 16;

/// Wire prefix marking a derived-key list in the legacy string encoding.
pub const DERIVED_PREFIX: &str = "derived:";

/// Which client build the data directory belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Darwin,
    Windows,
}

impl FromStr for Platform {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "darwin" | "macos" => Ok(Platform::Darwin),
            "windows" => Ok(Platform::Windows),
            other => Err(ExtractError::InvalidConfig(format!(
                "unknown platform '{other}' (expected darwin or windows)"
            ))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Darwin => write!(f, "darwin"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}

/// Liveness of the target process at extraction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Online,
    Offline,
}

/// The client process whose memory is searched.
#[derive(Debug, Clone)]
pub struct ProcessTarget {
    pub pid: u32,
    pub status: ProcessStatus,
}

impl ProcessTarget {
    pub fn online(pid: u32) -> Self {
        ProcessTarget {
            pid,
            status: ProcessStatus::Online,
        }
    }
}

/// The database key, as handed to the decryptor.
///
/// `Raw` is the pre-KDF secret held by older builds: one expensive stretch
/// per database. `Derived` is the set of post-KDF keys recovered from a
/// 4.1.x build, one per database; the decryptor matches each file by salt
/// using the cheap path. The `"derived:"`-prefixed string form is only a
/// wire encoding for callers that pass keys around as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataKey {
    Raw([u8; KEY_LEN]),
    Derived(Vec<[u8; KEY_LEN]>),
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKey::Raw(key) => write!(f, "{}", hex::encode(key)),
            DataKey::Derived(keys) => {
                let joined = keys.iter().map(hex::encode).collect::<Vec<_>>().join(",");
                write!(f, "{DERIVED_PREFIX}{joined}")
            }
        }
    }
}

impl FromStr for DataKey {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(list) = s.strip_prefix(DERIVED_PREFIX) {
            let keys = list
                .split(',')
                .map(parse_key_hex)
                .collect::<Result<Vec<_>, _>>()?;
            if keys.is_empty() {
                return Err(ExtractError::MalformedKey("empty derived key list".into()));
            }
            Ok(DataKey::Derived(keys))
        } else {
            Ok(DataKey::Raw(parse_key_hex(s)?))
        }
    }
}

fn parse_key_hex(s: &str) -> Result<[u8; KEY_LEN], ExtractError> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| ExtractError::MalformedKey(format!("invalid hex: {e}")))?;
    bytes.as_slice().try_into().map_err(|_| {
        ExtractError::MalformedKey(format!(
            "key must be {KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })
}
