//! Host-level preconditions for reading another process's memory.

use crate::model::Platform;

/// Whether OS integrity protection blocks memory reads for `platform`.
///
/// On macOS, attaching to the client requires System Integrity Protection
/// to be disabled; extraction refuses early with a distinguished error
/// rather than failing opaquely inside the memory reader. Windows needs no
/// equivalent check (debug privilege is handled by the reader itself).
pub fn host_integrity_enabled(platform: Platform) -> bool {
    match platform {
        Platform::Darwin => sip_enabled(),
        Platform::Windows => false,
    }
}

#[cfg(target_os = "macos")]
fn sip_enabled() -> bool {
    use std::process::Command;

    // `csrutil status` prints "System Integrity Protection status: enabled."
    // when SIP is on. If the probe itself fails, assume the restrictive case.
    match Command::new("csrutil").arg("status").output() {
        Ok(out) => String::from_utf8_lossy(&out.stdout)
            .to_ascii_lowercase()
            .contains("enabled"),
        Err(_) => true,
    }
}

#[cfg(not(target_os = "macos"))]
fn sip_enabled() -> bool {
    false
}
