//! Bytecode version marker stored in lock entries.

use sha2::{Digest, Sha256};

/// Everything that, when changed, requires redeploying a unit.
///
/// Init code is the linked creation bytecode followed by the ABI-encoded
/// constructor arguments, so a new library address or argument value also
/// changes the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFingerprint<'a> {
    pub init_code: &'a [u8],
}

impl<'a> UnitFingerprint<'a> {
    pub fn new(init_code: &'a [u8]) -> Self {
        Self { init_code }
    }

    /// SHA-256 of the init code, hex encoded.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.init_code);
        hex::encode(hasher.finalize())
    }
}
