//! The registry of supported hash functions and their trust lifecycle.

use crate::HashError;

/// Hash functions usable in imprints. Each carries a one-byte wire
/// identifier; the identifier prefixes every digest on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha2_256,
    Ripemd160,
    Sha2_384,
    Sha2_512,
}

/// SHA-1 collisions became practical; deprecated for new material since
/// 2016-07-01T00:00:00Z.
const SHA1_DEPRECATED_SINCE: u64 = 1_467_331_200;

impl HashAlgorithm {
    pub fn from_id(id: u8) -> Result<Self, HashError> {
        match id {
            0x00 => Ok(HashAlgorithm::Sha1),
            0x01 => Ok(HashAlgorithm::Sha2_256),
            0x02 => Ok(HashAlgorithm::Ripemd160),
            0x04 => Ok(HashAlgorithm::Sha2_384),
            0x05 => Ok(HashAlgorithm::Sha2_512),
            other => Err(HashError::UnknownAlgorithm(other)),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            HashAlgorithm::Sha1 => 0x00,
            HashAlgorithm::Sha2_256 => 0x01,
            HashAlgorithm::Ripemd160 => 0x02,
            HashAlgorithm::Sha2_384 => 0x04,
            HashAlgorithm::Sha2_512 => 0x05,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha2_256 => "SHA2-256",
            HashAlgorithm::Ripemd160 => "RIPEMD-160",
            HashAlgorithm::Sha2_384 => "SHA2-384",
            HashAlgorithm::Sha2_512 => "SHA2-512",
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 | HashAlgorithm::Ripemd160 => 20,
            HashAlgorithm::Sha2_256 => 32,
            HashAlgorithm::Sha2_384 => 48,
            HashAlgorithm::Sha2_512 => 64,
        }
    }

    /// Moment (UTC seconds) since which the algorithm is deprecated, if any.
    pub fn deprecated_since(self) -> Option<u64> {
        match self {
            HashAlgorithm::Sha1 => Some(SHA1_DEPRECATED_SINCE),
            _ => None,
        }
    }

    /// Moment (UTC seconds) since which the algorithm is obsolete, if any.
    pub fn obsolete_since(self) -> Option<u64> {
        None
    }

    pub fn is_deprecated_at(self, at: u64) -> bool {
        self.deprecated_since().map_or(false, |since| at >= since)
    }

    pub fn is_obsolete_at(self, at: u64) -> bool {
        self.obsolete_since().map_or(false, |since| at >= since)
    }

    /// Guards the selection of an algorithm for new signatures or HMACs.
    pub fn ensure_trusted_at(self, at: u64) -> Result<(), HashError> {
        if self.is_deprecated_at(at) || self.is_obsolete_at(at) {
            return Err(HashError::UntrustedAlgorithm(self));
        }
        Ok(())
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
