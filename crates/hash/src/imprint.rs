//! Algorithm-prefixed digests.

use crate::{HashAlgorithm, HashError};

/// A digest prefixed with its one-byte algorithm identifier. Two imprints
/// are equal iff their bytes are equal. The algorithm byte may name an
/// algorithm this build does not implement; such imprints stay opaque and
/// only fail once a digest has to be recomputed or length-checked.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Imprint(Vec<u8>);

impl Imprint {
    /// Wraps raw imprint bytes. The digest length is validated when the
    /// algorithm is a known one.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        let (id, digest) = bytes.split_first().ok_or(HashError::EmptyImprint)?;
        if let Ok(algorithm) = HashAlgorithm::from_id(*id) {
            if digest.len() != algorithm.digest_len() {
                return Err(HashError::DigestLengthMismatch {
                    algorithm,
                    expected: algorithm.digest_len(),
                    actual: digest.len(),
                });
            }
        }
        Ok(Imprint(bytes.to_vec()))
    }

    pub fn new(algorithm: HashAlgorithm, digest: Vec<u8>) -> Result<Self, HashError> {
        if digest.len() != algorithm.digest_len() {
            return Err(HashError::DigestLengthMismatch {
                algorithm,
                expected: algorithm.digest_len(),
                actual: digest.len(),
            });
        }
        let mut bytes = Vec::with_capacity(1 + digest.len());
        bytes.push(algorithm.id());
        bytes.extend_from_slice(&digest);
        Ok(Imprint(bytes))
    }

    pub fn algorithm_id(&self) -> u8 {
        self.0[0]
    }

    pub fn algorithm(&self) -> Result<HashAlgorithm, HashError> {
        HashAlgorithm::from_id(self.0[0])
    }

    pub fn digest(&self) -> &[u8] {
        &self.0[1..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(s).map_err(|_| HashError::InvalidHex)?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Display for Imprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl std::fmt::Debug for Imprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Imprint({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_checked_for_known_algorithms() {
        assert!(Imprint::from_bytes(&[0x01; 33]).is_ok());
        assert!(matches!(
            Imprint::from_bytes(&[0x01, 0xaa, 0xbb]),
            Err(HashError::DigestLengthMismatch { .. })
        ));
        assert_eq!(Imprint::from_bytes(&[]), Err(HashError::EmptyImprint));
    }

    #[test]
    fn unknown_algorithms_stay_opaque() {
        let imprint = Imprint::from_bytes(&[0x7f, 1, 2, 3]).unwrap();
        assert_eq!(imprint.algorithm_id(), 0x7f);
        assert!(imprint.algorithm().is_err());
        assert_eq!(imprint.digest(), &[1, 2, 3]);
    }

    #[test]
    fn hex_round_trip() {
        let imprint =
            Imprint::from_hex("0111a700b0c8066c47ecba05ed37bc14dcadb238552d86c659342d1d7e87b8772d")
                .unwrap();
        assert_eq!(imprint.algorithm().unwrap(), HashAlgorithm::Sha2_256);
        assert_eq!(
            imprint.to_string(),
            "0111a700b0c8066c47ecba05ed37bc14dcadb238552d86c659342d1d7e87b8772d"
        );
    }
}
