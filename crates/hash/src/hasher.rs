//! Incremental hashing and keyed hashing over the registry algorithms.

use hmac::{Hmac, Mac};
use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::{HashAlgorithm, HashError, Imprint};

enum Inner {
    Sha1(Sha1),
    Sha256(Sha256),
    Ripemd160(Ripemd160),
    Sha384(Sha384),
    Sha512(Sha512),
}

/// Incremental digest computation producing an [`Imprint`].
pub struct DataHasher {
    algorithm: HashAlgorithm,
    inner: Inner,
}

impl DataHasher {
    pub fn open(algorithm: HashAlgorithm) -> Self {
        let inner = match algorithm {
            HashAlgorithm::Sha1 => Inner::Sha1(Sha1::new()),
            HashAlgorithm::Sha2_256 => Inner::Sha256(Sha256::new()),
            HashAlgorithm::Ripemd160 => Inner::Ripemd160(Ripemd160::new()),
            HashAlgorithm::Sha2_384 => Inner::Sha384(Sha384::new()),
            HashAlgorithm::Sha2_512 => Inner::Sha512(Sha512::new()),
        };
        DataHasher { algorithm, inner }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn add(&mut self, data: &[u8]) -> &mut Self {
        match &mut self.inner {
            Inner::Sha1(h) => h.update(data),
            Inner::Sha256(h) => h.update(data),
            Inner::Ripemd160(h) => h.update(data),
            Inner::Sha384(h) => h.update(data),
            Inner::Sha512(h) => h.update(data),
        }
        self
    }

    pub fn close(self) -> Imprint {
        let digest = match self.inner {
            Inner::Sha1(h) => h.finalize().to_vec(),
            Inner::Sha256(h) => h.finalize().to_vec(),
            Inner::Ripemd160(h) => h.finalize().to_vec(),
            Inner::Sha384(h) => h.finalize().to_vec(),
            Inner::Sha512(h) => h.finalize().to_vec(),
        };
        Imprint::new(self.algorithm, digest).expect("digest length matches algorithm")
    }

    /// One-shot convenience.
    pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Imprint {
        let mut hasher = DataHasher::open(algorithm);
        hasher.add(data);
        hasher.close()
    }
}

macro_rules! keyed {
    ($digest:ty, $key:expr, $data:expr) => {{
        let mut mac = Hmac::<$digest>::new_from_slice($key)
            .expect("hmac accepts keys of any length");
        mac.update($data);
        mac.finalize().into_bytes().to_vec()
    }};
}

/// Keyed hash over `data`, returned as an imprint of the given algorithm.
pub fn hmac(algorithm: HashAlgorithm, key: &[u8], data: &[u8]) -> Result<Imprint, HashError> {
    let digest = match algorithm {
        HashAlgorithm::Sha1 => keyed!(Sha1, key, data),
        HashAlgorithm::Sha2_256 => keyed!(Sha256, key, data),
        HashAlgorithm::Ripemd160 => keyed!(Ripemd160, key, data),
        HashAlgorithm::Sha2_384 => keyed!(Sha384, key, data),
        HashAlgorithm::Sha2_512 => keyed!(Sha512, key, data),
    };
    Imprint::new(algorithm, digest)
}
