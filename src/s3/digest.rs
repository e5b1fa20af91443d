//! Streaming MD5 + SHA-256 over an arbitrary sequence of buffers.

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest as _, Sha256};

/// Finalized digests of a byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Digest {
    pub md5: [u8; 16],
    pub sha256: [u8; 32],
    pub len: u64,
}

impl Digest {
    pub fn md5_hex(&self) -> String {
        hex::encode(self.md5)
    }

    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }

    /// Value for a `Content-MD5` header.
    pub fn md5_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.md5)
    }
}

#[derive(Clone)]
pub struct DigestAccumulator {
    md5: md5::Context,
    sha256: Sha256,
    len: u64,
}

impl Default for DigestAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestAccumulator {
    pub fn new() -> Self {
        Self {
            md5: md5::Context::new(),
            sha256: Sha256::new(),
            len: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.md5.consume(data);
        self.sha256.update(data);
        self.len += data.len() as u64;
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> Digest {
        Digest {
            md5: self.md5.compute().0,
            sha256: self.sha256.finalize().into(),
            len: self.len,
        }
    }

    /// Finalizes the bytes seen so far and leaves a fresh accumulator behind.
    pub fn reset(&mut self) -> Digest {
        std::mem::take(self).finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        let digest = DigestAccumulator::new().finalize();
        assert_eq!(digest.len, 0);
        assert_eq!(digest.md5_hex(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            digest.sha256_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(digest.md5_base64(), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn split_updates_match_single_update() {
        let mut split = DigestAccumulator::new();
        split.update(b"hel");
        split.update(b"");
        split.update(b"lo");

        let mut whole = DigestAccumulator::new();
        whole.update(b"hello");

        let split = split.finalize();
        assert_eq!(split, whole.finalize());
        assert_eq!(split.md5_hex(), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(
            split.sha256_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(split.len, 5);
    }

    #[test]
    fn reset_starts_over() {
        let mut acc = DigestAccumulator::new();
        acc.update(b"first chunk");
        let first = acc.reset();

        assert!(acc.is_empty());
        acc.update(b"hello");
        let second = acc.finalize();

        assert_eq!(first.len, 11);
        assert_eq!(second.len, 5);
        assert_eq!(second.md5_hex(), "5d41402abc4b2a76b9719d911017c592");
    }
}
