/// Content hashing — streaming file digests and directory combination.
///
/// Files are read in bounded chunks and fed into an incremental SHA-2
/// accumulator, so memory use is independent of file size. Directory
/// hashes combine the sorted `(name, child hash)` pairs of their direct
/// children with the same primitive.
use crate::error::AccessError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Lowercase hex digest identifying content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wrap an already-encoded hex digest (e.g. read back from a snapshot).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `n` hex characters, for compact display.
    pub fn short(&self, n: usize) -> &str {
        &self.0[..n.min(self.0.len())]
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        use std::fmt::Write;
        let hex = bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        });
        Self(hex)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supported digest algorithms. Both are SHA-2 family, ≥256-bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hex encoding of a digest.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    pub fn digest_bytes(self, bytes: &[u8]) -> ContentHash {
        match self {
            Self::Sha256 => ContentHash::from_bytes(&Sha256::digest(bytes)),
            Self::Sha512 => ContentHash::from_bytes(&Sha512::digest(bytes)),
        }
    }

    /// Stream `reader` through the digest in `chunk_size` pieces.
    pub fn digest_reader<R: Read>(self, reader: R, chunk_size: usize) -> io::Result<ContentHash> {
        match self {
            Self::Sha256 => stream_digest::<Sha256, R>(reader, chunk_size),
            Self::Sha512 => stream_digest::<Sha512, R>(reader, chunk_size),
        }
    }

    /// Hash of a directory with no readable children.
    pub fn empty(self) -> ContentHash {
        self.digest_bytes(&[])
    }

    /// Combine a directory's direct children into one hash.
    ///
    /// Children are sorted by name first, so the result does not depend on
    /// the order the filesystem returned them in. Each pair is fed as
    /// `name \0 hash \n`; names cannot contain NUL, so the framing is
    /// unambiguous.
    pub fn combine<'a, I>(self, children: I) -> ContentHash
    where
        I: IntoIterator<Item = (&'a str, &'a ContentHash)>,
    {
        let mut pairs: Vec<(&str, &ContentHash)> = children.into_iter().collect();
        if pairs.is_empty() {
            return self.empty();
        }
        pairs.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        match self {
            Self::Sha256 => combine_pairs::<Sha256>(&pairs),
            Self::Sha512 => combine_pairs::<Sha512>(&pairs),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            other => Err(format!("unknown hash algorithm '{other}' (expected sha256 or sha512)")),
        }
    }
}

fn stream_digest<D: Digest, R: Read>(mut reader: R, chunk_size: usize) -> io::Result<ContentHash> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(ContentHash::from_bytes(&hasher.finalize()))
}

fn combine_pairs<D: Digest>(pairs: &[(&str, &ContentHash)]) -> ContentHash {
    let mut hasher = D::new();
    for (name, hash) in pairs {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(hash.as_str().as_bytes());
        hasher.update([b'\n']);
    }
    ContentHash::from_bytes(&hasher.finalize())
}

/// Per-file hashing seam.
///
/// The walker only talks to this trait, so tests can count invocations or
/// inject failures without touching the filesystem.
pub trait ContentHasher: Send + Sync {
    /// Algorithm used for files; directory combination uses the same one.
    fn algorithm(&self) -> HashAlgorithm;

    /// Digest a single file's bytes.
    fn hash_file(&self, path: &Path) -> Result<ContentHash, AccessError>;
}

/// The production hasher: bounded-chunk streaming reads.
#[derive(Debug, Clone, Copy)]
pub struct StreamHasher {
    algorithm: HashAlgorithm,
    chunk_size: usize,
}

impl StreamHasher {
    pub fn new(algorithm: HashAlgorithm, chunk_size: usize) -> Self {
        Self {
            algorithm,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl ContentHasher for StreamHasher {
    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn hash_file(&self, path: &Path) -> Result<ContentHash, AccessError> {
        let file = File::open(path).map_err(|e| AccessError::from_io(path, &e))?;
        self.algorithm
            .digest_reader(file, self.chunk_size)
            .map_err(|e| AccessError::from_io(path, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccessErrorKind;
    use std::io::Cursor;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn known_sha256_vectors() {
        assert_eq!(HashAlgorithm::Sha256.digest_bytes(b"hello").as_str(), HELLO_SHA256);
        assert_eq!(HashAlgorithm::Sha256.empty().as_str(), EMPTY_SHA256);
    }

    #[test]
    fn streaming_matches_one_shot_for_any_chunk_size() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let expected = HashAlgorithm::Sha256.digest_bytes(&data);
        for chunk in [1, 7, 4096, 1 << 20] {
            let got = HashAlgorithm::Sha256
                .digest_reader(Cursor::new(&data), chunk)
                .unwrap();
            assert_eq!(got, expected, "chunk size {chunk}");
        }
    }

    #[test]
    fn hex_lengths_are_fixed() {
        assert_eq!(HashAlgorithm::Sha256.digest_bytes(b"x").as_str().len(), 64);
        assert_eq!(HashAlgorithm::Sha512.digest_bytes(b"x").as_str().len(), 128);
        let h = HashAlgorithm::Sha512.digest_bytes(b"x");
        assert!(h.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn combine_is_order_independent() {
        let a = HashAlgorithm::Sha256.digest_bytes(b"a");
        let b = HashAlgorithm::Sha256.digest_bytes(b"b");
        let one = HashAlgorithm::Sha256.combine([("x.txt", &a), ("y.txt", &b)]);
        let two = HashAlgorithm::Sha256.combine([("y.txt", &b), ("x.txt", &a)]);
        assert_eq!(one, two);
    }

    #[test]
    fn combine_depends_on_names_and_hashes() {
        let a = HashAlgorithm::Sha256.digest_bytes(b"a");
        let b = HashAlgorithm::Sha256.digest_bytes(b"b");
        let base = HashAlgorithm::Sha256.combine([("x", &a), ("y", &b)]);
        let swapped = HashAlgorithm::Sha256.combine([("x", &b), ("y", &a)]);
        let renamed = HashAlgorithm::Sha256.combine([("x", &a), ("z", &b)]);
        assert_ne!(base, swapped);
        assert_ne!(base, renamed);
    }

    #[test]
    fn combine_of_nothing_is_the_empty_constant() {
        let none: [(&str, &ContentHash); 0] = [];
        assert_eq!(HashAlgorithm::Sha256.combine(none), HashAlgorithm::Sha256.empty());
    }

    #[test]
    fn algorithm_parses_case_insensitively() {
        assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha-512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn hashing_a_missing_file_is_a_typed_error() {
        let hasher = StreamHasher::new(HashAlgorithm::Sha256, 4096);
        let err = hasher
            .hash_file(Path::new("/definitely/not/here.bin"))
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::NotFound);
    }

    #[test]
    fn hashing_a_real_file_matches_its_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();
        let hasher = StreamHasher::new(HashAlgorithm::Sha256, 2);
        assert_eq!(hasher.hash_file(&path).unwrap().as_str(), HELLO_SHA256);
    }
}
