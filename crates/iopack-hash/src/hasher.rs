use iopack_types::ContentHash;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for chunk payloads (raw, uncompressed bytes).
    pub const CHUNK: Self = Self {
        domain: "iopack-chunk-v1",
    };
    /// Hasher for entries of the global name table.
    pub const NAME: Self = Self {
        domain: "iopack-name-v1",
    };
    /// Hasher for canonicalized circular import chains.
    pub const CHAIN: Self = Self {
        domain: "iopack-chain-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ContentHash {
        let mut hasher = self.start();
        hasher.update(data);
        ContentHash::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash a sequence of parts. Each part is length-prefixed so that
    /// `["ab", "c"]` and `["a", "bc"]` hash differently.
    pub fn hash_parts<'a, I>(&self, parts: I) -> ContentHash
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut hasher = self.start();
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        ContentHash::from_hash(*hasher.finalize().as_bytes())
    }

    /// 64-bit digest, used where tables store compact hashes.
    pub fn hash64(&self, data: &[u8]) -> u64 {
        self.hash(data).prefix_u64()
    }

    /// 64-bit digest of a name, case-insensitive.
    pub fn name_hash(&self, name: &str) -> u64 {
        self.hash64(name.to_lowercase().as_bytes())
    }

    /// Verify that data produces the expected hash.
    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }

    fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }
}
