//! FNV-1a hash-based embedder for deterministic tweet embeddings.
//!
//! Feature hashing (the "hashing trick") converts text into fixed-dimension
//! dense vectors with no model files and no network calls:
//!
//! 1. Tokenize on non-alphanumeric boundaries
//! 2. Hash each token with FNV-1a (64-bit)
//! 3. The hash picks the index (`hash % dimension`) and the sign (bit 63)
//! 4. L2-normalize the result
//!
//! Same input always produces the same output, so embeddings survive
//! re-indexing and backfill resumes cleanly mid-way.

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 384;

/// Minimum token length to include (filter single-char tokens).
const MIN_TOKEN_LEN: usize = 2;

/// FNV-1a hash-based embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create a new hash embedder with the specified dimension.
    ///
    /// # Panics
    ///
    /// Panics if dimension is 0.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "dimension must be positive");
        Self { dimension }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed text into an L2-normalized vector.
    ///
    /// Text with no usable tokens maps to a uniform normalized vector so the
    /// result is always well-defined.
    #[must_use]
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);

        if tokens.is_empty() {
            let mut embedding = vec![1.0f32; self.dimension];
            l2_normalize(&mut embedding);
            return embedding;
        }

        let mut embedding = vec![0.0f32; self.dimension];
        for token in &tokens {
            let hash = Self::fnv1a_hash(token.as_bytes());
            let dim = u64::try_from(self.dimension).unwrap_or(u64::MAX);
            let idx = usize::try_from(hash % dim).unwrap_or(0);
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            embedding[idx] += sign;
        }

        l2_normalize(&mut embedding);
        embedding
    }

    /// Compute FNV-1a hash of a byte slice.
    #[inline]
    fn fnv1a_hash(bytes: &[u8]) -> u64 {
        let mut hash = FNV_OFFSET_BASIS;
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    /// Tokenize text into lowercase alphanumeric tokens.
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() >= MIN_TOKEN_LEN)
            .map(String::from)
            .collect()
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

/// Normalize a vector to unit L2 length in place.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Dot product of two vectors. For L2-normalized inputs this is the cosine
/// similarity.
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Serialize an embedding as little-endian f32 bytes for BLOB storage.
#[must_use]
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserialize an embedding stored by [`embedding_to_bytes`].
#[must_use]
pub fn embedding_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
