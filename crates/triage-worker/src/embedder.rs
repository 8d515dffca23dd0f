//! Deterministic text embedder
//!
//! Feature hashing over lowercase word tokens: each token is hashed with
//! blake3 into one of [`EMBEDDING_DIM`] buckets with a sign taken from the
//! hash, and the result is L2-normalised. Texts sharing most of their words
//! land close together under cosine similarity, which is all the
//! deduplication engine needs.

use std::sync::LazyLock;

use regex::Regex;

/// Embedding width
pub const EMBEDDING_DIM: usize = 384;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9']+").expect("TOKEN_RE regex should compile"));

/// Feature-hashing embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl HashingEmbedder {
    /// Embedder producing `dim`-wide vectors (at least 1)
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed a ticket's subject and body together
    pub fn embed_ticket(&self, subject: &str, body: &str) -> Vec<f32> {
        self.embed(&format!("{subject} {body}"))
    }

    /// Unit-length vector for `text`; the zero vector when it has no tokens
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        let lowered = text.to_lowercase();

        for token in TOKEN_RE.find_iter(&lowered) {
            let hash = blake3::hash(token.as_str().as_bytes());
            let bytes = hash.as_bytes();
            let mut head = [0u8; 8];
            head.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(head) % self.dim as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}
