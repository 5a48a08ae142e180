//! Embedding generation.
//!
//! [`Embedder`] is the seam for a real embedding provider. The
//! [`FallbackEmbedder`] needs no external service: it scatters a
//! hash-derived magnitude for each word across ten vector positions and
//! L2-normalizes the result. Deterministic — the same text always yields
//! a bit-identical vector, which is what makes cache hits verifiable.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use banter_store::vector::l2_normalize;

/// Embedding dimensionality used throughout the system.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

/// Positions each word contributes to.
const SCATTER_WIDTH: usize = 10;

/// Embedding failures.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The provider rejected the request or was unreachable.
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// Input cannot be embedded (e.g. empty after trimming).
    #[error("nothing to embed")]
    EmptyInput,
}

/// Text → fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Output dimensionality.
    fn dimensions(&self) -> usize;
}

/// Deterministic hash-scatter embedder.
///
/// Per whitespace-delimited lowercased word: SHA-256 the word, take the
/// first eight bytes as a big-endian `u64` `h`, derive a magnitude
/// `(h % 1000) / 1000`, and add it at positions
/// `h % (dims − SCATTER_WIDTH) + 0..SCATTER_WIDTH`. The summed vector is
/// L2-normalized.
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackEmbedder;

impl FallbackEmbedder {
    /// Create the embedder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn word_hash(word: &str) -> u64 {
        let digest = Sha256::digest(word.as_bytes());
        u64::from_be_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
            digest[7],
        ])
    }

    /// Synchronous embedding core (also used by tests).
    #[must_use]
    pub fn embed_sync(text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; EMBEDDING_DIMENSIONS];
        for word in text.split_whitespace() {
            let h = Self::word_hash(&word.to_lowercase());
            let magnitude = (h % 1000) as f32 / 1000.0;
            let base = (h % (EMBEDDING_DIMENSIONS - SCATTER_WIDTH) as u64) as usize;
            for offset in 0..SCATTER_WIDTH {
                v[base + offset] += magnitude;
            }
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        Ok(Self::embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_store::vector::{cosine_similarity, l2_norm};

    #[tokio::test]
    async fn embedding_has_fixed_dimensions() {
        let v = FallbackEmbedder::new().embed("hello world").await.unwrap();
        assert_eq!(v.len(), EMBEDDING_DIMENSIONS);
    }

    #[tokio::test]
    async fn embedding_is_deterministic() {
        let e = FallbackEmbedder::new();
        let a = e.embed("the quick brown fox").await.unwrap();
        let b = e.embed("the quick brown fox").await.unwrap();
        // Bit-identical, not just approximately equal
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn embedding_is_unit_norm() {
        let v = FallbackEmbedder::new()
            .embed("some words to embed here")
            .await
            .unwrap();
        assert!((l2_norm(&v) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn different_texts_differ() {
        let e = FallbackEmbedder::new();
        let a = e.embed("completely unrelated topic").await.unwrap();
        let b = e.embed("orthogonal subject matter").await.unwrap();
        assert_ne!(a, b);
        assert!(cosine_similarity(&a, &b) < 0.999);
    }

    #[tokio::test]
    async fn case_is_folded() {
        let e = FallbackEmbedder::new();
        let a = e.embed("Hello World").await.unwrap();
        let b = e.embed("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn word_order_does_not_matter() {
        // Scatter-sum is commutative over words.
        let e = FallbackEmbedder::new();
        let a = e.embed("alpha beta").await.unwrap();
        let b = e.embed("beta alpha").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn overlapping_texts_are_more_similar() {
        let e = FallbackEmbedder::new();
        let base = e.embed("rust async runtime scheduling").await.unwrap();
        let near = e.embed("rust async runtime internals").await.unwrap();
        let far = e.embed("sourdough hydration ratios").await.unwrap();
        assert!(
            cosine_similarity(&base, &near) > cosine_similarity(&base, &far),
            "shared words should raise similarity"
        );
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let e = FallbackEmbedder::new();
        assert!(matches!(e.embed("").await, Err(EmbedError::EmptyInput)));
        assert!(matches!(e.embed("   \t\n").await, Err(EmbedError::EmptyInput)));
    }

    #[test]
    fn single_word_touches_ten_positions() {
        let v = FallbackEmbedder::embed_sync("hello");
        let nonzero = v.iter().filter(|x| **x != 0.0).count();
        assert_eq!(nonzero, SCATTER_WIDTH);
    }

    #[test]
    fn scatter_positions_stay_in_bounds() {
        // Exercise many words; any out-of-bounds index would panic.
        let text: String = (0..500).map(|i| format!("w{i} ")).collect();
        let v = FallbackEmbedder::embed_sync(&text);
        assert_eq!(v.len(), EMBEDDING_DIMENSIONS);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn deterministic_for_any_text(text in "[a-z ]{1,80}") {
                let a = FallbackEmbedder::embed_sync(&text);
                let b = FallbackEmbedder::embed_sync(&text);
                prop_assert_eq!(a, b);
            }

            #[test]
            fn unit_norm_for_non_empty(text in "[a-z]{1,12}( [a-z]{1,12}){0,8}") {
                let v = FallbackEmbedder::embed_sync(&text);
                prop_assert!((l2_norm(&v) - 1.0).abs() < 1e-4);
            }
        }
    }
}
