// embeddings/ — Local sentence embedding using candle (pure Rust).
//
// Provides:
// - Model download + SHA256 verification
// - BERT inference with mean pooling
// - The `Embedder` seam the vector index calls through

pub mod download;
pub mod engine;

/// Anything that turns texts into fixed-size vectors.
pub trait Embedder {
    /// Name recorded alongside the collection it populates.
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    /// One vector per input text, in input order.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Hint for where inference should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeviceHint {
    Cpu,
    Cuda,
    Metal,
}

#[cfg(test)]
pub mod testing {
    use std::cell::RefCell;

    use sha2::{Digest, Sha256};

    use super::Embedder;

    /// Deterministic bag-of-words embedder: texts sharing words land close together.
    pub struct HashEmbedder {
        pub dims: usize,
        /// Sizes of every `embed_batch` call, in order.
        pub calls: RefCell<Vec<usize>>,
        /// Fail on the n-th call (0-based) when set.
        pub fail_on_call: Option<usize>,
    }

    impl HashEmbedder {
        pub fn new(dims: usize) -> Self {
            Self {
                dims,
                calls: RefCell::new(Vec::new()),
                fail_on_call: None,
            }
        }

        fn embed_one(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; self.dims];
            for word in text.split_whitespace() {
                let digest = Sha256::digest(word.to_lowercase().as_bytes());
                let idx =
                    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize % self.dims;
                v[idx] += 1.0;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                v.iter_mut().for_each(|x| *x /= norm);
            }
            v
        }
    }

    impl Embedder for HashEmbedder {
        fn model_name(&self) -> &str {
            "test-hash-embedder"
        }

        fn dims(&self) -> usize {
            self.dims
        }

        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            let call = self.calls.borrow().len();
            self.calls.borrow_mut().push(texts.len());
            if self.fail_on_call == Some(call) {
                anyhow::bail!("simulated embedding failure on call {call}");
            }
            Ok(texts.iter().map(|t| self.embed_one(t)).collect())
        }
    }
}
