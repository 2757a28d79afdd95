// ============================================================
// Layer 6   Embedding Store
// ============================================================
// Loads pretrained vectors from a text embedding file into a
// [vocab_size, dim] matrix ordered by tokenizer id.
//
// File format (GloVe / fastText .vec):
//   [optional header: "<count> <dim>"]
//   token v1 v2 … vd
//
// Matrix rows:
//   [PAD]          zeros
//   found in file  the file's vector (first occurrence wins;
//                  unknown tokens are retried lowercased)
//   missing        uniform in [-0.05, 0.05] from a seeded RNG

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use crate::infra::tokenizer_store::PAD_ID;

const INIT_RANGE: f32 = 0.05;

/// Row-major `[rows, dim]` embedding weights.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    pub values: Vec<f32>,
    pub rows:   usize,
    pub dim:    usize,
    /// Rows filled from the file
    pub hits:   usize,
}

/// Optional pretrained matrices for each granularity.
#[derive(Debug, Clone, Default)]
pub struct PretrainedEmbeddings {
    pub word:      Option<EmbeddingMatrix>,
    pub character: Option<EmbeddingMatrix>,
}

pub struct EmbeddingStore {
    path: PathBuf,
}

impl EmbeddingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Builds the matrix for `vocab` (token → id). Every vector in the
    /// file must have exactly `dim` components.
    pub fn load(&self, vocab: &HashMap<String, u32>, dim: usize, seed: u64) -> Result<EmbeddingMatrix> {
        let rows = vocab.values().map(|&id| id as usize + 1).max().unwrap_or(0);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut values: Vec<f32> = (0..rows * dim)
            .map(|_| rng.gen_range(-INIT_RANGE..INIT_RANGE))
            .collect();
        let pad = PAD_ID as usize;
        if pad < rows {
            values[pad * dim..(pad + 1) * dim].fill(0.0);
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open embedding file '{}'", self.path.display()))?;

        let mut filled = vec![false; rows];
        let mut hits   = 0usize;

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Cannot read '{}'", self.path.display()))?;
            let mut parts = line.split_whitespace();
            let Some(token) = parts.next() else { continue };
            let rest: Vec<&str> = parts.collect();

            if line_no == 0 && is_header(token, &rest) {
                if rest[0] != dim.to_string() {
                    bail!(
                        "'{}' declares dimension {} but the model expects {dim}",
                        self.path.display(),
                        rest[0]
                    );
                }
                continue;
            }

            if rest.len() != dim {
                bail!(
                    "'{}' line {}: expected {dim} values for '{token}', found {}",
                    self.path.display(),
                    line_no + 1,
                    rest.len()
                );
            }

            let id = match vocab.get(token).or_else(|| vocab.get(&token.to_lowercase())) {
                Some(&id) => id as usize,
                None => continue,
            };
            if id == pad || filled[id] {
                continue;
            }

            let row = &mut values[id * dim..(id + 1) * dim];
            for (slot, raw) in row.iter_mut().zip(&rest) {
                *slot = raw.parse().with_context(|| {
                    format!("'{}' line {}: bad number '{raw}'", self.path.display(), line_no + 1)
                })?;
            }
            filled[id] = true;
            hits += 1;
        }

        tracing::info!(
            "Loaded embeddings from '{}': {}/{} tokens found (dim={})",
            self.path.display(),
            hits,
            rows,
            dim
        );
        Ok(EmbeddingMatrix { values, rows, dim, hits })
    }
}

/// word2vec-style first line: two integers.
fn is_header(first: &str, rest: &[&str]) -> bool {
    rest.len() == 1 && first.parse::<usize>().is_ok() && rest[0].parse::<usize>().is_ok()
}
