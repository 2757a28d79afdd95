// ============================================================
// Layer 6   Tokenizer Store
// ============================================================
// Builds, saves and loads the two tokenizers the model reads:
//
//   word_tokenizer.json   one id per word / punctuation token
//   char_tokenizer.json   one id per non-space character
//
// Both are HuggingFace WordLevel tokenizers with a
// WhitespaceSplit pre-tokenizer. The Preprocessor does all
// cleaning and splitting; the encoder joins its tokens with
// spaces, so the tokenizer only has to look words up.
//
// Vocabulary layout:
//   0  [PAD]
//   1  [UNK]
//   2… tokens by descending corpus frequency, ties alphabetical,
//      dropping tokens seen fewer than min_count times, capped
//      so the whole vocabulary fits in vocab_size ids

use anyhow::{ensure, Context, Result};
use std::{collections::HashMap, path::PathBuf};
use tokenizers::Tokenizer;

use crate::data::preprocessor::Preprocessor;

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

const WORD_FILE: &str = "word_tokenizer.json";
const CHAR_FILE: &str = "char_tokenizer.json";

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<String>) -> Self {
        Self { dir: PathBuf::from(dir.into()) }
    }

    /// Load previously saved (word, char) tokenizers.
    pub fn load(&self) -> Result<(Tokenizer, Tokenizer)> {
        Ok((self.load_file(WORD_FILE)?, self.load_file(CHAR_FILE)?))
    }

    fn load_file(&self, name: &str) -> Result<Tokenizer> {
        let path = self.dir.join(name);
        Tokenizer::from_file(&path).map_err(|e| {
            anyhow::anyhow!(
                "Cannot load tokenizer from '{}': {}. Have you run 'train' first?",
                path.display(),
                e
            )
        })
    }

    /// Count tokens over raw `texts`, write both tokenizer files and
    /// return the (word, char) tokenizers loaded back from disk.
    pub fn build(
        &self,
        texts:           &[String],
        word_vocab_size: usize,
        char_vocab_size: usize,
        min_count:       usize,
    ) -> Result<(Tokenizer, Tokenizer)> {
        ensure!(
            word_vocab_size > 2 && char_vocab_size > 2,
            "vocab sizes must leave room beyond [PAD] and [UNK]"
        );
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        // ── Step 1: Count tokens at both granularities ────────────────────────
        let preprocessor = Preprocessor::new();
        let mut word_freq: HashMap<String, usize> = HashMap::new();
        let mut char_freq: HashMap<String, usize> = HashMap::new();

        for text in texts {
            let clean = preprocessor.clean(text);
            for w in preprocessor.word_tokens(&clean) {
                *word_freq.entry(w).or_insert(0) += 1;
            }
            for c in preprocessor.char_tokens(&clean) {
                *char_freq.entry(c).or_insert(0) += 1;
            }
        }

        // ── Step 2: Rank and write ────────────────────────────────────────────
        let words = rank_vocabulary(word_freq, word_vocab_size, min_count);
        let chars = rank_vocabulary(char_freq, char_vocab_size, min_count);

        let word_tok = self.write_tokenizer(WORD_FILE, &words)?;
        let char_tok = self.write_tokenizer(CHAR_FILE, &chars)?;

        tracing::info!(
            "Tokenizers built: {} word ids, {} char ids, saved to '{}'",
            word_tok.get_vocab_size(true),
            char_tok.get_vocab_size(true),
            self.dir.display()
        );
        Ok((word_tok, char_tok))
    }

    fn write_tokenizer(&self, name: &str, tokens: &[String]) -> Result<Tokenizer> {
        let mut vocab = serde_json::json!({
            PAD_TOKEN: PAD_ID,
            UNK_TOKEN: UNK_ID,
        });
        for (i, token) in tokens.iter().enumerate() {
            vocab[token] = serde_json::json!(i + 2);
        }

        // HuggingFace tokenizer.json layout, read back by Tokenizer::from_file
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {"id": PAD_ID, "content": PAD_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": UNK_ID, "content": UNK_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
            ],
            "normalizer": null,
            "pre_tokenizer": {
                "type": "WhitespaceSplit"
            },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        let path = self.dir.join(name);
        std::fs::write(&path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write tokenizer JSON '{}'", path.display()))?;

        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot reload tokenizer '{}': {e}", path.display()))
    }
}

/// Tokens with at least `min_count` occurrences, most frequent first
/// (ties alphabetical), at most `vocab_size - 2` of them.
fn rank_vocabulary(freq: HashMap<String, usize>, vocab_size: usize, min_count: usize) -> Vec<String> {
    let mut ranked: Vec<(String, usize)> = freq
        .into_iter()
        .filter(|(token, count)| *count >= min_count && token != PAD_TOKEN && token != UNK_TOKEN)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(vocab_size.saturating_sub(2));
    ranked.into_iter().map(|(token, _)| token).collect()
}
