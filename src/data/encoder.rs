// ============================================================
// Layer 4   Pair Encoder
// ============================================================
// Converts TextPairs into PairSamples: for each side of the
// pair, one sequence of word ids and one of character ids.
//
// The tokenizers are WordLevel models with a WhitespaceSplit
// pre-tokenizer, so the text handed to them is the
// preprocessor's token list joined by spaces. That keeps the
// vocabulary built at training time and the ids produced here
// in exact agreement.

use anyhow::Result;
use tokenizers::Tokenizer;

use crate::data::{dataset::PairSample, preprocessor::Preprocessor};
use crate::domain::text_pair::TextPair;
use crate::infra::tokenizer_store::UNK_ID;

pub struct PairEncoder<'a> {
    word_tokenizer: &'a Tokenizer,
    char_tokenizer: &'a Tokenizer,
    max_len_word:   usize,
    max_len_char:   usize,
    preprocessor:   Preprocessor,
}

impl<'a> PairEncoder<'a> {
    pub fn new(
        word_tokenizer: &'a Tokenizer,
        char_tokenizer: &'a Tokenizer,
        max_len_word:   usize,
        max_len_char:   usize,
    ) -> Self {
        Self {
            word_tokenizer,
            char_tokenizer,
            max_len_word,
            max_len_char,
            preprocessor: Preprocessor::new(),
        }
    }

    pub fn encode(&self, pair: &TextPair) -> Result<PairSample> {
        let left  = self.preprocessor.clean(&pair.left);
        let right = self.preprocessor.clean(&pair.right);

        Ok(PairSample {
            word_left:  self.encode_words(&left)?,
            word_right: self.encode_words(&right)?,
            char_left:  self.encode_chars(&left)?,
            char_right: self.encode_chars(&right)?,
            label:      pair.label.unwrap_or(0.0),
        })
    }

    pub fn encode_all(&self, pairs: &[TextPair]) -> Result<Vec<PairSample>> {
        pairs.iter().map(|p| self.encode(p)).collect()
    }

    fn encode_words(&self, clean: &str) -> Result<Vec<u32>> {
        let tokens = self.preprocessor.word_tokens(clean);
        encode_tokens(self.word_tokenizer, &tokens, self.max_len_word)
    }

    fn encode_chars(&self, clean: &str) -> Result<Vec<u32>> {
        let tokens = self.preprocessor.char_tokens(clean);
        encode_tokens(self.char_tokenizer, &tokens, self.max_len_char)
    }
}

fn encode_tokens(tokenizer: &Tokenizer, tokens: &[String], max_len: usize) -> Result<Vec<u32>> {
    let joined = tokens.join(" ");
    let enc = tokenizer
        .encode(joined.as_str(), false)
        .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

    let mut ids: Vec<u32> = enc.get_ids().to_vec();
    ids.truncate(max_len);

    // An empty side still needs one real position for pooling
    if ids.is_empty() {
        ids.push(UNK_ID);
    }
    Ok(ids)
}
