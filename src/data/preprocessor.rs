// ============================================================
// Layer 4   Text Preprocessor
// ============================================================
// Cleans raw pair text before tokenisation and splits it
// into the two granularities the model reads:
//
//   word level: "What's up?!" → ["what", "'", "s", "up", "?!"]
//   char level: "What's up?!" → ["w", "h", "a", "t", "'", "s", "u", "p", "?", "!"]
//
// Cleaning steps (applied in order):
//   1. Replace Unicode whitespace variants and control chars with a space
//   2. Lowercase
//   3. Collapse runs of whitespace into one space and trim

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean a raw text for downstream tokenisation.
    pub fn clean(&self, text: &str) -> String {
        // ── Step 1: Normalise individual characters ───────────────────────────
        let normalised: String = text
            .chars()
            .map(|c| match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_control() => ' ',
                c => c,
            })
            .flat_map(char::to_lowercase)
            .collect();

        // ── Step 2: Collapse whitespace ───────────────────────────────────────
        normalised.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Split cleaned text into words. Alphanumeric runs form one
    /// token, and so do runs of other non-space characters ("?!").
    pub fn word_tokens(&self, text: &str) -> Vec<String> {
        let mut tokens  = Vec::new();
        let mut current = String::new();
        let mut in_word = false;

        for c in text.chars() {
            if c.is_whitespace() {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                continue;
            }
            let is_word = c.is_alphanumeric();
            if !current.is_empty() && is_word != in_word {
                tokens.push(std::mem::take(&mut current));
            }
            in_word = is_word;
            current.push(c);
        }
        if !current.is_empty() {
            tokens.push(current);
        }

        tokens
    }

    /// Split cleaned text into non-whitespace characters.
    pub fn char_tokens(&self, text: &str) -> Vec<String> {
        text.chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_and_lowercases() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("  Hello \t\u{00A0} World\n"), "hello world");
    }

    #[test]
    fn test_removes_control_chars() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("hello\x01world"), "hello world");
    }

    #[test]
    fn test_empty_string() {
        let p = Preprocessor::new();
        assert_eq!(p.clean(""), "");
        assert!(p.word_tokens("").is_empty());
        assert!(p.char_tokens("   ").is_empty());
    }

    #[test]
    fn test_word_tokens_split_punctuation() {
        let p = Preprocessor::new();
        assert_eq!(
            p.word_tokens("what's up?"),
            vec!["what", "'", "s", "up", "?"]
        );
    }

    #[test]
    fn test_word_tokens_group_punctuation_runs() {
        let p = Preprocessor::new();
        assert_eq!(p.word_tokens("really??"), vec!["really", "??"]);
        assert_eq!(p.word_tokens("wait... what?!"), vec!["wait", "...", "what", "?!"]);
        // A space ends a run
        assert_eq!(p.word_tokens("? ?"), vec!["?", "?"]);
    }

    #[test]
    fn test_char_tokens_skip_spaces() {
        let p = Preprocessor::new();
        assert_eq!(p.char_tokens("ab c"), vec!["a", "b", "c"]);
        // Non-Latin scripts split per character too
        assert_eq!(p.char_tokens("花呗"), vec!["花", "呗"]);
    }
}
