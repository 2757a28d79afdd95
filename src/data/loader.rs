// ============================================================
// Layer 4   Pair Loader
// ============================================================
// Reads labelled or unlabeled text pairs from disk.
//
// Two formats are accepted, chosen by file extension:
//
//   .jsonl / .json   one JSON object per line
//       {"left": "...", "right": "...", "label": 1}
//
//   anything else    tab-separated columns
//       label<TAB>left<TAB>right     (labelled)
//       left<TAB>right               (unlabeled)
//
// A first TSV line whose label column is not a number is a
// header and is skipped. Malformed lines are skipped with a
// warning rather than failing the whole file.

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::text_pair::TextPair;
use crate::domain::traits::PairSource;

/// Loads all pairs from a single file.
pub struct PairFileLoader {
    path: PathBuf,
}

impl PairFileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn is_json_lines(&self) -> bool {
        matches!(
            self.path.extension().and_then(|e| e.to_str()),
            Some("jsonl") | Some("json")
        )
    }
}

impl PairSource for PairFileLoader {
    fn load_all(&self) -> Result<Vec<TextPair>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read pairs file '{}'", self.path.display()))?;

        let pairs = if self.is_json_lines() {
            parse_json_lines(&text, &self.path)
        } else {
            parse_tsv(&text, &self.path)
        };

        tracing::info!(
            "Loaded {} pairs ({} labelled) from '{}'",
            pairs.len(),
            pairs.iter().filter(|p| p.is_labelled()).count(),
            self.path.display()
        );
        Ok(pairs)
    }
}

fn parse_json_lines(text: &str, path: &Path) -> Vec<TextPair> {
    let mut pairs = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<TextPair>(line) {
            Ok(pair) => pairs.push(normalise_label(pair)),
            Err(e) => tracing::warn!(
                "Skipping '{}' line {}: {}",
                path.display(),
                line_no + 1,
                e
            ),
        }
    }

    pairs
}

fn parse_tsv(text: &str, path: &Path) -> Vec<TextPair> {
    let mut pairs = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();

        match cols.as_slice() {
            [label, left, right] => match label.trim().parse::<f32>() {
                Ok(label) => pairs.push(TextPair::labelled(*left, *right, label)),
                Err(_) if line_no == 0 => {
                    tracing::debug!("Treating first line of '{}' as a header", path.display());
                }
                Err(_) => tracing::warn!(
                    "Skipping '{}' line {}: label '{}' is not a number",
                    path.display(),
                    line_no + 1,
                    label
                ),
            },
            [left, right] => pairs.push(TextPair::new(*left, *right)),
            _ => tracing::warn!(
                "Skipping '{}' line {}: expected 2 or 3 tab-separated columns, found {}",
                path.display(),
                line_no + 1,
                cols.len()
            ),
        }
    }

    pairs
}

fn normalise_label(pair: TextPair) -> TextPair {
    match pair.label {
        Some(label) => TextPair::labelled(pair.left, pair.right, label),
        None => pair,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_loads_json_lines() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "pairs.jsonl",
            "{\"left\":\"a b\",\"right\":\"a c\",\"label\":1}\n\n{\"left\":\"x\",\"right\":\"y\"}\nnot json\n",
        );

        let pairs = PairFileLoader::new(path).load_all().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].label, Some(1.0));
        assert_eq!(pairs[1].label, None);
    }

    #[test]
    fn test_loads_tsv_with_header() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "pairs.tsv",
            "label\tleft\tright\n1\thow are you\thow do you do\n0\tcat\tdog\nbad\tline\there\n",
        );

        let pairs = PairFileLoader::new(path).load_all().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].left, "how are you");
        assert_eq!(pairs[1].label, Some(0.0));
    }

    #[test]
    fn test_loads_unlabeled_tsv() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "pairs.txt", "one\ttwo\nthree\n");

        let pairs = PairFileLoader::new(path).load_all().unwrap();
        assert_eq!(pairs, vec![TextPair::new("one", "two")]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(PairFileLoader::new("/definitely/not/here.tsv").load_all().is_err());
    }
}
