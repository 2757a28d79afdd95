// ============================================================
// Layer 4   Data Pipeline
// ============================================================
// Everything from a raw pair file to device-ready tensor batches.
//
//   pairs file (.jsonl / .tsv)
//       │
//       ▼
//   PairFileLoader    → reads TextPairs
//       │
//       ▼
//   Preprocessor      → cleans text, splits into word / char tokens
//       │
//       ▼
//   PairEncoder       → token ids per side and granularity
//       │
//       ▼
//   PairDataset       → implements Burn's Dataset trait
//       │
//       ▼
//   PairBatcher       → pads, masks, dynamic-pooling indices
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop

/// Reads text pairs from JSONL or tab-separated files
pub mod loader;

/// Cleans raw text and splits it into tokens
pub mod preprocessor;

/// Turns text pairs into token-id samples
pub mod encoder;

/// Implements Burn's Dataset trait for pair samples
pub mod dataset;

/// Dynamic pooling index for the match pyramid
pub mod dpool;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
