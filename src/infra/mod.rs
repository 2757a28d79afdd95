// ============================================================
// Layer 6   Infrastructure Layer
// ============================================================
// Persistence shared by the training and scoring workflows:
//
//   checkpoint.rs         model weights via Burn's CompactRecorder,
//                         epoch pointers, and the TrainConfig JSON
//                         scoring uses to rebuild the model
//
//   tokenizer_store.rs    word- and char-level WordLevel
//                         tokenizers, built from the training
//                         corpus and reloaded for scoring
//
//   embedding_store.rs    pretrained text embedding files read
//                         into tokenizer-ordered matrices
//
//   metrics.rs            per-epoch CSV log

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Pretrained embedding matrices
pub mod embedding_store;

/// Training metrics CSV logger
pub mod metrics;
