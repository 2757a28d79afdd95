// ============================================================
// Layer 3   Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts
// of the system: a pair of texts, the score the model gives it,
// and the abstractions other layers implement.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits

// A raw text pair and its scored form
pub mod text_pair;

// Core abstractions (traits) that other layers implement
pub mod traits;
