// ============================================================
// Layer 2   Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal
// (training a matcher, or scoring pairs with one).
//
// Rules for this layer:
//   - No tensor math or model code here
//   - Only workflow coordination; loading, encoding and
//     persistence are delegated to Layers 4, 5 and 6
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow
pub mod train_use_case;

// The scoring workflow
pub mod predict_use_case;
