// ============================================================
// Layer 4   Dynamic Pooling Index
// ============================================================
// The match pyramid convolves a fixed [max_left, max_right]
// interaction grid, but only the top-left [len_left, len_right]
// corner holds real tokens. Before max pooling, every grid cell
// is replaced by a cell from that real corner, so short texts
// are stretched over the whole grid instead of being pooled
// together with padding.
//
//   row i → floor(i * len_left  / max_left)
//   col j → floor(j * len_right / max_right)
//
// The result is flattened row-major so the model can gather
// from a [batch, channels, max_left * max_right] view.

/// Source position on one axis for each of `max_len` grid positions.
fn axis_index(len: usize, max_len: usize) -> Vec<usize> {
    let len = len.min(max_len);
    if len == 0 {
        return vec![0; max_len];
    }
    (0..max_len).map(|i| i * len / max_len).collect()
}

/// Flat gather indices of length `max_left * max_right`.
pub fn dynamic_pooling_index(
    len_left:  usize,
    len_right: usize,
    max_left:  usize,
    max_right: usize,
) -> Vec<i64> {
    let rows = axis_index(len_left, max_left);
    let cols = axis_index(len_right, max_right);

    let mut index = Vec::with_capacity(max_left * max_right);
    for &r in &rows {
        for &c in &cols {
            index.push((r * max_right + c) as i64);
        }
    }
    index
}
