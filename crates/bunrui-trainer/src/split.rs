//! # Dataset Splitting
//!
//! Deterministic train/validation partitioning: a seeded Fisher-Yates
//! shuffle over example indices, no label stratification. Re-running with
//! the same seed and example order reproduces the identical partition.

/// Partition parallel inputs/labels into train and validation subsets.
///
/// Returns `(train_inputs, val_inputs, train_labels, val_labels)`. The
/// validation subset takes `ceil(n * val_fraction)` examples; positional
/// correspondence between inputs and labels is preserved within each split.
///
/// # Panics
/// Panics when `inputs` and `labels` differ in length.
pub fn train_test_split<X: Clone, Y: Clone>(
    inputs: &[X],
    labels: &[Y],
    val_fraction: f32,
    seed: u64,
) -> (Vec<X>, Vec<X>, Vec<Y>, Vec<Y>) {
    assert_eq!(
        inputs.len(),
        labels.len(),
        "inputs and labels must be parallel"
    );

    let n = inputs.len();
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = oorandom::Rand64::new(seed as u128);
    for i in (1..n).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        indices.swap(i, j);
    }

    let n_val = ((n as f32) * val_fraction).ceil() as usize;
    let n_val = n_val.min(n);

    let mut train_x = Vec::with_capacity(n - n_val);
    let mut val_x = Vec::with_capacity(n_val);
    let mut train_y = Vec::with_capacity(n - n_val);
    let mut val_y = Vec::with_capacity(n_val);

    for (rank, &idx) in indices.iter().enumerate() {
        if rank < n_val {
            val_x.push(inputs[idx].clone());
            val_y.push(labels[idx].clone());
        } else {
            train_x.push(inputs[idx].clone());
            train_y.push(labels[idx].clone());
        }
    }

    (train_x, val_x, train_y, val_y)
}
