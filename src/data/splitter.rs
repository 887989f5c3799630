// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles items and splits them into two sets:
//   - Training set:   used to update model weights
//   - Validation set: used to measure performance on unseen data
//
// Class folders are read in sorted order (every image of the first
// class before any image of the second), so the list is shuffled
// before cutting it.
//
// The shuffle is seeded: `retrain` and `evaluate` rebuild the
// same split from the seed stored in train_config.json.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Reference: Rust Book §8 (Vectors)
//            rand crate documentation

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Shuffle `items` with `seed` and split into (train, validation).
///
/// `train_fraction` is clamped to [0, 1]; e.g. 0.7 keeps 70% for training.
///
/// ```ignore
/// let (train, val) = split_train_val(files, 0.7, 42);
/// ```
pub fn split_train_val<T>(mut items: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let total    = items.len();
    let fraction = train_fraction.clamp(0.0, 1.0);
    let split_at = ((total as f64) * fraction).round() as usize;
    let split_at = split_at.min(total);

    // split_off(n) leaves [0..n] in `items` and returns [n..total]
    let val = items.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        items.len(),
        val.len(),
        (items.len() * 100) / total.max(1),
        (val.len()   * 100) / total.max(1),
    );

    (items, val)
}
