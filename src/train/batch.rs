//! Batch index generation

use rand::seq::SliceRandom;
use rand::Rng;

/// Shuffle `0..n` and split it into chunks of at most `batch_size` rows.
///
/// The last batch keeps the remainder. A zero batch size is treated as 1.
pub fn shuffled_batches<R: Rng + ?Sized>(n: usize, batch_size: usize, rng: &mut R) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    order.chunks(batch_size.max(1)).map(<[usize]>::to_vec).collect()
}
