//! Buffer pools: the activation-array pool and the slab typed-array pool,
//! both keyed by length with a cap of 4 entries per key (§5). Grounded on
//! `gran-prix`'s `BufferPool` (`src/graph/buffer_pool.rs`), generalized
//! from a `Tensor`-shape-keyed pool to a length-keyed `Vec<T>` pool since
//! this crate's buffers are flat scalar arrays, not tensors.

use std::collections::HashMap;

const MAX_ENTRIES_PER_KEY: usize = 4;

pub struct VecPool<T> {
    slots: HashMap<usize, Vec<Vec<T>>>,
}

impl<T: Default + Clone> VecPool<T> {
    pub fn new() -> Self {
        VecPool { slots: HashMap::new() }
    }

    /// Returns a zeroed buffer of exactly `len` elements, reusing a pooled
    /// one if available.
    pub fn acquire(&mut self, len: usize) -> Vec<T> {
        if let Some(bucket) = self.slots.get_mut(&len) {
            if let Some(mut buf) = bucket.pop() {
                buf.iter_mut().for_each(|v| *v = T::default());
                return buf;
            }
        }
        vec![T::default(); len]
    }

    /// Returns a buffer to the pool, dropping it instead if the bucket for
    /// its length is already at capacity.
    pub fn release(&mut self, buf: Vec<T>) {
        let len = buf.len();
        let bucket = self.slots.entry(len).or_default();
        if bucket.len() < MAX_ENTRIES_PER_KEY {
            bucket.push(buf);
        }
    }
}

impl<T: Default + Clone> Default for VecPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type ActivationPool = VecPool<f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_buffers_are_zeroed_and_reused() {
        let mut pool: VecPool<f64> = VecPool::new();
        let mut buf = pool.acquire(4);
        buf[0] = 42.0;
        pool.release(buf);
        let reused = pool.acquire(4);
        assert_eq!(reused, vec![0.0; 4]);
    }

    #[test]
    fn pool_caps_entries_per_key() {
        let mut pool: VecPool<f64> = VecPool::new();
        for _ in 0..10 {
            pool.release(vec![0.0; 3]);
        }
        assert_eq!(pool.slots.get(&3).unwrap().len(), MAX_ENTRIES_PER_KEY);
    }
}
