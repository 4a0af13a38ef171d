//! Declarative parallel/sequential execution utilities.
//!
//! Batch prediction and tree-ensemble fitting fan work out over independent
//! items. The `cfg` logic for choosing rayon or plain iterators lives here in
//! ONE place, keeping call sites clean.
//!
//! # Runtime Override
//!
//! Every helper takes a `force_sequential` flag. When `true`, execution is
//! sequential even if the `parallel` feature is enabled, which keeps results
//! reproducible under profiling and in tests that count side effects.
//!
//! # Example
//!
//! ```
//! let squares = parallel::map_slice(&[1, 2, 3], |x| x * x, false);
//! assert_eq!(squares, vec![1, 4, 9]);
//! ```

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Map a function over a slice, potentially in parallel.
///
/// Output order always matches input order.
#[inline]
pub fn map_slice<T, F, R>(slice: &[T], f: F, force_sequential: bool) -> Vec<R>
where
    T: Sync,
    F: Fn(&T) -> R + Sync + Send,
    R: Send,
{
    #[cfg(feature = "parallel")]
    {
        if force_sequential {
            slice.iter().map(f).collect()
        } else {
            slice.par_iter().map(f).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = force_sequential;
        slice.iter().map(f).collect()
    }
}

/// Map over `0..n`, potentially in parallel. Used where each task derives
/// its own state (e.g. a per-tree RNG seed) from its index.
#[inline]
pub fn map_range<F, R>(n: usize, f: F, force_sequential: bool) -> Vec<R>
where
    F: Fn(usize) -> R + Sync + Send,
    R: Send,
{
    #[cfg(feature = "parallel")]
    {
        if force_sequential {
            (0..n).map(f).collect()
        } else {
            (0..n).into_par_iter().map(f).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = force_sequential;
        (0..n).map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_slice_preserves_order() {
        let items: Vec<u64> = (0..1000).collect();
        let out = map_slice(&items, |x| x * 2, false);
        assert!(out.iter().enumerate().all(|(i, &v)| v == 2 * i as u64));
    }

    #[test]
    fn test_map_range_sequential_matches_parallel() {
        let seq = map_range(64, |i| i * i, true);
        let par = map_range(64, |i| i * i, false);
        assert_eq!(seq, par);
    }
}
