//! Execution context
//!
//! The numerical kernels of the simulation (per layer screen extrusion, per source propagation,
//! per modulation step and per subaperture Fourier optics) are dispatched through an
//! [ExecutionContext] given to each component at construction.
//! The same code path runs either sequentially or on the [rayon] thread pool.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Array computation backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// Single thread
    #[default]
    Sequential,
    /// Data parallel on the [rayon] global thread pool
    Parallel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    backend: Backend,
}
impl ExecutionContext {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
    pub fn sequential() -> Self {
        Self::new(Backend::Sequential)
    }
    pub fn parallel() -> Self {
        Self::new(Backend::Parallel)
    }
    pub fn backend(&self) -> Backend {
        self.backend
    }
    /// Applies `f` to each item and collects the results in order
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match self.backend {
            Backend::Sequential => items.iter().map(f).collect(),
            Backend::Parallel => items.par_iter().map(f).collect(),
        }
    }
    /// Maps each item with `map` and folds the results with `reduce`
    pub fn map_reduce<T, R, M, I, F>(&self, items: &[T], identity: I, map: M, reduce: F) -> R
    where
        T: Sync,
        R: Send,
        M: Fn(&T) -> R + Sync + Send,
        I: Fn() -> R + Sync + Send,
        F: Fn(R, R) -> R + Sync + Send,
    {
        match self.backend {
            Backend::Sequential => items.iter().map(map).fold(identity(), reduce),
            Backend::Parallel => items.par_iter().map(map).reduce(identity, reduce),
        }
    }
    /// Applies the fallible `f` to each item, stopping at the first error
    pub fn try_for_each_mut<T, E, F>(&self, items: &mut [T], f: F) -> Result<(), E>
    where
        T: Send,
        E: Send,
        F: Fn(&mut T) -> Result<(), E> + Sync + Send,
    {
        match self.backend {
            Backend::Sequential => items.iter_mut().try_for_each(f),
            Backend::Parallel => items.par_iter_mut().try_for_each(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backends_agree() {
        let items: Vec<f64> = (0..100).map(|x| x as f64).collect();
        let seq = ExecutionContext::sequential().map_reduce(&items, || 0f64, |x| x * x, |a, b| a + b);
        let par = ExecutionContext::parallel().map_reduce(&items, || 0f64, |x| x * x, |a, b| a + b);
        assert_eq!(seq, par);
        assert_eq!(
            ExecutionContext::sequential().map(&items, |x| x + 1.),
            ExecutionContext::parallel().map(&items, |x| x + 1.)
        );
    }

    #[test]
    fn first_error_wins() {
        let mut items = vec![1, 2, -3, 4];
        let res = ExecutionContext::parallel().try_for_each_mut(&mut items, |x| {
            if *x < 0 {
                Err(*x)
            } else {
                *x *= 2;
                Ok(())
            }
        });
        assert_eq!(res, Err(-3));
    }
}
