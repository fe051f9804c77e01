//! Partition-by-customer execution. Customers share no state, so each
//! contiguous customer group can be processed on its own worker.

use rayon::prelude::*;

/// Apply `f` to every contiguous run of items sharing a customer key and
/// concatenate the outputs in input order. Input must already be grouped
/// by customer.
pub(crate) fn map_customers<I, T, K, F>(items: &[I], parallel: bool, key: K, f: F) -> Vec<T>
where
    I: Sync,
    T: Send,
    K: Fn(&I) -> &str + Sync,
    F: Fn(&[I]) -> Vec<T> + Sync + Send,
{
    let groups: Vec<&[I]> = items.chunk_by(|a, b| key(a) == key(b)).collect();
    if parallel {
        groups.into_par_iter().flat_map_iter(|g| f(g)).collect()
    } else {
        groups.into_iter().flat_map(|g| f(g)).collect()
    }
}
