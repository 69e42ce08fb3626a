// src/intersect.rs

//! Merge-join over two sorted slices
//!
//! Used by conflict detection and package removal to find the paths two file
//! sets have in common. Both slices must be sorted by the same ordering that
//! `cmp` implements; the cursor into `b` only ever moves forward.

use std::cmp::Ordering;

/// Walk `a` against `b`, calling `on_match` for every element of `a` that has
/// at least one equal element in `b` (with the first such element of `b` as
/// representative) and `on_unique` for every element of `a` with none.
///
/// Runs of equal elements in `b` are consumed in one step, so an element of
/// `a` is never reported twice. A repeated element in `a` finds the run
/// already consumed and is reported through `on_unique`.
pub fn intersect_uniq<A, B, C, M, U>(a: &[A], b: &[B], mut cmp: C, mut on_match: M, mut on_unique: U)
where
    C: FnMut(&A, &B) -> Ordering,
    M: FnMut(&A, &B),
    U: FnMut(&A),
{
    let mut next = 0;

    for item in a {
        while next < b.len() && cmp(item, &b[next]) == Ordering::Greater {
            next += 1;
        }

        if next < b.len() && cmp(item, &b[next]) == Ordering::Equal {
            let representative = &b[next];
            next += 1;
            while next < b.len() && cmp(item, &b[next]) == Ordering::Equal {
                next += 1;
            }
            on_match(item, representative);
        } else {
            on_unique(item);
        }
    }
}
