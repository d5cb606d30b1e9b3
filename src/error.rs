/// Error enumerates over all possible errors that this package
/// shall return.
#[derive(Debug, PartialEq)]
pub enum Error<K>
where
    K: Clone + Ord,
{
    /// Returned by create() API when key is already present.
    DuplicateKey,
    /// Returned by get_by_rank() API when rank is not within
    /// ``0..len``. Carries (rank, len).
    IndexOutOfRange(usize, usize),
    /// Returned by cursor_next() API when the index was structurally
    /// mutated after the cursor was created.
    StaleCursor,
    /// Fatal case, breaking one of the two red-black rules.
    ConsecutiveReds,
    /// Fatal case, breaking one of the two red-black rules. The String
    /// component of this variant can be used for debugging.
    UnbalancedBlacks(String),
    /// Fatal case, index entries are not in sort-order.
    SortError(K, K),
    /// Fatal case, a node's subtree-size field does not tally with its
    /// children. The String component of this variant can be used for
    /// debugging.
    SizeMismatch(String),
}
