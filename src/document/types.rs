/// Where a bound document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// Built in memory, not yet saved.
    New,
    /// Loaded with every stored path.
    Loaded,
    /// Loaded through a projection or slice; saving merges into the stored copy.
    Partial,
}
