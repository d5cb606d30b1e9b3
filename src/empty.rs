/// Can be used while indexing keys without values, like ``Osrb<K, Empty>``.
#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct Empty {}
