//! Cache key definitions.

/// Logical cache entries. There is one today: the serialized item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    ItemList,
}

impl CacheKey {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheKey::ItemList => "items:list",
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
