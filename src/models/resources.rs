use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

type Resource = Arc<dyn Any + Send + Sync>;

/// Caller-supplied state made visible to a running operation.
///
/// Keys keep insertion order. Values are shared, so cloning the map is cheap
/// and the operation sees the same instances the caller stashed.
#[derive(Clone, Default)]
pub struct ContextResources {
    entries: IndexMap<String, Resource>,
}

impl ContextResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key`, replacing any previous one.
    pub fn insert<V>(&mut self, key: impl Into<String>, value: V) -> &mut Self
    where
        V: Any + Send + Sync,
    {
        self.entries.insert(key.into(), Arc::new(value));
        self
    }

    /// Store an already shared value under `key`.
    pub fn insert_arc<V>(&mut self, key: impl Into<String>, value: Arc<V>) -> &mut Self
    where
        V: Any + Send + Sync,
    {
        self.entries.insert(key.into(), value);
        self
    }

    /// Borrow the value under `key` if it exists and has type `V`.
    pub fn get<V>(&self, key: &str) -> Option<&V>
    where
        V: Any + Send + Sync,
    {
        self.entries.get(key)?.downcast_ref::<V>()
    }

    /// Shared handle to the value under `key` if it exists and has type `V`.
    pub fn get_arc<V>(&self, key: &str) -> Option<Arc<V>>
    where
        V: Any + Send + Sync,
    {
        let resource = Arc::clone(self.entries.get(key)?);
        resource.downcast::<V>().ok()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.shift_remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ContextResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
