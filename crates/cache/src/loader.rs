//! The loader seam: produces a value for a key, off the reading thread.

/// Produces the value for a key. Each call runs on a dedicated worker thread,
/// so implementations are free to do blocking I/O.
pub trait Loader<K, V>: Send + Sync + 'static {
    fn load(&self, key: &K) -> anyhow::Result<V>;
}

impl<K, V, F> Loader<K, V> for F
where
    F: Fn(&K) -> anyhow::Result<V> + Send + Sync + 'static,
{
    fn load(&self, key: &K) -> anyhow::Result<V> {
        self(key)
    }
}
