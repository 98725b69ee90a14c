use std::marker::PhantomData;

/// Vec wrapper indexed by a typed id, so step ids can't be mixed up with plain indices.
#[derive(Debug, Hash, PartialEq, Eq, Clone)]
pub struct IdVec<K, V> {
    vec: Vec<V>,
    _phantom: PhantomData<K>,
}

impl<K, V> Default for IdVec<K, V> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<K, V> IdVec<K, V> {
    /// Create a new `IdVec` with the given capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            vec: Vec::with_capacity(cap),
            _phantom: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    /// Iterate through values in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.vec.iter()
    }
}

impl<K: From<usize>, V> IdVec<K, V> {
    /// Push `v`, returning the id that retrieves it later.
    #[inline]
    pub fn push(&mut self, v: V) -> K {
        let id = self.vec.len().into();
        self.vec.push(v);
        id
    }

    /// Iterate through `(id, value)` pairs in insertion order.
    pub fn iter_ids(&self) -> impl Iterator<Item = (K, &V)> {
        self.vec.iter().enumerate().map(|(i, v)| (K::from(i), v))
    }
}

impl<K: Into<usize>, V> IdVec<K, V> {
    /// Get the value with id `k`.
    #[inline]
    pub fn get(&self, k: K) -> &V {
        &self.vec[k.into()]
    }
}

#[cfg(test)]
mod test {
    use super::IdVec;

    #[test]
    fn test_push_and_get() {
        let mut v: IdVec<usize, &str> = IdVec::with_capacity(2);
        let a = v.push("merge");
        let b = v.push("trim");
        assert_eq!(*v.get(a), "merge");
        assert_eq!(*v.get(b), "trim");
        let ids: Vec<usize> = v.iter_ids().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0, 1]);
    }
}
