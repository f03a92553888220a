//! Reference-counted sample storage
//!
//! [`SharedBuffer`] is an immutable view over an `Arc<[T]>` allocation. Cloning
//! and slicing never copy element data; several blocks may alias one packet's
//! allocation. Writing goes through [`SharedBuffer::make_mut`], which detaches
//! the view into its own allocation first whenever the storage is shared.

use std::ops::{Deref, Range};
use std::sync::Arc;

use crate::types::{Element, Sample};

/// Shared, immutable-until-detached element buffer.
#[derive(Debug, Clone)]
pub struct SharedBuffer<T> {
    data: Arc<[T]>,
    start: usize,
    len: usize,
}

impl<T: Element> SharedBuffer<T> {
    /// An empty buffer.
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Move a vector's elements into a new shared allocation.
    pub fn from_vec(data: Vec<T>) -> Self {
        let len = data.len();
        Self { data: data.into(), start: 0, len }
    }

    /// Number of raw elements visible through this view.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data[self.start..self.start + self.len]
    }

    /// A view over a sub-range of this buffer sharing the same allocation.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds, like slice indexing.
    pub fn slice(&self, range: Range<usize>) -> Self {
        assert!(
            range.start <= range.end && range.end <= self.len,
            "slice {:?} out of range for buffer of length {}",
            range,
            self.len
        );
        Self { data: Arc::clone(&self.data), start: self.start + range.start, len: range.len() }
    }

    /// Whether another buffer aliases this one's allocation.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    /// Whether two buffers view the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Mutable access to the elements, detaching from shared storage first.
    pub fn make_mut(&mut self) -> &mut [T] {
        if Arc::get_mut(&mut self.data).is_none() {
            self.detach();
        }
        let range = self.start..self.start + self.len;
        match Arc::get_mut(&mut self.data) {
            Some(data) => &mut data[range],
            None => unreachable!("buffer was detached into a unique allocation"),
        }
    }

    /// Copy the visible elements into a new vector.
    pub fn to_vec(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    /// Join several buffers into one new allocation.
    pub fn concat(parts: &[SharedBuffer<T>]) -> Self {
        let total = parts.iter().map(SharedBuffer::len).sum();
        let mut data = Vec::with_capacity(total);
        for part in parts {
            data.extend_from_slice(part.as_slice());
        }
        Self::from_vec(data)
    }

    fn detach(&mut self) {
        let owned = self.to_vec();
        self.len = owned.len();
        self.data = owned.into();
        self.start = 0;
    }
}

impl<T: Sample> SharedBuffer<T> {
    /// A buffer of `len` zero-valued samples.
    pub fn zeroed(len: usize) -> Self {
        Self::from_vec(vec![T::default(); len])
    }
}

impl<T: Element> Default for SharedBuffer<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Element> Deref for SharedBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Element> From<Vec<T>> for SharedBuffer<T> {
    fn from(data: Vec<T>) -> Self {
        Self::from_vec(data)
    }
}

impl<T: Element + PartialEq> PartialEq for SharedBuffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}
