/*****************************************************************************************[dense.rs]
Copyright (c) 2019-2021, the limsat contributors

Permission is hereby granted, free of charge, to any person obtaining a copy of this software and
associated documentation files (the "Software"), to deal in the Software without restriction,
including without limitation the rights to use, copy, modify, merge, publish, distribute,
sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all copies or
substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT
NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT
OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.
**************************************************************************************************/

//! Dense containers keyed by term ids.
//!
//! Keys are small integers close to zero, so maps and sets are growable
//! arrays capacitated on demand and filled with a null value. The decision
//! order is a 1-indexed binary heap (slot 0 holds the null element) with a
//! parallel position map, position 0 meaning absent, which makes
//! `increase` and `remove` logarithmic.

use bit_vec::BitVec;
use std::cmp;
use std::iter;
use std::marker::PhantomData;
use std::ops;

pub trait AsIndex: Copy {
    fn as_index(self) -> usize;
    fn from_index(index: usize) -> Self;
}

/// Null handles: types with a distinguished empty value, used to fill
/// fresh slots and to mark absence.
pub trait HasNull: Copy + PartialEq {
    const NULL: Self;
    fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl HasNull for crate::lit::Sort {
    const NULL: Self = crate::lit::Sort::NULL;
}
impl HasNull for crate::lit::Fun {
    const NULL: Self = crate::lit::Fun::NULL;
}
impl HasNull for crate::lit::Name {
    const NULL: Self = crate::lit::Name::NULL;
}

/// A growable array indexed by `K::as_index()`.
///
/// Slots do not exist until the map has been capacitated for them; new
/// slots are filled with `V::default()`, which for term values is the
/// null handle.
#[derive(Debug, Clone)]
pub struct TermMap<K: AsIndex, V> {
    vec: Vec<V>,
    _marker: PhantomData<fn(K)>, // contravariance
}

impl<K: AsIndex, V> Default for TermMap<K, V> {
    fn default() -> Self {
        Self {
            vec: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<K: AsIndex, V> TermMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grow so that `k` is addressable.
    pub fn capacitate(&mut self, k: K)
    where
        V: Default,
    {
        let i = k.as_index();
        if i >= self.vec.len() {
            let grow = i + 1 - self.vec.len();
            self.vec.extend((0..grow).map(|_| V::default()));
        }
    }

    /// Capacitate and assign in one step.
    pub fn insert(&mut self, k: K, v: V)
    where
        V: Default,
    {
        self.capacitate(k);
        self[k] = v;
    }

    #[inline]
    pub fn get(&self, k: K) -> Option<&V> {
        self.vec.get(k.as_index())
    }

    /// One past the largest addressable index.
    #[inline]
    pub fn upper_bound(&self) -> usize {
        self.vec.len()
    }

    /// Clear content, keep internal buffers. Does not allocate.
    pub fn clear(&mut self) {
        self.vec.clear();
    }

    pub fn iter(&self) -> impl iter::Iterator<Item = (K, &V)> {
        self.vec.iter().enumerate().map(|(i, v)| (K::from_index(i), v))
    }
    pub fn iter_mut(&mut self) -> impl iter::Iterator<Item = (K, &mut V)> {
        self.vec
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (K::from_index(i), v))
    }
}

impl<K: AsIndex, V> ops::Index<K> for TermMap<K, V> {
    type Output = V;
    #[inline]
    fn index(&self, k: K) -> &Self::Output {
        &self.vec[k.as_index()]
    }
}
impl<K: AsIndex, V> ops::IndexMut<K> for TermMap<K, V> {
    #[inline]
    fn index_mut(&mut self, k: K) -> &mut Self::Output {
        &mut self.vec[k.as_index()]
    }
}

/// A bit-packed boolean map indexed by `K::as_index()`.
#[derive(Debug, Clone)]
pub struct TermMapBool<K: AsIndex> {
    map: BitVec,
    _marker: PhantomData<fn(K)>, // contravariance
}

impl<K: AsIndex> Default for TermMapBool<K> {
    fn default() -> Self {
        TermMapBool::new()
    }
}

impl<K: AsIndex> ops::Index<K> for TermMapBool<K> {
    type Output = bool;
    #[inline]
    fn index(&self, k: K) -> &Self::Output {
        &self.map[k.as_index()]
    }
}

impl<K: AsIndex> TermMapBool<K> {
    pub fn new() -> Self {
        Self {
            map: BitVec::new(),
            _marker: PhantomData,
        }
    }

    pub fn capacitate(&mut self, k: K) {
        let i = k.as_index();
        let len = self.map.len();
        if i >= len {
            self.map.grow(i - len + 1, false);
        }
    }

    #[inline]
    pub fn get(&self, k: K) -> bool {
        self.map.get(k.as_index()).unwrap_or(false)
    }

    #[inline]
    pub fn set(&mut self, k: K, b: bool) {
        self.map.set(k.as_index(), b);
    }

    #[inline]
    pub fn insert(&mut self, k: K) {
        self.capacitate(k);
        self.map.set(k.as_index(), true);
    }

    /// True iff any key maps to true.
    pub fn any(&self) -> bool {
        self.map.any()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, bool)> + '_ {
        self.map
            .iter()
            .enumerate()
            .map(|(i, b)| (K::from_index(i), b))
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// A set storing `x` at index `x.as_index()` iff present, iterable in id
/// order; absent slots hold the null handle.
#[derive(Debug, Clone)]
pub struct DenseSet<T: AsIndex + HasNull> {
    map: TermMap<T, T>,
}

impl<T: AsIndex + HasNull> Default for DenseSet<T> {
    fn default() -> Self {
        Self { map: TermMap::new() }
    }
}

impl<T: AsIndex + HasNull + Default> DenseSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacitate(&mut self, x: T) {
        self.map.capacitate(x);
    }

    pub fn upper_bound(&self) -> usize {
        self.map.upper_bound()
    }

    pub fn contains(&self, x: T) -> bool {
        !x.is_null() && self.map.get(x).map_or(false, |&y| y == x)
    }

    pub fn insert(&mut self, x: T) {
        debug_assert!(!x.is_null());
        self.map.insert(x, x);
    }

    pub fn remove(&mut self, x: T) {
        debug_assert!(!x.is_null());
        self.map[x] = T::NULL;
    }

    /// The element stored at position `i`, or null.
    #[inline]
    pub fn at(&self, i: usize) -> T {
        *self.map.vec.get(i).unwrap_or(&T::NULL)
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.map.vec.iter().cloned().filter(|x| !x.is_null())
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Total order used to rank heap elements.
pub trait Comparator<T: ?Sized> {
    fn cmp(&self, lhs: &T, rhs: &T) -> cmp::Ordering;
    fn lt(&self, lhs: &T, rhs: &T) -> bool {
        self.cmp(lhs, rhs) == cmp::Ordering::Less
    }
}

/// Storage of a 1-indexed binary heap with a parallel element-to-position
/// map; `heap[0]` is the null element and position 0 means absent.
///
/// Promote it with a [`Comparator`] to obtain a usable [`Heap`]; the split
/// lets the comparator borrow activity scores held next to the heap.
#[derive(Debug, Clone)]
pub struct HeapData<K: AsIndex + HasNull> {
    heap: Vec<K>,
    index: TermMap<K, usize>,
}

impl<K: AsIndex + HasNull> Default for HeapData<K> {
    fn default() -> Self {
        Self {
            heap: vec![K::NULL],
            index: TermMap::new(),
        }
    }
}

impl<K: AsIndex + HasNull> HeapData<K> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.heap.len() - 1
    }
    pub fn is_empty(&self) -> bool {
        self.heap.len() == 1
    }
    pub fn contains(&self, k: K) -> bool {
        self.index.get(k).map_or(false, |&i| i != 0)
    }
    /// The minimal element, without removing it.
    pub fn top(&self) -> Option<K> {
        self.heap.get(1).cloned()
    }
    pub fn capacitate(&mut self, k: K) {
        self.index.capacitate(k);
    }
    pub fn clear(&mut self) {
        for i in 1..self.heap.len() {
            let x = self.heap[i];
            self.index[x] = 0;
        }
        self.heap.truncate(1);
    }

    pub fn promote<Comp: Comparator<K>>(&mut self, comp: Comp) -> Heap<K, Comp> {
        Heap { data: self, comp }
    }
}

/// A heap together with its comparator.
#[derive(Debug)]
pub struct Heap<'a, K: AsIndex + HasNull, Comp: Comparator<K>> {
    data: &'a mut HeapData<K>,
    comp: Comp,
}

impl<'a, K: AsIndex + HasNull, Comp: Comparator<K>> ops::Deref for Heap<'a, K, Comp> {
    type Target = HeapData<K>;
    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

fn left(i: usize) -> usize {
    2 * i
}
fn right(i: usize) -> usize {
    2 * i + 1
}
fn parent(i: usize) -> usize {
    i / 2
}

impl<'a, K: AsIndex + HasNull, Comp: Comparator<K>> Heap<'a, K, Comp> {
    fn sift_up(&mut self, mut i: usize) {
        debug_assert!(i > 0 && i < self.data.heap.len());
        let x = self.data.heap[i];
        loop {
            let p = parent(i);
            if p == 0 || !self.comp.lt(&x, &self.data.heap[p]) {
                break;
            }
            let moved = self.data.heap[p];
            self.data.heap[i] = moved;
            self.data.index[moved] = i;
            i = p;
        }
        self.data.heap[i] = x;
        self.data.index[x] = i;
    }

    fn sift_down(&mut self, mut i: usize) {
        debug_assert!(i > 0 && i < self.data.heap.len());
        let x = self.data.heap[i];
        let end = self.data.heap.len();
        while left(i) < end {
            let l = left(i);
            let r = right(i);
            let c = if r < end && self.comp.lt(&self.data.heap[r], &self.data.heap[l]) {
                r
            } else {
                l
            };
            if !self.comp.lt(&self.data.heap[c], &x) {
                break;
            }
            let moved = self.data.heap[c];
            self.data.heap[i] = moved;
            self.data.index[moved] = i;
            i = c;
        }
        self.data.heap[i] = x;
        self.data.index[x] = i;
    }

    /// Restore the heap property after `k`'s rank improved.
    pub fn increase(&mut self, k: K) {
        debug_assert!(self.contains(k));
        let i = self.data.index[k];
        self.sift_up(i);
    }

    pub fn insert(&mut self, k: K) {
        self.data.index.capacitate(k);
        debug_assert!(!self.contains(k));
        let i = self.data.heap.len();
        self.data.heap.push(k);
        self.data.index[k] = i;
        self.sift_up(i);
    }

    pub fn remove(&mut self, k: K) {
        debug_assert!(self.contains(k));
        let i = self.data.index[k];
        self.data.index[k] = 0;
        let last = *self.data.heap.last().unwrap();
        self.data.heap.pop();
        if i < self.data.heap.len() {
            self.data.heap[i] = last;
            self.data.index[last] = i;
            self.sift_down(i);
        }
    }

    /// Rebuild the heap from scratch, using the elements in `ns`.
    pub fn build(&mut self, ns: &[K]) {
        self.data.clear();
        for &x in ns {
            self.data.index.capacitate(x);
            self.data.index[x] = self.data.heap.len();
            self.data.heap.push(x);
        }
        for i in (1..=self.data.len() / 2).rev() {
            self.sift_down(i);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lit::Fun;

    struct ByScore<'a>(&'a TermMap<Fun, f64>);

    impl<'a> Comparator<Fun> for ByScore<'a> {
        fn cmp(&self, lhs: &Fun, rhs: &Fun) -> cmp::Ordering {
            PartialOrd::partial_cmp(&self.0[*rhs], &self.0[*lhs]).expect("NaN score")
        }
    }

    #[test]
    fn test_heap_order() {
        let mut score: TermMap<Fun, f64> = TermMap::new();
        let mut data: HeapData<Fun> = HeapData::new();
        for (i, &s) in [0.5, 3.0, 1.5, 2.0, 0.25].iter().enumerate() {
            let f = Fun::from_id(i as u32 + 1);
            score.insert(f, s);
            data.promote(ByScore(&score)).insert(f);
        }
        // highest score first under the inverse comparator
        let mut heap = data.promote(ByScore(&score));
        assert_eq!(heap.top(), Some(Fun::from_id(2)));
        heap.remove(Fun::from_id(2));
        assert_eq!(heap.top(), Some(Fun::from_id(4)));
        heap.remove(Fun::from_id(4));
        assert_eq!(heap.top(), Some(Fun::from_id(3)));
        assert_eq!(heap.len(), 3);
    }

    #[test]
    fn test_heap_top_empty() {
        let mut data: HeapData<Fun> = HeapData::new();
        assert_eq!(data.top(), None);
        data.promote(ByScore(&TermMap::new())).build(&[]);
        assert_eq!(data.top(), None);
    }

    #[test]
    fn test_heap_increase_after_rescale() {
        let mut score: TermMap<Fun, f64> = TermMap::new();
        let mut data: HeapData<Fun> = HeapData::new();
        for i in 1..=4u32 {
            let f = Fun::from_id(i);
            score.insert(f, i as f64 * 1e99);
            data.promote(ByScore(&score)).insert(f);
        }
        // rescaling preserves relative order
        for (_, s) in score.iter_mut() {
            *s *= 1e-100;
        }
        for i in 1..=4u32 {
            data.promote(ByScore(&score)).increase(Fun::from_id(i));
        }
        assert_eq!(data.promote(ByScore(&score)).top(), Some(Fun::from_id(4)));
        // bump one element past the others
        score[Fun::from_id(1)] += 1.0;
        data.promote(ByScore(&score)).increase(Fun::from_id(1));
        assert_eq!(data.promote(ByScore(&score)).top(), Some(Fun::from_id(1)));
    }

    #[test]
    fn test_dense_set() {
        let mut s: DenseSet<Fun> = DenseSet::new();
        s.insert(Fun::from_id(3));
        s.insert(Fun::from_id(1));
        assert!(s.contains(Fun::from_id(1)));
        assert!(s.contains(Fun::from_id(3)));
        assert!(!s.contains(Fun::from_id(2)));
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![Fun::from_id(1), Fun::from_id(3)]);
        s.remove(Fun::from_id(1));
        assert!(!s.contains(Fun::from_id(1)));
    }
}
