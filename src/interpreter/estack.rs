//! Segmented continuation stack
//!
//! One logical stack addressed from the top, stored as a chain of
//! fixed-capacity segments. Scans that may cross segment boundaries use
//! [`StackEnum`], which yields the current segment first and then each
//! older one.

use std::iter::Rev;
use std::slice;

use super::errors::PsError;
use super::types::{Entry, Obj};

pub struct ExecStack {
    segments: Vec<Vec<Entry>>,
    segment_size: usize,
    max_depth: usize,
    depth: usize,
    high_water: usize,
}

impl ExecStack {
    pub fn new(segment_size: usize, max_depth: usize) -> Self {
        let segment_size = segment_size.max(1);
        ExecStack {
            segments: vec![Vec::with_capacity(segment_size)],
            segment_size,
            max_depth,
            depth: 0,
            high_water: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Fail with `execstackoverflow` unless `n` more entries fit
    pub fn check(&self, n: usize) -> Result<(), PsError> {
        if self.depth + n > self.max_depth {
            return Err(PsError::ExecStackOverflow);
        }
        Ok(())
    }

    pub fn push(&mut self, entry: Entry) -> Result<(), PsError> {
        self.check(1)?;
        let full = self
            .segments
            .last()
            .map_or(true, |seg| seg.len() >= self.segment_size);
        if full {
            self.segments.push(Vec::with_capacity(self.segment_size));
        }
        if let Some(seg) = self.segments.last_mut() {
            seg.push(entry);
        }
        self.depth += 1;
        self.high_water = self.high_water.max(self.depth);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Entry> {
        let seg = self.segments.last_mut()?;
        let entry = seg.pop()?;
        if seg.is_empty() && self.segments.len() > 1 {
            self.segments.pop();
        }
        self.depth -= 1;
        Some(entry)
    }

    /// Discard the top `n` entries without running any cleanup
    pub fn pop_n(&mut self, n: usize) {
        for _ in 0..n {
            if self.pop().is_none() {
                break;
            }
        }
    }

    /// Remove the top `n` entries and return them bottom first
    pub fn split_top(&mut self, n: usize) -> Vec<Entry> {
        let mut taken = Vec::with_capacity(n);
        for _ in 0..n {
            match self.pop() {
                Some(entry) => taken.push(entry),
                None => break,
            }
        }
        taken.reverse();
        taken
    }

    pub fn top(&self) -> Option<&Entry> {
        self.get(0)
    }

    /// Entry `index` positions below the top (0 is the top)
    pub fn get(&self, index: usize) -> Option<&Entry> {
        let mut index = index;
        for seg in self.segments.iter().rev() {
            if index < seg.len() {
                return seg.get(seg.len() - 1 - index);
            }
            index -= seg.len();
        }
        None
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entry> {
        let mut index = index;
        for seg in self.segments.iter_mut().rev() {
            if index < seg.len() {
                let at = seg.len() - 1 - index;
                return seg.get_mut(at);
            }
            index -= seg.len();
        }
        None
    }

    /// Payload object `index` positions below the top
    pub fn value(&self, index: usize) -> Result<&Obj, PsError> {
        self.get(index)
            .and_then(Entry::as_value)
            .ok_or_else(|| PsError::Unknown(format!("exec stack slot {} is not payload", index)))
    }

    pub fn int(&self, index: usize) -> Result<i64, PsError> {
        self.value(index)?.as_int()
    }

    /// Overwrite the payload object `index` positions below the top
    pub fn set_value(&mut self, index: usize, obj: Obj) -> Result<(), PsError> {
        if let Some(Entry::Value(slot)) = self.get_mut(index) {
            *slot = obj;
            return Ok(());
        }
        Err(PsError::Unknown(format!(
            "exec stack slot {} is not payload",
            index
        )))
    }

    pub fn enumerate(&self) -> StackEnum<'_> {
        StackEnum {
            segments: self.segments.iter().rev(),
        }
    }

    /// Every entry from the top down
    pub fn iter_from_top(&self) -> impl Iterator<Item = &Entry> {
        self.enumerate().flat_map(|seg| seg.iter().rev())
    }

    pub fn clear(&mut self) {
        self.segments.truncate(1);
        if let Some(seg) = self.segments.first_mut() {
            seg.clear();
        }
        self.depth = 0;
    }
}

/// Walks the segments from the newest to the oldest
pub struct StackEnum<'a> {
    segments: Rev<slice::Iter<'a, Vec<Entry>>>,
}

impl<'a> Iterator for StackEnum<'a> {
    /// Entries of one segment, oldest first
    type Item = &'a [Entry];

    fn next(&mut self) -> Option<Self::Item> {
        self.segments.next().map(|seg| seg.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::types::{Cleanup, ScopeKind};

    fn values(stack: &ExecStack) -> Vec<i64> {
        stack
            .iter_from_top()
            .filter_map(|e| e.as_value().and_then(|o| o.as_int().ok()))
            .collect()
    }

    #[test]
    fn test_push_pop_across_segments() {
        let mut stack = ExecStack::new(3, 100);
        for i in 0..10 {
            stack.push(Entry::Value(Obj::int(i))).unwrap();
        }
        assert_eq!(stack.len(), 10);
        assert_eq!(stack.segment_count(), 4);
        assert_eq!(stack.int(0).unwrap(), 9);
        assert_eq!(stack.int(4).unwrap(), 5);
        assert_eq!(values(&stack), (0..10).rev().collect::<Vec<_>>());

        stack.pop_n(7);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.segment_count(), 1);
        assert_eq!(stack.int(0).unwrap(), 2);
    }

    #[test]
    fn test_enumerator_yields_newest_segment_first() {
        let mut stack = ExecStack::new(2, 100);
        for i in 0..5 {
            stack.push(Entry::Value(Obj::int(i))).unwrap();
        }
        let segments: Vec<usize> = stack.enumerate().map(|s| s.len()).collect();
        assert_eq!(segments, vec![1, 2, 2]);
    }

    #[test]
    fn test_overflow_reports_execstackoverflow() {
        let mut stack = ExecStack::new(4, 2);
        stack.push(Entry::mark(ScopeKind::Loop, Cleanup::NONE)).unwrap();
        stack.push(Entry::Value(Obj::null())).unwrap();
        assert_eq!(
            stack.push(Entry::Value(Obj::null())),
            Err(PsError::ExecStackOverflow)
        );
        assert_eq!(stack.high_water(), 2);
    }

    #[test]
    fn test_split_top_returns_bottom_first() {
        let mut stack = ExecStack::new(2, 100);
        for i in 0..5 {
            stack.push(Entry::Value(Obj::int(i))).unwrap();
        }
        let taken = stack.split_top(3);
        let ints: Vec<i64> = taken
            .iter()
            .map(|e| e.as_value().unwrap().as_int().unwrap())
            .collect();
        assert_eq!(ints, vec![2, 3, 4]);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_set_value_rejects_non_payload() {
        let mut stack = ExecStack::new(4, 10);
        stack.push(Entry::Value(Obj::int(1))).unwrap();
        stack.push(Entry::mark(ScopeKind::Other, Cleanup::NONE)).unwrap();
        assert!(stack.set_value(0, Obj::int(2)).is_err());
        stack.set_value(1, Obj::int(5)).unwrap();
        assert_eq!(stack.int(1).unwrap(), 5);
    }
}
