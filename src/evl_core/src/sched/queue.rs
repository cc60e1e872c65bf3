//! Multi-level runnable queue shared by the priority-based scheduling classes.
use std::collections::VecDeque;

use super::{CORE_MAX_PRIO, CORE_MIN_PRIO, CORE_NR_PRIO};
use crate::{thread::ThreadId, utils::PrioBitmap};

/// A set of FIFO lists segregated by priority level, with a bitmap tracking
/// the non-empty levels.
#[derive(Debug, Clone)]
pub struct MultiLevelQueue {
    /// Invariant: `levels[i].is_empty() != bitmap.get(i)`
    levels: Vec<VecDeque<ThreadId>>,
    bitmap: PrioBitmap<2>,
    len: usize,
}

impl MultiLevelQueue {
    pub(crate) fn new() -> Self {
        debug_assert!(CORE_NR_PRIO <= PrioBitmap::<2>::LEN);
        Self {
            levels: vec![VecDeque::new(); CORE_NR_PRIO],
            bitmap: PrioBitmap::new(),
            len: 0,
        }
    }

    #[inline]
    fn level_index(prio: i32) -> usize {
        assert!(
            (CORE_MIN_PRIO..=CORE_MAX_PRIO).contains(&prio),
            "priority {prio} out of range"
        );
        (prio - CORE_MIN_PRIO) as usize
    }

    /// Insert `thread` behind its peers at level `prio`.
    pub(crate) fn add_tail(&mut self, thread: ThreadId, prio: i32) {
        let i = Self::level_index(prio);
        debug_assert!(!self.levels[i].contains(&thread));
        self.levels[i].push_back(thread);
        self.bitmap.set(i);
        self.len += 1;
    }

    /// Insert `thread` ahead of its peers at level `prio`.
    pub(crate) fn add_head(&mut self, thread: ThreadId, prio: i32) {
        let i = Self::level_index(prio);
        debug_assert!(!self.levels[i].contains(&thread));
        self.levels[i].push_front(thread);
        self.bitmap.set(i);
        self.len += 1;
    }

    /// Remove `thread` from level `prio`. Returns `false` if it wasn't there.
    pub(crate) fn remove(&mut self, thread: ThreadId, prio: i32) -> bool {
        let i = Self::level_index(prio);
        let level = &mut self.levels[i];
        let Some(pos) = level.iter().position(|&t| t == thread) else {
            return false;
        };
        level.remove(pos);
        if level.is_empty() {
            self.bitmap.clear(i);
        }
        self.len -= 1;
        true
    }

    /// Remove and return the first thread of the highest non-empty level.
    pub(crate) fn pop_highest(&mut self) -> Option<ThreadId> {
        let i = self.bitmap.find_last_set()?;
        let level = &mut self.levels[i];
        let thread = level.pop_front();
        debug_assert!(thread.is_some());
        if level.is_empty() {
            self.bitmap.clear(i);
        }
        self.len -= 1;
        thread
    }

    /// The first thread of the highest non-empty level.
    pub fn peek_highest(&self) -> Option<ThreadId> {
        let i = self.bitmap.find_last_set()?;
        self.levels[i].front().copied()
    }

    /// The highest non-empty priority level.
    pub fn highest_prio(&self) -> Option<i32> {
        self.bitmap
            .find_last_set()
            .map(|i| i as i32 + CORE_MIN_PRIO)
    }

    /// Move the first thread of level `prio` behind its peers. Returns `false`
    /// if the level holds fewer than two threads.
    pub(crate) fn rotate_level(&mut self, prio: i32) -> bool {
        let level = &mut self.levels[Self::level_index(prio)];
        if level.len() < 2 {
            return false;
        }
        level.rotate_left(1);
        true
    }

    /// The number of threads queued at level `prio`.
    pub fn level_len(&self, prio: i32) -> usize {
        self.levels[Self::level_index(prio)].len()
    }

    /// The threads queued at level `prio`, head first.
    pub fn level(&self, prio: i32) -> impl Iterator<Item = ThreadId> + '_ {
        self.levels[Self::level_index(prio)].iter().copied()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over every queued thread, highest priority first.
    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.levels.iter().rev().flat_map(|level| level.iter().copied())
    }
}

impl Default for MultiLevelQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(slot: usize) -> ThreadId {
        ThreadId::new(slot, 1)
    }

    #[test]
    fn pop_order_is_priority_then_fifo() {
        let mut q = MultiLevelQueue::new();
        q.add_tail(tid(0), 10);
        q.add_tail(tid(1), 20);
        q.add_tail(tid(2), 10);
        q.add_head(tid(3), 10);
        assert_eq!(q.len(), 4);
        assert_eq!(q.highest_prio(), Some(20));
        assert_eq!(q.pop_highest(), Some(tid(1)));
        assert_eq!(q.pop_highest(), Some(tid(3)));
        assert_eq!(q.pop_highest(), Some(tid(0)));
        assert_eq!(q.pop_highest(), Some(tid(2)));
        assert_eq!(q.pop_highest(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn remove_clears_level() {
        let mut q = MultiLevelQueue::new();
        q.add_tail(tid(0), CORE_MAX_PRIO);
        q.add_tail(tid(1), CORE_MIN_PRIO);
        assert!(q.remove(tid(0), CORE_MAX_PRIO));
        assert!(!q.remove(tid(0), CORE_MAX_PRIO));
        assert_eq!(q.highest_prio(), Some(CORE_MIN_PRIO));
        assert_eq!(q.peek_highest(), Some(tid(1)));
    }

    #[test]
    fn rotate_level() {
        let mut q = MultiLevelQueue::new();
        q.add_tail(tid(0), 5);
        assert!(!q.rotate_level(5));
        q.add_tail(tid(1), 5);
        q.add_tail(tid(2), 5);
        assert!(q.rotate_level(5));
        assert_eq!(q.level(5).collect::<Vec<_>>(), [tid(1), tid(2), tid(0)]);
    }

    #[test]
    #[should_panic]
    fn out_of_range_priority() {
        let mut q = MultiLevelQueue::new();
        q.add_tail(tid(0), CORE_MAX_PRIO + 1);
    }
}
