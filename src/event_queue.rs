//! Min-heap event queue with O(1) idempotent cancellation.
//!
//! An entry-finder/dropped-flag design: cancelling an entry does not search
//! or rebuild the heap, it just flips a shared flag that
//! [`EventQueue::pop_next`] checks (and discards) lazily on its way out.

use std::cmp::Ordering;
use std::cell::Cell;
use std::collections::BinaryHeap;
use std::rc::Rc;

/// Handle returned by [`EventQueue::push`], used to cancel that specific entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

struct Entry<E> {
    time: f64,
    seq: u64,
    dropped: Rc<Cell<bool>>,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so earliest time (then earliest
        // sequence number, for stable FIFO ordering of same-time events) pops first.
        other
            .time
            .partial_cmp(&self.time)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A time-ordered, cancellable event queue.
pub struct EventQueue<E> {
    heap: BinaryHeap<Entry<E>>,
    next_seq: u64,
    flags: std::collections::HashMap<u64, Rc<Cell<bool>>>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            next_seq: 0,
            flags: std::collections::HashMap::new(),
        }
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `event` at `time`, returning a handle that can later cancel it.
    pub fn push(&mut self, time: f64, event: E) -> EventHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        let dropped = Rc::new(Cell::new(false));
        self.flags.insert(seq, Rc::clone(&dropped));
        self.heap.push(Entry {
            time,
            seq,
            dropped,
            event,
        });
        EventHandle(seq)
    }

    /// Cancels a previously scheduled event. Idempotent: cancelling an
    /// already-popped or already-cancelled handle is a no-op.
    pub fn cancel(&mut self, handle: EventHandle) {
        if let Some(flag) = self.flags.remove(&handle.0) {
            flag.set(true);
        }
    }

    /// Cancels every currently-queued event matching `predicate`, without
    /// touching heap ordering. Used when an entity (e.g. a destroyed tag)
    /// leaves the simulation and all of its pending events must be dropped.
    pub fn drop_all_matching(&mut self, predicate: impl Fn(&E) -> bool) {
        for entry in self.heap.iter() {
            if predicate(&entry.event) {
                entry.dropped.set(true);
                self.flags.remove(&entry.seq);
            }
        }
    }

    /// Pops the earliest non-cancelled event, discarding cancelled entries
    /// it encounters along the way.
    pub fn pop_next(&mut self) -> Option<(f64, E)> {
        while let Some(entry) = self.heap.pop() {
            if entry.dropped.get() {
                continue;
            }
            self.flags.remove(&entry.seq);
            return Some((entry.time, entry.event));
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.heap.iter().all(|e| e.dropped.get())
    }

    pub fn peek_time(&self) -> Option<f64> {
        self.heap.iter().filter(|e| !e.dropped.get()).map(|e| e.time).fold(None, |acc, t| {
            Some(match acc {
                Some(best) if best <= t => best,
                _ => t,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_order() {
        let mut q = EventQueue::new();
        q.push(3.0, "c");
        q.push(1.0, "a");
        q.push(2.0, "b");
        assert_eq!(q.pop_next(), Some((1.0, "a")));
        assert_eq!(q.pop_next(), Some((2.0, "b")));
        assert_eq!(q.pop_next(), Some((3.0, "c")));
        assert_eq!(q.pop_next(), None);
    }

    #[test]
    fn same_time_events_pop_fifo() {
        let mut q = EventQueue::new();
        q.push(1.0, "first");
        q.push(1.0, "second");
        assert_eq!(q.pop_next(), Some((1.0, "first")));
        assert_eq!(q.pop_next(), Some((1.0, "second")));
    }

    #[test]
    fn cancel_is_idempotent_and_skips_on_pop() {
        let mut q = EventQueue::new();
        let h = q.push(1.0, "cancel-me");
        q.push(2.0, "keep-me");
        q.cancel(h);
        q.cancel(h);
        assert_eq!(q.pop_next(), Some((2.0, "keep-me")));
        assert_eq!(q.pop_next(), None);
    }

    #[test]
    fn drop_all_matching_removes_by_predicate() {
        let mut q = EventQueue::new();
        q.push(1.0, ("tag-1", "query"));
        q.push(2.0, ("tag-2", "query"));
        q.push(3.0, ("tag-1", "ack"));
        q.drop_all_matching(|(id, _)| *id == "tag-1");
        assert_eq!(q.pop_next(), Some((2.0, ("tag-2", "query"))));
        assert_eq!(q.pop_next(), None);
    }

    #[test]
    fn is_empty_accounts_for_cancelled_entries() {
        let mut q: EventQueue<&str> = EventQueue::new();
        assert!(q.is_empty());
        let h = q.push(1.0, "x");
        assert!(!q.is_empty());
        q.cancel(h);
        assert!(q.is_empty());
    }

    #[test]
    fn peek_time_ignores_cancelled() {
        let mut q = EventQueue::new();
        let h = q.push(1.0, "x");
        q.push(5.0, "y");
        assert_eq!(q.peek_time(), Some(1.0));
        q.cancel(h);
        assert_eq!(q.peek_time(), Some(5.0));
    }
}
