//! Priority queue for work scheduling.
//!
//! Work items are ordered by priority (higher first), then by enqueue order
//! (FIFO within the same priority level). Items can be re-prioritized or
//! removed while queued, which the image manager needs for
//! `set_priority` and `cancel`.
//!
//! Re-prioritization is lazy: the heap may hold stale entries for an item
//! whose priority changed or which was removed. Stale entries are discarded
//! on `pop()` and compacted away when they outnumber live items.
//!
//! # Example
//!
//! ```
//! use pixload::executor::{Priority, PriorityQueue, TaskId};
//!
//! let mut queue = PriorityQueue::new();
//! queue.push(TaskId::new(1), Priority::Low, "preheat");
//! queue.push(TaskId::new(2), Priority::High, "visible");
//!
//! // High comes out first despite being pushed second
//! let next = queue.pop().unwrap();
//! assert_eq!(next.item, "visible");
//! ```

use super::policy::Priority;
use super::task::TaskId;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

/// Stale heap entries tolerated before the heap is rebuilt.
const COMPACTION_SLACK: usize = 64;

/// A work item taken off the queue.
#[derive(Debug)]
pub struct QueuedWork<T> {
    /// Task that owns the work.
    pub task_id: TaskId,
    /// Priority at the time the item was dequeued.
    pub priority: Priority,
    /// When the item was first enqueued.
    pub enqueued_at: Instant,
    /// The queued payload.
    pub item: T,
}

impl<T> QueuedWork<T> {
    /// Returns how long this item waited in the queue.
    pub fn wait_time(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

/// Heap entry; refers to a slot by task id.
#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    task_id: TaskId,
    priority: Priority,
    sequence: u64,
}

// Ordering for BinaryHeap: higher priority first, then lower sequence (older) first
impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other_ordering => other_ordering,
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    priority: Priority,
    sequence: u64,
    enqueued_at: Instant,
    item: T,
}

/// Priority queue keyed by task id.
///
/// Not thread-safe; the worker pool wraps it in a mutex.
#[derive(Debug)]
pub struct PriorityQueue<T> {
    heap: BinaryHeap<HeapEntry>,
    slots: HashMap<TaskId, Slot<T>>,
    next_sequence: u64,
}

impl<T> PriorityQueue<T> {
    /// Creates a new empty priority queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            slots: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Adds an item to the queue.
    ///
    /// If the task already has a queued item it is replaced and keeps its
    /// original position.
    pub fn push(&mut self, task_id: TaskId, priority: Priority, item: T) {
        if let Some(slot) = self.slots.get_mut(&task_id) {
            slot.item = item;
            if slot.priority != priority {
                slot.priority = priority;
                let sequence = slot.sequence;
                self.heap.push(HeapEntry {
                    task_id,
                    priority,
                    sequence,
                });
            }
            return;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.slots.insert(
            task_id,
            Slot {
                priority,
                sequence,
                enqueued_at: Instant::now(),
                item,
            },
        );
        self.heap.push(HeapEntry {
            task_id,
            priority,
            sequence,
        });
    }

    /// Removes and returns the highest-priority item.
    pub fn pop(&mut self) -> Option<QueuedWork<T>> {
        while let Some(entry) = self.heap.pop() {
            let live = self
                .slots
                .get(&entry.task_id)
                .is_some_and(|slot| slot.priority == entry.priority && slot.sequence == entry.sequence);
            if !live {
                continue;
            }
            let slot = self.slots.remove(&entry.task_id)?;
            return Some(QueuedWork {
                task_id: entry.task_id,
                priority: slot.priority,
                enqueued_at: slot.enqueued_at,
                item: slot.item,
            });
        }
        None
    }

    /// Changes the priority of a queued item.
    ///
    /// The item keeps its enqueue order within its new priority level.
    /// Returns false if the task has nothing queued.
    pub fn reprioritize(&mut self, task_id: TaskId, priority: Priority) -> bool {
        let Some(slot) = self.slots.get_mut(&task_id) else {
            return false;
        };
        if slot.priority != priority {
            slot.priority = priority;
            let sequence = slot.sequence;
            self.heap.push(HeapEntry {
                task_id,
                priority,
                sequence,
            });
            self.maybe_compact();
        }
        true
    }

    /// Removes a queued item, returning it.
    pub fn remove(&mut self, task_id: TaskId) -> Option<T> {
        let slot = self.slots.remove(&task_id)?;
        self.maybe_compact();
        Some(slot.item)
    }

    /// Returns the queued priority for a task.
    pub fn priority_of(&self, task_id: TaskId) -> Option<Priority> {
        self.slots.get(&task_id).map(|slot| slot.priority)
    }

    /// Returns true if the task has queued work.
    pub fn contains(&self, task_id: TaskId) -> bool {
        self.slots.contains_key(&task_id)
    }

    /// Returns the number of queued items.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Removes all items, returning them in arbitrary order.
    pub fn drain(&mut self) -> Vec<(TaskId, T)> {
        self.heap.clear();
        self.slots.drain().map(|(id, slot)| (id, slot.item)).collect()
    }

    /// Returns the number of queued items at each priority level.
    pub fn priority_counts(&self) -> HashMap<Priority, usize> {
        let mut counts = HashMap::new();
        for slot in self.slots.values() {
            *counts.entry(slot.priority).or_insert(0) += 1;
        }
        counts
    }

    fn maybe_compact(&mut self) {
        if self.heap.len() <= self.slots.len() * 2 + COMPACTION_SLACK {
            return;
        }
        self.heap = self
            .slots
            .iter()
            .map(|(task_id, slot)| HeapEntry {
                task_id: *task_id,
                priority: slot.priority,
                sequence: slot.sequence,
            })
            .collect();
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
