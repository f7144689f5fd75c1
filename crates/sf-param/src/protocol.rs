//! Protocol cores and the typed port handles components hold.
//!
//! A port handle owns a [`PortCell`] whose inner `Rc` points at the protocol
//! core. Connecting ports re-points the consumer's inner `Rc` at the
//! producer's core, so after flattening both ends share storage; the handles
//! themselves never move. Because the core sits behind two indirections,
//! value access is closure-based: the handle clones the core `Rc`, borrows
//! it locally and passes the value to the closure.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::endpoint::{PortCell, PortDirection};
use crate::values::{ParameterValue, ProtocolKind};

// ============ Shared ============

/// Single storage cell; producer writes are visible to consumers in the same
/// block, ordered by the schedule.
#[derive(Debug)]
pub struct SharedCore<P> {
    pub(crate) value: P,
}

impl<P> SharedCore<P> {
    pub fn new(value: P) -> Self {
        Self { value }
    }
}

/// Consumer handle of a shared-protocol port.
pub struct SharedInput<P: ParameterValue> {
    cell: Rc<PortCell<SharedCore<P>>>,
}

/// Producer handle of a shared-protocol port.
pub struct SharedOutput<P: ParameterValue> {
    cell: Rc<PortCell<SharedCore<P>>>,
}

impl<P: ParameterValue> SharedInput<P> {
    pub fn new(name: &str, initial: P) -> Self {
        let config = initial.config();
        Self {
            cell: PortCell::new(
                name,
                PortDirection::Input,
                P::KIND,
                ProtocolKind::Shared,
                config,
                SharedCore::new(initial),
            ),
        }
    }

    /// Read the shared value.
    pub fn with<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        let core = self.cell.core();
        let guard = core.borrow();
        f(&guard.value)
    }

    /// Wrap an existing cell (e.g. an external producer counterpart).
    pub fn from_cell(cell: Rc<PortCell<SharedCore<P>>>) -> Self {
        Self { cell }
    }

    pub fn cell(&self) -> Rc<PortCell<SharedCore<P>>> {
        self.cell.clone()
    }
}

impl<P: ParameterValue> SharedOutput<P> {
    pub fn new(name: &str, initial: P) -> Self {
        let config = initial.config();
        Self {
            cell: PortCell::new(
                name,
                PortDirection::Output,
                P::KIND,
                ProtocolKind::Shared,
                config,
                SharedCore::new(initial),
            ),
        }
    }

    /// Wrap an existing cell (e.g. an external producer counterpart).
    pub fn from_cell(cell: Rc<PortCell<SharedCore<P>>>) -> Self {
        Self { cell }
    }

    /// Mutate the shared value; consumers running later in the same block
    /// observe the writes.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        let core = self.cell.core();
        let mut guard = core.borrow_mut();
        f(&mut guard.value)
    }

    pub fn cell(&self) -> Rc<PortCell<SharedCore<P>>> {
        self.cell.clone()
    }
}

// ============ Double-buffered ============

/// Front/back cell pair with an explicit publish.
#[derive(Debug)]
pub struct DoubleBufferedCore<P> {
    pub(crate) front: P,
    pub(crate) back: P,
    pub(crate) changed: bool,
}

impl<P: Clone> DoubleBufferedCore<P> {
    pub fn new(initial: P) -> Self {
        Self {
            front: initial.clone(),
            back: initial,
            changed: false,
        }
    }
}

/// Consumer handle of a double-buffered port.
pub struct DoubleBufferedInput<P: ParameterValue> {
    cell: Rc<PortCell<DoubleBufferedCore<P>>>,
}

/// Producer handle of a double-buffered port.
pub struct DoubleBufferedOutput<P: ParameterValue> {
    cell: Rc<PortCell<DoubleBufferedCore<P>>>,
}

impl<P: ParameterValue + Clone> DoubleBufferedInput<P> {
    pub fn new(name: &str, initial: P) -> Self {
        let config = initial.config();
        Self {
            cell: PortCell::new(
                name,
                PortDirection::Input,
                P::KIND,
                ProtocolKind::DoubleBuffered,
                config,
                DoubleBufferedCore::new(initial),
            ),
        }
    }

    /// Read the consumer-visible (front) value.
    pub fn with<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        let core = self.cell.core();
        let guard = core.borrow();
        f(&guard.front)
    }

    /// True exactly once after each publish, until reset.
    ///
    /// The flag lives on the shared core: with several consumers connected
    /// to one producer, whichever consumer resets first clears it for all.
    /// Gate on it only for single-consumer ports; fan-out consumers should
    /// read unconditionally.
    pub fn changed(&self) -> bool {
        self.cell.core().borrow().changed
    }

    pub fn reset_changed(&self) {
        self.cell.core().borrow_mut().changed = false;
    }

    /// Wrap an existing cell (e.g. an external producer counterpart).
    pub fn from_cell(cell: Rc<PortCell<DoubleBufferedCore<P>>>) -> Self {
        Self { cell }
    }

    pub fn cell(&self) -> Rc<PortCell<DoubleBufferedCore<P>>> {
        self.cell.clone()
    }
}

impl<P: ParameterValue + Clone> DoubleBufferedOutput<P> {
    pub fn new(name: &str, initial: P) -> Self {
        let config = initial.config();
        Self {
            cell: PortCell::new(
                name,
                PortDirection::Output,
                P::KIND,
                ProtocolKind::DoubleBuffered,
                config,
                DoubleBufferedCore::new(initial),
            ),
        }
    }

    /// Wrap an existing cell (e.g. an external producer counterpart).
    pub fn from_cell(cell: Rc<PortCell<DoubleBufferedCore<P>>>) -> Self {
        Self { cell }
    }

    /// Mutate the producer-writable (back) value.
    pub fn with_back_mut<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        let core = self.cell.core();
        let mut guard = core.borrow_mut();
        f(&mut guard.back)
    }

    /// Publish: swap front and back, raise the changed flag.
    pub fn swap_buffers(&self) {
        let core = self.cell.core();
        let mut guard = core.borrow_mut();
        let guard = &mut *guard;
        std::mem::swap(&mut guard.front, &mut guard.back);
        guard.changed = true;
    }

    pub fn cell(&self) -> Rc<PortCell<DoubleBufferedCore<P>>> {
        self.cell.clone()
    }
}

// ============ Message queue ============

/// Bounded FIFO with drop-newest overflow.
#[derive(Debug)]
pub struct MessageQueueCore<P> {
    queue: VecDeque<P>,
    capacity: usize,
    dropped: u64,
}

impl<P> MessageQueueCore<P> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }
}

/// Queue capacity used when the component does not specify one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Consumer handle of a message-queue port.
pub struct MessageQueueInput<P: ParameterValue> {
    cell: Rc<PortCell<MessageQueueCore<P>>>,
}

/// Producer handle of a message-queue port.
pub struct MessageQueueOutput<P: ParameterValue> {
    cell: Rc<PortCell<MessageQueueCore<P>>>,
}

impl<P: ParameterValue> MessageQueueInput<P> {
    pub fn new(name: &str, capacity: usize, template: &P) -> Self {
        Self {
            cell: PortCell::new(
                name,
                PortDirection::Input,
                P::KIND,
                ProtocolKind::MessageQueue,
                template.config(),
                MessageQueueCore::new(capacity),
            ),
        }
    }

    pub fn dequeue(&self) -> Option<P> {
        self.cell.core().borrow_mut().queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.cell.core().borrow().queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cell.core().borrow().queue.len()
    }

    /// Messages discarded due to overflow since construction.
    pub fn dropped(&self) -> u64 {
        self.cell.core().borrow().dropped
    }

    /// Wrap an existing cell (e.g. an external producer counterpart).
    pub fn from_cell(cell: Rc<PortCell<MessageQueueCore<P>>>) -> Self {
        Self { cell }
    }

    pub fn cell(&self) -> Rc<PortCell<MessageQueueCore<P>>> {
        self.cell.clone()
    }
}

impl<P: ParameterValue> MessageQueueOutput<P> {
    pub fn new(name: &str, capacity: usize, template: &P) -> Self {
        Self {
            cell: PortCell::new(
                name,
                PortDirection::Output,
                P::KIND,
                ProtocolKind::MessageQueue,
                template.config(),
                MessageQueueCore::new(capacity),
            ),
        }
    }

    /// Wrap an existing cell (e.g. an external producer counterpart).
    pub fn from_cell(cell: Rc<PortCell<MessageQueueCore<P>>>) -> Self {
        Self { cell }
    }

    /// Enqueue a message; on overflow the newest (this) message is dropped
    /// and `false` is returned.
    pub fn enqueue(&self, message: P) -> bool {
        let core = self.cell.core();
        let mut guard = core.borrow_mut();
        if guard.queue.len() >= guard.capacity {
            guard.dropped += 1;
            log::warn!("message queue full (capacity {}); newest message dropped", guard.capacity);
            return false;
        }
        guard.queue.push_back(message);
        true
    }

    pub fn cell(&self) -> Rc<PortCell<MessageQueueCore<P>>> {
        self.cell.clone()
    }
}
