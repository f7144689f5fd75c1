//! Lock-free cross-thread parameter ingress.
//!
//! Scene updates and listener tracking arrive on non-audio threads. The
//! bridge is a single-producer single-consumer ring: the sender half is
//! `Send` and lives with the network receiver; the receiver half is drained
//! by the graph at block start. Overflow drops the newest item and counts it.

use rtrb::{Consumer, Producer, RingBuffer};

/// Construct a bridge with the given capacity.
pub struct AsyncParameterBridge;

impl AsyncParameterBridge {
    pub fn new<T: Send>(capacity: usize) -> (AsyncSender<T>, AsyncReceiver<T>) {
        let (producer, consumer) = RingBuffer::new(capacity.max(1));
        (AsyncSender { producer }, AsyncReceiver { consumer })
    }
}

/// Producer half; owned by the external (non-audio) thread.
pub struct AsyncSender<T> {
    producer: Producer<T>,
}

impl<T: Send> AsyncSender<T> {
    /// Send a value; returns `false` (dropping the value) when the ring is
    /// full.
    pub fn send(&mut self, value: T) -> bool {
        self.producer.push(value).is_ok()
    }

    /// Free slots currently available.
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Consumer half; drained by the graph thread between blocks.
pub struct AsyncReceiver<T> {
    consumer: Consumer<T>,
}

impl<T: Send> AsyncReceiver<T> {
    /// Drain every pending value in arrival order.
    pub fn drain(&mut self, mut f: impl FnMut(T)) {
        while let Ok(value) = self.consumer.pop() {
            f(value);
        }
    }

    /// Most recent pending value, discarding older ones. Used for state-like
    /// parameters (scene snapshot, listener pose) where only the latest
    /// matters.
    pub fn latest(&mut self) -> Option<T> {
        let mut latest = None;
        while let Ok(value) = self.consumer.pop() {
            latest = Some(value);
        }
        latest
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}
