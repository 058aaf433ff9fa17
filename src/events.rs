//! Diagnostic events from the tick handler.
//!
//! The scheduler never blocks and never prints; it reports what it did
//! through a bounded queue built on `critical-section` and
//! `heapless::Deque`. The foreground drains it at its own pace.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use crate::error::KernelError;

/// Capacity of the kernel's event queue.
pub const EVENT_QUEUE_SIZE: usize = 8;

/// Something the tick handler did that the foreground may care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelEvent {
    /// Short press of the brightness button; carries the new scale
    BrightnessScaleChanged(u8),
    /// The brightness button reached its hold threshold
    HoldStarted,
    /// The reset button was debounced
    ResetPressed,
    /// Demo mode expired and aborted the running animation
    DemoAdvance,
    /// A fader advance was skipped because the handler was re-entered
    FaderOverrun,
    /// A fatal error was latched
    ErrorLatched(KernelError),
}

/// Bounded queue shared between the tick handler and the foreground.
pub struct EventQueue<T, const SIZE: usize> {
    inner: Mutex<RefCell<Deque<T, SIZE>>>,
}

/// Queue of [`KernelEvent`]s as owned by the control state.
pub type EventChannel = EventQueue<KernelEvent, EVENT_QUEUE_SIZE>;

impl<T, const SIZE: usize> EventQueue<T, SIZE> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Queue an event, dropping it when the queue is full.
    ///
    /// Returns `false` if the event was dropped.
    pub fn publish(&self, event: T) -> bool {
        critical_section::with(|cs| self.inner.borrow(cs).borrow_mut().push_back(event).is_ok())
    }

    /// Take the oldest event
    pub fn next(&self) -> Option<T> {
        critical_section::with(|cs| self.inner.borrow(cs).borrow_mut().pop_front())
    }

    /// Hand every queued event to `handle`, oldest first
    pub fn drain(&self, mut handle: impl FnMut(T)) {
        while let Some(event) = self.next() {
            handle(event);
        }
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow(cs).borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, const SIZE: usize> Default for EventQueue<T, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
