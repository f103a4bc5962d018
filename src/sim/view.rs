//! Notifications from the simulator to the shell that displays it.
//!
//! The interface is defined with the [`SourceView`] trait.
//! This is exposed to the simulator with the [`SimView`] enum.
//!
//! Besides those two key items, this module also includes:
//! - [`NullView`]: A `SourceView` that drops every notification.
//! - [`BufferedView`]: A `SourceView` that records notifications into a shared buffer.
//! - [`ChannelView`]: A `SourceView` that forwards notifications over a channel,
//!     for a shell running on another thread.
//! - [`CustomView`]: A `SourceView` that can be used to wrap around custom implementations.

use std::sync::{Arc, RwLock, RwLockWriteGuard, TryLockError};
use std::time::Duration;

use crossbeam_channel as cbc;

/// A receiver of the simulator's "current line changed" and "time elapsed" notifications.
pub trait SourceView {
    /// The instruction at PC now comes from this 1-based listing line.
    fn set_current_line(&self, line: usize);

    /// The last step consumed this much simulated time.
    fn elapsed(&self, time: Duration);
}
impl dyn SourceView {} // assert SourceView is dyn safe

/// A single notification, as recorded by [`BufferedView`] and sent by [`ChannelView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    /// See [`SourceView::set_current_line`].
    Line(usize),
    /// See [`SourceView::elapsed`].
    Elapsed(Duration),
}

/// No view. All notifications are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullView;
impl SourceView for NullView {
    fn set_current_line(&self, _line: usize) {}

    fn elapsed(&self, _time: Duration) {}
}

/// A view that appends every notification to a shared buffer.
///
/// The buffer can be accessed in code via [`BufferedView::get_events`].
///
/// Note that if a lock guard is acquired from the buffer of this view,
/// notifications are dropped until it is released.
/// Thus, a lock guard should never be leaked.
#[derive(Debug, Clone, Default)]
pub struct BufferedView {
    events: Arc<RwLock<Vec<ViewEvent>>>
}
impl BufferedView {
    /// Creates a new BufferedView.
    pub fn new() -> Self {
        Self { events: Default::default() }
    }
    /// Creates a new BufferedView from an already defined buffer.
    pub fn with_buf(events: Arc<RwLock<Vec<ViewEvent>>>) -> Self {
        Self { events }
    }

    fn try_events(&self) -> Option<RwLockWriteGuard<'_, Vec<ViewEvent>>> {
        match self.events.try_write() {
            Ok(g) => Some(g),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Gets a reference to the event buffer.
    pub fn get_events(&self) -> &Arc<RwLock<Vec<ViewEvent>>> {
        &self.events
    }

    /// The most recently reported line, if any was reported.
    pub fn last_line(&self) -> Option<usize> {
        let events = match self.events.read() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        events.iter()
            .rev()
            .find_map(|e| match e {
                ViewEvent::Line(l) => Some(*l),
                ViewEvent::Elapsed(_) => None,
            })
    }
}
impl SourceView for BufferedView {
    fn set_current_line(&self, line: usize) {
        if let Some(mut events) = self.try_events() {
            events.push(ViewEvent::Line(line));
        }
    }

    fn elapsed(&self, time: Duration) {
        if let Some(mut events) = self.try_events() {
            events.push(ViewEvent::Elapsed(time));
        }
    }
}

/// A view that sends each notification through a channel.
///
/// The channel is bounded and sends never block.
/// If the queue is full or the receiving end is gone, notifications are dropped.
#[derive(Debug, Clone)]
pub struct ChannelView {
    tx: cbc::Sender<ViewEvent>
}
impl ChannelView {
    /// Number of undelivered notifications [`ChannelView::new`] holds before dropping.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Creates a new channel view, returning it and the receiving end.
    pub fn new() -> (Self, cbc::Receiver<ViewEvent>) {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
    /// Creates a new channel view which queues at most `cap` notifications.
    pub fn with_capacity(cap: usize) -> (Self, cbc::Receiver<ViewEvent>) {
        let (tx, rx) = cbc::bounded(cap);
        (Self { tx }, rx)
    }
    /// Creates a channel view from an existing sender.
    pub fn with_sender(tx: cbc::Sender<ViewEvent>) -> Self {
        Self { tx }
    }
}
impl SourceView for ChannelView {
    fn set_current_line(&self, line: usize) {
        // a disconnected shell is not the simulator's problem
        let _ = self.tx.try_send(ViewEvent::Line(line));
    }

    fn elapsed(&self, time: Duration) {
        let _ = self.tx.try_send(ViewEvent::Elapsed(time));
    }
}

/// A wrapper around a custom view implementation.
pub struct CustomView(Box<dyn SourceView + Send + Sync>);
impl CustomView {
    /// Creates a new custom view.
    pub fn new(view: impl SourceView + Send + Sync + 'static) -> Self {
        Self(Box::new(view))
    }
}
impl SourceView for CustomView {
    fn set_current_line(&self, line: usize) {
        self.0.set_current_line(line)
    }

    fn elapsed(&self, time: Duration) {
        self.0.elapsed(time)
    }
}

/// All the variants of views accepted by the Simulator.
#[derive(Default)]
pub enum SimView {
    /// No view. This corresponds to the implementation of [`NullView`].
    #[default]
    Null,
    /// A buffered implementation. See [`BufferedView`].
    Buffered(BufferedView),
    /// A channel implementation. See [`ChannelView`].
    Channel(ChannelView),
    /// A custom implementation. See [`CustomView`].
    Custom(CustomView)
}
impl std::fmt::Debug for SimView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimView::Null => f.write_str("Null"),
            SimView::Buffered(_) => f.debug_struct("Buffered").finish_non_exhaustive(),
            SimView::Channel(_) => f.debug_struct("Channel").finish_non_exhaustive(),
            SimView::Custom(_) => f.debug_struct("Custom").finish_non_exhaustive(),
        }
    }
}
impl From<NullView> for SimView {
    fn from(_value: NullView) -> Self {
        SimView::Null
    }
}
impl From<BufferedView> for SimView {
    fn from(value: BufferedView) -> Self {
        SimView::Buffered(value)
    }
}
impl From<ChannelView> for SimView {
    fn from(value: ChannelView) -> Self {
        SimView::Channel(value)
    }
}
impl From<CustomView> for SimView {
    fn from(value: CustomView) -> Self {
        SimView::Custom(value)
    }
}
impl SourceView for SimView {
    fn set_current_line(&self, line: usize) {
        match self {
            SimView::Null => NullView.set_current_line(line),
            SimView::Buffered(v) => v.set_current_line(line),
            SimView::Channel(v) => v.set_current_line(line),
            SimView::Custom(v) => v.set_current_line(line),
        }
    }

    fn elapsed(&self, time: Duration) {
        match self {
            SimView::Null => NullView.elapsed(time),
            SimView::Buffered(v) => v.elapsed(time),
            SimView::Channel(v) => v.elapsed(time),
            SimView::Custom(v) => v.elapsed(time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_records_in_order() {
        let view = BufferedView::new();
        let sim_view = SimView::from(view.clone());
        sim_view.set_current_line(3);
        sim_view.elapsed(Duration::from_micros(2));
        sim_view.set_current_line(4);

        let events = view.get_events().read().unwrap().clone();
        assert_eq!(events, [
            ViewEvent::Line(3),
            ViewEvent::Elapsed(Duration::from_micros(2)),
            ViewEvent::Line(4),
        ]);
        assert_eq!(view.last_line(), Some(4));
    }

    #[test]
    fn channel_forwards() {
        let (view, rx) = ChannelView::new();
        let sim_view = SimView::from(view);
        sim_view.set_current_line(7);
        assert_eq!(rx.try_recv(), Ok(ViewEvent::Line(7)));

        drop(rx);
        // no panic on a disconnected receiver
        sim_view.set_current_line(8);
    }

    #[test]
    fn channel_drops_when_full() {
        let (view, rx) = ChannelView::with_capacity(2);
        let sim_view = SimView::from(view);
        for line in 1..=5 {
            sim_view.set_current_line(line);
        }
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.try_recv(), Ok(ViewEvent::Line(1)));
        assert_eq!(rx.try_recv(), Ok(ViewEvent::Line(2)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn custom_delegates() {
        let inner = BufferedView::new();
        let sim_view = SimView::from(CustomView::new(inner.clone()));
        sim_view.set_current_line(1);
        assert_eq!(inner.last_line(), Some(1));
    }
}
