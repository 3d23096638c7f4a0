//! Asynchronous clock abstraction providing the timing primitives required by
//! broadcast scheduling, request deadlines and reassembly timeouts.
use embassy_time::Instant;
use futures_util::Future;

/// Monotonic clock shared by every task of a node.
pub trait NodeTimer {
    /// Current instant.
    fn now(&self) -> Instant;
    /// Resolve once `deadline` has passed. Must not busy-wait.
    fn delay_until<'a>(&'a self, deadline: Instant) -> impl Future<Output = ()> + 'a;
}

/// [`NodeTimer`] backed by the embassy time driver of the target.
#[cfg(feature = "embassy-timer")]
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyTimer;

#[cfg(feature = "embassy-timer")]
impl NodeTimer for EmbassyTimer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn delay_until<'a>(&'a self, deadline: Instant) -> impl Future<Output = ()> + 'a {
        embassy_time::Timer::at(deadline)
    }
}
