use crate::log;
use crate::readiness::{GaveUp, HttpProbe, Probe, ReadinessPoller};
use crate::timing::Duration;

/// What decides that a stopped service may be started again.
pub enum WaitFor<'a, P = HttpProbe> {
    /// As soon as the payload has finished.
    None,
    Time(Duration),
    /// When a remote node says so.
    Ready(ReadinessPoller<'a, P>),
}

impl<'a, P: Probe> WaitFor<'a, P> {
    pub(crate) fn block_until_ready(&self, logger: &log::Logger) -> Result<(), GaveUp> {
        match self {
            Self::None => Ok(()),
            Self::Time(duration) => {
                log::info!(logger, event = "WAIT_TIME", duration);
                duration.sleep();
                Ok(())
            }
            Self::Ready(poller) => poller.wait_until_ready().map(|_| ()),
        }
    }
}
