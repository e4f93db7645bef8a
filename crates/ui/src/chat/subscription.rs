use std::time::Duration;

use ferrer_platform::{
    ChangeFilter, ChannelEventStream, ChannelHandle, ChannelLease, ChannelStatus, ChannelWorker,
    PlatformResult, RealtimeProvider,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    #[default]
    Closed,
    Opening,
    Open,
    Reconnecting { attempt: u32, retry_in: Duration },
    Released,
}

/// Lifecycle of the single insert channel the chat view holds.
///
/// `R` is whatever drains the event stream on the caller's side: the stream
/// itself in tests, or the task reading it in the view. Release hands the
/// lease back to the provider and drops the reader.
pub struct RealtimeSubscription<R> {
    filter: ChangeFilter,
    state: SubscriptionState,
    lease: Option<ChannelLease>,
    reader: Option<R>,
}

impl<R> RealtimeSubscription<R> {
    pub fn new(filter: ChangeFilter) -> Self {
        Self {
            filter,
            state: SubscriptionState::Closed,
            lease: None,
            reader: None,
        }
    }

    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    /// Opens the channel once and keeps its lease. Returns `Ok(None)` when a
    /// channel is already open or the subscription was released.
    pub fn open(
        &mut self,
        realtime: &dyn RealtimeProvider,
    ) -> PlatformResult<Option<(ChannelEventStream, ChannelWorker)>> {
        if self.state != SubscriptionState::Closed {
            return Ok(None);
        }
        match realtime.subscribe(self.filter.clone()) {
            Ok(ChannelHandle {
                stream,
                lease,
                worker,
            }) => {
                self.state = SubscriptionState::Opening;
                self.lease = Some(lease);
                Ok(Some((stream, worker)))
            }
            Err(error) => {
                tracing::warn!(table = %self.filter.table, error = %error, "realtime subscribe failed");
                Err(error)
            }
        }
    }

    pub fn attach(&mut self, reader: R) {
        if self.state == SubscriptionState::Released {
            // Released before the reader existed; nothing may keep reading.
            drop(reader);
            return;
        }
        self.reader = Some(reader);
    }

    pub fn apply_status(&mut self, status: &ChannelStatus) {
        if self.state == SubscriptionState::Released {
            return;
        }
        self.state = match status {
            ChannelStatus::Subscribed => SubscriptionState::Open,
            ChannelStatus::Reconnecting { attempt, retry_in } => SubscriptionState::Reconnecting {
                attempt: *attempt,
                retry_in: *retry_in,
            },
            ChannelStatus::Closed => SubscriptionState::Closed,
        };
    }

    /// Unsubscribes and drops the reader. Returns true only for the first release.
    pub fn release(&mut self, realtime: &dyn RealtimeProvider) -> bool {
        if self.state == SubscriptionState::Released {
            return false;
        }
        self.state = SubscriptionState::Released;
        if let Some(lease) = self.lease.take() {
            realtime.unsubscribe(lease);
        }
        if let Some(reader) = self.reader.take() {
            tracing::debug!(table = %self.filter.table, "dropping realtime reader");
            drop(reader);
        }
        true
    }
}
