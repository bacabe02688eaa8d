use async_trait::async_trait;
use sitelog_core::{Channel, NotificationRequest};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::channel::{ChannelError, NotificationChannel};

/// In-process channel that keeps delivered messages
///
/// Failures queued with [`MemoryChannel::fail_next`] are returned before
/// anything is delivered, one per send.
#[derive(Clone)]
pub struct MemoryChannel {
    channel: Channel,
    state: Arc<Mutex<ChannelState>>,
}

#[derive(Default)]
struct ChannelState {
    sent: Vec<NotificationRequest>,
    failures: VecDeque<ChannelError>,
    attempts: u32,
}

impl MemoryChannel {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            state: Arc::new(Mutex::new(ChannelState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_next(&self, errors: impl IntoIterator<Item = ChannelError>) {
        self.state().failures.extend(errors);
    }

    /// Messages delivered so far
    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.state().sent.clone()
    }

    /// Number of send calls received, including failed ones
    pub fn attempts(&self) -> u32 {
        self.state().attempts
    }
}

#[async_trait]
impl NotificationChannel for MemoryChannel {
    async fn send(&self, request: &NotificationRequest) -> Result<(), ChannelError> {
        let mut state = self.state();
        state.attempts += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        state.sent.push(request.clone());
        Ok(())
    }

    fn channel(&self) -> Channel {
        self.channel
    }
}
