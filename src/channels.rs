use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Channels {
    pub from_poller: broadcast::Sender<ChannelData>,
    pub to_poller: broadcast::Sender<ChannelData>,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            from_poller: Self::channel(),
            to_poller: Self::channel(),
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(256).0
    }
}
