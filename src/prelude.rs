pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use tokio::sync::broadcast;

pub use crate::{
    aa55,
    channels::Channels,
    config::{self, Config},
    polling_cache::{ChannelData, PollingCache},
    reading::{Field, Reading, Value},
    utils::Utils,
};
