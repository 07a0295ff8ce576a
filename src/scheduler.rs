use crate::prelude::*;

use chrono::{DateTime, Local, TimeZone};

/// Fires the daily counter reset on a cron schedule in local time. The
/// reset itself happens in the polling task; this only asks for it.
pub struct Scheduler {
    config: config::Scheduler,
    channels: Channels,
}

impl Scheduler {
    pub fn new(config: config::Scheduler, channels: Channels) -> Self {
        Self { config, channels }
    }

    pub async fn start(&self, mut receiver: broadcast::Receiver<ChannelData>) -> Result<()> {
        if !self.config.enabled() {
            info!("scheduler disabled");
            return Ok(());
        }

        loop {
            let now = Local::now();
            let next = Self::next_run(self.config.daily_reset_cron(), &now)?;
            let wait = (next - now).to_std().unwrap_or_default();
            debug!("next daily reset at {}", next);

            tokio::select! {
                _ = tokio::time::sleep(wait) => self.fire(),
                message = receiver.recv() => match message {
                    Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
                    _ => {}
                }
            }
        }

        info!("scheduler exiting");
        Ok(())
    }

    pub fn next_run<TZ: TimeZone>(cron: &str, after: &DateTime<TZ>) -> Result<DateTime<TZ>> {
        cron_parser::parse(cron, after).map_err(|e| anyhow!("invalid cron {:?}: {:?}", cron, e))
    }

    fn fire(&self) {
        for field in self.config.daily_reset() {
            info!("requesting daily reset of {}", field);
            if let Err(e) = self.channels.to_poller.send(ChannelData::DailyReset(*field)) {
                warn!("daily reset of {} not delivered: {}", field, e);
            }
        }
    }
}
