use crate::aa55::inverter::InverterClient;
use crate::aa55::packet::{DeviceIdentity, RunningSnapshot};
use crate::error::Error;
use crate::prelude::*;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Clone, Debug, PartialEq)]
pub enum ChannelData {
    Reading(Reading),    // poller -> consumers
    HardFailure(String), // poller -> consumers
    DailyReset(Field),   // scheduler -> poller
    Shutdown,
}

/// Mutated only from the polling task; readers take the lock briefly.
#[derive(Debug, Default)]
pub struct PollState {
    current: Option<Reading>,
    last_known: Option<Reading>,
    consecutive_failures: u32,
    last_update_success: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PollStats {
    polls: u64,
    successes: u64,
    transient_failures: u64,
    offline_readings: u64,
    hard_failures: u64,
    resets: u64,
}

impl PollStats {
    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn offline_readings(&self) -> u64 {
        self.offline_readings
    }

    pub fn print_summary(&self) {
        info!("Poll Statistics:");
        info!("  Total polls: {}", self.polls);
        info!("  Successful: {}", self.successes);
        info!("  Transient failures: {}", self.transient_failures);
        info!("  Offline readings published: {}", self.offline_readings);
        info!("  Hard failures: {}", self.hard_failures);
        info!("  Field resets: {}", self.resets);
    }
}

/// Turns an unreliable request/response link into a steady stream of
/// readings. Isolated failures repeat the last good reading; a streak of
/// `offline_threshold` failures publishes a synthetic offline reading.
#[derive(Clone)]
pub struct PollingCache {
    client: Arc<InverterClient>,
    channels: Channels,
    poll_interval: Duration,
    offline_threshold: u32,
    state: Arc<Mutex<PollState>>,
    pub stats: Arc<Mutex<PollStats>>,
}

impl PollingCache {
    pub fn new(config: &Config, client: Arc<InverterClient>, channels: Channels) -> Self {
        Self {
            client,
            channels,
            poll_interval: config.poll_interval(),
            offline_threshold: config.offline_threshold(),
            state: Arc::new(Mutex::new(PollState::default())),
            stats: Arc::new(Mutex::new(PollStats::default())),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        self.client.identity()
    }

    /// `receiver` must come from `channels.to_poller`. It is subscribed by
    /// the caller so a reset or shutdown sent right after spawning is seen.
    pub async fn start(&self, mut receiver: broadcast::Receiver<ChannelData>) -> Result<()> {
        let mut interval = tokio::time::interval(self.poll_interval);
        // a slow fetch pushes the next one back instead of bunching them up
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "polling {} every {:?}",
            self.identity().serial_number,
            self.poll_interval
        );

        loop {
            tokio::select! {
                _ = interval.tick() => self.poll().await,
                message = receiver.recv() => match message {
                    Ok(ChannelData::DailyReset(field)) => {
                        if let Err(e) = self.daily_reset(field) {
                            warn!("daily reset of {} failed: {}", field, e);
                        }
                    }
                    Ok(ChannelData::Shutdown) => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("poller missed {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => bail!("poller channel closed"),
                }
            }
        }

        // lets consumers drain whatever was published before it
        let _ = self.channels.from_poller.send(ChannelData::Shutdown);

        info!("poller exiting");
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_poller.send(ChannelData::Shutdown);
    }

    async fn poll(&self) {
        let message = match self.poll_once().await {
            Ok(reading) => ChannelData::Reading(reading),
            Err(e) => {
                warn!("poll failed: {}", e);
                ChannelData::HardFailure(e.to_string())
            }
        };

        // no subscribers is fine, the cache still holds the reading
        let _ = self.channels.from_poller.send(message);
    }

    /// One fetch cycle. Only non-transient failures come back as `Err`.
    pub async fn poll_once(&self) -> Result<Reading, Error> {
        let result = self.client.fetch_running_snapshot().await;
        self.record(result)
    }

    fn record(&self, result: Result<RunningSnapshot, Error>) -> Result<Reading, Error> {
        let mut state = self.state();
        let mut stats = self.stats();
        stats.polls += 1;

        match result {
            Ok(snapshot) => {
                let reading = Reading::from(&snapshot);
                state.last_known = Some(reading.clone());
                state.current = Some(reading.clone());
                state.consecutive_failures = 0;
                state.last_update_success = true;
                stats.successes += 1;
                Ok(reading)
            }
            Err(e) if e.is_transient() => {
                state.consecutive_failures += 1;
                state.last_update_success = true;
                stats.transient_failures += 1;

                let streak = state.consecutive_failures;
                let reading = if streak < self.offline_threshold {
                    debug!("no response received (streak of {}): {}", streak, e);
                    state.last_known.clone().unwrap_or_default()
                } else {
                    if streak == self.offline_threshold {
                        warn!("inverter not responding (streak of {}), reporting offline", streak);
                    } else {
                        debug!("inverter not responding (streak of {}): {}", streak, e);
                    }
                    stats.offline_readings += 1;
                    Reading::offline(state.last_known.as_ref())
                };

                state.current = Some(reading.clone());
                Ok(reading)
            }
            Err(e) => {
                state.last_update_success = false;
                stats.hard_failures += 1;
                Err(e)
            }
        }
    }

    pub fn current(&self) -> Option<Reading> {
        self.state().current.clone()
    }

    pub fn last_known(&self) -> Option<Reading> {
        self.state().last_known.clone()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state().consecutive_failures
    }

    pub fn last_update_success(&self) -> bool {
        self.state().last_update_success
    }

    /// Live value, or the last known one when the live reading lacks it.
    pub fn sensor_value(&self, field: Field) -> Option<Value> {
        let state = self.state();
        state
            .current
            .as_ref()
            .and_then(|r| r.get(field))
            .or_else(|| state.last_known.as_ref().and_then(|r| r.get(field)))
    }

    /// Like `sensor_value`, but a live zero also falls back, so counters
    /// never flash 0 while the link is flaky.
    pub fn total_sensor_value(&self, field: Field) -> Option<Value> {
        let state = self.state();
        state
            .current
            .as_ref()
            .and_then(|r| r.get(field))
            .filter(|v| !v.is_zero())
            .or_else(|| state.last_known.as_ref().and_then(|r| r.get(field)))
    }

    /// Cumulative fields stay available through the night once anything
    /// was published; the rest follow the outcome of the last cycle.
    pub fn available(&self, field: Field) -> bool {
        let state = self.state();
        if field.is_cumulative() {
            state.current.is_some()
        } else {
            state.last_update_success
        }
    }

    /// Zeroes `field` in both the live and the last known reading.
    pub fn reset(&self, field: Field) -> Result<()> {
        let mut state = self.state();
        if let Some(current) = state.current.as_mut() {
            current.zero(field)?;
        }
        if let Some(last_known) = state.last_known.as_mut() {
            last_known.zero(field)?;
        }
        self.stats().resets += 1;

        info!("reset {} to 0", field);
        Ok(())
    }

    /// Midnight reset for daily counters. Skipped while the inverter is up,
    /// since it resets its own counters and those stay authoritative.
    pub fn daily_reset(&self, field: Field) -> Result<bool> {
        let offline = {
            let state = self.state();
            !state.last_update_success || state.current.as_ref().is_some_and(Reading::is_offline)
        };

        if !offline {
            debug!("inverter online, leaving {} to the device", field);
            return Ok(false);
        }

        self.reset(field)?;
        Ok(true)
    }

    fn state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stats(&self) -> MutexGuard<'_, PollStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}
