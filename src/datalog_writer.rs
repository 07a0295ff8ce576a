use crate::aa55::packet::DeviceIdentity;
use crate::prelude::*;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Appends every published reading to a file, one JSON object per line.
#[derive(Debug, Clone)]
pub struct DatalogWriter {
    file: Arc<Mutex<std::fs::File>>,
    path: String,
    lines_written: Arc<Mutex<u64>>,
}

impl DatalogWriter {
    pub fn new(path: &str) -> Result<Self> {
        info!("Opening datalog file at {}", path);

        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to open datalog file {}: {}", path, e);
                return Err(e.into());
            }
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)) {
                error!("Failed to set permissions on datalog file {}: {}", path, e);
                return Err(e.into());
            }
        }

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_string(),
            lines_written: Arc::new(Mutex::new(0)),
        })
    }

    /// `receiver` must be subscribed to `from_poller` before the poller
    /// starts, or the first readings are missed.
    pub async fn start(
        &self,
        identity: DeviceIdentity,
        mut receiver: broadcast::Receiver<ChannelData>,
    ) -> Result<()> {
        loop {
            match receiver.recv().await {
                Ok(ChannelData::Reading(reading)) => {
                    if let Err(e) = self.write_reading(&identity, &reading) {
                        warn!("datalog write failed: {}", e);
                    }
                }
                Ok(ChannelData::HardFailure(reason)) => {
                    if let Err(e) = self.write_failure(&identity, &reason) {
                        warn!("datalog write failed: {}", e);
                    }
                }
                Ok(ChannelData::Shutdown) => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("datalog writer missed {} readings", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("datalog writer exiting after {} lines", self.lines_written());
        Ok(())
    }

    pub fn write_reading(&self, identity: &DeviceIdentity, reading: &Reading) -> Result<()> {
        let mut line = Self::envelope(identity)?;
        line.insert("reading".to_string(), serde_json::to_value(reading)?);
        self.write_line(serde_json::Value::Object(line))
    }

    pub fn write_failure(&self, identity: &DeviceIdentity, reason: &str) -> Result<()> {
        let mut line = Self::envelope(identity)?;
        line.insert(
            "error".to_string(),
            serde_json::Value::String(reason.to_string()),
        );
        self.write_line(serde_json::Value::Object(line))
    }

    pub fn lines_written(&self) -> u64 {
        *self.lines_written.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn envelope(identity: &DeviceIdentity) -> Result<serde_json::Map<String, serde_json::Value>> {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        let mut json_data = serde_json::Map::new();
        json_data.insert(
            "utc_timestamp".to_string(),
            serde_json::Value::Number(timestamp.into()),
        );
        json_data.insert(
            "model".to_string(),
            serde_json::Value::String(identity.model.clone()),
        );
        json_data.insert(
            "serial".to_string(),
            serde_json::Value::String(identity.serial_number.clone()),
        );
        Ok(json_data)
    }

    fn write_line(&self, json_value: serde_json::Value) -> Result<()> {
        let json_string = serde_json::to_string(&json_value)?;

        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("Failed to lock datalog file"))?;
        if let Err(e) = writeln!(file, "{}", json_string).and_then(|_| file.flush()) {
            error!("Failed to write to datalog file {}: {}", self.path, e);
            return Err(e.into());
        }

        let mut lines_written = self
            .lines_written
            .lock()
            .map_err(|_| anyhow!("Failed to lock line counter"))?;
        *lines_written += 1;
        trace!("{} lines in datalog file", *lines_written);

        Ok(())
    }
}
