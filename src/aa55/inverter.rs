use crate::aa55::packet::{self, Command, DeviceIdentity, RunningSnapshot};
use crate::aa55::transport::{self, Transport};
use crate::error::Error;
use crate::prelude::*;

/// One physical inverter. The identity is read once while connecting and
/// never changes afterwards.
pub struct InverterClient {
    transport: Box<dyn Transport>,
    identity: DeviceIdentity,
}

impl InverterClient {
    /// Queries the identity of the device. Any failure here is fatal: an
    /// inverter that can't tell us what it is is unreachable or misconfigured.
    pub async fn connect(transport: Box<dyn Transport>) -> Result<Self, Error> {
        let payload = Self::execute(transport.as_ref(), Command::QueryIdInfo).await?;
        let identity = DeviceIdentity::decode(&payload)?;

        info!(
            "connected to {} (serial {})",
            identity.model, identity.serial_number
        );

        Ok(Self {
            transport,
            identity,
        })
    }

    pub async fn from_config(inverter: &config::Inverter) -> Result<Self, Error> {
        info!(
            "connecting to inverter at {}:{}",
            inverter.host(),
            inverter.port()
        );

        Self::connect(transport::from_config(inverter)?).await
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Failures are returned untouched; classifying them is up to the caller.
    pub async fn fetch_running_snapshot(&self) -> Result<RunningSnapshot, Error> {
        let payload = Self::execute(self.transport.as_ref(), Command::QueryRunningInfo).await?;
        RunningSnapshot::decode(&payload)
    }

    async fn execute(transport: &dyn Transport, command: Command) -> Result<Vec<u8>, Error> {
        let response = transport.send_and_receive(command).await?;
        let payload = packet::validate_and_unwrap(&response, command)?;
        debug!("{} payload {}", command, Utils::hex(payload));
        Ok(payload.to_vec())
    }
}
