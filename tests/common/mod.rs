#![allow(dead_code)]

use aa55_bridge::aa55::packet::{Command, FrameFactory};
use aa55_bridge::aa55::transport::{Transport, ID_INFO_PAYLOAD, RUNNING_INFO_PAYLOAD};
use aa55_bridge::prelude::*;
use aa55_bridge::Error;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Factory();
impl Factory {
    pub fn config() -> Config {
        Self::config_with("")
    }

    /// Mock inverter config with `extra` appended as top-level YAML.
    pub fn config_with(extra: &str) -> Config {
        let yaml = format!(
            "inverter:\n  host: localhost\n  port: 8899\n  mock: true\npoll_interval: 1\n{}",
            extra
        );
        Config::from_yaml(&yaml).unwrap()
    }

    pub fn id_info_frame() -> Vec<u8> {
        FrameFactory::response(Command::QueryIdInfo, &ID_INFO_PAYLOAD).unwrap()
    }

    pub fn running_info_frame() -> Vec<u8> {
        FrameFactory::response(Command::QueryRunningInfo, &RUNNING_INFO_PAYLOAD).unwrap()
    }

    /// Canned running info with a few bytes overwritten, still correctly framed.
    pub fn running_info_frame_with(offset: usize, bytes: &[u8]) -> Vec<u8> {
        let mut payload = RUNNING_INFO_PAYLOAD;
        payload[offset..offset + bytes.len()].copy_from_slice(bytes);
        FrameFactory::response(Command::QueryRunningInfo, &payload).unwrap()
    }

    pub fn timeout() -> Error {
        Error::ConnectionTimeout {
            command: Command::QueryRunningInfo,
            timeout: Duration::from_millis(1000),
        }
    }
}

/// Answers the identity query with the canned frame and running info
/// queries from a script. An exhausted script behaves like a silent device.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<Vec<u8>, Error>>>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, frame: Vec<u8>) -> &Self {
        self.script.lock().unwrap().push_back(Ok(frame));
        self
    }

    pub fn respond_ok(&self) -> &Self {
        self.respond(Factory::running_info_frame())
    }

    pub fn fail(&self, error: Error) -> &Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn time_out(&self, times: usize) -> &Self {
        for _ in 0..times {
            self.fail(Factory::timeout());
        }
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_and_receive(&self, command: Command) -> Result<Vec<u8>, Error> {
        if command == Command::QueryIdInfo {
            return Ok(Factory::id_info_frame());
        }

        *self.calls.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Factory::timeout()))
    }
}
