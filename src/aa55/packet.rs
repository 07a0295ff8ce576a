use crate::error::Error;
use crate::prelude::*;

use nom_derive::{Nom, Parse};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

// sync(2) + destination(1) + source(1) + control(1) + function(1)
pub const HEADER_LEN: usize = 6;
const LENGTH_OFFSET: usize = HEADER_LEN;
const CHECKSUM_LEN: usize = 2;
/// Header, length byte and checksum with an empty payload.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 1 + CHECKSUM_LEN;

const RESPONSE_FLAG: u8 = 0x80;

/// Total frame length for a declared payload length.
pub fn frame_len(payload_len: u8) -> usize {
    HEADER_LEN + 1 + usize::from(payload_len) + CHECKSUM_LEN
}

// Command {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    QueryIdInfo,
    QueryRunningInfo,
}

impl Command {
    /// Pre-built request frame. Both carry an empty payload, so the length
    /// byte is 0 and the trailer is the byte sum of the header.
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Self::QueryIdInfo => &[0xaa, 0x55, 0xc0, 0x7f, 0x01, 0x02, 0x00, 0x02, 0x41],
            Self::QueryRunningInfo => &[0xaa, 0x55, 0xc0, 0x7f, 0x01, 0x01, 0x00, 0x02, 0x40],
        }
    }

    pub fn expected_header(&self) -> [u8; HEADER_LEN] {
        expected_header(self.bytes())
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueryIdInfo => write!(f, "query id info"),
            Self::QueryRunningInfo => write!(f, "query running info"),
        }
    }
} // }}}

/// Header the inverter answers a request with: addresses swapped and the
/// function code flagged as a response.
///
/// # Panics
///
/// If `command` is shorter than a frame header.
pub fn expected_header(command: &[u8]) -> [u8; HEADER_LEN] {
    [
        command[0],
        command[1],
        command[3],
        command[2],
        command[4],
        command[5] | RESPONSE_FLAG,
    ]
}

/// Plain byte sum, not a CRC. Deliberately not reduced modulo 2^16.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().map(|b| u32::from(*b)).sum()
}

/// Checks a complete response frame against the command that was sent and
/// returns the payload. Any mismatch rejects the whole frame.
pub fn validate_and_unwrap(response: &[u8], command: Command) -> Result<&[u8], Error> {
    if response.len() < MIN_FRAME_LEN {
        return Err(Error::IncompleteResponse {
            command,
            expected: MIN_FRAME_LEN,
            received: response.to_vec(),
        });
    }

    let expected = command.expected_header();
    if response[..HEADER_LEN] != expected {
        return Err(Error::HeaderMismatch {
            expected,
            received: response[..HEADER_LEN].to_vec(),
        });
    }

    let expected_len = frame_len(response[LENGTH_OFFSET]);
    if response.len() != expected_len {
        return Err(Error::IncompleteResponse {
            command,
            expected: expected_len,
            received: response.to_vec(),
        });
    }

    let (body, trailer) = response.split_at(response.len() - CHECKSUM_LEN);
    let calculated = checksum(body);
    let received = u16::from_be_bytes([trailer[0], trailer[1]]);
    if calculated != u32::from(received) {
        return Err(Error::ChecksumMismatch {
            calculated,
            received,
        });
    }

    Ok(&body[HEADER_LEN + 1..])
}

/// Builds the response frame an inverter would send for `command`. Used by
/// the canned transport so mock traffic goes through the same validation.
pub struct FrameFactory;
impl FrameFactory {
    /// Fails when the byte sum no longer fits the 16-bit trailer, since no
    /// inverter could send such a frame and validation would reject it.
    pub fn response(command: Command, payload: &[u8]) -> Result<Vec<u8>, Error> {
        // the length byte caps payloads at 255
        let payload = &payload[..payload.len().min(usize::from(u8::MAX))];

        let mut r = Vec::with_capacity(frame_len(payload.len() as u8));
        r.extend_from_slice(&command.expected_header());
        r.push(payload.len() as u8);
        r.extend_from_slice(payload);

        let sum = checksum(&r);
        let sum = u16::try_from(sum).map_err(|_| {
            Error::ProtocolDecode(format!(
                "{} byte payload sums to {:#x}, beyond the 16-bit checksum",
                payload.len(),
                sum
            ))
        })?;
        r.extend_from_slice(&sum.to_be_bytes());

        Ok(r)
    }
}

// InverterStatus {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(i16)]
pub enum InverterStatus {
    Offline = -1,
    Waiting = 0,
    Online = 1,
    Error = 2,
}

impl std::fmt::Display for InverterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
} // }}}

// DeviceIdentity {{{
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub model: String,
    pub serial_number: String,
}

impl DeviceIdentity {
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let model = Utils::ascii_field(payload, 5, 15).ok_or_else(|| {
            Error::ProtocolDecode(format!(
                "no ASCII model at [5,15) in id info payload {}",
                Utils::hex(payload)
            ))
        })?;
        let serial_number = Utils::ascii_field(payload, 31, 47).ok_or_else(|| {
            Error::ProtocolDecode(format!(
                "no ASCII serial number at [31,47) in id info payload {}",
                Utils::hex(payload)
            ))
        })?;

        Ok(Self {
            model,
            serial_number,
        })
    }
} // }}}

// {{{ RunningInfo
/// Raw running info payload, big endian, fields at fixed offsets.
#[derive(Clone, Debug, PartialEq, Nom)]
#[nom(BigEndian)]
pub struct RunningInfo {
    #[nom(SkipBefore(8))] // pv voltages/currents
    #[nom(Parse = "Utils::be_u16_div10")]
    pub l1_voltage: f64, // 8..10
    #[nom(SkipBefore(2))] // l1 current
    #[nom(Parse = "Utils::be_u16_div100")]
    pub l1_frequency: f64, // 12..14
    pub pac: u16,       // 14..16
    pub work_mode: i16, // 16..18
    #[nom(Parse = "Utils::be_u16_div10")]
    pub temperature: f64, // 18..20
    #[nom(SkipBefore(4))] // error message
    #[nom(Parse = "Utils::be_u32_div10")]
    pub e_total: f64, // 24..28
    #[nom(SkipBefore(2))] // running hours high word, always zero in practice
    pub running_hours: u16, // 30..32
    #[nom(SkipBefore(12))]
    #[nom(Parse = "Utils::be_u16_div10")]
    pub e_today: f64, // 44..46
} // }}}

// RunningSnapshot {{{
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunningSnapshot {
    pub work_mode: InverterStatus,
    pub pac: u16,
    pub e_today: f64,
    pub e_total: f64,
    pub l1_voltage: f64,
    pub l1_frequency: f64,
    pub temperature: f64,
    pub running_hours: u16,
}

impl RunningSnapshot {
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let info = match RunningInfo::parse(payload) {
            Ok((_, info)) => info,
            Err(e) => {
                return Err(Error::ProtocolDecode(format!(
                    "running info payload of {} bytes: {:?}",
                    payload.len(),
                    e
                )))
            }
        };

        Ok(Self {
            work_mode: InverterStatus::try_from_primitive(info.work_mode)
                .map_err(|e| Error::ProtocolDecode(format!("unknown work mode: {}", e)))?,
            pac: info.pac,
            e_today: info.e_today,
            e_total: info.e_total,
            l1_voltage: info.l1_voltage,
            l1_frequency: info.l1_frequency,
            temperature: info.temperature,
            running_hours: info.running_hours,
        })
    }
} // }}}
