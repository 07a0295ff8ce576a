use crate::aa55::packet::{InverterStatus, RunningSnapshot};
use crate::prelude::*;

use serde::{Deserialize, Serialize};

// Field {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    WorkMode,
    Pac,
    EToday,
    ETotal,
    L1Voltage,
    L1Frequency,
    Temperature,
    RunningHours,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::WorkMode,
        Field::Pac,
        Field::EToday,
        Field::ETotal,
        Field::L1Voltage,
        Field::L1Frequency,
        Field::Temperature,
        Field::RunningHours,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::WorkMode => "work_mode",
            Field::Pac => "pac",
            Field::EToday => "e_today",
            Field::ETotal => "e_total",
            Field::L1Voltage => "l1_voltage",
            Field::L1Frequency => "l1_frequency",
            Field::Temperature => "temperature",
            Field::RunningHours => "running_hours",
        }
    }

    /// Monotonic counters which must not visibly drop to zero while the
    /// link is down.
    pub fn is_cumulative(&self) -> bool {
        matches!(self, Field::EToday | Field::ETotal)
    }
}

impl std::str::FromStr for Field {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| anyhow!("unknown field {}", s))
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
} // }}}

// Value {{{
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Status(InverterStatus),
    Integer(u16),
    Decimal(f64),
}

impl Value {
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Status(_) => false,
            Value::Integer(v) => *v == 0,
            Value::Decimal(v) => *v == 0.0,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Status(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
        }
    }
} // }}}

// Reading {{{
/// What gets published each poll cycle. Fields are nullable since a
/// synthesized offline reading has no live measurements.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Reading {
    pub work_mode: Option<InverterStatus>,
    pub pac: Option<u16>,
    pub e_today: Option<f64>,
    pub e_total: Option<f64>,
    pub l1_voltage: Option<f64>,
    pub l1_frequency: Option<f64>,
    pub temperature: Option<f64>,
    pub running_hours: Option<u16>,
}

impl From<&RunningSnapshot> for Reading {
    fn from(s: &RunningSnapshot) -> Self {
        Self {
            work_mode: Some(s.work_mode),
            pac: Some(s.pac),
            e_today: Some(s.e_today),
            e_total: Some(s.e_total),
            l1_voltage: Some(s.l1_voltage),
            l1_frequency: Some(s.l1_frequency),
            temperature: Some(s.temperature),
            running_hours: Some(s.running_hours),
        }
    }
}

impl Reading {
    /// Stand-in for a device that stopped answering. Counters carry over
    /// from the last successful fetch so they never regress overnight.
    pub fn offline(last_known: Option<&Reading>) -> Self {
        Self {
            work_mode: Some(InverterStatus::Offline),
            pac: Some(0),
            e_today: last_known.and_then(|r| r.e_today),
            e_total: last_known.and_then(|r| r.e_total),
            l1_voltage: None,
            l1_frequency: None,
            temperature: None,
            running_hours: last_known.and_then(|r| r.running_hours),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.work_mode == Some(InverterStatus::Offline)
    }

    pub fn get(&self, field: Field) -> Option<Value> {
        match field {
            Field::WorkMode => self.work_mode.map(Value::Status),
            Field::Pac => self.pac.map(Value::Integer),
            Field::EToday => self.e_today.map(Value::Decimal),
            Field::ETotal => self.e_total.map(Value::Decimal),
            Field::L1Voltage => self.l1_voltage.map(Value::Decimal),
            Field::L1Frequency => self.l1_frequency.map(Value::Decimal),
            Field::Temperature => self.temperature.map(Value::Decimal),
            Field::RunningHours => self.running_hours.map(Value::Integer),
        }
    }

    pub fn zero(&mut self, field: Field) -> Result<()> {
        match field {
            Field::WorkMode => bail!("{} has no zero value", field),
            Field::Pac => self.pac = Some(0),
            Field::EToday => self.e_today = Some(0.0),
            Field::ETotal => self.e_total = Some(0.0),
            Field::L1Voltage => self.l1_voltage = Some(0.0),
            Field::L1Frequency => self.l1_frequency = Some(0.0),
            Field::Temperature => self.temperature = Some(0.0),
            Field::RunningHours => self.running_hours = Some(0),
        }

        Ok(())
    }
} // }}}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn snapshot() -> RunningSnapshot {
        RunningSnapshot {
            work_mode: InverterStatus::Online,
            pac: 137,
            e_today: 4.2,
            e_total: 3137.6,
            l1_voltage: 238.1,
            l1_frequency: 50.04,
            temperature: 24.1,
            running_hours: 7164,
        }
    }

    #[test]
    fn field_names_match_serde() {
        for field in Field::ALL {
            assert_eq!(
                serde_json::to_value(field).unwrap(),
                serde_json::Value::String(field.name().to_string())
            );
            assert_eq!(Field::from_str(field.name()).unwrap(), field);
        }
        assert!(Field::from_str("e_yesterday").is_err());
    }

    #[test]
    fn offline_keeps_counters() {
        let last = Reading::from(&snapshot());
        let offline = Reading::offline(Some(&last));

        assert!(offline.is_offline());
        assert_eq!(offline.pac, Some(0));
        assert_eq!(offline.l1_voltage, None);
        assert_eq!(offline.l1_frequency, None);
        assert_eq!(offline.temperature, None);
        assert_eq!(offline.e_today, Some(4.2));
        assert_eq!(offline.e_total, Some(3137.6));
        assert_eq!(offline.running_hours, Some(7164));
    }

    #[test]
    fn offline_without_history() {
        let offline = Reading::offline(None);
        assert!(offline.is_offline());
        assert_eq!(offline.e_total, None);
    }

    #[test]
    fn zero_touches_one_field() {
        let mut reading = Reading::from(&snapshot());
        reading.zero(Field::EToday).unwrap();

        let mut expected = Reading::from(&snapshot());
        expected.e_today = Some(0.0);
        assert_eq!(reading, expected);

        assert!(reading.zero(Field::WorkMode).is_err());
    }

    #[test]
    fn serializes_status_by_name() {
        let json = serde_json::to_value(Reading::offline(None)).unwrap();
        assert_eq!(json["work_mode"], "Offline");
        assert_eq!(json["pac"], 0);
        assert!(json["l1_voltage"].is_null());
    }

    #[test]
    fn zero_values() {
        assert!(Value::Integer(0).is_zero());
        assert!(Value::Decimal(0.0).is_zero());
        assert!(!Value::Decimal(0.1).is_zero());
        assert!(!Value::Status(InverterStatus::Waiting).is_zero());
    }
}
