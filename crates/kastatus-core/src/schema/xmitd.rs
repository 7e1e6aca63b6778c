//! Status schema and typed view for `ka_xmitd`, the transmitter control
//! daemon.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{FieldSpec, StatusSchema};
use crate::record::{FieldError, StatusRecord};
use crate::value::FieldKind;

/// Reply schema of ka_xmitd's `getStatus` method. Every member is
/// mandatory.
pub const XMITD_SCHEMA: StatusSchema = StatusSchema::new(
    "ka_xmitd",
    &[
        FieldSpec::required("serial_connected", FieldKind::Bool),
        FieldSpec::required("fault_summary", FieldKind::Bool),
        FieldSpec::required("hvps_runup", FieldKind::Bool),
        FieldSpec::required("standby", FieldKind::Bool),
        FieldSpec::required("heater_warmup", FieldKind::Bool),
        FieldSpec::required("cooldown", FieldKind::Bool),
        FieldSpec::required("unit_on", FieldKind::Bool),
        FieldSpec::required("magnetron_current_fault", FieldKind::Bool),
        FieldSpec::required("blower_fault", FieldKind::Bool),
        FieldSpec::required("hvps_on", FieldKind::Bool),
        FieldSpec::required("remote_enabled", FieldKind::Bool),
        FieldSpec::required("safety_interlock", FieldKind::Bool),
        FieldSpec::required("reverse_power_fault", FieldKind::Bool),
        FieldSpec::required("pulse_input_fault", FieldKind::Bool),
        FieldSpec::required("hvps_current_fault", FieldKind::Bool),
        FieldSpec::required("waveguide_pressure_fault", FieldKind::Bool),
        FieldSpec::required("hvps_under_voltage", FieldKind::Bool),
        FieldSpec::required("hvps_over_voltage", FieldKind::Bool),
        FieldSpec::required("hvps_voltage", FieldKind::Double),
        FieldSpec::required("magnetron_current", FieldKind::Double),
        FieldSpec::required("hvps_current", FieldKind::Double),
        FieldSpec::required("temperature", FieldKind::Double),
        FieldSpec::required("auto_pulse_fault_resets", FieldKind::Int),
        FieldSpec::required("magnetron_current_fault_count", FieldKind::Int),
        FieldSpec::required("blower_fault_count", FieldKind::Int),
        FieldSpec::required("safety_interlock_count", FieldKind::Int),
        FieldSpec::required("reverse_power_fault_count", FieldKind::Int),
        FieldSpec::required("pulse_input_fault_count", FieldKind::Int),
        FieldSpec::required("hvps_current_fault_count", FieldKind::Int),
        FieldSpec::required("waveguide_pressure_fault_count", FieldKind::Int),
        FieldSpec::required("hvps_under_voltage_count", FieldKind::Int),
        FieldSpec::required("hvps_over_voltage_count", FieldKind::Int),
        FieldSpec::required("magnetron_current_fault_time", FieldKind::Int),
        FieldSpec::required("blower_fault_time", FieldKind::Int),
        FieldSpec::required("safety_interlock_time", FieldKind::Int),
        FieldSpec::required("reverse_power_fault_time", FieldKind::Int),
        FieldSpec::required("pulse_input_fault_time", FieldKind::Int),
        FieldSpec::required("hvps_current_fault_time", FieldKind::Int),
        FieldSpec::required("waveguide_pressure_fault_time", FieldKind::Int),
        FieldSpec::required("hvps_under_voltage_time", FieldKind::Int),
        FieldSpec::required("hvps_over_voltage_time", FieldKind::Int),
    ],
);

/// Transmitter fault conditions the daemon tracks individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum XmitterFault {
    MagnetronCurrent,
    Blower,
    SafetyInterlock,
    ReversePower,
    PulseInput,
    HvpsCurrent,
    WaveguidePressure,
    HvpsUnderVoltage,
    HvpsOverVoltage,
}

impl XmitterFault {
    pub const ALL: [XmitterFault; 9] = [
        XmitterFault::MagnetronCurrent,
        XmitterFault::Blower,
        XmitterFault::SafetyInterlock,
        XmitterFault::ReversePower,
        XmitterFault::PulseInput,
        XmitterFault::HvpsCurrent,
        XmitterFault::WaveguidePressure,
        XmitterFault::HvpsUnderVoltage,
        XmitterFault::HvpsOverVoltage,
    ];

    /// Reply member holding the fault's current state.
    pub const fn status_key(self) -> &'static str {
        match self {
            XmitterFault::MagnetronCurrent => "magnetron_current_fault",
            XmitterFault::Blower => "blower_fault",
            XmitterFault::SafetyInterlock => "safety_interlock",
            XmitterFault::ReversePower => "reverse_power_fault",
            XmitterFault::PulseInput => "pulse_input_fault",
            XmitterFault::HvpsCurrent => "hvps_current_fault",
            XmitterFault::WaveguidePressure => "waveguide_pressure_fault",
            XmitterFault::HvpsUnderVoltage => "hvps_under_voltage",
            XmitterFault::HvpsOverVoltage => "hvps_over_voltage",
        }
    }

    /// Reply member counting occurrences since daemon start.
    pub fn count_key(self) -> String {
        format!("{}_count", self.status_key())
    }

    /// Reply member with the Unix time of the latest occurrence.
    pub fn time_key(self) -> String {
        format!("{}_time", self.status_key())
    }
}

/// Occurrence history of one fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaultHistory {
    pub fault: XmitterFault,
    pub active: bool,
    pub count: i64,
    /// Latest occurrence; `None` if never seen.
    pub last_seen: Option<DateTime<Utc>>,
}

/// Typed view of a ka_xmitd status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XmitdStatus {
    pub serial_connected: bool,
    pub fault_summary: bool,
    pub hvps_runup: bool,
    pub standby: bool,
    pub heater_warmup: bool,
    pub cooldown: bool,
    pub unit_on: bool,
    pub hvps_on: bool,
    pub remote_enabled: bool,
    pub hvps_voltage: f64,
    pub magnetron_current: f64,
    pub hvps_current: f64,
    pub temperature: f64,
    pub auto_pulse_fault_resets: i64,
    pub faults: Vec<FaultHistory>,
}

impl XmitdStatus {
    pub fn from_record(record: &StatusRecord) -> Result<Self, FieldError> {
        let faults = XmitterFault::ALL
            .into_iter()
            .map(|fault| {
                let time: i64 = record.get(&fault.time_key())?;
                Ok(FaultHistory {
                    fault,
                    active: record.get(fault.status_key())?,
                    count: record.get(&fault.count_key())?,
                    last_seen: Some(time)
                        .filter(|t| *t > 0)
                        .and_then(|t| DateTime::from_timestamp(t, 0)),
                })
            })
            .collect::<Result<Vec<_>, FieldError>>()?;

        Ok(Self {
            serial_connected: record.get("serial_connected")?,
            fault_summary: record.get("fault_summary")?,
            hvps_runup: record.get("hvps_runup")?,
            standby: record.get("standby")?,
            heater_warmup: record.get("heater_warmup")?,
            cooldown: record.get("cooldown")?,
            unit_on: record.get("unit_on")?,
            hvps_on: record.get("hvps_on")?,
            remote_enabled: record.get("remote_enabled")?,
            hvps_voltage: record.get("hvps_voltage")?,
            magnetron_current: record.get("magnetron_current")?,
            hvps_current: record.get("hvps_current")?,
            temperature: record.get("temperature")?,
            auto_pulse_fault_resets: record.get("auto_pulse_fault_resets")?,
            faults,
        })
    }

    /// Faults currently asserted.
    pub fn active_faults(&self) -> Vec<XmitterFault> {
        self.faults
            .iter()
            .filter(|h| h.active)
            .map(|h| h.fault)
            .collect()
    }

    pub fn history(&self, fault: XmitterFault) -> Option<&FaultHistory> {
        self.faults.iter().find(|h| h.fault == fault)
    }
}
