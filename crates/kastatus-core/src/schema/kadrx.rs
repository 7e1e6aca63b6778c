//! Status schema and typed view for `kadrx`, the radar data system daemon.

use std::fmt;

use serde::Serialize;

use super::{FieldSpec, StatusSchema};
use crate::record::{FieldError, StatusRecord};
use crate::value::FieldKind;

/// Reply schema of kadrx's `getStatus` method.
pub const KADRX_SCHEMA: StatusSchema = StatusSchema::new(
    "kadrx",
    &[
        FieldSpec::optional("afcEnabled", FieldKind::Bool),
        FieldSpec::required("gpsTimeServerGood", FieldKind::Bool),
        FieldSpec::required("locked100MHz", FieldKind::Bool),
        FieldSpec::required("n2PressureGood", FieldKind::Bool),
        FieldSpec::required("osc0Frequency", FieldKind::Double),
        FieldSpec::required("osc1Frequency", FieldKind::Double),
        FieldSpec::required("osc2Frequency", FieldKind::Double),
        FieldSpec::required("osc3Frequency", FieldKind::Double),
        FieldSpec::required("derivedTxFrequency", FieldKind::Double),
        FieldSpec::required("hTxPower", FieldKind::Double),
        FieldSpec::required("vTxPower", FieldKind::Double),
        FieldSpec::required("testPulsePower", FieldKind::Double),
        FieldSpec::required("procDrxTemp", FieldKind::Double),
        FieldSpec::required("procEnclosureTemp", FieldKind::Double),
        FieldSpec::required("rxBackTemp", FieldKind::Double),
        FieldSpec::required("rxFrontTemp", FieldKind::Double),
        FieldSpec::required("rxTopTemp", FieldKind::Double),
        FieldSpec::required("txEnclosureTemp", FieldKind::Double),
        FieldSpec::required("psVoltage", FieldKind::Double),
        FieldSpec::required("noXmitBitmap", FieldKind::Int),
        FieldSpec::optional("clockOffsetSecs", FieldKind::Double),
    ],
)
.with_timestamp_field("timestamp");

/// A reason the daemon is currently refusing to transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NoXmitReason {
    XmlRpcRequest,
    N2PressureLow,
    InBlankingSector,
    HupSignalReceived,
}

impl NoXmitReason {
    pub const ALL: [NoXmitReason; 4] = [
        NoXmitReason::XmlRpcRequest,
        NoXmitReason::N2PressureLow,
        NoXmitReason::InBlankingSector,
        NoXmitReason::HupSignalReceived,
    ];

    /// The bit this reason occupies in the daemon's bitmap.
    pub const fn bit(self) -> u16 {
        match self {
            NoXmitReason::XmlRpcRequest => 1 << 0,
            NoXmitReason::N2PressureLow => 1 << 1,
            NoXmitReason::InBlankingSector => 1 << 2,
            NoXmitReason::HupSignalReceived => 1 << 3,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            NoXmitReason::XmlRpcRequest => "On XML-RPC request",
            NoXmitReason::N2PressureLow => "N2 waveguide pressure low",
            NoXmitReason::InBlankingSector => "In blanking sector",
            NoXmitReason::HupSignalReceived => "HUP signal received",
        }
    }
}

impl fmt::Display for NoXmitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Set of [`NoXmitReason`]s as reported in `noXmitBitmap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct NoXmitBitmap(u16);

impl NoXmitBitmap {
    /// Largest valid raw value (all reasons set).
    pub const MAX: u16 = (1 << NoXmitReason::ALL.len()) - 1;

    /// Validate a raw bitmap; `None` if any undefined bit is set.
    pub fn from_raw(raw: i64) -> Option<Self> {
        u16::try_from(raw)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn is_set(self, reason: NoXmitReason) -> bool {
        self.0 & reason.bit() != 0
    }

    /// No reason to withhold transmission.
    pub fn all_clear(self) -> bool {
        self.0 == 0
    }

    pub fn reasons(self) -> Vec<NoXmitReason> {
        NoXmitReason::ALL
            .into_iter()
            .filter(|r| self.is_set(*r))
            .collect()
    }
}

impl fmt::Display for NoXmitBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.all_clear() {
            return f.write_str("none");
        }
        let reasons: Vec<&str> = self.reasons().into_iter().map(|r| r.description()).collect();
        f.write_str(&reasons.join(", "))
    }
}

/// Typed view of a kadrx status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KadrxStatus {
    pub afc_enabled: Option<bool>,
    pub gps_time_server_good: bool,
    pub locked_100mhz: bool,
    pub n2_pressure_good: bool,
    /// Oscillator frequencies, Hz, indexed 0..=3.
    pub osc_frequencies: [f64; 4],
    pub derived_tx_frequency: f64,
    pub h_tx_power: f64,
    pub v_tx_power: f64,
    pub test_pulse_power: f64,
    pub proc_drx_temp: f64,
    pub proc_enclosure_temp: f64,
    pub rx_back_temp: f64,
    pub rx_front_temp: f64,
    pub rx_top_temp: f64,
    pub tx_enclosure_temp: f64,
    pub ps_voltage: f64,
    pub no_xmit: NoXmitBitmap,
    /// Offset of the daemon host clock as measured by its time reference.
    pub clock_offset_secs: Option<f64>,
}

impl KadrxStatus {
    pub fn from_record(record: &StatusRecord) -> Result<Self, FieldError> {
        let raw_bitmap: i64 = record.get("noXmitBitmap")?;
        let no_xmit = NoXmitBitmap::from_raw(raw_bitmap).ok_or_else(|| FieldError::OutOfRange {
            field: "noXmitBitmap".to_string(),
            value: raw_bitmap,
        })?;

        Ok(Self {
            afc_enabled: record.get_opt("afcEnabled")?,
            gps_time_server_good: record.get("gpsTimeServerGood")?,
            locked_100mhz: record.get("locked100MHz")?,
            n2_pressure_good: record.get("n2PressureGood")?,
            osc_frequencies: [
                record.get("osc0Frequency")?,
                record.get("osc1Frequency")?,
                record.get("osc2Frequency")?,
                record.get("osc3Frequency")?,
            ],
            derived_tx_frequency: record.get("derivedTxFrequency")?,
            h_tx_power: record.get("hTxPower")?,
            v_tx_power: record.get("vTxPower")?,
            test_pulse_power: record.get("testPulsePower")?,
            proc_drx_temp: record.get("procDrxTemp")?,
            proc_enclosure_temp: record.get("procEnclosureTemp")?,
            rx_back_temp: record.get("rxBackTemp")?,
            rx_front_temp: record.get("rxFrontTemp")?,
            rx_top_temp: record.get("rxTopTemp")?,
            tx_enclosure_temp: record.get("txEnclosureTemp")?,
            ps_voltage: record.get("psVoltage")?,
            no_xmit,
            clock_offset_secs: record.get_opt("clockOffsetSecs")?,
        })
    }

    pub fn transmit_allowed(&self) -> bool {
        self.no_xmit.all_clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FieldValue, RpcStruct};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample_record(bitmap: i64) -> StatusRecord {
        let mut fields = BTreeMap::new();
        for spec in KADRX_SCHEMA.fields {
            let value = match spec.kind {
                FieldKind::Bool => FieldValue::Bool(true),
                FieldKind::Double => FieldValue::Double(1.0e9),
                FieldKind::Int => FieldValue::Int(bitmap),
                FieldKind::String => FieldValue::String(String::new()),
            };
            if spec.required {
                fields.insert(spec.name.to_string(), value);
            }
        }
        let now = Utc::now();
        StatusRecord::new(now, now, fields, RpcStruct::new())
    }

    #[test]
    fn test_bitmap_reasons() {
        let bitmap = NoXmitBitmap::from_raw(0b0110).unwrap();
        assert_eq!(
            bitmap.reasons(),
            vec![NoXmitReason::N2PressureLow, NoXmitReason::InBlankingSector]
        );
        assert!(!bitmap.all_clear());
        assert_eq!(
            bitmap.to_string(),
            "N2 waveguide pressure low, In blanking sector"
        );
    }

    #[test]
    fn test_bitmap_range() {
        assert_eq!(NoXmitBitmap::MAX, 15);
        assert!(NoXmitBitmap::from_raw(15).is_some());
        assert!(NoXmitBitmap::from_raw(16).is_none());
        assert!(NoXmitBitmap::from_raw(-1).is_none());
        assert_eq!(NoXmitBitmap::from_raw(0).unwrap().to_string(), "none");
    }

    #[test]
    fn test_view_from_record() {
        let status = KadrxStatus::from_record(&sample_record(0)).unwrap();
        assert!(status.transmit_allowed());
        assert_eq!(status.osc_frequencies, [1.0e9; 4]);
        assert_eq!(status.afc_enabled, None);
        assert_eq!(status.clock_offset_secs, None);
    }

    #[test]
    fn test_view_rejects_out_of_range_bitmap() {
        let err = KadrxStatus::from_record(&sample_record(64)).unwrap_err();
        assert_eq!(
            err,
            FieldError::OutOfRange {
                field: "noXmitBitmap".to_string(),
                value: 64,
            }
        );
    }
}
