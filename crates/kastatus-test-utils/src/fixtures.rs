//! Canned `getStatus` replies shaped like the real daemons'.

use chrono::{DateTime, TimeZone, Utc};
use kastatus_core::schema::XmitterFault;
use kastatus_core::value::{RpcStruct, RpcValue};

/// Snapshot time used by the canned replies.
pub fn reply_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// A healthy kadrx reply with nothing inhibiting transmit.
pub fn kadrx_reply() -> RpcValue {
    let mut m = RpcStruct::new();
    m.insert("afcEnabled".into(), true.into());
    m.insert("gpsTimeServerGood".into(), true.into());
    m.insert("locked100MHz".into(), true.into());
    m.insert("n2PressureGood".into(), true.into());
    m.insert("osc0Frequency".into(), 1.2e9.into());
    m.insert("osc1Frequency".into(), 1.35e8.into());
    m.insert("osc2Frequency".into(), 3.4e10.into());
    m.insert("osc3Frequency".into(), 1.25e8.into());
    m.insert("derivedTxFrequency".into(), 3.5e10.into());
    m.insert("hTxPower".into(), (-12.5).into());
    m.insert("vTxPower".into(), (-13.0).into());
    m.insert("testPulsePower".into(), (-60.0).into());
    m.insert("procDrxTemp".into(), 41.0.into());
    m.insert("procEnclosureTemp".into(), 30.5.into());
    m.insert("rxBackTemp".into(), 28.0.into());
    m.insert("rxFrontTemp".into(), 27.5.into());
    m.insert("rxTopTemp".into(), 29.0.into());
    m.insert("txEnclosureTemp".into(), 33.0.into());
    m.insert("psVoltage".into(), 12.1.into());
    m.insert("noXmitBitmap".into(), 0.into());
    m.insert("timestamp".into(), reply_timestamp().into());
    RpcValue::Struct(m)
}

/// A ka_xmitd reply for a transmitter in standby with one blower fault on
/// record.
pub fn xmitd_reply() -> RpcValue {
    let mut m = RpcStruct::new();
    m.insert("serial_connected".into(), true.into());
    for flag in [
        "fault_summary",
        "hvps_runup",
        "heater_warmup",
        "cooldown",
        "magnetron_current_fault",
        "blower_fault",
        "hvps_on",
        "safety_interlock",
        "reverse_power_fault",
        "pulse_input_fault",
        "hvps_current_fault",
        "waveguide_pressure_fault",
        "hvps_under_voltage",
        "hvps_over_voltage",
    ] {
        m.insert(flag.into(), false.into());
    }
    m.insert("standby".into(), true.into());
    m.insert("unit_on".into(), true.into());
    m.insert("remote_enabled".into(), true.into());
    m.insert("hvps_voltage".into(), 0.0.into());
    m.insert("magnetron_current".into(), 0.0.into());
    m.insert("hvps_current".into(), 0.0.into());
    m.insert("temperature".into(), 35.2.into());
    m.insert("auto_pulse_fault_resets".into(), 0.into());
    for fault in XmitterFault::ALL {
        m.insert(fault.count_key(), 0.into());
        m.insert(fault.time_key(), 0.into());
    }
    m.insert("blower_fault_count".into(), 1.into());
    m.insert("blower_fault_time".into(), reply_timestamp().timestamp().into());
    RpcValue::Struct(m)
}

/// `reply` with `name` set to `value`. Non-struct replies are returned as-is.
pub fn with_member(reply: RpcValue, name: &str, value: RpcValue) -> RpcValue {
    match reply {
        RpcValue::Struct(mut m) => {
            m.insert(name.to_string(), value);
            RpcValue::Struct(m)
        }
        other => other,
    }
}

/// `reply` without member `name`.
pub fn without_member(reply: RpcValue, name: &str) -> RpcValue {
    match reply {
        RpcValue::Struct(mut m) => {
            m.remove(name);
            RpcValue::Struct(m)
        }
        other => other,
    }
}
