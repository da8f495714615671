//! Built-in product profiles

use crate::framing::{FramingConfig, UartMode};
use crate::parameter::{Parameter, Value};
use crate::product::{names, BulkCommand, CalKeys, ProductProfile};
use crate::table::{CommandTable, LineFormat};
use std::time::Duration;

/// Names accepted by [`preset`]
pub const PRESETS: &[&str] = &["acdc-supply", "charger", "battery-monitor"];

/// Look up a built-in profile by name
pub fn preset(name: &str) -> Option<ProductProfile> {
    match name {
        "acdc-supply" => Some(acdc_supply()),
        "charger" => Some(charger()),
        "battery-monitor" => Some(battery_monitor()),
        _ => None,
    }
}

/// AC/DC supply with a software UART and PFC calibration
pub fn acdc_supply() -> ProductProfile {
    let framing = FramingConfig {
        prompt: "\r> ".into(),
        ignore: vec!["mV".into(), "mA".into(), "Hz".into()],
        banner_lines: 2,
        nv_delay: Duration::from_millis(500),
        open_delay: Duration::from_millis(100),
        mode: UartMode::BadUart,
        sim_prompt: false,
    };

    let table = CommandTable::new()
        .with("SW_VERSION", Parameter::string("SW-VERSION").read_only())
        .with(names::UNLOCK, Parameter::string("UNLOCK").write_only())
        .with(names::HW_VERSION, Parameter::string("HW-VERSION"))
        .with(names::SERIAL_ID, Parameter::string("SERIAL"))
        .with(names::STATUS, Parameter::hex_prefixed("STATUS", 0xFFFF_FFFF))
        .with("BUS_VOLTS", Parameter::float("PFC-VOLTS", 10.0).read_only())
        .with("OUTPUT_VOLTS", Parameter::float("VOUT", 1000.0).read_only())
        .with("LINE_FREQ", Parameter::integer("LINE-FREQ").read_only())
        .with("FAN", Parameter::boolean("FAN"))
        .with("FAN_OVERRIDE", Parameter::override_("FAN-OVR"))
        .with("FAN_TRIP", Parameter::float("FAN-TRIP", 10.0).range(40.0, 90.0))
        .with(
            names::CAL_PFC,
            Parameter::calibration("CAL_PFC", None)
                .range(300.0, 450.0)
                .write_format("{verb} {value}")
                .write_expect(1),
        );

    ProductProfile {
        unlock_token: Some(Value::from("0xC0DE")),
        nv_defaults: Some("NV-DEFAULTS".into()),
        reset: Some("RESET".into()),
        test_mode_bit: Some(31),
        can_test_mode_bit: Some(29),
        ..ProductProfile::new("acdc-supply", framing, table)
    }
}

/// Battery charger with Forth-style verbs and `STAT`/`CAL?` dumps
pub fn charger() -> ProductProfile {
    let framing = FramingConfig {
        prompt: "\r\n> ".into(),
        ignore: vec!["mV".into(), "mA".into()],
        banner_lines: 3,
        nv_delay: Duration::from_millis(250),
        open_delay: Duration::from_millis(100),
        mode: UartMode::Normal,
        sim_prompt: false,
    };

    let forth = |p: Parameter| p.read_format("\"{verb} XN?").write_format("{value} \"{verb} XN!");
    let table = CommandTable::new()
        .with("SW_VERSION", Parameter::string("SW-VERSION").read_only())
        .with(names::UNLOCK, Parameter::string("UNLOCK").write_only())
        .with(names::HW_VERSION, Parameter::string("HW-VERSION"))
        .with(names::SERIAL_ID, Parameter::string("SERIAL"))
        .with(names::STATUS, Parameter::hex("STATUS", 0xFFFF_FFFF))
        .with(
            "BATTERY_VOLTS",
            forth(Parameter::float("X-BATTERY-VOLTS", 1000.0)).read_only(),
        )
        .with(
            names::SET_VOLTS,
            forth(Parameter::float("SET-VOLTS", 1000.0)).range(10.0, 16.0),
        )
        .with(
            names::SET_CURRENT,
            forth(Parameter::float("SET-CURRENT", 1000.0)).range(0.0, 40.0),
        )
        .with(names::SET_VOLTS_MV_NUM, forth(Parameter::integer("SET-VOLTS-MV-NUM")))
        .with(names::I_READ_NUM, forth(Parameter::integer("I-READ-NUM")))
        .with(names::OCP_NUM, forth(Parameter::integer("OCP-NUM")))
        .with("CAN_RX", Parameter::can("CAN-RX").expect(0));

    ProductProfile {
        unlock_token: Some(Value::from("1234")),
        nv_defaults: Some("NV-DEFAULTS".into()),
        reset: Some("COLD".into()),
        test_mode_bit: Some(31),
        can_test_mode_bit: Some(29),
        stat: Some(BulkCommand {
            command: "STAT".into(),
            format: LineFormat::KeyEquals,
            min_lines: 4,
        }),
        cal_query: Some(BulkCommand {
            command: "CAL?".into(),
            format: LineFormat::KeySpace,
            min_lines: 3,
        }),
        cal_keys: Some(CalKeys {
            pwm_num: "SET_VOLTS_MV_NUM".into(),
            mv_den: "SET_VOLTS_MV_DEN".into(),
            v_set: "VSET".into(),
            i_num: "I_READ_NUM".into(),
            i_read: "IOUT".into(),
            i_scale: 1000.0,
            i_set: "ISET".into(),
        }),
        ..ProductProfile::new("charger", framing, table)
    }
}

/// Battery monitor running a Zephyr shell
pub fn battery_monitor() -> ProductProfile {
    let framing = FramingConfig {
        prompt: "uart:~$ \x1b[m".into(),
        ignore: Vec::new(),
        banner_lines: 0,
        nv_delay: Duration::from_millis(100),
        open_delay: Duration::from_millis(200),
        mode: UartMode::Normal,
        sim_prompt: false,
    };

    let shell = |verb: &str| format!("bms {}", verb);
    let table = CommandTable::new()
        .with(
            "SW_VERSION",
            Parameter::string("version").read_format("{verb}").read_only(),
        )
        .with(
            names::SERIAL_ID,
            Parameter::string("serial")
                .read_format(&shell("{verb}"))
                .write_format(&shell("{verb} {value}")),
        )
        .with(
            names::HW_VERSION,
            Parameter::string("hwver")
                .read_format(&shell("{verb}"))
                .write_format(&shell("{verb} {value}")),
        )
        .with(
            "SOC",
            Parameter::integer("soc").read_format(&shell("{verb}")).read_only(),
        )
        .with(
            "PACK_VOLTS",
            Parameter::float("voltage", 1000.0)
                .read_format(&shell("{verb}"))
                .read_only(),
        )
        .with(
            "PACK_CURRENT",
            Parameter::float("current", 1000.0)
                .read_format(&shell("{verb}"))
                .read_only(),
        )
        .with(
            "BLE_MAC",
            Parameter::string("mac").read_format("ble {verb}").read_only(),
        );

    ProductProfile {
        nv_write: "settings save".into(),
        reset: Some("kernel reboot cold".into()),
        ..ProductProfile::new("battery-monitor", framing, table)
    }
}
