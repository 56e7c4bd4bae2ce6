//! Build-time configuration, overridable from the environment or `.env`.

use log::warn;
use stpms_core::Config;
use stpms_core::build_info::{AppIdentity, BuildInfo};

pub const BUILD: BuildInfo<'static> = BuildInfo {
    app: AppIdentity::Tagged {
        tag: "stpms",
        variant: "tpms1",
    },
    version: match option_env!("STPMS_APP_VERSION") {
        Some(version) => version,
        None => concat!("v", env!("CARGO_PKG_VERSION")),
    },
    hardware_revision: "TPMS1",
    flags: if cfg!(debug_assertions) { "debug" } else { "release" },
};

pub fn config() -> Config<'static> {
    let mut config = Config::DEFAULT;
    if let Some(name) = option_env!("STPMS_DEVICE_NAME") {
        config.device_name = name;
    }
    if let Some(raw) = option_env!("STPMS_MEASURE_PERIOD") {
        match raw.parse() {
            Ok(period) => config.measure_period_secs = period,
            Err(_) => warn!("Ignoring STPMS_MEASURE_PERIOD={:?}", raw),
        }
    }
    config.debug_build = cfg!(debug_assertions);
    config
}
