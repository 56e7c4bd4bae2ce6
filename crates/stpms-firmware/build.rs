//! Forwards build-time beacon settings from the environment or `.env`.

const FORWARDED: [&str; 3] = [
    "STPMS_DEVICE_NAME",
    "STPMS_MEASURE_PERIOD",
    "STPMS_APP_VERSION",
];

fn main() {
    // A missing .env is fine, the defaults apply
    if let Ok(path) = dotenvy::dotenv() {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    for key in FORWARDED {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }
}
