use dotenvy::dotenv_iter;
use embuild::espidf;

fn main() {
    load_dotenv_variables();

    // Host builds (library tests) have no ESP-IDF environment to forward.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        espidf::sysenv::output();
    }
}

/// Bakes `.env` entries into the firmware image.
///
/// Microcontrollers have no file system to read `.env` files at runtime, so the
/// key-value pairs are emitted as `cargo:rustc-env=KEY=VALUE` and picked up by
/// `option_env!` in `config.rs`. Keys that are absent simply compile to an empty
/// string, which keeps host builds working without secrets.
///
/// Recognised keys: `WIFI_SSID`, `WIFI_PASS`, `SUPABASE_URL`, `SUPABASE_KEY`,
/// `SUPABASE_TABLE`, `DHT_LOCATION`, `DS18B20_LOCATION`, `SCD41_LOCATION`,
/// `SLEEP_DURATION_SECONDS`, `TIMEZONE`.
///
/// # Security Note
/// This method hard-codes secrets into the firmware image. For commercial products,
/// consider using ESP-IDF's **NVS (Non-Volatile Storage)** or **Wi-Fi Provisioning**
/// to allow users to set credentials without re-flashing.
fn load_dotenv_variables() {
    // To ensure the build script re-runs if the secrets change
    println!("cargo:rerun-if-changed=.env");

    if let Ok(iter) = dotenv_iter() {
        for item in iter {
            let (key, value) = item.expect("Failed to read .env element");
            println!("cargo:rustc-env={}={}", key, value);
        }
    }
}
