//! Credential provisioning utility for ESP32.
//!
//! Stores one network in the first free credential slot. Existing slots are
//! left untouched, so running it several times builds up a fallback list.
//!
//! Usage:
//!   WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret12" cargo configure-wifi
//!
//! For open networks (no password):
//!   WIFI_SSID="OpenNetwork" WIFI_PASSWORD="" cargo configure-wifi
//!
//! To overwrite a specific slot instead, set WIFI_SLOT (0-254). To clear a
//! slot and shift the ones above it down, also set WIFI_ERASE=1.

/// WiFi SSID - set via WIFI_SSID environment variable at compile time.
#[cfg(feature = "esp32")]
const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");

/// WiFi password - set via WIFI_PASSWORD environment variable at compile time.
/// Empty string for open networks.
#[cfg(feature = "esp32")]
const WIFI_PASSWORD: Option<&str> = option_env!("WIFI_PASSWORD");

/// Optional target slot.
#[cfg(feature = "esp32")]
const WIFI_SLOT: Option<&str> = option_env!("WIFI_SLOT");

/// Erase `WIFI_SLOT` instead of writing it.
#[cfg(feature = "esp32")]
const WIFI_ERASE: Option<&str> = option_env!("WIFI_ERASE");

/// Print error message and halt. On ESP32, we pause briefly then return
/// so the process terminates cleanly (espflash monitor will show the output).
#[cfg(feature = "esp32")]
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    eprintln!("\n=== Configuration failed ===\n");
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

#[cfg(feature = "esp32")]
fn main() {
    use wifi_slots_esp32::persistence::NvsStore;
    use wifi_slots_esp32::{AuthMode, CredentialSlot, CredentialStore};

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("\n=== WiFi Slot Configuration ===\n");

    let slot_index = match WIFI_SLOT.map(str::parse::<u8>) {
        None => None,
        Some(Ok(index)) => Some(index),
        Some(Err(_)) => halt_with_error("Error: WIFI_SLOT must be a number from 0 to 254"),
    };

    let mut store = match NvsStore::take_default() {
        Ok(nvs) => CredentialStore::new(nvs),
        Err(e) => halt_with_error(&format!("Error opening NVS: {}", e)),
    };

    if WIFI_ERASE.is_some_and(|v| v == "1") {
        let Some(index) = slot_index else {
            halt_with_error("Error: WIFI_ERASE requires WIFI_SLOT");
        };
        if let Err(e) = store.erase(index) {
            halt_with_error(&format!("Error erasing slot {}: {}", index, e));
        }
        println!("Slot {} erased", index);
        finish();
        return;
    }

    let ssid = match WIFI_SSID {
        Some(s) if !s.is_empty() => s,
        _ => halt_with_error(
            "Error: WIFI_SSID environment variable not set at compile time.\n\n\
             Usage:\n  \
             WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret12\" cargo configure-wifi\n\n\
             For open networks:\n  \
             WIFI_SSID=\"OpenNetwork\" WIFI_PASSWORD=\"\" cargo configure-wifi",
        ),
    };
    let password = WIFI_PASSWORD.unwrap_or("");

    println!("SSID: {}", ssid);
    println!(
        "Password: {} ({} chars)",
        if password.is_empty() { "(none)" } else { "****" },
        password.len()
    );

    let slot = if password.is_empty() {
        CredentialSlot::open(ssid)
    } else {
        CredentialSlot::personal(ssid, password, AuthMode::Wpa2Psk)
    };
    let slot = match slot {
        Ok(slot) => slot,
        Err(e) => halt_with_error(&format!("Error: {}", e)),
    };

    let index = match slot_index.or_else(|| store.find_empty_slot()) {
        Some(index) => index,
        None => halt_with_error("Error: all credential slots are in use"),
    };

    match store.set(index, &slot) {
        Ok(()) => {
            println!("\n=== Credentials saved to slot {} ===", index);
            println!("Credentials persist across reboots.");
        }
        Err(e) => halt_with_error(&format!("Error saving slot {}: {}", index, e)),
    }

    finish();
}

#[cfg(feature = "esp32")]
fn finish() {
    println!("\n=== Done - you can disconnect the device ===\n");
    // Brief pause to ensure serial output is visible, then exit cleanly
    std::thread::sleep(std::time::Duration::from_secs(2));
}

#[cfg(not(feature = "esp32"))]
fn main() {
    eprintln!("This binary must be built for ESP32.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret12\" cargo configure-wifi");
    std::process::exit(1);
}
