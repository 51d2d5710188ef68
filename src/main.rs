//! WiFi slot firmware binary.
//!
//! On ESP32 this joins the first stored network that accepts us and keeps
//! the connection up. On the host it runs the same flow against the
//! simulated driver:
//!
//! ```text
//! RUST_LOG=debug cargo run --bin wifi-slots
//! ```

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    // Initialize ESP-IDF logger for log crate integration
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("=== WiFi slots starting ===");

    if let Err(e) = run() {
        log::error!("WiFi startup failed: {}", e);
        loop {
            std::thread::sleep(std::time::Duration::from_secs(10));
        }
    }
}

#[cfg(feature = "esp32")]
fn run() -> Result<std::convert::Infallible, Box<dyn std::error::Error>> {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use log::info;
    use wifi_slots_esp32::persistence::NvsStore;
    use wifi_slots_esp32::wifi::EspDriver;
    use wifi_slots_esp32::{ConnectionConfig, ConnectionManager, RetryPolicy};

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let driver = EspDriver::new(peripherals.modem, sysloop)?;
    let store = NvsStore::take_default()?;

    let manager = ConnectionManager::new(driver, store, ConnectionConfig::default())?;
    manager.init_stack()?;

    let index = manager.try_all_slots()?;
    if let Some(address) = manager.get_address_info() {
        info!("Joined slot {} ({})", index, address);
    }

    // Hold the current network with unlimited reconnects.
    manager.set_max_retries(RetryPolicy::Infinite);

    println!("Entering main loop...");
    loop {
        std::thread::sleep(std::time::Duration::from_secs(10));
        match manager.get_address_info() {
            Some(address) if manager.is_connected() => info!("Heartbeat: {}", address),
            _ => info!("Heartbeat: {:?}", manager.phase()),
        }
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== WiFi slots (simulated driver) ===");
    if let Err(e) = host::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "esp32"))]
mod host {
    use log::info;
    use std::time::Duration;
    use wifi_slots_esp32::{
        AuthMode, ConnectionConfig, ConnectionManager, CredentialSlot, MemoryStore, Phase2Method,
        RetryPolicy, SimulatedDriver, WifiError,
    };

    pub fn run() -> Result<(), WifiError> {
        let driver = SimulatedDriver::new();
        driver.add_network("office", "correct horse", [10, 0, 0, 42]);
        driver.add_network("campus", "eap-secret", [172, 16, 5, 9]);

        let manager = ConnectionManager::new(driver, MemoryStore::new(), ConnectionConfig::default())?;
        manager.init_stack()?;

        // Slot 0 has a stale password, slot 1 is out of range, slot 2 works.
        manager.set_slot(0, &CredentialSlot::personal("office", "old password", AuthMode::Wpa2Psk)?)?;
        manager.set_slot(1, &CredentialSlot::personal("cafe", "espresso99", AuthMode::WpaWpa2Psk)?)?;
        manager.set_slot(
            2,
            &CredentialSlot::enterprise(
                "campus",
                "anonymous@campus.example",
                "student",
                "eap-secret",
                AuthMode::Enterprise,
                Phase2Method::MsChapV2,
            )?,
        )?;

        let index = manager.try_all_slots()?;
        match manager.get_address_info() {
            Some(address) => println!("Connected via slot {}: {}", index, address),
            None => println!("Connected via slot {}", index),
        }

        // Fix the stale slot by erasing it; remaining slots shift down.
        manager.erase_slot(0)?;
        let first = manager.get_slot(0)?;
        info!("Slot 0 now holds '{}'", first.ssid.to_string_lossy());

        manager.disconnect();
        println!("Disconnected, phase {:?}", manager.phase());

        manager.connect(1, RetryPolicy::Limited(2))?;
        if manager.await_connected(Duration::from_secs(2)) {
            println!("Reconnected to slot 1");
        }
        manager.disconnect();
        Ok(())
    }
}
