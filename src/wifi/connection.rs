//! WiFi connection management.
//!
//! [`ConnectionManager`] joins networks stored in credential slots. Callers
//! use a synchronous API (`connect`, `await_connected`, `disconnect`) while
//! the driver reports progress asynchronously through an [`EventSink`]. The
//! event handler only updates the shared [`ConnectionState`] and wakes
//! waiters; the one driver call it makes (`connect` on start or retry) does
//! not block.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use wifi_slots_esp32::persistence::MemoryStore;
//! use wifi_slots_esp32::wifi::{AuthMode, ConnectionManager, CredentialSlot, SimulatedDriver};
//! use wifi_slots_esp32::{ConnectionConfig, RetryPolicy};
//!
//! let driver = SimulatedDriver::new();
//! driver.add_network("home", "password123", [192, 168, 1, 50]);
//!
//! let manager = ConnectionManager::new(driver, MemoryStore::new(), ConnectionConfig::default()).unwrap();
//! manager.init_stack().unwrap();
//! let slot = CredentialSlot::personal("home", "password123", AuthMode::Wpa2Psk).unwrap();
//! manager.set_slot(0, &slot).unwrap();
//!
//! manager.connect(0, RetryPolicy::Limited(3)).unwrap();
//! assert!(manager.await_connected(Duration::from_secs(5)));
//! ```

use super::config::CredentialSlot;
use super::driver::{DriverEvent, IpInfo, NetworkDriver, StationConfig};
use super::storage::CredentialStore;
use crate::config::{ConnectionConfig, RetryPolicy};
use crate::error::{Result, WifiError};
use crate::persistence::KeyValueStore;
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

/// Where the connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// Driver configured and starting.
    Starting,
    /// First association attempt in flight.
    Connecting,
    /// Reconnecting after a disconnect.
    Retrying,
    /// Address acquired.
    Connected,
    /// Retries exhausted.
    Failed,
    /// Stopped by [`ConnectionManager::disconnect`].
    Disconnected,
}

/// Shared connection state, mutated by the event handler and by
/// `connect`/`disconnect`.
///
/// `connected` and `failed` are never both set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub started: bool,
    pub connected: bool,
    pub failed: bool,
    /// Reconnect attempts since the last connect call or address acquisition.
    pub retry_count: u32,
    pub max_retries: RetryPolicy,
    pub address: Option<IpInfo>,
    /// Times the failed signal was raised since the manager was created.
    pub failed_signals: u32,
    /// Suppresses the automatic connect on `Started` during a passive scan.
    pub scanning: bool,
    /// `Started` received since the last `connect`. Disconnect and address
    /// events arriving before it belong to the torn-down session.
    pub session_started: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Idle,
            started: false,
            connected: false,
            failed: false,
            retry_count: 0,
            max_retries: RetryPolicy::Limited(0),
            address: None,
            failed_signals: 0,
            scanning: false,
            session_started: false,
        }
    }
}

impl ConnectionState {
    fn raise_failed(&mut self) -> bool {
        self.connected = false;
        if self.failed {
            return false;
        }
        self.failed = true;
        self.failed_signals += 1;
        true
    }
}

/// Receives driver events on behalf of a [`ConnectionManager`].
trait EventHandler: Send + Sync {
    fn handle_event(&self, event: DriverEvent);
}

/// Handle a driver uses to deliver [`DriverEvent`]s.
///
/// Holds only a weak reference, so a driver keeping a sink does not keep the
/// manager alive.
#[derive(Clone)]
pub struct EventSink {
    handler: Weak<dyn EventHandler>,
}

impl EventSink {
    /// Deliver `event`. Returns `false` if the manager is gone.
    pub fn dispatch(&self, event: DriverEvent) -> bool {
        match self.handler.upgrade() {
            Some(handler) => {
                handler.handle_event(event);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("alive", &(self.handler.strong_count() > 0))
            .finish()
    }
}

struct Shared<D> {
    driver: D,
    state: Mutex<ConnectionState>,
    signal: Condvar,
}

impl<D> Shared<D> {
    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: NetworkDriver> EventHandler for Shared<D> {
    fn handle_event(&self, event: DriverEvent) {
        let reconnect = {
            let mut state = self.lock();
            match event {
                DriverEvent::Started => {
                    state.started = true;
                    state.session_started = true;
                    if state.phase == ConnectionPhase::Starting {
                        state.phase = ConnectionPhase::Connecting;
                    }
                    info!("WiFi station start");
                    // Connect only if we're not scanning.
                    !state.scanning
                }
                DriverEvent::Stopped => {
                    state.started = false;
                    info!("WiFi station stop");
                    false
                }
                DriverEvent::Disconnected | DriverEvent::AddressAcquired(_)
                    if !state.session_started =>
                {
                    debug!("Ignoring {:?} from a previous session", event);
                    false
                }
                DriverEvent::Disconnected => {
                    if state.max_retries.allows(state.retry_count) {
                        state.connected = false;
                        state.retry_count += 1;
                        state.phase = ConnectionPhase::Retrying;
                        info!(
                            "Retrying connection ({}/{})",
                            state.retry_count, state.max_retries
                        );
                        true
                    } else {
                        if state.raise_failed() {
                            info!("Connection failed after {} retries", state.retry_count);
                            if state.phase != ConnectionPhase::Disconnected {
                                state.phase = ConnectionPhase::Failed;
                            }
                            self.signal.notify_all();
                        } else {
                            debug!("Disconnected with failure already signalled");
                        }
                        false
                    }
                }
                DriverEvent::AddressAcquired(info) => {
                    info!("IP          : {}", info.ip);
                    info!("Netmask     : {}", info.netmask);
                    info!("Gateway     : {}", info.gateway);
                    state.address = Some(info);
                    state.retry_count = 0;
                    state.failed = false;
                    state.connected = true;
                    state.phase = ConnectionPhase::Connected;
                    self.signal.notify_all();
                    false
                }
            }
        };

        if reconnect {
            if let Err(e) = self.driver.connect() {
                warn!("Driver connect request failed: {}", e);
            }
        }
    }
}

/// Connects to networks stored in credential slots.
pub struct ConnectionManager<D: NetworkDriver + 'static, S> {
    shared: Arc<Shared<D>>,
    store: Mutex<CredentialStore<S>>,
    config: ConnectionConfig,
}

impl<D: NetworkDriver + 'static, S: KeyValueStore> ConnectionManager<D, S> {
    /// Create a manager and register its event handler with `driver`.
    pub fn new(driver: D, kv: S, config: ConnectionConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            driver,
            state: Mutex::new(ConnectionState::default()),
            signal: Condvar::new(),
        });

        let manager = Self {
            shared,
            store: Mutex::new(CredentialStore::new(kv)),
            config,
        };
        manager
            .shared
            .driver
            .subscribe(manager.event_sink())
            .map_err(|e| WifiError::driver("register event handler", e))?;
        Ok(manager)
    }

    /// A sink that feeds events into this manager.
    pub fn event_sink(&self) -> EventSink {
        let weak: Weak<Shared<D>> = Arc::downgrade(&self.shared);
        let handler: Weak<dyn EventHandler> = weak;
        EventSink { handler }
    }

    /// The driver this manager controls.
    pub fn driver(&self) -> &D {
        &self.shared.driver
    }

    /// Runtime settings.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Initialize the driver's network stack. Leaves the radio stopped.
    pub fn init_stack(&self) -> Result<()> {
        self.shared
            .driver
            .init_stack()
            .map_err(|e| WifiError::driver("init stack", e))
    }

    /// Start connecting to the network stored in slot `index`.
    ///
    /// Returns once the driver is configured and started; use
    /// [`await_connected`](Self::await_connected) to wait for the result.
    /// Fails with `NotFound` without touching the driver if the slot is empty.
    pub fn connect(&self, index: u8, max_retries: RetryPolicy) -> Result<()> {
        let slot = self.credentials().get(index)?;
        let driver = &self.shared.driver;

        if slot.auth_mode.is_enterprise() && !driver.supports_enterprise() {
            error!("Connecting to enterprise networks is not supported");
            return Err(WifiError::Unsupported);
        }

        // No retries, and no events honoured, while the previous connection
        // is torn down.
        {
            let mut state = self.shared.lock();
            state.max_retries = RetryPolicy::Limited(0);
            state.session_started = false;
        }
        if let Err(e) = driver.disconnect() {
            debug!("Disconnect before connect: {}", e);
        }
        if let Err(e) = driver.stop() {
            debug!("Stop before connect: {}", e);
        }

        {
            let mut state = self.shared.lock();
            state.connected = false;
            state.failed = false;
            state.address = None;
            state.retry_count = 0;
            state.max_retries = max_retries;
            state.phase = ConnectionPhase::Starting;
        }

        if let Err(e) = self.configure(&slot) {
            error!("Failed to configure slot {}: {}", index, e);
            self.shared.lock().phase = ConnectionPhase::Idle;
            return Err(e);
        }

        if let Err(e) = driver.start() {
            self.shared.lock().phase = ConnectionPhase::Idle;
            return Err(WifiError::driver("start", e));
        }

        info!(
            "Connecting to '{}' from slot {} (retries: {})",
            slot.ssid.to_string_lossy(),
            index,
            max_retries
        );
        Ok(())
    }

    fn configure(&self, slot: &CredentialSlot) -> Result<()> {
        let driver = &self.shared.driver;

        if slot.auth_mode.is_enterprise() {
            if let Err(e) = self.configure_enterprise(slot) {
                if let Err(disable) = driver.disable_enterprise() {
                    warn!("Failed to disable enterprise mode: {}", disable);
                }
                return Err(e);
            }
        } else {
            // Clear EAP settings left over from an earlier slot.
            driver
                .disable_enterprise()
                .map_err(|e| WifiError::driver("disable enterprise mode", e))?;
        }

        driver
            .set_station_mode()
            .map_err(|e| WifiError::driver("set station mode", e))?;
        driver
            .set_station_config(&StationConfig::from(slot))
            .map_err(|e| WifiError::driver("set station config", e))?;
        Ok(())
    }

    fn configure_enterprise(&self, slot: &CredentialSlot) -> Result<()> {
        let driver = &self.shared.driver;
        driver
            .set_enterprise_identity(slot.identity.as_bytes())
            .map_err(|e| WifiError::driver("set identity", e))?;
        driver
            .set_enterprise_username(slot.username.as_bytes())
            .map_err(|e| WifiError::driver("set username", e))?;
        driver
            .set_enterprise_password(slot.password.as_bytes())
            .map_err(|e| WifiError::driver("set password", e))?;
        driver
            .set_enterprise_phase2(slot.phase2)
            .map_err(|e| WifiError::driver("set phase2 method", e))?;
        driver
            .enable_enterprise()
            .map_err(|e| WifiError::driver("enable enterprise mode", e))
    }

    /// Stop the driver and suppress further reconnects.
    ///
    /// Raises the failed signal so pending [`await_connected`](Self::await_connected)
    /// calls return promptly. Safe to call repeatedly.
    pub fn disconnect(&self) {
        {
            let mut state = self.shared.lock();
            state.max_retries = RetryPolicy::Limited(0);
            state.raise_failed();
            state.phase = ConnectionPhase::Disconnected;
            self.shared.signal.notify_all();
        }
        info!("Disconnecting from WiFi");
        if let Err(e) = self.shared.driver.stop() {
            warn!("Failed to stop driver: {}", e);
        }
    }

    /// Block until connected, failed, or `timeout` elapses.
    ///
    /// A zero `timeout` waits indefinitely. Returns `true` only when connected.
    pub fn await_connected(&self, timeout: Duration) -> bool {
        let state = self.shared.lock();
        let pending = |state: &mut ConnectionState| !state.connected && !state.failed;
        let state = if timeout.is_zero() {
            self.shared
                .signal
                .wait_while(state, pending)
                .unwrap_or_else(PoisonError::into_inner)
        } else {
            self.shared
                .signal
                .wait_timeout_while(state, timeout, pending)
                .unwrap_or_else(PoisonError::into_inner)
                .0
        };

        if state.connected {
            info!("Connected to WiFi");
            true
        } else if state.failed {
            error!("Failed to connect");
            false
        } else {
            warn!("Timed out after {:?} waiting for connection", timeout);
            false
        }
    }

    /// Change the retry policy of the current session without reconnecting.
    ///
    /// Retries already spent still count against a new limited policy.
    pub fn set_max_retries(&self, max_retries: RetryPolicy) {
        let mut state = self.shared.lock();
        info!("Retry policy {} -> {}", state.max_retries, max_retries);
        state.max_retries = max_retries;
    }

    /// Whether the connected signal is currently raised.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    /// Address from the last successful connection.
    pub fn get_address_info(&self) -> Option<IpInfo> {
        self.shared.lock().address
    }

    /// Current phase of the state machine.
    pub fn phase(&self) -> ConnectionPhase {
        self.shared.lock().phase
    }

    /// Copy of the shared state.
    pub fn snapshot(&self) -> ConnectionState {
        self.shared.lock().clone()
    }

    /// Mark a passive scan in progress. While set, a driver start does not
    /// trigger a connect attempt.
    pub fn set_scanning(&self, scanning: bool) {
        self.shared.lock().scanning = scanning;
    }

    /// Try every stored slot from index 0 until one connects.
    ///
    /// Each slot gets the configured retry policy and timeout. Stops at the
    /// first empty slot unless `skip_empty_slots` is set. Returns the index
    /// of the slot that connected. When every slot fails the driver is
    /// stopped via [`disconnect`](Self::disconnect), so the last slot does
    /// not keep retrying in the background.
    pub fn try_all_slots(&self) -> Result<u8> {
        for index in 0..self.config.max_slots {
            match self.connect(index, self.config.try_all_retries) {
                Ok(()) => {
                    info!("Connecting to network in slot {}", index);
                    if self.await_connected(self.config.try_all_timeout) {
                        return Ok(index);
                    }
                }
                Err(WifiError::NotFound) => {
                    info!("No network stored in slot {}", index);
                    if !self.config.skip_empty_slots {
                        break;
                    }
                }
                Err(e) => warn!("Skipping slot {}: {}", index, e),
            }
        }

        error!("Tried all stored networks, unable to connect");
        self.disconnect();
        Err(WifiError::AllSlotsExhausted)
    }

    /// Lock the credential store.
    pub fn credentials(&self) -> MutexGuard<'_, CredentialStore<S>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the slot at `index`.
    pub fn get_slot(&self, index: u8) -> Result<CredentialSlot> {
        self.credentials().get(index)
    }

    /// Store `slot` at `index`.
    pub fn set_slot(&self, index: u8, slot: &CredentialSlot) -> Result<()> {
        self.credentials().set(index, slot)
    }

    /// Erase the slot at `index`, shifting higher slots down.
    pub fn erase_slot(&self, index: u8) -> Result<()> {
        self.credentials().erase(index)
    }

    /// First empty slot index, if any.
    pub fn find_empty_slot(&self) -> Option<u8> {
        self.credentials().find_empty_slot()
    }
}

impl<D: NetworkDriver + 'static, S> Drop for ConnectionManager<D, S> {
    fn drop(&mut self) {
        self.shared.driver.unsubscribe();
        if let Err(e) = self.shared.driver.stop() {
            debug!("Stop on drop: {}", e);
        }
    }
}

impl<D: NetworkDriver + 'static, S> fmt::Debug for ConnectionManager<D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &*self.shared.lock())
            .field("config", &self.config)
            .finish()
    }
}
