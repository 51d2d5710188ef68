//! Simulated WiFi driver for host builds.
//!
//! Events are delivered from a dedicated thread after a small latency, the
//! way a real driver reports progress from its own event task. Networks are
//! registered up front; connecting to an unknown SSID or with the wrong
//! password produces a disconnect.

use super::config::Phase2Method;
use super::connection::EventSink;
use super::driver::{DriverEvent, DriverResult, IpInfo, NetworkDriver, StationConfig};
use crate::error::DriverError;
use log::debug;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Delay before each simulated event is delivered.
pub const DEFAULT_EVENT_LATENCY: Duration = Duration::from_millis(5);

const ERR_WIFI_NOT_INIT: i32 = 0x3001;
const ERR_WIFI_NOT_STARTED: i32 = 0x3002;

#[derive(Debug, Clone)]
struct SimNetwork {
    password: Vec<u8>,
    address: IpInfo,
}

#[derive(Debug, Default)]
struct SimState {
    initialized: bool,
    started: bool,
    associated: bool,
    station: Option<StationConfig>,
    enterprise: bool,
    eap_password: Vec<u8>,
}

/// Host-side [`NetworkDriver`] with scripted access points.
pub struct SimulatedDriver {
    networks: Mutex<HashMap<Vec<u8>, SimNetwork>>,
    state: Mutex<SimState>,
    sink: Arc<Mutex<Option<EventSink>>>,
    events: Mutex<Option<Sender<DriverEvent>>>,
    worker: Option<JoinHandle<()>>,
    connect_requests: AtomicUsize,
}

impl SimulatedDriver {
    /// Create a driver with [`DEFAULT_EVENT_LATENCY`].
    pub fn new() -> Self {
        Self::with_latency(DEFAULT_EVENT_LATENCY)
    }

    /// Create a driver delivering each event after `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<DriverEvent>();
        let sink: Arc<Mutex<Option<EventSink>>> = Arc::new(Mutex::new(None));
        let worker_sink = Arc::clone(&sink);

        let worker = thread::spawn(move || {
            for event in rx {
                thread::sleep(latency);
                let sink = worker_sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                match sink {
                    Some(sink) => {
                        sink.dispatch(event);
                    }
                    None => debug!("Dropping {:?}, no subscriber", event),
                }
            }
        });

        Self {
            networks: Mutex::new(HashMap::new()),
            state: Mutex::new(SimState::default()),
            sink,
            events: Mutex::new(Some(tx)),
            worker: Some(worker),
            connect_requests: AtomicUsize::new(0),
        }
    }

    /// Register an access point. Its DHCP server hands out `ip` on a /24
    /// with the gateway at `.1`.
    pub fn add_network(&self, ssid: &str, password: &str, ip: [u8; 4]) {
        let address = IpInfo {
            ip: Ipv4Addr::from(ip),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(ip[0], ip[1], ip[2], 1),
        };
        lock(&self.networks).insert(
            ssid.as_bytes().to_vec(),
            SimNetwork {
                password: password.as_bytes().to_vec(),
                address,
            },
        );
    }

    /// Number of `connect` requests received so far.
    pub fn connect_requests(&self) -> usize {
        self.connect_requests.load(Ordering::SeqCst)
    }

    /// Whether the simulated radio is running.
    pub fn is_started(&self) -> bool {
        lock(&self.state).started
    }

    fn emit(&self, event: DriverEvent) {
        if let Some(tx) = lock(&self.events).as_ref() {
            // The worker only exits once the sender is gone.
            let _ = tx.send(event);
        }
    }

    fn outcome(&self, state: &SimState) -> Option<IpInfo> {
        let station = state.station.as_ref()?;
        let networks = lock(&self.networks);
        let network = networks.get(station.ssid.as_bytes())?;
        let password = if state.enterprise {
            state.eap_password.as_slice()
        } else {
            station.password.as_bytes()
        };
        (network.password == password).then_some(network.address)
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulatedDriver {
    fn drop(&mut self) {
        lock(&self.events).take();
        if let Some(worker) = self.worker.take() {
            // The last manager reference may be released on the worker itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl NetworkDriver for SimulatedDriver {
    fn init_stack(&self) -> DriverResult {
        let mut state = lock(&self.state);
        state.initialized = true;
        state.started = false;
        Ok(())
    }

    fn set_station_mode(&self) -> DriverResult {
        Ok(())
    }

    fn set_station_config(&self, config: &StationConfig) -> DriverResult {
        lock(&self.state).station = Some(config.clone());
        Ok(())
    }

    fn enable_enterprise(&self) -> DriverResult {
        lock(&self.state).enterprise = true;
        Ok(())
    }

    fn disable_enterprise(&self) -> DriverResult {
        let mut state = lock(&self.state);
        state.enterprise = false;
        state.eap_password.clear();
        Ok(())
    }

    fn set_enterprise_identity(&self, _identity: &[u8]) -> DriverResult {
        Ok(())
    }

    fn set_enterprise_username(&self, _username: &[u8]) -> DriverResult {
        Ok(())
    }

    fn set_enterprise_password(&self, password: &[u8]) -> DriverResult {
        lock(&self.state).eap_password = password.to_vec();
        Ok(())
    }

    fn set_enterprise_phase2(&self, _method: Phase2Method) -> DriverResult {
        Ok(())
    }

    fn start(&self) -> DriverResult {
        let mut state = lock(&self.state);
        if !state.initialized {
            return Err(DriverError::new(ERR_WIFI_NOT_INIT, "ESP_ERR_WIFI_NOT_INIT"));
        }
        state.started = true;
        drop(state);
        self.emit(DriverEvent::Started);
        Ok(())
    }

    fn stop(&self) -> DriverResult {
        let mut state = lock(&self.state);
        if !state.started {
            return Ok(());
        }
        state.started = false;
        state.associated = false;
        drop(state);
        self.emit(DriverEvent::Stopped);
        Ok(())
    }

    fn connect(&self) -> DriverResult {
        self.connect_requests.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.state);
        if !state.started {
            return Err(DriverError::new(ERR_WIFI_NOT_STARTED, "ESP_ERR_WIFI_NOT_STARTED"));
        }
        let outcome = self.outcome(&state);
        state.associated = outcome.is_some();
        drop(state);

        match outcome {
            Some(address) => self.emit(DriverEvent::AddressAcquired(address)),
            None => self.emit(DriverEvent::Disconnected),
        }
        Ok(())
    }

    fn disconnect(&self) -> DriverResult {
        let mut state = lock(&self.state);
        if state.associated {
            state.associated = false;
            drop(state);
            self.emit(DriverEvent::Disconnected);
        }
        Ok(())
    }

    fn subscribe(&self, sink: EventSink) -> DriverResult {
        *lock(&self.sink) = Some(sink);
        Ok(())
    }

    fn unsubscribe(&self) {
        lock(&self.sink).take();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
