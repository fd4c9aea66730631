//! Listener loop, lifecycle and consumer-facing handle.
//!
//! The loop runs on a dedicated worker thread (the gilrs context is not
//! `Send` on every platform) and ticks at a fixed rate. Each tick first
//! advances the debounce timeout machine, then drains the event source
//! through the normalizer and dispatches the results over an unbounded
//! channel. The consumer reaches back only through two atomic flags (mode
//! and stop), both read once per tick at the tick boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use statum::{machine, state};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::listener::event::ListenerEvent;
use crate::listener::normalizer::{EventNormalizer, ListenMode};
use crate::listener::registry::{DeviceMap, DeviceRegistry};
use crate::listener::source::EventSource;

/// Configuration of the listener loop.
#[derive(Clone, Debug)]
pub struct ListenerSettings {
    /// Polling frequency in ticks per second.
    ///
    /// Also the granularity of stop-flag observation: a stop request takes
    /// effect at the next tick boundary.
    pub tick_rate: u32,

    /// Seconds an armed press may be held before it commits an omission.
    ///
    /// Holding a button past this window is the "skip this button" gesture;
    /// the eventual physical release is swallowed.
    pub skip_after_secs: u32,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            skip_after_secs: 3, // the standard to skip a button
        }
    }
}

impl ListenerSettings {
    /// Armed-press budget in ticks.
    pub fn skip_ticks(&self) -> u32 {
        self.tick_rate.saturating_mul(self.skip_after_secs)
    }

    /// Duration of one tick.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}

/// Errors raised while bringing the listener up.
///
/// Everything past initialization is best-effort: hardware failures inside
/// the running loop are logged and swallowed, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to initialize input subsystem: {0}")]
    Initialization(String),

    #[error("Failed to spawn listener worker: {0}")]
    Spawn(String),
}

/// Lifecycle states of the listener, enforced at compile time.
#[state]
#[derive(Debug, Clone)]
pub enum ListenerState {
    Initializing,
    Listening,
}

/// The listener state machine. Lives entirely on the worker thread.
#[machine]
pub struct JoystickListener<S: ListenerState> {
    source: Box<dyn EventSource>,
    registry: DeviceRegistry,
    normalizer: EventNormalizer,
    settings: ListenerSettings,
    event_tx: mpsc::UnboundedSender<ListenerEvent>,
    devices_tx: watch::Sender<DeviceMap>,
    free_mode: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    last_mode: ListenMode,
    receiver_gone: bool,
    dispatched: u64,
}

impl<S: ListenerState> JoystickListener<S> {
    fn mode(&self) -> ListenMode {
        if self.free_mode.load(Ordering::Relaxed) {
            ListenMode::Free
        } else {
            ListenMode::Guided
        }
    }
}

impl JoystickListener<Initializing> {
    pub fn create(
        source: Box<dyn EventSource>,
        settings: ListenerSettings,
        event_tx: mpsc::UnboundedSender<ListenerEvent>,
        devices_tx: watch::Sender<DeviceMap>,
        free_mode: Arc<AtomicBool>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        debug!("Creating listener with settings: {:?}", settings);
        let normalizer = EventNormalizer::new(settings.skip_ticks());
        let last_mode = if free_mode.load(Ordering::Relaxed) {
            ListenMode::Free
        } else {
            ListenMode::Guided
        };

        Self::new(
            source,
            DeviceRegistry::new(),
            normalizer,
            settings,
            event_tx,
            devices_tx,
            free_mode,
            stop,
            last_mode,
            false, // receiver_gone
            0,     // dispatched
        )
    }

    /// Brings the source up, announces the initial device set and
    /// transitions to the Listening state.
    pub fn initialize(mut self) -> Result<JoystickListener<Listening>, ListenerError> {
        self.source.initialize()?;

        // The initial enumeration is announced unconditionally, even when
        // empty, so the consumer always starts from a known snapshot.
        self.registry.refresh(self.source.as_mut());
        let snapshot = self.registry.info().clone();
        info!(
            "Initial enumeration found {} attached device(s)",
            snapshot.len()
        );
        let _ = self.devices_tx.send(snapshot.clone());
        let _ = self.event_tx.send(ListenerEvent::DevicesChanged(snapshot));

        info!("Listener initialized, transitioning to Listening state");
        Ok(self.transition())
    }
}

impl JoystickListener<Listening> {
    fn dispatch(&mut self, event: ListenerEvent) {
        debug!("Dispatching {:?}", event);
        if self.event_tx.send(event).is_ok() {
            self.dispatched += 1;
        } else if !self.receiver_gone {
            self.receiver_gone = true;
            warn!("Event receiver dropped, stopping listener loop");
            self.stop.store(true, Ordering::Relaxed);
        }
    }

    /// One polling tick.
    ///
    /// The mode flag is read exactly once, here, so classification stays
    /// deterministic within the tick.
    pub fn tick(&mut self) {
        let mode = self.mode();
        if mode != self.last_mode {
            debug!("Listen mode changed to {:?}, resetting debounce state", mode);
            self.normalizer.reset();
            self.last_mode = mode;
        }

        if let Some(timeout) = self.normalizer.advance_tick() {
            self.dispatch(ListenerEvent::Classified(timeout));
        }

        for raw in self.source.drain() {
            if raw.is_hotplug() {
                // Re-enumerate on every hot-plug event; only an actually
                // different set reaches the consumer.
                if let Some(changed) = self.registry.refresh(self.source.as_mut()) {
                    let _ = self.devices_tx.send(changed.clone());
                    self.dispatch(ListenerEvent::DevicesChanged(changed));
                }
            }
            if let Some(classified) = self.normalizer.classify(raw, mode) {
                self.dispatch(ListenerEvent::Classified(classified));
            }
        }
    }

    /// Runs ticks at the configured rate until the stop flag is observed,
    /// then tears the source down (cooperatively, see
    /// [`EventSource::shutdown`]).
    pub fn run_listen_loop(mut self) {
        let tick_interval = self.settings.tick_interval();
        info!("Listener loop running at {} Hz", self.settings.tick_rate);

        let mut last_stats = Local::now();
        let stats_interval = chrono::Duration::seconds(30);

        while !self.stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            self.tick();

            let now = Local::now();
            if now - last_stats > stats_interval {
                info!(
                    "Listener stats: {} events dispatched in the last {} seconds",
                    self.dispatched,
                    stats_interval.num_seconds()
                );
                self.dispatched = 0;
                last_stats = now;
            }

            if let Some(rest) = tick_interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }

        info!("Stop flag observed, tearing down listener");
        self.source.shutdown();
    }
}

/// Consumer-facing handle to a running listener.
///
/// Spawns the worker thread and exposes the event stream, the device
/// snapshot, and the two control flags. All methods are safe to call from
/// the consumer thread; none of them block the worker.
pub struct ListenerHandle {
    events_rx: Option<mpsc::UnboundedReceiver<ListenerEvent>>,
    devices_rx: watch::Receiver<DeviceMap>,
    free_mode: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Spawns the listener worker.
    ///
    /// `make_source` runs on the worker thread, because the production
    /// source's input context cannot move between threads on every platform.
    /// Initialization failures are logged on the worker and surface to the
    /// consumer as a closed event channel.
    pub fn spawn<S, F>(
        settings: ListenerSettings,
        mode: ListenMode,
        make_source: F,
    ) -> Result<Self, ListenerError>
    where
        S: EventSource + 'static,
        F: FnOnce() -> S + Send + 'static,
    {
        info!("Spawning listener with settings: {:?}", settings);

        let (event_tx, events_rx) = mpsc::unbounded_channel();
        let (devices_tx, devices_rx) = watch::channel(DeviceMap::new());
        let free_mode = Arc::new(AtomicBool::new(mode == ListenMode::Free));
        let stop = Arc::new(AtomicBool::new(false));

        let worker_free_mode = free_mode.clone();
        let worker_stop = stop.clone();
        let worker = std::thread::Builder::new()
            .name("joymapper-listener".into())
            .spawn(move || {
                let listener = JoystickListener::create(
                    Box::new(make_source()),
                    settings,
                    event_tx,
                    devices_tx,
                    worker_free_mode,
                    worker_stop,
                );
                match listener.initialize() {
                    Ok(listening) => listening.run_listen_loop(),
                    Err(e) => error!("Failed to initialize listener: {}", e),
                }
            })
            .map_err(|e| ListenerError::Spawn(e.to_string()))?;

        Ok(Self {
            events_rx: Some(events_rx),
            devices_rx,
            free_mode,
            stop,
            worker: Some(worker),
        })
    }

    /// Takes the receiving half of the event stream.
    ///
    /// There is exactly one consumer; subsequent calls return `None`.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ListenerEvent>> {
        self.events_rx.take()
    }

    /// Flips the listening mode. Takes effect at the next tick.
    pub fn set_mode(&self, mode: ListenMode) {
        self.free_mode
            .store(mode == ListenMode::Free, Ordering::Relaxed);
    }

    /// Requests the loop to stop. Asynchronous: the worker observes the flag
    /// at the next tick boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Synchronous snapshot of the attached devices.
    ///
    /// Served from the watch channel the worker seeds with its start-time
    /// enumeration; before that lands, the snapshot is empty.
    pub fn current_devices(&self) -> DeviceMap {
        self.devices_rx.borrow().clone()
    }

    /// Waits for the worker to terminate. Callers wanting bounded shutdown
    /// call [`request_stop`](Self::request_stop) first.
    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Listener worker panicked");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        // A forgotten handle must not leave the worker spinning.
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::event::{ClassifiedEvent, RawEvent};
    use crate::listener::registry::Device;
    use crate::listener::source::testing::{ScriptState, ScriptedSource};
    use std::sync::Mutex;

    fn device(instance_id: u32, name: &str) -> Device {
        Device {
            instance_id,
            name: name.to_string(),
            guid: format!("guid-{instance_id}"),
        }
    }

    struct Harness {
        listener: JoystickListener<Listening>,
        events: mpsc::UnboundedReceiver<ListenerEvent>,
        #[allow(dead_code)]
        devices: watch::Receiver<DeviceMap>,
        free_mode: Arc<AtomicBool>,
        state: Arc<Mutex<ScriptState>>,
    }

    impl Harness {
        fn new(devices: Vec<Device>, mode: ListenMode) -> Self {
            let (source, state) = ScriptedSource::new();
            state.lock().unwrap().devices = devices;

            let (event_tx, mut events) = mpsc::unbounded_channel();
            let (devices_tx, devices_rx) = watch::channel(DeviceMap::new());
            let free_mode = Arc::new(AtomicBool::new(mode == ListenMode::Free));
            let stop = Arc::new(AtomicBool::new(false));

            let listener = JoystickListener::create(
                Box::new(source),
                ListenerSettings::default(),
                event_tx,
                devices_tx,
                free_mode.clone(),
                stop,
            )
            .initialize()
            .expect("scripted initialize");

            // Swallow the unconditional start-time announcement.
            match events.try_recv() {
                Ok(ListenerEvent::DevicesChanged(_)) => {}
                other => panic!("expected initial device announcement, got {other:?}"),
            }

            Self {
                listener,
                events,
                devices: devices_rx,
                free_mode,
                state,
            }
        }

        fn push_tick(&self, events: Vec<RawEvent>) {
            self.state.lock().unwrap().ticks.push_back(events);
        }

        fn drain_events(&mut self) -> Vec<ListenerEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    #[test]
    fn test_press_then_release_at_tick_ten_emits_one_event() {
        let mut harness = Harness::new(vec![device(0, "Pad")], ListenMode::Guided);

        harness.push_tick(vec![RawEvent::ButtonDown {
            device: 0,
            button: 0,
        }]);
        for _ in 0..9 {
            harness.push_tick(vec![]);
        }
        harness.push_tick(vec![RawEvent::ButtonUp {
            device: 0,
            button: 0,
        }]);

        for _ in 0..11 {
            harness.listener.tick();
        }

        assert_eq!(
            harness.drain_events(),
            vec![ListenerEvent::Classified(ClassifiedEvent::ButtonUp {
                device: 0,
                button: 0
            })]
        );
    }

    #[test]
    fn test_held_press_times_out_at_tick_181_and_release_is_dropped() {
        let mut harness = Harness::new(vec![device(0, "Pad")], ListenMode::Guided);

        harness.push_tick(vec![RawEvent::ButtonDown {
            device: 0,
            button: 0,
        }]);
        harness.listener.tick();

        for _ in 0..180 {
            harness.listener.tick();
        }
        assert_eq!(harness.drain_events(), vec![]);

        // Tick 181 past the press crosses the 3 s × 60 Hz budget.
        harness.listener.tick();
        assert_eq!(
            harness.drain_events(),
            vec![ListenerEvent::Classified(ClassifiedEvent::Timeout)]
        );

        harness.push_tick(vec![RawEvent::ButtonUp {
            device: 0,
            button: 0,
        }]);
        harness.listener.tick();
        assert_eq!(harness.drain_events(), vec![]);
    }

    #[test]
    fn test_netted_out_hotplug_produces_no_notification() {
        let mut harness = Harness::new(vec![device(7, "Pad")], ListenMode::Guided);

        // Add and remove land within the same tick; by the time the listener
        // re-enumerates, the live set matches what it already had.
        harness.push_tick(vec![
            RawEvent::DeviceAdded { device: 8 },
            RawEvent::DeviceRemoved { device: 8 },
        ]);
        harness.listener.tick();

        assert_eq!(harness.drain_events(), vec![]);
    }

    #[test]
    fn test_real_hotplug_notifies_once_with_the_new_set() {
        let mut harness = Harness::new(vec![device(7, "Pad")], ListenMode::Guided);

        harness.state.lock().unwrap().devices = vec![device(7, "Pad"), device(8, "Other")];
        harness.push_tick(vec![RawEvent::DeviceAdded { device: 8 }]);
        harness.listener.tick();

        let events = harness.drain_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ListenerEvent::DevicesChanged(map) => {
                assert_eq!(map.len(), 2);
                assert!(map.contains_key("8"));
            }
            other => panic!("expected devices-changed, got {other:?}"),
        }
    }

    #[test]
    fn test_mode_flip_resets_debounce_and_passes_raw_events_through() {
        let mut harness = Harness::new(vec![device(0, "Pad")], ListenMode::Guided);

        harness.push_tick(vec![RawEvent::ButtonDown {
            device: 0,
            button: 2,
        }]);
        harness.listener.tick();

        harness.free_mode.store(true, Ordering::Relaxed);
        for _ in 0..200 {
            harness.push_tick(vec![]);
            harness.listener.tick();
        }
        // The armed press was discarded on the flip: no timeout fired.
        assert_eq!(harness.drain_events(), vec![]);

        let raw = RawEvent::ButtonDown {
            device: 0,
            button: 2,
        };
        harness.push_tick(vec![raw]);
        harness.listener.tick();
        assert_eq!(
            harness.drain_events(),
            vec![ListenerEvent::Classified(ClassifiedEvent::Inspect(raw))]
        );
    }

    #[test]
    fn test_stop_terminates_worker_and_tears_down_owned_source() {
        let (source, state) = ScriptedSource::new();
        state.lock().unwrap().devices = vec![device(0, "Pad")];

        let settings = ListenerSettings {
            tick_rate: 1000,
            skip_after_secs: 3,
        };
        let handle = ListenerHandle::spawn(settings, ListenMode::Guided, move || source)
            .expect("spawn listener");

        std::thread::sleep(Duration::from_millis(20));
        handle.request_stop();
        handle.join();

        let state = state.lock().unwrap();
        assert!(state.initialized);
        assert!(state.shut_down);
    }

    #[test]
    fn test_handle_mode_flip_and_device_snapshot() {
        let (source, state) = ScriptedSource::new();
        state.lock().unwrap().devices = vec![device(4, "Pad")];

        let settings = ListenerSettings {
            tick_rate: 1000,
            skip_after_secs: 3,
        };
        let mut handle = ListenerHandle::spawn(settings, ListenMode::Guided, move || source)
            .expect("spawn listener");
        let mut events = handle.take_events().expect("first take");
        assert!(handle.take_events().is_none());

        match events.blocking_recv() {
            Some(ListenerEvent::DevicesChanged(map)) => assert!(map.contains_key("4")),
            other => panic!("expected initial device announcement, got {other:?}"),
        }
        assert!(handle.current_devices().contains_key("4"));

        // Once flipped to free mode, a plain ButtonDown passes through.
        handle.set_mode(ListenMode::Free);
        let raw = RawEvent::ButtonDown {
            device: 4,
            button: 0,
        };
        state.lock().unwrap().ticks.push_back(vec![raw]);
        match events.blocking_recv() {
            Some(ListenerEvent::Classified(ClassifiedEvent::Inspect(got))) => {
                assert_eq!(got, raw)
            }
            other => panic!("expected inspect passthrough, got {other:?}"),
        }

        handle.request_stop();
        handle.join();
    }

    #[test]
    fn test_pre_initialized_source_survives_stop() {
        let (source, state) = ScriptedSource::new();
        state.lock().unwrap().pre_initialized = true;

        let settings = ListenerSettings {
            tick_rate: 1000,
            skip_after_secs: 3,
        };
        let handle = ListenerHandle::spawn(settings, ListenMode::Guided, move || source)
            .expect("spawn listener");

        std::thread::sleep(Duration::from_millis(20));
        handle.request_stop();
        handle.join();

        let state = state.lock().unwrap();
        assert!(!state.initialized);
        assert!(!state.shut_down);
    }
}
