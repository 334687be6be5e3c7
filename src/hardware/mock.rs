//! Scriptable in-memory peripherals for tests and the simulator

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use nalgebra::Vector3;

use super::{
    Accelerometer, Battery, DeepSleep, DifferentialPwm, Feedback, HardwareError, HardwareResult,
    Magnetometer, NonVolatileMemory, PwmBuzzer, Rangefinder, Screen, Tune, WakeAlarm, Watchdog,
    WatchdogExpired, WirelessLink,
};
use crate::api::formatting::LegView;
use crate::core::Leg;

/// What the next rangefinder read does
#[derive(Debug, Clone, PartialEq)]
pub enum LaserResponse {
    /// Answer after the configured delay
    Distance(f64),
    /// Never answer
    Hang,
    Fail(HardwareError),
}

/// Everything pushed to the mock screen, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
    StartScreen,
    Leg(LegView),
    Info(String),
    Menu { labels: Vec<String>, selected: usize },
    Sleep,
    Wake,
    Flipped(bool),
}

/// Level instrument aimed north in a field with roughly 66° of dip
pub struct MockHardware {
    laser: RefCell<VecDeque<LaserResponse>>,
    default_distance: Cell<f64>,
    laser_delay: Cell<Duration>,
    laser_busy: Cell<bool>,
    interleaved: Cell<bool>,
    measure_calls: Cell<usize>,
    pointer: Cell<bool>,
    pointer_log: RefCell<Vec<bool>>,

    magnetic: Cell<Vector3<f64>>,
    acceleration: Cell<Vector3<f64>>,
    sensor_fault: RefCell<Option<HardwareError>>,
    voltage: Cell<f64>,

    screen: RefCell<Vec<ScreenEvent>>,
    tunes: RefCell<Vec<Tune>>,
    buzzer: PwmBuzzer<MockPwm>,

    watchdog_armed: Cell<bool>,
    watchdog_feeds: Cell<usize>,
    failing_feeds: RefCell<VecDeque<bool>>,

    sent: RefCell<Vec<Leg>>,
    connected: Cell<bool>,
    queue_depth: Cell<usize>,
    battery_level: Cell<Option<u8>>,
}

impl MockHardware {
    pub fn new() -> Self {
        Self {
            laser: RefCell::new(VecDeque::new()),
            default_distance: Cell::new(5.0),
            laser_delay: Cell::new(Duration::from_millis(200)),
            laser_busy: Cell::new(false),
            interleaved: Cell::new(false),
            measure_calls: Cell::new(0),
            pointer: Cell::new(false),
            pointer_log: RefCell::new(Vec::new()),
            magnetic: Cell::new(Vector3::new(0.0, 20.0, -45.0)),
            acceleration: Cell::new(Vector3::new(0.0, 0.0, 9.81)),
            sensor_fault: RefCell::new(None),
            voltage: Cell::new(4.0),
            screen: RefCell::new(Vec::new()),
            tunes: RefCell::new(Vec::new()),
            buzzer: PwmBuzzer::new(MockPwm::default()),
            watchdog_armed: Cell::new(false),
            watchdog_feeds: Cell::new(0),
            failing_feeds: RefCell::new(VecDeque::new()),
            sent: RefCell::new(Vec::new()),
            connected: Cell::new(true),
            queue_depth: Cell::new(0),
            battery_level: Cell::new(None),
        }
    }

    /// Queue the outcome of the next unscripted-by-default laser read
    pub fn push_laser(&self, response: LaserResponse) {
        self.laser.borrow_mut().push_back(response);
    }

    pub fn set_default_distance(&self, metres: f64) {
        self.default_distance.set(metres);
    }

    pub fn set_laser_delay(&self, delay: Duration) {
        self.laser_delay.set(delay);
    }

    pub fn set_field(&self, magnetic: Vector3<f64>, acceleration: Vector3<f64>) {
        self.magnetic.set(magnetic);
        self.acceleration.set(acceleration);
    }

    pub fn set_sensor_fault(&self, fault: Option<HardwareError>) {
        *self.sensor_fault.borrow_mut() = fault;
    }

    pub fn set_voltage(&self, volts: f64) {
        self.voltage.set(volts);
    }

    /// Script a run of feed results; `false` entries fail
    pub fn script_feeds(&self, results: &[bool]) {
        self.failing_feeds.borrow_mut().extend(results.iter().copied());
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth);
    }

    pub fn pointer(&self) -> bool {
        self.pointer.get()
    }

    pub fn pointer_log(&self) -> Vec<bool> {
        self.pointer_log.borrow().clone()
    }

    pub fn measure_calls(&self) -> usize {
        self.measure_calls.get()
    }

    /// True if the pointer was toggled while a distance read was in flight
    pub fn saw_interleaving(&self) -> bool {
        self.interleaved.get()
    }

    pub fn screen_events(&self) -> Vec<ScreenEvent> {
        self.screen.borrow().clone()
    }

    /// Most recent info text, if any
    pub fn last_info(&self) -> Option<String> {
        self.screen.borrow().iter().rev().find_map(|event| match event {
            ScreenEvent::Info(text) => Some(text.clone()),
            _ => None,
        })
    }

    pub fn tunes(&self) -> Vec<Tune> {
        self.tunes.borrow().clone()
    }

    /// Every note frequency the buzzer channel has been driven at
    pub fn buzzer_frequencies(&self) -> Vec<u32> {
        self.buzzer.pwm().frequencies()
    }

    pub fn watchdog_feeds(&self) -> usize {
        self.watchdog_feeds.get()
    }

    pub fn sent_legs(&self) -> Vec<Leg> {
        self.sent.borrow().clone()
    }

    pub fn battery_level(&self) -> Option<u8> {
        self.battery_level.get()
    }

    fn record(&self, event: ScreenEvent) {
        self.screen.borrow_mut().push(event);
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

/// Cleared on drop so a cancelled read does not leave the laser looking busy
struct BusyFlag<'a>(&'a Cell<bool>);

impl<'a> BusyFlag<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Rangefinder for MockHardware {
    async fn measure(&self) -> HardwareResult<f64> {
        self.measure_calls.set(self.measure_calls.get() + 1);
        let response = self
            .laser
            .borrow_mut()
            .pop_front()
            .unwrap_or(LaserResponse::Distance(self.default_distance.get()));

        let _busy = BusyFlag::raise(&self.laser_busy);
        match response {
            LaserResponse::Distance(d) => {
                tokio::time::sleep(self.laser_delay.get()).await;
                Ok(d)
            }
            LaserResponse::Hang => std::future::pending().await,
            LaserResponse::Fail(err) => Err(err),
        }
    }

    async fn set_pointer(&self, on: bool) -> HardwareResult<()> {
        if self.laser_busy.get() {
            self.interleaved.set(true);
        }
        self.pointer.set(on);
        self.pointer_log.borrow_mut().push(on);
        Ok(())
    }
}

impl Magnetometer for MockHardware {
    fn magnetic(&self) -> HardwareResult<Vector3<f64>> {
        match self.sensor_fault.borrow().clone() {
            Some(fault) => Err(fault),
            None => Ok(self.magnetic.get()),
        }
    }
}

impl Accelerometer for MockHardware {
    fn acceleration(&self) -> HardwareResult<Vector3<f64>> {
        Ok(self.acceleration.get())
    }
}

impl Battery for MockHardware {
    fn voltage(&self) -> HardwareResult<f64> {
        Ok(self.voltage.get())
    }
}

impl Screen for MockHardware {
    fn show_start_screen(&self) {
        self.record(ScreenEvent::StartScreen);
    }

    fn show_leg(&self, view: &LegView) {
        self.record(ScreenEvent::Leg(view.clone()));
    }

    fn show_info(&self, text: &str) {
        self.record(ScreenEvent::Info(text.to_string()));
    }

    fn show_menu(&self, labels: &[String], selected: usize) {
        self.record(ScreenEvent::Menu { labels: labels.to_vec(), selected });
    }

    fn sleep(&self) {
        self.record(ScreenEvent::Sleep);
    }

    fn wake(&self) {
        self.record(ScreenEvent::Wake);
    }

    fn set_flipped(&self, flipped: bool) {
        self.record(ScreenEvent::Flipped(flipped));
    }
}

impl Feedback for MockHardware {
    async fn play(&self, tune: Tune) {
        self.tunes.borrow_mut().push(tune);
        self.buzzer.play(tune).await;
    }
}

impl Watchdog for MockHardware {
    fn arm(&self, _timeout: Duration) {
        self.watchdog_armed.set(true);
    }

    fn feed(&self) -> Result<(), WatchdogExpired> {
        self.watchdog_feeds.set(self.watchdog_feeds.get() + 1);
        match self.failing_feeds.borrow_mut().pop_front() {
            Some(false) => Err(WatchdogExpired),
            _ => Ok(()),
        }
    }

    fn disable(&self) {
        self.watchdog_armed.set(false);
    }

    fn is_armed(&self) -> bool {
        self.watchdog_armed.get()
    }
}

impl WirelessLink for MockHardware {
    fn send_leg(&self, leg: &Leg) -> HardwareResult<()> {
        if !self.connected.get() {
            return Err(HardwareError::NotResponding { device: "wireless" });
        }
        self.sent.borrow_mut().push(*leg);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    fn queue_depth(&self) -> usize {
        self.queue_depth.get()
    }

    fn set_battery_level(&self, percent: u8) {
        self.battery_level.set(Some(percent));
    }
}

/// Records every frequency it is asked to play
#[derive(Debug, Default)]
pub struct MockPwm {
    frequencies: RefCell<Vec<u32>>,
    duty: Cell<u16>,
}

impl MockPwm {
    pub fn frequencies(&self) -> Vec<u32> {
        self.frequencies.borrow().clone()
    }

    pub fn duty(&self) -> u16 {
        self.duty.get()
    }
}

impl DifferentialPwm for MockPwm {
    fn set_frequency(&self, hz: u32) {
        self.frequencies.borrow_mut().push(hz);
    }

    fn set_duty_cycle(&self, duty: u16) {
        self.duty.set(duty);
    }
}

/// Erased flash: every byte starts at `0xff`
#[derive(Debug)]
pub struct MockNvm {
    bytes: RefCell<Vec<u8>>,
}

impl MockNvm {
    pub fn new(len: usize) -> Self {
        Self { bytes: RefCell::new(vec![0xff; len]) }
    }
}

impl NonVolatileMemory for MockNvm {
    fn len(&self) -> usize {
        self.bytes.borrow().len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) {
        let bytes = self.bytes.borrow();
        let end = (offset + buf.len()).min(bytes.len());
        let available = end.saturating_sub(offset);
        buf[..available].copy_from_slice(&bytes[offset..end]);
    }

    fn write(&self, offset: usize, data: &[u8]) {
        let mut bytes = self.bytes.borrow_mut();
        let end = (offset + data.len()).min(bytes.len());
        let available = end.saturating_sub(offset);
        bytes[offset..end].copy_from_slice(&data[..available]);
    }
}

/// Remembers how the device was put to sleep or reset
#[derive(Debug)]
pub struct MockSleep {
    wake_with: Cell<WakeAlarm>,
    sleeps: RefCell<Vec<Vec<WakeAlarm>>>,
    resets: Cell<usize>,
}

impl MockSleep {
    pub fn new(wake_with: WakeAlarm) -> Self {
        Self { wake_with: Cell::new(wake_with), sleeps: RefCell::new(Vec::new()), resets: Cell::new(0) }
    }

    pub fn sleeps(&self) -> Vec<Vec<WakeAlarm>> {
        self.sleeps.borrow().clone()
    }

    pub fn resets(&self) -> usize {
        self.resets.get()
    }
}

impl DeepSleep for MockSleep {
    fn light_sleep(&self, alarms: &[WakeAlarm]) -> WakeAlarm {
        self.sleeps.borrow_mut().push(alarms.to_vec());
        self.wake_with.get()
    }

    fn reset(&self) {
        self.resets.set(self.resets.get() + 1);
    }
}
