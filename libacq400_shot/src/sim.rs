//! In-process stand-ins for ACQ400 units.
//!
//! A [`SimulatedUut`] walks the IDLE -> ARMING -> ARMED -> RUNNING -> STOPPED sequence on
//! a background thread each time it is armed. UUTs sharing a [`TriggerBus`] wait on the
//! bus once armed, so a soft trigger to any one of them starts them all, much like a
//! master unit distributing its trigger over the sync cable.
use ndarray::Array2;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::calibration::{Calibration, ChannelCalibration};
use super::constants::WORD4_CODE_SCALE;
use super::error::UutError;
use super::handler::WordSize;
use super::status_monitor::{StatusMonitor, UutState};
use super::uut::Uut;

const SIM_AMPLITUDE: f64 = 16000.0;
const SIM_PERIOD: f64 = 50.0;

/// Shared trigger line between simulated UUTs
#[derive(Debug, Default)]
pub struct TriggerBus {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl TriggerBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of triggers fired so far
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    pub fn fire(&self) {
        *self.generation.lock() += 1;
        self.condvar.notify_all();
    }

    /// Wait for a trigger after generation `seen`. Returns false on timeout
    pub fn wait_for_trigger(&self, seen: u64, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut generation = self.generation.lock();
        while *generation == seen {
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut generation, deadline).timed_out() {
                        return *generation != seen;
                    }
                }
                None => self.condvar.wait(&mut generation),
            }
        }
        true
    }
}

/// Timing of the simulated state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTiming {
    pub arm_delay: Duration,
    pub run_time: Duration,
    /// How long an armed UUT on a trigger bus waits before giving up and going idle
    pub trigger_wait: Duration,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            arm_delay: Duration::from_millis(100),
            run_time: Duration::from_millis(500),
            trigger_wait: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub struct SimulatedUut {
    name: String,
    nchan: usize,
    nsam: usize,
    word_size: WordSize,
    timing: SimTiming,
    bus: Option<Arc<TriggerBus>>,
    calibration: Option<ChannelCalibration>,
    statmon: StatusMonitor,
    shot: Arc<AtomicU64>,
    data: Arc<Mutex<Option<Array2<i32>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SimulatedUut {
    pub fn new(name: &str, nchan: usize) -> Self {
        Self {
            name: name.to_string(),
            nchan,
            nsam: 1000,
            word_size: WordSize::default(),
            timing: SimTiming::default(),
            bus: None,
            calibration: None,
            statmon: StatusMonitor::new(),
            shot: Arc::new(AtomicU64::new(0)),
            data: Arc::new(Mutex::new(None)),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_timing(mut self, timing: SimTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_samples(mut self, nsam: usize) -> Self {
        self.nsam = nsam;
        self
    }

    pub fn with_word_size(mut self, word_size: WordSize) -> Self {
        self.word_size = word_size;
        self
    }

    pub fn with_trigger_bus(mut self, bus: Arc<TriggerBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_calibration(mut self, calibration: ChannelCalibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Join any finished shot threads
    fn reap_workers(&self) {
        let mut workers = self.workers.lock();
        let (finished, running): (Vec<_>, Vec<_>) =
            workers.drain(..).partition(|w| w.is_finished());
        *workers = running;
        for worker in finished {
            if worker.join().is_err() {
                log::error!("Simulated shot thread for {} panicked", self.name);
            }
        }
    }
}

/// A sine wave per channel, phase shifted by channel and shot
fn simulate_capture(nchan: usize, nsam: usize, word_size: WordSize, shot: u64) -> Array2<i32> {
    let scale = match word_size {
        WordSize::Two => 1.0,
        WordSize::Four => WORD4_CODE_SCALE,
    };
    Array2::from_shape_fn((nchan, nsam), |(ic, isam)| {
        let phase = (isam as f64 / SIM_PERIOD) + ic as f64 + shot as f64;
        (phase.sin() * SIM_AMPLITUDE * scale) as i32
    })
}

impl Uut for SimulatedUut {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_arm(&self) -> Result<(), UutError> {
        match self.statmon.state() {
            UutState::Arming | UutState::Armed | UutState::Running => {
                return Err(UutError::CommandFailed {
                    uut: self.name.clone(),
                    command: String::from("set_arm"),
                    reason: String::from("a shot is already in progress"),
                })
            }
            _ => (),
        }
        self.reap_workers();

        let name = self.name.clone();
        let timing = self.timing;
        let bus = self.bus.clone();
        let seen = bus.as_ref().map(|b| b.generation()).unwrap_or_default();
        let statmon = self.statmon.clone();
        let shot = self.shot.clone();
        let data = self.data.clone();
        let (nchan, nsam, word_size) = (self.nchan, self.nsam, self.word_size);

        statmon.observe(UutState::Arming);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(timing.arm_delay);
            statmon.observe(UutState::Armed);
            if let Some(bus) = bus {
                if !bus.wait_for_trigger(seen, timing.trigger_wait) {
                    log::warn!("{name} was never triggered, returning to idle");
                    statmon.observe(UutState::Idle);
                    return;
                }
            }
            statmon.observe(UutState::Running);
            std::thread::sleep(timing.run_time);
            let next_shot = shot.load(Ordering::SeqCst) + 1;
            *data.lock() = Some(simulate_capture(nchan, nsam, word_size, next_shot));
            shot.store(next_shot, Ordering::SeqCst);
            statmon.observe(UutState::Stopped);
        });
        self.workers.lock().push(handle);
        Ok(())
    }

    fn soft_trigger(&self) -> Result<(), UutError> {
        if let Some(bus) = &self.bus {
            bus.fire();
        }
        Ok(())
    }

    fn shot(&self) -> Result<u64, UutError> {
        Ok(self.shot.load(Ordering::SeqCst))
    }

    fn reset_shot(&self) -> Result<(), UutError> {
        self.shot.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn statmon(&self) -> &StatusMonitor {
        &self.statmon
    }

    fn read_channels(&self) -> Result<Array2<i32>, UutError> {
        self.data
            .lock()
            .clone()
            .ok_or_else(|| UutError::NoData(self.name.clone()))
    }

    fn calibration(&self) -> Option<&dyn Calibration> {
        self.calibration.as_ref().map(|c| c as &dyn Calibration)
    }
}

impl Drop for SimulatedUut {
    fn drop(&mut self) {
        // Release anything still waiting on the bus so the join below cannot hang
        let workers = self.workers.get_mut();
        if let Some(bus) = &self.bus {
            if workers.iter().any(|w| !w.is_finished()) {
                bus.fire();
            }
        }
        for worker in workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Simulated shot thread for {} panicked", self.name);
            }
        }
    }
}
