use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::constants::WORKER_POLL_MS;
use super::data_handler::ShotDataHandler;
use super::error::ShotError;
use super::status_monitor::EventFlag;
use super::uut::Uut;

/// Upper bounds on the two waits of a shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotTimeouts {
    /// From `prep_shot` until every UUT reports armed
    pub arm: Duration,
    /// From `prep_shot` until every UUT reports stopped
    pub shot: Duration,
}

impl Default for ShotTimeouts {
    fn default() -> Self {
        Self {
            arm: Duration::from_secs(10),
            shot: Duration::from_secs(60),
        }
    }
}

/// The shot counter of one UUT after a completed shot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShotReport {
    pub uut: String,
    pub shot: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Done,
    TimedOut,
    Cancelled,
}

/// A background wait on one UUT event
#[derive(Debug)]
struct Waiter {
    uut: String,
    handle: JoinHandle<WaitOutcome>,
}

impl Waiter {
    fn spawn(uut: &str, flag: EventFlag, timeout: Duration, cancel: Arc<AtomicBool>) -> Self {
        // A timeout too large for the clock means no deadline
        let deadline = Instant::now().checked_add(timeout);
        let poll = Duration::from_millis(WORKER_POLL_MS);
        let handle = std::thread::spawn(move || loop {
            let slice = Instant::now() + poll;
            let until = deadline.map_or(slice, |d| d.min(slice));
            if flag.wait_until(until) {
                return WaitOutcome::Done;
            }
            if cancel.load(Ordering::Acquire) {
                return WaitOutcome::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return WaitOutcome::TimedOut;
            }
        });
        Self {
            uut: uut.to_string(),
            handle,
        }
    }
}

/// Coordinates arm, trigger and completion of a shot across a set of UUTs.
///
/// Each shot spawns one waiter per UUT for `armed` and one for `stopped`. The controller
/// owns its waiters: every wait is bounded by [`ShotTimeouts`], a failed shot cancels the
/// waiters still outstanding, and all of them are joined before the shot returns or the
/// controller is dropped.
///
/// A waiter set is `None` until [`ShotController::prep_shot`] creates it and again once it
/// has been joined, so a wait with nothing outstanding is an error rather than a no-op.
pub struct ShotController {
    uuts: Vec<Arc<dyn Uut>>,
    timeouts: ShotTimeouts,
    armed_waiters: Option<Vec<Waiter>>,
    stopped_waiters: Option<Vec<Waiter>>,
    cancel: Arc<AtomicBool>,
}

impl ShotController {
    /// Create a controller. Resets the shot counter of every UUT to 0
    pub fn new(uuts: Vec<Arc<dyn Uut>>, timeouts: ShotTimeouts) -> Result<Self, ShotError> {
        for uut in uuts.iter() {
            uut.reset_shot()?;
        }
        Ok(Self {
            uuts,
            timeouts,
            armed_waiters: None,
            stopped_waiters: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Clear the shot events of every UUT and start the waiters for this shot
    pub fn prep_shot(&mut self) {
        self.abort();
        self.cancel = Arc::new(AtomicBool::new(false));
        for uut in self.uuts.iter() {
            uut.statmon().stopped.clear();
            uut.statmon().armed.clear();
        }
        let stopped: Vec<Waiter> = self
            .uuts
            .iter()
            .map(|uut| {
                Waiter::spawn(
                    uut.name(),
                    uut.statmon().stopped.clone(),
                    self.timeouts.shot,
                    self.cancel.clone(),
                )
            })
            .collect();
        let armed: Vec<Waiter> = self
            .uuts
            .iter()
            .map(|uut| {
                Waiter::spawn(
                    uut.name(),
                    uut.statmon().armed.clone(),
                    self.timeouts.arm,
                    self.cancel.clone(),
                )
            })
            .collect();
        self.stopped_waiters = Some(stopped);
        self.armed_waiters = Some(armed);
    }

    /// Block until every UUT has reported armed
    pub fn wait_armed(&mut self) -> Result<(), ShotError> {
        let Some(waiters) = self.armed_waiters.take() else {
            return Err(ShotError::NotPrepared(String::from("armed")));
        };
        let result = join_waiters(waiters)
            .map_err(|pending| ShotError::ArmTimeout { pending })
            .and_then(|r| r);
        if result.is_err() {
            self.abort();
        }
        result
    }

    /// Block until every UUT has reported stopped
    pub fn wait_complete(&mut self) -> Result<(), ShotError> {
        let Some(waiters) = self.stopped_waiters.take() else {
            return Err(ShotError::NotPrepared(String::from("stopped")));
        };
        let result = join_waiters(waiters)
            .map_err(|pending| ShotError::StopTimeout { pending })
            .and_then(|r| r);
        if result.is_err() {
            self.abort();
        }
        result
    }

    /// Arm every UUT, then block until all of them report armed.
    ///
    /// Preps the shot first if no armed waiters are outstanding.
    pub fn arm_shot(&mut self) -> Result<(), ShotError> {
        if self.armed_waiters.is_none() {
            self.prep_shot();
        }
        if let Err(e) = self.uuts.iter().try_for_each(|uut| uut.set_arm()) {
            self.abort();
            return Err(ShotError::UutError(e));
        }
        self.wait_armed()
    }

    /// Report the shot counter of every UUT
    pub fn on_shot_complete(&self) -> Result<Vec<ShotReport>, ShotError> {
        let mut reports = Vec::with_capacity(self.uuts.len());
        for uut in self.uuts.iter() {
            let shot = uut.shot()?;
            log::info!("{} SHOT COMPLETE shot: {}", uut.name(), shot);
            reports.push(ShotReport {
                uut: uut.name().to_string(),
                shot,
            });
        }
        Ok(reports)
    }

    /// Run one full shot: prep, arm, optionally soft trigger the first UUT, wait for every
    /// UUT to stop and report the shot counters
    pub fn run_shot(&mut self, soft_trigger: bool) -> Result<Vec<ShotReport>, ShotError> {
        self.prep_shot();
        self.arm_shot()?;
        if soft_trigger {
            let triggered = match self.uuts.first() {
                Some(first) => first.soft_trigger(),
                None => Ok(()),
            };
            if let Err(e) = triggered {
                self.abort();
                return Err(ShotError::UutError(e));
            }
        }
        self.wait_complete()?;
        self.on_shot_complete()
    }

    /// Run one shot and hand each UUT's data to `handler`
    pub fn run_shot_with_handler(
        &mut self,
        soft_trigger: bool,
        handler: &mut dyn ShotDataHandler,
    ) -> Result<Vec<ShotReport>, ShotError> {
        let reports = self.run_shot(soft_trigger)?;
        for (uut, report) in self.uuts.iter().zip(reports.iter()) {
            handler.handle_data(uut.as_ref(), report.shot)?;
        }
        Ok(reports)
    }

    /// Cancel and join any waiters still outstanding
    fn abort(&mut self) {
        self.cancel.store(true, Ordering::Release);
        let waiters: Vec<Waiter> = self
            .armed_waiters
            .take()
            .into_iter()
            .chain(self.stopped_waiters.take())
            .flatten()
            .collect();
        for waiter in waiters {
            if waiter.handle.join().is_err() {
                log::error!("Shot waiter for {} panicked", waiter.uut);
            }
        }
    }
}

impl Drop for ShotController {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Join every waiter. The outer error lists the UUTs that timed out; the inner error is
/// a cancellation or a panicked waiter
fn join_waiters(waiters: Vec<Waiter>) -> Result<Result<(), ShotError>, Vec<String>> {
    let mut pending: Vec<String> = Vec::new();
    let mut failure: Option<ShotError> = None;
    for waiter in waiters {
        match waiter.handle.join() {
            Ok(WaitOutcome::Done) => (),
            Ok(WaitOutcome::TimedOut) => pending.push(waiter.uut),
            Ok(WaitOutcome::Cancelled) => {
                failure.get_or_insert(ShotError::Cancelled(waiter.uut));
            }
            Err(_) => {
                failure.get_or_insert(ShotError::WorkerPanicked(waiter.uut));
            }
        }
    }
    if !pending.is_empty() {
        log::error!("UUTs still pending at timeout: {pending:?}");
        return Err(pending);
    }
    Ok(match failure {
        Some(e) => Err(e),
        None => Ok(()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UutError;
    use crate::status_monitor::{StatusMonitor, UutState};
    use ndarray::Array2;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicU64;

    type EventLog = Arc<Mutex<Vec<String>>>;

    /// Arms after `arm_delay` then stops `run_time` later without needing a trigger
    struct MockUut {
        name: String,
        arm_delay: Option<Duration>,
        run_time: Duration,
        statmon: StatusMonitor,
        shot: Arc<AtomicU64>,
        soft_triggers: AtomicU64,
        log: EventLog,
    }

    impl MockUut {
        fn new(name: &str, arm_ms: Option<u64>, run_ms: u64, log: &EventLog) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                arm_delay: arm_ms.map(Duration::from_millis),
                run_time: Duration::from_millis(run_ms),
                statmon: StatusMonitor::new(),
                shot: Arc::new(AtomicU64::new(7)),
                soft_triggers: AtomicU64::new(0),
                log: log.clone(),
            })
        }
    }

    impl Uut for MockUut {
        fn name(&self) -> &str {
            &self.name
        }

        fn set_arm(&self) -> Result<(), UutError> {
            self.log.lock().push(format!("arm:{}", self.name));
            let Some(arm_delay) = self.arm_delay else {
                return Ok(());
            };
            let run_time = self.run_time;
            let statmon = self.statmon.clone();
            let shot = self.shot.clone();
            let log = self.log.clone();
            let name = self.name.clone();
            std::thread::spawn(move || {
                statmon.observe(UutState::Arming);
                std::thread::sleep(arm_delay);
                log.lock().push(format!("armed:{name}"));
                statmon.observe(UutState::Armed);
                std::thread::sleep(run_time);
                statmon.observe(UutState::Running);
                shot.fetch_add(1, Ordering::SeqCst);
                log.lock().push(format!("stopped:{name}"));
                statmon.observe(UutState::Stopped);
            });
            Ok(())
        }

        fn soft_trigger(&self) -> Result<(), UutError> {
            self.soft_triggers.fetch_add(1, Ordering::SeqCst);
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
            Err(UutError::NoData(self.name.clone()))
        }
    }

    fn as_uuts(mocks: &[Arc<MockUut>]) -> Vec<Arc<dyn Uut>> {
        mocks
            .iter()
            .map(|m| m.clone() as Arc<dyn Uut>)
            .collect()
    }

    #[test]
    fn test_new_resets_shot_counters() {
        let log = EventLog::default();
        let mocks = vec![MockUut::new("a", Some(1), 1, &log)];
        let _controller = ShotController::new(as_uuts(&mocks), ShotTimeouts::default()).unwrap();
        assert_eq!(mocks[0].shot().unwrap(), 0);
    }

    #[test]
    fn test_run_shot_orders_arm_before_stop() {
        let log = EventLog::default();
        let mocks = vec![
            MockUut::new("uut1", Some(30), 80, &log),
            MockUut::new("uut2", Some(5), 120, &log),
            MockUut::new("uut3", Some(15), 60, &log),
        ];
        let mut controller =
            ShotController::new(as_uuts(&mocks), ShotTimeouts::default()).unwrap();
        let reports = controller.run_shot(false).unwrap();

        let events = log.lock().clone();
        let last_arm = events
            .iter()
            .rposition(|e| e.starts_with("arm:"))
            .unwrap();
        let first_stop = events
            .iter()
            .position(|e| e.starts_with("stopped:"))
            .unwrap();
        assert!(last_arm < first_stop);
        assert_eq!(events.iter().filter(|e| e.starts_with("stopped:")).count(), 3);

        for mock in mocks.iter() {
            assert!(mock.statmon().stopped.is_set());
        }
        assert_eq!(
            reports,
            vec![
                ShotReport {
                    uut: String::from("uut1"),
                    shot: 1
                },
                ShotReport {
                    uut: String::from("uut2"),
                    shot: 1
                },
                ShotReport {
                    uut: String::from("uut3"),
                    shot: 1
                },
            ]
        );
    }

    #[test]
    fn test_arm_shot_waits_for_every_uut() {
        for n in 1..6u64 {
            let log = EventLog::default();
            // Later UUTs arm first
            let mocks: Vec<Arc<MockUut>> = (0..n)
                .map(|i| MockUut::new(&format!("uut{i}"), Some(5 * (n - i)), 200, &log))
                .collect();
            let mut controller =
                ShotController::new(as_uuts(&mocks), ShotTimeouts::default()).unwrap();
            controller.prep_shot();
            controller.arm_shot().unwrap();
            for mock in mocks.iter() {
                assert!(mock.statmon().armed.is_set());
            }
            let armed = log
                .lock()
                .iter()
                .filter(|e| e.starts_with("armed:"))
                .count();
            assert_eq!(armed as u64, n);
            controller.wait_complete().unwrap();
        }
    }

    #[test]
    fn test_soft_trigger_goes_to_first_uut_only() {
        let log = EventLog::default();
        let mocks = vec![
            MockUut::new("master", Some(1), 1, &log),
            MockUut::new("slave", Some(1), 1, &log),
        ];
        let mut controller =
            ShotController::new(as_uuts(&mocks), ShotTimeouts::default()).unwrap();
        controller.run_shot(true).unwrap();
        assert_eq!(mocks[0].soft_triggers.load(Ordering::SeqCst), 1);
        assert_eq!(mocks[1].soft_triggers.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_arm_timeout_names_pending_uuts() {
        let log = EventLog::default();
        let mocks = vec![
            MockUut::new("good", Some(1), 1, &log),
            MockUut::new("stuck", None, 1, &log),
        ];
        let timeouts = ShotTimeouts {
            arm: Duration::from_millis(100),
            shot: Duration::from_secs(5),
        };
        let mut controller = ShotController::new(as_uuts(&mocks), timeouts).unwrap();
        let start = Instant::now();
        match controller.run_shot(false) {
            Err(ShotError::ArmTimeout { pending }) => {
                assert_eq!(pending, vec![String::from("stuck")])
            }
            _ => panic!(),
        }
        // The stopped waiter for the stuck UUT was cancelled rather than left to time out
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_stop_timeout() {
        let log = EventLog::default();
        let mocks = vec![MockUut::new("slow", Some(1), 2000, &log)];
        let timeouts = ShotTimeouts {
            arm: Duration::from_secs(5),
            shot: Duration::from_millis(100),
        };
        let mut controller = ShotController::new(as_uuts(&mocks), timeouts).unwrap();
        match controller.run_shot(false) {
            Err(ShotError::StopTimeout { pending }) => {
                assert_eq!(pending, vec![String::from("slow")])
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_arm_shot_without_prep_waits_for_arm() {
        let log = EventLog::default();
        let mocks = vec![MockUut::new("late", Some(300), 1, &log)];
        let mut controller =
            ShotController::new(as_uuts(&mocks), ShotTimeouts::default()).unwrap();
        controller.arm_shot().unwrap();
        assert!(mocks[0].statmon().armed.is_set());
        controller.wait_complete().unwrap();
        assert_eq!(mocks[0].shot().unwrap(), 1);
    }

    #[test]
    fn test_wait_with_nothing_outstanding_is_an_error() {
        let log = EventLog::default();
        let mocks = vec![MockUut::new("uut", Some(1), 1, &log)];
        let mut controller =
            ShotController::new(as_uuts(&mocks), ShotTimeouts::default()).unwrap();
        assert!(matches!(
            controller.wait_armed(),
            Err(ShotError::NotPrepared(_))
        ));
        assert!(matches!(
            controller.wait_complete(),
            Err(ShotError::NotPrepared(_))
        ));

        controller.run_shot(false).unwrap();
        // The shot's waiters were consumed by run_shot
        assert!(matches!(
            controller.wait_complete(),
            Err(ShotError::NotPrepared(_))
        ));
    }

    #[test]
    fn test_unbounded_timeouts() {
        let log = EventLog::default();
        let mocks = vec![MockUut::new("uut", Some(1), 1, &log)];
        let timeouts = ShotTimeouts {
            arm: Duration::MAX,
            shot: Duration::MAX,
        };
        let mut controller = ShotController::new(as_uuts(&mocks), timeouts).unwrap();
        let reports = controller.run_shot(false).unwrap();
        assert_eq!(reports[0].shot, 1);
    }

    #[test]
    fn test_repeated_shots() {
        let log = EventLog::default();
        let mocks = vec![MockUut::new("uut", Some(1), 1, &log)];
        let mut controller =
            ShotController::new(as_uuts(&mocks), ShotTimeouts::default()).unwrap();
        for expected in 1..=3 {
            let reports = controller.run_shot(false).unwrap();
            assert_eq!(reports[0].shot, expected);
        }
    }
}
