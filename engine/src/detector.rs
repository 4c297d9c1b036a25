//! Business-software detection.
//!
//! A background thread polls whether a named process is running and reports
//! *edge transitions* to its sink: `business_software_detected` exactly once
//! when the process appears, `business_software_cleared` exactly once when
//! it disappears. The manager translates these edges into a global
//! pause/resume of all jobs.
//!
//! With no process name configured the poller is inert and never reports
//! running. Configuring a name (re)arms the poll loop; clearing it forces
//! the "not running" state immediately and stops active probing.

use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};
use sysinfo::{ProcessesToUpdate, System};

/// Default interval between process-table polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Answers "is a process with this name running right now?".
///
/// The trait seam keeps detector tests independent of the host's process
/// table.
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, process_name: &str) -> bool;
}

/// Production probe backed by the `sysinfo` process table.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        SysinfoProbe {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SysinfoProbe {
    fn is_running(&self, process_name: &str) -> bool {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::All);
        system
            .processes_by_name(OsStr::new(process_name))
            .next()
            .is_some()
    }
}

/// Receives the detector's edge transitions.
pub trait DetectorSink: Send + Sync {
    fn business_software_detected(&self);
    fn business_software_cleared(&self);
}

struct DetectorShared {
    process_name: Mutex<Option<String>>,
    /// Last level reported to the sink.
    running: Mutex<bool>,
    stop: AtomicBool,
    sink: Weak<dyn DetectorSink>,
}

impl DetectorShared {
    /// Report a level change to the sink, once per transition.
    fn report(&self, now_running: bool) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if *running == now_running {
            return;
        }
        *running = now_running;
        drop(running);

        if let Some(sink) = self.sink.upgrade() {
            if now_running {
                info!("business software detected");
                sink.business_software_detected();
            } else {
                info!("business software no longer detected");
                sink.business_software_cleared();
            }
        }
    }
}

/// Polling thread watching for a named process.
///
/// The detector owns its thread; dropping it (or calling `stop`) shuts the
/// loop down and joins it.
pub struct BusinessSoftwareDetector {
    shared: Arc<DetectorShared>,
    handle: Option<JoinHandle<()>>,
}

impl BusinessSoftwareDetector {
    /// Start the poll loop.
    ///
    /// `process_name` may be `None` to start unconfigured; the loop then
    /// idles until `set_process_name` arms it. The sink is held weakly so
    /// the detector never keeps its owner alive.
    pub fn spawn(
        probe: Arc<dyn ProcessProbe>,
        sink: Weak<dyn DetectorSink>,
        process_name: Option<String>,
        poll_interval: Duration,
    ) -> Self {
        let shared = Arc::new(DetectorShared {
            process_name: Mutex::new(normalize_name(process_name)),
            running: Mutex::new(false),
            stop: AtomicBool::new(false),
            sink,
        });

        let loop_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || poll_loop(loop_shared, probe, poll_interval));

        BusinessSoftwareDetector {
            shared,
            handle: Some(handle),
        }
    }

    /// Replace the monitored process name.
    ///
    /// Clearing the name forces the "not running" edge immediately if one is
    /// owed and leaves the loop idle; setting a name (re)arms probing.
    pub fn set_process_name(&self, name: Option<&str>) {
        let name = normalize_name(name.map(str::to_string));
        *self
            .shared
            .process_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = name.clone();
        if name.is_none() {
            self.shared.report(false);
        }
    }

    /// Last level observed by the poll loop.
    pub fn is_business_running(&self) -> bool {
        *self
            .shared
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Shut the poll loop down and join its thread.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BusinessSoftwareDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn normalize_name(name: Option<String>) -> Option<String> {
    match name {
        Some(name) => {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        None => None,
    }
}

fn poll_loop(shared: Arc<DetectorShared>, probe: Arc<dyn ProcessProbe>, poll_interval: Duration) {
    // Sleep in short slices so stop requests are honored promptly
    const SLICE: Duration = Duration::from_millis(25);

    while !shared.stop.load(Ordering::SeqCst) {
        let name = shared
            .process_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if let Some(name) = name {
            let now_running = probe.is_running(&name);
            debug!("probe '{}': running={}", name, now_running);
            shared.report(now_running);
        }

        let mut slept = Duration::ZERO;
        while slept < poll_interval && !shared.stop.load(Ordering::SeqCst) {
            thread::sleep(SLICE.min(poll_interval - slept));
            slept += SLICE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct ScriptedProbe {
        running: AtomicBool,
    }

    impl ScriptedProbe {
        fn new() -> Arc<Self> {
            Arc::new(ScriptedProbe {
                running: AtomicBool::new(false),
            })
        }

        fn set_running(&self, running: bool) {
            self.running.store(running, Ordering::SeqCst);
        }
    }

    impl ProcessProbe for ScriptedProbe {
        fn is_running(&self, _process_name: &str) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    struct RecordingSink {
        edges: Mutex<Vec<&'static str>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(RecordingSink {
                edges: Mutex::new(Vec::new()),
            })
        }

        fn edges(&self) -> Vec<&'static str> {
            self.edges.lock().unwrap().clone()
        }

        fn wait_for_edges(&self, expected: &[&'static str]) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if self.edges() == expected {
                    return;
                }
                thread::sleep(Duration::from_millis(10));
            }
            panic!("Timed out waiting for edges {:?}, got {:?}", expected, self.edges());
        }
    }

    impl DetectorSink for RecordingSink {
        fn business_software_detected(&self) {
            self.edges.lock().unwrap().push("detected");
        }

        fn business_software_cleared(&self) {
            self.edges.lock().unwrap().push("cleared");
        }
    }

    fn sink_as_weak(sink: &Arc<RecordingSink>) -> Weak<dyn DetectorSink> {
        let sink: Arc<dyn DetectorSink> = Arc::clone(sink) as Arc<dyn DetectorSink>;
        Arc::downgrade(&sink)
    }

    #[test]
    fn test_one_edge_per_transition() {
        let probe = ScriptedProbe::new();
        let sink = RecordingSink::new();
        let detector = BusinessSoftwareDetector::spawn(
            Arc::clone(&probe) as Arc<dyn ProcessProbe>,
            sink_as_weak(&sink),
            Some("business.exe".to_string()),
            Duration::from_millis(10),
        );

        probe.set_running(true);
        sink.wait_for_edges(&["detected"]);
        assert!(detector.is_business_running());

        // Level stays up: no further edge
        thread::sleep(Duration::from_millis(100));
        assert_eq!(sink.edges(), vec!["detected"]);

        probe.set_running(false);
        sink.wait_for_edges(&["detected", "cleared"]);
        assert!(!detector.is_business_running());
    }

    #[test]
    fn test_unconfigured_detector_is_inert() {
        let probe = ScriptedProbe::new();
        probe.set_running(true);
        let sink = RecordingSink::new();
        let _detector = BusinessSoftwareDetector::spawn(
            Arc::clone(&probe) as Arc<dyn ProcessProbe>,
            sink_as_weak(&sink),
            None,
            Duration::from_millis(10),
        );

        thread::sleep(Duration::from_millis(100));
        assert!(sink.edges().is_empty());
    }

    #[test]
    fn test_clearing_name_forces_not_running() {
        let probe = ScriptedProbe::new();
        let sink = RecordingSink::new();
        let detector = BusinessSoftwareDetector::spawn(
            Arc::clone(&probe) as Arc<dyn ProcessProbe>,
            sink_as_weak(&sink),
            Some("business.exe".to_string()),
            Duration::from_millis(10),
        );

        probe.set_running(true);
        sink.wait_for_edges(&["detected"]);

        // Clearing the name emits the owed "cleared" edge without a poll
        detector.set_process_name(None);
        assert_eq!(sink.edges(), vec!["detected", "cleared"]);
        assert!(!detector.is_business_running());

        // With the name gone, the probe's level no longer matters
        thread::sleep(Duration::from_millis(100));
        assert_eq!(sink.edges(), vec!["detected", "cleared"]);
    }

    #[test]
    fn test_setting_name_rearms_probing() {
        let probe = ScriptedProbe::new();
        probe.set_running(true);
        let sink = RecordingSink::new();
        let detector = BusinessSoftwareDetector::spawn(
            Arc::clone(&probe) as Arc<dyn ProcessProbe>,
            sink_as_weak(&sink),
            None,
            Duration::from_millis(10),
        );

        thread::sleep(Duration::from_millis(50));
        assert!(sink.edges().is_empty());

        detector.set_process_name(Some("business.exe"));
        sink.wait_for_edges(&["detected"]);
    }

    #[test]
    fn test_blank_name_is_unconfigured() {
        let probe = ScriptedProbe::new();
        probe.set_running(true);
        let sink = RecordingSink::new();
        let _detector = BusinessSoftwareDetector::spawn(
            Arc::clone(&probe) as Arc<dyn ProcessProbe>,
            sink_as_weak(&sink),
            Some("   ".to_string()),
            Duration::from_millis(10),
        );

        thread::sleep(Duration::from_millis(100));
        assert!(sink.edges().is_empty());
    }
}
