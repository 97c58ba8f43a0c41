//! Signal-driven kill switch, grounded on the teacher's
//! `bog-core/src/resilience/kill_switch.rs` AtomicU8 state machine and its
//! SIGTERM/SIGUSR1/SIGUSR2 signal choice. Unlike the teacher's version —
//! whose spawned threads `park_timeout` for a fixed duration and never
//! actually wait on the registered flag — this polls the flags
//! `signal_hook::flag::register` sets, so a signal takes effect within one
//! poll tick instead of only after the park timeout elapses.
//!
//! Lives in `bog-bins` rather than `bog-core` because it reads real process
//! signals, an adapter-layer concern the pure decision crate never touches.

use bog_core::fsm::OperatorOverride;
use bog_core::orchestrator::OperatorOverrideCell;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KillSwitchState {
    Running = 0,
    Paused = 1,
    ShuttingDown = 2,
    EmergencyStop = 3,
}

impl From<u8> for KillSwitchState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Paused,
            2 => Self::ShuttingDown,
            3 => Self::EmergencyStop,
            _ => Self::Running,
        }
    }
}

/// Owns the three signal flags and mirrors their effect into the
/// orchestrator's kill switch ([`Arc<AtomicBool>`]) and operator override
/// cell. `install` spawns one polling thread; the kill switch itself is
/// cheap to clone (two `Arc`s) for any other consumer that wants to read
/// `state()`.
#[derive(Clone)]
pub struct KillSwitch {
    state: Arc<AtomicU8>,
    sigterm: Arc<AtomicBool>,
    sigusr1: Arc<AtomicBool>,
    sigusr2: Arc<AtomicBool>,
}

impl KillSwitch {
    pub fn state(&self) -> KillSwitchState {
        KillSwitchState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn should_stop(&self) -> bool {
        matches!(
            self.state(),
            KillSwitchState::ShuttingDown | KillSwitchState::EmergencyStop
        )
    }

    /// Registers SIGTERM (graceful shutdown), SIGUSR1 (emergency halt), and
    /// SIGUSR2 (pause/resume toggle), wires them into `orchestrator_kill`
    /// and `operator_override`, and spawns the polling thread.
    pub fn install(
        orchestrator_kill: Arc<AtomicBool>,
        operator_override: Arc<OperatorOverrideCell>,
    ) -> anyhow::Result<Self> {
        let sigterm = Arc::new(AtomicBool::new(false));
        let sigusr1 = Arc::new(AtomicBool::new(false));
        let sigusr2 = Arc::new(AtomicBool::new(false));

        signal_hook::flag::register(signal_hook::consts::SIGTERM, sigterm.clone())?;
        signal_hook::flag::register(signal_hook::consts::SIGUSR1, sigusr1.clone())?;
        signal_hook::flag::register(signal_hook::consts::SIGUSR2, sigusr2.clone())?;

        let switch = Self {
            state: Arc::new(AtomicU8::new(KillSwitchState::Running as u8)),
            sigterm,
            sigusr1,
            sigusr2,
        };

        info!("kill switch installed (SIGTERM=shutdown, SIGUSR1=emergency, SIGUSR2=pause/resume)");

        let poller = switch.clone();
        thread::spawn(move || poller.poll_loop(orchestrator_kill, operator_override));

        Ok(switch)
    }

    fn poll_loop(&self, orchestrator_kill: Arc<AtomicBool>, operator_override: Arc<OperatorOverrideCell>) {
        loop {
            if self.sigterm.swap(false, Ordering::SeqCst) {
                warn!("SIGTERM received, shutting down gracefully");
                self.state.store(KillSwitchState::ShuttingDown as u8, Ordering::SeqCst);
                orchestrator_kill.store(true, Ordering::SeqCst);
                operator_override.set(Some(OperatorOverride::Emergency));
                return;
            }
            if self.sigusr1.swap(false, Ordering::SeqCst) {
                warn!("SIGUSR1 received, emergency stop");
                self.state.store(KillSwitchState::EmergencyStop as u8, Ordering::SeqCst);
                orchestrator_kill.store(true, Ordering::SeqCst);
                operator_override.set(Some(OperatorOverride::Emergency));
                return;
            }
            if self.sigusr2.swap(false, Ordering::SeqCst) {
                let next = if self.state() == KillSwitchState::Paused {
                    info!("SIGUSR2 received, resuming");
                    operator_override.set(None);
                    KillSwitchState::Running
                } else {
                    info!("SIGUSR2 received, pausing");
                    operator_override.set(Some(OperatorOverride::Pause));
                    KillSwitchState::Paused
                };
                self.state.store(next as u8, Ordering::SeqCst);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
