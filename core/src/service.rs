//! Dispatch thread owning the driver.
//!
//! Host signals arrive as [`DriverCommand`]s on an unbounded channel and
//! are handled strictly in order on a single thread, so the driver needs no
//! locking and senders never block. Wake-up bring-up, with its settle delay
//! and retries, runs on a separate init thread so it does not hold up
//! unrelated signals.

use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, SendError, Sender};
use log::*;

use crate::clock::{Clock, Timestamp};
use crate::driver::{ElanTouchpad, WakeJob};
use crate::elan::PowerState;
use crate::smbus::SmbusTransport;

pub type DriverCommandSender = Sender<DriverCommand>;
pub type DriverCommandReceiver = Receiver<DriverCommand>;

/// A signal from the host to the driver
#[derive(Debug)]
pub enum DriverCommand {
    /// Device raised host-notify, a report is pending
    HostNotify,
    /// Keystroke at the given time
    KeyPressTime(Timestamp),
    /// Keyboard driver toggled the touchpad
    SetTouchStatus(bool),
    /// Query whether the touchpad is enabled
    GetTouchStatus(Sender<bool>),
    SetPowerState(PowerState),
    Quit,
}

/// Handle to a running driver
pub struct DriverService<T, C>
where
    T: SmbusTransport + Send + 'static,
    C: Clock + Clone + 'static,
{
    sender: DriverCommandSender,
    handle: JoinHandle<ElanTouchpad<T, C>>,
}

impl<T, C> DriverService<T, C>
where
    T: SmbusTransport + Send + 'static,
    C: Clock + Clone + 'static,
{
    /// Moves the driver onto its own thread and brings the device up there.
    ///
    /// Returns once bring-up finished. If it failed, the thread is gone and
    /// the error is returned.
    pub fn spawn(driver: ElanTouchpad<T, C>) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let (ready_s, ready_r) = crossbeam_channel::bounded(1);

        let handle = thread::Builder::new()
            .name("elantp".to_string())
            .spawn(move || {
                let mut driver = driver;
                let started = driver.start();
                let ok = started.is_ok();
                if ready_s.send(started).is_err() || !ok {
                    return driver;
                }
                run(&mut driver, &receiver);
                driver
            })
            .context("Cannot spawn driver thread")?;

        match ready_r.recv() {
            Ok(Ok(())) => Ok(Self { sender, handle }),
            Ok(Err(e)) => {
                if handle.join().is_err() {
                    error!("driver thread panicked");
                }
                Err(e).context("Touchpad bring-up failed")
            }
            Err(_) => bail!("Driver thread terminated during bring-up"),
        }
    }

    pub fn create_cmd_sender(&self) -> DriverCommandSender {
        self.sender.clone()
    }

    pub fn send(&self, cmd: DriverCommand) -> Result<()> {
        self.sender
            .send(cmd)
            .map_err(|_| anyhow!("Driver thread is not running"))
    }

    /// Asks the driver whether the touchpad is enabled
    pub fn touch_status(&self) -> Result<bool> {
        let (s, r) = crossbeam_channel::bounded(1);
        self.send(DriverCommand::GetTouchStatus(s))?;
        r.recv().context("Driver thread did not answer")
    }

    /// Stops the dispatch thread and hands the driver back. A wake-up in
    /// progress is waited for.
    pub fn shutdown(self) -> Result<ElanTouchpad<T, C>> {
        // Thread may already be gone if every sender was dropped
        let _ = self.sender.send(DriverCommand::Quit);
        self.handle
            .join()
            .map_err(|_| anyhow!("Driver thread panicked"))
    }
}

/// Runs wake-up bring-ups handed over by the dispatch thread
fn init_worker<T: SmbusTransport, C: Clock>(
    jobs: &Receiver<WakeJob<T>>,
    done: &Sender<WakeJob<T>>,
    clock: &C,
) {
    while let Ok(mut job) = jobs.recv() {
        if let Err(e) = job.run(clock) {
            error!("failed to wake touchpad: {}", e);
        }
        if done.send(job).is_err() {
            break;
        }
    }
}

/// Command loop, until `Quit` or all senders are dropped
fn run<T, C>(driver: &mut ElanTouchpad<T, C>, commands: &DriverCommandReceiver)
where
    T: SmbusTransport + Send + 'static,
    C: Clock + Clone + 'static,
{
    let (job_s, job_r) = crossbeam_channel::unbounded();
    let (done_s, done_r) = crossbeam_channel::unbounded();
    let clock = driver.clock().clone();
    let worker = thread::Builder::new()
        .name("elantp-init".to_string())
        .spawn(move || init_worker(&job_r, &done_s, &clock))
        .inspect_err(|e| error!("cannot spawn init thread: {}", e))
        .ok();

    let never = crossbeam_channel::never();
    let mut worker_alive = worker.is_some();
    loop {
        let done = if worker_alive { &done_r } else { &never };
        crossbeam_channel::select! {
            recv(commands) -> cmd => match cmd {
                Ok(cmd) => {
                    if !dispatch(driver, cmd, &job_s) {
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(done) -> job => match job {
                Ok(job) => driver.finish_wake(job),
                Err(_) => {
                    error!("init thread terminated");
                    worker_alive = false;
                }
            },
        }
    }

    if driver.is_waking() && worker_alive {
        debug!("waiting for wake-up to finish");
        match done_r.recv() {
            Ok(job) => driver.finish_wake(job),
            Err(_) => error!("init thread terminated"),
        }
    }
    drop(job_s);
    if let Some(worker) = worker {
        if worker.join().is_err() {
            error!("init thread panicked");
        }
    }
    driver.stop();
}

/// Handles one command. Returns `false` once the loop should end.
fn dispatch<T: SmbusTransport, C: Clock>(
    driver: &mut ElanTouchpad<T, C>,
    cmd: DriverCommand,
    jobs: &Sender<WakeJob<T>>,
) -> bool {
    match cmd {
        DriverCommand::HostNotify => {
            if driver.is_waking() {
                trace!("touchpad waking up, report ignored");
                return true;
            }
            match driver.handle_host_notify() {
                Ok(_) => (),
                Err(e) if e.is_bad_frame() => trace!("report dropped: {}", e),
                Err(e) => warn!("report lost: {}", e),
            }
        }
        DriverCommand::KeyPressTime(ts) => driver.on_keyboard_activity(ts),
        DriverCommand::SetTouchStatus(enabled) => {
            driver.set_touchpad_enabled(enabled);
        }
        DriverCommand::GetTouchStatus(reply) => {
            let _ = reply.send(driver.touchpad_enabled());
        }
        DriverCommand::SetPowerState(PowerState::Awake) => {
            let Some(job) = driver.begin_wake() else {
                return true;
            };
            if let Err(SendError(mut job)) = jobs.send(job) {
                warn!("no init thread, waking touchpad inline");
                if let Err(e) = job.run(driver.clock()) {
                    error!("failed to wake touchpad: {}", e);
                }
                driver.finish_wake(job);
            }
        }
        DriverCommand::SetPowerState(state) => {
            driver.set_power_state(state);
        }
        DriverCommand::Quit => {
            info!("driver terminating");
            return false;
        }
    }
    true
}
