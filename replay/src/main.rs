mod capture;

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::*;

use elantp_core::clock::{Clock, ManualClock, NS_PER_MS};
use elantp_core::config::DriverConfig;
use elantp_core::debuggable::{Debuggable, write_properties};
use elantp_core::driver::ElanTouchpad;
use elantp_core::elan::{ETP_SMBUS_HELLOPACKET_CMD, ETP_SMBUS_PACKET_QUERY, PowerState};
use elantp_core::input::{ChannelSink, ClientRole};
use elantp_core::smbus::testbus::Testbus;

use crate::capture::{CaptureLine, Signal, parse_capture};

/// Replays a touchpad capture through the ELAN driver and prints the
/// resulting input events as JSON lines
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Capture file, one JSON signal per line
    capture: PathBuf,

    /// Driver configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the driver state after the replay
    #[arg(long)]
    state: bool,
}

type ReplayDriver = ElanTouchpad<Testbus, ManualClock>;

/// Runs a capture against a simulated device, writing every emitted event
/// to `out`. Returns the driver for inspection.
fn replay(
    lines: &[CaptureLine],
    config: &DriverConfig,
    out: &mut impl Write,
) -> Result<ReplayDriver> {
    let mut bus = Testbus::new();
    bus.set_read(ETP_SMBUS_HELLOPACKET_CMD, &[0x55; 5]);
    let clock = ManualClock::new(0);

    let mut tp = ElanTouchpad::new(bus, clock.clone(), config);
    tp.start().context("Touchpad bring-up failed")?;
    let base = clock.now_ns();

    let (sink, events) = ChannelSink::unbounded();
    tp.register_client(ClientRole::Touch, sink.clone());
    tp.register_client(ClientRole::Pointer, sink.clone());
    tp.register_client(ClientRole::Scroll, sink);

    for line in lines {
        // Waking up sleeps on the clock, time never runs backwards
        clock.set(clock.now_ns().max(base + line.at_ms * NS_PER_MS));

        match &line.signal {
            Signal::HostNotify { report } => {
                tp.transport_mut()
                    .context("Touchpad is waking up")?
                    .queue_read(ETP_SMBUS_PACKET_QUERY, report);
                match tp.handle_host_notify() {
                    Ok(outcome) => debug!("{} ms: {:?}", line.at_ms, outcome),
                    Err(e) => warn!("{} ms: report dropped: {}", line.at_ms, e),
                }
            }
            Signal::Keyboard => tp.on_keyboard_activity(clock.now_ns()),
            Signal::Enable { enabled } => {
                tp.set_touchpad_enabled(*enabled);
            }
            Signal::Power { awake } => {
                tp.set_power_state(if *awake {
                    PowerState::Awake
                } else {
                    PowerState::Asleep
                });
            }
        }

        while let Ok(ev) = events.try_recv() {
            serde_json::to_writer(&mut *out, &ev)?;
            writeln!(out)?;
        }
    }

    Ok(tp)
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env().init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DriverConfig::from_file(path)?,
        None => DriverConfig::default(),
    };
    let file = File::open(&args.capture)
        .with_context(|| format!("Cannot open capture '{}'", args.capture.display()))?;
    let lines = parse_capture(BufReader::new(file))?;
    info!("Loaded {} signals from '{}'", lines.len(), args.capture.display());

    let mut stdout = std::io::stdout().lock();
    let tp = replay(&lines, &config, &mut stdout)?;

    if args.state {
        let mut s = String::new();
        write_properties(&mut s, &tp.get_debug_properties(), 0)?;
        write!(stdout, "{}", s)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(capture: &str, config: &DriverConfig) -> (ReplayDriver, Vec<serde_json::Value>) {
        let lines = parse_capture(capture.as_bytes()).unwrap();
        let mut out = vec![];
        let tp = replay(&lines, config, &mut out).unwrap();
        let events = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (tp, events)
    }

    /// 32-byte block, zero padded
    fn block(prefix: &str) -> String {
        format!("{:0<64}", prefix)
    }

    #[test]
    fn touch_and_pointer() {
        let capture = format!(
            "{{\"at_ms\": 0, \"signal\": \"host_notify\", \"report\": \"{}\"}}\n\
             {{\"at_ms\": 600, \"signal\": \"host_notify\", \"report\": \"{}\"}}\n",
            block("5e01808006050000"),
            block("5d08006464113200"),
        );
        let (tp, events) = run(&capture, &DriverConfig::default());

        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "pointer");
        assert_eq!(events[0]["dx"], 5);
        assert_eq!(events[0]["buttons"], 1);
        assert_eq!(events[1]["event"], "touch");
        assert_eq!(events[1]["contact_count"], 1);
        assert_eq!(events[1]["contacts"][0]["current"]["x"], 100);
        assert_eq!(events[1]["contacts"][0]["pressure"], 75);
        assert!(tp.is_ready());
    }

    #[test]
    fn keyboard_suppresses() {
        let capture = format!(
            "{{\"at_ms\": 0, \"signal\": \"keyboard\"}}\n\
             {{\"at_ms\": 100, \"signal\": \"host_notify\", \"report\": \"{r}\"}}\n\
             {{\"at_ms\": 600, \"signal\": \"host_notify\", \"report\": \"{r}\"}}\n",
            r = block("5d08006464113200"),
        );
        let (_, events) = run(&capture, &DriverConfig::default());
        assert_eq!(events.len(), 1);

        let config = DriverConfig {
            disable_while_typing: false,
            ..Default::default()
        };
        let (_, events) = run(&capture, &config);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn disabled_and_power() {
        let capture = format!(
            "{{\"at_ms\": 0, \"signal\": \"enable\", \"enabled\": false}}\n\
             {{\"at_ms\": 10, \"signal\": \"host_notify\", \"report\": \"{r}\"}}\n\
             {{\"at_ms\": 20, \"signal\": \"enable\", \"enabled\": true}}\n\
             {{\"at_ms\": 30, \"signal\": \"power\", \"awake\": false}}\n\
             {{\"at_ms\": 40, \"signal\": \"power\", \"awake\": true}}\n\
             {{\"at_ms\": 50, \"signal\": \"host_notify\", \"report\": \"{r}\"}}\n",
            r = block("5d08006464113200"),
        );
        let (tp, events) = run(&capture, &DriverConfig::default());

        assert_eq!(events.len(), 1);
        assert!(tp.touchpad_enabled());
        assert_eq!(tp.power_state(), PowerState::Awake);
    }

    #[test]
    fn bad_report_continues() {
        let capture = format!(
            "{{\"at_ms\": 0, \"signal\": \"host_notify\", \"report\": \"5d00\"}}\n\
             {{\"at_ms\": 10, \"signal\": \"host_notify\", \"report\": \"{}\"}}\n",
            block("5d08006464113200"),
        );
        let (_, events) = run(&capture, &DriverConfig::default());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn state_dump() {
        let (tp, _) = run("", &DriverConfig::default());
        let mut s = String::new();
        write_properties(&mut s, &tp.get_debug_properties(), 0).unwrap();
        assert!(s.contains("Touchpad enabled: true"));
    }
}
