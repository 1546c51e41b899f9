use std::time::Duration;

use log::*;

use super::{
    ETP_ENABLE_ABS, ETP_RETRY_COUNT, ETP_SMBUS_ENABLE_TP, ETP_SMBUS_HELLOPACKET_BYTE,
    ETP_SMBUS_HELLOPACKET_CMD, ETP_SMBUS_HELLOPACKET_LEN, ETP_SMBUS_IAP_CMD, ElanError,
    ElanResult,
};
use crate::clock::Clock;
use crate::smbus::{SmbusTransport, TransportResult};

/// Progress of the device handshake
#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
pub enum BringUpState {
    Uninitialized,
    /// Hello packet has been read
    HandshakeSent,
    /// Hello matched and the enable command was accepted
    Enabled,
    /// Device reports absolute multi-touch data
    AbsoluteModeSet,
    Failed(ElanError),
}

/// Timing of the bounded bring-up retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before the first attempt, the device is not electrically ready
    /// right after power-on
    pub settle: Duration,
    /// Wait between failed attempts
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(3000),
            interval: Duration::from_millis(100),
            attempts: ETP_RETRY_COUNT,
        }
    }
}

/// Writes the 4-byte mode block through the IAP command
pub fn set_mode(bus: &mut impl SmbusTransport, mode: u8) -> TransportResult<()> {
    bus.write_block(ETP_SMBUS_IAP_CMD, &[0x00, 0x07, 0x00, mode])
}

/// Device bring-up state machine
pub struct BringUp {
    state: BringUpState,
    policy: RetryPolicy,
}

impl BringUp {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: BringUpState::Uninitialized,
            policy,
        }
    }

    pub fn state(&self) -> &BringUpState {
        &self.state
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_ready(&self) -> bool {
        self.state == BringUpState::AbsoluteModeSet
    }

    /// Runs the handshake once, from scratch.
    pub fn initialize(&mut self, bus: &mut impl SmbusTransport) -> ElanResult<()> {
        self.state = BringUpState::Uninitialized;
        let result = self.handshake(bus);
        if let Err(e) = &result {
            self.state = BringUpState::Failed(e.clone());
        }
        result
    }

    fn handshake(&mut self, bus: &mut impl SmbusTransport) -> ElanResult<()> {
        let hello = bus.read_block(ETP_SMBUS_HELLOPACKET_CMD)?;
        if hello.len() != ETP_SMBUS_HELLOPACKET_LEN {
            debug!("hello packet length fail: {}", hello.len());
            return Err(ElanError::ProtocolMismatch { len: hello.len() });
        }
        self.state = BringUpState::HandshakeSent;

        if hello.iter().any(|&b| b != ETP_SMBUS_HELLOPACKET_BYTE) {
            let mut packet = [0; ETP_SMBUS_HELLOPACKET_LEN];
            packet.copy_from_slice(&hello);
            debug!("hello packet fail {:02X?}", packet);
            return Err(ElanError::HandshakeFailed { hello: packet });
        }

        bus.write_byte(ETP_SMBUS_ENABLE_TP).inspect_err(|e| {
            debug!("failed to enable touchpad: {}", e);
        })?;
        self.state = BringUpState::Enabled;

        set_mode(bus, ETP_ENABLE_ABS).map_err(ElanError::ModeSetFailed)?;
        self.state = BringUpState::AbsoluteModeSet;

        debug!("touchpad in absolute mode");
        Ok(())
    }

    /// Waits for the device to settle, then attempts the handshake up to
    /// the configured number of times, pausing after each failed attempt.
    /// Returns the last error if every attempt failed.
    pub fn try_initialize(
        &mut self,
        bus: &mut impl SmbusTransport,
        clock: &impl Clock,
    ) -> ElanResult<()> {
        let attempts = self.policy.attempts.max(1);
        clock.sleep(self.policy.settle);

        let mut attempt = 1;
        loop {
            match self.initialize(bus) {
                Ok(()) => {
                    info!("touchpad initialized (attempt {}/{})", attempt, attempts);
                    return Ok(());
                }
                Err(e) => {
                    clock.sleep(self.policy.interval);
                    if attempt >= attempts {
                        error!("touchpad initialization failed: {}", e);
                        return Err(e);
                    }
                    warn!(
                        "touchpad initialization attempt {}/{} failed: {}",
                        attempt, attempts, e
                    );
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, NS_PER_MS};
    use crate::smbus::TransportError;
    use crate::smbus::testbus::{Access, Testbus};

    const HELLO: [u8; 5] = [0x55; 5];

    fn ready_bus() -> Testbus {
        let mut b = Testbus::new();
        b.set_read(ETP_SMBUS_HELLOPACKET_CMD, &HELLO);
        b
    }

    #[test]
    fn handshake_sequence() {
        let mut b = ready_bus();
        let mut bu = BringUp::new(RetryPolicy::default());

        bu.initialize(&mut b).unwrap();
        assert!(bu.is_ready());

        let trace = b.get_trace();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace[0].access, Access::ReadBlock);
        assert_eq!(trace[0].command, 0xA7);
        assert_eq!(trace[1].access, Access::WriteByte);
        assert_eq!(trace[1].command, 0x20);
        assert_eq!(trace[2].access, Access::WriteBlock);
        assert_eq!(trace[2].command, 0x00);
        assert_eq!(trace[2].data, vec![0x00, 0x07, 0x00, 0x01]);
    }

    #[test]
    fn hello_single_byte_mismatch() {
        for i in 0..HELLO.len() {
            for bad in [0x00, 0x54, 0x56, 0xFF] {
                let mut hello = HELLO;
                hello[i] = bad;

                let mut b = Testbus::new();
                b.queue_read(ETP_SMBUS_HELLOPACKET_CMD, &hello);
                let mut bu = BringUp::new(RetryPolicy::default());

                assert_eq!(
                    bu.initialize(&mut b),
                    Err(ElanError::HandshakeFailed { hello })
                );
                // Enable step never reached
                assert_eq!(b.count(Access::WriteByte, ETP_SMBUS_ENABLE_TP), 0);
                assert!(matches!(bu.state(), BringUpState::Failed(_)));
            }
        }
    }

    #[test]
    fn hello_wrong_length() {
        let mut b = Testbus::new();
        b.queue_read(ETP_SMBUS_HELLOPACKET_CMD, &[0x55; 4]);
        let mut bu = BringUp::new(RetryPolicy::default());

        assert_eq!(
            bu.initialize(&mut b),
            Err(ElanError::ProtocolMismatch { len: 4 })
        );
    }

    #[test]
    fn hello_read_error() {
        let mut b = Testbus::new();
        b.queue_read_error(ETP_SMBUS_HELLOPACKET_CMD, TransportError::Status(-121));
        let mut bu = BringUp::new(RetryPolicy::default());

        assert_eq!(
            bu.initialize(&mut b),
            Err(ElanError::Transport(TransportError::Status(-121)))
        );
    }

    #[test]
    fn enable_failure() {
        let mut b = ready_bus();
        b.fail_next_write(ETP_SMBUS_ENABLE_TP, TransportError::Nak);
        let mut bu = BringUp::new(RetryPolicy::default());

        assert_eq!(
            bu.initialize(&mut b),
            Err(ElanError::Transport(TransportError::Nak))
        );
        assert_eq!(b.count(Access::WriteBlock, ETP_SMBUS_IAP_CMD), 0);
    }

    #[test]
    fn mode_set_failure() {
        let mut b = ready_bus();
        b.fail_next_write(ETP_SMBUS_IAP_CMD, TransportError::Timeout);
        let mut bu = BringUp::new(RetryPolicy::default());

        assert_eq!(
            bu.initialize(&mut b),
            Err(ElanError::ModeSetFailed(TransportError::Timeout))
        );
        assert_eq!(
            bu.state(),
            &BringUpState::Failed(ElanError::ModeSetFailed(TransportError::Timeout))
        );
    }

    #[test]
    fn retry_until_ready() {
        let mut b = ready_bus();
        b.queue_read_error(ETP_SMBUS_HELLOPACKET_CMD, TransportError::Nak);
        b.queue_read(ETP_SMBUS_HELLOPACKET_CMD, &[0x00; 5]);
        let clock = ManualClock::new(0);
        let mut bu = BringUp::new(RetryPolicy::default());

        bu.try_initialize(&mut b, &clock).unwrap();

        assert!(bu.is_ready());
        assert_eq!(b.count(Access::ReadBlock, ETP_SMBUS_HELLOPACKET_CMD), 3);
        // Settle delay plus two retry intervals
        assert_eq!(clock.now_ns(), (3000 + 2 * 100) * NS_PER_MS);
    }

    #[test]
    fn retry_exhausted() {
        let mut b = Testbus::new();
        for _ in 0..4 {
            b.queue_read_error(ETP_SMBUS_HELLOPACKET_CMD, TransportError::Nak);
        }
        b.queue_read(ETP_SMBUS_HELLOPACKET_CMD, &[0x55; 2]);
        let clock = ManualClock::new(0);
        let mut bu = BringUp::new(RetryPolicy::default());

        // Last error wins
        assert_eq!(
            bu.try_initialize(&mut b, &clock),
            Err(ElanError::ProtocolMismatch { len: 2 })
        );
        assert_eq!(b.count(Access::ReadBlock, ETP_SMBUS_HELLOPACKET_CMD), 5);
        // Pauses after the final failure too
        assert_eq!(clock.now_ns(), (3000 + 5 * 100) * NS_PER_MS);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut b = ready_bus();
        let clock = ManualClock::new(0);
        let mut bu = BringUp::new(RetryPolicy {
            settle: Duration::ZERO,
            interval: Duration::ZERO,
            attempts: 0,
        });

        bu.try_initialize(&mut b, &clock).unwrap();
        assert_eq!(b.count(Access::ReadBlock, ETP_SMBUS_HELLOPACKET_CMD), 1);
    }
}
