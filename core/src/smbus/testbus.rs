use std::collections::{HashMap, VecDeque};
use std::fmt;

use log::*;

use super::{I2C_SMBUS_BLOCK_MAX, SmbusBlock, SmbusTransport, TransportError, TransportResult};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    ReadBlock,
    WriteByte,
    WriteBlock,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceEntry {
    pub command: u8,
    pub access: Access,
    /// Data read or written
    pub data: Vec<u8>,
}

/// Scripted in-memory SMBus device.
///
/// Block reads are answered from a per-command queue first, then from a
/// per-command standing response. A command with neither is NAKed.
/// Writes always succeed unless a failure was queued for that command.
#[derive(Default)]
pub struct Testbus {
    queued: HashMap<u8, VecDeque<TransportResult<SmbusBlock>>>,
    standing: HashMap<u8, SmbusBlock>,
    write_failures: HashMap<u8, VecDeque<TransportError>>,
    trace: Vec<TraceEntry>,
}

fn to_block(data: &[u8]) -> SmbusBlock {
    assert!(
        data.len() <= I2C_SMBUS_BLOCK_MAX,
        "SMBus block of {} bytes exceeds maximum",
        data.len()
    );
    data.iter().copied().collect()
}

impl Testbus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers the next read of `command` with `data`
    pub fn queue_read(&mut self, command: u8, data: &[u8]) {
        self.queued
            .entry(command)
            .or_default()
            .push_back(Ok(to_block(data)));
    }

    /// Fails the next read of `command`
    pub fn queue_read_error(&mut self, command: u8, err: TransportError) {
        self.queued.entry(command).or_default().push_back(Err(err));
    }

    /// Answers every read of `command` that has no queued response with `data`
    pub fn set_read(&mut self, command: u8, data: &[u8]) {
        self.standing.insert(command, to_block(data));
    }

    /// Fails the next write (byte or block) of `command`
    pub fn fail_next_write(&mut self, command: u8, err: TransportError) {
        self.write_failures
            .entry(command)
            .or_default()
            .push_back(err);
    }

    pub fn reset_trace(&mut self) {
        self.trace.clear();
    }

    pub fn get_trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Number of transfers of the given kind to `command` in the trace
    pub fn count(&self, access: Access, command: u8) -> usize {
        self.trace
            .iter()
            .filter(|e| e.access == access && e.command == command)
            .count()
    }

    fn write_result(&mut self, command: u8) -> TransportResult<()> {
        match self
            .write_failures
            .get_mut(&command)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl SmbusTransport for Testbus {
    fn read_block(&mut self, command: u8) -> TransportResult<SmbusBlock> {
        let result = self
            .queued
            .get_mut(&command)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.standing.get(&command).cloned().map(Ok))
            .unwrap_or(Err(TransportError::Nak));

        trace!("testbus read {:02X}: {:?}", command, result);
        self.trace.push(TraceEntry {
            command,
            access: Access::ReadBlock,
            data: result.as_ref().map(|b| b.to_vec()).unwrap_or_default(),
        });
        result
    }

    fn write_byte(&mut self, command: u8) -> TransportResult<()> {
        self.trace.push(TraceEntry {
            command,
            access: Access::WriteByte,
            data: vec![],
        });
        self.write_result(command)
    }

    fn write_block(&mut self, command: u8, payload: &[u8]) -> TransportResult<()> {
        self.trace.push(TraceEntry {
            command,
            access: Access::WriteBlock,
            data: payload.to_vec(),
        });
        self.write_result(command)
    }
}

impl fmt::Display for Testbus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for e in &self.trace {
            writeln!(f, "{:?} {:02X} {:02X?}", e.access, e.command, e.data)?;
        }
        Ok(())
    }
}
