//! Recording fakes for every robot port.
//!
//! Each mock appends the commands it receives to a shared [`CommandLog`], so
//! a test can hand the ports to a control session and afterwards inspect
//! exactly what was commanded and in which order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use shared::camera_interface::Frame;
use shared::image_size::ImageSize;

use crate::error::{HardwareError, HardwareResult};
use crate::ports::{
    Blaster, Camera, Chassis, ChassisRate, Connection, ConnectionSettings, Gimbal, GimbalRate,
    RobotPorts,
};

/// A command observed by one of the mock ports
#[derive(Debug, Clone, PartialEq)]
pub enum PortCommand {
    Open(ConnectionSettings),
    Close,
    StartStream,
    StopStream,
    Chassis(ChassisRate),
    Gimbal(GimbalRate),
    Fire,
}

/// Shared, ordered record of port commands
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    commands: Arc<Mutex<Vec<PortCommand>>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PortCommand>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, command: PortCommand) {
        self.lock().push(command);
    }

    /// Copy of every command recorded so far
    pub fn snapshot(&self) -> Vec<PortCommand> {
        self.lock().clone()
    }

    pub fn fire_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|c| matches!(c, PortCommand::Fire))
            .count()
    }

    pub fn count_of(&self, command: &PortCommand) -> usize {
        self.lock().iter().filter(|c| *c == command).count()
    }

    pub fn last_chassis(&self) -> Option<ChassisRate> {
        self.lock().iter().rev().find_map(|c| match c {
            PortCommand::Chassis(rate) => Some(*rate),
            _ => None,
        })
    }

    pub fn last_gimbal(&self) -> Option<GimbalRate> {
        self.lock().iter().rev().find_map(|c| match c {
            PortCommand::Gimbal(rate) => Some(*rate),
            _ => None,
        })
    }
}

/// Connection that records open/close and can be told to refuse opening
#[derive(Debug)]
pub struct MockConnection {
    log: CommandLog,
    refuse_open: bool,
}

impl MockConnection {
    pub fn new(log: CommandLog) -> Self {
        Self {
            log,
            refuse_open: false,
        }
    }

    pub fn refusing(log: CommandLog) -> Self {
        Self {
            log,
            refuse_open: true,
        }
    }
}

impl Connection for MockConnection {
    fn open(&mut self, settings: &ConnectionSettings) -> HardwareResult<()> {
        self.log.push(PortCommand::Open(*settings));
        if self.refuse_open {
            return Err(HardwareError::ConnectionFailed(
                "robot unreachable".to_string(),
            ));
        }
        Ok(())
    }

    fn close(&mut self) -> HardwareResult<()> {
        self.log.push(PortCommand::Close);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockChassis {
    log: CommandLog,
}

impl MockChassis {
    pub fn new(log: CommandLog) -> Self {
        Self { log }
    }
}

impl Chassis for MockChassis {
    fn drive(&mut self, rate: ChassisRate) -> HardwareResult<()> {
        self.log.push(PortCommand::Chassis(rate));
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockGimbal {
    log: CommandLog,
}

impl MockGimbal {
    pub fn new(log: CommandLog) -> Self {
        Self { log }
    }
}

impl Gimbal for MockGimbal {
    fn drive(&mut self, rate: GimbalRate) -> HardwareResult<()> {
        self.log.push(PortCommand::Gimbal(rate));
        Ok(())
    }
}

/// Blaster that records every trigger pull, optionally failing each one
#[derive(Debug)]
pub struct MockBlaster {
    log: CommandLog,
    jammed: bool,
}

impl MockBlaster {
    pub fn new(log: CommandLog) -> Self {
        Self { log, jammed: false }
    }

    pub fn jammed(log: CommandLog) -> Self {
        Self { log, jammed: true }
    }
}

impl Blaster for MockBlaster {
    fn fire(&mut self) -> HardwareResult<()> {
        self.log.push(PortCommand::Fire);
        if self.jammed {
            return Err(HardwareError::CommandRejected("blaster jammed".to_string()));
        }
        Ok(())
    }
}

/// Scripted outcome of one `read_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockRead {
    /// Deliver a blank frame
    Frame,
    /// Wait out the timeout and deliver nothing
    Nothing,
    /// Fail with a stream error
    Fault,
}

/// Camera producing blank frames at a fixed period.
///
/// Scripted reads are consumed first; once the script runs out the camera
/// falls back to `steady`.
#[derive(Debug)]
pub struct MockCamera {
    log: CommandLog,
    size: ImageSize,
    period: Duration,
    script: VecDeque<MockRead>,
    steady: MockRead,
    sequence: u64,
    refuse_restart: bool,
}

impl MockCamera {
    /// Camera that delivers a frame every `period`
    pub fn streaming(log: CommandLog, size: ImageSize, period: Duration) -> Self {
        Self {
            log,
            size,
            period,
            script: VecDeque::new(),
            steady: MockRead::Frame,
            sequence: 0,
            refuse_restart: false,
        }
    }

    /// Camera that never produces a frame
    pub fn stalled(log: CommandLog) -> Self {
        Self {
            steady: MockRead::Nothing,
            ..Self::streaming(log, ImageSize::from_width_height(64, 48), Duration::ZERO)
        }
    }

    pub fn with_script(mut self, script: impl IntoIterator<Item = MockRead>) -> Self {
        self.script = script.into_iter().collect();
        self
    }

    /// Make every `start_stream` after the first one fail
    pub fn refusing_restart(mut self) -> Self {
        self.refuse_restart = true;
        self
    }
}

impl Camera for MockCamera {
    fn read_frame(&mut self, timeout: Duration) -> HardwareResult<Option<Frame>> {
        let read = self.script.pop_front().unwrap_or(self.steady);
        match read {
            MockRead::Frame => {
                thread::sleep(self.period.min(timeout));
                if self.period > timeout {
                    return Ok(None);
                }
                self.sequence += 1;
                Ok(Some(Frame::blank(self.size, self.sequence)))
            }
            MockRead::Nothing => {
                thread::sleep(timeout);
                Ok(None)
            }
            MockRead::Fault => Err(HardwareError::Stream("decoder lost sync".to_string())),
        }
    }

    fn start_stream(&mut self) -> HardwareResult<()> {
        let restarting = self.log.count_of(&PortCommand::StartStream) > 0;
        self.log.push(PortCommand::StartStream);
        if restarting && self.refuse_restart {
            return Err(HardwareError::Stream("stream refused".to_string()));
        }
        Ok(())
    }

    fn stop_stream(&mut self) -> HardwareResult<()> {
        self.log.push(PortCommand::StopStream);
        Ok(())
    }
}

/// Build a full set of recording ports around `camera`, all sharing `log`.
pub fn mock_robot(log: &CommandLog, camera: MockCamera) -> RobotPorts {
    RobotPorts {
        connection: Box::new(MockConnection::new(log.clone())),
        camera: Box::new(camera),
        chassis: Box::new(MockChassis::new(log.clone())),
        gimbal: Box::new(MockGimbal::new(log.clone())),
        blaster: Box::new(MockBlaster::new(log.clone())),
    }
}
