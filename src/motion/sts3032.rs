// Feetech STS3032 serial protocol implementation
//
// Protocol is similar to Dynamixel Protocol 1.0:
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
//
// The quadruped drives its servos in position mode: each move writes the
// goal position / goal time / goal speed block in one transaction.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

use super::ServoActuator;

/// Default serial configuration for STS3032 servos
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Servo position resolution: 4096 counts per revolution
const COUNTS_PER_REVOLUTION: f32 = 4096.0;

/// Broadcast ID for sync writes
const BROADCAST_ID: u8 = 0xFE;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Register addresses for STS3032
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // RAM area (volatile)
    TorqueEnable = 40,    // 1 byte: 0=off, 1=on
    GoalPosition = 42,    // 2 bytes, followed by GoalTime and GoalSpeed
    Lock = 55,            // 1 byte: 0=unlocked, 1=locked
    PresentPosition = 56, // 2 bytes, read-only
}

/// Error types for servo bus communication
#[derive(Debug, thiserror::Error)]
pub enum ServoError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} returned error status: 0x{status:02X}")]
    ServoStatus { id: u8, status: u8 },

    #[error("Servo {id} not responding")]
    Unresponsive { id: u8 },
}

pub type Result<T> = std::result::Result<T, ServoError>;

/// Convert an angle in degrees to a raw position count.
pub fn angle_to_counts(angle: f32) -> u16 {
    let raw = (angle / 360.0 * COUNTS_PER_REVOLUTION).round();
    raw.clamp(0.0, COUNTS_PER_REVOLUTION - 1.0) as u16
}

/// Convert a raw position count back to degrees.
pub fn counts_to_angle(counts: u16) -> f32 {
    counts as f32 * 360.0 / COUNTS_PER_REVOLUTION
}

/// STS3032 servo bus - handles serial communication with the servo chain
pub struct Sts3032Bus {
    port: Box<dyn SerialPort>,
}

impl Sts3032Bus {
    /// Open a new connection to the servo bus
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        // Checksum over id, length, instruction, params
        let checksum_data = &packet[2..]; // skip header
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a status packet, mapping a serial timeout to Unresponsive
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                ServoError::Unresponsive { id: expected_id }
            } else {
                ServoError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(ServoError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let id = id_length[0];
        let length = id_length[1] as usize;

        if id != expected_id {
            return Err(ServoError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }

        // Read remaining bytes (error + params + checksum = length bytes)
        let mut remaining = vec![0u8; length];
        self.port.read_exact(&mut remaining)?;

        // Verify checksum
        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        let expected_checksum = Self::checksum(&checksum_data);
        let received_checksum = remaining[remaining.len() - 1];

        if expected_checksum != received_checksum {
            return Err(ServoError::ChecksumMismatch { id });
        }

        let error_status = remaining[0];
        if error_status != 0 {
            return Err(ServoError::ServoStatus {
                id,
                status: error_status,
            });
        }

        // Return parameters (excluding error byte and checksum)
        Ok(remaining[1..remaining.len() - 1].to_vec())
    }

    /// Write a single byte to a register
    fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        let params = [register as u8, value];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!(
            "Write u8 to servo {}: reg={:?}, value={}",
            id, register, value
        );
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Write the position/time/speed block starting at GoalPosition
    fn write_goal(&mut self, id: u8, position: u16, speed: u16) -> Result<()> {
        let params = [
            Register::GoalPosition as u8,
            (position & 0xFF) as u8,
            (position >> 8) as u8,
            0, // goal time unused, speed-driven moves
            0,
            (speed & 0xFF) as u8,
            (speed >> 8) as u8,
        ];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!(
            "Write goal to servo {}: pos={}, speed={}",
            id, position, speed
        );
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Read two bytes (little-endian) from a register
    fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let params = [register as u8, 2]; // address, length
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < 2 {
            return Err(ServoError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", response.len()),
            });
        }
        Ok(u16::from_le_bytes([response[0], response[1]]))
    }

    /// Sync write: same goal block to multiple servos in one bus transaction
    /// data: [(id, position), ...]
    fn sync_write_goals(&mut self, data: &[(u8, u16)], speed: u16) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        // Sync write format:
        // [start_addr, data_length, id1, block1..., id2, block2..., ...]
        let data_length: u8 = 6; // position + time + speed per servo
        let mut params = vec![Register::GoalPosition as u8, data_length];

        for &(id, position) in data {
            params.push(id);
            params.push((position & 0xFF) as u8);
            params.push((position >> 8) as u8);
            params.push(0);
            params.push(0);
            params.push((speed & 0xFF) as u8);
            params.push((speed >> 8) as u8);
        }

        let packet = Self::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        debug!("Sync write to {} servos, speed={}", data.len(), speed);
        self.send_packet(&packet)?;

        // Sync write has no response
        Ok(())
    }
}

impl ServoActuator for Sts3032Bus {
    /// Ping a servo to check if it's connected
    fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(ServoError::Unresponsive { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn enable_torque(&mut self, id: u8, on: bool) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, on as u8)?;
        self.write_u8(id, Register::Lock, on as u8)
    }

    fn set_angle(&mut self, id: u8, angle: f32, speed: u16) -> Result<()> {
        self.write_goal(id, angle_to_counts(angle), speed)
    }

    fn get_angle(&mut self, id: u8) -> Result<f32> {
        let counts = self.read_u16(id, Register::PresentPosition)?;
        Ok(counts_to_angle(counts))
    }

    fn set_all(&mut self, moves: &[(u8, f32)], speed: u16) -> Result<()> {
        let goals: Vec<(u8, u16)> = moves
            .iter()
            .map(|&(id, angle)| (id, angle_to_counts(angle)))
            .collect();
        self.sync_write_goals(&goals, speed)
    }
}
