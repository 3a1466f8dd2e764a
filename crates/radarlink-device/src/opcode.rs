//! Opcodes of the binary command protocol.
//!
//! Replies carry the request opcode with [`ACK_BIT`](radarlink_frame::ACK_BIT) set.

pub const READ_VERSION: u16 = 0x000A;
pub const WRITE_BASE_PARAMS: u16 = 0x0067;
pub const READ_BASE_PARAMS: u16 = 0x0073;
pub const SET_BAUD_RATE: u16 = 0x00A1;
pub const FACTORY_RESET: u16 = 0x00A2;
pub const RESTART: u16 = 0x00A3;
pub const BLUETOOTH: u16 = 0x00A4;
pub const READ_MAC: u16 = 0x00A5;
pub const OPEN_COMMAND_MODE: u16 = 0x00FF;
pub const CLOSE_COMMAND_MODE: u16 = 0x00FE;

pub const SET_DISTANCE_RESOLUTION: u16 = 0x0001;
pub const READ_DISTANCE_RESOLUTION: u16 = 0x0011;
pub const SET_MOVE_THRESHOLDS: u16 = 0x0003;
pub const READ_MOVE_THRESHOLDS: u16 = 0x0013;
pub const SET_STILL_THRESHOLDS: u16 = 0x0004;
pub const READ_STILL_THRESHOLDS: u16 = 0x0014;
pub const ENTER_ENGINEERING: u16 = 0x0062;
pub const LEAVE_ENGINEERING: u16 = 0x0063;
pub const START_BACKGROUND_ANALYSIS: u16 = 0x000B;
pub const QUERY_BACKGROUND_ANALYSIS: u16 = 0x001B;

/// Human-readable name of an opcode, for logs and errors.
pub fn name(opcode: u16) -> &'static str {
    match opcode {
        READ_VERSION => "ReadVersion",
        WRITE_BASE_PARAMS => "WriteBaseParams",
        READ_BASE_PARAMS => "ReadBaseParams",
        SET_BAUD_RATE => "SetBaudRate",
        FACTORY_RESET => "FactoryReset",
        RESTART => "Restart",
        BLUETOOTH => "Bluetooth",
        READ_MAC => "ReadMac",
        OPEN_COMMAND_MODE => "OpenCommandMode",
        CLOSE_COMMAND_MODE => "CloseCommandMode",
        SET_DISTANCE_RESOLUTION => "SetDistanceResolution",
        READ_DISTANCE_RESOLUTION => "ReadDistanceResolution",
        SET_MOVE_THRESHOLDS => "SetMoveThresholds",
        READ_MOVE_THRESHOLDS => "ReadMoveThresholds",
        SET_STILL_THRESHOLDS => "SetStillThresholds",
        READ_STILL_THRESHOLDS => "ReadStillThresholds",
        ENTER_ENGINEERING => "EnterEngineering",
        LEAVE_ENGINEERING => "LeaveEngineering",
        START_BACKGROUND_ANALYSIS => "StartBackgroundAnalysis",
        QUERY_BACKGROUND_ANALYSIS => "QueryBackgroundAnalysis",
        _ => "Unknown",
    }
}
