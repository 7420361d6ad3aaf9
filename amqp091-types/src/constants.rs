//! Protocol constants

/// The IANA assigned port number for AMQP.
pub const PORT: u16 = 5672;

/// The IANA assigned port number for secure AMQP (amqps).
pub const SECURE_PORT: u16 = 5671;

/// Major protocol version.
pub const MAJOR: u8 = 0;

/// Minor protocol version.
pub const MINOR: u8 = 9;

/// Protocol revision.
pub const REVISION: u8 = 1;

/// Method frame type
pub const FRAME_METHOD: u8 = 1;

/// Content header frame type
pub const FRAME_HEADER: u8 = 2;

/// Content body frame type
pub const FRAME_BODY: u8 = 3;

/// Heartbeat frame type
pub const FRAME_HEARTBEAT: u8 = 8;

/// Every frame is terminated by this octet
pub const FRAME_END: u8 = 0xCE;

/// Size of the frame header: type (1), channel (2) and payload size (4)
pub const FRAME_HEADER_SIZE: usize = 7;

/// The lower bound for a negotiated max frame size (in bytes), zero aside which means
/// "no limit".
pub const FRAME_MIN_SIZE: u32 = 4096;

/// Class id of the connection class
pub const CLASS_CONNECTION: u16 = 10;

/// Class id of the channel class
pub const CLASS_CHANNEL: u16 = 20;
