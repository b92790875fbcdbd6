//! N9M protocol constants

/// Header version sent by current device firmware
pub const N9M_VERSION: u8 = 2;

/// Bytes before the channel id (flags byte + payload type)
pub const HEADER_PREFIX_SIZE: usize = 2;

/// Size of the payload length field
pub const PAYLOAD_LENGTH_SIZE: usize = 4;

/// Default maximum accepted payload (16 MiB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Default reserved field width used by the stock device profile
pub const DEFAULT_RESERVED_LEN: usize = 4;

/// Payload type: JSON signal envelope
pub const PAYLOAD_TYPE_SIGNAL: u8 = 0;

/// Payload type: JSON metadata
pub const PAYLOAD_TYPE_METADATA: u8 = 1;

/// Payload type: binary media
pub const PAYLOAD_TYPE_MEDIA: u8 = 2;

/// Protocol version advertised when the device does not send one
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.0.5";

/// Default TCP port for device connections
pub const DEFAULT_PORT: u16 = 5556;

// Signal modules
pub const MODULE_CERTIFICATE: &str = "CERTIFICATE";
pub const MODULE_MEDIASTREAMMODEL: &str = "MEDIASTREAMMODEL";

// CERTIFICATE operations
pub const OP_CONNECT: &str = "CONNECT";
pub const OP_KEEPALIVE: &str = "KEEPALIVE";
pub const OP_CREATESTREAM: &str = "CREATESTREAM";
pub const OP_VERIFY: &str = "VERIFY";
pub const OP_LOGIN: &str = "LOGIN";

// MEDIASTREAMMODEL operations
pub const OP_MEDIATASKSTART: &str = "MEDIATASKSTART";
pub const OP_REQUESTSTREAM: &str = "REQUESTSTREAM";
pub const OP_REQUESTALIVEVIDEO: &str = "REQUESTALIVEVIDEO";
pub const OP_CONTROLSTREAM: &str = "CONTROLSTREAM";

// Response fields
pub const FIELD_ERRORCODE: &str = "ERRORCODE";
pub const FIELD_ERRORCAUSE: &str = "ERRORCAUSE";

/// Success value for ERRORCODE
pub const ERRORCODE_SUCCESS: u32 = 0;
