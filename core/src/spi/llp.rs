//! Wire-format constants shared by [`super::master`] and [`super::slave`].
//!
//! A frame is `type(1) | size(1) | payload(size) | crc_hi(1) | crc_lo(1)`.
//! The CRC is CRC-16/CCITT-FALSE over `type`, `size` and `payload`, appended
//! big-endian. `TYPE_RX_PROCESSING` is reserved: the slave drives it onto the
//! line as a padding byte while it has nothing real to send yet, and error
//! response types are chosen to sit numerically above it so a master can
//! classify a received type byte with one comparison.

/// Padding byte the slave clocks out before it has a real response ready,
/// and which the master must see echoed back during the request phase —
/// anything else there means the slave isn't keeping up.
pub const TYPE_RX_PROCESSING: u8 = 0x80;

/// Slave rejected the request's CRC.
pub const ERR_CRC_FAILURE: u8 = 0x81;
/// Slave rejected the request as larger than its receive buffer.
pub const ERR_MESSAGE_TOO_LARGE: u8 = 0x82;

/// `true` if `ty` is one of the reserved error response types.
pub fn is_error_type(ty: u8) -> bool {
    ty > TYPE_RX_PROCESSING
}
