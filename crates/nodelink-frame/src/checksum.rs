use crc::{Crc, CRC_16_XMODEM};

const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC-16/CCITT (XMODEM: poly 0x1021, init 0, no reflection).
///
/// Running it over data followed by its own big-endian checksum yields zero,
/// which is how the serial reader validates frames.
pub fn crc16(data: &[u8]) -> u16 {
    XMODEM.checksum(data)
}
