//! `J9UTF8` strings: a `u16` byte length followed by modified UTF-8 bytes.

use crate::error::{Result, SccError};
use crate::target::Session;
use crate::types::TargetAddr;

/// Read the `J9UTF8` at `addr` into a local string
///
/// Invalid UTF-8 sequences are replaced rather than rejected; the length
/// prefix is what gets validated.
///
/// ## Errors
///
/// `Decode` for a null address or a zero length, plus any read failure.
pub fn read_utf8(session: &Session<'_>, addr: TargetAddr) -> Result<String>
{
    if addr.is_null() {
        return Err(SccError::decode("J9UTF8", addr, "null string"));
    }
    let len = usize::from(session.read_u16(addr)?);
    if len == 0 {
        return Err(SccError::decode("J9UTF8", addr, "zero length"));
    }
    if !session.is_known_range(addr, 2 + len as u64) {
        return Err(SccError::decode("J9UTF8", addr, format!("length {len} runs past mapped memory")));
    }
    let shadow = session.read_bytes(addr, 2 + len)?;
    Ok(String::from_utf8_lossy(&shadow[2..2 + len]).into_owned())
}

/// Read the string an SRP at `field_addr` points to, `None` for a null SRP
pub fn read_utf8_srp(session: &Session<'_>, field_addr: TargetAddr) -> Result<Option<String>>
{
    match session.read_srp(field_addr)? {
        Some(addr) => read_utf8(session, addr).map(Some),
        None => Ok(None),
    }
}
