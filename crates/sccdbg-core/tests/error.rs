//! Tests for error handling

use std::io;

use sccdbg_core::error::{Result, SccError};
use sccdbg_core::types::TargetAddr;

#[test]
fn test_unreachable_display()
{
    let error = SccError::TargetUnreachable {
        address: TargetAddr::from(0x1000),
        len: 8,
    };
    let message = error.to_string();
    assert!(message.contains("0x0000000000001000"));
    assert!(message.contains("8 bytes"));
    assert!(error.is_read_failure());
    assert_eq!(error.address(), Some(TargetAddr::from(0x1000)));
}

#[test]
fn test_short_read_display()
{
    let error = SccError::ShortRead {
        address: TargetAddr::from(0x2000),
        requested: 16,
        actual: 4,
    };
    assert_eq!(
        error.to_string(),
        "Short read at 0x0000000000002000: wanted 16 bytes, got 4"
    );
    assert!(error.is_read_failure());
}

#[test]
fn test_decode_error()
{
    let error = SccError::decode("ShcItemHdr", TargetAddr::from(0x30), "zero length");
    assert_eq!(
        error.to_string(),
        "Failed to decode ShcItemHdr at 0x0000000000000030: zero length"
    );
    assert!(!error.is_read_failure());
    assert_eq!(error.address(), Some(TargetAddr::from(0x30)));
}

#[test]
fn test_usage_and_argument_errors_carry_no_address()
{
    let usage = SccError::Usage("shrc <subcommand>".into());
    assert_eq!(usage.to_string(), "Usage: shrc <subcommand>");
    assert_eq!(usage.address(), None);

    let invalid = SccError::InvalidArgument("zero-length read".into());
    assert!(invalid.to_string().contains("zero-length read"));
    assert!(!invalid.is_read_failure());
}

#[test]
fn test_io_error_conversion()
{
    fn open() -> Result<()>
    {
        Err(io::Error::new(io::ErrorKind::NotFound, "core.1234"))?;
        Ok(())
    }
    let error = open().unwrap_err();
    assert!(matches!(error, SccError::Io(_)));
    assert!(error.to_string().contains("core.1234"));
}
