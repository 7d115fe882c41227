//! Argument grammar shared by every command.
//!
//! Commands take one free-form string. The pieces they pull out of it are:
//!
//! - numbers: `0x`-prefixed hex or plain decimal
//! - addresses: numbers, printed back as target addresses
//! - wildcard patterns: `name`, `name*`, `*name`, `*name*`, or `*`
//! - `key=value` options
//!
//! Every parse failure is a [`SccError::Usage`] so commands can reject bad
//! input before touching the target.

use crate::error::{Result, SccError};
use crate::types::TargetAddr;

/// Parse a `0x` hex or decimal literal
///
/// ```rust
/// use sccdbg_core::commands::args::parse_number;
///
/// assert_eq!(parse_number("0x10").unwrap(), 16);
/// assert_eq!(parse_number("16").unwrap(), 16);
/// assert!(parse_number("0xZZ").is_err());
/// ```
pub fn parse_number(text: &str) -> Result<u64>
{
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|_| SccError::Usage(format!("'{text}' is not a number (use 0x.. for hex)")))
}

/// Parse a target address literal
pub fn parse_address(text: &str) -> Result<TargetAddr>
{
    parse_number(text).map(TargetAddr::from)
}

/// Where a [`Wildcard`] allows extra characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFlags
{
    /// `name`
    Exact,
    /// `name*`
    Prefix,
    /// `*name`
    Suffix,
    /// `*name*` or `*`
    Contains,
}

/// A name filter with optional leading/trailing `*`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard
{
    pub needle: String,
    pub flags: MatchFlags,
}

impl Wildcard
{
    /// Parse a pattern; `*` is only allowed at either end
    pub fn parse(pattern: &str) -> Result<Self>
    {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(SccError::Usage("empty name pattern".into()));
        }
        let leading = pattern.starts_with('*');
        let body = pattern.strip_prefix('*').unwrap_or(pattern);
        let trailing = body.ends_with('*');
        let body = body.strip_suffix('*').unwrap_or(body);
        if body.contains('*') {
            return Err(SccError::Usage(format!("'{pattern}': '*' is only allowed at the start or end")));
        }
        let flags = match (leading, trailing) {
            (false, false) => MatchFlags::Exact,
            (false, true) => MatchFlags::Prefix,
            (true, false) if !body.is_empty() => MatchFlags::Suffix,
            _ => MatchFlags::Contains,
        };
        Ok(Self {
            needle: body.to_string(),
            flags,
        })
    }

    /// Length of the literal part
    pub fn len(&self) -> usize
    {
        self.needle.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.needle.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool
    {
        match self.flags {
            MatchFlags::Exact => name == self.needle,
            MatchFlags::Prefix => name.starts_with(&self.needle),
            MatchFlags::Suffix => name.ends_with(&self.needle),
            MatchFlags::Contains => name.contains(&self.needle),
        }
    }
}

/// Whitespace/comma separated tokens with `key=value` options split out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args
{
    positional: Vec<String>,
    options: Vec<(String, String)>,
}

impl Args
{
    pub fn parse(text: &str) -> Self
    {
        let mut args = Self::default();
        for token in text.split(|c: char| c.is_whitespace() || c == ',').filter(|t| !t.is_empty()) {
            match token.split_once('=') {
                Some((key, value)) => args.options.push((key.to_lowercase(), value.to_string())),
                None => args.positional.push(token.to_string()),
            }
        }
        args
    }

    pub fn positional(&self) -> &[String]
    {
        &self.positional
    }

    pub fn get(&self, index: usize) -> Option<&str>
    {
        self.positional.get(index).map(String::as_str)
    }

    /// Positional argument `index`, or a usage error naming `usage`
    pub fn require(&self, index: usize, usage: &str) -> Result<&str>
    {
        self.get(index).ok_or_else(|| SccError::Usage(usage.to_string()))
    }

    pub fn option(&self, key: &str) -> Option<&str>
    {
        self.options.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Reject options other than `allowed`
    pub fn check_options(&self, allowed: &[&str], usage: &str) -> Result<()>
    {
        match self.options.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
            Some((key, _)) => Err(SccError::Usage(format!("unknown option '{key}'; {usage}"))),
            None => Ok(()),
        }
    }

    /// Reject more than `max` positional arguments
    pub fn check_max(&self, max: usize, usage: &str) -> Result<()>
    {
        if self.positional.len() > max {
            return Err(SccError::Usage(usage.to_string()));
        }
        Ok(())
    }
}

/// Parse `start..end` into a half-open address range
pub fn parse_range(text: &str) -> Result<(TargetAddr, TargetAddr)>
{
    let (start, end) = text
        .split_once("..")
        .ok_or_else(|| SccError::Usage(format!("'{text}' is not a range (use start..end)")))?;
    let (start, end) = (parse_address(start)?, parse_address(end)?);
    if start >= end {
        return Err(SccError::Usage(format!("empty range {start}..{end}")));
    }
    Ok((start, end))
}
