//! Target configuration.
//!
//! Describes the build of the VM being inspected. None of this can be read
//! from the target reliably before the first structure is decoded, so it is
//! supplied up front (CLI flags) and threaded through the session.

use std::fmt;
use std::str::FromStr;

use crate::codec::Alignment;
use crate::layout::Abi;
use crate::types::TargetArch;

/// Default bound on any single walk (records, puddles, tree depth, list links)
pub const DEFAULT_WALK_LIMIT: usize = 1 << 20;

/// How a `ShrOffset` picks its anchor in a layered cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerPolicy
{
    /// Use the layer tag when present, otherwise the newest (top) layer
    #[default]
    NewestWins,
    /// Every offset must carry a layer tag; untagged offsets do not resolve
    Explicit,
}

impl FromStr for LayerPolicy
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "newest" | "newest-wins" | "top" => Ok(Self::NewestWins),
            "explicit" => Ok(Self::Explicit),
            _ => Err(format!("Unknown layer policy: {s}. Use 'newest' or 'explicit'")),
        }
    }
}

impl fmt::Display for LayerPolicy
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::NewestWins => f.write_str("newest"),
            Self::Explicit => f.write_str("explicit"),
        }
    }
}

/// Everything the inspector needs to know about the target build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetConfig
{
    /// Pointer width and byte order
    pub arch: TargetArch,
    /// Whether `ShrOffset` carries a layer index
    pub multi_layer: bool,
    /// Record padding
    pub alignment: Alignment,
    /// Anchor selection for layered caches
    pub layer_policy: LayerPolicy,
    /// Upper bound on iterations of any walker
    pub walk_limit: usize,
}

impl Default for TargetConfig
{
    fn default() -> Self
    {
        Self {
            arch: TargetArch::default(),
            multi_layer: false,
            alignment: Alignment::Word,
            layer_policy: LayerPolicy::NewestWins,
            walk_limit: DEFAULT_WALK_LIMIT,
        }
    }
}

impl TargetConfig
{
    /// Layout parameters derived from this configuration
    pub const fn abi(&self) -> Abi
    {
        Abi::new(self.arch, self.multi_layer)
    }

    pub fn with_arch(mut self, arch: TargetArch) -> Self
    {
        self.arch = arch;
        self
    }

    pub fn with_multi_layer(mut self, multi_layer: bool) -> Self
    {
        self.multi_layer = multi_layer;
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self
    {
        self.alignment = alignment;
        self
    }

    pub fn with_layer_policy(mut self, policy: LayerPolicy) -> Self
    {
        self.layer_policy = policy;
        self
    }

    pub fn with_walk_limit(mut self, limit: usize) -> Self
    {
        self.walk_limit = limit;
        self
    }
}

impl fmt::Display for TargetConfig
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(
            f,
            "{}, {} ShrOffset, {}-byte alignment, layer policy {}",
            self.arch,
            if self.multi_layer { "multi-layer" } else { "single-layer" },
            self.alignment.bytes(),
            self.layer_policy
        )
    }
}
