//! Command string queries (verb / help text / validate).
//!
//! # Invariants
//! - Text is written with a terminator or not at all; never truncated.
//! - Narrow output is ASCII; other characters become `?`.

use crate::error::{HostError, HostResult};

const RAW_VERB_NARROW: u32 = 0x0;
const RAW_HELP_NARROW: u32 = 0x1;
const RAW_VALIDATE_NARROW: u32 = 0x2;
const RAW_VERB_WIDE: u32 = 0x4;
const RAW_HELP_WIDE: u32 = 0x5;
const RAW_VALIDATE_WIDE: u32 = 0x6;

/// Kind of string the host asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStringKind {
    VerbNarrow,
    VerbWide,
    HelpNarrow,
    HelpWide,
    Validate,
    Unknown(u32),
}

impl CommandStringKind {
    /// Decodes the host's raw request flags.
    pub fn from_raw(flags: u32) -> Self {
        match flags {
            RAW_VERB_NARROW => Self::VerbNarrow,
            RAW_HELP_NARROW => Self::HelpNarrow,
            RAW_VALIDATE_NARROW | RAW_VALIDATE_WIDE => Self::Validate,
            RAW_VERB_WIDE => Self::VerbWide,
            RAW_HELP_WIDE => Self::HelpWide,
            other => Self::Unknown(other),
        }
    }

    /// `Some(true)` for wide text kinds, `Some(false)` for narrow ones.
    pub fn is_wide(self) -> Option<bool> {
        match self {
            Self::VerbWide | Self::HelpWide => Some(true),
            Self::VerbNarrow | Self::HelpNarrow => Some(false),
            Self::Validate | Self::Unknown(_) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VerbNarrow => "verb_narrow",
            Self::VerbWide => "verb_wide",
            Self::HelpNarrow => "help_narrow",
            Self::HelpWide => "help_wide",
            Self::Validate => "validate",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Host-provided output buffer; capacity is the slice length in units.
#[derive(Debug)]
pub enum TextBuffer<'a> {
    Narrow(&'a mut [u8]),
    Wide(&'a mut [u16]),
}

impl TextBuffer<'_> {
    pub fn capacity(&self) -> usize {
        match self {
            Self::Narrow(buf) => buf.len(),
            Self::Wide(buf) => buf.len(),
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, Self::Wide(_))
    }

    /// Writes `text` plus terminator. Returns units written without the
    /// terminator. The buffer is untouched on failure.
    pub fn write_terminated(&mut self, text: &str) -> HostResult<usize> {
        match self {
            Self::Narrow(buf) => {
                let encoded: Vec<u8> = text
                    .chars()
                    .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                    .collect();
                copy_terminated(buf, &encoded, 0)
            }
            Self::Wide(buf) => {
                let encoded: Vec<u16> = text.encode_utf16().collect();
                copy_terminated(buf, &encoded, 0)
            }
        }
    }
}

fn copy_terminated<T: Copy>(buf: &mut [T], encoded: &[T], terminator: T) -> HostResult<usize> {
    if encoded.len() >= buf.len() {
        return Err(HostError::BufferTooSmall);
    }
    buf[..encoded.len()].copy_from_slice(encoded);
    buf[encoded.len()] = terminator;
    Ok(encoded.len())
}
