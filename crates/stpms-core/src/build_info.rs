//! Identity of the running firmware build.

use core::fmt::{self, Write};

use heapless::String;

use crate::reading::FirmwareVersion;

/// Longest name [`BuildInfo::display_name`] produces.
pub const DISPLAY_NAME_LEN: usize = 32;

/// How the application identifies itself: a plain name, or a tag plus a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppIdentity<'a> {
    Name(&'a str),
    Tagged { tag: &'a str, variant: &'a str },
}

impl fmt::Display for AppIdentity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppIdentity::Name(name) => f.write_str(name),
            AppIdentity::Tagged { tag, variant } => write!(f, "{tag}-{variant}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo<'a> {
    pub app: AppIdentity<'a>,
    /// `vX.Y.Z`, usually from the build environment.
    pub version: &'a str,
    pub hardware_revision: &'a str,
    /// Free-form build flags, e.g. `debug`.
    pub flags: &'a str,
}

impl<'a> BuildInfo<'a> {
    pub fn firmware_version(&self) -> Option<FirmwareVersion> {
        FirmwareVersion::parse(self.version)
    }

    /// Application identity, truncated to [`DISPLAY_NAME_LEN`] bytes.
    pub fn display_name(&self) -> String<DISPLAY_NAME_LEN> {
        let mut name = String::new();
        // Overflow only truncates.
        let _ = write!(Truncating(&mut name), "{}", self.app);
        name
    }
}

impl fmt::Display for BuildInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.app, self.version, self.hardware_revision)?;
        if !self.flags.is_empty() {
            write!(f, " [{}]", self.flags)?;
        }
        Ok(())
    }
}

struct Truncating<'s, const N: usize>(&'s mut String<N>);

impl<const N: usize> Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                return Err(fmt::Error);
            }
        }
        Ok(())
    }
}
