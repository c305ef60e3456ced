//! Version-gated snapshot framing
//!
//! A snapshot starts with an 8-byte magic and a little-endian `u32` version,
//! followed by bincode-encoded sections written in a fixed order. Readers
//! check the version before decoding anything so that older sections can be
//! interpreted according to the version they were written with.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use std::ops::RangeInclusive;

use crate::error::{HydraError, Result};

pub const SNAPSHOT_MAGIC: [u8; 8] = *b"CMSNAP\0\x01";

pub struct SaveContext<W: Write> {
    writer: W,
    version: u32,
}

impl<W: Write> SaveContext<W> {
    /// Write the header and return a context positioned at the first section
    pub fn new(mut writer: W, version: u32) -> Result<Self> {
        writer.write_all(&SNAPSHOT_MAGIC)?;
        writer.write_all(&version.to_le_bytes())?;
        Ok(Self { writer, version })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn save<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        bincode::serialize_into(&mut self.writer, value)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

pub struct LoadContext<R: Read> {
    reader: R,
    version: u32,
}

impl<R: Read> LoadContext<R> {
    /// Validate the header against the supported version range
    pub fn new(mut reader: R, supported: RangeInclusive<u32>) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if magic != SNAPSHOT_MAGIC {
            return Err(HydraError::InvalidSnapshot(format!(
                "bad magic {:02x?}",
                magic
            )));
        }

        let mut version = [0u8; 4];
        reader.read_exact(&mut version)?;
        let version = u32::from_le_bytes(version);
        if !supported.contains(&version) {
            return Err(HydraError::UnsupportedVersion {
                found: version,
                min: *supported.start(),
                max: *supported.end(),
            });
        }

        Ok(Self { reader, version })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn load<T: DeserializeOwned>(&mut self) -> Result<T> {
        Ok(bincode::deserialize_from(&mut self.reader)?)
    }
}
