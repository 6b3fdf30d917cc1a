//! `.rvi` binary blob holding the index vectors.
//!
//! # File structure
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "RVIDX001"
//! 0x08     4       u32 LE      N: number of vectors
//! 0x0C     4       u32 LE      D: dimensions
//! 0x10     N*D*4   [f32]       Vector data (little endian)
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use thiserror::Error;

/// Magic bytes identifying a vector blob: "RVIDX001"
pub const MAGIC: [u8; 8] = *b"RVIDX001";

/// Header size in bytes: 8 (magic) + 4 (count) + 4 (dims)
pub const HEADER_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("invalid magic bytes: expected RVIDX001")]
    InvalidMagic,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "blob truncated: header declares {declared} bytes, file holds {actual}"
    )]
    Truncated { declared: usize, actual: usize },

    #[error("vector data misaligned for f32 access")]
    Misaligned,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Parsed blob header.
#[derive(Debug, Clone, Copy)]
pub struct VectorBlobHeader {
    pub count: u32,
    pub dimensions: u32,
}

impl VectorBlobHeader {
    /// Parse a header from the first 16 bytes of a blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file too small for header",
            )));
        }

        if bytes[0..8] != MAGIC {
            return Err(FormatError::InvalidMagic);
        }

        let count = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let dimensions = u32::from_le_bytes(bytes[12..16].try_into().unwrap());

        Ok(Self { count, dimensions })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&self.count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.dimensions.to_le_bytes());
        buf
    }

    /// Total file size the header describes.
    pub fn file_size(&self) -> usize {
        HEADER_SIZE + (self.count as usize * self.dimensions as usize * std::mem::size_of::<f32>())
    }
}

/// Writer for vector blobs.
///
/// The count field is written as a placeholder and patched in `finish()`.
pub struct VectorBlobWriter {
    writer: BufWriter<File>,
    dimensions: usize,
    count: u32,
}

impl VectorBlobWriter {
    pub fn create<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self, FormatError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = VectorBlobHeader {
            count: 0,
            dimensions: dimensions as u32,
        };
        writer.write_all(&header.to_bytes())?;

        Ok(Self {
            writer,
            dimensions,
            count: 0,
        })
    }

    pub fn write_vector(&mut self, vector: &[f32]) -> Result<(), FormatError> {
        if vector.len() != self.dimensions {
            return Err(FormatError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        for &val in vector {
            self.writer.write_all(&val.to_le_bytes())?;
        }

        self.count += 1;
        Ok(())
    }

    /// Flush, patch the header count, and sync to disk.
    pub fn finish(mut self) -> Result<u32, FormatError> {
        use std::io::Seek;

        self.writer.flush()?;

        let file = self.writer.get_mut();
        file.seek(io::SeekFrom::Start(8))?;
        file.write_all(&self.count.to_le_bytes())?;
        file.sync_all()?;

        Ok(self.count)
    }
}

/// Read a whole blob back into memory.
///
/// Returns the dimensionality and the flattened vector data
/// (`count * dim` floats, insertion order preserved).
pub fn read_blob<P: AsRef<Path>>(path: P) -> Result<(usize, Vec<f32>), FormatError> {
    let bytes = std::fs::read(path)?;
    let header = VectorBlobHeader::from_bytes(&bytes)?;

    let expected = header.file_size();
    if bytes.len() < expected {
        return Err(FormatError::Truncated {
            declared: expected,
            actual: bytes.len(),
        });
    }

    let data = &bytes[HEADER_SIZE..expected];
    // bytemuck checks alignment; a Vec<u8> offset by 16 is 4-byte aligned in
    // practice, but fall back to a manual decode rather than panic if not.
    let floats = match bytemuck::try_cast_slice::<u8, f32>(data) {
        Ok(slice) => slice.to_vec(),
        Err(_) => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect(),
    };

    Ok((header.dimensions as usize, floats))
}
