//! Per-frame integrity index persisted next to a wrapped essence file

use crate::identity::frame_hash;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for frame index files: "DCPI"
const MAGIC: [u8; 4] = [b'D', b'C', b'P', b'I'];

/// Current frame index format version
const VERSION: u16 = 1;

/// Where one frame lives in the container, and what it hashed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Byte offset of the frame payload within the container
    pub offset: u64,
    /// Payload size in bytes
    pub size: u64,
    /// Hex SHA-1 of the plaintext payload; empty for a reserved placeholder
    pub hash: String,
}

impl FrameInfo {
    pub fn new(offset: u64, size: u64, hash: impl Into<String>) -> Self {
        Self {
            offset,
            size,
            hash: hash.into(),
        }
    }

    /// True for frames reserved by `fake_write`
    pub fn is_placeholder(&self) -> bool {
        self.hash.is_empty()
    }

    /// First byte after this frame; `None` if the range overflows
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let offset = reader.read_u64::<LittleEndian>()?;
        let size = reader.read_u64::<LittleEndian>()?;
        let hash_len = reader.read_u16::<LittleEndian>()?;
        let mut hash = vec![0u8; hash_len as usize];
        reader.read_exact(&mut hash)?;
        let hash = String::from_utf8(hash)
            .map_err(|_| Error::FrameIndex("frame hash is not valid UTF-8".into()))?;
        Ok(Self { offset, size, hash })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.offset)?;
        writer.write_u64::<LittleEndian>(self.size)?;
        writer.write_u16::<LittleEndian>(self.hash.len() as u16)?;
        writer.write_all(self.hash.as_bytes())?;
        Ok(())
    }
}

/// Ordered table of [`FrameInfo`], one per essence frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameIndex {
    entries: Vec<FrameInfo>,
}

impl FrameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sidecar path used for the index of `essence`: `<essence>.idx`
    pub fn sidecar_path(essence: impl AsRef<Path>) -> PathBuf {
        let mut name = essence.as_ref().as_os_str().to_owned();
        name.push(".idx");
        PathBuf::from(name)
    }

    /// Appends an entry; it must start at or after the end of the previous one
    pub fn push(&mut self, info: FrameInfo) -> Result<()> {
        if info.end().is_none() {
            return Err(Error::FrameIndex(format!(
                "frame of {} bytes at offset {} runs past the end of the address space",
                info.size, info.offset
            )));
        }
        if let Some(last) = self.entries.last() {
            // every stored entry passed the check above
            let last_end = last.end().unwrap_or(u64::MAX);
            if info.offset < last_end || info.offset <= last.offset {
                return Err(Error::FrameIndex(format!(
                    "frame at offset {} overlaps previous frame ending at {}",
                    info.offset, last_end
                )));
            }
        }
        self.entries.push(info);
        Ok(())
    }

    pub fn get(&self, n: usize) -> Option<&FrameInfo> {
        self.entries.get(n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FrameInfo] {
        &self.entries
    }

    /// Checks `data` against the stored hash of frame `n`
    ///
    /// Placeholders and unknown frames never verify.
    pub fn verify(&self, n: usize, data: &[u8]) -> bool {
        match self.entries.get(n) {
            Some(info) if !info.is_placeholder() => info.hash == frame_hash(data),
            _ => false,
        }
    }

    /// Reads an index from a reader
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic { expected: MAGIC });
        }

        let version = reader.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let count = reader.read_u64::<LittleEndian>()?;
        let mut index = Self::new();
        for _ in 0..count {
            index.push(FrameInfo::read(reader)?)?;
        }
        Ok(index)
    }

    /// Writes the index to a writer
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_u16::<LittleEndian>(VERSION)?;
        writer.write_u64::<LittleEndian>(self.entries.len() as u64)?;
        for entry in &self.entries {
            entry.write(writer)?;
        }
        Ok(())
    }

    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).map_err(|e| Error::file("could not open frame index", path, e))?;
        Self::read(&mut BufReader::new(file))
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file =
            File::create(path).map_err(|e| Error::file("could not create frame index", path, e))?;
        let mut writer = BufWriter::new(file);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_index() -> FrameIndex {
        let mut index = FrameIndex::new();
        let mut offset = 64;
        for (i, size) in [100u64, 250, 80].into_iter().enumerate() {
            let payload = vec![i as u8; size as usize];
            index
                .push(FrameInfo::new(offset, size, frame_hash(&payload)))
                .unwrap();
            offset += size + 4;
        }
        index.push(FrameInfo::new(offset, 32, "")).unwrap();
        index
    }

    #[test]
    fn test_entries_are_monotonic() {
        let index = sample_index();
        let entries = index.entries();
        for i in 0..entries.len() {
            for j in i + 1..entries.len() {
                assert!(entries[i].offset + entries[i].size <= entries[j].offset);
            }
        }
    }

    #[test]
    fn test_overlapping_entry_is_rejected() {
        let mut index = FrameIndex::new();
        index.push(FrameInfo::new(0, 100, "aa")).unwrap();
        assert!(index.push(FrameInfo::new(99, 10, "bb")).is_err());
        assert!(index.push(FrameInfo::new(0, 0, "bb")).is_err());
        index.push(FrameInfo::new(100, 10, "bb")).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_overflowing_entry_is_rejected() {
        let info = FrameInfo::new(u64::MAX - 4, 10, "aa");
        assert_eq!(info.end(), None);

        let mut index = FrameIndex::new();
        assert!(matches!(index.push(info.clone()), Err(Error::FrameIndex(_))));
        assert!(index.is_empty());

        let mut buffer = Vec::new();
        FrameIndex::new().write(&mut buffer).unwrap();
        buffer[6..14].copy_from_slice(&1u64.to_le_bytes());
        info.write(&mut buffer).unwrap();
        assert!(matches!(
            FrameIndex::read(&mut Cursor::new(buffer)),
            Err(Error::FrameIndex(_))
        ));
    }

    #[test]
    fn test_binary_roundtrip_preserves_placeholders() {
        let index = sample_index();
        let mut buffer = Vec::new();
        index.write(&mut buffer).unwrap();
        let read = FrameIndex::read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(read, index);
        assert!(read.get(3).unwrap().is_placeholder());
    }

    #[test]
    fn test_verify_frame_hash() {
        let index = sample_index();
        assert!(index.verify(1, &vec![1u8; 250]));
        assert!(!index.verify(1, &vec![2u8; 250]));
        assert!(!index.verify(3, &[0u8; 32]));
        assert!(!index.verify(10, &[]));
    }

    #[test]
    fn test_bad_magic_and_version() {
        let err = FrameIndex::read(&mut Cursor::new(b"NOPE\x01\x00".to_vec())).unwrap_err();
        assert!(matches!(err, Error::InvalidMagic { .. }));

        let mut buffer = MAGIC.to_vec();
        buffer.extend_from_slice(&7u16.to_le_bytes());
        let err = FrameIndex::read(&mut Cursor::new(buffer)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(7)));
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            FrameIndex::sidecar_path("/dcp/video.mxf"),
            PathBuf::from("/dcp/video.mxf.idx")
        );
    }
}
