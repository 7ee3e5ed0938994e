//! Wrapped essence: the codec seam and the reference file container
//!
//! Frame payloads are opaque here. The [`EssenceCodec`] trait is the capability
//! set the rest of the library relies on; [`FileCodec`] is a small container
//! implementing it with a fixed header, raw frame payloads and a trailing
//! frame table written on finalize.

use crate::types::{Fraction, Size};
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Magic bytes for essence files: "DCPE"
const MAGIC: [u8; 4] = [b'D', b'C', b'P', b'E'];

/// Current essence container version
const VERSION: u16 = 1;

/// Which kind of essence a container wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EssenceKind {
    Picture,
    Sound,
    Subtitle,
}

impl EssenceKind {
    fn to_byte(self) -> u8 {
        match self {
            EssenceKind::Picture => 0,
            EssenceKind::Sound => 1,
            EssenceKind::Subtitle => 2,
        }
    }
}

impl fmt::Display for EssenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EssenceKind::Picture => write!(f, "picture"),
            EssenceKind::Sound => write!(f, "sound"),
            EssenceKind::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// Kind-specific stream description stored in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EssenceDescriptor {
    Picture { size: Size, stereo: bool },
    Sound { channels: u16, sampling_rate: u32 },
    Subtitle { language: Option<String> },
}

impl EssenceDescriptor {
    pub fn kind(&self) -> EssenceKind {
        match self {
            EssenceDescriptor::Picture { .. } => EssenceKind::Picture,
            EssenceDescriptor::Sound { .. } => EssenceKind::Sound,
            EssenceDescriptor::Subtitle { .. } => EssenceKind::Subtitle,
        }
    }

    fn read<R: Read>(kind: u8, reader: &mut R) -> Result<Self> {
        match kind {
            0 => {
                let width = reader.read_u32::<LittleEndian>()?;
                let height = reader.read_u32::<LittleEndian>()?;
                let stereo = reader.read_u8()? != 0;
                Ok(EssenceDescriptor::Picture {
                    size: Size::new(width, height),
                    stereo,
                })
            }
            1 => {
                let channels = reader.read_u16::<LittleEndian>()?;
                let sampling_rate = reader.read_u32::<LittleEndian>()?;
                Ok(EssenceDescriptor::Sound {
                    channels,
                    sampling_rate,
                })
            }
            2 => {
                let language = if reader.read_u8()? != 0 {
                    let len = reader.read_u16::<LittleEndian>()?;
                    let mut bytes = vec![0u8; len as usize];
                    reader.read_exact(&mut bytes)?;
                    Some(
                        String::from_utf8(bytes)
                            .map_err(|_| Error::Codec("subtitle language is not UTF-8".into()))?,
                    )
                } else {
                    None
                };
                Ok(EssenceDescriptor::Subtitle { language })
            }
            other => Err(Error::Codec(format!("unknown essence kind {other}"))),
        }
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            EssenceDescriptor::Picture { size, stereo } => {
                writer.write_u32::<LittleEndian>(size.width)?;
                writer.write_u32::<LittleEndian>(size.height)?;
                writer.write_u8(u8::from(*stereo))?;
            }
            EssenceDescriptor::Sound {
                channels,
                sampling_rate,
            } => {
                writer.write_u16::<LittleEndian>(*channels)?;
                writer.write_u32::<LittleEndian>(*sampling_rate)?;
            }
            EssenceDescriptor::Subtitle { language } => match language {
                Some(language) => {
                    writer.write_u8(1)?;
                    writer.write_u16::<LittleEndian>(language.len() as u16)?;
                    writer.write_all(language.as_bytes())?;
                }
                None => writer.write_u8(0)?,
            },
        }
        Ok(())
    }
}

/// Essence container header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EssenceHeader {
    /// Container version
    pub version: u16,
    /// Identity of the asset this essence belongs to
    pub uuid: Uuid,
    /// Edit rate of the asset
    pub edit_rate: Fraction,
    /// Duration of the whole essence in edit units
    pub intrinsic_duration: u64,
    /// Number of bitstream frames (twice the edit units for stereo pictures)
    pub frame_count: u64,
    /// Offset of the trailing frame table; zero until finalized
    pub frame_table_offset: u64,
    /// Key id when the payloads are encrypted
    pub key_id: Option<Uuid>,
    pub descriptor: EssenceDescriptor,
}

impl EssenceHeader {
    /// Creates a header for a container that has not been written yet
    pub fn new(
        uuid: Uuid,
        edit_rate: Fraction,
        key_id: Option<Uuid>,
        descriptor: EssenceDescriptor,
    ) -> Self {
        Self {
            version: VERSION,
            uuid,
            edit_rate,
            intrinsic_duration: 0,
            frame_count: 0,
            frame_table_offset: 0,
            key_id,
            descriptor,
        }
    }

    pub fn kind(&self) -> EssenceKind {
        self.descriptor.kind()
    }

    /// True once the frame table has been written
    pub fn is_finalized(&self) -> bool {
        self.frame_table_offset != 0
    }

    /// Reads a header from a reader
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        // Read and validate magic bytes
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic { expected: MAGIC });
        }

        let version = reader.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let mut uuid = [0u8; 16];
        reader.read_exact(&mut uuid)?;
        let kind = reader.read_u8()?;
        let edit_rate = Fraction::new(
            reader.read_u32::<LittleEndian>()?,
            reader.read_u32::<LittleEndian>()?,
        );
        let intrinsic_duration = reader.read_u64::<LittleEndian>()?;
        let frame_count = reader.read_u64::<LittleEndian>()?;
        let frame_table_offset = reader.read_u64::<LittleEndian>()?;
        let encrypted = reader.read_u8()? != 0;
        let mut key_id = [0u8; 16];
        reader.read_exact(&mut key_id)?;
        let descriptor = EssenceDescriptor::read(kind, reader)?;

        Ok(Self {
            version,
            uuid: Uuid::from_bytes(uuid),
            edit_rate,
            intrinsic_duration,
            frame_count,
            frame_table_offset,
            key_id: encrypted.then(|| Uuid::from_bytes(key_id)),
            descriptor,
        })
    }

    /// Writes the header to a writer
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_all(self.uuid.as_bytes())?;
        writer.write_u8(self.kind().to_byte())?;
        writer.write_u32::<LittleEndian>(self.edit_rate.numerator)?;
        writer.write_u32::<LittleEndian>(self.edit_rate.denominator)?;
        writer.write_u64::<LittleEndian>(self.intrinsic_duration)?;
        writer.write_u64::<LittleEndian>(self.frame_count)?;
        writer.write_u64::<LittleEndian>(self.frame_table_offset)?;
        writer.write_u8(u8::from(self.key_id.is_some()))?;
        writer.write_all(self.key_id.unwrap_or_else(Uuid::nil).as_bytes())?;
        self.descriptor.write(writer)?;
        Ok(())
    }
}

/// An essence container opened for reading
pub trait EssenceRead: Send {
    fn header(&self) -> &EssenceHeader;

    /// Reads bitstream frame `n` (not trimmed, not decrypted)
    fn read_frame(&mut self, n: u64) -> Result<Vec<u8>>;
}

/// An essence container opened for writing
pub trait EssenceWrite: Send {
    /// Appends a frame payload and returns its (offset, size) in the container
    fn write_frame(&mut self, data: &[u8]) -> Result<(u64, u64)>;

    /// Writes trailing structures and patches the header durations
    fn finalize(&mut self, intrinsic_duration: u64) -> Result<()>;
}

/// The essence codec collaborator
pub trait EssenceCodec: Send + Sync {
    /// Opens an existing container; fails on malformed or inaccessible files
    fn open_read(&self, path: &Path) -> Result<Box<dyn EssenceRead>>;

    /// Creates a container at `path`, truncating anything already there
    fn open_write(&self, path: &Path, header: &EssenceHeader) -> Result<Box<dyn EssenceWrite>>;
}

/// Reference container codec writing `DCPE` files
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCodec;

impl EssenceCodec for FileCodec {
    fn open_read(&self, path: &Path) -> Result<Box<dyn EssenceRead>> {
        Ok(Box::new(FileEssenceReader::open(path)?))
    }

    fn open_write(&self, path: &Path, header: &EssenceHeader) -> Result<Box<dyn EssenceWrite>> {
        Ok(Box::new(FileEssenceWriter::create(path, header.clone())?))
    }
}

struct FileEssenceReader {
    path: PathBuf,
    reader: BufReader<File>,
    header: EssenceHeader,
    frames: Vec<(u64, u64)>,
}

impl FileEssenceReader {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::file("could not open essence file for reading", path, e))?;
        let mut reader = BufReader::new(file);
        let header = EssenceHeader::read(&mut reader).map_err(|e| truncated(e, path))?;
        if !header.is_finalized() {
            return Err(Error::Codec(format!(
                "{} was never finalized",
                path.display()
            )));
        }

        let data_start = reader.stream_position()?;
        let file_len = reader.get_ref().metadata()?.len();
        let table_room = file_len
            .checked_sub(header.frame_table_offset)
            .and_then(|n| n.checked_sub(8))
            .filter(|_| header.frame_table_offset >= data_start)
            .ok_or_else(|| {
                Error::Codec(format!(
                    "{}: frame table offset {} lies outside the file",
                    path.display(),
                    header.frame_table_offset
                ))
            })?;

        reader.seek(SeekFrom::Start(header.frame_table_offset))?;
        let count = reader
            .read_u64::<LittleEndian>()
            .map_err(|e| truncated(e.into(), path))?;
        if count != header.frame_count {
            return Err(Error::Codec(format!(
                "{}: frame table lists {} frames, header says {}",
                path.display(),
                count,
                header.frame_count
            )));
        }

        if count.checked_mul(16).map_or(true, |len| len > table_room) {
            return Err(Error::Codec(format!(
                "{}: frame table of {} entries does not fit in the file",
                path.display(),
                count
            )));
        }

        let mut frames = Vec::with_capacity(count as usize);
        for n in 0..count {
            let offset = reader
                .read_u64::<LittleEndian>()
                .map_err(|e| truncated(e.into(), path))?;
            let size = reader
                .read_u64::<LittleEndian>()
                .map_err(|e| truncated(e.into(), path))?;
            let in_bounds = offset >= data_start
                && offset
                    .checked_add(size)
                    .is_some_and(|end| end <= header.frame_table_offset);
            if !in_bounds {
                return Err(Error::Codec(format!(
                    "{}: frame {} ({} bytes at {}) lies outside the essence data",
                    path.display(),
                    n,
                    size,
                    offset
                )));
            }
            frames.push((offset, size));
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            header,
            frames,
        })
    }
}

impl EssenceRead for FileEssenceReader {
    fn header(&self) -> &EssenceHeader {
        &self.header
    }

    fn read_frame(&mut self, n: u64) -> Result<Vec<u8>> {
        let (offset, size) = *self.frames.get(n as usize).ok_or_else(|| {
            Error::Codec(format!(
                "{}: no frame {} (container holds {})",
                self.path.display(),
                n,
                self.frames.len()
            ))
        })?;
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; size as usize];
        self.reader
            .read_exact(&mut data)
            .map_err(|e| truncated(e.into(), &self.path))?;
        Ok(data)
    }
}

struct FileEssenceWriter {
    writer: BufWriter<File>,
    header: EssenceHeader,
    position: u64,
    frames: Vec<(u64, u64)>,
    finalized: bool,
}

impl FileEssenceWriter {
    fn create(path: &Path, header: EssenceHeader) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| Error::file("could not open essence file for writing", path, e))?;
        let mut writer = BufWriter::new(file);

        let mut encoded = Vec::new();
        header.write(&mut encoded)?;
        writer.write_all(&encoded)?;

        Ok(Self {
            writer,
            header,
            position: encoded.len() as u64,
            frames: Vec::new(),
            finalized: false,
        })
    }
}

impl EssenceWrite for FileEssenceWriter {
    fn write_frame(&mut self, data: &[u8]) -> Result<(u64, u64)> {
        if self.finalized {
            return Err(Error::Codec("container already finalized".into()));
        }
        self.writer.write_all(data)?;
        let entry = (self.position, data.len() as u64);
        self.frames.push(entry);
        self.position += data.len() as u64;
        Ok(entry)
    }

    fn finalize(&mut self, intrinsic_duration: u64) -> Result<()> {
        if self.finalized {
            return Err(Error::Codec("container already finalized".into()));
        }

        // Write frame table
        self.writer
            .write_u64::<LittleEndian>(self.frames.len() as u64)?;
        for (offset, size) in &self.frames {
            self.writer.write_u64::<LittleEndian>(*offset)?;
            self.writer.write_u64::<LittleEndian>(*size)?;
        }

        // Patch header; its length does not change
        self.header.intrinsic_duration = intrinsic_duration;
        self.header.frame_count = self.frames.len() as u64;
        self.header.frame_table_offset = self.position;
        self.writer.seek(SeekFrom::Start(0))?;
        self.header.write(&mut self.writer)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        self.finalized = true;
        Ok(())
    }
}

/// Short reads inside a container mean the file is malformed, not that IO failed
fn truncated(err: Error, path: &Path) -> Error {
    match err {
        Error::Io(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Error::Codec(format!("{} is truncated", path.display()))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn picture_header(stereo: bool) -> EssenceHeader {
        EssenceHeader::new(
            Uuid::new_v4(),
            Fraction::new(24, 1),
            None,
            EssenceDescriptor::Picture {
                size: Size::new(1998, 1080),
                stereo,
            },
        )
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = picture_header(true);
        header.key_id = Some(Uuid::new_v4());
        header.intrinsic_duration = 48;
        header.frame_count = 96;
        header.frame_table_offset = 4096;

        let mut buffer = Vec::new();
        header.write(&mut buffer).unwrap();
        let read_header = EssenceHeader::read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(header, read_header);
    }

    #[test]
    fn test_subtitle_and_sound_descriptors_roundtrip() {
        for descriptor in [
            EssenceDescriptor::Subtitle {
                language: Some("fr".into()),
            },
            EssenceDescriptor::Subtitle { language: None },
            EssenceDescriptor::Sound {
                channels: 6,
                sampling_rate: 48_000,
            },
        ] {
            let header =
                EssenceHeader::new(Uuid::new_v4(), Fraction::new(25, 1), None, descriptor);
            let mut buffer = Vec::new();
            header.write(&mut buffer).unwrap();
            assert_eq!(header, EssenceHeader::read(&mut Cursor::new(buffer)).unwrap());
        }
    }

    #[test]
    fn test_file_codec_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mxf");
        let header = picture_header(false);

        let mut writer = FileCodec.open_write(&path, &header).unwrap();
        let mut last_end = 0;
        for i in 0..5u8 {
            let (offset, size) = writer.write_frame(&vec![i; 10 + i as usize]).unwrap();
            assert!(offset >= last_end);
            last_end = offset + size;
        }
        writer.finalize(5).unwrap();
        assert!(writer.write_frame(b"late").is_err());

        let mut reader = FileCodec.open_read(&path).unwrap();
        assert_eq!(reader.header().uuid, header.uuid);
        assert_eq!(reader.header().intrinsic_duration, 5);
        assert_eq!(reader.header().frame_count, 5);
        assert_eq!(reader.read_frame(3).unwrap(), vec![3u8; 13]);
        assert_eq!(reader.read_frame(0).unwrap(), vec![0u8; 10]);
        assert!(matches!(reader.read_frame(5), Err(Error::Codec(_))));
    }

    #[test]
    fn test_unfinalized_container_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.mxf");
        {
            let mut writer = FileCodec.open_write(&path, &picture_header(false)).unwrap();
            writer.write_frame(b"frame").unwrap();
        }
        assert!(matches!(FileCodec.open_read(&path), Err(Error::Codec(_))));
    }

    #[test]
    fn test_missing_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.mxf");
        assert!(matches!(
            FileCodec.open_read(&missing),
            Err(Error::File { .. })
        ));

        let foreign = dir.path().join("foreign.mxf");
        std::fs::write(&foreign, b"RIFF....WAVEfmt ").unwrap();
        let err = FileCodec.open_read(&foreign).err().unwrap();
        assert!(matches!(err, Error::InvalidMagic { .. }));
        assert!(err.is_missing_essence());
    }

    /// Writes a two-frame container and returns its path and frame-table offset
    fn two_frames(dir: &Path) -> (PathBuf, u64) {
        let path = dir.join("video.mxf");
        let mut writer = FileCodec.open_write(&path, &picture_header(false)).unwrap();
        writer.write_frame(b"first").unwrap();
        writer.write_frame(b"second").unwrap();
        writer.finalize(2).unwrap();
        drop(writer);

        let bytes = std::fs::read(&path).unwrap();
        let table = u64::from_le_bytes(bytes[47..55].try_into().unwrap());
        (path, table)
    }

    fn patch_u64(path: &Path, at: u64, value: u64) {
        let mut bytes = std::fs::read(path).unwrap();
        let at = at as usize;
        bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_oversized_frame_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (path, table) = two_frames(dir.path());
        patch_u64(&path, 39, 1 << 62);
        patch_u64(&path, table, 1 << 62);

        let err = FileCodec.open_read(&path).err().unwrap();
        assert!(matches!(err, Error::Codec(_)));
        assert!(err.is_missing_essence());
    }

    #[test]
    fn test_frame_outside_essence_data_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (path, table) = two_frames(dir.path());
        // size of the second frame
        patch_u64(&path, table + 8 + 16 + 8, u64::MAX);
        assert!(matches!(FileCodec.open_read(&path), Err(Error::Codec(_))));

        let (path, _) = two_frames(dir.path());
        patch_u64(&path, 47, u64::MAX - 4);
        assert!(matches!(FileCodec.open_read(&path), Err(Error::Codec(_))));
    }
}
