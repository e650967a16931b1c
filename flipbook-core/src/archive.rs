//! Project archive serialization and deserialization
//!
//! A project archive packs a frame manifest and one entry per frame file
//! into a single binary container.

use crate::frame::{fresh_location, FrameRecord};
use crate::sequence::FrameSequence;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Magic bytes for project archives: "FBK\0"
const MAGIC: [u8; 4] = [b'F', b'B', b'K', 0];

/// Current archive format version
const VERSION: u16 = 1;

/// Name of the manifest entry inside an archive
pub const MANIFEST_NAME: &str = "frames.json";

/// Serialized form of a frame inside the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFrame {
    /// Frame file name, relative to the archive
    pub image_location: String,
    /// Frame delay in milliseconds
    pub delay_ms: u32,
}

/// Frame list stored alongside the frame files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub dpi: f64,
    pub frames: Vec<ProjectFrame>,
}

/// Archive header
#[derive(Debug, Clone)]
pub struct ArchiveHeader {
    /// Format version
    pub version: u16,
    /// Number of entries
    pub num_entries: u32,
}

impl ArchiveHeader {
    /// Creates a new header
    pub fn new(num_entries: u32) -> Self {
        Self {
            version: VERSION,
            num_entries,
        }
    }

    /// Reads a header from a reader
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic);
        }

        let version = reader.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let num_entries = reader.read_u32::<LittleEndian>()?;
        Ok(Self {
            version,
            num_entries,
        })
    }

    /// Writes the header to a writer
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.num_entries)?;
        Ok(())
    }
}

/// A named blob inside the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Complete project archive
#[derive(Debug, Clone)]
pub struct ProjectArchive {
    /// Archive header
    pub header: ArchiveHeader,
    /// Manifest and frame file entries
    pub entries: Vec<ArchiveEntry>,
}

/// File name component of a path written on any platform
fn file_name_of(location: &str) -> &str {
    location.rsplit(['/', '\\']).next().unwrap_or(location)
}

impl ProjectArchive {
    /// Creates an archive from entries
    pub fn new(entries: Vec<ArchiveEntry>) -> Self {
        Self {
            header: ArchiveHeader::new(entries.len() as u32),
            entries,
        }
    }

    /// Packs a sequence: the manifest plus every frame file, rebased to bare file names
    pub fn from_sequence(sequence: &FrameSequence) -> Result<Self> {
        let mut frames = Vec::with_capacity(sequence.len());
        let mut entries = Vec::with_capacity(sequence.len() + 1);

        for record in sequence.iter() {
            let name = record
                .image_location
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| Error::MissingFrame(record.image_location.display().to_string()))?
                .to_string();

            frames.push(ProjectFrame {
                image_location: name.clone(),
                delay_ms: record.delay_ms(),
            });
            entries.push(ArchiveEntry {
                name,
                data: fs::read(&record.image_location)?,
            });
        }

        let manifest = ProjectManifest {
            dpi: sequence.dpi(),
            frames,
        };
        entries.insert(
            0,
            ArchiveEntry {
                name: MANIFEST_NAME.to_string(),
                data: serde_json::to_vec_pretty(&manifest)?,
            },
        );

        Ok(Self::new(entries))
    }

    /// Reads an archive from a reader
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let header = ArchiveHeader::read(&mut reader)?;

        let mut entries = Vec::new();
        for _ in 0..header.num_entries {
            let name_len = reader.read_u16::<LittleEndian>()?;
            let mut name = vec![0u8; name_len as usize];
            reader.read_exact(&mut name)?;

            // The declared length is untrusted; read at most that much
            let data_len = reader.read_u64::<LittleEndian>()?;
            let mut data = Vec::new();
            let read = reader.by_ref().take(data_len).read_to_end(&mut data)?;
            if (read as u64) < data_len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("archive entry declares {data_len} bytes, found {read}"),
                )
                .into());
            }

            entries.push(ArchiveEntry {
                name: String::from_utf8_lossy(&name).into_owned(),
                data,
            });
        }

        Ok(Self { header, entries })
    }

    /// Writes the archive to a writer
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        ArchiveHeader::new(self.entries.len() as u32).write(&mut writer)?;

        for entry in &self.entries {
            writer.write_u16::<LittleEndian>(entry.name.len() as u16)?;
            writer.write_all(entry.name.as_bytes())?;
            writer.write_u64::<LittleEndian>(entry.data.len() as u64)?;
            writer.write_all(&entry.data)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Parses the manifest entry
    pub fn manifest(&self) -> Result<ProjectManifest> {
        let entry = self
            .entries
            .iter()
            .find(|e| file_name_of(&e.name) == MANIFEST_NAME)
            .ok_or(Error::MissingManifest)?;
        Ok(serde_json::from_slice(&entry.data)?)
    }

    /// Finds an entry whose file name matches, ignoring any directory part
    pub fn entry(&self, location: &str) -> Option<&ArchiveEntry> {
        let wanted = file_name_of(location);
        self.entries.iter().find(|e| file_name_of(&e.name) == wanted)
    }

    /// Writes every manifest frame into `destination` and returns the rebased sequence.
    ///
    /// Entries are matched to the manifest by file name only. If any frame is
    /// missing, the files written so far are removed and nothing is returned.
    pub fn extract(&self, destination: &Path) -> Result<FrameSequence> {
        let manifest = self.manifest()?;
        fs::create_dir_all(destination)?;

        let mut frames = Vec::with_capacity(manifest.frames.len());
        let mut used = HashSet::new();
        for frame in &manifest.frames {
            let written = self.extract_frame(frame, destination, &mut used);
            match written {
                Ok(record) => frames.push(record),
                Err(e) => {
                    for record in frames {
                        let _ = record.delete();
                    }
                    return Err(e);
                }
            }
        }

        Ok(FrameSequence::from_records(destination, frames).with_dpi(manifest.dpi))
    }

    /// Writes one frame. A file name already used by an earlier frame gets a
    /// fresh name so that no two records share a file.
    fn extract_frame(
        &self,
        frame: &ProjectFrame,
        destination: &Path,
        used: &mut HashSet<String>,
    ) -> Result<FrameRecord> {
        let entry = self
            .entry(&frame.image_location)
            .ok_or_else(|| Error::MissingFrame(frame.image_location.clone()))?;

        let name = file_name_of(&entry.name);
        let location = if used.insert(name.to_string()) {
            destination.join(name)
        } else {
            let extension = Path::new(name)
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("png");
            fresh_location(destination, extension)
        };
        fs::write(&location, &entry.data)?;
        Ok(FrameRecord::new(location, frame.delay_ms))
    }
}

/// Saves a sequence as a project archive at `path`
pub fn save_project(sequence: &FrameSequence, path: &Path) -> Result<()> {
    let archive = ProjectArchive::from_sequence(sequence)?;
    let file = File::create(path)?;
    archive.write(BufWriter::new(file))
}

/// Loads a project archive from `path` into `destination`
pub fn load_project(path: &Path, destination: &Path) -> Result<FrameSequence> {
    let file = File::open(path)?;
    let archive = ProjectArchive::read(BufReader::new(file))?;
    archive.extract(destination)
}
