use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Largest payload a single record may claim. A length prefix past this is
/// treated as a damaged tail rather than allocated.
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// Why replay stopped reading records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Clean,
    Truncated,
    Oversized,
    BadChecksum,
    Undecodable,
}

enum Frame {
    Record(Event, u64),
    End(TailState),
}

/// Read one `[len][payload][crc]` record. Returns the decoded event and the
/// number of bytes it occupied, or why the journal ends here.
fn read_frame(reader: &mut impl Read) -> io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    match filled {
        0 => return Ok(Frame::End(TailState::Clean)),
        4 => {}
        _ => return Ok(Frame::End(TailState::Truncated)),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_RECORD_LEN {
        return Ok(Frame::End(TailState::Oversized));
    }

    let mut body = vec![0u8; len + 4];
    match reader.read_exact(&mut body) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Frame::End(TailState::Truncated)),
        Err(e) => return Err(e),
    }
    let (payload, crc) = body.split_at(len);
    let crc = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    if crc != crc32fast::hash(payload) {
        return Ok(Frame::End(TailState::BadChecksum));
    }
    match bincode::deserialize::<Event>(payload) {
        Ok(event) => Ok(Frame::Record(event, (len + 8) as u64)),
        Err(_) => Ok(Frame::End(TailState::Undecodable)),
    }
}

/// Result of scanning a journal: the intact prefix and where it stops.
#[derive(Debug)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte length of the intact prefix.
    pub valid_len: u64,
    pub tail: TailState,
}

/// Append-only booking journal.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A damaged tail (crash mid-write) is cut off by `recover` before the
///   journal is reopened, so later appends are never stranded behind it.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Replay the journal, truncate any damaged tail, and open it for appends.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let replay = Self::scan(path)?;
        if replay.tail != TailState::Clean {
            tracing::warn!(
                "journal {} ends in a damaged entry ({:?}); keeping {} events, cutting at byte {}",
                path.display(),
                replay.tail,
                replay.events.len(),
                replay.valid_len
            );
            OpenOptions::new().write(true).open(path)?.set_len(replay.valid_len)?;
        }
        Ok((Self::open(path)?, replay.events))
    }

    /// Append and fsync one event. Production code batches through
    /// `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write the compacted snapshot next to the journal and fsync it. Slow;
    /// runs before the swap.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::snapshot_path(path))?);
        events.iter().try_for_each(|e| encode_event(&mut writer, e))?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the journal and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::snapshot_path(&self.path), &self.path)?;
        *self = Self::open(&self.path)?;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Scan the journal up to the first damaged record. A missing file is
    /// an empty, clean journal.
    pub fn scan(path: &Path) -> io::Result<Replay> {
        let mut replay = Replay {
            events: Vec::new(),
            valid_len: 0,
            tail: TailState::Clean,
        };
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(replay),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        loop {
            match read_frame(&mut reader)? {
                Frame::Record(event, size) => {
                    replay.events.push(event);
                    replay.valid_len += size;
                }
                Frame::End(tail) => {
                    replay.tail = tail;
                    return Ok(replay);
                }
            }
        }
    }

    /// Every intact event in order.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Ok(Self::scan(path)?.events)
    }
}
