//! Streaming reader for extended tar archives.
//!
//! [`ArchiveReader`] consumes the decompressed byte stream one block at a
//! time and yields fully-resolved [`ArchiveEntry`] values in archive order.
//! GNU long-name entries and PAX extended headers never surface to the
//! caller: their payloads are parked as pending overrides and attached to
//! exactly the next regular/link/directory entry, then cleared. POSIX global
//! headers, GNU volume headers, and unrecognized type flags are skipped.
//!
//! Extension records always precede the entry they annotate, and several may
//! chain (a global header, then a PAX header, then a long name) before the
//! real entry appears, hence pending state cleared at yield rather than a
//! 1:1 association at read time.
//!
//! After an entry is yielded, its data section can be consumed through
//! [`read_data`]/[`copy_data`]; whatever the caller leaves unread is skipped
//! automatically on the next [`next_entry`] call.
//!
//! [`read_data`]: ArchiveReader::read_data
//! [`copy_data`]: ArchiveReader::copy_data
//! [`next_entry`]: ArchiveReader::next_entry

use std::io::{ErrorKind, Read, Write};

use crate::block::BlockReader;
use crate::entry::{ArchiveEntry, PAX_LINKPATH, PAX_PATH};
use crate::error::{LayerError, Result};
use crate::header::{Header, HeaderError, TypeFlag, BLOCK_SIZE};
use crate::pax::PaxParser;

/// Observable reader state, one per [`ArchiveReader`] lifecycle phase.
///
/// Between `next_entry` calls the reader is in `Start`, `YieldedEntry`,
/// `EndOfArchive`, or `Error`; `AwaitingEntry` is the in-flight phase while
/// extension records are being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// No entry has been requested yet.
    Start,
    /// A header is being resolved (extension records may be pending).
    AwaitingEntry,
    /// An entry has been yielded; its data section may be partly unread.
    YieldedEntry,
    /// The end-of-archive marker or a clean EOF was reached. Terminal.
    EndOfArchive,
    /// A fatal condition was raised. Terminal; further calls yield nothing.
    Error,
}

/// Overrides produced by extension records, applied to the next real entry.
#[derive(Debug, Default)]
struct PendingOverrides {
    name: Option<String>,
    link_name: Option<String>,
    headers: Option<std::collections::BTreeMap<String, String>>,
}

/// The extended tar reader.
pub struct ArchiveReader<R> {
    blocks: BlockReader<R>,
    state: ReaderState,
    pending: PendingOverrides,
    /// Data-section length of the current entry, from the constructed entry.
    entry_size: u64,
    /// Bytes of the data section handed to the caller so far.
    entry_offset: u64,
    /// Whole data blocks consumed from the stream for the current entry.
    blocks_consumed: u64,
    /// The current partially-consumed data block.
    data_block: [u8; BLOCK_SIZE],
    /// Entries bypassed because their type flag is not supported.
    skipped: u64,
}

impl<R: Read> ArchiveReader<R> {
    /// Wrap a decompressed archive byte stream.
    pub fn new(stream: R) -> Self {
        Self {
            blocks: BlockReader::new(stream),
            state: ReaderState::Start,
            pending: PendingOverrides::default(),
            entry_size: 0,
            entry_offset: 0,
            blocks_consumed: 0,
            data_block: [0u8; BLOCK_SIZE],
            skipped: 0,
        }
    }

    /// Current reader state, for diagnostics and tests.
    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Data-section length the reader is using for the current entry.
    ///
    /// Always equal to the yielded entry's `size`; the reader re-records it
    /// from the constructed entry rather than the raw header field.
    #[must_use]
    pub fn data_size(&self) -> u64 {
        self.entry_size
    }

    /// Number of unsupported-type entries bypassed so far.
    #[must_use]
    pub fn skipped_entries(&self) -> u64 {
        self.skipped
    }

    /// Advance to the next entry.
    ///
    /// Skips any unread remainder of the previous entry's data section,
    /// resolves extension records, and returns the next regular file,
    /// hard link, symlink, or directory entry. Returns `Ok(None)` at
    /// end-of-archive and after a fatal condition.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InvalidHeader`] on a checksum or field failure
    /// (the archive is corrupt; iteration stops), and I/O or truncation
    /// errors from the underlying stream.
    pub fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        match self.state {
            ReaderState::EndOfArchive | ReaderState::Error => return Ok(None),
            ReaderState::YieldedEntry => self.skip_to_next_header()?,
            ReaderState::Start | ReaderState::AwaitingEntry => {}
        }
        self.state = ReaderState::AwaitingEntry;

        loop {
            let block = match self.blocks.read_block() {
                Ok(Some(block)) => block,
                Ok(None) => {
                    // EOF without the formal terminator still ends the
                    // archive cleanly.
                    self.state = ReaderState::EndOfArchive;
                    return Ok(None);
                }
                Err(e) => return Err(self.fail(LayerError::Io(e))),
            };

            let header = Header::from_bytes_exact(&block);

            if header.is_zero_block() {
                // Consume the mandatory second terminator block so the
                // stream is left at the formal archive end. Its absence
                // also counts as a clean end.
                let _ = self.blocks.read_block();
                self.state = ReaderState::EndOfArchive;
                return Ok(None);
            }

            if let Err(e) = header.verify_checksum() {
                return Err(self.fail_header(e));
            }
            let size = match header.entry_size() {
                Ok(size) => size,
                Err(e) => return Err(self.fail_header(e)),
            };
            self.begin_data_section(size);

            match header.type_flag() {
                TypeFlag::GnuLongName => {
                    let name = self.read_name_body("long name entry")?;
                    self.pending.name = Some(name);
                    self.skip_to_next_header()?;
                }
                TypeFlag::PosixExtendedHeader => {
                    let headers = self.read_pax_body()?;
                    // PAX path/linkpath supersede a prior GNU long name.
                    if let Some(path) = headers.get(PAX_PATH) {
                        self.pending.name = Some(path.clone());
                    }
                    if let Some(link) = headers.get(PAX_LINKPATH) {
                        self.pending.link_name = Some(link.clone());
                    }
                    self.pending.headers = Some(headers);
                    self.skip_to_next_header()?;
                }
                TypeFlag::PosixGlobalHeader => {
                    // Global defaults are not supported; drop the body.
                    log::debug!("skipping POSIX global header");
                    self.skipped += 1;
                    self.skip_to_next_header()?;
                }
                TypeFlag::GnuVolumeHeader => {
                    log::debug!("skipping GNU volume header");
                    self.skipped += 1;
                    self.skip_to_next_header()?;
                }
                TypeFlag::Other(flag) => {
                    log::debug!(
                        "skipping unsupported entry type {:?} for {:?}",
                        flag as char,
                        String::from_utf8_lossy(header.name_bytes())
                    );
                    self.skipped += 1;
                    self.skip_to_next_header()?;
                }
                _ => {
                    let mut entry = match ArchiveEntry::from_header(header) {
                        Ok(entry) => entry,
                        Err(e) => return Err(self.fail_header(e)),
                    };

                    if let Some(name) = self.pending.name.take() {
                        entry.name = name;
                    }
                    if let Some(link_name) = self.pending.link_name.take() {
                        entry.link_name = link_name;
                    }
                    if let Some(headers) = self.pending.headers.take() {
                        entry.extra_headers = headers;
                    }

                    // The constructed entry's size is authoritative for
                    // data skipping.
                    self.begin_data_section(entry.size);
                    self.state = ReaderState::YieldedEntry;
                    return Ok(Some(entry));
                }
            }
        }
    }

    /// Read up to `buf.len()` bytes of the current entry's data section.
    ///
    /// Returns 0 once the data section is exhausted (directories and links
    /// have none).
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::TruncatedEntry`] if the stream ends before the
    /// declared data length.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.entry_size - self.entry_offset;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let pos_in_block = (self.entry_offset % BLOCK_SIZE as u64) as usize;
        if pos_in_block == 0 {
            match self.blocks.read_block() {
                Ok(Some(block)) => {
                    self.data_block = block;
                    self.blocks_consumed += 1;
                }
                Ok(None) => return Err(self.truncated("entry data")),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(self.truncated("entry data"));
                }
                Err(e) => return Err(self.fail(LayerError::Io(e))),
            }
        }

        let available = (BLOCK_SIZE - pos_in_block).min(remaining as usize);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.data_block[pos_in_block..pos_in_block + n]);
        self.entry_offset += n as u64;
        Ok(n)
    }

    /// Copy the entire remaining data section into a writer, returning the
    /// number of bytes copied.
    pub fn copy_data(&mut self, writer: &mut impl Write) -> Result<u64> {
        let mut buf = [0u8; BLOCK_SIZE];
        let mut total = 0u64;
        loop {
            let n = self.read_data(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            writer.write_all(&buf[..n])?;
            total += n as u64;
        }
    }

    /// Reset data-section bookkeeping for a new entry of `size` bytes.
    fn begin_data_section(&mut self, size: u64) {
        self.entry_size = size;
        self.entry_offset = 0;
        self.blocks_consumed = 0;
    }

    /// Discard whatever remains of the current data section, including the
    /// padding up to the block boundary.
    fn skip_to_next_header(&mut self) -> Result<()> {
        let total_blocks = self.entry_size.div_ceil(BLOCK_SIZE as u64);
        let to_skip = (total_blocks - self.blocks_consumed) * BLOCK_SIZE as u64;
        if to_skip > 0 {
            match self.blocks.skip(to_skip) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(self.truncated("entry data"));
                }
                Err(e) => return Err(self.fail(LayerError::Io(e))),
            }
        }
        self.entry_offset = self.entry_size;
        Ok(())
    }

    /// Read the current (extension) entry's data section as a string,
    /// dropping trailing NULs.
    fn read_name_body(&mut self, context: &'static str) -> Result<String> {
        let body = self.read_body_bytes(context)?;
        let end = body
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        Ok(String::from_utf8_lossy(&body[..end]).into_owned())
    }

    /// Read and decode the current PAX extended-header body.
    fn read_pax_body(&mut self) -> Result<std::collections::BTreeMap<String, String>> {
        let mut parser = PaxParser::new();
        let mut buf = [0u8; BLOCK_SIZE];
        loop {
            let n = match self.read_data(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(LayerError::TruncatedEntry { record, block, .. }) => {
                    return Err(LayerError::TruncatedEntry {
                        record,
                        block,
                        context: "extended header body",
                    });
                }
                Err(e) => return Err(e),
            };
            parser.feed(&buf[..n]);
        }

        parser.finish().map_err(|source| {
            self.state = ReaderState::Error;
            LayerError::InvalidPaxHeader {
                record: self.blocks.current_record(),
                block: self.blocks.current_block(),
                source,
            }
        })
    }

    /// Read the current entry's complete data section into memory. Only used
    /// for extension bodies, which are small.
    fn read_body_bytes(&mut self, context: &'static str) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        let mut buf = [0u8; BLOCK_SIZE];
        loop {
            let n = match self.read_data(&mut buf) {
                Ok(0) => return Ok(body),
                Ok(n) => n,
                Err(LayerError::TruncatedEntry { record, block, .. }) => {
                    return Err(LayerError::TruncatedEntry {
                        record,
                        block,
                        context,
                    });
                }
                Err(e) => return Err(e),
            };
            body.extend_from_slice(&buf[..n]);
        }
    }

    /// Park the reader in the terminal error state.
    fn fail(&mut self, error: LayerError) -> LayerError {
        self.state = ReaderState::Error;
        self.entry_size = 0;
        self.entry_offset = 0;
        error
    }

    fn fail_header(&mut self, source: HeaderError) -> LayerError {
        let record = self.blocks.current_record();
        let block = self.blocks.current_block();
        self.fail(LayerError::InvalidHeader {
            record,
            block,
            source,
        })
    }

    fn truncated(&mut self, context: &'static str) -> LayerError {
        let record = self.blocks.current_record();
        let block = self.blocks.current_block();
        self.fail(LayerError::TruncatedEntry {
            record,
            block,
            context,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::entry::{PAX_WIN_FILEATTR, PAX_WIN_RAWSD};

    /// Build one raw 512-byte header block with a valid checksum.
    fn raw_header(name: &str, size: u64, type_flag: u8) -> [u8; BLOCK_SIZE] {
        let mut header = Header::new_ustar();
        let bytes = header.as_mut_bytes();
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        let size_field = format!("{size:011o}\0");
        bytes[124..136].copy_from_slice(size_field.as_bytes());
        bytes[156] = type_flag;

        let sum = header.compute_checksum();
        let checksum_field = format!("{sum:06o}\0 ");
        header.as_mut_bytes()[148..156].copy_from_slice(checksum_field.as_bytes());
        *header.as_bytes()
    }

    /// Append a header and its zero-padded data section.
    fn push_entry(archive: &mut Vec<u8>, name: &str, type_flag: u8, data: &[u8]) {
        archive.extend_from_slice(&raw_header(name, data.len() as u64, type_flag));
        archive.extend_from_slice(data);
        let padding = data.len().next_multiple_of(BLOCK_SIZE) - data.len();
        archive.extend(std::iter::repeat_n(0u8, padding));
    }

    fn push_terminator(archive: &mut Vec<u8>) {
        archive.extend(std::iter::repeat_n(0u8, BLOCK_SIZE * 2));
    }

    fn encode_pax_record(key: &str, value: &str) -> Vec<u8> {
        let payload = format!(" {key}={value}\n");
        let mut len = payload.len() + 1;
        while len != payload.len() + len.to_string().len() {
            len = payload.len() + len.to_string().len();
        }
        format!("{len}{payload}").into_bytes()
    }

    fn reader(archive: Vec<u8>) -> ArchiveReader<Cursor<Vec<u8>>> {
        ArchiveReader::new(Cursor::new(archive))
    }

    #[test]
    fn test_plain_entries_in_order() {
        let mut archive = Vec::new();
        push_entry(&mut archive, "a.txt", b'0', b"first");
        push_entry(&mut archive, "dir/", 0, &[]);
        push_entry(&mut archive, "b.txt", b'0', b"second file contents");
        push_terminator(&mut archive);

        let mut reader = reader(archive);

        let a = reader.next_entry().unwrap().unwrap();
        assert_eq!(a.name, "a.txt");
        assert_eq!(a.type_flag, TypeFlag::RegularFile);
        assert_eq!(a.size, 5);
        assert!(a.extra_headers.is_empty());

        // Data left unread: the reader must skip it on its own.
        let dir = reader.next_entry().unwrap().unwrap();
        assert_eq!(dir.type_flag, TypeFlag::OldNormal);
        assert!(dir.is_directory());

        let b = reader.next_entry().unwrap().unwrap();
        assert_eq!(b.name, "b.txt");
        let mut contents = Vec::new();
        reader.copy_data(&mut contents).unwrap();
        assert_eq!(contents, b"second file contents");

        assert!(reader.next_entry().unwrap().is_none());
        assert_eq!(reader.state(), ReaderState::EndOfArchive);
    }

    #[test]
    fn test_data_size_matches_entry_size() {
        let mut archive = Vec::new();
        push_entry(&mut archive, "f.bin", b'0', &[0xa5; 1000]);
        push_terminator(&mut archive);

        let mut reader = reader(archive);
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(reader.data_size(), entry.size);
        assert_eq!(entry.size, 1000);
    }

    #[test]
    fn test_read_data_across_blocks() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let mut archive = Vec::new();
        push_entry(&mut archive, "f.bin", b'0', &data);
        push_terminator(&mut archive);

        let mut reader = reader(archive);
        reader.next_entry().unwrap().unwrap();

        // Odd-sized reads force straddling the 512-byte block boundary.
        let mut collected = Vec::new();
        let mut buf = [0u8; 333];
        loop {
            let n = reader.read_data(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, data);
    }

    #[test]
    fn test_gnu_long_name_applies_to_next_entry() {
        let long_name = format!("deep/{}/file.txt", "d".repeat(120));
        let mut payload = long_name.clone().into_bytes();
        payload.push(0);

        let mut archive = Vec::new();
        push_entry(&mut archive, "././@LongLink", b'L', &payload);
        push_entry(&mut archive, "truncated-name", b'0', b"x");
        push_entry(&mut archive, "next.txt", b'0', b"y");
        push_terminator(&mut archive);

        let mut reader = reader(archive);

        let first = reader.next_entry().unwrap().unwrap();
        assert_eq!(first.name, long_name);

        // The override applies exactly once.
        let second = reader.next_entry().unwrap().unwrap();
        assert_eq!(second.name, "next.txt");
    }

    #[test]
    fn test_gnu_long_name_from_tar_builder() {
        let long_path = format!("very/long/path/{}", "x".repeat(120));
        let mut data = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut data);
            let mut header = tar::Header::new_gnu();
            header.set_mode(0o644);
            header.set_size(7);
            header.set_entry_type(tar::EntryType::Regular);
            builder
                .append_data(&mut header, &long_path, b"content".as_slice())
                .unwrap();
            builder.finish().unwrap();
        }

        let mut reader = reader(data);
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name, long_path);
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_pax_overrides_and_headers() {
        let mut body = Vec::new();
        body.extend_from_slice(&encode_pax_record("path", "real/name.txt"));
        body.extend_from_slice(&encode_pax_record("linkpath", "real/target.txt"));
        body.extend_from_slice(&encode_pax_record(PAX_WIN_FILEATTR, "32"));

        let mut archive = Vec::new();
        push_entry(&mut archive, "PaxHeaders/0", b'x', &body);
        push_entry(&mut archive, "short-name", b'1', &[]);
        push_entry(&mut archive, "plain.txt", b'0', b"z");
        push_terminator(&mut archive);

        let mut reader = reader(archive);

        let link = reader.next_entry().unwrap().unwrap();
        assert_eq!(link.type_flag, TypeFlag::HardLink);
        assert_eq!(link.name, "real/name.txt");
        assert_eq!(link.link_name, "real/target.txt");
        assert_eq!(link.extra_header(PAX_WIN_FILEATTR), Some("32"));

        // Pending state must not leak into the following entry.
        let plain = reader.next_entry().unwrap().unwrap();
        assert_eq!(plain.name, "plain.txt");
        assert_eq!(plain.link_name, "");
        assert!(plain.extra_headers.is_empty());
    }

    #[test]
    fn test_pax_path_supersedes_gnu_long_name() {
        let mut gnu_payload = b"gnu/long/name.txt".to_vec();
        gnu_payload.push(0);
        let pax_body = encode_pax_record("path", "pax/wins.txt");

        let mut archive = Vec::new();
        push_entry(&mut archive, "././@LongLink", b'L', &gnu_payload);
        push_entry(&mut archive, "PaxHeaders/0", b'x', &pax_body);
        push_entry(&mut archive, "header-name", b'0', &[]);
        push_terminator(&mut archive);

        let mut reader = reader(archive);
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name, "pax/wins.txt");
    }

    #[test]
    fn test_global_and_volume_headers_skipped() {
        let mut archive = Vec::new();
        push_entry(&mut archive, "ignored", b'g', b"19 atime=123456789\n");
        push_entry(&mut archive, "volume-label", b'V', &[]);
        push_entry(&mut archive, "file.txt", b'0', b"data");
        push_terminator(&mut archive);

        let mut reader = reader(archive);
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name, "file.txt");
        assert!(entry.extra_headers.is_empty());
        assert_eq!(reader.skipped_entries(), 2);
    }

    #[test]
    fn test_unknown_type_skipped_with_data() {
        let mut archive = Vec::new();
        push_entry(&mut archive, "sparse-thing", b'S', &[1u8; 700]);
        push_entry(&mut archive, "file.txt", b'0', b"data");
        push_terminator(&mut archive);

        let mut reader = reader(archive);
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name, "file.txt");
        assert_eq!(reader.skipped_entries(), 1);
    }

    #[test]
    fn test_checksum_corruption_is_fatal() {
        let mut archive = Vec::new();
        push_entry(&mut archive, "fine.txt", b'0', b"data");
        push_terminator(&mut archive);

        // Flip one byte in a non-checksum field.
        archive[0] ^= 0x01;

        let mut reader = reader(archive);
        let err = reader.next_entry().unwrap_err();
        assert!(matches!(
            err,
            LayerError::InvalidHeader {
                record: 0,
                block: 1,
                source: HeaderError::ChecksumMismatch { .. },
            }
        ));
        assert_eq!(reader.state(), ReaderState::Error);

        // Terminal: the iterator stays parked.
        assert!(reader.next_entry().unwrap().is_none());
        assert_eq!(reader.state(), ReaderState::Error);
    }

    #[test]
    fn test_end_of_archive_consumes_second_terminator() {
        let mut archive = Vec::new();
        push_entry(&mut archive, "a.txt", b'0', b"x");
        push_terminator(&mut archive);

        let mut reader = reader(archive);
        reader.next_entry().unwrap().unwrap();
        assert!(reader.next_entry().unwrap().is_none());
        assert_eq!(reader.state(), ReaderState::EndOfArchive);
    }

    #[test]
    fn test_single_zero_block_then_eof() {
        let mut archive = Vec::new();
        push_entry(&mut archive, "a.txt", b'0', b"x");
        archive.extend(std::iter::repeat_n(0u8, BLOCK_SIZE));

        let mut reader = reader(archive);
        reader.next_entry().unwrap().unwrap();
        assert!(reader.next_entry().unwrap().is_none());
        assert_eq!(reader.state(), ReaderState::EndOfArchive);
    }

    #[test]
    fn test_bare_eof_without_terminator() {
        let mut archive = Vec::new();
        push_entry(&mut archive, "a.txt", b'0', b"x");

        let mut reader = reader(archive);
        reader.next_entry().unwrap().unwrap();
        assert!(reader.next_entry().unwrap().is_none());
        assert_eq!(reader.state(), ReaderState::EndOfArchive);
    }

    #[test]
    fn test_truncated_data_section() {
        let mut archive = Vec::new();
        archive.extend_from_slice(&raw_header("big.bin", 4096, b'0'));
        archive.extend_from_slice(&[0u8; BLOCK_SIZE]); // only one data block

        let mut reader = reader(archive);
        reader.next_entry().unwrap().unwrap();
        let err = reader.next_entry().unwrap_err();
        assert!(matches!(err, LayerError::TruncatedEntry { .. }));
        assert_eq!(reader.state(), ReaderState::Error);
    }

    #[test]
    fn test_truncated_long_name_body() {
        let mut archive = Vec::new();
        archive.extend_from_slice(&raw_header("././@LongLink", 600, b'L'));
        archive.extend_from_slice(&[b'n'; BLOCK_SIZE]); // second block missing

        let mut reader = reader(archive);
        let err = reader.next_entry().unwrap_err();
        assert!(matches!(
            err,
            LayerError::TruncatedEntry {
                context: "long name entry",
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_pax_body_is_fatal() {
        let mut archive = Vec::new();
        push_entry(&mut archive, "PaxHeaders/0", b'x', b"not a pax record");
        push_entry(&mut archive, "file.txt", b'0', &[]);
        push_terminator(&mut archive);

        let mut reader = reader(archive);
        let err = reader.next_entry().unwrap_err();
        assert!(matches!(err, LayerError::InvalidPaxHeader { .. }));
        assert_eq!(reader.state(), ReaderState::Error);
    }

    #[test]
    fn test_crosscheck_with_tar_builder() {
        let mut data = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut data);
            for (path, contents) in [("one.txt", b"1".as_slice()), ("two.txt", b"22".as_slice())]
            {
                let mut header = tar::Header::new_gnu();
                header.set_mode(0o644);
                header.set_size(contents.len() as u64);
                header.set_entry_type(tar::EntryType::Regular);
                builder.append_data(&mut header, path, contents).unwrap();
            }
            builder.finish().unwrap();
        }

        let mut reader = reader(data);
        let one = reader.next_entry().unwrap().unwrap();
        assert_eq!((one.name.as_str(), one.size), ("one.txt", 1));
        let two = reader.next_entry().unwrap().unwrap();
        assert_eq!((two.name.as_str(), two.size), ("two.txt", 2));
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_rawsd_key_surfaces() {
        let body = encode_pax_record(PAX_WIN_RAWSD, "AQIDBA==");

        let mut archive = Vec::new();
        push_entry(&mut archive, "PaxHeaders/0", b'x', &body);
        push_entry(&mut archive, "secured.txt", b'0', &[]);
        push_terminator(&mut archive);

        let mut reader = reader(archive);
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.extra_header(PAX_WIN_RAWSD), Some("AQIDBA=="));
    }
}
