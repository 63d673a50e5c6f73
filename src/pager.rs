//! Manages page-granular I/O for one table file.
//!
//! Every table lives in its own file: a 4-byte big-endian root page number,
//! followed by a sequence of fixed-size pages. Page numbering is 1-based, so
//! the byte offset of page `p` is `4 + (p - 1) * PAGE_SIZE`.
//!
//! The pager knows nothing about what is inside a page; it hands out and
//! accepts raw byte buffers. Callers that need a page parsed go through the
//! btree page codecs.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

/// Page numbers are 1-based, matching the on-disk child pointers. Page 0 is
/// never a valid page.
pub type PageNum = u32;

pub const PAGE_SIZE: usize = 4096;

/// Bytes reserved at the start of the file for the root page number.
const ROOT_POINTER_SIZE: u64 = 4;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Pager: {0} is not a valid page number.")]
    InvalidPageNumber(PageNum),
    #[error("Pager: page data is {0} bytes which exceeds the page size.")]
    PageTooLarge(usize),
    #[error("Pager: error accessing table file: {0}")]
    Io(#[from] std::io::Error),
}

/// A `Pager` owns the open file handle for one table for the lifetime of the
/// table. It supports reading and writing whole pages, reading and writing
/// the root page number in the file header, and allocating page numbers off
/// the end of the file.
///
/// Writes are flushed after every page write, so the file is consistent
/// per-operation. There is no multi-page atomicity.
// TODO: lock the file on open so a second process cannot open the same
// table; the format assumes a single writer.
pub struct Pager {
    f: File,
}

impl Pager {
    /// Opens the table file at `path`, creating it if absent. A fresh file
    /// gets a header pointing at page 1 as the root.
    pub fn open(path: &Path) -> Result<Pager, Error> {
        let existed = path.exists();
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let mut pager = Pager { f };
        if !existed {
            debug!("created table file {}", path.display());
            pager.write_root_page_number(1)?;
        }
        Ok(pager)
    }

    /// Reads the root page number from the 4-byte file header. A file too
    /// short to hold a header reports the initial root, page 1.
    pub fn read_root_page_number(&mut self) -> Result<PageNum, Error> {
        if self.f.metadata()?.len() < ROOT_POINTER_SIZE {
            return Ok(1);
        }
        self.f.seek(SeekFrom::Start(0))?;
        let root = self.f.read_u32::<BigEndian>()?;
        Ok(root)
    }

    pub fn write_root_page_number(&mut self, page_number: PageNum) -> Result<(), Error> {
        self.f.seek(SeekFrom::Start(0))?;
        self.f.write_u32::<BigEndian>(page_number)?;
        self.f.flush()?;
        debug!("root page number set to {}", page_number);
        Ok(())
    }

    fn page_offset(page_number: PageNum) -> u64 {
        ROOT_POINTER_SIZE + (page_number as u64 - 1) * PAGE_SIZE as u64
    }

    /// Reads page `page_number` as a full `PAGE_SIZE` buffer. A page that
    /// has been allocated but never written (or only partially covers the
    /// file tail) reads as zero-padded; the page codecs treat an all-zero
    /// header as an empty leaf.
    pub fn read_page(&mut self, page_number: PageNum) -> Result<Vec<u8>, Error> {
        if page_number < 1 {
            return Err(Error::InvalidPageNumber(page_number));
        }
        let mut buf = vec![0_u8; PAGE_SIZE];
        self.f.seek(SeekFrom::Start(Self::page_offset(page_number)))?;
        let mut filled = 0;
        // Short reads at the file tail are expected; the remainder stays zero.
        while filled < PAGE_SIZE {
            let n = self.f.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(buf)
    }

    /// Writes `data` as page `page_number`, zero-padded to `PAGE_SIZE`, and
    /// flushes. Rejects buffers larger than a page.
    pub fn write_page(&mut self, page_number: PageNum, data: &[u8]) -> Result<(), Error> {
        if page_number < 1 {
            return Err(Error::InvalidPageNumber(page_number));
        }
        if data.len() > PAGE_SIZE {
            return Err(Error::PageTooLarge(data.len()));
        }
        self.f.seek(SeekFrom::Start(Self::page_offset(page_number)))?;
        self.f.write_all(data)?;
        if data.len() < PAGE_SIZE {
            self.f.write_all(&vec![0_u8; PAGE_SIZE - data.len()])?;
        }
        self.f.flush()?;
        Ok(())
    }

    /// Returns the smallest page number not yet materialized in the file.
    /// Nothing is written until the caller writes the page, so allocating
    /// twice without a write in between returns the same number.
    pub fn allocate_page(&mut self) -> Result<PageNum, Error> {
        let len = self.f.metadata()?.len().max(ROOT_POINTER_SIZE);
        let num_pages = (len - ROOT_POINTER_SIZE) / PAGE_SIZE as u64;
        Ok(num_pages as PageNum + 1)
    }

    /// Flushes and fsyncs the file. Consumes the pager; the file handle is
    /// closed when it drops.
    pub fn close(self) -> Result<(), Error> {
        self.f.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
fn temp_table_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
    dir.path().join("t.tbl")
}

#[test]
fn test_open_creates_file_with_root_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_table_path(&dir);
    let mut pager = Pager::open(&path).expect("Should have opened pager.");
    assert_eq!(pager.read_root_page_number().unwrap(), 1);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 4);
}

#[test]
fn test_root_page_number_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let mut pager = Pager::open(&temp_table_path(&dir)).unwrap();
    pager.write_root_page_number(7).unwrap();
    assert_eq!(pager.read_root_page_number().unwrap(), 7);
}

#[test]
fn test_unwritten_page_reads_as_zeroes() {
    let dir = tempfile::tempdir().unwrap();
    let mut pager = Pager::open(&temp_table_path(&dir)).unwrap();
    let page = pager.read_page(1).expect("Should have read page.");
    assert_eq!(page.len(), PAGE_SIZE);
    assert!(page.iter().all(|b| *b == 0));
}

#[test]
fn test_write_page_roundtrip_and_padding() {
    let dir = tempfile::tempdir().unwrap();
    let mut pager = Pager::open(&temp_table_path(&dir)).unwrap();
    pager.write_page(1, &[1, 2, 3]).unwrap();
    let page = pager.read_page(1).unwrap();
    assert_eq!(&page[..3], &[1, 2, 3]);
    assert!(page[3..].iter().all(|b| *b == 0));
}

#[test]
fn test_write_page_rejects_oversize() {
    let dir = tempfile::tempdir().unwrap();
    let mut pager = Pager::open(&temp_table_path(&dir)).unwrap();
    let too_big = vec![0_u8; PAGE_SIZE + 1];
    assert!(matches!(
        pager.write_page(1, &too_big),
        Err(Error::PageTooLarge(_))
    ));
}

#[test]
fn test_page_zero_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let mut pager = Pager::open(&temp_table_path(&dir)).unwrap();
    assert!(matches!(
        pager.read_page(0),
        Err(Error::InvalidPageNumber(0))
    ));
}

#[test]
fn test_allocate_page_tracks_file_growth() {
    let dir = tempfile::tempdir().unwrap();
    let mut pager = Pager::open(&temp_table_path(&dir)).unwrap();
    // Fresh file holds no pages yet.
    assert_eq!(pager.allocate_page().unwrap(), 1);
    // Allocation without a write does not consume the number.
    assert_eq!(pager.allocate_page().unwrap(), 1);
    pager.write_page(1, &[0x0d]).unwrap();
    assert_eq!(pager.allocate_page().unwrap(), 2);
    pager.write_page(2, &[0x0d]).unwrap();
    assert_eq!(pager.allocate_page().unwrap(), 3);
}

#[test]
fn test_reopen_preserves_pages() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_table_path(&dir);
    {
        let mut pager = Pager::open(&path).unwrap();
        pager.write_page(2, b"hello").unwrap();
        pager.close().unwrap();
    }
    let mut pager = Pager::open(&path).unwrap();
    let page = pager.read_page(2).unwrap();
    assert_eq!(&page[..5], b"hello");
}
