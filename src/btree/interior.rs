//! interior defines the in-memory form of an interior btree page and its
//! codec.
//!
//! An interior page body is one leftmost child pointer (`u32`) followed by
//! `num_keys` entries of `{separator:u16, child:u32}`. The page has
//! `num_keys + 1` children: child `i` covers keys strictly below separator
//! `i`, and the last child covers keys at or above the last separator.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::header::{PageHeader, PAGE_HEADER_SIZE};
use super::{PageType, RowId, MAX_KEYS};
use crate::pager::{PageNum, PAGE_SIZE};

/// Bytes per `{separator, child}` entry.
const ENTRY_SIZE: usize = 6;
/// Bytes for the leftmost child pointer.
const LEFTMOST_SIZE: usize = 4;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Interior page: {0}")]
    Header(#[from] super::header::Error),
    #[error("Interior page: body is truncated.")]
    TruncatedBody,
    #[error("Interior page: serialized page is {0} bytes which exceeds the page size.")]
    PageOverflow(usize),
}

/// One interior btree page: a leftmost child plus an ordered list of
/// `(separator, child)` entries. Children are referenced by page number
/// only; a traversal rebuilds its path in a local stack.
#[derive(Debug, Clone, PartialEq)]
pub struct InteriorPage {
    pub leftmost_child: PageNum,
    pub entries: Vec<(RowId, PageNum)>,
}

impl InteriorPage {
    pub fn new(leftmost_child: PageNum) -> InteriorPage {
        InteriorPage {
            leftmost_child,
            entries: vec![],
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<InteriorPage, Error> {
        let hdr = PageHeader::from_bytes(data)?;
        let mut c = Cursor::new(&data[PAGE_HEADER_SIZE..]);
        let leftmost_child = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedBody)?;
        let mut entries = Vec::with_capacity(hdr.num_keys as usize);
        for _ in 0..hdr.num_keys {
            let separator = c.read_u16::<BigEndian>().map_err(|_| Error::TruncatedBody)?;
            let child = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedBody)?;
            entries.push((separator, child));
        }
        Ok(InteriorPage {
            leftmost_child,
            entries,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let size = self.encoded_size();
        if size > PAGE_SIZE {
            return Err(Error::PageOverflow(size));
        }
        let hdr = PageHeader::new(
            PageType::Interior,
            self.entries.len() as u16,
            size as u32,
        );
        let mut out = hdr.to_bytes();
        out.write_u32::<BigEndian>(self.leftmost_child).unwrap();
        for (separator, child) in &self.entries {
            out.write_u16::<BigEndian>(*separator).unwrap();
            out.write_u32::<BigEndian>(*child).unwrap();
        }
        Ok(out)
    }

    pub fn encoded_size(&self) -> usize {
        Self::encoded_size_for(self.entries.len())
    }

    /// Serialized size of an interior page holding `num_entries` entries.
    pub fn encoded_size_for(num_entries: usize) -> usize {
        PAGE_HEADER_SIZE + LEFTMOST_SIZE + num_entries * ENTRY_SIZE
    }

    pub fn num_keys(&self) -> usize {
        self.entries.len()
    }

    /// The child position to descend into for `key`: the first entry whose
    /// separator is strictly greater than the key, or the last child. A key
    /// equal to a separator lives under the child to the separator's right.
    pub fn child_index(&self, key: RowId) -> usize {
        self.entries
            .iter()
            .position(|(sep, _)| key < *sep)
            .unwrap_or(self.entries.len())
    }

    /// The page number of child `idx`, where index 0 is the leftmost child
    /// and index `i > 0` is the child of entry `i - 1`.
    pub fn child_at(&self, idx: usize) -> PageNum {
        if idx == 0 {
            self.leftmost_child
        } else {
            self.entries[idx - 1].1
        }
    }

    /// Inserts `(separator, right_child)` at its sorted position, making
    /// `right_child` the child immediately to the separator's right.
    pub fn insert_separator(&mut self, separator: RowId, right_child: PageNum) {
        let idx = self
            .entries
            .iter()
            .position(|(sep, _)| separator < *sep)
            .unwrap_or(self.entries.len());
        self.entries.insert(idx, (separator, right_child));
    }

    /// Whether the page exceeds its capacity and must split. Checked after
    /// a separator insertion.
    pub fn is_overfull(&self) -> bool {
        self.entries.len() > MAX_KEYS || self.encoded_size() > PAGE_SIZE
    }

    /// Splits an overfull page. The median separator is promoted and
    /// removed from both halves; the right page takes the entries and
    /// children strictly to the median's right.
    pub fn split(&mut self) -> (RowId, InteriorPage) {
        let mid = self.entries.len() / 2;
        let mut tail = self.entries.split_off(mid);
        let (separator, right_leftmost) = tail.remove(0);
        let right = InteriorPage {
            leftmost_child: right_leftmost,
            entries: tail,
        };
        (separator, right)
    }
}

#[test]
fn test_interior_roundtrip() {
    let page = InteriorPage {
        leftmost_child: 2,
        entries: vec![(10, 3), (20, 4)],
    };
    let bytes = page.to_bytes().unwrap();
    // Header, leftmost pointer, then two 6-byte entries.
    assert_eq!(bytes.len(), PAGE_HEADER_SIZE + 4 + 2 * 6);
    let back = InteriorPage::from_bytes(&bytes).unwrap();
    assert_eq!(back, page);
}

#[test]
fn test_interior_decode_fixture() {
    // Interior page: leftmost child 2, separators 10 -> child 3, 20 -> child 4.
    let bytes = hex::decode("0500020000001b0000000000000002000a00000003001400000004").unwrap();
    let page = InteriorPage::from_bytes(&bytes).unwrap();
    assert_eq!(page.leftmost_child, 2);
    assert_eq!(page.entries, vec![(10, 3), (20, 4)]);
}

#[test]
fn test_child_index_partitions_key_space() {
    let page = InteriorPage {
        leftmost_child: 2,
        entries: vec![(10, 3), (20, 4)],
    };
    assert_eq!(page.child_index(5), 0);
    assert_eq!(page.child_index(9), 0);
    // A key equal to a separator belongs to the right child.
    assert_eq!(page.child_index(10), 1);
    assert_eq!(page.child_index(15), 1);
    assert_eq!(page.child_index(20), 2);
    assert_eq!(page.child_index(99), 2);
    assert_eq!(page.child_at(0), 2);
    assert_eq!(page.child_at(1), 3);
    assert_eq!(page.child_at(2), 4);
}

#[test]
fn test_insert_separator_keeps_order_and_children() {
    let mut page = InteriorPage::new(2);
    page.insert_separator(20, 4);
    page.insert_separator(10, 3);
    page.insert_separator(30, 5);
    assert_eq!(page.entries, vec![(10, 3), (20, 4), (30, 5)]);
    // num_keys + 1 children.
    let children: Vec<PageNum> = (0..=page.num_keys()).map(|i| page.child_at(i)).collect();
    assert_eq!(children, vec![2, 3, 4, 5]);
}

#[test]
fn test_split_promotes_and_removes_median() {
    let mut page = InteriorPage::new(10);
    for i in 0..5_u16 {
        page.insert_separator(i * 10 + 10, 11 + i as PageNum);
    }
    // entries: (10,11) (20,12) (30,13) (40,14) (50,15)
    let (sep, right) = page.split();
    assert_eq!(sep, 30);
    assert_eq!(page.entries, vec![(10, 11), (20, 12)]);
    assert_eq!(page.leftmost_child, 10);
    assert_eq!(right.leftmost_child, 13);
    assert_eq!(right.entries, vec![(40, 14), (50, 15)]);
}

#[test]
fn test_is_overfull_by_cell_ceiling() {
    let mut page = InteriorPage::new(1);
    for i in 0..MAX_KEYS as u16 {
        page.insert_separator(i + 1, i as PageNum + 2);
        assert!(!page.is_overfull());
    }
    page.insert_separator(999, 99);
    assert!(page.is_overfull());
}
