//! Serialization and deserialization for the index header and tree pages

use crate::btree::{Key, KeyId, Page};
use crate::file::{NO_RRN, Rrn, get_u16, put_u16};

use super::error::{IndexError, IndexResult};

/// Bytes taken by the three u16 fields at the start of the header
pub const HEADER_FIXED_BYTES: usize = 6;

/// leaf flag (1) + keys_num (2) + child_num (2) + next_leaf (2)
const PAGE_FIXED_BYTES: usize = 7;

/// Shape of a page on disk, derived from the tree order and key width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub order: usize,
    pub key_width: usize,
}

impl PageLayout {
    pub fn new(order: usize, key_width: usize) -> Self {
        Self { order, key_width }
    }

    /// Maximum keys per page (ORDER - 1)
    pub fn max_keys(&self) -> usize {
        self.order - 1
    }

    /// Key id bytes plus the u16 record slot
    pub fn key_cell_size(&self) -> usize {
        self.key_width + 2
    }

    /// Size of one serialized page; every page slot in the file has this size
    pub fn page_size(&self) -> usize {
        PAGE_FIXED_BYTES + self.max_keys() * self.key_cell_size() + self.order * 2
    }

    fn children_offset(&self) -> usize {
        PAGE_FIXED_BYTES + self.max_keys() * self.key_cell_size()
    }
}

/// Index file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    /// Root page, `None` while the tree is empty
    pub root_rrn: Option<Rrn>,
    pub page_size: u16,
    pub header_size: u16,
    /// Name of the file holding the free page list
    pub free_list_id: String,
}

impl IndexHeader {
    pub fn new(page_size: u16, free_list_id: &str) -> IndexResult<Self> {
        if free_list_id.is_empty() || free_list_id.contains('\0') {
            return Err(IndexError::InvalidHeader(format!(
                "bad free-list identifier '{}'",
                free_list_id
            )));
        }
        let header_size = u16::try_from(HEADER_FIXED_BYTES + free_list_id.len() + 1)
            .map_err(|_| IndexError::InvalidHeader("free-list identifier too long".to_string()))?;

        Ok(Self {
            root_rrn: None,
            page_size,
            header_size,
            free_list_id: free_list_id.to_string(),
        })
    }
}

/// Serialize the header: root_rrn, page_size, header_size, NUL-terminated id
pub fn serialize_header(header: &IndexHeader) -> Vec<u8> {
    let mut buf = vec![0u8; header.header_size as usize];

    put_u16(&mut buf, 0, header.root_rrn.unwrap_or(NO_RRN));
    put_u16(&mut buf, 2, header.page_size);
    put_u16(&mut buf, 4, header.header_size);

    let id = header.free_list_id.as_bytes();
    buf[HEADER_FIXED_BYTES..HEADER_FIXED_BYTES + id.len()].copy_from_slice(id);
    // Trailing NUL already in place

    buf
}

/// Header size stored in the fixed part of a header
pub fn header_size_of(fixed: &[u8]) -> IndexResult<u16> {
    if fixed.len() < HEADER_FIXED_BYTES {
        return Err(IndexError::InvalidHeader("header truncated".to_string()));
    }
    Ok(get_u16(fixed, 4))
}

/// Deserialize a complete header (`buf.len() == header_size`)
pub fn deserialize_header(buf: &[u8]) -> IndexResult<IndexHeader> {
    let header_size = header_size_of(buf)?;
    if (header_size as usize) <= HEADER_FIXED_BYTES || buf.len() < header_size as usize {
        return Err(IndexError::InvalidHeader(format!(
            "header size {} does not fit {} bytes",
            header_size,
            buf.len()
        )));
    }

    let root = get_u16(buf, 0);
    let page_size = get_u16(buf, 2);

    let id_bytes = &buf[HEADER_FIXED_BYTES..header_size as usize];
    let end = id_bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| IndexError::InvalidHeader("free-list identifier not terminated".to_string()))?;
    let free_list_id = String::from_utf8(id_bytes[..end].to_vec())
        .map_err(|e| IndexError::InvalidHeader(e.to_string()))?;

    Ok(IndexHeader {
        root_rrn: (root != NO_RRN).then_some(root),
        page_size,
        header_size,
        free_list_id,
    })
}

/// Serialize a page into exactly `layout.page_size()` bytes
pub fn serialize_page(page: &Page, layout: PageLayout) -> IndexResult<Vec<u8>> {
    if page.keys.len() > layout.max_keys() || page.children.len() > layout.order {
        return Err(IndexError::PageOverflow(page.rrn));
    }

    let mut buf = vec![0u8; layout.page_size()];

    buf[0] = page.is_leaf as u8;
    put_u16(&mut buf, 1, page.keys.len() as u16);
    put_u16(&mut buf, 3, page.children.len() as u16);
    put_u16(&mut buf, 5, page.next_leaf.unwrap_or(NO_RRN));

    let mut offset = PAGE_FIXED_BYTES;
    for key in &page.keys {
        if key.id.len() > layout.key_width {
            return Err(IndexError::KeyTooWide {
                rrn: page.rrn,
                key: key.id.to_string(),
                width: layout.key_width,
            });
        }
        key.id.encode_into(&mut buf[offset..offset + layout.key_width]);
        put_u16(&mut buf, offset + layout.key_width, key.slot);
        offset += layout.key_cell_size();
    }

    let mut offset = layout.children_offset();
    for i in 0..layout.order {
        let child = page.children.get(i).copied().unwrap_or(NO_RRN);
        put_u16(&mut buf, offset, child);
        offset += 2;
    }

    Ok(buf)
}

/// Deserialize the page stored at `rrn`
pub fn deserialize_page(buf: &[u8], rrn: Rrn, layout: PageLayout) -> IndexResult<Page> {
    if buf.len() != layout.page_size() {
        return Err(IndexError::InvalidPageSize {
            expected: layout.page_size(),
            actual: buf.len(),
        });
    }

    let is_leaf = match buf[0] {
        0 => false,
        1 => true,
        other => return Err(IndexError::InvalidNodeType(other)),
    };
    let keys_num = get_u16(buf, 1) as usize;
    let child_num = get_u16(buf, 3) as usize;
    let next = get_u16(buf, 5);

    if keys_num > layout.max_keys() {
        return Err(IndexError::CorruptedPage(
            rrn,
            format!("{} keys exceed the maximum of {}", keys_num, layout.max_keys()),
        ));
    }
    let expected_children = if is_leaf { 0 } else { keys_num + 1 };
    if child_num != expected_children {
        return Err(IndexError::CorruptedPage(
            rrn,
            format!("{} children for {} keys", child_num, keys_num),
        ));
    }

    let mut keys = Vec::with_capacity(keys_num);
    let mut offset = PAGE_FIXED_BYTES;
    for i in 0..keys_num {
        let id = KeyId::decode(&buf[offset..offset + layout.key_width])
            .ok_or_else(|| IndexError::CorruptedPage(rrn, format!("unreadable key {}", i)))?;
        let slot = get_u16(buf, offset + layout.key_width);
        keys.push(Key::new(id, slot));
        offset += layout.key_cell_size();
    }

    let mut children = Vec::with_capacity(child_num);
    let mut offset = layout.children_offset();
    for _ in 0..child_num {
        children.push(get_u16(buf, offset));
        offset += 2;
    }

    Ok(Page {
        rrn,
        is_leaf,
        keys,
        children,
        next_leaf: (is_leaf && next != NO_RRN).then_some(next),
    })
}
