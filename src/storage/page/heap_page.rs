//! Slotted heap page.
//!
//! A page of `P` bytes is laid out as
//!
//! ```text
//! [bitmap header][slot 0][slot 1]...[slot N-1][zero padding]
//! ```
//!
//! where every slot holds exactly one row of the table's fixed-size schema.
//! The number of slots is `floor(P * 8 / (row_size * 8 + 1))`: each row costs
//! its bytes plus one header bit. The header is `ceil(N / 8)` bytes and the
//! bit for slot `i` is bit `i % 8` (least significant first) of byte `i / 8`.
//! A set bit means the slot holds a valid row.

use crate::access::row::{RecordLocation, Row};
use crate::access::schema::Schema;
use crate::error::{DbError, DbResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use bytes::Bytes;
use log::trace;
use std::io::Cursor;
use std::sync::Arc;

/// Number of row slots on a page of `page_size` bytes.
pub fn slot_count(page_size: usize, row_size: usize) -> usize {
    (page_size * 8) / (row_size * 8 + 1)
}

/// Number of bitmap bytes needed for `num_slots` slots.
pub fn header_len(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

/// Raw bytes of a page with no occupied slots.
pub fn empty_page_data(page_size: usize) -> Vec<u8> {
    vec![0u8; page_size]
}

#[derive(Debug)]
pub struct HeapPage {
    id: PageId,
    schema: Arc<Schema>,
    page_size: usize,
    num_slots: usize,
    header: Vec<u8>,
    slots: Vec<Option<Row>>,
    dirtied_by: Option<TransactionId>,
    before_image: Bytes,
}

impl HeapPage {
    /// Decode a page image.
    ///
    /// `data` shorter than the page size is treated as if padded with zeros,
    /// since freshly grown regions of a file may be sparse.
    pub fn from_bytes(
        id: PageId,
        schema: Arc<Schema>,
        data: &[u8],
        page_size: usize,
    ) -> DbResult<Self> {
        if data.len() > page_size {
            return Err(DbError::Format(format!(
                "page {} image is {} bytes, expected at most {}",
                id,
                data.len(),
                page_size
            )));
        }

        let row_size = schema.byte_size();
        let num_slots = slot_count(page_size, row_size);
        if num_slots == 0 {
            return Err(DbError::InvalidSchema(format!(
                "a {}-byte row does not fit in a {}-byte page",
                row_size, page_size
            )));
        }

        let mut buf = empty_page_data(page_size);
        buf[..data.len()].copy_from_slice(data);

        let header_size = header_len(num_slots);
        let header = buf[..header_size].to_vec();
        check_unused_bits(&header, num_slots)?;

        let mut page = Self {
            id,
            schema,
            page_size,
            num_slots,
            header,
            slots: vec![None; num_slots],
            dirtied_by: None,
            before_image: Bytes::new(),
        };

        for slot in 0..num_slots {
            if !page.is_slot_used(slot) {
                continue;
            }
            let offset = header_size + slot * row_size;
            let mut cursor = Cursor::new(&buf[offset..offset + row_size]);
            let mut row = Row::new(Arc::clone(&page.schema));
            for (i, field_type) in page.schema.field_types().enumerate() {
                row.set(i, field_type.read_field(&mut cursor)?)?;
            }
            row.set_location(Some(RecordLocation::new(id, slot)));
            page.slots[slot] = Some(row);
        }

        page.set_before_image()?;
        Ok(page)
    }

    /// A page with every slot free.
    pub fn empty(id: PageId, schema: Arc<Schema>, page_size: usize) -> DbResult<Self> {
        Self::from_bytes(id, schema, &[], page_size)
    }

    /// Encode this page into exactly `page_size` bytes.
    pub fn to_bytes(&self) -> DbResult<Vec<u8>> {
        let row_size = self.schema.byte_size();
        let mut data = Vec::with_capacity(self.page_size);
        data.extend_from_slice(&self.header);

        for slot in &self.slots {
            match slot {
                Some(row) => {
                    for (i, field) in row.fields().enumerate() {
                        field.ok_or(DbError::UnsetField(i))?.write_to(&mut data)?;
                    }
                }
                None => data.resize(data.len() + row_size, 0),
            }
        }

        data.resize(self.page_size, 0);
        Ok(data)
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn header_size(&self) -> usize {
        self.header.len()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots() && self.header[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn mark_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots())
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    /// The row stored in `slot`, if the slot is occupied.
    pub fn row_at(&self, slot: usize) -> Option<&Row> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Store `row` in the lowest free slot and record its new location.
    pub fn insert_row(&mut self, row: &mut Row) -> DbResult<()> {
        if row.schema().as_ref() != self.schema.as_ref() {
            return Err(DbError::InvalidSchema(format!(
                "row schema [{}] does not match page schema [{}]",
                row.schema(),
                self.schema
            )));
        }
        if let Some(index) = row.first_unset() {
            return Err(DbError::UnsetField(index));
        }

        let slot = (0..self.num_slots())
            .find(|&slot| !self.is_slot_used(slot))
            .ok_or(DbError::SlotFull(self.id))?;

        row.set_location(Some(RecordLocation::new(self.id, slot)));
        self.mark_slot_used(slot, true);
        self.slots[slot] = Some(row.clone());
        trace!("inserted row into {} slot {}", self.id, slot);
        Ok(())
    }

    /// Remove `row` from the slot named by its location and clear the
    /// location.
    pub fn delete_row(&mut self, row: &mut Row) -> DbResult<()> {
        let location = row
            .location()
            .ok_or_else(|| DbError::RecordNotFound("row has no location".to_string()))?;
        if location.page_id != self.id {
            return Err(DbError::RecordNotFound(format!(
                "row lives on page {}, not {}",
                location.page_id, self.id
            )));
        }
        match self.row_at(location.slot) {
            Some(stored) if *stored == *row => {}
            Some(_) => {
                return Err(DbError::RecordNotFound(format!(
                    "slot {} on page {} holds a different row",
                    location.slot, self.id
                )));
            }
            None => {
                return Err(DbError::RecordNotFound(format!(
                    "slot {} on page {} is empty",
                    location.slot, self.id
                )));
            }
        }

        self.mark_slot_used(location.slot, false);
        self.slots[location.slot] = None;
        row.set_location(None);
        trace!("deleted row from {} slot {}", self.id, location.slot);
        Ok(())
    }

    /// Record whether the page is dirty and which transaction dirtied it.
    pub fn mark_dirty(&mut self, dirty: bool, txn: TransactionId) {
        self.dirtied_by = dirty.then_some(txn);
    }

    /// The transaction that last dirtied this page, or `None` if clean.
    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    /// The page as it was when the snapshot was last taken.
    pub fn before_image(&self) -> DbResult<HeapPage> {
        HeapPage::from_bytes(
            self.id,
            Arc::clone(&self.schema),
            &self.before_image,
            self.page_size,
        )
    }

    pub fn before_image_data(&self) -> Bytes {
        self.before_image.clone()
    }

    /// Snapshot the current contents as the new before image.
    pub fn set_before_image(&mut self) -> DbResult<()> {
        self.before_image = Bytes::from(self.to_bytes()?);
        Ok(())
    }

    /// Occupied slots in ascending order.
    pub fn iter(&self) -> SlotIter<'_> {
        SlotIter {
            page: self,
            next_slot: 0,
        }
    }
}

/// Rejects headers with bits set past the last slot.
fn check_unused_bits(header: &[u8], num_slots: usize) -> DbResult<()> {
    let used_bits = num_slots % 8;
    if used_bits == 0 {
        return Ok(());
    }
    let last = header[header.len() - 1];
    if last >> used_bits != 0 {
        return Err(DbError::Format(format!(
            "header marks slots beyond the last of {} slots",
            num_slots
        )));
    }
    Ok(())
}

/// Forward-only cursor over the occupied slots of a page.
pub struct SlotIter<'a> {
    page: &'a HeapPage,
    next_slot: usize,
}

impl<'a> SlotIter<'a> {
    /// Like [`Iterator::next`], but an exhausted cursor is an error.
    pub fn next_row(&mut self) -> DbResult<&'a Row> {
        self.next()
            .ok_or_else(|| DbError::NotFound(format!("no more rows on page {}", self.page.id)))
    }
}

impl<'a> Iterator for SlotIter<'a> {
    type Item = &'a Row;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_slot < self.page.num_slots() {
            let slot = self.next_slot;
            self.next_slot += 1;
            if let Some(row) = self.page.row_at(slot) {
                return Some(row);
            }
        }
        None
    }
}
