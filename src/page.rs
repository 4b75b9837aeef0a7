use std::sync::atomic::{AtomicUsize, Ordering};

use bit_vec::BitVec;
use log::debug;

use crate::error::{SmallError, SmallResult};
use crate::page_id::HeapPageId;
use crate::transaction_id::TransactionId;
use crate::tuple::{RecordId, Tuple, TupleDesc};

use crate::config::DEFAULT_PAGE_SIZE;

static PAGE_SIZE_OVERRIDE: AtomicUsize = AtomicUsize::new(0);

/// Active page size. Defaults to [`DEFAULT_PAGE_SIZE`]; tests may shrink it
/// with [`set_page_size_for_test`] to force multi-page tables without
/// touching the public `DbConfig` surface.
pub fn page_size() -> usize {
    let v = PAGE_SIZE_OVERRIDE.load(Ordering::SeqCst);
    if v == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        v
    }
}

pub fn set_page_size_for_test(size: usize) {
    PAGE_SIZE_OVERRIDE.store(size, Ordering::SeqCst);
}

pub fn reset_page_size() {
    PAGE_SIZE_OVERRIDE.store(0, Ordering::SeqCst);
}

/// How many fixed-width tuple slots fit on a page of `page_size` bytes, and
/// how many header bytes (one bit per slot) that needs.
pub fn slots_per_page(tuple_size: usize) -> usize {
    (page_size() * 8) / (tuple_size * 8 + 1)
}

pub fn header_size_bytes(slots: usize) -> usize {
    (slots + 7) / 8
}

/// A single fixed-size, slot-structured page of one heap file.
///
/// Layout: `header_size` bytes of occupancy bitmap (1 bit per slot, MSB
/// first within each byte), followed by `slots` fixed-width tuple records,
/// followed by unused padding to `page_size`.
#[derive(Clone)]
pub struct HeapPage {
    pub page_id: HeapPageId,
    desc: TupleDesc,
    header: BitVec,
    slots: Vec<Option<Tuple>>,
    /// Transaction currently holding this page dirty, if any. NO-STEAL: this
    /// page must not be flushed to disk while this is `Some`.
    dirty: Option<TransactionId>,
    /// Snapshot taken at the start of the owning transaction (or right after
    /// the previous commit); used by rollback and by WAL UPDATE framing.
    before_image: Vec<u8>,
}

impl HeapPage {
    pub fn class_name() -> &'static str {
        "HeapPage"
    }

    pub fn num_slots(desc: &TupleDesc) -> usize {
        slots_per_page(desc.tuple_size())
    }

    /// An empty, freshly allocated page (all slots clear).
    pub fn empty(page_id: HeapPageId, desc: TupleDesc) -> HeapPage {
        let slots = Self::num_slots(&desc);
        let header = BitVec::from_elem(header_size_bytes(slots) * 8, false);
        let data = vec![None; slots];
        let mut page = HeapPage {
            page_id,
            desc,
            header,
            slots: data,
            dirty: None,
            before_image: Vec::new(),
        };
        page.before_image = page.serialize();
        page
    }

    pub fn from_bytes(page_id: HeapPageId, desc: TupleDesc, bytes: &[u8]) -> Result<HeapPage, SmallError> {
        let slots = Self::num_slots(&desc);
        let header_len = header_size_bytes(slots);
        if bytes.len() < header_len {
            return Err(SmallError::IoError("page buffer shorter than its own header".into()));
        }
        let header = BitVec::from_bytes(&bytes[..header_len]);

        let tuple_size = desc.tuple_size();
        let mut data = Vec::with_capacity(slots);
        let mut offset = header_len;
        for slot in 0..slots {
            let occupied = header.get(slot).unwrap_or(false);
            if occupied {
                let tuple = Tuple::decode(&desc, &bytes[offset..offset + tuple_size])?
                    .with_record_id(RecordId::new(page_id, slot));
                data.push(Some(tuple));
            } else {
                data.push(None);
            }
            offset += tuple_size;
        }

        debug!("loaded page {} with {} occupied slots of {}", page_id, data.iter().filter(|s| s.is_some()).count(), slots);

        let mut page = HeapPage {
            page_id,
            desc,
            header,
            slots: data,
            dirty: None,
            before_image: Vec::new(),
        };
        page.before_image = page.serialize();
        Ok(page)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(page_size());
        buf.extend_from_slice(&self.header.to_bytes());
        for slot in &self.slots {
            match slot {
                Some(t) => buf.extend(t.encode(&self.desc).expect("resident tuple must encode")),
                None => buf.extend(std::iter::repeat(0u8).take(self.desc.tuple_size())),
            }
        }
        buf.extend(std::iter::repeat(0u8).take(page_size() - buf.len()));
        buf
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn dirty_tid(&self) -> Option<TransactionId> {
        self.dirty
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirty = tid;
    }

    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }

    /// Called right after a successful flush (or right before the first
    /// mutation of a transaction) to reset the rollback snapshot.
    pub fn set_before_image(&mut self) {
        self.before_image = self.serialize();
    }

    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    fn first_empty_slot(&self) -> Option<usize> {
        self.header.iter().position(|bit| !bit)
    }

    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> Result<(), SmallError> {
        let slot = self
            .first_empty_slot()
            .ok_or_else(|| SmallError::new("page has no free slot"))?;
        tuple.record_id = Some(RecordId::new(self.page_id, slot));
        self.slots[slot] = Some(tuple);
        self.header.set(slot, true);
        Ok(())
    }

    pub fn delete_tuple(&mut self, rid: &RecordId) -> SmallResult {
        if rid.page_id != self.page_id {
            return Err(SmallError::invalid_argument("record id belongs to a different page"));
        }
        if !self.header.get(rid.slot_index).unwrap_or(false) {
            return Err(SmallError::new("tuple slot is already empty"));
        }
        self.header.set(rid.slot_index, false);
        self.slots[rid.slot_index] = None;
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.first_empty_slot().is_none()
    }
}
