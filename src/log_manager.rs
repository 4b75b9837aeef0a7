use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::buffer_pool::BufferPool;
use crate::catalog::Catalog;
use crate::error::{SmallError, SmallResult};
use crate::page::HeapPage;
use crate::page_id::HeapPageId;
use crate::transaction_id::TransactionId;

const HEADER_LEN: u64 = 8;
const NO_CHECKPOINT: i64 = -1;
const CHECKPOINT_TID: i64 = -1;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum RecordType {
    Begin = 0,
    Commit = 1,
    Abort = 2,
    Update = 3,
    Checkpoint = 4,
}

impl RecordType {
    fn from_i32(v: i32) -> Result<RecordType, SmallError> {
        match v {
            0 => Ok(RecordType::Begin),
            1 => Ok(RecordType::Commit),
            2 => Ok(RecordType::Abort),
            3 => Ok(RecordType::Update),
            4 => Ok(RecordType::Checkpoint),
            other => Err(SmallError::IoError(format!("unknown log record type {}", other))),
        }
    }
}

enum Payload {
    None,
    Update { page_id: HeapPageId, before: Vec<u8>, after: Vec<u8> },
    Checkpoint { active: Vec<(i64, i64)> },
}

struct Record {
    kind: RecordType,
    tid: i64,
    payload: Payload,
}

fn write_i32<W: Write>(w: &mut W, v: i32) -> SmallResult {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}
fn write_i64<W: Write>(w: &mut W, v: i64) -> SmallResult {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}
fn write_string<W: Write>(w: &mut W, s: &str) -> SmallResult {
    write_i32(w, s.len() as i32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}
fn write_bytes<W: Write>(w: &mut W, b: &[u8]) -> SmallResult {
    write_i32(w, b.len() as i32)?;
    w.write_all(b)?;
    Ok(())
}

fn read_i32<R: Read>(r: &mut R) -> Result<i32, SmallError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}
fn read_i64<R: Read>(r: &mut R) -> Result<i64, SmallError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}
fn read_string<R: Read>(r: &mut R) -> Result<String, SmallError> {
    let len = read_i32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}
fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>, SmallError> {
    let len = read_i32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_page_image<W: Write>(w: &mut W, page_id: HeapPageId, data: &[u8]) -> SmallResult {
    write_string(w, HeapPage::class_name())?;
    write_string(w, HeapPageId::class_name())?;
    write_i32(w, 2)?;
    write_i32(w, page_id.table_id)?;
    write_i32(w, page_id.page_number)?;
    write_bytes(w, data)?;
    Ok(())
}

fn read_page_image<R: Read>(r: &mut R) -> Result<(HeapPageId, Vec<u8>), SmallError> {
    let page_class = read_string(r)?;
    let id_class = read_string(r)?;
    if page_class != HeapPage::class_name() || id_class != HeapPageId::class_name() {
        return Err(SmallError::IoError(format!(
            "unrecognized page/id class in log: {}/{}",
            page_class, id_class
        )));
    }
    let arg_count = read_i32(r)?;
    if arg_count != 2 {
        return Err(SmallError::IoError("unexpected HeapPageId arg count".into()));
    }
    let table_id = read_i32(r)?;
    let page_number = read_i32(r)?;
    let data = read_bytes(r)?;
    Ok((HeapPageId::new(table_id, page_number), data))
}

/// Rewrites every record's trailing start-offset back-pointer in place, now
/// that the records have moved `shift` bytes earlier in the file. A
/// checkpoint record's embedded per-transaction offsets are absolute
/// positions too and get the same treatment.
fn patch_tail_offsets(tail: &mut [u8], shift: i64) -> SmallResult {
    let mut cursor = Cursor::new(tail);
    let len = cursor.get_ref().len() as u64;
    while cursor.position() < len {
        let kind = RecordType::from_i32(read_i32(&mut cursor)?)?;
        let _tid = read_i64(&mut cursor)?;
        match kind {
            RecordType::Begin | RecordType::Commit | RecordType::Abort => {}
            RecordType::Update => {
                read_page_image(&mut cursor)?;
                read_page_image(&mut cursor)?;
            }
            RecordType::Checkpoint => {
                let count = read_i32(&mut cursor)?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let t = read_i64(&mut cursor)?;
                    let o = read_i64(&mut cursor)?;
                    entries.push((t, o));
                }
                let entries_start = cursor.position() - (count as u64) * 16;
                cursor.set_position(entries_start);
                for (t, o) in &entries {
                    write_i64(&mut cursor, *t)?;
                    write_i64(&mut cursor, o - shift)?;
                }
            }
        }
        let start_pos = cursor.position();
        let old_start = read_i64(&mut cursor)?;
        let after = cursor.position();
        cursor.set_position(start_pos);
        write_i64(&mut cursor, old_start - shift)?;
        cursor.set_position(after);
    }
    Ok(())
}

/// Single-file write-ahead log with BEGIN/UPDATE/COMMIT/ABORT/CHECKPOINT
/// records, ARIES-lite REDO/UNDO recovery, rollback, and truncation.
///
/// All multi-byte integers and string lengths are big-endian. Every record
/// ends with its own start offset, letting `rollback` walk the log backward
/// without separate forward bookkeeping.
pub struct LogManager {
    file: Mutex<File>,
    path: PathBuf,
    tid_to_first_offset: Mutex<HashMap<i64, i64>>,
}

impl LogManager {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<LogManager, SmallError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        let len = file.metadata()?.len();
        if len < HEADER_LEN {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            write_i64(&mut file, NO_CHECKPOINT)?;
            file.sync_all()?;
        }
        Ok(LogManager {
            file: Mutex::new(file),
            path,
            tid_to_first_offset: Mutex::new(HashMap::new()),
        })
    }

    fn read_checkpoint_offset(file: &mut File) -> Result<i64, SmallError> {
        file.seek(SeekFrom::Start(0))?;
        read_i64(file)
    }

    fn write_checkpoint_offset(file: &mut File, offset: i64) -> SmallResult {
        file.seek(SeekFrom::Start(0))?;
        write_i64(file, offset)?;
        Ok(())
    }

    pub fn log_begin(&self, tid: TransactionId) -> SmallResult {
        let mut offsets = self.tid_to_first_offset.lock().unwrap();
        if offsets.contains_key(&tid.get_id()) {
            return Err(SmallError::new("transaction already has an active BEGIN record"));
        }
        let mut file = self.file.lock().unwrap();
        let start = file.seek(SeekFrom::End(0))?;
        write_i32(&mut *file, RecordType::Begin as i32)?;
        write_i64(&mut *file, tid.get_id())?;
        write_i64(&mut *file, start as i64)?;
        offsets.insert(tid.get_id(), start as i64);
        debug!("logged BEGIN for {} at offset {}", tid, start);
        Ok(())
    }

    pub fn log_update(&self, tid: TransactionId, page_id: HeapPageId, before: &[u8], after: &[u8]) -> SmallResult {
        let mut file = self.file.lock().unwrap();
        let start = file.seek(SeekFrom::End(0))?;
        write_i32(&mut *file, RecordType::Update as i32)?;
        write_i64(&mut *file, tid.get_id())?;
        write_page_image(&mut *file, page_id, before)?;
        write_page_image(&mut *file, page_id, after)?;
        write_i64(&mut *file, start as i64)?;
        debug!("logged UPDATE for {} on {} at offset {}", tid, page_id, start);
        Ok(())
    }

    pub fn log_commit(&self, tid: TransactionId) -> SmallResult {
        let mut file = self.file.lock().unwrap();
        let start = file.seek(SeekFrom::End(0))?;
        write_i32(&mut *file, RecordType::Commit as i32)?;
        write_i64(&mut *file, tid.get_id())?;
        write_i64(&mut *file, start as i64)?;
        file.sync_all()?;
        drop(file);
        self.tid_to_first_offset.lock().unwrap().remove(&tid.get_id());
        info!("committed {}", tid);
        Ok(())
    }

    /// Rolls the transaction back, then writes and forces the ABORT record.
    pub fn log_abort(&self, tid: TransactionId, buffer_pool: &BufferPool, catalog: &Catalog) -> SmallResult {
        self.rollback(tid, buffer_pool, catalog)?;

        let mut file = self.file.lock().unwrap();
        let start = file.seek(SeekFrom::End(0))?;
        write_i32(&mut *file, RecordType::Abort as i32)?;
        write_i64(&mut *file, tid.get_id())?;
        write_i64(&mut *file, start as i64)?;
        file.sync_all()?;
        drop(file);
        self.tid_to_first_offset.lock().unwrap().remove(&tid.get_id());
        info!("aborted {}", tid);
        Ok(())
    }

    /// Walks the log backward from the tail using each record's trailing
    /// start-offset back-pointer, reinstating the before-image of every
    /// UPDATE belonging to `tid`, until reaching `tid`'s own BEGIN record.
    pub fn rollback(&self, tid: TransactionId, buffer_pool: &BufferPool, catalog: &Catalog) -> SmallResult {
        let begin_offset = match self.tid_to_first_offset.lock().unwrap().get(&tid.get_id()) {
            Some(o) => *o,
            None => return Ok(()),
        };

        let mut file = self.file.lock().unwrap();
        let mut pos = file.seek(SeekFrom::End(0))?;

        while pos as i64 > begin_offset {
            file.seek(SeekFrom::Start(pos - 8))?;
            let record_start = read_i64(&mut *file)?;
            file.seek(SeekFrom::Start(record_start as u64))?;
            let kind = RecordType::from_i32(read_i32(&mut *file)?)?;
            let record_tid = read_i64(&mut *file)?;

            if kind == RecordType::Update && record_tid == tid.get_id() {
                let (page_id, before) = read_page_image(&mut *file)?;
                let _after = read_page_image(&mut *file)?;
                let desc = catalog.get_file(page_id.table_id)?.get_tuple_desc().clone();
                let page = HeapPage::from_bytes(page_id, desc, &before)?;
                buffer_pool.inject_clean_page(page_id, page);
            }

            pos = record_start as u64;
        }

        debug!("rolled back {}", tid);
        Ok(())
    }

    /// Forces the buffer pool, writes a CHECKPOINT with the current active
    /// set, repoints the header at it, then truncates the log.
    pub fn log_checkpoint(&self, buffer_pool: &BufferPool, catalog: &Catalog) -> SmallResult {
        buffer_pool.flush_all_pages(catalog, self)?;

        let active: Vec<(i64, i64)> = self.tid_to_first_offset.lock().unwrap().iter().map(|(k, v)| (*k, *v)).collect();

        let mut file = self.file.lock().unwrap();
        let start = file.seek(SeekFrom::End(0))?;
        write_i32(&mut *file, RecordType::Checkpoint as i32)?;
        write_i64(&mut *file, CHECKPOINT_TID)?;
        write_i32(&mut *file, active.len() as i32)?;
        for (t, o) in &active {
            write_i64(&mut *file, *t)?;
            write_i64(&mut *file, *o)?;
        }
        write_i64(&mut *file, start as i64)?;
        file.sync_all()?;
        Self::write_checkpoint_offset(&mut file, start as i64)?;
        file.sync_all()?;
        drop(file);

        info!("checkpoint taken at offset {}", start);
        self.log_truncate()
    }

    /// Drops every record before the oldest offset still needed: the
    /// earliest of the current checkpoint and any still-active
    /// transaction's BEGIN record.
    pub fn log_truncate(&self) -> SmallResult {
        let mut file = self.file.lock().unwrap();
        let checkpoint_offset = Self::read_checkpoint_offset(&mut file)?;

        let min_active = self.tid_to_first_offset.lock().unwrap().values().copied().min();
        let cutoff = match (checkpoint_offset, min_active) {
            (NO_CHECKPOINT, None) => {
                debug!("nothing to truncate, log has no checkpoint and no active transactions");
                return Ok(());
            }
            (NO_CHECKPOINT, Some(a)) => a,
            (c, None) => c,
            (c, Some(a)) => c.min(a),
        };

        if cutoff <= HEADER_LEN as i64 {
            return Ok(());
        }

        let len = file.metadata()?.len();
        let mut tail = vec![0u8; (len - cutoff as u64) as usize];
        file.seek(SeekFrom::Start(cutoff as u64))?;
        file.read_exact(&mut tail)?;

        // every record kept in `tail` moves `shift` bytes earlier; its own
        // trailing start-offset back-pointer (and, for a checkpoint record,
        // its embedded per-transaction offsets) are absolute positions in
        // the old file and must move with it.
        let shift = cutoff - HEADER_LEN as i64;
        patch_tail_offsets(&mut tail, shift)?;

        let tmp_path = self.path.with_extension("log.tmp");
        {
            let mut tmp = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&tmp_path)?;
            let new_checkpoint = if checkpoint_offset == NO_CHECKPOINT {
                NO_CHECKPOINT
            } else {
                checkpoint_offset - cutoff + HEADER_LEN as i64
            };
            write_i64(&mut tmp, new_checkpoint)?;
            tmp.write_all(&tail)?;
            tmp.sync_all()?;
        }
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        fs::rename(&tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        let mut offsets = self.tid_to_first_offset.lock().unwrap();
        for v in offsets.values_mut() {
            *v -= shift;
        }
        drop(offsets);

        *file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        info!("truncated log, dropped {} bytes", shift);
        Ok(())
    }

    pub fn force(&self) -> SmallResult {
        self.file.lock().unwrap().sync_all()?;
        Ok(())
    }

    /// ARIES-lite recovery: forward REDO pass over the whole log (applying
    /// every UPDATE's after-image), followed by an UNDO pass over any
    /// transaction still active when the log ends (a "loser").
    pub fn recover(&self, buffer_pool: &BufferPool, catalog: &Catalog) -> SmallResult {
        let mut file = self.file.lock().unwrap();
        let checkpoint_offset = Self::read_checkpoint_offset(&mut file)?;
        let len = file.metadata()?.len();

        let mut active: HashMap<i64, i64> = HashMap::new();
        let mut loser_updates: Vec<(i64, HeapPageId, Vec<u8>)> = Vec::new();

        // The checkpoint records, for each transaction still active when it
        // was taken, the offset of that transaction's own first log record.
        // REDO must start there rather than at the checkpoint itself, or
        // updates made before the checkpoint but after that BEGIN would be
        // silently skipped.
        let mut pos = if checkpoint_offset == NO_CHECKPOINT {
            HEADER_LEN
        } else {
            file.seek(SeekFrom::Start(checkpoint_offset as u64))?;
            let kind = RecordType::from_i32(read_i32(&mut *file)?)?;
            let _tid = read_i64(&mut *file)?;
            let mut recorded_active: HashMap<i64, i64> = HashMap::new();
            if kind == RecordType::Checkpoint {
                let count = read_i32(&mut *file)?;
                for _ in 0..count {
                    let t = read_i64(&mut *file)?;
                    let o = read_i64(&mut *file)?;
                    recorded_active.insert(t, o);
                }
                let _start = read_i64(&mut *file)?;
            }
            let after_checkpoint = file.seek(SeekFrom::Current(0))?;
            active = recorded_active.clone();
            recorded_active.values().copied().min().map(|o| o as u64).unwrap_or(after_checkpoint)
        };

        while pos < len {
            file.seek(SeekFrom::Start(pos))?;
            let kind = RecordType::from_i32(read_i32(&mut *file)?)?;
            let tid = read_i64(&mut *file)?;

            match kind {
                RecordType::Begin => {
                    active.insert(tid, pos as i64);
                    let _start = read_i64(&mut *file)?;
                }
                RecordType::Commit | RecordType::Abort => {
                    active.remove(&tid);
                    let _start = read_i64(&mut *file)?;
                }
                RecordType::Update => {
                    let (page_id, before) = read_page_image(&mut *file)?;
                    let (_pid2, after) = read_page_image(&mut *file)?;
                    let _start = read_i64(&mut *file)?;

                    let desc = catalog.get_file(page_id.table_id)?.get_tuple_desc().clone();
                    let page = HeapPage::from_bytes(page_id, desc, &after)?;
                    buffer_pool.inject_clean_page(page_id, page);

                    if active.contains_key(&tid) {
                        loser_updates.push((tid, page_id, before));
                    }
                }
                RecordType::Checkpoint => {
                    let count = read_i32(&mut *file)?;
                    for _ in 0..count {
                        let _t = read_i64(&mut *file)?;
                        let _o = read_i64(&mut *file)?;
                    }
                    let _start = read_i64(&mut *file)?;
                }
            }
            pos = file.seek(SeekFrom::Current(0))?;
        }
        drop(file);

        if !active.is_empty() {
            warn!("recovery found {} loser transaction(s), undoing", active.len());
        }
        for (tid, page_id, before) in loser_updates.into_iter().rev() {
            if active.contains_key(&tid) {
                let desc = catalog.get_file(page_id.table_id)?.get_tuple_desc().clone();
                let page = HeapPage::from_bytes(page_id, desc, &before)?;
                buffer_pool.inject_clean_page(page_id, page);
            }
        }

        *self.tid_to_first_offset.lock().unwrap() = HashMap::new();
        info!("recovery complete");
        Ok(())
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.tid_to_first_offset.lock().unwrap().len()
    }
}
