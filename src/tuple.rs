use std::fmt;

use log::debug;

use crate::error::{SmallError, SmallResult};
use crate::page_id::HeapPageId;

/// A tuple's location once it is resident on a page.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RecordId {
    pub page_id: HeapPageId,
    pub slot_index: usize,
}

impl RecordId {
    pub fn new(page_id: HeapPageId, slot_index: usize) -> RecordId {
        RecordId { page_id, slot_index }
    }
}

/// The type of one field in a tuple. `Str` carries the maximum byte width so
/// every tuple of a given `TupleDesc` has the same on-disk size.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FieldType {
    Int,
    Str(usize),
}

impl FieldType {
    /// Encoded width in bytes: 4 for `Int`; for `Str(max_len)` one length
    /// byte followed by `max_len` bytes of (possibly padded) UTF-8.
    pub fn size(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Str(max_len) => 1 + max_len,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FieldItem {
    pub field_type: FieldType,
    pub field_name: String,
}

/// A field value. `Field::Str` is always shorter than or equal to the
/// `TupleDesc`'s declared max length for that column; callers are
/// responsible for truncation/validation at the boundary.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    fn encode(&self, field_type: FieldType, out: &mut Vec<u8>) -> SmallResult {
        match (self, field_type) {
            (Field::Int(v), FieldType::Int) => {
                out.extend_from_slice(&v.to_be_bytes());
                Ok(())
            }
            (Field::Str(s), FieldType::Str(max_len)) => {
                let bytes = s.as_bytes();
                if bytes.len() > max_len {
                    return Err(SmallError::invalid_argument(&format!(
                        "string field {:?} exceeds max length {}",
                        s, max_len
                    )));
                }
                out.push(bytes.len() as u8);
                out.extend_from_slice(bytes);
                out.extend(std::iter::repeat(0u8).take(max_len - bytes.len()));
                Ok(())
            }
            _ => Err(SmallError::invalid_argument("field value does not match its declared type")),
        }
    }

    fn decode(field_type: FieldType, bytes: &[u8]) -> Result<Field, SmallError> {
        match field_type {
            FieldType::Int => {
                let mut arr = [0u8; 4];
                arr.copy_from_slice(&bytes[..4]);
                Ok(Field::Int(i32::from_be_bytes(arr)))
            }
            FieldType::Str(max_len) => {
                let len = bytes[0] as usize;
                if len > max_len {
                    return Err(SmallError::IoError("corrupt string field: length exceeds column width".into()));
                }
                let s = String::from_utf8(bytes[1..1 + len].to_vec())?;
                Ok(Field::Str(s))
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Describes the ordered, fixed-width column layout shared by every tuple in
/// one heap file.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TupleDesc {
    fields: Vec<FieldItem>,
}

impl TupleDesc {
    pub fn new(fields: Vec<FieldItem>) -> TupleDesc {
        TupleDesc { fields }
    }

    pub fn merge(a: &TupleDesc, b: &TupleDesc) -> TupleDesc {
        let mut fields = a.fields.clone();
        fields.extend(b.fields.clone());
        TupleDesc { fields }
    }

    pub fn fields_count(&self) -> usize {
        self.fields.len()
    }

    pub fn get_field_type(&self, i: usize) -> FieldType {
        self.fields[i].field_type
    }

    pub fn fields(&self) -> &[FieldItem] {
        &self.fields
    }

    /// Fixed on-disk width of one tuple under this schema, in bytes.
    pub fn tuple_size(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.size()).sum()
    }
}

pub fn simple_int_tuple_desc(width: usize, name_prefix: &str) -> TupleDesc {
    let fields = (0..width)
        .map(|i| FieldItem {
            field_name: format!("{}-{}", name_prefix, i),
            field_type: FieldType::Int,
        })
        .collect();
    TupleDesc::new(fields)
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tuple {
    fields: Vec<Field>,
    pub record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(fields: Vec<Field>) -> Tuple {
        Tuple { fields, record_id: None }
    }

    pub fn with_record_id(mut self, rid: RecordId) -> Tuple {
        self.record_id = Some(rid);
        self
    }

    pub fn get_field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn encode(&self, desc: &TupleDesc) -> Result<Vec<u8>, SmallError> {
        let mut buf = Vec::with_capacity(desc.tuple_size());
        for (field, item) in self.fields.iter().zip(desc.fields()) {
            field.encode(item.field_type, &mut buf)?;
        }
        Ok(buf)
    }

    pub fn decode(desc: &TupleDesc, bytes: &[u8]) -> Result<Tuple, SmallError> {
        let mut fields = Vec::with_capacity(desc.fields_count());
        let mut offset = 0;
        for item in desc.fields() {
            let width = item.field_type.size();
            fields.push(Field::decode(item.field_type, &bytes[offset..offset + width])?);
            offset += width;
        }
        Ok(Tuple { fields, record_id: None })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.fields.iter().map(|c| c.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}

pub fn display_tuples(tuples: &[Tuple]) {
    let shown = &tuples[..tuples.len().min(5)];
    let rendered: Vec<String> = shown.iter().map(|t| t.to_string()).collect();
    debug!("tuples[{} in total]: [{} ...]", tuples.len(), rendered.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let desc = TupleDesc::new(vec![
            FieldItem { field_type: FieldType::Int, field_name: "id".into() },
            FieldItem { field_type: FieldType::Str(8), field_name: "name".into() },
        ]);
        let tuple = Tuple::new(vec![Field::Int(1), Field::Str("a".into())]);
        let bytes = tuple.encode(&desc).unwrap();
        assert_eq!(bytes.len(), desc.tuple_size());
        let decoded = Tuple::decode(&desc, &bytes).unwrap();
        assert_eq!(decoded.get_field(0), &Field::Int(1));
        assert_eq!(decoded.get_field(1), &Field::Str("a".into()));
    }

    #[test]
    fn string_over_max_length_is_rejected() {
        let desc = TupleDesc::new(vec![FieldItem { field_type: FieldType::Str(2), field_name: "s".into() }]);
        let tuple = Tuple::new(vec![Field::Str("too long".into())]);
        assert!(tuple.encode(&desc).is_err());
    }
}
