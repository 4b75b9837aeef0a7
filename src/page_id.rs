/// Identifies one page within one heap file.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, PartialOrd, Ord)]
pub struct HeapPageId {
    pub table_id: i32,
    pub page_number: i32,
}

impl HeapPageId {
    pub fn new(table_id: i32, page_number: i32) -> HeapPageId {
        HeapPageId { table_id, page_number }
    }

    pub fn class_name() -> &'static str {
        "HeapPageId"
    }
}

impl std::fmt::Display for HeapPageId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "HeapPageId(table={}, page={})", self.table_id, self.page_number)
    }
}
