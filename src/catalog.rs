use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::SmallError;
use crate::heap_file::HeapFile;

/// Minimal table-id to heap-file mapping. Intentionally not a schema
/// manager: table/column naming, constraints, and migrations are a SQL-layer
/// concern that sits above this crate.
pub struct Catalog {
    tables: RwLock<HashMap<i32, Arc<HeapFile>>>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog { tables: RwLock::new(HashMap::new()) }
    }

    pub fn add_table(&self, file: Arc<HeapFile>) {
        self.tables.write().unwrap().insert(file.get_id(), file);
    }

    pub fn get_file(&self, table_id: i32) -> Result<Arc<HeapFile>, SmallError> {
        self.tables
            .read()
            .unwrap()
            .get(&table_id)
            .cloned()
            .ok_or_else(|| SmallError::not_found(&format!("no table registered with id {}", table_id)))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::new()
    }
}
