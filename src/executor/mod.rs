use crate::buffer_pool::{ArcBufferPool, BufferPoolManager, DEFAULT_POOL_SIZE};
use crate::catalog::{AttrCatalog, AttrDesc};
use crate::disk_manager::DiskManager;
use crate::errors::Error;
use crate::heap_file::{create_heap_file, destroy_heap_file, HeapFileScan, InsertFileScan};
use crate::printdbg;
use crate::types::{encode_value, DataType, Operator};
use anyhow::{bail, ensure, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CATALOG_FILE: &str = "attrcat";

/// A relation attribute as written by a client.
#[derive(Debug, Clone)]
pub struct AttrRef {
    pub rel_name: String,
    pub attr_name: String,
}

impl AttrRef {
    pub fn new(rel_name: &str, attr_name: &str) -> Self {
        Self {
            rel_name: rel_name.to_string(),
            attr_name: attr_name.to_string(),
        }
    }
}

/// A single-relation query engine over heap files: select with projection
/// and an optional filter, insert, and delete. One shared buffer pool backs
/// every relation in the database directory.
pub struct Database {
    disk: DiskManager,
    bpm: ArcBufferPool,
    catalog: AttrCatalog,
    catalog_path: PathBuf,
}

impl Database {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let disk = DiskManager::new(&dir);
        let catalog_path = dir.as_ref().join(CATALOG_FILE);
        let catalog = if catalog_path.exists() {
            AttrCatalog::load(&catalog_path)?
        } else {
            AttrCatalog::default()
        };

        Ok(Self {
            disk,
            bpm: Arc::new(Mutex::new(BufferPoolManager::new(DEFAULT_POOL_SIZE))),
            catalog,
            catalog_path,
        })
    }

    pub fn create_relation(&mut self, rel: &str, attrs: &[(&str, DataType, i32)]) -> Result<()> {
        if self.catalog.get_rel(rel).is_ok() {
            bail!(Error::RelationExists(rel.to_string()));
        }
        create_heap_file(&self.disk, &self.bpm, rel)?;
        self.catalog.add_rel(rel, attrs)?;
        self.catalog.save(&self.catalog_path)?;
        Ok(())
    }

    pub fn drop_relation(&mut self, rel: &str) -> Result<()> {
        self.catalog.remove_rel(rel)?;
        destroy_heap_file(&self.disk, rel)?;
        self.catalog.save(&self.catalog_path)?;
        Ok(())
    }

    /// Project the named attributes of every matching record into the result
    /// relation.
    pub fn select(
        &self,
        result: &str,
        proj_names: &[AttrRef],
        filter_attr: Option<&AttrRef>,
        op: Operator,
        attr_value: Option<&str>,
    ) -> Result<()> {
        printdbg!("select into {}", result);
        ensure!(!proj_names.is_empty(), Error::BadScanParm);

        // resolve projections up front; they all come from one relation
        let proj: Vec<AttrDesc> = proj_names
            .iter()
            .map(|attr| {
                self.catalog
                    .get_info(&attr.rel_name, &attr.attr_name)
                    .cloned()
            })
            .collect::<Result<_, _>>()?;
        let rec_len: usize = proj.iter().map(|desc| desc.len as usize).sum();

        let filter = match (filter_attr, attr_value) {
            (Some(attr), Some(value)) => {
                let desc = self
                    .catalog
                    .get_info(&attr.rel_name, &attr.attr_name)?
                    .clone();
                let bytes = encode_value(desc.ty, desc.len as usize, value)?;
                Some((desc, bytes))
            }
            (None, _) => None,
            (Some(_), None) => bail!(Error::BadScanParm),
        };

        let mut input = HeapFileScan::open(&self.disk, self.bpm.clone(), &proj[0].rel_name)?;
        let mut output = InsertFileScan::open(&self.disk, self.bpm.clone(), result)?;

        match &filter {
            Some((desc, bytes)) => {
                input.start_scan(desc.offset, desc.len, desc.ty, Some(bytes), op)?
            }
            None => input.start_scan(0, 0, DataType::Str, None, op)?,
        }

        let mut out_data = vec![0u8; rec_len];
        while input.scan_next()?.is_some() {
            let rec = input.cur_record()?;
            let mut out_offset = 0;
            for desc in &proj {
                let from = desc.offset as usize;
                let len = desc.len as usize;
                out_data[out_offset..out_offset + len]
                    .copy_from_slice(&rec.bytes()[from..from + len]);
                out_offset += len;
            }
            output.insert_record(&out_data)?;
        }

        Ok(())
    }

    /// Insert one record, reordering the caller's attribute list into schema
    /// order and encoding each value per its type.
    pub fn insert(&self, rel: &str, attr_list: &[(&str, &str)]) -> Result<()> {
        printdbg!("insert into {}", rel);

        let schema = self.catalog.get_rel(rel)?;
        ensure!(
            attr_list.len() == schema.len(),
            Error::BadAttrValue(format!("expected {} attributes", schema.len()))
        );

        let mut data = vec![0u8; self.catalog.rec_len(rel)?];
        for desc in schema {
            let (_, value) = attr_list
                .iter()
                .find(|(name, _)| *name == desc.attr_name)
                .ok_or_else(|| Error::AttrNotFound(rel.to_string(), desc.attr_name.clone()))?;
            let bytes = encode_value(desc.ty, desc.len as usize, value)?;
            data[desc.offset as usize..(desc.offset + desc.len) as usize]
                .copy_from_slice(&bytes);
        }

        let mut output = InsertFileScan::open(&self.disk, self.bpm.clone(), rel)?;
        output.insert_record(&data)?;
        Ok(())
    }

    /// Delete every record matching the filter, or every record when no
    /// attribute is given.
    pub fn delete(
        &self,
        rel: &str,
        attr_name: Option<&str>,
        op: Operator,
        ty: DataType,
        attr_value: Option<&str>,
    ) -> Result<()> {
        printdbg!("delete from {}", rel);

        let mut scan = HeapFileScan::open(&self.disk, self.bpm.clone(), rel)?;

        match (attr_name, attr_value) {
            (Some(attr), Some(value)) => {
                let desc = self.catalog.get_info(rel, attr)?;
                ensure!(desc.ty == ty, Error::BadScanParm);
                let bytes = encode_value(desc.ty, desc.len as usize, value)?;
                scan.start_scan(desc.offset, desc.len, desc.ty, Some(&bytes), op)?;
            }
            _ => scan.start_scan(0, 0, ty, None, op)?,
        }

        while scan.scan_next()?.is_some() {
            scan.delete_record()?;
        }
        scan.end_scan()?;
        Ok(())
    }
}
