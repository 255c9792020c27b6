use crate::errors::Error;
use crate::types::DataType;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Placement of one attribute inside a relation's fixed-width records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttrDesc {
    pub rel_name: String,
    pub attr_name: String,
    pub offset: i32,
    pub len: i32,
    pub ty: DataType,
}

/// The attribute catalog: for every relation, its attribute descriptors in
/// schema order. Persisted as one bincode blob next to the relation files.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AttrCatalog {
    rels: HashMap<String, Vec<AttrDesc>>,
}

impl AttrCatalog {
    pub fn add_rel(&mut self, rel: &str, attrs: &[(&str, DataType, i32)]) -> Result<(), Error> {
        if self.rels.contains_key(rel) {
            return Err(Error::RelationExists(rel.to_string()));
        }

        let mut descs = Vec::with_capacity(attrs.len());
        let mut offset = 0;
        for (attr_name, ty, len) in attrs {
            // ints and floats have a fixed width, strings are schema-sized
            let len = match ty.fixed_size() {
                Some(fixed) => fixed as i32,
                None => *len,
            };
            if len < 1 {
                return Err(Error::BadAttrValue(format!("{rel}.{attr_name} length {len}")));
            }
            descs.push(AttrDesc {
                rel_name: rel.to_string(),
                attr_name: attr_name.to_string(),
                offset,
                len,
                ty: *ty,
            });
            offset += len;
        }

        self.rels.insert(rel.to_string(), descs);
        Ok(())
    }

    pub fn remove_rel(&mut self, rel: &str) -> Result<(), Error> {
        self.rels
            .remove(rel)
            .map(|_| ())
            .ok_or_else(|| Error::RelationNotFound(rel.to_string()))
    }

    /// All descriptors of a relation, in schema order.
    pub fn get_rel(&self, rel: &str) -> Result<&[AttrDesc], Error> {
        self.rels
            .get(rel)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::RelationNotFound(rel.to_string()))
    }

    pub fn get_info(&self, rel: &str, attr: &str) -> Result<&AttrDesc, Error> {
        self.get_rel(rel)?
            .iter()
            .find(|desc| desc.attr_name == attr)
            .ok_or_else(|| Error::AttrNotFound(rel.to_string(), attr.to_string()))
    }

    pub fn rec_len(&self, rel: &str) -> Result<usize, Error> {
        Ok(self
            .get_rel(rel)?
            .iter()
            .map(|desc| desc.len as usize)
            .sum())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(bincode::deserialize_from(BufReader::new(file))?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_manager::test_dir;

    fn sample() -> AttrCatalog {
        let mut catalog = AttrCatalog::default();
        catalog
            .add_rel(
                "emp",
                &[
                    ("id", DataType::Int, 0),
                    ("name", DataType::Str, 16),
                    ("salary", DataType::Float, 0),
                ],
            )
            .unwrap();
        catalog
    }

    #[test]
    fn test_offsets_follow_schema_order() -> Result<()> {
        let catalog = sample();

        let descs = catalog.get_rel("emp")?;
        assert_eq!(descs.len(), 3);
        assert_eq!((descs[0].offset, descs[0].len), (0, 4));
        assert_eq!((descs[1].offset, descs[1].len), (4, 16));
        assert_eq!((descs[2].offset, descs[2].len), (20, 4));
        assert_eq!(catalog.rec_len("emp")?, 24);

        let salary = catalog.get_info("emp", "salary")?;
        assert_eq!(salary.ty, DataType::Float);

        Ok(())
    }

    #[test]
    fn test_lookup_failures() {
        let catalog = sample();

        assert!(matches!(
            catalog.get_rel("dept"),
            Err(Error::RelationNotFound(_))
        ));
        assert!(matches!(
            catalog.get_info("emp", "age"),
            Err(Error::AttrNotFound(_, _))
        ));
    }

    #[test]
    fn test_duplicate_rel_rejected() {
        let mut catalog = sample();
        assert!(matches!(
            catalog.add_rel("emp", &[("x", DataType::Int, 0)]),
            Err(Error::RelationExists(_))
        ));
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let dir = test_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("attrcat");

        let catalog = sample();
        catalog.save(&path)?;

        let loaded = AttrCatalog::load(&path)?;
        assert_eq!(loaded.rec_len("emp")?, 24);
        assert_eq!(loaded.get_info("emp", "name")?.offset, 4);

        Ok(())
    }
}
