//! Splitting a class set over several dex files so that no file needs more
//! field or method ids than the format can index.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::Write;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::dex::class_def::{ClassDef, FieldRef, MethodRef};
use crate::dex::error::DexError;

/// Field or method ids one dex file can index.
pub const DEFAULT_ID_LIMIT: usize = 65536;

/// Ids the writer may add on its own while finalizing a file.
pub const RESERVED_ID_SLACK: usize = 10;

/// Name of shard `index`: `classes.dex`, `classes2.dex`, `classes3.dex`, ...
/// for the default base name.
pub fn shard_file_name(base_name: &str, index: usize) -> String {
    if index == 0 {
        return base_name.to_string();
    }
    let number = index + 1;
    match base_name.rfind('.') {
        Some(dot) => format!("{}{}{}", &base_name[..dot], number, &base_name[dot..]),
        None => format!("{}{}", base_name, number),
    }
}

/// Interns the field and method references of the classes added to one
/// output file.
#[derive(Debug, Clone, Default)]
pub struct PoolBuilder {
    fields: BTreeSet<FieldRef>,
    methods: BTreeSet<MethodRef>,
}

impl PoolBuilder {
    pub fn intern(&mut self, class: &ClassDef) {
        self.fields.extend(class.field_references());
        self.methods.extend(class.method_references());
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Field and method id counts after adding `class`, slack included.
    pub fn projected_counts(&self, class: &ClassDef) -> (usize, usize) {
        let new_fields = class.field_references().into_iter().filter(|f| !self.fields.contains(f)).count();
        let new_methods = class.method_references().into_iter().filter(|m| !self.methods.contains(m)).count();
        (
            self.fields.len() + new_fields + RESERVED_ID_SLACK,
            self.methods.len() + new_methods + RESERVED_ID_SLACK,
        )
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.fields.iter()
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodRef> {
        self.methods.iter()
    }
}

/// Classes destined for one output file.
#[derive(Debug, Clone)]
pub struct Shard {
    pub index: usize,
    pub file_name: String,
    pub classes: Vec<ClassDef>,
    pub pool: PoolBuilder,
}

impl Shard {
    pub fn descriptors(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(|c| c.descriptor.as_str())
    }
}

/// Serializes one shard. The container format itself is up to the
/// implementation.
pub trait ShardWriter {
    fn write_shard(&mut self, shard: &Shard, sink: &mut dyn Write) -> Result<(), DexError>;
}

/// Where serialized shards go.
pub trait DataStore {
    fn data_store(&mut self, shard_index: usize, file_name: &str) -> Result<&mut dyn Write, DexError>;
}

/// Keeps every shard in memory, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataStore {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        MemoryDataStore::default()
    }

    pub fn get(&self, file_name: &str) -> Option<&[u8]> {
        self.files.get(file_name).map(|b| b.as_slice())
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl DataStore for MemoryDataStore {
    fn data_store(&mut self, _shard_index: usize, file_name: &str) -> Result<&mut dyn Write, DexError> {
        let buffer = self.files.entry(file_name.to_string()).or_default();
        buffer.clear();
        Ok(buffer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Highest field or method id count per file.
    pub id_limit: usize,
    /// Name of the first file; later files get a number before the extension.
    pub base_name: String,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        PartitionConfig { id_limit: DEFAULT_ID_LIMIT, base_name: "classes.dex".to_string() }
    }
}

/// Greedy partitioner: classes are taken in descriptor order and a new
/// shard starts whenever the next class would push the current one over
/// the limit.
#[derive(Debug, Clone, Default)]
pub struct Partitioner {
    config: PartitionConfig,
}

impl Partitioner {
    pub fn new(config: PartitionConfig) -> Self {
        Partitioner { config }
    }

    pub fn with_limit(id_limit: usize) -> Self {
        Partitioner { config: PartitionConfig { id_limit, ..Default::default() } }
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub fn partition(&self, classes: Vec<ClassDef>) -> Result<Vec<Shard>, DexError> {
        let limit = self.config.id_limit;
        let mut classes = classes;
        classes.sort_by(|a, b| a.descriptor.cmp(&b.descriptor));
        let mut seen = HashSet::new();
        classes.retain(|c| {
            let first = seen.insert(c.descriptor.clone());
            if !first {
                warn!("Ignoring duplicate definition of {}", c.descriptor);
            }
            first
        });

        let mut shards = Vec::new();
        let mut current = self.new_shard(0);
        for class in classes {
            let (fields, methods) = current.pool.projected_counts(&class);
            if fields > limit || methods > limit {
                if current.classes.is_empty() {
                    fail!(
                        ("Class {} needs {} field and {} method ids", class.descriptor, fields, methods),
                        ("limit {}", limit)
                    );
                }
                let next = self.new_shard(current.index + 1);
                shards.push(self.flush(std::mem::replace(&mut current, next)));

                let (fields, methods) = current.pool.projected_counts(&class);
                if fields > limit || methods > limit {
                    fail!(
                        ("Class {} needs {} field and {} method ids", class.descriptor, fields, methods),
                        ("limit {}", limit)
                    );
                }
            }
            current.pool.intern(&class);
            current.classes.push(class);
        }
        if !current.classes.is_empty() {
            shards.push(self.flush(current));
        }
        Ok(shards)
    }

    /// Partitions `classes` and hands every shard to `writer`, storing the
    /// bytes in `store`. Returns the file names in shard order.
    pub fn write(
        &self,
        classes: Vec<ClassDef>,
        writer: &mut dyn ShardWriter,
        store: &mut dyn DataStore,
    ) -> Result<Vec<String>, DexError> {
        let shards = self.partition(classes)?;
        let mut names = Vec::with_capacity(shards.len());
        for shard in &shards {
            let sink = store.data_store(shard.index, &shard.file_name)?;
            writer.write_shard(shard, sink).map_err(|e| err!(e, "writing {}", shard.file_name))?;
            names.push(shard.file_name.clone());
        }
        Ok(names)
    }

    fn new_shard(&self, index: usize) -> Shard {
        Shard {
            index,
            file_name: shard_file_name(&self.config.base_name, index),
            classes: Vec::new(),
            pool: PoolBuilder::default(),
        }
    }

    fn flush(&self, shard: Shard) -> Shard {
        info!(
            "{}: {} classes, {} field ids, {} method ids",
            shard.file_name,
            shard.classes.len(),
            shard.pool.field_count(),
            shard.pool.method_count()
        );
        debug!("{} holds {:?}", shard.file_name, shard.descriptors().collect::<Vec<_>>());
        shard
    }
}
