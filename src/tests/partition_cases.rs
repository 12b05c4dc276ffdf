#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::Write;

    use crate::dex::class_def::ClassDef;
    use crate::dex::descriptor;
    use crate::dex::error::DexError;
    use crate::dex::partition::{
        shard_file_name, DataStore, MemoryDataStore, PartitionConfig, Partitioner, Shard, ShardWriter,
        RESERVED_ID_SLACK,
    };
    use crate::tests::fixtures::*;

    /// A class declaring `methods` virtual methods and `fields` instance
    /// fields, all distinct from those of other classes.
    fn class_with(name: &str, methods: usize, fields: usize) -> ClassDef {
        let mut class = class(&format!("Lapp/{};", name), descriptor::OBJECT);
        class.methods = (0..methods).map(|i| virtual_method(&format!("m{}", i), "()V")).collect();
        class.fields = (0..fields).map(|i| field(&format!("f{}", i), "I")).collect();
        class
    }

    fn descriptors(shard: &Shard) -> Vec<String> {
        shard.descriptors().map(String::from).collect()
    }

    #[test]
    fn shards_are_numbered_after_the_first() {
        assert_eq!(shard_file_name("classes.dex", 0), "classes.dex");
        assert_eq!(shard_file_name("classes.dex", 1), "classes2.dex");
        assert_eq!(shard_file_name("classes.dex", 9), "classes10.dex");
        assert_eq!(shard_file_name("out", 2), "out3");
    }

    #[test]
    fn everything_fits_in_one_shard_by_default() {
        let classes = vec![class_with("A", 5, 2), class_with("B", 5, 2)];
        let shards = Partitioner::default().partition(classes).unwrap();
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].file_name, "classes.dex");
        assert_eq!(shards[0].pool.method_count(), 10);
        assert_eq!(shards[0].pool.field_count(), 4);
    }

    #[test]
    fn shards_stay_under_the_id_limit() {
        let classes = vec![class_with("C", 5, 0), class_with("A", 5, 0), class_with("B", 5, 1)];
        let limit = 20;
        let shards = Partitioner::with_limit(limit).partition(classes).unwrap();

        assert_eq!(shards.len(), 2);
        assert_eq!(descriptors(&shards[0]), vec!["Lapp/A;", "Lapp/B;"]);
        assert_eq!(descriptors(&shards[1]), vec!["Lapp/C;"]);
        assert_eq!(shards[1].file_name, "classes2.dex");
        for shard in &shards {
            assert!(shard.pool.method_count() + RESERVED_ID_SLACK <= limit);
            assert!(shard.pool.field_count() + RESERVED_ID_SLACK <= limit);
        }
    }

    #[test]
    fn partitioning_keeps_every_class_once() {
        let input: Vec<ClassDef> = (0..12).map(|i| class_with(&format!("K{:02}", i), 3, i % 3)).collect();
        let shards = Partitioner::with_limit(25).partition(input.clone()).unwrap();
        assert!(shards.len() > 1);

        let placed: Vec<String> = shards.iter().flat_map(descriptors).collect();
        let unique: BTreeSet<&String> = placed.iter().collect();
        assert_eq!(unique.len(), placed.len());
        let expected: BTreeSet<String> = input.iter().map(|c| c.descriptor.clone()).collect();
        assert_eq!(placed.into_iter().collect::<BTreeSet<_>>(), expected);
        for (index, shard) in shards.iter().enumerate() {
            assert_eq!(shard.index, index);
        }
    }

    #[test]
    fn duplicate_classes_are_dropped() {
        let shards = Partitioner::default()
            .partition(vec![class_with("A", 1, 0), class_with("A", 2, 0), class_with("B", 1, 0)])
            .unwrap();
        assert_eq!(descriptors(&shards[0]), vec!["Lapp/A;", "Lapp/B;"]);
    }

    #[test]
    fn a_class_over_the_limit_is_an_error() {
        let error = Partitioner::with_limit(12).partition(vec![class_with("Huge", 5, 0)]).unwrap_err();
        assert!(error.message().contains("Lapp/Huge;"), "{}", error);
    }

    #[test]
    fn a_late_class_over_the_limit_is_an_error() {
        let error = Partitioner::with_limit(16)
            .partition(vec![class_with("A", 2, 0), class_with("B", 7, 0)])
            .unwrap_err();
        assert!(error.message().contains("Lapp/B;"), "{}", error);
    }

    struct DescriptorWriter;

    impl ShardWriter for DescriptorWriter {
        fn write_shard(&mut self, shard: &Shard, sink: &mut dyn Write) -> Result<(), DexError> {
            for descriptor in shard.descriptors() {
                writeln!(sink, "{}", descriptor).map_err(|e| DexError::new(&e.to_string()))?;
            }
            Ok(())
        }
    }

    #[test]
    fn shards_are_written_to_the_store() {
        let partitioner = Partitioner::new(PartitionConfig { id_limit: 20, base_name: "classes.dex".to_string() });
        let mut store = MemoryDataStore::new();
        let names = partitioner
            .write(vec![class_with("A", 5, 0), class_with("B", 5, 0), class_with("C", 5, 0)], &mut DescriptorWriter, &mut store)
            .unwrap();

        assert_eq!(names, vec!["classes.dex", "classes2.dex"]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("classes.dex"), Some(&b"Lapp/A;\nLapp/B;\n"[..]));
        assert_eq!(store.get("classes2.dex"), Some(&b"Lapp/C;\n"[..]));
    }

    #[test]
    fn rewriting_a_store_entry_replaces_it() {
        let mut store = MemoryDataStore::new();
        store.data_store(0, "classes.dex").unwrap().write_all(b"old").unwrap();
        store.data_store(0, "classes.dex").unwrap().write_all(b"new").unwrap();
        assert_eq!(store.get("classes.dex"), Some(&b"new"[..]));
        assert_eq!(store.file_names().collect::<Vec<_>>(), vec!["classes.dex"]);
    }
}
