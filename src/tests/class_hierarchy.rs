#[cfg(test)]
mod tests {
    use crate::analysis::class_path::{ClassPath, ClassPathConfig, UNKNOWN_CLASS};
    use crate::analysis::vtable::VtableEntry;
    use crate::dex::access::AccessFlags;
    use crate::dex::class_def::{ClassDef, MethodDef};
    use crate::dex::descriptor;
    use crate::tests::fixtures::*;

    fn layout_of(class_path: &ClassPath, class: &str) -> Vec<(u32, String)> {
        let layout = class_path.class(class).field_layout(class_path).expect("class resolves");
        assert!(layout.complete, "layout of {} is incomplete", class);
        layout.value.fields().map(|(offset, f)| (offset, f.name.clone())).collect()
    }

    fn vtable_of(class_path: &ClassPath, class: &str) -> Vec<VtableEntry> {
        let vtable = class_path.class(class).vtable(class_path).expect("class resolves");
        vtable.value.clone()
    }

    fn names(vtable: &[VtableEntry]) -> Vec<&str> {
        vtable.iter().map(|e| e.method.name.as_str()).collect()
    }

    fn offset_of(class_path: &ClassPath, class: &str, field: &str) -> Option<u32> {
        class_path.class(class).field_layout(class_path).expect("class resolves").value.offset_of(field)
    }

    fn mixed_fields() -> ClassDef {
        let mut bar = class("Lfoo/Bar;", descriptor::OBJECT);
        bar.fields = vec![field("a", "I"), field("b", "J"), field("c", descriptor::OBJECT)];
        bar
    }

    #[test]
    fn art_packs_references_then_largest_primitives() {
        let class_path = art_class_path(vec![mixed_fields()]);
        assert_eq!(
            layout_of(&class_path, "Lfoo/Bar;"),
            vec![(0, "c".to_string()), (4, "a".to_string()), (8, "b".to_string())]
        );
        let layout = class_path.class("Lfoo/Bar;").field_layout(&class_path).unwrap();
        assert_eq!(layout.value.size(), 16);
    }

    #[test]
    fn dalvik_starts_after_the_object_header() {
        let class_path = dalvik_class_path(vec![mixed_fields()]);
        assert_eq!(offset_of(&class_path, "Lfoo/Bar;", "c"), Some(8));
        assert_eq!(offset_of(&class_path, "Lfoo/Bar;", "a"), Some(12));
        assert_eq!(offset_of(&class_path, "Lfoo/Bar;", "b"), Some(16));
    }

    #[test]
    fn art_fills_alignment_gaps_with_small_fields() {
        let mut packed = class("Lfoo/Packed;", descriptor::OBJECT);
        packed.fields = vec![
            field("z", "Z"),
            field("b", "B"),
            field("s", "S"),
            field("i", "I"),
            field("l", "J"),
            field("o2", descriptor::OBJECT),
            field("o1", descriptor::OBJECT),
        ];
        let class_path = art_class_path(vec![packed]);
        let expected = [("o1", 0), ("o2", 4), ("l", 8), ("i", 16), ("s", 20), ("z", 22), ("b", 23)];
        for (name, offset) in expected {
            assert_eq!(offset_of(&class_path, "Lfoo/Packed;", name), Some(offset), "offset of {}", name);
        }
    }

    #[test]
    fn legacy_art_groups_by_kind_then_name() {
        let mut legacy = class("Lfoo/Legacy;", descriptor::OBJECT);
        legacy.fields = vec![field("x", "I"), field("w", "J"), field("r", descriptor::OBJECT)];
        let class_path =
            ClassPath::from_classes(ClassPathConfig::new(21, 39), vec![object_class(), legacy]);
        assert_eq!(offset_of(&class_path, "Lfoo/Legacy;", "r"), Some(0));
        assert_eq!(offset_of(&class_path, "Lfoo/Legacy;", "x"), Some(4));
        assert_eq!(offset_of(&class_path, "Lfoo/Legacy;", "w"), Some(8));
    }

    #[test]
    fn legacy_art_packs_narrow_fields_in_the_last_pass() {
        let mut legacy = class("Lfoo/L;", descriptor::OBJECT);
        legacy.fields = vec![field("b", "I"), field("a", "B")];
        let class_path =
            ClassPath::from_classes(ClassPathConfig::new(21, 39), vec![object_class(), legacy]);
        assert_eq!(layout_of(&class_path, "Lfoo/L;"), vec![(0, "a".to_string()), (1, "b".to_string())]);
        let layout = class_path.class("Lfoo/L;").field_layout(&class_path).unwrap();
        assert_eq!(layout.value.size(), 5);
    }

    #[test]
    fn legacy_art_aligns_wide_fields_and_backfills_the_gap() {
        let mut legacy = class("Lfoo/Wide;", descriptor::OBJECT);
        legacy.fields = vec![field("w", "J"), field("s", "S"), field("r", descriptor::OBJECT)];
        let class_path =
            ClassPath::from_classes(ClassPathConfig::new(21, 39), vec![object_class(), legacy]);
        assert_eq!(
            layout_of(&class_path, "Lfoo/Wide;"),
            vec![(0, "r".to_string()), (4, "s".to_string()), (8, "w".to_string())]
        );
    }

    #[test]
    fn subclass_fields_follow_inherited_ones() {
        let mut sub = class("Lfoo/Sub;", "Lfoo/Bar;");
        sub.fields = vec![field("d", "I")];
        let class_path = art_class_path(vec![mixed_fields(), sub]);
        assert_eq!(offset_of(&class_path, "Lfoo/Sub;", "d"), Some(16));
        assert_eq!(offset_of(&class_path, "Lfoo/Sub;", "c"), Some(0));
    }

    #[test]
    fn static_fields_take_no_instance_slot() {
        let mut bar = mixed_fields();
        bar.fields.push(crate::dex::class_def::FieldDef::new(
            "CONSTANT",
            "I",
            AccessFlags::PUBLIC | AccessFlags::STATIC,
        ));
        let class_path = art_class_path(vec![bar]);
        assert_eq!(offset_of(&class_path, "Lfoo/Bar;", "CONSTANT"), None);
    }

    #[test]
    fn missing_superclass_gives_a_partial_layout() {
        let mut orphan = class("Lfoo/Orphan;", "Lgone/Parent;");
        orphan.fields = vec![field("x", "I")];
        let class_path = dalvik_class_path(vec![orphan]);
        let layout = class_path.class("Lfoo/Orphan;").field_layout(&class_path).unwrap();
        assert!(!layout.complete);
        assert_eq!(layout.value.offset_of("x"), Some(8));
    }

    #[test]
    fn layouts_are_deterministic() {
        let first = art_class_path(vec![mixed_fields()]);
        let second = art_class_path(vec![mixed_fields()]);
        assert_eq!(layout_of(&first, "Lfoo/Bar;"), layout_of(&second, "Lfoo/Bar;"));
        assert_eq!(
            vtable_of(&first, descriptor::OBJECT),
            vtable_of(&second, descriptor::OBJECT)
        );
    }

    #[test]
    fn overrides_reuse_the_inherited_slot() {
        let (classes, _) = bar_with(virtual_method("run", "()V"));
        let class_path = dalvik_class_path(classes);
        let vtable = vtable_of(&class_path, "Lfoo/Bar;");
        assert_eq!(names(&vtable), vec!["equals", "hashCode", "toString", "run"]);
        assert_eq!(vtable[3].method.class, "Lfoo/Bar;");
        assert_eq!(vtable[3].origin, "Lfoo/Bar;");
    }

    #[test]
    fn new_methods_are_appended_in_name_order() {
        let mut classes = base_hierarchy();
        classes[1].methods.push(virtual_method("zap", "()V"));
        classes[1].methods.push(virtual_method("apply", "(I)V"));
        let class_path = dalvik_class_path(classes);
        let vtable = vtable_of(&class_path, "Lfoo/Bar;");
        assert_eq!(names(&vtable), vec!["equals", "hashCode", "toString", "run", "apply", "zap"]);
        assert_eq!(vtable[3].method.class, "Lfoo/Base;");
    }

    #[test]
    fn direct_methods_stay_out_of_the_vtable() {
        let (classes, _) = bar_with(MethodDef::new("helper", proto("()V"), AccessFlags::PRIVATE));
        let class_path = dalvik_class_path(classes);
        assert_eq!(vtable_of(&class_path, "Lfoo/Bar;").len(), 4);
    }

    fn runner() -> ClassDef {
        let mut runner = interface("Lfoo/Runner;");
        runner.methods = vec![abstract_method("run", "()V"), abstract_method("runFast", "()V")];
        runner
    }

    #[test]
    fn interface_methods_fill_missing_slots() {
        let mut bar = class("Lfoo/Bar;", descriptor::OBJECT);
        bar.interfaces = vec!["Lfoo/Runner;".to_string()];
        bar.methods = vec![virtual_method("run", "()V")];
        let class_path = dalvik_class_path(vec![runner(), bar]);
        let vtable = vtable_of(&class_path, "Lfoo/Bar;");
        assert_eq!(names(&vtable), vec!["equals", "hashCode", "toString", "run", "runFast"]);
        assert_eq!(vtable[3].origin, "Lfoo/Bar;");
        assert_eq!(vtable[4].method.class, "Lfoo/Bar;");
        assert_eq!(vtable[4].origin, "Lfoo/Runner;");
    }

    fn package_private_override(class_path_config: ClassPathConfig) -> Vec<VtableEntry> {
        let mut base = class("Lfoo/Base;", descriptor::OBJECT);
        base.methods = vec![MethodDef::new("hidden", proto("()V"), AccessFlags::empty())];
        let mut sub = class("Lbar/Sub;", "Lfoo/Base;");
        sub.methods = vec![virtual_method("hidden", "()V")];
        let class_path = ClassPath::from_classes(class_path_config, vec![object_class(), base, sub]);
        vtable_of(&class_path, "Lbar/Sub;")
    }

    #[test]
    fn package_private_methods_are_not_overridden_across_packages() {
        let vtable = package_private_override(ClassPathConfig::dalvik(19));
        assert_eq!(names(&vtable), vec!["equals", "hashCode", "toString", "hidden", "hidden"]);
        assert_eq!(vtable[3].method.class, "Lfoo/Base;");
        assert_eq!(vtable[4].method.class, "Lbar/Sub;");
    }

    #[test]
    fn old_releases_override_package_private_methods() {
        let vtable = package_private_override(ClassPathConfig::dalvik(16));
        assert_eq!(names(&vtable), vec!["equals", "hashCode", "toString", "hidden"]);
        assert_eq!(vtable[3].method.class, "Lbar/Sub;");
    }

    #[test]
    fn default_methods_get_their_own_slot() {
        let mut greeter = interface("Lfoo/Greeter;");
        greeter.methods = vec![virtual_method("greet", "()V"), abstract_method("name", "()Ljava/lang/String;")];
        let mut greeting = class("Lfoo/Greeting;", descriptor::OBJECT);
        greeting.interfaces = vec!["Lfoo/Greeter;".to_string()];
        greeting.methods = vec![virtual_method("name", "()Ljava/lang/String;")];
        let class_path = art_class_path(vec![greeter, greeting]);
        let vtable = vtable_of(&class_path, "Lfoo/Greeting;");
        assert_eq!(names(&vtable), vec!["equals", "hashCode", "toString", "name", "greet"]);
        assert_eq!(vtable[3].origin, "Lfoo/Greeting;");
        assert_eq!(vtable[4].origin, "Lfoo/Greeter;");
        assert_eq!(vtable[4].method.class, "Lfoo/Greeting;");
    }

    #[test]
    fn missing_superclass_falls_back_to_the_object_vtable() {
        let mut orphan = class("Lfoo/Orphan;", "Lgone/Parent;");
        orphan.methods = vec![virtual_method("run", "()V")];
        let class_path = dalvik_class_path(vec![orphan]);
        let vtable = class_path.class("Lfoo/Orphan;").vtable(&class_path).unwrap();
        assert!(!vtable.complete);
        assert_eq!(names(&vtable.value), vec!["equals", "hashCode", "toString", "run"]);
    }

    #[test]
    fn missing_interfaces_leave_the_vtable_incomplete() {
        let mut c = class("Lfoo/C;", descriptor::OBJECT);
        c.interfaces = vec!["Lgone/I;".to_string()];
        c.methods = vec![virtual_method("run", "()V")];
        let mut d = class("Lfoo/D;", "Lfoo/C;");
        d.methods = vec![virtual_method("walk", "()V")];
        let class_path = dalvik_class_path(vec![c, d]);

        let vtable = class_path.class("Lfoo/C;").vtable(&class_path).unwrap();
        assert!(!vtable.complete);
        assert_eq!(names(&vtable.value), vec!["equals", "hashCode", "toString", "run"]);

        let sub = class_path.class("Lfoo/D;").vtable(&class_path).unwrap();
        assert!(!sub.complete);
        assert_eq!(names(&sub.value), vec!["equals", "hashCode", "toString", "run", "walk"]);
    }

    #[test]
    fn unresolved_interfaces_make_membership_unknown() {
        let mut bar = class("Lfoo/Bar;", descriptor::OBJECT);
        bar.interfaces = vec!["Lmissing/Iface;".to_string(), "Lfoo/Runner;".to_string()];
        let class_path = dalvik_class_path(vec![runner(), bar]);
        let proto = class_path.class("Lfoo/Bar;");
        assert_eq!(proto.implements_interface(&class_path, "Lfoo/Runner;"), Ok(true));
        let missing = proto.implements_interface(&class_path, "Lmissing/Iface;");
        assert_eq!(missing.map_err(|e| e.descriptor), Err("Lmissing/Iface;".to_string()));
        assert!(proto.implements_interface(&class_path, "Lfoo/Other;").is_err());
        assert!(!proto.interfaces(&class_path).complete);
    }

    #[test]
    fn interfaces_are_inherited_from_superclasses_and_interfaces() {
        let mut fast = interface("Lfoo/FastRunner;");
        fast.interfaces = vec!["Lfoo/Runner;".to_string()];
        let mut bar = class("Lfoo/Bar;", descriptor::OBJECT);
        bar.interfaces = vec!["Lfoo/FastRunner;".to_string()];
        let sub = class("Lfoo/Sub;", "Lfoo/Bar;");
        let class_path = dalvik_class_path(vec![runner(), fast, bar, sub]);

        let sub = class_path.class("Lfoo/Sub;");
        assert_eq!(sub.implements_interface(&class_path, "Lfoo/Runner;"), Ok(true));
        assert_eq!(sub.implements_interface(&class_path, "Lfoo/FastRunner;"), Ok(true));
        assert_eq!(sub.implements_interface(&class_path, "Lfoo/Other;"), Ok(false));
        assert!(sub.direct_interfaces(&class_path).is_empty());

        let bar = class_path.class("Lfoo/Bar;");
        let direct: Vec<String> = bar.direct_interfaces(&class_path).iter().map(|d| d.descriptor.clone()).collect();
        assert_eq!(direct, vec!["Lfoo/FastRunner;".to_string(), "Lfoo/Runner;".to_string()]);
    }

    #[test]
    fn arrays_implement_cloneable_and_serializable() {
        let class_path = dalvik_class_path(vec![]);
        let array = class_path.class("[I");
        assert_eq!(array.implements_interface(&class_path, descriptor::CLONEABLE), Ok(true));
        assert_eq!(array.implements_interface(&class_path, descriptor::SERIALIZABLE), Ok(true));
        assert_eq!(array.implements_interface(&class_path, "Lfoo/Runner;"), Ok(false));
    }

    fn common(class_path: &ClassPath, a: &str, b: &str) -> String {
        let a = class_path.class(a);
        let b = class_path.class(b);
        let forward = a.common_superclass(class_path, &b).descriptor().to_string();
        let backward = b.common_superclass(class_path, &a).descriptor().to_string();
        assert_eq!(forward, backward, "common superclass is not symmetric");
        forward
    }

    #[test]
    fn common_superclass_of_classes() {
        let mut classes = base_hierarchy();
        classes.push(class("Lfoo/Other;", descriptor::OBJECT));
        classes.push(class("Lfoo/Leaf;", "Lfoo/Bar;"));
        let class_path = dalvik_class_path(classes);
        assert_eq!(common(&class_path, "Lfoo/Bar;", "Lfoo/Bar;"), "Lfoo/Bar;");
        assert_eq!(common(&class_path, "Lfoo/Leaf;", "Lfoo/Base;"), "Lfoo/Base;");
        assert_eq!(common(&class_path, "Lfoo/Leaf;", "Lfoo/Bar;"), "Lfoo/Bar;");
        assert_eq!(common(&class_path, "Lfoo/Bar;", "Lfoo/Other;"), descriptor::OBJECT);
        assert_eq!(common(&class_path, "Lfoo/Bar;", descriptor::OBJECT), descriptor::OBJECT);
    }

    #[test]
    fn common_superclass_with_interfaces() {
        let mut bar = class("Lfoo/Bar;", descriptor::OBJECT);
        bar.interfaces = vec!["Lfoo/Runner;".to_string()];
        let other = class("Lfoo/Other;", descriptor::OBJECT);
        let class_path = dalvik_class_path(vec![runner(), bar, other]);
        assert_eq!(common(&class_path, "Lfoo/Bar;", "Lfoo/Runner;"), "Lfoo/Runner;");
        assert_eq!(common(&class_path, "Lfoo/Other;", "Lfoo/Runner;"), descriptor::OBJECT);
    }

    #[test]
    fn common_superclass_of_arrays() {
        let mut classes = base_hierarchy();
        classes.push(class("Lfoo/Other;", descriptor::OBJECT));
        let class_path = dalvik_class_path(classes);
        assert_eq!(common(&class_path, "[Lfoo/Bar;", "[Lfoo/Base;"), "[Lfoo/Base;");
        assert_eq!(common(&class_path, "[Lfoo/Bar;", "[Lfoo/Other;"), "[Ljava/lang/Object;");
        assert_eq!(common(&class_path, "[[Lfoo/Bar;", "[Lfoo/Bar;"), "[Ljava/lang/Object;");
        assert_eq!(common(&class_path, "[I", "[Lfoo/Bar;"), descriptor::OBJECT);
        assert_eq!(common(&class_path, "[I", "Lfoo/Bar;"), descriptor::OBJECT);
        assert_eq!(common(&class_path, "[[I", "[[J"), "[Ljava/lang/Object;");
    }

    #[test]
    fn unresolved_classes_meet_at_the_unknown_class() {
        let class_path = dalvik_class_path(base_hierarchy());
        assert_eq!(common(&class_path, "Lgone/Thing;", "Lfoo/Bar;"), UNKNOWN_CLASS);
        let unknown = class_path.unknown_class();
        let object = class_path.object_class();
        assert_eq!(unknown.common_superclass(&class_path, &object).descriptor(), descriptor::OBJECT);
    }
}
