#[cfg(test)]
mod tests {
    use crate::analysis::analyzed_instruction::{NoteKind, Replacement};
    use crate::analysis::class_path::ClassPath;
    use crate::analysis::deodexer::{deodex_class, MethodOutcome};
    use crate::analysis::method_analyzer::{analyze_method, MethodAnalysis};
    use crate::analysis::odex::{can_access_class, deodexed_field_opcode};
    use crate::analysis::register_type::Category;
    use crate::dex::access::AccessFlags;
    use crate::dex::class_def::{ClassDef, LocalVariable, MethodDef, MethodImpl};
    use crate::dex::descriptor;
    use crate::dex::instruction::{Instruction, Reference};
    use crate::dex::opcodes::Opcode;
    use crate::tests::fixtures::*;

    fn analyze(class_path: &ClassPath, class_def: &ClassDef, method: &MethodDef) -> MethodAnalysis {
        match analyze_method(class_path, class_def, method) {
            Ok(analysis) => analysis,
            Err(e) => panic!("analysis failed: {}", e),
        }
    }

    fn iget_quick(dest: u16, object: u16, offset: u32) -> Instruction {
        with_ref(Opcode::IgetQuick, &[dest, object], Reference::FieldOffset(offset))
    }

    fn count_field() -> Reference {
        Reference::Field(field_ref("Lfoo/Base;", "count", "I"))
    }

    /// `static read(param)I` on `Lfoo/Bar;` reading `count` through iget-quick.
    fn read_count(param: &str, offset: u32) -> MethodDef {
        static_method(
            "read",
            &format!("({})I", param),
            2,
            vec![iget_quick(0, 1, offset), insn(Opcode::Return, &[0])],
        )
    }

    #[test]
    fn quick_field_access_is_resolved_by_offset() {
        let (classes, bar) = bar_with(read_count("Lfoo/Base;", 12));
        let class_path = dalvik_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[1]);

        let deodexed = analysis.deodexed_instructions();
        assert_eq!(deodexed[0], with_ref(Opcode::Iget, &[0, 1], count_field()));
        assert_eq!(deodexed[1], insn(Opcode::Return, &[0]));
        assert_eq!(analysis.instruction_at(0).and_then(|i| i.post_type(0)).map(|t| t.category), Some(Category::Integer));
        assert!(analysis.notes().is_empty());
        assert!(analysis.is_fully_deodexed());
        assert_eq!(
            analysis.replacements(),
            vec![(0, Replacement::Deodexed(with_ref(Opcode::Iget, &[0, 1], count_field())))]
        );
    }

    #[test]
    fn art_offsets_follow_the_art_layout() {
        let (classes, bar) = bar_with(read_count("Lfoo/Base;", 4));
        let class_path = art_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[1]);
        assert_eq!(analysis.deodexed_instructions()[0], with_ref(Opcode::Iget, &[0, 1], count_field()));
    }

    #[test]
    fn quick_object_fields_become_iget_object() {
        let method = static_method(
            "name",
            "(Lfoo/Bar;)Ljava/lang/String;",
            2,
            vec![
                with_ref(Opcode::IgetObjectQuick, &[0, 1], Reference::FieldOffset(8)),
                insn(Opcode::ReturnObject, &[0]),
            ],
        );
        let (classes, bar) = bar_with(method);
        let class_path = dalvik_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[1]);
        let name = Reference::Field(field_ref("Lfoo/Base;", "name", descriptor::STRING));
        assert_eq!(analysis.deodexed_instructions()[0], with_ref(Opcode::IgetObject, &[0, 1], name));
        let value = analysis.instruction_at(0).and_then(|i| i.post_type(0)).cloned().unwrap();
        assert_eq!(value.class_descriptor(), Some(descriptor::STRING));
    }

    #[test]
    fn quick_invokes_are_resolved_through_the_vtable() {
        let method = static_method(
            "call",
            "(Lfoo/Bar;)V",
            1,
            vec![
                with_ref(Opcode::InvokeVirtualQuick, &[0], Reference::VtableIndex(3)),
                insn(Opcode::ReturnVoid, &[]),
            ],
        );
        let (classes, bar) = bar_with(method);
        let class_path = dalvik_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[1]);
        let run = Reference::Method(method_ref("Lfoo/Base;", "run", "()V"));
        assert_eq!(analysis.deodexed_instructions()[0], with_ref(Opcode::InvokeVirtual, &[0], run));
    }

    #[test]
    fn super_calls_use_the_superclass_vtable() {
        let run = MethodDef::new("run", proto("()V"), AccessFlags::PUBLIC).with_code(MethodImpl::new(
            1,
            vec![
                with_ref(Opcode::InvokeSuperQuick, &[0], Reference::VtableIndex(3)),
                insn(Opcode::ReturnVoid, &[]),
            ],
        ));
        let (classes, bar) = bar_with(run);
        let class_path = dalvik_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[1]);
        let target = Reference::Method(method_ref("Lfoo/Base;", "run", "()V"));
        assert_eq!(analysis.deodexed_instructions()[0], with_ref(Opcode::InvokeSuper, &[0], target));
    }

    #[test]
    fn inline_calls_are_looked_up_in_the_inline_table() {
        let method = static_method(
            "len",
            "(Ljava/lang/String;)I",
            2,
            vec![
                with_ref(Opcode::ExecuteInline, &[1], Reference::InlineIndex(6)),
                insn(Opcode::MoveResult, &[0]),
                insn(Opcode::Return, &[0]),
            ],
        );
        let (classes, bar) = bar_with(method);
        let class_path = dalvik_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[1]);

        let length = Reference::Method(method_ref(descriptor::STRING, "length", "()I"));
        assert_eq!(analysis.deodexed_instructions()[0], with_ref(Opcode::InvokeVirtual, &[1], length));
        let result = analysis.instruction_at(3).and_then(|i| i.post_type(0)).map(|t| t.category);
        assert_eq!(result, Some(Category::Integer));
    }

    #[test]
    fn invalid_inline_index_is_fatal() {
        let method = static_method(
            "bad",
            "()V",
            1,
            vec![
                with_ref(Opcode::ExecuteInline, &[], Reference::InlineIndex(200)),
                insn(Opcode::ReturnVoid, &[]),
            ],
        );
        let (classes, bar) = bar_with(method);
        let class_path = dalvik_class_path(classes);
        let error = analyze_method(&class_path, &bar, &bar.methods[1]).unwrap_err();
        assert!(error.message().contains("Invalid inline index 200"), "{}", error);
    }

    #[test]
    fn volatile_accessors_become_plain_accessors() {
        let method = static_method(
            "volatiles",
            "(Lfoo/Base;)V",
            2,
            vec![
                with_ref(Opcode::IgetVolatile, &[0, 1], count_field()),
                with_ref(
                    Opcode::SgetObjectVolatile,
                    &[0],
                    Reference::Field(field_ref("Lfoo/Base;", "DEFAULT", descriptor::STRING)),
                ),
                insn(Opcode::ReturnVoid, &[]),
            ],
        );
        let (classes, bar) = bar_with(method);
        let class_path = dalvik_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[1]);
        let opcodes: Vec<Opcode> = analysis.deodexed_instructions().iter().map(|i| i.opcode).collect();
        assert_eq!(opcodes, vec![Opcode::Iget, Opcode::SgetObject, Opcode::ReturnVoid]);
        let value = analysis.instruction_at(2).and_then(|i| i.post_type(0)).cloned().unwrap();
        assert_eq!(value.class_descriptor(), Some(descriptor::STRING));
    }

    #[test]
    fn barrier_returns_and_object_init_are_rewritten() {
        let mut plain = class("Lfoo/Plain;", descriptor::OBJECT);
        let init = MethodDef::new("<init>", proto("()V"), AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR).with_code(
            MethodImpl::new(1, vec![insn(Opcode::InvokeObjectInitRange, &[0]), insn(Opcode::ReturnVoidBarrier, &[])]),
        );
        plain.methods = vec![init.clone()];
        let class_path = dalvik_class_path(vec![plain.clone()]);
        let analysis = analyze(&class_path, &plain, &init);

        let object_init = Reference::Method(method_ref(descriptor::OBJECT, "<init>", "()V"));
        assert_eq!(
            analysis.deodexed_instructions(),
            vec![with_ref(Opcode::InvokeDirectRange, &[0], object_init), insn(Opcode::ReturnVoid, &[])]
        );
        let this = analysis.instruction_at(0).and_then(|i| i.post_type(0)).cloned().unwrap();
        assert_eq!(this.category, Category::Reference);
        assert_eq!(this.class_descriptor(), Some("Lfoo/Plain;"));
    }

    #[test]
    fn null_objects_become_throws() {
        let method = static_method(
            "npe",
            "()V",
            1,
            vec![literal(Opcode::Const4, &[0], 0), iget_quick(0, 0, 8), insn(Opcode::ReturnVoid, &[])],
        );
        let (classes, bar) = bar_with(method);
        let class_path = dalvik_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[1]);

        assert_eq!(
            analysis.deodexed_instructions(),
            vec![
                literal(Opcode::Const4, &[0], 0),
                insn(Opcode::Throw, &[0]),
                insn(Opcode::Nop, &[]),
                insn(Opcode::ReturnVoid, &[]),
            ]
        );
        assert_eq!(analysis.notes().len(), 1);
        assert_eq!(analysis.notes()[0].kind, NoteKind::Unresolvable);
        assert_eq!(analysis.notes()[0].code_address, 1);
        assert!(matches!(
            analysis.replacements().as_slice(),
            [(1, Replacement::Unresolvable { object_register: 0, .. })]
        ));
        assert!(!analysis.instruction_at(3).map(|i| i.is_reachable()).unwrap_or(true));
    }

    #[test]
    fn debug_info_supplies_a_missing_type() {
        let mut method = read_count(descriptor::OBJECT, 12);
        if let Some(code) = method.code.as_mut() {
            code.locals = vec![LocalVariable {
                register: 1,
                name: "base".to_string(),
                type_desc: "Lfoo/Base;".to_string(),
                start_address: 0,
                end_address: 3,
            }];
        }
        let (classes, bar) = bar_with(method);
        let class_path = dalvik_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[1]);

        assert_eq!(analysis.deodexed_instructions()[0], with_ref(Opcode::Iget, &[0, 1], count_field()));
        let note = &analysis.notes()[0];
        assert_eq!(note.kind, NoteKind::DebugLocal);
        assert_eq!(note.register, 1);
        assert_eq!(note.type_desc.as_deref(), Some("Lfoo/Base;"));
    }

    fn checked_read(offset: u32) -> MethodDef {
        static_method(
            "checked",
            "(Ljava/lang/Object;)I",
            3,
            vec![
                type_insn(Opcode::InstanceOf, &[0, 2], "Lfoo/Base;"),
                branch(Opcode::IfEqz, &[0], 5),
                iget_quick(0, 2, offset),
                insn(Opcode::Return, &[0]),
                literal(Opcode::Const4, &[0], 0),
                insn(Opcode::Return, &[0]),
            ],
        )
    }

    #[test]
    fn instance_of_checks_supply_a_missing_type() {
        let (classes, bar) = bar_with(checked_read(12));
        let class_path = dalvik_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[1]);

        assert_eq!(analysis.deodexed_instructions()[2], with_ref(Opcode::Iget, &[0, 2], count_field()));
        assert_eq!(analysis.notes().len(), 1);
        assert_eq!(analysis.notes()[0].kind, NoteKind::InstanceOf);
    }

    #[test]
    fn art_narrows_after_instance_of() {
        let (classes, bar) = bar_with(checked_read(4));
        let class_path = art_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[1]);

        assert_eq!(analysis.deodexed_instructions()[2], with_ref(Opcode::Iget, &[0, 2], count_field()));
        assert!(analysis.notes().is_empty());
        let narrowed = analysis.instruction_at(4).and_then(|i| i.pre_type(2)).cloned().unwrap();
        assert_eq!(narrowed.class_descriptor(), Some("Lfoo/Base;"));
        let untouched = analysis.instruction_at(7).and_then(|i| i.pre_type(2)).cloned().unwrap();
        assert_eq!(untouched.class_descriptor(), Some(descriptor::OBJECT));
    }

    #[test]
    fn unknown_offsets_are_fatal_with_context() {
        let (classes, bar) = bar_with(read_count("Lfoo/Base;", 40));
        let class_path = dalvik_class_path(classes);
        let error = analyze_method(&class_path, &bar, &bar.methods[1]).unwrap_err();

        assert!(error.message().contains("offset 40"), "{}", error);
        assert_eq!(error.code_address(), Some(0));
        let contexts = error.contexts();
        assert!(contexts.iter().any(|c| c == "method: Lfoo/Bar;->read(Lfoo/Base;)I"), "{:?}", contexts);
        assert!(contexts.iter().any(|c| c.starts_with("opcode: iget-quick")), "{:?}", contexts);
        assert!(contexts.iter().any(|c| c.starts_with("> ")), "{:?}", contexts);
    }

    fn hidden_hierarchy() -> Vec<ClassDef> {
        let mut hidden = ClassDef::new("Lother/Hidden;", AccessFlags::empty(), Some(descriptor::OBJECT));
        hidden.fields = vec![field("secret", "I")];
        hidden.methods = vec![virtual_method("work", "()V")];
        let imp = class("Lother/Impl;", "Lother/Hidden;");
        let bar = class("Lfoo/Bar;", descriptor::OBJECT);
        vec![hidden, imp, bar]
    }

    #[test]
    fn inaccessible_declaring_classes_are_named_through_a_visible_subclass() {
        let mut classes = hidden_hierarchy();
        let method = static_method(
            "use",
            "(Lother/Impl;)I",
            2,
            vec![
                with_ref(Opcode::InvokeVirtualQuick, &[1], Reference::VtableIndex(3)),
                iget_quick(0, 1, 8),
                insn(Opcode::Return, &[0]),
            ],
        );
        classes[2].methods.push(method);
        let bar = classes[2].clone();
        let class_path = dalvik_class_path(classes);
        let analysis = analyze(&class_path, &bar, &bar.methods[0]);

        let deodexed = analysis.deodexed_instructions();
        let work = Reference::Method(method_ref("Lother/Impl;", "work", "()V"));
        assert_eq!(deodexed[0], with_ref(Opcode::InvokeVirtual, &[1], work));
        let secret = Reference::Field(field_ref("Lother/Impl;", "secret", "I"));
        assert_eq!(deodexed[1], with_ref(Opcode::Iget, &[0, 1], secret));
    }

    #[test]
    fn class_access_follows_visibility_and_package() {
        let classes = hidden_hierarchy();
        assert!(!can_access_class("Lfoo/Bar;", &classes[0]));
        assert!(can_access_class("Lother/Impl;", &classes[0]));
        assert!(can_access_class("Lfoo/Bar;", &classes[1]));
    }

    #[test]
    fn field_opcodes_follow_the_field_type() {
        assert_eq!(deodexed_field_opcode(Opcode::IgetQuick, "F"), Some(Opcode::Iget));
        assert_eq!(deodexed_field_opcode(Opcode::IgetQuick, "Z"), Some(Opcode::IgetBoolean));
        assert_eq!(deodexed_field_opcode(Opcode::IgetQuick, "J"), None);
        assert_eq!(deodexed_field_opcode(Opcode::IputWideQuick, "D"), Some(Opcode::IputWide));
        assert_eq!(deodexed_field_opcode(Opcode::IputObjectQuick, "[I"), Some(Opcode::IputObject));
        assert_eq!(deodexed_field_opcode(Opcode::IgetByteQuick, "C"), None);
        assert_eq!(deodexed_field_opcode(Opcode::SputWideVolatile, "J"), Some(Opcode::SputWide));
        assert_eq!(deodexed_field_opcode(Opcode::Iget, "I"), None);
    }

    #[test]
    fn deodexing_a_class_keeps_failed_methods_unchanged() {
        let mut classes = base_hierarchy();
        let mut good = read_count("Lfoo/Base;", 12);
        good.name = "good".to_string();
        let mut broken = read_count("Lfoo/Base;", 40);
        broken.name = "broken".to_string();
        let plain = static_method("plain", "()V", 0, vec![insn(Opcode::ReturnVoid, &[])]);
        classes[1].methods.extend([good, broken, plain]);
        let bar = classes[1].clone();
        let class_path = dalvik_class_path(classes);

        let result = deodex_class(&class_path, &bar);
        let stats = result.stats();
        assert_eq!((stats.methods, stats.deodexed, stats.failed), (2, 1, 1));
        assert!(matches!(&result.outcomes[0], MethodOutcome::Deodexed { method, .. } if method.name == "good"));
        assert!(result.outcomes[1].is_failure());
        let failed: Vec<&str> = result.failures().map(|(m, _)| m.name.as_str()).collect();
        assert_eq!(failed, vec!["broken"]);

        let opcode_of = |name: &str| {
            let method = result.class_def.methods.iter().find(|m| m.name == name).unwrap();
            method.code.as_ref().unwrap().instructions[0].opcode
        };
        assert_eq!(opcode_of("good"), Opcode::Iget);
        assert_eq!(opcode_of("broken"), Opcode::IgetQuick);
        assert_eq!(opcode_of("plain"), Opcode::ReturnVoid);
    }

    #[test]
    fn deodexing_is_deterministic() {
        let (classes, bar) = bar_with(checked_read(12));
        let first = analyze(&dalvik_class_path(classes.clone()), &bar, &bar.methods[1]);
        let second = analyze(&dalvik_class_path(classes), &bar, &bar.methods[1]);
        assert_eq!(first.deodexed_instructions(), second.deodexed_instructions());
        assert_eq!(first.notes(), second.notes());
    }
}
