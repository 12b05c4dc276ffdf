#[cfg(test)]
mod tests {
    use crate::dex::instruction::{decode_instructions, Instruction, PlaceholderResolver, Reference, ReferencePools};
    use crate::dex::opcodes::{Opcode, Opcodes};
    use crate::tests::fixtures::*;

    fn decode(units: &[u16], opcodes: &Opcodes) -> Vec<Instruction> {
        match decode_instructions(units, opcodes, &PlaceholderResolver) {
            Ok(insns) => insns,
            Err(e) => panic!("decoding failed: {}", e),
        }
    }

    #[test]
    fn dalvik_odex_operands_decode_to_raw_indices() {
        let opcodes = Opcodes::for_api(DALVIK_API);
        let units = [0x10f2, 12, 0x10f8, 3, 0x0001, 0x10ee, 6, 0x0001, 0x000f];
        assert_eq!(
            decode(&units, &opcodes),
            vec![
                with_ref(Opcode::IgetQuick, &[0, 1], Reference::FieldOffset(12)),
                with_ref(Opcode::InvokeVirtualQuick, &[1], Reference::VtableIndex(3)),
                with_ref(Opcode::ExecuteInline, &[1], Reference::InlineIndex(6)),
                insn(Opcode::Return, &[0]),
            ]
        );
    }

    #[test]
    fn quick_opcodes_move_between_runtimes() {
        let dalvik = Opcodes::for_api(DALVIK_API);
        let art = Opcodes::new(ART_API, ART_VERSION);
        assert!(!dalvik.is_art());
        assert!(art.is_art());

        assert_eq!(dalvik.opcode_for_value(0xf2), Some(Opcode::IgetQuick));
        assert_eq!(art.opcode_for_value(0xe3), Some(Opcode::IgetQuick));
        assert_eq!(dalvik.opcode_for_value(0xf1), Some(Opcode::ReturnVoidBarrier));
        assert_eq!(art.opcode_for_value(0x73), Some(Opcode::ReturnVoidNoBarrier));
        assert_eq!(art.value_for(Opcode::InvokeVirtualQuick), Some(0xe9));
    }

    #[test]
    fn api_levels_map_to_art_versions() {
        assert_eq!(Opcodes::for_api(27).art_version, 131);
        assert_eq!(Opcodes::for_api(21).art_version, 39);
        assert!(!Opcodes::for_api(19).is_art());
    }

    #[test]
    fn pool_references_are_resolved() {
        let pools = ReferencePools {
            strings: vec!["hello".to_string()],
            fields: vec![field_ref("Lfoo/Base;", "count", "I")],
            ..Default::default()
        };
        let opcodes = Opcodes::for_api(DALVIK_API);
        // const-string v0, "hello"; iget v1, v2, Lfoo/Base;->count:I; return-void
        let units = [0x001a, 0, 0x2152, 0, 0x000e];
        let insns = decode_instructions(&units, &opcodes, &pools).unwrap();
        assert_eq!(insns[0], with_ref(Opcode::ConstString, &[0], Reference::String("hello".to_string())));
        assert_eq!(
            insns[1],
            with_ref(Opcode::Iget, &[1, 2], Reference::Field(field_ref("Lfoo/Base;", "count", "I")))
        );
        assert_eq!(insns[2], insn(Opcode::ReturnVoid, &[]));
        assert!(decode_instructions(&[0x001a, 4], &opcodes, &pools).is_err());
    }

    #[test]
    fn branches_keep_relative_targets() {
        let opcodes = Opcodes::for_api(DALVIK_API);
        // if-eqz v3, +3; const/4 v0, -1; return v0
        let units = [0x0338, 3, 0xf012, 0x000f];
        assert_eq!(
            decode(&units, &opcodes),
            vec![branch(Opcode::IfEqz, &[3], 3), literal(Opcode::Const4, &[0], -1), insn(Opcode::Return, &[0])]
        );
    }

    #[test]
    fn unknown_and_truncated_instructions_fail() {
        let opcodes = Opcodes::for_api(DALVIK_API);
        assert!(decode_instructions(&[0x003e], &opcodes, &PlaceholderResolver).is_err());
        assert!(decode_instructions(&[0x10f2], &opcodes, &PlaceholderResolver).is_err());
    }

    #[test]
    fn odex_only_opcodes_are_flagged() {
        for opcode in [Opcode::IgetQuick, Opcode::InvokeVirtualQuick, Opcode::ExecuteInline, Opcode::ReturnVoidBarrier] {
            assert!(opcode.odex_only(), "{} should be odex only", opcode);
        }
        for opcode in [Opcode::Iget, Opcode::InvokeVirtual, Opcode::ReturnVoid] {
            assert!(!opcode.odex_only(), "{} should not be odex only", opcode);
        }
        assert_eq!(Opcode::from_name("iget-quick"), Some(Opcode::IgetQuick));
        assert_eq!(Opcode::IgetQuick.name(), "iget-quick");
    }
}
