#[cfg(test)]
mod tests {
    use crate::analysis::quickening::{unquicken, QuickeningInfo, NO_INDEX};
    use crate::dex::instruction::{Instruction, ReferencePools, Reference};
    use crate::dex::opcodes::Opcode;
    use crate::tests::fixtures::*;

    fn pools() -> ReferencePools {
        ReferencePools {
            types: vec!["Lfoo/Base;".to_string(), "Lfoo/Bar;".to_string()],
            fields: vec![field_ref("Lfoo/Base;", "count", "I"), field_ref("Lfoo/Base;", "name", "Ljava/lang/String;")],
            methods: vec![method_ref("Lfoo/Base;", "run", "()V")],
            ..Default::default()
        }
    }

    fn count_field() -> Reference {
        Reference::Field(field_ref("Lfoo/Base;", "count", "I"))
    }

    fn run_method() -> Reference {
        Reference::Method(method_ref("Lfoo/Base;", "run", "()V"))
    }

    fn nop() -> Instruction {
        insn(Opcode::Nop, &[])
    }

    /// Quickens symbolic code the way the compiler does and records the
    /// indices it drops, in instruction order.
    fn quicken(code: &[Instruction], pools: &ReferencePools) -> (Vec<Instruction>, Vec<u16>) {
        let mut quick = Vec::new();
        let mut indices = Vec::new();
        for insn in code {
            match (&insn.opcode, &insn.reference) {
                (Opcode::Iget, Some(Reference::Field(f))) | (Opcode::IputObject, Some(Reference::Field(f))) => {
                    let position = pools.fields.iter().position(|p| p == f).expect("field in pool");
                    indices.push(position as u16);
                    let opcode = if insn.opcode == Opcode::Iget { Opcode::IgetQuick } else { Opcode::IputObjectQuick };
                    quick.push(insn.with_opcode(opcode).with_reference(Reference::FieldOffset(8)));
                }
                (Opcode::InvokeVirtual, Some(Reference::Method(m))) => {
                    let position = pools.methods.iter().position(|p| p == m).expect("method in pool");
                    indices.push(position as u16);
                    quick.push(insn.with_opcode(Opcode::InvokeVirtualQuick).with_reference(Reference::VtableIndex(3)));
                }
                (Opcode::CheckCast, Some(Reference::Type(t))) => {
                    let position = pools.types.iter().position(|p| p == t).expect("type in pool");
                    indices.push(insn.registers[0]);
                    indices.push(position as u16);
                    quick.push(nop());
                    quick.push(nop());
                }
                (Opcode::ReturnVoid, _) => quick.push(insn.with_opcode(Opcode::ReturnVoidNoBarrier)),
                _ => quick.push(insn.clone()),
            }
        }
        (quick, indices)
    }

    #[test]
    fn indices_restore_fields_methods_and_casts() {
        let quickened = vec![
            with_ref(Opcode::IgetQuick, &[0, 1], Reference::FieldOffset(4)),
            nop(),
            nop(),
            with_ref(Opcode::InvokeVirtualQuick, &[1], Reference::VtableIndex(3)),
            insn(Opcode::ReturnVoidNoBarrier, &[]),
        ];
        let info = QuickeningInfo::from_indices(&[0, 0, 1, 0, 0, 0, 0, 0]).unwrap();
        let restored = unquicken(&quickened, info, &pools()).unwrap();
        assert_eq!(
            restored,
            vec![
                with_ref(Opcode::Iget, &[0, 1], count_field()),
                type_insn(Opcode::CheckCast, &[1], "Lfoo/Base;"),
                with_ref(Opcode::InvokeVirtual, &[1], run_method()),
                insn(Opcode::ReturnVoid, &[]),
            ]
        );
    }

    #[test]
    fn recompiled_code_unquickens_to_the_original() {
        let pools = pools();
        let original = vec![
            type_insn(Opcode::CheckCast, &[2], "Lfoo/Bar;"),
            with_ref(Opcode::Iget, &[0, 2], count_field()),
            with_ref(Opcode::IputObject, &[1, 2], Reference::Field(field_ref("Lfoo/Base;", "name", "Ljava/lang/String;"))),
            with_ref(Opcode::InvokeVirtual, &[2], run_method()),
            literal(Opcode::Const4, &[0], 1),
            insn(Opcode::ReturnVoid, &[]),
        ];
        let (quick, indices) = quicken(&original, &pools);
        assert_eq!(quick.iter().map(|i| i.code_units()).sum::<usize>(), original.iter().map(|i| i.code_units()).sum::<usize>());
        let restored = unquicken(&quick, QuickeningInfo::from_index_list(&indices), &pools).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn address_tables_skip_uncovered_instructions() {
        let quickened = vec![
            with_ref(Opcode::IgetQuick, &[0, 1], Reference::FieldOffset(4)),
            nop(),
            with_ref(Opcode::InvokeVirtualQuick, &[1], Reference::VtableIndex(3)),
            insn(Opcode::ReturnVoid, &[]),
        ];
        let info = QuickeningInfo::from_pairs(&[(3, 0)]);
        let restored = unquicken(&quickened, info, &pools()).unwrap();
        assert_eq!(restored[0], quickened[0]);
        assert_eq!(restored[1], nop());
        assert_eq!(restored[2], with_ref(Opcode::InvokeVirtual, &[1], run_method()));
    }

    #[test]
    fn plain_nops_are_marked_with_no_index() {
        let quickened = vec![nop(), with_ref(Opcode::IgetQuick, &[0, 1], Reference::FieldOffset(4)), insn(Opcode::ReturnVoid, &[])];
        let info = QuickeningInfo::from_index_list(&[NO_INDEX as u16, 0]);
        let restored = unquicken(&quickened, info, &pools()).unwrap();
        assert_eq!(restored[0], nop());
        assert_eq!(restored[1], with_ref(Opcode::Iget, &[0, 1], count_field()));
    }

    #[test]
    fn leftover_indices_are_an_error() {
        let code = vec![insn(Opcode::ReturnVoid, &[])];
        let error = unquicken(&code, QuickeningInfo::from_index_list(&[5]), &pools()).unwrap_err();
        assert!(error.message().contains("Failed to use all values in quickening info, 1 left"), "{}", error);
    }

    #[test]
    fn missing_indices_are_an_error() {
        let code = vec![with_ref(Opcode::IgetQuick, &[0, 1], Reference::FieldOffset(4)), insn(Opcode::ReturnVoid, &[])];
        let error = unquicken(&code, QuickeningInfo::default(), &pools()).unwrap_err();
        assert!(error.message().contains("Not enough quickening info"), "{}", error);
    }

    #[test]
    fn out_of_range_indices_are_reported() {
        let code = vec![with_ref(Opcode::IgetQuick, &[0, 1], Reference::FieldOffset(4))];
        assert!(unquicken(&code, QuickeningInfo::from_index_list(&[9]), &pools()).is_err());
    }

    #[test]
    fn tables_parse_from_bytes() {
        let pairs = QuickeningInfo::from_pairs(&[(0, 1), (200, 300)]);
        assert_eq!(QuickeningInfo::from_pc_index_pairs(&pairs.to_pc_index_pairs()).unwrap(), pairs);

        let indices = QuickeningInfo::from_indices(&[1, 0, 0xff, 0xff]).unwrap();
        assert_eq!(indices, QuickeningInfo::from_index_list(&[1, 0xffff]));
        assert_eq!(indices.to_indices().unwrap(), vec![1, 0, 0xff, 0xff]);

        assert!(QuickeningInfo::from_indices(&[1, 2, 3]).is_err());
        assert!(QuickeningInfo::from_pc_index_pairs(&[0x80]).is_err());
        assert!(QuickeningInfo::from_pairs(&[(0, 70000)]).to_indices().is_err());
    }
}
