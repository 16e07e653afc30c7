#[cfg(test)]
mod tests {
    use crate::virtual_machine::isa::{OpGroup, Opcode, OperandKind};
    use std::collections::HashSet;

    const MAX_OPERANDS: usize = 3;

    macro_rules! collect_isa {
        (
            $( $(#[$doc:meta])* $name:ident = $mnemonic:literal => [ $( $field:ident : $kind:ident ),* $(,)? ], $group:ident ),* $(,)?
        ) => {{
            vec![
                $(
                    (
                        stringify!($name),
                        $mnemonic,
                        vec![ $( stringify!($field) ),* ],
                        crate::virtual_machine::isa::Opcode::$name,
                    ),
                )*
            ]
        }};
    }

    fn table() -> Vec<(&'static str, &'static str, Vec<&'static str>, Opcode)> {
        crate::for_each_instruction!(collect_isa)
    }

    #[test]
    fn mnemonics_are_unique_and_upper_case() {
        let mut seen = HashSet::new();
        for (name, mnemonic, _, _) in table() {
            assert!(seen.insert(mnemonic), "duplicate mnemonic {mnemonic}");
            assert_eq!(mnemonic, mnemonic.to_ascii_uppercase(), "{name}");
            assert!(mnemonic.len() <= 6, "{mnemonic} is longer than six letters");
        }
    }

    #[test]
    fn table_order_matches_opcode_list() {
        let opcodes: Vec<Opcode> = table().into_iter().map(|(.., op)| op).collect();
        assert_eq!(opcodes, Opcode::ALL);
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(*op));
        }
    }

    #[test]
    fn operand_shapes_are_small_and_named_uniquely() {
        for (name, _, fields, op) in table() {
            assert!(fields.len() <= MAX_OPERANDS, "{name}");
            assert_eq!(fields.len(), op.operand_kinds().len(), "{name}");
            let unique: HashSet<_> = fields.iter().collect();
            assert_eq!(unique.len(), fields.len(), "{name} repeats a field");
        }
    }

    #[test]
    fn only_meta_opcodes_take_labels_or_text() {
        for op in Opcode::ALL {
            let kinds = op.operand_kinds();
            if kinds.contains(&OperandKind::Label) || kinds.contains(&OperandKind::Text) {
                assert_eq!(op.group(), OpGroup::Meta, "{}", op.mnemonic());
            }
        }
    }
}
