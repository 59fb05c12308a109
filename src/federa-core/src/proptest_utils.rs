//! Property-based tests for federa-core.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::conf::ConfigNode;
    use crate::key::{decode_key, encode_key};
    use crate::query::Pattern;

    // =========================================================================
    // Strategies
    // =========================================================================

    /// Key value lists whose values are likely to contain separators.
    fn arb_key_values() -> impl Strategy<Value = Vec<Option<String>>> {
        prop::collection::vec(prop::option::of("[#%r0a-z ]{0,12}"), 1..6)
    }

    fn arb_conf_tree() -> impl Strategy<Value = ConfigNode> {
        let leaf = ".{0,10}".prop_map(ConfigNode::new);
        leaf.prop_recursive(3, 24, 4, |inner| {
            ("[A-Za-z_][A-Za-z0-9_]{0,6}", prop::collection::vec(inner, 1..4))
                .prop_map(|(name, children)| ConfigNode::with_children(name, children))
        })
    }

    // =========================================================================
    // Key encoding
    // =========================================================================

    proptest! {
        #[test]
        fn prop_key_roundtrip(values in arb_key_values()) {
            let key = encode_key(values.iter().map(Option::as_deref));
            prop_assert_eq!(decode_key(&key).unwrap(), values);
        }

        #[test]
        fn prop_key_is_injective(a in arb_key_values(), b in arb_key_values()) {
            let ka = encode_key(a.iter().map(Option::as_deref));
            let kb = encode_key(b.iter().map(Option::as_deref));
            prop_assert_eq!(ka == kb, a == b);
        }

        #[test]
        fn prop_decode_then_encode_is_identity(values in arb_key_values()) {
            let key = encode_key(values.iter().map(Option::as_deref));
            let decoded = decode_key(&key).unwrap();
            prop_assert_eq!(encode_key(decoded.iter().map(Option::as_deref)), key);
        }
    }

    // =========================================================================
    // Pattern semantics
    // =========================================================================

    proptest! {
        #[test]
        fn prop_prefix_pattern(lit in "[a-zA-Z]{1,6}", tail in "[a-zA-Z]{0,6}") {
            let value = format!("{lit}{tail}");
            let pattern = Pattern::parse(&format!("{}*", lit.to_uppercase()));
            prop_assert!(pattern.matches(Some(&value)));
        }

        #[test]
        fn prop_suffix_and_contains(head in "[a-z]{0,5}", lit in "[a-z]{1,5}", tail in "[a-z]{0,5}") {
            let value = format!("{head}{lit}{tail}");
            let contains = format!("*{lit}*");
            prop_assert!(Pattern::parse(&contains).matches(Some(&value)));
            let suffixed = format!("{head}{lit}");
            let suffix = format!("*{lit}");
            prop_assert!(Pattern::parse(&suffix).matches(Some(&suffixed)));
        }

        #[test]
        fn prop_exact_is_case_insensitive_equality(a in "[a-zA-Z]{0,6}", b in "[a-zA-Z]{0,6}") {
            let m = Pattern::parse(&a).matches(Some(&b));
            prop_assert_eq!(m, a.to_lowercase() == b.to_lowercase());
        }
    }

    // =========================================================================
    // Configuration format
    // =========================================================================

    proptest! {
        #[test]
        fn prop_conf_serialization_reparses(children in prop::collection::vec(arb_conf_tree(), 0..4)) {
            let root = ConfigNode::with_children("root", children);
            let text = root.to_conf_string();
            let reparsed = ConfigNode::parse("root", &text).unwrap();
            prop_assert_eq!(reparsed, root);
        }
    }
}
