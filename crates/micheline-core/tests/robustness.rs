//! Property tests: decoders never panic and generated trees round-trip

use micheline_core::{DecodeOptions, Prim, OPCODES};
use proptest::prelude::*;

fn arb_prim() -> impl Strategy<Value = Prim> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Prim::int),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Prim::string),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Prim::bytes),
    ];
    leaf.prop_recursive(4, 48, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Prim::seq),
            (
                0..OPCODES.len(),
                prop::collection::vec(inner, 0..4),
                prop::collection::vec("[%@:][a-z_]{1,6}", 0..3),
            )
                .prop_map(|(i, args, annots)| {
                    annots
                        .into_iter()
                        .fold(Prim::app(OPCODES[i], args), Prim::with_annot)
                }),
        ]
    })
}

proptest! {
    #[test]
    fn binary_decoder_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = Prim::from_binary(&data);
        let _ = Prim::decode_prefix(&data);
        let _ = Prim::from_binary_with(&data, DecodeOptions::with_max_depth(8));
        let _ = Prim::bytes(data).unpack();
    }

    #[test]
    fn tagged_garbage_never_panics(data in prop::collection::vec(0u8..0x0c, 0..64)) {
        let _ = Prim::from_binary(&data);
    }

    #[test]
    fn json_decoder_never_panics(text in "\\PC{0,64}") {
        let _ = Prim::from_json(text.as_bytes());
    }

    #[test]
    fn binary_roundtrip(p in arb_prim()) {
        let enc = p.to_binary().unwrap();
        let back = Prim::from_binary(&enc).unwrap();
        prop_assert!(back.is_equal_with_anno(&p), "{} != {}", back.dump(), p.dump());
        prop_assert_eq!(back.to_binary().unwrap(), enc);
    }

    #[test]
    fn json_roundtrip(p in arb_prim()) {
        let text = p.to_json().unwrap();
        let back = Prim::from_json(text.as_bytes()).unwrap();
        prop_assert_eq!(back.dump(), p.dump());
        prop_assert!(back.is_equal_with_anno(&p));
    }

    #[test]
    fn pack_unpack(p in arb_prim()) {
        let packed = Prim::bytes(p.pack().unwrap());
        prop_assert!(packed.is_packed());
        let up = packed.unpack().unwrap();
        prop_assert!(up.was_packed);
        prop_assert!(up.is_equal_with_anno(&p));
    }
}
