//! # Cfg Key Canonicalization Properties
//!
//! Query parsing is order-insensitive and alias-insensitive, and a cfg key
//! decodes back to the config it was derived from.

use imgsvc_core::TransformConfig;
use proptest::prelude::*;

fn format_name() -> impl Strategy<Value = (&'static str, &'static str)> {
    prop_oneof![
        Just(("png", "PNG")),
        Just(("jpeg", "jpg")),
        Just(("webp", "WebP")),
        Just(("gif", "GIF")),
    ]
}

proptest! {
    #[test]
    fn aliases_and_order_do_not_change_the_key(
        w in 1u32..4096,
        h in 1u32..4096,
        (fmt, alias) in format_name(),
    ) {
        let plain = TransformConfig::from_query(&format!("w={w}&h={h}&fmt={fmt}")).unwrap();
        let aliased =
            TransformConfig::from_query(&format!("format={alias}&height={h}&width={w}")).unwrap();
        prop_assert_eq!(plain.cfg_key(), aliased.cfg_key());
    }

    #[test]
    fn cfg_key_decodes_to_the_same_config(
        w in 1u32..4096,
        h in 1u32..4096,
        (fmt, _) in format_name(),
    ) {
        let config = TransformConfig::from_query(&format!("w={w}&h={h}&fmt={fmt}")).unwrap();
        let decoded = TransformConfig::from_cfg_key(config.cfg_key().as_str()).unwrap();
        prop_assert_eq!(decoded, config);
    }
}
