//! Key info derivation.

mod common;

use common::run;

const SINGLE_ROW: &str = r#"  limit:
    offset: 3
    count: 1
    input: { scan: { table: t } }
"#;

#[test]
fn test_scan_keys_from_catalog() {
    let out = run("  scan: { table: t }\n", &["build_keys"]);
    let keys = out.plan.key_info.as_ref().expect("key info built");
    let ids = out.plan.schema.ids();
    // primary key a, then the unique indexes b and (c, d)
    assert_eq!(keys.keys, vec![vec![ids[0]]]);
    assert_eq!(keys.unique_keys, vec![vec![ids[1]], vec![ids[2], ids[3]]]);
}

#[test]
fn test_single_row_limit_makes_every_column_a_key() {
    let out = run(SINGLE_ROW, &["build_keys"]);
    let keys = out.plan.key_info.as_ref().expect("key info built");
    for col in &out.plan.schema.columns {
        if col.nullable {
            assert!(keys.unique_keys.contains(&vec![col.id]), "{} should be unique", col);
        } else {
            assert!(keys.keys.contains(&vec![col.id]), "{} should be a key", col);
        }
    }
}

#[test]
fn test_multi_row_limit_passes_child_keys_through() {
    let out = run("  limit: { count: 5, input: { scan: { table: t } } }\n", &["build_keys"]);
    let keys = out.plan.key_info.as_ref().expect("key info built");
    let child = out.plan.children[0].key_info.as_ref().expect("child key info");
    assert_eq!(keys, child);
    let f = out.plan.schema.columns[5].id;
    assert!(!keys.keys.contains(&vec![f]));
}
