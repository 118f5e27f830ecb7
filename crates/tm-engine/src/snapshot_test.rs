use std::collections::HashMap;

use tm_core::key::KeyGenerator;

use super::compute_delta;

fn key(value: &str) -> tm_core::key::SurrogateKey {
    let generator = KeyGenerator::new("hosts", &["host_id".to_string()]).unwrap();
    generator
        .key_for_values(&[tm_core::Value::Text(value.to_string())])
        .unwrap()
}

#[test]
fn test_unseen_key_opens() {
    let open = HashMap::new();
    let extracted = vec![(key("host_42"), "H1".to_string())];

    let delta = compute_delta(&open, &extracted, false);
    assert_eq!(delta.opens, vec![0]);
    assert!(delta.closes.is_empty());
}

#[test]
fn test_unchanged_hash_is_a_no_op() {
    let k = key("host_42");
    let open = HashMap::from([(k.to_string(), "H1".to_string())]);
    let extracted = vec![(k, "H1".to_string())];

    let delta = compute_delta(&open, &extracted, false);
    assert!(delta.opens.is_empty());
    assert!(delta.closes.is_empty());
}

#[test]
fn test_changed_hash_closes_and_reopens() {
    let k = key("host_42");
    let open = HashMap::from([(k.to_string(), "H1".to_string())]);
    let extracted = vec![(k.clone(), "H2".to_string())];

    let delta = compute_delta(&open, &extracted, false);
    assert_eq!(delta.opens, vec![0]);
    assert_eq!(delta.closes, vec![k.to_string()]);
}

#[test]
fn test_absent_key_left_open_by_default() {
    let open = HashMap::from([(key("host_1").to_string(), "H1".to_string())]);
    let extracted = vec![(key("host_2"), "H9".to_string())];

    let delta = compute_delta(&open, &extracted, false);
    assert_eq!(delta.opens, vec![0]);
    assert!(delta.closes.is_empty());
}

#[test]
fn test_close_deleted_closes_absent_keys() {
    let gone = key("host_1");
    let open = HashMap::from([(gone.to_string(), "H1".to_string())]);
    let extracted = vec![(key("host_2"), "H9".to_string())];

    let delta = compute_delta(&open, &extracted, true);
    assert_eq!(delta.opens, vec![0]);
    assert_eq!(delta.closes, vec![gone.to_string()]);
}

#[test]
fn test_repeated_key_in_extract_counts_once() {
    let open = HashMap::new();
    let extracted = vec![
        (key("host_42"), "H1".to_string()),
        (key("host_42"), "H2".to_string()),
    ];

    let delta = compute_delta(&open, &extracted, false);
    assert_eq!(delta.opens, vec![0]);
    assert!(delta.closes.is_empty());
}
