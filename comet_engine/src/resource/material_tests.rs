//! Unit tests for the material table.

use super::*;

#[test]
fn table_starts_with_the_default_material() {
    let table = MaterialTable::new();
    assert_eq!(table.len(), 1);
    let default = table.get(0).unwrap();
    assert_eq!(default.albedo_tag, 0);
    assert_eq!(default.material_id, 0);
    assert_eq!(table.id_by_name("default"), Some(0));
}

#[test]
fn add_assigns_sequential_ids() {
    let mut table = MaterialTable::new();
    let a = table.add(1, 2, 3, 4, Some("stone")).unwrap();
    let b = table.add(5, 0, 0, 0, None).unwrap();
    assert_eq!(a, 1);
    assert_eq!(b, 2);
    assert_eq!(table.get(a).unwrap().normal_tag, 2);
    assert_eq!(table.id_by_name("stone"), Some(1));
}

#[test]
fn name_collision_overwrites_with_the_new_id() {
    let mut table = MaterialTable::new();
    table.add(1, 0, 0, 0, Some("wood")).unwrap();
    let second = table.add(2, 0, 0, 0, Some("wood")).unwrap();
    assert_eq!(table.id_by_name("wood"), Some(second));
}

#[test]
fn capacity_is_enforced() {
    let mut table = MaterialTable::new();
    for _ in 1..crate::limits::MAX_MATERIAL_COUNT {
        table.add(0, 0, 0, 0, None).unwrap();
    }
    let result = table.add(0, 0, 0, 0, None);
    assert!(matches!(
        result,
        Err(EngineError::CapacityExhausted { what: "materials", .. })
    ));
    // No silent truncation
    assert_eq!(table.len(), crate::limits::MAX_MATERIAL_COUNT);
}

#[test]
fn rebase_shifts_only_real_tags() {
    let mut table = MaterialTable::new();
    table.add(3, 0, 5, 0, None).unwrap();
    table.rebase_texture_tags(100);

    let material = *table.get(1).unwrap();
    assert_eq!(material.albedo_tag, 103);
    assert_eq!(material.normal_tag, 0, "tag 0 stays the default texture");
    assert_eq!(material.specular_tag, 105);

    // The default material is untouched
    let default = table.get(0).unwrap();
    assert_eq!(default.albedo_tag, 0);
}
