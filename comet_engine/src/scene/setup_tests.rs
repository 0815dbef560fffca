//! Unit tests for CLI scene-argument parsing.

use super::*;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn empty_arguments_mean_empty_scene() {
    let parsed = parse_scene_args(&[]);
    assert_eq!(parsed.mode, None);
    assert!(parsed.gltf_paths.is_empty());
}

#[test]
fn stress_test_keyword_is_recognized() {
    let parsed = parse_scene_args(&args(&["RenderingStressTest"]));
    assert_eq!(parsed.mode, Some(SceneMode::RenderingStressTest));
    assert!(parsed.gltf_paths.is_empty());
}

#[test]
fn keyword_plus_paths() {
    let parsed = parse_scene_args(&args(&[
        "InstancingStressTest",
        "scenes/city.gltf",
        "scenes/park.gltf",
    ]));
    assert_eq!(parsed.mode, Some(SceneMode::InstancingStressTest));
    assert_eq!(parsed.gltf_paths.len(), 2);
    assert_eq!(parsed.gltf_paths[0], PathBuf::from("scenes/city.gltf"));
}

#[test]
fn onpc_keyword_is_recognized() {
    let parsed = parse_scene_args(&args(&["OnpcReflectionTest"]));
    assert_eq!(parsed.mode, Some(SceneMode::OnpcReflectionTest));
}

#[test]
fn without_a_keyword_every_argument_is_a_path() {
    let parsed = parse_scene_args(&args(&["a.gltf", "b.gltf"]));
    assert_eq!(parsed.mode, None);
    assert_eq!(parsed.gltf_paths.len(), 2);
}

#[test]
fn keywords_are_case_sensitive() {
    let parsed = parse_scene_args(&args(&["renderingstresstest"]));
    assert_eq!(parsed.mode, None);
    assert_eq!(parsed.gltf_paths.len(), 1);
}

fn stress_fixture_tables() -> GeometryTables {
    let mut tables = GeometryTables::new();
    for name in ["bunny", "dragon", "kitten", "human"] {
        let mesh = tables.add_mesh(name).unwrap();
        tables.surfaces.push(Default::default());
        tables.surface_transparency.push(false);
        tables.count_surface(mesh);
    }
    tables
}

/// The full stress population: 2.5 M bunnies + 1.5 M kittens + 10 k
/// dragons + 90 k humans. Heavy, so opt-in.
#[test]
#[ignore]
fn stress_test_population_matches_the_expected_total() {
    let tables = stress_fixture_tables();
    let mut renders = RenderContainer::new();
    load_geometry_stress_test(&mut renders, &tables, 3_000.0).unwrap();
    assert_eq!(renders.render_object_count(), 4_100_000);
    assert_eq!(renders.opaque.len(), 4_100_000);
    assert!(renders.transparent.is_empty());
}

#[test]
fn onpc_scene_populates_the_oblique_set() {
    let tables = stress_fixture_tables();
    let mut renders = RenderContainer::new();
    create_onpc_reflection_test(&mut renders, &tables).unwrap();
    assert_eq!(renders.onpc.len(), 1);
    assert_eq!(renders.opaque.len(), 1_000);
}
