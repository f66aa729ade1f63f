use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::sync::broadcast;

use infowall::options::FieldPaths;
use infowall::prelude::*;
use infowall::{PointerRelease, Redraw, Semantics, SyncError, Translations};

const DELAY: Duration = Duration::from_millis(100);

fn tree(params: Value) -> FieldTree {
    let mut tree = FieldTree::from_params(Semantics::info_wall(), &params);
    tree.attach_metadata_forms();
    tree
}

fn abc_tree() -> FieldTree {
    tree(json!({
        "propertiesGroup": {"properties": [{"label": "A"}, {"label": "B"}, {"label": "C"}]},
        "panels": [
            {"entries": ["e0", "e1", "e2"]},
            {"entries": ["f0"]}
        ]
    }))
}

fn attach(tree: &mut FieldTree, options: SyncOptions, now: Instant) -> Synchronizer {
    let root = tree.root();
    let mut sync = Synchronizer::builder(options)
        .attach(tree, root, now)
        .unwrap();
    sync.pump(tree, now).unwrap();
    sync
}

fn panels(tree: &FieldTree) -> Vec<FieldId> {
    let list = locate(tree, "panels", tree.root()).unwrap();
    tree.items(list).unwrap().to_vec()
}

fn properties(tree: &FieldTree) -> FieldId {
    locate(tree, "propertiesGroup/properties", tree.root()).unwrap()
}

fn entries(tree: &FieldTree, panel: FieldId) -> FieldId {
    locate(tree, "entries", panel).unwrap()
}

fn entry_values(tree: &FieldTree, panel: FieldId) -> Vec<String> {
    tree.items(entries(tree, panel))
        .unwrap()
        .iter()
        .map(|&entry| tree.text(entry).unwrap_or_default())
        .collect()
}

fn entry_labels(tree: &FieldTree, panel: FieldId) -> Vec<String> {
    tree.items(entries(tree, panel))
        .unwrap()
        .iter()
        .map(|&entry| tree.caption(entry).unwrap_or_default().to_string())
        .collect()
}

fn property_count(tree: &FieldTree) -> usize {
    tree.items(properties(tree)).unwrap().len()
}

fn title(tree: &FieldTree, panel: FieldId) -> String {
    let field = locate(tree, "panelTitle", panel).unwrap();
    tree.text(field).unwrap_or_default()
}

fn add_property(tree: &mut FieldTree, label: &str) -> FieldId {
    let list = properties(tree);
    let property = tree.add_item(list).unwrap();
    let field = locate(&*tree, "label", property).unwrap();
    tree.edit_text(field, label).unwrap();
    property
}

#[test]
fn attach_brings_every_panel_to_the_property_count() {
    let mut tree = tree(json!({
        "propertiesGroup": {"properties": [{"label": "A"}, {"label": "B"}]},
        "panels": [
            {"entries": ["only"]},
            {"entries": ["a", "b", "c", "d"]},
            {}
        ]
    }));
    attach(&mut tree, SyncOptions::default(), Instant::now());

    for panel in panels(&tree) {
        assert_eq!(tree.items(entries(&tree, panel)).unwrap().len(), 2);
        assert_eq!(entry_labels(&tree, panel), ["A", "B"]);
    }
    assert_eq!(entry_values(&tree, panels(&tree)[1]), ["a", "b"]);
}

#[test]
fn entry_count_follows_every_edit() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let mut sync = attach(&mut tree, SyncOptions::default(), now);

    let check = |tree: &FieldTree| {
        let expected = property_count(tree);
        for panel in panels(tree) {
            assert_eq!(tree.items(entries(tree, panel)).unwrap().len(), expected);
        }
    };

    add_property(&mut tree, "D");
    sync.pump(&mut tree, now).unwrap();
    check(&tree);

    let list = properties(&tree);
    tree.remove_item(list, 0).unwrap();
    sync.pump(&mut tree, now).unwrap();
    check(&tree);

    let panel_list = sync.panels();
    tree.add_item(panel_list).unwrap();
    tree.attach_metadata_forms();
    sync.pump(&mut tree, now).unwrap();
    check(&tree);
    assert_eq!(panels(&tree).len(), 3);

    tree.remove_item(panel_list, 0).unwrap();
    add_property(&mut tree, "E");
    sync.pump(&mut tree, now).unwrap();
    check(&tree);

    for panel in panels(&tree) {
        assert_eq!(entry_labels(&tree, panel), ["B", "C", "D", "E"]);
    }
}

#[test]
fn removing_a_property_removes_the_entry_at_its_index() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let panel = panels(&tree)[0];

    let list = properties(&tree);
    tree.remove_item(list, 1).unwrap();
    sync.pump(&mut tree, now).unwrap();

    assert_eq!(entry_values(&tree, panel), ["e0", "e2"]);
    assert_eq!(entry_labels(&tree, panel), ["A", "C"]);
}

#[test]
fn dragged_property_moves_its_entries_after_the_delay() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let (first, second) = (panels(&tree)[0], panels(&tree)[1]);
    tree.take_redraws();

    let list = properties(&tree);
    tree.move_item(list, 0, 2).unwrap();
    sync.pointer_released(now);

    sync.tick(&mut tree, now + DELAY - Duration::from_millis(1)).unwrap();
    assert_eq!(entry_values(&tree, first), ["e0", "e1", "e2"]);
    assert!(sync.reorder_pending());

    sync.tick(&mut tree, now + DELAY).unwrap();
    assert!(!sync.reorder_pending());
    assert_eq!(entry_values(&tree, first), ["e1", "e2", "e0"]);
    assert_eq!(entry_values(&tree, second), ["", "", "f0"]);
    for panel in [first, second] {
        assert_eq!(entry_labels(&tree, panel), ["B", "C", "A"]);
    }
    assert_eq!(title(&tree, first), "e1");

    let redraws = tree.take_redraws();
    assert!(redraws.contains(&(entries(&tree, first), Redraw::Order)));
    assert!(redraws.contains(&(entries(&tree, second), Redraw::Labels)));
}

#[test]
fn later_release_pushes_the_reorder_back() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let panel = panels(&tree)[0];

    let list = properties(&tree);
    tree.move_item(list, 2, 0).unwrap();
    sync.pointer_released(now);
    sync.pointer_released(now + Duration::from_millis(80));

    sync.tick(&mut tree, now + DELAY).unwrap();
    assert_eq!(entry_values(&tree, panel), ["e0", "e1", "e2"]);

    sync.tick(&mut tree, now + Duration::from_millis(180)).unwrap();
    assert_eq!(entry_values(&tree, panel), ["e2", "e0", "e1"]);
}

#[test]
fn pointer_signal_arms_the_reorder() {
    let now = Instant::now();
    let (release, receiver) = broadcast::channel(4);
    let mut tree = abc_tree();
    let root = tree.root();
    let mut sync = Synchronizer::builder(SyncOptions::default())
        .pointer_signal(receiver)
        .attach(&mut tree, root, now)
        .unwrap();
    let panel = panels(&tree)[0];

    let list = properties(&tree);
    tree.move_item(list, 0, 1).unwrap();
    release.send(PointerRelease).unwrap();

    sync.pump(&mut tree, now).unwrap();
    assert!(sync.reorder_pending());
    sync.pump(&mut tree, now + DELAY).unwrap();
    assert_eq!(entry_values(&tree, panel), ["e1", "e0", "e2"]);
    assert_eq!(entry_labels(&tree, panel), ["B", "A", "C"]);
}

#[test]
fn unsupported_reorder_leaves_entries_alone() {
    let now = Instant::now();
    let mut tree = tree(json!({
        "propertiesGroup": {"properties": [
            {"label": "A"}, {"label": "B"}, {"label": "C"}, {"label": "D"}
        ]},
        "panels": [{"entries": ["a", "b", "c", "d"]}]
    }));
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let panel = panels(&tree)[0];

    let list = properties(&tree);
    tree.move_item(list, 0, 1).unwrap();
    tree.move_item(list, 2, 3).unwrap();
    sync.pointer_released(now);
    sync.tick(&mut tree, now + DELAY).unwrap();

    assert_eq!(entry_values(&tree, panel), ["a", "b", "c", "d"]);
    assert!(!sync.reorder_pending());
}

#[test]
fn adding_a_property_within_the_drag_delay_applies_the_drag_first() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let panel = panels(&tree)[0];

    let list = properties(&tree);
    tree.move_item(list, 0, 2).unwrap();
    sync.pointer_released(now);
    add_property(&mut tree, "D");
    sync.pump(&mut tree, now + Duration::from_millis(50)).unwrap();
    assert!(!sync.reorder_pending());

    sync.tick(&mut tree, now + Duration::from_millis(500)).unwrap();
    assert_eq!(entry_values(&tree, panel), ["e1", "e2", "e0", ""]);
    assert_eq!(entry_labels(&tree, panel), ["B", "C", "A", "D"]);
}

#[test]
fn removal_within_the_drag_delay_applies_the_drag_first() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let panel = panels(&tree)[0];

    let list = properties(&tree);
    tree.move_item(list, 0, 2).unwrap();
    sync.pointer_released(now);
    tree.remove_item(list, 0).unwrap();
    sync.pump(&mut tree, now + Duration::from_millis(50)).unwrap();
    sync.tick(&mut tree, now + Duration::from_millis(500)).unwrap();

    assert_eq!(entry_values(&tree, panel), ["e2", "e0"]);
    assert_eq!(entry_labels(&tree, panel), ["C", "A"]);
}

#[test]
fn batched_add_then_remove_keeps_entries_aligned() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let panel = panels(&tree)[0];

    let list = properties(&tree);
    add_property(&mut tree, "D");
    tree.remove_item(list, 0).unwrap();
    sync.pump(&mut tree, now).unwrap();

    assert_eq!(entry_values(&tree, panel), ["e1", "e2", ""]);
    assert_eq!(entry_labels(&tree, panel), ["B", "C", "D"]);
}

#[test]
fn property_inserted_mid_list_gets_its_entry_in_place() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let panel = panels(&tree)[0];

    let list = properties(&tree);
    let property = tree.insert_item(list, 1).unwrap();
    let label = locate(&tree, "label", property).unwrap();
    tree.edit_text(label, "Z").unwrap();
    sync.pump(&mut tree, now).unwrap();

    assert_eq!(entry_values(&tree, panel), ["e0", "", "e1", "e2"]);
    assert_eq!(entry_labels(&tree, panel), ["A", "Z", "B", "C"]);
}

#[test]
fn renamed_property_relabels_its_entries() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let mut sync = attach(&mut tree, SyncOptions::default(), now);

    let list = properties(&tree);
    let second = tree.items(list).unwrap()[1];
    let label = locate(&tree, "label", second).unwrap();
    tree.edit_text(label, "Beta").unwrap();
    sync.pump(&mut tree, now).unwrap();

    for panel in panels(&tree) {
        assert_eq!(entry_labels(&tree, panel), ["A", "Beta", "C"]);
    }
}

#[test]
fn title_prefers_metadata_then_alt_then_entries() {
    let now = Instant::now();
    let mut tree = tree(json!({
        "propertiesGroup": {"properties": [{"label": "Name"}]},
        "panels": [{
            "image": {"path": "a.png", "alt": "Sunset", "metadata": {"title": "Untitled Image"}},
            "entries": ["&amp;Hello"]
        }]
    }));
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let panel = panels(&tree)[0];
    assert_eq!(title(&tree, panel), "Sunset");

    let alt = locate(&tree, "image/alt", panel).unwrap();
    tree.edit_text(alt, "").unwrap();
    sync.pump(&mut tree, now).unwrap();
    assert_eq!(title(&tree, panel), "&Hello");

    let metadata_title = locate(&tree, "image/metadataForm/title", panel).unwrap();
    tree.edit_text(metadata_title, "Harbour").unwrap();
    sync.pump(&mut tree, now).unwrap();
    assert_eq!(title(&tree, panel), "Harbour");
    assert_eq!(tree.to_value()["panels"][0]["panelTitle"], json!("Harbour"));
}

#[test]
fn unchanged_title_is_not_rewritten() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let panel = panels(&tree)[0];
    let before = tree.to_value();

    let entry = tree.items(entries(&tree, panel)).unwrap()[0];
    sync.handle(&mut tree, &FormEvent::Changed { field: entry }, now)
        .unwrap();
    sync.handle(&mut tree, &FormEvent::Changed { field: entry }, now)
        .unwrap();

    assert!(tree.drain_events().is_empty());
    assert_eq!(tree.to_value(), before);
}

#[test]
fn empty_panel_gets_the_localized_placeholder() {
    let now = Instant::now();
    let mut tree = tree(json!({
        "propertiesGroup": {"properties": [{"label": "Name"}]},
        "panels": [{}]
    }));
    let options = SyncOptions::default()
        .with_kinds("Bild", "Tafel")
        .with_translations(Translations::empty().with("core", "untitled", "Unbenannt :libraryTitle"));
    attach(&mut tree, options, now);

    assert_eq!(title(&tree, panels(&tree)[0]), "Unbenannt Tafel");
}

#[test]
fn title_wiring_waits_for_the_metadata_form() {
    let now = Instant::now();
    let mut tree = FieldTree::from_params(
        Semantics::info_wall(),
        &json!({
            "propertiesGroup": {"properties": [{"label": "Name"}]},
            "panels": [{"entries": ["Ada"]}]
        }),
    );
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let panel = panels(&tree)[0];
    assert!(sync.is_waiting(panel));
    assert!(!sync.is_wired(panel));
    assert_eq!(sync.next_wakeup(), Some(now + Duration::from_millis(200)));

    tree.attach_metadata_forms();
    sync.tick(&mut tree, now + Duration::from_millis(100)).unwrap();
    assert!(sync.is_waiting(panel));

    sync.tick(&mut tree, now + Duration::from_millis(200)).unwrap();
    assert!(sync.is_wired(panel));
    assert!(!sync.is_waiting(panel));

    let metadata_title = locate(&tree, "image/metadataForm/title", panel).unwrap();
    tree.edit_text(metadata_title, "Portrait").unwrap();
    sync.pump(&mut tree, now + Duration::from_millis(200)).unwrap();
    assert_eq!(title(&tree, panel), "Portrait");
}

#[test]
fn title_wiring_gives_up_quietly() {
    let now = Instant::now();
    let mut tree = FieldTree::from_params(Semantics::info_wall(), &json!({}));
    let options = SyncOptions::default()
        .with_wait_interval(Duration::from_millis(100))
        .with_wait_retries(2);
    let mut sync = attach(&mut tree, options, now);
    let panel = panels(&tree)[0];

    for step in 1..=3 {
        sync.tick(&mut tree, now + Duration::from_millis(100 * step)).unwrap();
    }
    assert!(!sync.is_waiting(panel));
    assert!(!sync.is_wired(panel));
    assert_eq!(sync.next_wakeup(), None);
}

#[test]
fn removing_a_panel_drops_its_wait() {
    let now = Instant::now();
    let mut tree = FieldTree::from_params(Semantics::info_wall(), &json!({}));
    let mut sync = attach(&mut tree, SyncOptions::default(), now);
    let panel = panels(&tree)[0];
    assert!(sync.is_waiting(panel));

    let list = sync.panels();
    tree.remove_item(list, 0).unwrap();
    sync.pump(&mut tree, now).unwrap();
    assert!(!sync.is_waiting(panel));

    tree.attach_metadata_forms();
    sync.tick(&mut tree, now + Duration::from_secs(1)).unwrap();
    assert!(!sync.is_wired(panel));
}

#[test]
fn panels_without_an_image_are_wired_at_once() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let options = SyncOptions::default().with_paths(FieldPaths {
        image: "picture".to_string(),
        ..FieldPaths::default()
    });
    let sync = attach(&mut tree, options, now);

    for panel in panels(&tree) {
        assert!(sync.is_wired(panel));
    }
}

#[test]
fn attach_requires_both_lists() {
    let now = Instant::now();
    let mut tree = abc_tree();
    let root = tree.root();

    let missing = SyncOptions::default().with_paths(FieldPaths {
        properties: "propertiesGroup/missing".to_string(),
        ..FieldPaths::default()
    });
    let err = Synchronizer::builder(missing)
        .attach(&mut tree, root, now)
        .unwrap_err();
    assert_eq!(
        err,
        SyncError::MissingField {
            path: "propertiesGroup/missing".to_string()
        }
    );

    let not_a_list = SyncOptions::default().with_paths(FieldPaths {
        panels: "propertiesGroup".to_string(),
        ..FieldPaths::default()
    });
    let err = Synchronizer::builder(not_a_list)
        .attach(&mut tree, root, now)
        .unwrap_err();
    assert!(matches!(err, SyncError::NotAList { .. }));
}

#[test]
fn validation_is_forwarded_from_the_host() {
    let now = Instant::now();
    let mut tree = tree(json!({
        "propertiesGroup": {"properties": [{"label": ""}]},
        "panels": [{}]
    }));
    let sync = attach(&mut tree, SyncOptions::default(), now);

    let issues = sync.validate(&tree).unwrap_err();
    assert_eq!(issues, tree.validate(tree.root()).unwrap_err());
    assert!(issues[0].starts_with("/propertiesGroup/properties/0/label"));

    let mut valid = abc_tree();
    let sync = attach(&mut valid, SyncOptions::default(), now);
    assert_eq!(sync.validate(&valid), Ok(()));
}
