//! Store lifecycle tests: navigation, booking, collation, tagging, and
//! removal across the full façade. Focus areas:
//!
//! 1. Current-folder model and ancestor-directory invariants
//! 2. Book + fill + tag + list (the basic producer flow)
//! 3. Collation semantics, enabled and disabled
//! 4. Tag-list monotonicity under mixed tagging calls
//! 5. Removal operations and the removed-names log

use dqstore::{DqmError, DqmStore, StoreConfig};

fn store() -> DqmStore {
    DqmStore::new(StoreConfig::default()).expect("store construction")
}

// ═══════════════════════════════════════════════════════════════════════════
// 1. Navigation invariants
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn set_current_folder_normalizes_and_creates_ancestors() {
    let mut store = store();
    store.set_current_folder("Sub/System//").unwrap();
    assert_eq!(store.pwd(), "Sub/System");
    assert!(store.dir_exists(""));
    assert!(store.dir_exists("Sub"));
    assert!(store.dir_exists("Sub/System"));
}

#[test]
fn go_up_walks_to_root() {
    let mut store = store();
    store.set_current_folder("A/B/C").unwrap();
    store.go_up();
    assert_eq!(store.pwd(), "A/B");
    store.go_up();
    store.go_up();
    assert_eq!(store.pwd(), "");
    store.go_up();
    assert_eq!(store.pwd(), "");
}

// ═══════════════════════════════════════════════════════════════════════════
// 2. Book + fill + tag + list
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn book_fill_tag_list_round() {
    let mut store = store();
    store.set_current_folder("A/B").unwrap();
    store.book_int("n").unwrap();
    store.get_mut("A/B/n").unwrap().fill_int(7);
    store.tag_path("A/B/n", 3).unwrap();

    store.set_current_folder("A").unwrap();
    assert_eq!(store.get_subdirs(), vec!["A/B"]);
    store.set_current_folder("A/B").unwrap();
    assert_eq!(store.get_mes(), vec!["n"]);
    let me = store.get("A/B/n").unwrap();
    assert_eq!(me.int_value(), Some(7));
    assert_eq!(me.tags(), &[3]);
}

#[test]
fn listings_and_matching_contents() {
    let mut store = store();
    store.set_current_folder("Tracker").unwrap();
    store.book_1d("h_adc", "t", 4, 0.0, 4.0).unwrap();
    store.book_1d("h_ped", "t", 4, 0.0, 4.0).unwrap();
    store.set_current_folder("Ecal").unwrap();
    store.book_1d("h_adc", "t", 4, 0.0, 4.0).unwrap();

    assert_eq!(
        store.contents_listing(true),
        vec!["Ecal:h_adc", "Tracker:h_adc,h_ped"]
    );
    let matched = store.get_matching_contents("*/h_adc").unwrap();
    assert_eq!(matched.len(), 2);
    let matched = store.get_matching_contents("Tracker/h?ped").unwrap();
    assert_eq!(matched.len(), 1);
    assert!(store.get_matching_contents("Tracker/[").is_err());
    assert!(store.contains_any_monitorable("Tracker"));
    assert!(!store.contains_any_monitorable("Hcal"));
}

// ═══════════════════════════════════════════════════════════════════════════
// 3. Collation
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn collation_sums_bin_contents_elementwise() {
    let mut store = store();
    store.set_current_folder("A").unwrap();
    store.book_1d("h", "t", 10, 0.0, 10.0).unwrap();
    store.get_mut("A/h").unwrap().fill(&[2.5], 5.0);

    // Second and third bookings of the same shape merge into the first.
    store.book_1d("h", "t", 10, 0.0, 10.0).unwrap();
    store.get_mut("A/h").unwrap().fill(&[2.5], 2.0);
    store.book_1d("h", "t", 10, 0.0, 10.0).unwrap();

    let h = store.get("A/h").unwrap().histogram().unwrap();
    assert_eq!(h.nbins(0), 10);
    assert!((h.content(3, 0, 0) - 7.0).abs() < 1e-12);
}

#[test]
fn collation_disabled_rejects_rebooking_and_preserves_state() {
    let mut store = DqmStore::new(StoreConfig {
        collate_histograms: false,
        ..StoreConfig::default()
    })
    .unwrap();
    store.set_current_folder("A").unwrap();
    store.book_1d("h", "t", 10, 0.0, 10.0).unwrap();
    store.get_mut("A/h").unwrap().fill(&[3.5], 5.0);

    let err = store.book_1d("h", "t", 10, 0.0, 10.0).unwrap_err();
    assert!(matches!(err, DqmError::Duplicate { .. }));
    let h = store.get("A/h").unwrap().histogram().unwrap();
    assert!((h.content(4, 0, 0) - 5.0).abs() < 1e-12);
    assert!((h.entries() - 1.0).abs() < 1e-12);
}

// ═══════════════════════════════════════════════════════════════════════════
// 4. Tagging monotonicity
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn tag_lists_stay_strictly_increasing_under_mixed_calls() {
    let mut store = store();
    store.book_int_in("A", "x").unwrap();
    store.book_int_in("A/B", "y").unwrap();
    store.book_int_in("A/B/C", "z").unwrap();

    store.tag_path("A/B/y", 8).unwrap();
    store.tag_contents("A/B", 2).unwrap();
    store.tag_all_contents("A", 5).unwrap();
    store.tag_all_contents("A", 2).unwrap();

    for path in ["A/x", "A/B/y", "A/B/C/z"] {
        let tags = store.get(path).unwrap().tags();
        assert!(
            tags.windows(2).all(|w| w[0] < w[1]),
            "tags not strictly increasing for {path}: {tags:?}"
        );
    }
    assert_eq!(store.get("A/B/y").unwrap().tags(), &[2, 5, 8]);
    assert_eq!(store.get("A/x").unwrap().tags(), &[2, 5]);
    assert_eq!(store.tag_listing().len(), 3);
}

#[test]
fn tagged_getters_filter_correctly() {
    let mut store = store();
    store.book_int_in("A", "x").unwrap();
    store.book_int_in("A", "y").unwrap();
    store.tag_path("A/x", 4).unwrap();
    assert_eq!(store.get_by_tag(4).len(), 1);
    assert_eq!(store.get_contents_tagged("A", 4).len(), 1);
    assert_eq!(store.get_contents("A").len(), 2);
    assert!(store.get_by_tag(99).is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// 5. Removal
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn rmdir_erases_subtree_and_logs_names() {
    let mut store = store();
    store.book_int_in("A", "x").unwrap();
    store.book_int_in("A/B", "y").unwrap();
    store.book_int_in("AB", "sibling").unwrap();
    store.rmdir("A");

    assert!(store.get("A/x").is_none());
    assert!(store.get("A/B/y").is_none());
    // A sibling whose name shares the prefix must survive.
    assert!(store.get("AB/sibling").is_some());
    assert_eq!(store.take_removed(), vec!["A/x", "A/B/y"]);
}

#[test]
fn remove_element_warns_but_does_not_fail_on_missing() {
    let mut store = store();
    store.set_current_folder("A").unwrap();
    store.book_int("x").unwrap();
    store.remove_element("x");
    store.remove_element("x"); // second removal only logs
    assert_eq!(store.take_removed(), vec!["A/x"]);
}

#[test]
fn subdirectory_listing_after_partial_removal() {
    let mut store = store();
    store.book_int_in("A/B", "y").unwrap();
    store.book_int_in("A/C", "z").unwrap();
    store.rmdir("A/B");
    store.set_current_folder("A").unwrap();
    assert_eq!(store.get_subdirs(), vec!["A/C"]);
}
