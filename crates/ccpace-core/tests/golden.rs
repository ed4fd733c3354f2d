//! Replays captured screens through the full parse + validate pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use ccpace_core::capture::is_complete_capture;
use ccpace_core::config::Tunables;
use ccpace_core::heal::ExpectedValues;
use ccpace_core::pipeline::{parse_and_validate, Strictness};
use pretty_assertions::assert_eq;

fn golden_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/golden")
}

/// `(name, raw text, expected values)` for every pair in the golden dir
fn load_pairs() -> Vec<(String, String, ExpectedValues)> {
    let mut pairs: Vec<_> = fs::read_dir(golden_dir())
        .expect("golden dir")
        .flatten()
        .map(|e| e.path())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.strip_suffix(".expected.json")?.to_string();
            let expected: ExpectedValues =
                serde_json::from_str(&fs::read_to_string(&path).ok()?).ok()?;
            let raw = fs::read_to_string(golden_dir().join(format!("{}.txt", name))).ok()?;
            Some((name, raw, expected))
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}

#[test]
fn golden_pairs_present() {
    let names: Vec<String> = load_pairs().into_iter().map(|p| p.0).collect();
    assert_eq!(
        names,
        vec!["box_layout", "cursor_forward", "damaged_labels", "year_end"]
    );
}

#[test]
fn golden_pairs_parse_to_expected_values() {
    let tunables = Tunables::default();

    for (name, raw, expected) in load_pairs() {
        assert!(is_complete_capture(&raw), "{}: incomplete capture", name);

        let result = parse_and_validate(&raw, &tunables, expected.captured_at, Strictness::Strict)
            .unwrap_or_else(|e| panic!("{}: {}", name, e));

        let actual = ExpectedValues::from_result(&result, expected.captured_at, expected.auto_healed);
        assert_eq!(actual, expected, "{}", name);

        assert!(result.session.reset_at.is_some(), "{}: session reset", name);
        assert!(result.week.reset_at.is_some(), "{}: week reset", name);
        assert!(result.warnings.is_empty(), "{}: {:?}", name, result.warnings);
    }
}

#[test]
fn year_end_week_reset_rolls_into_next_year() {
    let (_, raw, expected) = load_pairs()
        .into_iter()
        .find(|p| p.0 == "year_end")
        .expect("year_end fixture");

    let result =
        parse_and_validate(&raw, &Tunables::default(), expected.captured_at, Strictness::Lenient)
            .unwrap();
    let week = result.week.reset_at.unwrap();
    assert_eq!(week.to_string(), "2027-01-02 20:00:00");
}
