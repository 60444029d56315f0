use std::fs;
use std::path::Path;

use scriptmine::execute;
use scriptmine::vm::DEFAULT_BUDGET;
use scriptmine::writer::DEBUG_ARTIFACT;

const FIXTURE: &str = "tests/main.sample.js";

fn read_json(dir: &Path, file: &str) -> serde_json::Value {
    let text = fs::read_to_string(dir.join(file))
        .unwrap_or_else(|e| panic!("reading {file}: {e}"));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("parsing {file}: {e}"))
}

#[test]
fn full_pipeline_produces_all_documents() {
    let out = tempfile::tempdir().unwrap();
    let summary = execute(Path::new(FIXTURE), out.path(), DEFAULT_BUDGET).expect("pipeline ok");

    assert_eq!(summary.documents, 17);
    assert_eq!(summary.items, 5);
    assert_eq!(summary.recipes, 2);
    assert_eq!(summary.enemies, 3);
    assert_eq!(summary.quests, 3);
    assert_eq!(summary.side_quests, 2);
    assert_eq!(summary.npcs, 2);
    assert_eq!(summary.achievements, 3);
    assert_eq!(summary.pets, 2);
    assert_eq!(summary.skills, 3);

    // registry built through the extracted helper
    let items = read_json(out.path(), "items.json");
    assert_eq!(items["copper_ore"]["id"], "copper_ore");
    assert_eq!(items["copper_ore"]["type"], "ore");
    assert_eq!(items["lucky_gem"]["note"], "rare } drop");

    // generated stat table: floor(10 * 1.15^(lvl-1)) at lvl 1 and 20
    let stats = read_json(out.path(), "enemy_stats.json");
    let rows = stats.as_array().unwrap();
    assert_eq!(rows.len(), 20);
    assert_eq!(rows[0]["hp"], 10);
    assert_eq!(rows[0]["xp"], 5);
    assert_eq!(rows[19]["level"], 20);

    // aggregation step joined enemies with item data
    let loot = read_json(out.path(), "loot_tables.json");
    assert_eq!(loot["rat"]["level"], 1);
    assert_eq!(loot["rat"]["drops"][0]["item"], "copper_ore");
    assert_eq!(loot["rat"]["drops"][0]["weight"], 8);
    assert_eq!(loot["golem"]["drops"][1]["item"], "lucky_gem");
    assert_eq!(loot["golem"]["drops"][1]["weight"], 4);

    // callables became the placeholder, data around them survived
    let achievements = read_json(out.path(), "achievements.json");
    assert_eq!(achievements[0]["id"], "first_blood");
    assert_eq!(achievements[0]["test"], "<function>");

    // host stub defaults flowed into data that reads them
    let quests = read_json(out.path(), "quests.json");
    assert_eq!(quests[0]["minLevel"], 5);
    let prestige = read_json(out.path(), "prestige.json");
    assert_eq!(prestige["offlineCap"], 2);

    // debug artifact is present even on success
    assert!(out.path().join(DEBUG_ARTIFACT).exists());
}

#[test]
fn rerun_is_byte_identical() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    execute(Path::new(FIXTURE), first.path(), DEFAULT_BUDGET).expect("first run");
    execute(Path::new(FIXTURE), second.path(), DEFAULT_BUDGET).expect("second run");

    for file in ["items.json", "loot_tables.json", "enemy_stats.json", "quests.json"] {
        let a = fs::read(first.path().join(file)).unwrap();
        let b = fs::read(second.path().join(file)).unwrap();
        assert_eq!(a, b, "{file} differs between runs");
    }
}

#[test]
fn missing_declaration_skips_only_its_document() {
    let source = fs::read_to_string(FIXTURE).unwrap();
    let without_pets = source.replace("var PETS", "var PETS_DISABLED");

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("main.js");
    fs::write(&input, without_pets).unwrap();

    let out = tempfile::tempdir().unwrap();
    let summary = execute(&input, out.path(), DEFAULT_BUDGET).expect("pipeline ok");

    assert_eq!(summary.pets, 0);
    assert_eq!(summary.documents, 16);
    assert!(!out.path().join("pets.json").exists());
    // unrelated documents still written correctly
    assert!(out.path().join("items.json").exists());
    assert_eq!(summary.items, 5);
}

#[test]
fn undefined_host_symbol_aborts_with_diagnostic() {
    let source = fs::read_to_string(FIXTURE).unwrap();
    let broken = source.replace(
        "// << item definitions",
        "tuneBalance(ITEMS);\n// << item definitions",
    );

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("main.js");
    fs::write(&input, broken).unwrap();

    let out = tempfile::tempdir().unwrap();
    let err = execute(&input, out.path(), DEFAULT_BUDGET).unwrap_err();
    assert!(
        format!("{err}").contains("tuneBalance"),
        "diagnostic should name the undefined symbol: {err}"
    );

    // the debug artifact is left for inspection, no documents written
    assert!(out.path().join(DEBUG_ARTIFACT).exists());
    assert!(!out.path().join("items.json").exists());
}
