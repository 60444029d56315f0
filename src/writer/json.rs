//! Sanitizing serializer and document emission.
//!
//! Evaluated bindings may still hold callable members (achievement
//! predicates, stat helpers captured in data). Documents are pure data:
//! every callable becomes the placeholder token, everything else keeps
//! its structure. Cycles are assumed absent; the game tables are plain
//! trees.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::vm::Bindings;
use crate::vm::value::Value;

/// Marker substituted for any callable found inside a data tree.
pub const PLACEHOLDER: &str = "<function>";

/// binding name in the evaluated script → document file name
pub const DOCUMENTS: &[(&str, &str)] = &[
    ("ItemType", "item_types.json"),
    ("ITEMS", "items.json"),
    ("RECIPES", "recipes.json"),
    ("ENEMIES", "enemies.json"),
    ("ENEMY_STATS", "enemy_stats.json"),
    ("AREAS", "areas.json"),
    ("AREA_LEVEL_RANGES", "area_levels.json"),
    ("SKILLS", "skills.json"),
    ("QUESTS", "quests.json"),
    ("SIDE_QUESTS", "side_quests.json"),
    ("NPCS", "npcs.json"),
    ("ACHIEVEMENTS", "achievements.json"),
    ("PRESTIGE_UPGRADES", "prestige.json"),
    ("DUNGEON_FLOORS", "dungeon.json"),
    ("PETS", "pets.json"),
    ("EQUIP_GEN", "equipment_gen.json"),
    ("LOOT_TABLES", "loot_tables.json"),
];

/// Recursively convert a runtime value into pure data.
///
/// Whole numbers serialize as integers; NaN and infinities (which the
/// source cannot represent in JSON either) fall back to null.
pub fn materialize(value: &Value) -> serde_json::Value {
    match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Num(n) => {
            if n.fract() == 0.0 && n.is_finite() && n.abs() < 9e15 {
                serde_json::Value::from(*n as i64)
            } else {
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => {
            serde_json::Value::Array(items.borrow().iter().map(materialize).collect())
        }
        Value::Object(map) => serde_json::Value::Object(
            map.borrow()
                .iter()
                .map(|(k, v)| (k.clone(), materialize(v)))
                .collect(),
        ),
        Value::Function(_) | Value::Native { .. } => {
            serde_json::Value::String(PLACEHOLDER.into())
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub documents: usize,
    pub items: usize,
    pub recipes: usize,
    pub enemies: usize,
    pub quests: usize,
    pub side_quests: usize,
    pub npcs: usize,
    pub achievements: usize,
    pub pets: usize,
    pub skills: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} items, {} recipes, {} enemies",
            self.items, self.recipes, self.enemies
        )?;
        writeln!(
            f,
            "{} quests + {} side quests, {} npcs",
            self.quests, self.side_quests, self.npcs
        )?;
        writeln!(
            f,
            "{} achievements, {} pets, {} skills",
            self.achievements, self.pets, self.skills
        )?;
        write!(f, "{} documents written", self.documents)
    }
}

/// Write one pretty-printed document per binding that exists.
pub fn emit(bindings: &Bindings, out_dir: &Path) -> Result<Summary> {
    let mut written = 0;
    for &(binding, file) in DOCUMENTS {
        let Some(value) = bindings.get(binding) else {
            println!("warning: no `{binding}` binding, skipping {file}");
            continue;
        };
        let doc = materialize(value);
        let text = format!("{}\n", serde_json::to_string_pretty(&doc)?);
        let path = out_dir.join(file);
        fs::write(&path, &text).with_context(|| format!("Writing {}", path.display()))?;
        println!(
            "wrote {file} ({} bytes, {} lines)",
            text.len(),
            text.lines().count()
        );
        written += 1;
    }

    Ok(Summary {
        documents: written,
        items: entry_count(bindings, "ITEMS"),
        recipes: entry_count(bindings, "RECIPES"),
        enemies: entry_count(bindings, "ENEMIES"),
        quests: entry_count(bindings, "QUESTS"),
        side_quests: entry_count(bindings, "SIDE_QUESTS"),
        npcs: entry_count(bindings, "NPCS"),
        achievements: entry_count(bindings, "ACHIEVEMENTS"),
        pets: entry_count(bindings, "PETS"),
        skills: entry_count(bindings, "SKILLS"),
    })
}

fn entry_count(bindings: &Bindings, name: &str) -> usize {
    match bindings.get(name) {
        Some(Value::Object(map)) => map.borrow().len(),
        Some(Value::Array(items)) => items.borrow().len(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn sample_tree() -> Value {
        let mut inner = BTreeMap::new();
        inner.insert("id".into(), Value::Str("ore1".into()));
        inner.insert("tier".into(), Value::Num(2.0));
        inner.insert("rate".into(), Value::Num(1.15));
        inner.insert("tags".into(), Value::array(vec![
            Value::Str("smelt".into()),
            Value::Bool(true),
            Value::Null,
        ]));
        let mut root = BTreeMap::new();
        root.insert("ore1".into(), Value::object(inner));
        Value::object(root)
    }

    #[test]
    fn test_materialize_preserves_data_trees() {
        assert_eq!(
            materialize(&sample_tree()),
            json!({
                "ore1": {
                    "id": "ore1",
                    "rate": 1.15,
                    "tags": ["smelt", true, null],
                    "tier": 2
                }
            })
        );
    }

    #[test]
    fn test_materialize_replaces_callables() {
        let mut map = BTreeMap::new();
        map.insert("name".into(), Value::Str("First Blood".into()));
        map.insert(
            "test".into(),
            Value::native("test", |_| Ok(Value::Undefined)),
        );
        let doc = materialize(&Value::object(map));
        assert_eq!(
            doc,
            json!({ "name": "First Blood", "test": PLACEHOLDER })
        );
    }

    #[test]
    fn test_materialize_whole_numbers_are_integers() {
        assert_eq!(materialize(&Value::Num(42.0)), json!(42));
        assert_eq!(materialize(&Value::Num(0.25)), json!(0.25));
        assert_eq!(materialize(&Value::Num(f64::NAN)), json!(null));
    }

    #[test]
    fn test_materialize_undefined_is_null() {
        assert_eq!(
            materialize(&Value::array(vec![Value::Undefined])),
            json!([null])
        );
    }
}
