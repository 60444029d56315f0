//! Stub environment the assembled text executes against.
//!
//! Numeric and collection utilities pass through to real equivalents;
//! everything that stands for the surrounding game program is inert.
//! The host objects enumerate exactly the fields the extracted
//! declarations read, with their default values spelled out, instead of
//! an open-ended stand-in.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;

use crate::vm::EvalError;
use crate::vm::value::Value;

/// Side-effecting host calls that may appear inside extracted fragments.
pub const NOOP_HOST_CALLS: &[&str] = &[
    "saveGame",
    "addEvent",
    "showNotification",
    "playSound",
    "updateUI",
];

/// Host player state as the fragments see it.
#[derive(Debug, Serialize)]
pub struct HostPlayer {
    pub level: u32,
    pub gold: f64,
    pub kills: u64,
    pub deepest_floor: u32,
    pub skills: HostSkills,
    pub equipment: HostEquipment,
}

#[derive(Debug, Default, Serialize)]
pub struct HostSkills {
    pub mining: u32,
    pub smithing: u32,
    pub combat: u32,
    pub magic: u32,
}

#[derive(Debug, Default, Serialize)]
pub struct HostEquipment {
    pub weapon: Option<String>,
    pub armor: Option<String>,
    pub trinket: Option<String>,
}

impl Default for HostPlayer {
    fn default() -> Self {
        Self {
            level: 1,
            gold: 0.0,
            kills: 0,
            deepest_floor: 0,
            skills: HostSkills::default(),
            equipment: HostEquipment::default(),
        }
    }
}

/// Host game-session state as the fragments see it.
#[derive(Debug, Serialize)]
pub struct HostGame {
    pub version: &'static str,
    pub tick: u64,
    pub offline_ms: u64,
}

impl Default for HostGame {
    fn default() -> Self {
        Self {
            version: "0.0.0",
            tick: 0,
            offline_ms: 0,
        }
    }
}

/// Populate the global table with every stub symbol.
pub fn install(globals: &mut BTreeMap<String, Value>) {
    globals.insert("Math".into(), math_object());
    globals.insert("Object".into(), object_namespace());
    globals.insert("console".into(), console_object());
    globals.insert("player".into(), host_object(&HostPlayer::default()));
    globals.insert("game".into(), host_object(&HostGame::default()));
    for &name in NOOP_HOST_CALLS {
        globals.insert(name.into(), Value::native(name, noop));
    }
}

fn host_object<T: Serialize>(cfg: &T) -> Value {
    let json = serde_json::to_value(cfg).unwrap_or(serde_json::Value::Null);
    Value::from_json(&json)
}

fn err(message: String) -> EvalError {
    // line 0: the interpreter pins it to the calling statement
    EvalError::Type { line: 0, message }
}

fn arg_num(args: &[Value], i: usize) -> f64 {
    args.get(i).map(Value::as_num).unwrap_or(f64::NAN)
}

fn noop(_args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Undefined)
}

// ── Math ───────────────────────────────────────────────────────────

fn math_object() -> Value {
    let mut m = BTreeMap::new();
    m.insert("floor".into(), Value::native("floor", math_floor));
    m.insert("ceil".into(), Value::native("ceil", math_ceil));
    m.insert("round".into(), Value::native("round", math_round));
    m.insert("sqrt".into(), Value::native("sqrt", math_sqrt));
    m.insert("abs".into(), Value::native("abs", math_abs));
    m.insert("pow".into(), Value::native("pow", math_pow));
    m.insert("max".into(), Value::native("max", math_max));
    m.insert("min".into(), Value::native("min", math_min));
    m.insert("random".into(), Value::native("random", math_random));
    m.insert("PI".into(), Value::Num(std::f64::consts::PI));
    Value::object(m)
}

fn math_floor(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Num(arg_num(args, 0).floor()))
}

fn math_ceil(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Num(arg_num(args, 0).ceil()))
}

fn math_round(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Num(arg_num(args, 0).round()))
}

fn math_sqrt(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Num(arg_num(args, 0).sqrt()))
}

fn math_abs(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Num(arg_num(args, 0).abs()))
}

fn math_pow(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Num(arg_num(args, 0).powf(arg_num(args, 1))))
}

fn math_max(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Num(
        args.iter().map(Value::as_num).fold(f64::NEG_INFINITY, f64::max),
    ))
}

fn math_min(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Num(
        args.iter().map(Value::as_num).fold(f64::INFINITY, f64::min),
    ))
}

/// Fixed value: data generation must give the same bytes on every run.
fn math_random(_args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Num(0.5))
}

// ── Object ─────────────────────────────────────────────────────────

fn object_namespace() -> Value {
    let mut m = BTreeMap::new();
    m.insert("assign".into(), Value::native("assign", object_assign));
    m.insert("keys".into(), Value::native("keys", object_keys));
    Value::object(m)
}

fn object_assign(args: &[Value]) -> Result<Value, EvalError> {
    let Some(Value::Object(target)) = args.first() else {
        return Err(err("Object.assign target must be an object".into()));
    };
    for source in &args[1..] {
        match source {
            Value::Object(map) => {
                if Rc::ptr_eq(target, map) {
                    continue;
                }
                let entries: Vec<(String, Value)> = map
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                target.borrow_mut().extend(entries);
            }
            Value::Undefined | Value::Null => {}
            other => {
                return Err(err(format!(
                    "Object.assign source must be an object, got {}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(args[0].clone())
}

fn object_keys(args: &[Value]) -> Result<Value, EvalError> {
    match args.first() {
        Some(Value::Object(map)) => Ok(Value::array(
            map.borrow().keys().cloned().map(Value::Str).collect(),
        )),
        Some(Value::Array(items)) => Ok(Value::array(
            (0..items.borrow().len())
                .map(|i| Value::Str(i.to_string()))
                .collect(),
        )),
        _ => Err(err("Object.keys needs an object".into())),
    }
}

// ── console ────────────────────────────────────────────────────────

fn console_object() -> Value {
    let mut m = BTreeMap::new();
    m.insert("log".into(), Value::native("log", noop));
    m.insert("warn".into(), Value::native("warn", noop));
    m.insert("error".into(), Value::native("error", noop));
    Value::object(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{DEFAULT_BUDGET, evaluate};

    #[test]
    fn test_math_passthrough() {
        let src = "\
var a = Math.floor(3.7);
var b = Math.pow(2, 10);
var c = Math.max(1, 9, 4);
var d = Math.min(1, 9, 4);
";
        let b = evaluate(src, DEFAULT_BUDGET).unwrap();
        assert_eq!(b.get("a"), Some(&Value::Num(3.0)));
        assert_eq!(b.get("b"), Some(&Value::Num(1024.0)));
        assert_eq!(b.get("c"), Some(&Value::Num(9.0)));
        assert_eq!(b.get("d"), Some(&Value::Num(1.0)));
    }

    #[test]
    fn test_random_is_fixed() {
        let b = evaluate("var r = Math.random();", DEFAULT_BUDGET).unwrap();
        assert_eq!(b.get("r"), Some(&Value::Num(0.5)));
    }

    #[test]
    fn test_object_assign_merges_left_to_right() {
        let src = "var o = Object.assign({ a: 1, b: 1 }, { b: 2 }, { c: 3 });";
        let b = evaluate(src, DEFAULT_BUDGET).unwrap();
        let o = b.get("o").unwrap();
        assert_eq!(o.get_property("a"), Some(Value::Num(1.0)));
        assert_eq!(o.get_property("b"), Some(Value::Num(2.0)));
        assert_eq!(o.get_property("c"), Some(Value::Num(3.0)));
    }

    #[test]
    fn test_object_keys_sorted() {
        let src = "var k = Object.keys({ z: 1, a: 2 }).join(',');";
        let b = evaluate(src, DEFAULT_BUDGET).unwrap();
        assert_eq!(b.get("k"), Some(&Value::Str("a,z".into())));
    }

    #[test]
    fn test_host_stubs_are_inert() {
        let src = "\
var r = saveGame();
var lvl = player.level;
var tick = game.tick;
console.log('ignored');
";
        let b = evaluate(src, DEFAULT_BUDGET).unwrap();
        assert_eq!(b.get("r"), Some(&Value::Undefined));
        assert_eq!(b.get("lvl"), Some(&Value::Num(1.0)));
        assert_eq!(b.get("tick"), Some(&Value::Num(0.0)));
    }
}
