//! Assembles extracted fragments into one executable unit.
//!
//! The manifest is an ordered list of extraction steps; order is the
//! dependency order, since later fragments read bindings built by
//! earlier ones (the loot aggregation reads `ENEMIES` and `ITEMS`).
//! Every missing piece is a warning, never a failure: a fragment that
//! later code genuinely needs surfaces as an undefined symbol with a
//! line pointer when the assembled text is evaluated.

use crate::extract::locator;
use crate::extract::scanner::{self, BracketMode};
use crate::model::{Fragment, Span};

/// One extraction strategy applied to the source.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Text declared directly in the assembled unit, e.g. registry
    /// containers and helpers that name-based extraction cannot see.
    Verbatim { label: &'static str, text: &'static str },
    /// `var NAME = {...};` style declaration, located by name.
    Decl(&'static str),
    /// `function NAME(...) {...}`, located by name.
    Func(&'static str),
    /// Raw slice between two literal markers.
    Slice {
        label: &'static str,
        from: &'static str,
        to: &'static str,
    },
    /// Table-building loop: starts at a literal prefix, ends at the
    /// brace matching the loop's opening brace.
    Loop {
        label: &'static str,
        prefix: &'static str,
    },
}

const PRELUDE: &str = "\
var ITEMS = {};
var LOOT_TABLES = {};
function register(table, key, entry) { table[key] = entry; return entry; }
";

/// Extraction order for the game script. Helpers come before the
/// fragments that call them, base tables before the generated ones.
pub const MANIFEST: &[Step] = &[
    Step::Verbatim {
        label: "registries",
        text: PRELUDE,
    },
    Step::Decl("ItemType"),
    Step::Func("defineItem"),
    Step::Slice {
        label: "item definitions",
        from: "// >> item definitions",
        to: "// << item definitions",
    },
    Step::Decl("RECIPES"),
    Step::Decl("ENEMIES"),
    Step::Decl("AREAS"),
    Step::Decl("AREA_LEVEL_RANGES"),
    Step::Func("statCurve"),
    Step::Decl("ENEMY_STATS"),
    Step::Loop {
        label: "enemy stat table",
        prefix: "for (var lvl = 1",
    },
    Step::Decl("SKILLS"),
    Step::Decl("QUESTS"),
    Step::Decl("SIDE_QUESTS"),
    Step::Decl("NPCS"),
    Step::Decl("ACHIEVEMENTS"),
    Step::Decl("PRESTIGE_UPGRADES"),
    Step::Decl("DUNGEON_FLOORS"),
    Step::Decl("PETS"),
    Step::Decl("EQUIP_GEN"),
    Step::Slice {
        label: "loot table aggregation",
        from: "// >> loot tables",
        to: "// << loot tables",
    },
];

#[derive(Debug)]
pub struct Assembled {
    pub text: String,
    pub fragments: Vec<Fragment>,
    pub warnings: Vec<String>,
}

/// Run the fixed manifest against the source.
pub fn assemble(source: &str) -> Assembled {
    assemble_with(source, MANIFEST)
}

/// Run an explicit step list; fragments keep the given order.
pub fn assemble_with(source: &str, steps: &[Step]) -> Assembled {
    let mut fragments = Vec::new();
    let mut warnings = Vec::new();

    for step in steps {
        match *step {
            Step::Verbatim { label, text } => {
                fragments.push(Fragment::new(label, text, Span { start: 0, end: 0 }));
            }
            Step::Decl(name) => match locator::extract_declaration(name, source) {
                Some(frag) => {
                    check_truncation(&frag, source, &mut warnings);
                    fragments.push(frag);
                }
                None => warnings.push(format!("declaration `{name}` not found in source")),
            },
            Step::Func(name) => match locator::extract_function(name, source) {
                Some(frag) => {
                    check_truncation(&frag, source, &mut warnings);
                    fragments.push(frag);
                }
                None => warnings.push(format!("function `{name}` not found in source")),
            },
            Step::Slice { label, from, to } => match slice_between(source, from, to) {
                Some(span) => fragments.push(Fragment::new("", span.slice(source), span)),
                None => warnings.push(format!(
                    "markers for `{label}` not found (`{from}` .. `{to}`)"
                )),
            },
            Step::Loop { label, prefix } => match slice_loop(source, prefix) {
                Some(span) => {
                    let frag = Fragment::new("", span.slice(source), span);
                    check_truncation(&frag, source, &mut warnings);
                    fragments.push(frag);
                }
                None => warnings.push(format!("loop `{label}` (prefix `{prefix}`) not found")),
            },
        }
    }

    let mut text = String::new();
    for frag in &fragments {
        text.push_str(frag.text.trim_end());
        text.push('\n');
    }
    let text = normalize_bindings(&text);

    Assembled {
        text,
        fragments,
        warnings,
    }
}

/// A span that runs to true end-of-text almost always means the bracket
/// nesting never closed; warn loudly instead of trusting it.
fn check_truncation(frag: &Fragment, source: &str, warnings: &mut Vec<String>) {
    if frag.span.end == source.len() {
        let label = if frag.name.is_empty() {
            "anonymous fragment"
        } else {
            frag.name.as_str()
        };
        warnings.push(format!(
            "`{label}` ran to end of source; its brackets may be unbalanced"
        ));
    }
}

/// `[from_marker, to_marker)` raw slice. The markers themselves are
/// comment lines, so keeping the opening one in the slice is harmless.
fn slice_between(source: &str, from: &str, to: &str) -> Option<Span> {
    let start = source.find(from)?;
    let rel = source[start + from.len()..].find(to)?;
    let end = start + from.len() + rel;
    Some(Span { start, end })
}

/// Loop construct: literal prefix, then depth-match from the loop's
/// opening brace.
fn slice_loop(source: &str, prefix: &str) -> Option<Span> {
    let start = source.find(prefix)?;
    let body = scanner::find_matching_span(source, start + prefix.len(), BracketMode::BracesOnly)?;
    Some(Span {
        start,
        end: body.end,
    })
}

/// Rewrite every block-scoped binding keyword to `var` so concatenated
/// fragments can re-declare across what used to be separate scopes.
/// String and comment runs are left untouched.
pub fn normalize_bindings(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                let j = scanner::skip_string(bytes, i);
                out.push_str(&text[i..j]);
                i = j;
            }
            b'/' if scanner::is_line_comment(bytes, i) => {
                let j = scanner::skip_line_comment(bytes, i);
                out.push_str(&text[i..j]);
                i = j;
            }
            b'/' if scanner::is_block_comment(bytes, i) => {
                let j = scanner::skip_block_comment(bytes, i);
                out.push_str(&text[i..j]);
                i = j;
            }
            b'l' | b'c' => {
                let kw = if text[i..].starts_with("let") {
                    Some(3)
                } else if text[i..].starts_with("const") {
                    Some(5)
                } else {
                    None
                };
                match kw {
                    Some(len) if word_boundary(bytes, i, len) => {
                        out.push_str("var");
                        i += len;
                    }
                    _ => {
                        out.push(bytes[i] as char);
                        i += 1;
                    }
                }
            }
            _ => {
                // plain byte; multi-byte characters pass through verbatim
                let ch_len = utf8_len(bytes[i]);
                out.push_str(&text[i..i + ch_len]);
                i += ch_len;
            }
        }
    }
    out
}

fn word_boundary(bytes: &[u8], at: usize, len: usize) -> bool {
    let ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'$';
    let before_ok = at == 0 || !ident(bytes[at - 1]);
    let after_ok = at + len >= bytes.len() || !ident(bytes[at + len]);
    before_ok && after_ok
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_declarations_keep_order() {
        let src = "var A = {x:1};\nvar B = {y:2};";
        let steps = [Step::Decl("A"), Step::Decl("B")];
        let asm = assemble_with(src, &steps);
        assert!(asm.warnings.is_empty());
        assert_eq!(asm.text, "var A = {x:1};\nvar B = {y:2};\n");
    }

    #[test]
    fn test_missing_name_warns_and_continues() {
        let src = "var B = {y:2};";
        let steps = [Step::Decl("A"), Step::Decl("B")];
        let asm = assemble_with(src, &steps);
        assert_eq!(asm.warnings.len(), 1);
        assert!(asm.warnings[0].contains("`A`"));
        assert_eq!(asm.fragments.len(), 1);
        assert_eq!(asm.text, "var B = {y:2};\n");
    }

    #[test]
    fn test_normalize_bindings() {
        let src = "let A = {completed: 'const'};\nconst B = 2;";
        assert_eq!(
            normalize_bindings(src),
            "var A = {completed: 'const'};\nvar B = 2;"
        );
    }

    #[test]
    fn test_normalize_skips_comments() {
        let src = "// let it be\nlet x = 1;";
        assert_eq!(normalize_bindings(src), "// let it be\nvar x = 1;");
    }

    #[test]
    fn test_slice_between_markers() {
        let src = "before\n// >> defs\nmake(1);\nmake(2);\n// << defs\nafter";
        let steps = [Step::Slice {
            label: "defs",
            from: "// >> defs",
            to: "// << defs",
        }];
        let asm = assemble_with(src, &steps);
        assert!(asm.warnings.is_empty());
        assert_eq!(asm.text, "// >> defs\nmake(1);\nmake(2);\n");
    }

    #[test]
    fn test_loop_slice_by_prefix() {
        let src = "var T = [];\nfor (var i = 0; i < 4; i++) {\n  T.push({ n: i });\n}\ndone();";
        let steps = [Step::Loop {
            label: "table",
            prefix: "for (var i = 0",
        }];
        let asm = assemble_with(src, &steps);
        assert!(asm.warnings.is_empty());
        assert_eq!(asm.text, "for (var i = 0; i < 4; i++) {\n  T.push({ n: i });\n}\n");
    }

    #[test]
    fn test_truncated_declaration_warns() {
        let src = "var A = { x: { y: 1 }";
        let asm = assemble_with(src, &[Step::Decl("A")]);
        assert_eq!(asm.warnings.len(), 1);
        assert!(asm.warnings[0].contains("end of source"));
    }

    #[test]
    fn test_verbatim_comes_first() {
        let src = "var A = {x:1};";
        let steps = [
            Step::Verbatim {
                label: "prelude",
                text: "var REG = {};\n",
            },
            Step::Decl("A"),
        ];
        let asm = assemble_with(src, &steps);
        assert_eq!(asm.text, "var REG = {};\nvar A = {x:1};\n");
    }
}
