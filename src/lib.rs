pub mod cli;
pub mod extract;
pub mod model;
pub mod vm;
pub mod writer;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

pub fn run() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let summary = execute(&args.input, &args.output, vm::DEFAULT_BUDGET)?;
    println!("{summary}");
    Ok(())
}

/// The whole pipeline: read, extract + assemble, evaluate, write.
pub fn execute(
    input: &Path,
    out_dir: &Path,
    budget: Duration,
) -> anyhow::Result<writer::json::Summary> {
    // 1. ── Read ───────────────────────────────────────────────────────
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("Reading {}", input.display()))?;
    println!("Source loaded, {} bytes", source.len());

    // 2. ── Extract & assemble ─────────────────────────────────────────
    let assembled = extract::assemble(&source);
    for warning in &assembled.warnings {
        println!("warning: {warning}");
    }
    println!(
        "Assembled {} fragments, {} bytes",
        assembled.fragments.len(),
        assembled.text.len()
    );

    // 3. ── Debug artifact, always before evaluation ───────────────────
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Creating {}", out_dir.display()))?;
    writer::write_debug_artifact(out_dir, &assembled.text)
        .with_context(|| "Writing debug artifact")?;

    // 4. ── Evaluate in the sandbox ────────────────────────────────────
    let bindings = match vm::evaluate(&assembled.text, budget) {
        Ok(bindings) => bindings,
        Err(err) => {
            vm::report_diagnostic(&err, &assembled.text);
            return Err(err.into());
        }
    };

    // 5. ── Write data documents ───────────────────────────────────────
    writer::json::emit(&bindings, out_dir).with_context(|| "Writing data documents")
}
