//! Output artifacts: the pre-evaluation debug text and the JSON
//! data documents.

pub mod json;

use std::fs;
use std::io;
use std::path::Path;

/// Reserved name for the assembled executable text. Written on every
/// run before evaluation, so a failing run is reproducible from it.
pub const DEBUG_ARTIFACT: &str = "_assembled.js";

pub fn write_debug_artifact(out_dir: &Path, assembled: &str) -> io::Result<()> {
    fs::write(out_dir.join(DEBUG_ARTIFACT), assembled)
}
