//! Module I/O and side-file helpers shared by the `fixp` binary.

use std::fs;
use std::path::Path;

use fixp_core::ir::Module;
use fixp_core::Result;
use fixp_conv::ConversionRecord;

pub fn load_module(path: &Path) -> Result<Module> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn save_module(path: &Path, module: &Module) -> Result<()> {
    let text = serde_json::to_string_pretty(module)?;
    fs::write(path, text)?;
    Ok(())
}

/// One line per converted instruction: `<line> <col> <opcode> [marker]`.
pub fn write_annotation_file(path: &Path, records: &[ConversionRecord]) -> Result<()> {
    let mut out = String::new();
    for record in records {
        out.push_str(&record.to_line());
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}
