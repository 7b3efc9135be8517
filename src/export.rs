use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::OutputRow;

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<'a, W: Write>(w: &mut W, cells: impl IntoIterator<Item = &'a str>) -> io::Result<()> {
    for (i, cell) in cells.into_iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\n")
}

/// Header plus one line per row, columns in [`OutputRow::COLUMNS`] order.
pub fn write_csv<W: Write>(mut w: W, rows: &[OutputRow]) -> io::Result<()> {
    write_row(&mut w, OutputRow::COLUMNS)?;
    for row in rows {
        write_row(&mut w, row.fields())?;
    }
    w.flush()
}

pub fn export_csv(path: &Path, rows: &[OutputRow]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_csv(BufWriter::new(file), rows)
        .with_context(|| format!("Failed to write {}", path.display()))
}
