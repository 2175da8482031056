use serde::Serialize;
use tabled::{Table, Tabled};

use crate::cli::OutputFormat;

/// Renders `rows` as a table, or as one JSON object per line, per §7 of the
/// CLI surface. JSON mode is meant for scripting; one line per record keeps
/// it `jq`-friendly without wrapping the whole thing in an array.
pub fn render<T>(format: OutputFormat, rows: &[T])
where
    T: Tabled + Serialize,
{
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("(no rows)");
            } else {
                println!("{}", Table::new(rows));
            }
        }
        OutputFormat::Json => {
            for row in rows {
                match serde_json::to_string(row) {
                    Ok(line) => println!("{line}"),
                    Err(e) => eprintln!("failed to serialize row: {e}"),
                }
            }
        }
    }
}

pub fn render_one<T>(format: OutputFormat, row: &T)
where
    T: Tabled + Serialize,
{
    render(format, std::slice::from_ref(row));
}
