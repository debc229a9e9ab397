use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header. Cells past the header count are printed unpadded.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let widths = rows.iter().fold(
        headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>(),
        |mut widths, row| {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
            widths
        },
    );

    println!("{}", render_row(&widths, headers.iter().copied()));
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", rule.join("  "));
    for row in &rows {
        println!("{}", render_row(&widths, row.iter().map(String::as_str)));
    }
}

fn render_row<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) -> String {
    let line: Vec<String> = cells
        .enumerate()
        .map(|(i, cell)| match widths.get(i) {
            Some(&w) => format!("{cell:<w$}"),
            None => cell.to_string(),
        })
        .collect();
    line.join("  ").trim_end().to_string()
}
