//! Plain-text table rendering for update results

use crate::session::MonitoringUpdateResults;

/// Render headers plus rows as a padded text table
pub fn render(headers: &[&str], results: &MonitoringUpdateResults) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();

    let all_rows = results
        .unit_rows
        .iter()
        .chain(std::iter::once(&results.overall_row));
    for row in all_rows.clone() {
        for (i, cell) in row.iter().enumerate() {
            if i >= widths.len() {
                widths.push(cell.len());
            } else if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let mut out = String::new();
    render_row(&mut out, headers.iter().map(|h| h.to_string()), &widths);
    let total: usize = widths.iter().sum::<usize>() + widths.len().saturating_sub(1) * 2;
    out.push_str(&"-".repeat(total));
    out.push('\n');
    for row in all_rows {
        render_row(&mut out, row.iter().cloned(), &widths);
    }
    out
}

fn render_row(out: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let mut first = true;
    for (i, cell) in cells.enumerate() {
        if !first {
            out.push_str("  ");
        }
        first = false;
        let width = widths.get(i).copied().unwrap_or(cell.len());
        out.push_str(&format!("{cell:<width$}"));
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_pads_columns() {
        let results = MonitoringUpdateResults {
            unit_rows: vec![
                vec!["cpu0".to_string(), "1.00".to_string()],
                vec!["cpu11".to_string(), "123.45".to_string()],
            ],
            overall_row: vec!["Overall".to_string(), "124.45".to_string()],
            overall_raw_values: vec![],
        };

        let text = render(&["Unit", "IPC"], &results);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Unit"));
        assert!(lines[1].starts_with("---"));
        assert!(lines[4].starts_with("Overall"));
        // All data lines share one width layout
        assert_eq!(lines[2].find("1.00"), lines[3].find("123.45"));
    }
}
