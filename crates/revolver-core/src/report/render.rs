use super::{Report, ReportNode, Status};
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};

const HEADERS: [&str; 5] = ["ROTATION", "PROVIDER", "STATUS", "SUMMARY", "ERROR"];
const STATUS_COL: usize = 2;

impl Report {
    /// Write the tree as a borderless table: one row per rotation (depth 1)
    /// followed by one row per descendant, indented under PROVIDER.
    pub fn render(&self, w: &mut impl Write, color: bool) -> io::Result<()> {
        let mut rows: Vec<[String; 5]> = Vec::new();
        for rotation in &self.root().children {
            rows.push([
                rotation.name.clone(),
                String::new(),
                status_cell(rotation.status),
                rotation.summary.clone(),
                rotation.error.clone(),
            ]);
            for child in &rotation.children {
                push_rows(&mut rows, child, 0);
            }
        }

        let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.len()).collect();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        write_row(w, &header, &widths, None)?;
        for row in &rows {
            let style = if color { status_style(&row[STATUS_COL]) } else { None };
            write_row(w, row, &widths, style)?;
        }
        Ok(())
    }
}

fn push_rows(rows: &mut Vec<[String; 5]>, node: &ReportNode, depth: usize) {
    rows.push([
        String::new(),
        format!("{}{}", "  ".repeat(depth), node.name),
        status_cell(node.status),
        node.summary.clone(),
        node.error.clone(),
    ]);
    for child in &node.children {
        push_rows(rows, child, depth + 1);
    }
}

fn status_cell(status: Status) -> String {
    match status {
        Status::Pending => String::new(),
        other => other.as_str().to_string(),
    }
}

fn status_style(cell: &str) -> Option<Style> {
    let base = Style::new().bright_black().bold();
    match cell {
        "SUCCESS" => Some(base.on_green()),
        "SKIP" => Some(base.on_cyan()),
        "ERROR" => Some(base.on_red()),
        _ => None,
    }
}

fn write_row(
    w: &mut impl Write,
    cells: &[String],
    widths: &[usize],
    status_style: Option<Style>,
) -> io::Result<()> {
    let last = cells.len() - 1;
    let mut line = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i == last {
            line.push_str(cell);
            break;
        }
        let pad = widths[i].saturating_sub(cell.chars().count());
        match status_style {
            Some(style) if i == STATUS_COL => {
                line.push_str(&cell.style(style).to_string());
            }
            _ => line.push_str(cell),
        }
        line.push_str(&" ".repeat(pad + 2));
    }
    writeln!(w, "{}", line.trim_end())
}
