use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Colors only when enabled and stdout is a terminal.
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color && io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, tasks), fields(count = tasks.len()))]
    pub fn write_task_table<W: Write>(
        &self,
        mut out: W,
        heading: &str,
        tasks: &[Task],
    ) -> anyhow::Result<()> {
        writeln!(out, "{heading}")?;
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }
        writeln!(out)?;

        let headers = vec!["ID".to_string(), "Done".to_string(), "Task".to_string()];

        let rows = tasks
            .iter()
            .map(|task| {
                let id = self.paint(&task.id.to_string(), "33");
                let (done, title) = if task.done {
                    ("x".to_string(), self.paint(&task.title, "2"))
                } else {
                    (String::new(), task.title.clone())
                };
                vec![id, done, title]
            })
            .collect();

        write_table(&mut out, headers, rows)?;

        let remaining = tasks.iter().filter(|t| !t.done).count();
        writeln!(out)?;
        writeln!(out, "{} tasks, {remaining} open", tasks.len())?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let last = column_count.saturating_sub(1);

    let header_line = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| pad(header, widths[idx], idx == last))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{header_line}")?;

    let rule = widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{rule}")?;

    for row in rows {
        let line = row
            .iter()
            .enumerate()
            .map(|(idx, cell)| pad(cell, widths[idx], idx == last))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{line}")?;
    }

    Ok(())
}

fn pad(cell: &str, width: usize, last: bool) -> String {
    if last {
        return cell.to_string();
    }
    let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
    format!("{cell}{}", " ".repeat(width.saturating_sub(visible_width)))
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
