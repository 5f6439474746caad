use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Local, Utc};
use unicode_width::UnicodeWidthStr;

use crate::task::{TaskCollection, TaskStats};

const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self {
            color: color && io::stdout().is_terminal(),
        }
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_tasks(&mut self, tasks: &TaskCollection) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_tasks(&mut out, tasks)
    }

    pub fn write_tasks<W: Write>(&self, out: &mut W, tasks: &TaskCollection) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks yet. Add something to get started.")?;
            return Ok(());
        }

        let headers = vec![
            "#".to_string(),
            "Done".to_string(),
            "Description".to_string(),
            "Added".to_string(),
            "Completed".to_string(),
            "ID".to_string(),
        ];

        let rows = tasks
            .iter()
            .enumerate()
            .map(|(idx, task)| {
                let position = self.paint(&(idx + 1).to_string(), "33");
                let done = if task.is_packed() {
                    self.paint("[x]", "32")
                } else {
                    "[ ]".to_string()
                };
                let description = if task.is_packed() {
                    self.paint(task.description(), "2")
                } else {
                    task.description().to_string()
                };
                let id = task.id().to_string();
                vec![
                    position,
                    done,
                    description,
                    format_time(task.created_at()),
                    task.done_at().map(format_time).unwrap_or_default(),
                    id.chars().take(SHORT_ID_LEN).collect(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    pub fn print_stats(&mut self, stats: TaskStats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        write_stats(&mut out, stats)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn write_stats<W: Write>(out: &mut W, stats: TaskStats) -> anyhow::Result<()> {
    writeln!(out, "{} tasks", stats.total)?;
    writeln!(out, "{} done", stats.done)?;
    writeln!(out, "{}% complete", stats.percent_complete)?;
    Ok(())
}

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn write_table<W: Write>(
    writer: &mut W,
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

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
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

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Renderer, write_stats};
    use crate::task::{Description, Task, TaskCollection, TaskId};

    #[test]
    fn empty_list_prints_hint() {
        let renderer = Renderer { color: false };
        let mut out = Vec::new();
        renderer
            .write_tasks(&mut out, &TaskCollection::new())
            .expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("No tasks yet"));
    }

    #[test]
    fn table_lists_tasks_in_order_with_done_marker() {
        let now = Utc.with_ymd_and_hms(2026, 4, 2, 10, 0, 0).single().expect("valid now");
        let mut tasks = TaskCollection::new();
        for text in ["Buy milk", "Pay rent"] {
            tasks.push(Task::new(TaskId::new(), Description::parse(text).expect("valid"), now));
        }
        let first = tasks.as_slice()[0].id();
        tasks.toggle(first, now);

        let renderer = Renderer { color: false };
        let mut out = Vec::new();
        renderer.write_tasks(&mut out, &tasks).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("[x]") && lines[2].contains("Buy milk"));
        assert!(lines[3].contains("[ ]") && lines[3].contains("Pay rent"));
    }

    #[test]
    fn stats_lines() {
        let mut out = Vec::new();
        write_stats(
            &mut out,
            crate::task::TaskStats {
                total: 4,
                done: 1,
                percent_complete: 25,
            },
        )
        .expect("write");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "4 tasks\n1 done\n25% complete\n"
        );
    }
}
