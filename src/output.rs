use crate::error::CliError;
use crate::storage::to_stable_json;

pub struct Styler {
    color_enabled: bool,
}

impl Styler {
    pub fn new(color_enabled: bool) -> Self {
        Self { color_enabled }
    }

    fn wrap(&self, code: &str, s: &str) -> String {
        if !self.color_enabled {
            return s.to_string();
        }
        format!("{}{}\u{001b}[0m", code, s)
    }

    pub fn green(&self, s: &str) -> String {
        self.wrap("\u{001b}[32m", s)
    }

    pub fn yellow(&self, s: &str) -> String {
        self.wrap("\u{001b}[33m", s)
    }

    pub fn gray(&self, s: &str) -> String {
        self.wrap("\u{001b}[90m", s)
    }

    /// Checklist cell for a boolean field.
    pub fn check(&self, done: bool) -> String {
        if done {
            self.green("[x]")
        } else {
            self.gray("[ ]")
        }
    }
}

pub fn resolve_color_enabled(no_color_flag: bool) -> bool {
    if no_color_flag {
        return false;
    }
    std::env::var_os("NO_COLOR").is_none()
}

/// Display width with wide CJK/emoji/block characters counted as 2 columns.
/// Deterministic; never queries the terminal.
pub fn display_width(s: &str) -> usize {
    s.chars().map(|c| if is_wide_char(c) { 2 } else { 1 }).sum()
}

fn is_wide_char(c: char) -> bool {
    let cp = c as u32;
    (0x4E00..=0x9FFF).contains(&cp)
        || (0xAC00..=0xD7AF).contains(&cp)
        || (0xFF00..=0xFFEF).contains(&cp)
        || (0x1F300..=0x1F9FF).contains(&cp)
        || (0x2600..=0x27BF).contains(&cp)
        || (0x2580..=0x259F).contains(&cp)
}

fn pad_right(s: &str, width: usize) -> String {
    let dw = display_width(s);
    if dw >= width {
        return s.to_string();
    }
    format!("{}{}", s, " ".repeat(width - dw))
}

pub fn render_simple_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
    for row in rows.iter() {
        for (i, cell) in row.iter().enumerate() {
            let w = display_width(cell);
            match widths.get_mut(i) {
                Some(cur) => *cur = (*cur).max(w),
                None => widths.push(w),
            }
        }
    }

    let render_row = |cells: Vec<&str>| {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| pad_right(c, widths[i]))
            .collect::<Vec<String>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render_row(headers.to_vec())];
    for row in rows.iter() {
        lines.push(render_row(row.iter().map(|s| s.as_str()).collect()));
    }
    lines.join("\n")
}

/// `done` of `total` as a block bar, e.g. 12 of 30 juz.
pub fn render_progress_bar(done: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return "-".repeat(width);
    }
    let filled = ((done.min(total) as f64 / total as f64) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

pub fn print_line(s: &str) {
    println!("{}", s);
}

pub fn print_json<T: serde::Serialize>(obj: &T) -> Result<(), CliError> {
    let s = to_stable_json(obj).map_err(|e| CliError::io(e.to_string()))?;
    println!("{}", s);
    Ok(())
}
