//! Text helpers for card fields and log output.

/// Render a count in compact form: `999`, `1.2K`, `12K`, `3.4M`, `1.1B`.
pub fn compact_count(value: u64) -> String {
    const STEPS: [(u64, &str); 3] = [(1_000_000_000, "B"), (1_000_000, "M"), (1_000, "K")];

    for (divisor, suffix) in STEPS {
        if value >= divisor {
            let scaled = value as f64 / divisor as f64;
            let text = if scaled >= 10.0 {
                format!("{}", scaled.floor() as u64)
            } else {
                let tenths = (scaled * 10.0).floor() / 10.0;
                trim_fraction(format!("{tenths:.1}"))
            };
            return format!("{text}{suffix}");
        }
    }

    value.to_string()
}

/// Greedy word wrap into at most `max_lines` lines of `width` characters.
///
/// Overflowing text is cut at the last line and marked with an ellipsis.
/// Words longer than a line are hard-split.
pub fn wrap_text(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    if width == 0 || max_lines == 0 {
        return Vec::new();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut truncated = false;

    'words: for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while !word.is_empty() {
            let current_len = current.chars().count();
            let needed = if current.is_empty() {
                word.len()
            } else {
                current_len + 1 + word.len()
            };

            if needed <= width {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.extend(word.drain(..));
                continue;
            }

            if current.is_empty() {
                current.extend(word.drain(..width));
            }

            lines.push(std::mem::take(&mut current));
            if lines.len() == max_lines {
                truncated = true;
                break 'words;
            }
        }
    }

    if !truncated && !current.is_empty() {
        lines.push(current);
    }

    if truncated {
        if let Some(last) = lines.last_mut() {
            let mut chars: Vec<char> = last.chars().collect();
            chars.truncate(width.saturating_sub(1));
            while chars.last().is_some_and(|c| c.is_whitespace()) {
                chars.pop();
            }
            *last = chars.into_iter().collect::<String>() + "\u{2026}";
        }
    }

    lines
}

/// Format a byte count into IEC units (KiB, MiB) for log lines.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        return format!("{bytes} B");
    }
    format!("{} {}", trim_fraction(format!("{value:.1}")), UNITS[unit])
}

fn trim_fraction(mut text: String) -> String {
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    text
}
