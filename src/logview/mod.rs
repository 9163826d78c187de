//! Log viewer: tail a captured agent log with time, grep and context filters
//!
//! Log lines are optionally prefixed `YYYY-MM-DD HH:MM:SS `; undated lines
//! are continuations of the previous dated record and inherit its filter
//! decision. Grep patterns OR together, case-insensitive by default, with
//! grep-style -A/-B/-C context joining.

use chrono::{Local, NaiveDateTime};
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SwarmError};
use crate::events::{self, AgentEvent};

const FOLLOW_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Default)]
pub struct LogViewOptions {
    /// Only lines newer than this long ago.
    pub since: Option<Duration>,
    /// Only lines older than this long ago.
    pub until: Option<Duration>,
    pub grep: Vec<String>,
    pub case_sensitive: bool,
    pub invert: bool,
    /// Context lines before each match (-B).
    pub before: usize,
    /// Context lines after each match (-A).
    pub after: usize,
    pub tail: Option<usize>,
    pub follow: bool,
    pub pretty: bool,
}

pub async fn view<W: Write>(path: &Path, opts: &LogViewOptions, out: &mut W) -> Result<()> {
    let patterns = compile_patterns(opts)?;
    if opts.follow {
        if opts.before > 0 || opts.after > 0 {
            tracing::warn!("context joining (-A/-B/-C) is disabled with --follow");
        }
        follow(path, opts, &patterns, out).await
    } else {
        let text = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = text.lines().collect();
        render_static(&lines, opts, &patterns, out)
    }
}

fn compile_patterns(opts: &LogViewOptions) -> Result<Vec<Regex>> {
    opts.grep
        .iter()
        .map(|p| {
            let pattern = if opts.case_sensitive {
                p.clone()
            } else {
                format!("(?i){}", p)
            };
            Regex::new(&pattern)
                .map_err(|e| SwarmError::Usage(format!("bad grep pattern '{}': {}", p, e)))
        })
        .collect()
}

fn render_static<W: Write>(
    lines: &[&str],
    opts: &LogViewOptions,
    patterns: &[Regex],
    out: &mut W,
) -> Result<()> {
    let kept = time_filter(lines, opts);
    let kept = match opts.tail {
        Some(n) if kept.len() > n => &kept[kept.len() - n..],
        _ => &kept[..],
    };

    if patterns.is_empty() {
        for line in kept {
            emit(out, line, opts.pretty)?;
        }
        return Ok(());
    }

    let matches: Vec<usize> = kept
        .iter()
        .enumerate()
        .filter(|(_, line)| matches_grep(line, patterns) != opts.invert)
        .map(|(i, _)| i)
        .collect();

    let windows = context_windows(&matches, opts.before, opts.after, kept.len());
    for (wi, (start, end)) in windows.iter().enumerate() {
        if wi > 0 {
            writeln!(out, "--")?;
        }
        for line in &kept[*start..=*end] {
            emit(out, line, opts.pretty)?;
        }
    }
    Ok(())
}

async fn follow<W: Write>(
    path: &Path,
    opts: &LogViewOptions,
    patterns: &[Regex],
    out: &mut W,
) -> Result<()> {
    // Print the existing (filtered) tail first, then poll for growth.
    let mut offset = {
        let text = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = text.lines().collect();
        let mut no_context = opts.clone();
        no_context.before = 0;
        no_context.after = 0;
        render_static(&lines, &no_context, patterns, out)?;
        text.len() as u64
    };
    out.flush()?;

    let mut included_last = true;
    loop {
        tokio::time::sleep(FOLLOW_POLL).await;
        let len = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => continue,
        };
        if len < offset {
            // Truncated underneath us; start over from the top.
            offset = 0;
        }
        if len == offset {
            continue;
        }
        let chunk = read_from(path, offset)?;
        offset += chunk.len() as u64;
        for line in chunk.lines() {
            let dated = parse_timestamp(line);
            if let Some(ts) = dated {
                included_last = in_window(ts, opts);
            }
            if !included_last {
                continue;
            }
            if !patterns.is_empty() && (matches_grep(line, patterns) == opts.invert) {
                continue;
            }
            emit(out, line, opts.pretty)?;
        }
        out.flush()?;
    }
}

fn read_from(path: &Path, offset: u64) -> Result<String> {
    use std::io::{Read, Seek, SeekFrom};
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    Ok(buf)
}

fn emit<W: Write>(out: &mut W, line: &str, pretty: bool) -> Result<()> {
    if pretty {
        let body = strip_timestamp(line);
        if let Some(event) = AgentEvent::parse(body) {
            if let Some(text) = events::render(&event) {
                writeln!(out, "{}", text)?;
            }
            return Ok(());
        }
    }
    writeln!(out, "{}", line)?;
    Ok(())
}

/// Keep lines inside the since/until window; undated continuation lines
/// follow the decision made for the previous dated line.
fn time_filter<'a>(lines: &[&'a str], opts: &LogViewOptions) -> Vec<&'a str> {
    if opts.since.is_none() && opts.until.is_none() {
        return lines.to_vec();
    }
    let mut kept = Vec::new();
    let mut included_last = true;
    for line in lines {
        if let Some(ts) = parse_timestamp(line) {
            included_last = in_window(ts, opts);
        }
        if included_last {
            kept.push(*line);
        }
    }
    kept
}

fn in_window(ts: NaiveDateTime, opts: &LogViewOptions) -> bool {
    let now = Local::now().naive_local();
    if let Some(since) = opts.since {
        let floor = now - chrono::Duration::from_std(since).unwrap_or(chrono::Duration::zero());
        if ts < floor {
            return false;
        }
    }
    if let Some(until) = opts.until {
        let ceil = now - chrono::Duration::from_std(until).unwrap_or(chrono::Duration::zero());
        if ts > ceil {
            return false;
        }
    }
    true
}

fn matches_grep(line: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|re| re.is_match(line))
}

/// Timestamp prefix of a log line, if present.
fn parse_timestamp(line: &str) -> Option<NaiveDateTime> {
    if line.len() < 19 || !line.is_char_boundary(19) {
        return None;
    }
    NaiveDateTime::parse_from_str(&line[..19], "%Y-%m-%d %H:%M:%S").ok()
}

fn strip_timestamp(line: &str) -> &str {
    if parse_timestamp(line).is_some() {
        line[19..].trim_start()
    } else {
        line
    }
}

/// Merge per-match context windows; overlapping or adjacent windows join,
/// the rest stay separate (the caller prints `--` between them). Windows
/// clip at the edges of the input.
fn context_windows(
    matches: &[usize],
    before: usize,
    after: usize,
    len: usize,
) -> Vec<(usize, usize)> {
    let mut windows: Vec<(usize, usize)> = Vec::new();
    for &m in matches {
        let start = m.saturating_sub(before);
        let end = (m + after).min(len.saturating_sub(1));
        match windows.last_mut() {
            Some((_, prev_end)) if start <= *prev_end + 1 => {
                *prev_end = (*prev_end).max(end);
            }
            _ => windows.push((start, end)),
        }
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(lines: &[&str], opts: &LogViewOptions) -> Vec<String> {
        let patterns = compile_patterns(opts).unwrap();
        let mut out = Vec::new();
        render_static(lines, opts, &patterns, &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn grep_is_case_insensitive_by_default() {
        let lines = ["ERROR: boom", "all fine", "error again"];
        let opts = LogViewOptions {
            grep: vec!["error".to_string()],
            ..Default::default()
        };
        assert_eq!(render(&lines, &opts), vec!["ERROR: boom", "error again"]);

        let opts = LogViewOptions {
            grep: vec!["error".to_string()],
            case_sensitive: true,
            ..Default::default()
        };
        assert_eq!(render(&lines, &opts), vec!["error again"]);
    }

    #[test]
    fn multiple_patterns_or_together() {
        let lines = ["alpha", "beta", "gamma"];
        let opts = LogViewOptions {
            grep: vec!["alpha".to_string(), "gamma".to_string()],
            ..Default::default()
        };
        assert_eq!(render(&lines, &opts), vec!["alpha", "gamma"]);
    }

    #[test]
    fn invert_negates_the_match() {
        let lines = ["keep", "drop this", "keep too"];
        let opts = LogViewOptions {
            grep: vec!["drop".to_string()],
            invert: true,
            ..Default::default()
        };
        assert_eq!(render(&lines, &opts), vec!["keep", "keep too"]);
    }

    #[test]
    fn context_windows_merge_and_separate() {
        // Matches at 2 and 8 with one line of context: two windows with a
        // separator.
        let lines = ["0", "1", "x2", "3", "4", "5", "6", "7", "x8", "9"];
        let opts = LogViewOptions {
            grep: vec!["x".to_string()],
            before: 1,
            after: 1,
            ..Default::default()
        };
        assert_eq!(
            render(&lines, &opts),
            vec!["1", "x2", "3", "--", "7", "x8", "9"]
        );
    }

    #[test]
    fn overlapping_windows_join_without_separator() {
        let lines = ["0", "x1", "2", "x3", "4"];
        let opts = LogViewOptions {
            grep: vec!["x".to_string()],
            before: 1,
            after: 1,
            ..Default::default()
        };
        assert_eq!(render(&lines, &opts), vec!["0", "x1", "2", "x3", "4"]);
    }

    #[test]
    fn window_clips_at_file_tail_without_trailing_separator() {
        let lines = ["0", "1", "x2"];
        let opts = LogViewOptions {
            grep: vec!["x".to_string()],
            before: 0,
            after: 3,
            ..Default::default()
        };
        assert_eq!(render(&lines, &opts), vec!["x2"]);
    }

    #[test]
    fn tail_keeps_the_last_lines() {
        let lines = ["a", "b", "c", "d"];
        let opts = LogViewOptions {
            tail: Some(2),
            ..Default::default()
        };
        assert_eq!(render(&lines, &opts), vec!["c", "d"]);
    }

    #[test]
    fn undated_lines_follow_their_dated_predecessor() {
        let old = (Local::now() - chrono::Duration::hours(3))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let recent = (Local::now() - chrono::Duration::minutes(5))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let l1 = format!("{} old entry", old);
        let l2 = "  old continuation";
        let l3 = format!("{} recent entry", recent);
        let l4 = "  recent continuation";
        let lines = [l1.as_str(), l2, l3.as_str(), l4];

        let opts = LogViewOptions {
            since: Some(Duration::from_secs(3600)),
            ..Default::default()
        };
        assert_eq!(
            render(&lines, &opts),
            vec![l3.as_str(), "  recent continuation"]
        );
    }

    #[test]
    fn timestamp_parsing_tolerates_garbage() {
        assert!(parse_timestamp("2026-08-01 12:00:00 hello").is_some());
        assert!(parse_timestamp("not a timestamp at all").is_none());
        assert!(parse_timestamp("short").is_none());
    }

    #[test]
    fn pretty_mode_renders_events_and_passes_text() {
        let lines = [
            r#"{"type":"tool_call","tool_call":{"Read":{}}}"#,
            "plain line",
        ];
        let opts = LogViewOptions {
            pretty: true,
            ..Default::default()
        };
        assert_eq!(render(&lines, &opts), vec!["→ Read", "plain line"]);
    }
}
