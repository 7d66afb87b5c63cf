//! SubRip (`.srt`) subtitle reading, writing and shifting.
//!
//! A block is a line number, a `HH:MM:SS,mmm --> HH:MM:SS,mmm` range, one or
//! more text lines and a blank separator. Lines are never mutated in place:
//! shifting produces new values.

use crate::align::matcher::split_words;
use crate::error::{Result, SyncError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const TIME_SEPARATOR: &str = " --> ";

/// One subtitle block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitleLine {
    /// Block number as written in the file.
    pub number: u32,
    /// Start time in milliseconds.
    pub start_ms: u64,
    /// End time in milliseconds.
    pub end_ms: u64,
    /// Text lines joined with `\n`, exactly as read.
    pub text: String,
    /// Lowercased words used for matching (markup stripped).
    #[serde(skip)]
    pub words: Vec<String>,
}

impl SubtitleLine {
    pub fn new(number: u32, start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        let text = text.into();
        let words = split_words(&strip_markup(&text));
        Self {
            number,
            start_ms,
            end_ms,
            text,
            words,
        }
    }

    /// Returns this line moved by `shift_ms`.
    ///
    /// Fails when either bound would become negative.
    pub fn shifted(&self, shift_ms: i64) -> Result<Self> {
        let move_time = |time: u64| {
            time.checked_add_signed(shift_ms)
                .ok_or(SyncError::NegativeTimestamp {
                    line: self.number,
                    time_ms: i64::try_from(time).unwrap_or(i64::MAX).saturating_add(shift_ms),
                })
        };
        Ok(Self {
            start_ms: move_time(self.start_ms)?,
            end_ms: move_time(self.end_ms)?,
            ..self.clone()
        })
    }
}

/// Shifts every line by the same amount.
///
/// All-or-nothing: a single negative result fails the whole operation.
pub fn shift_lines(lines: &[SubtitleLine], shift_ms: i64) -> Result<Vec<SubtitleLine>> {
    lines.iter().map(|line| line.shifted(shift_ms)).collect()
}

/// Parses SRT text into subtitle lines.
pub fn parse(input: &str) -> Result<Vec<SubtitleLine>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut lines = Vec::new();
    let mut rows = input.lines().enumerate().peekable();

    loop {
        // Skip blank separators between blocks
        while rows.next_if(|(_, row)| row.trim().is_empty()).is_some() {}

        let Some((index, number_row)) = rows.next() else {
            break;
        };
        let number = number_row
            .trim()
            .parse::<u32>()
            .map_err(|_| SyncError::SubtitleParse {
                line: index + 1,
                message: format!("expected block number, got '{}'", number_row.trim()),
            })?;

        let (index, time_row) = rows.next().ok_or(SyncError::SubtitleParse {
            line: index + 2,
            message: "missing time range".to_string(),
        })?;
        let (start_ms, end_ms) =
            parse_time_range(time_row).map_err(|message| SyncError::SubtitleParse {
                line: index + 1,
                message,
            })?;

        let mut text_rows = Vec::new();
        while let Some((_, row)) = rows.next_if(|(_, row)| !row.trim().is_empty()) {
            text_rows.push(row);
        }

        lines.push(SubtitleLine::new(
            number,
            start_ms,
            end_ms,
            text_rows.join("\n"),
        ));
    }

    Ok(lines)
}

/// Serializes subtitle lines back to SRT text.
pub fn to_srt_string(lines: &[SubtitleLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&format!(
            "{}\n{}{}{}\n",
            line.number,
            format_time(line.start_ms),
            TIME_SEPARATOR,
            format_time(line.end_ms),
        ));
        // A block without text rows has no text line to write
        if !line.text.is_empty() {
            out.push_str(&line.text);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Reads and parses an SRT file.
pub fn read_file(path: &Path) -> Result<Vec<SubtitleLine>> {
    let contents = fs::read_to_string(path)?;
    parse(&contents)
}

/// Writes subtitle lines to an SRT file.
pub fn write_file(path: &Path, lines: &[SubtitleLine]) -> Result<()> {
    fs::write(path, to_srt_string(lines))?;
    Ok(())
}

/// Output path for a synchronized subtitle file.
///
/// `overwrite` keeps the input path, otherwise `<dir>/<stem>.<postfix>.srt`.
pub fn output_path(input: &Path, overwrite: bool, postfix: &str) -> PathBuf {
    if overwrite {
        return input.to_path_buf();
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "subtitles".to_string());
    input.with_file_name(format!("{stem}.{postfix}.srt"))
}

/// Parses `HH:MM:SS,mmm` (a `.` separator is accepted too).
pub fn parse_time(value: &str) -> std::result::Result<u64, String> {
    let value = value.trim();
    let (hms, millis) = value
        .split_once([',', '.'])
        .ok_or_else(|| format!("invalid time: {value}"))?;
    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 {
        return Err(format!("invalid time: {value}"));
    }
    let number = |s: &str| {
        s.trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid time: {value}"))
    };
    let scaled = [
        (number(parts[0])?, 3_600_000),
        (number(parts[1])?, 60_000),
        (number(parts[2])?, 1000),
        (number(millis)?, 1),
    ];
    scaled
        .iter()
        .try_fold(0u64, |total, &(n, unit)| {
            n.checked_mul(unit).and_then(|ms| total.checked_add(ms))
        })
        .ok_or_else(|| format!("invalid time: {value}"))
}

/// Formats milliseconds as `HH:MM:SS,mmm`.
pub fn format_time(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

fn parse_time_range(row: &str) -> std::result::Result<(u64, u64), String> {
    let (start, rest) = row
        .split_once(TIME_SEPARATOR.trim())
        .ok_or_else(|| format!("expected time range, got '{}'", row.trim()))?;
    // Some files carry position coordinates after the end time
    let end = rest.split_whitespace().next().unwrap_or("");
    Ok((parse_time(start)?, parse_time(end)?))
}

/// Removes `<i>`-style tags and `{\an8}`-style override blocks.
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut closing: Option<char> = None;
    for ch in text.chars() {
        match (closing, ch) {
            (None, '<') => closing = Some('>'),
            (None, '{') => closing = Some('}'),
            (None, '\n') => out.push(' '),
            (None, _) => out.push(ch),
            (Some(close), _) if ch == close => closing = None,
            (Some(_), _) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:03,500\nHello there.\n\n2\n00:01:02,250 --> 00:01:04,000\n<i>General Kenobi!</i>\nYou are a bold one.\n\n";

    #[test]
    fn test_parse_reads_blocks() {
        let lines = parse(SAMPLE).unwrap();
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0].number, 1);
        assert_eq!(lines[0].start_ms, 1000);
        assert_eq!(lines[0].end_ms, 3500);
        assert_eq!(lines[0].text, "Hello there.");
        assert_eq!(lines[0].words, vec!["hello", "there"]);

        assert_eq!(lines[1].start_ms, 62_250);
        assert_eq!(lines[1].text, "<i>General Kenobi!</i>\nYou are a bold one.");
        assert_eq!(
            lines[1].words,
            vec!["general", "kenobi", "you", "are", "a", "bold", "one"]
        );
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let lines = parse(SAMPLE).unwrap();
        assert_eq!(to_srt_string(&lines), SAMPLE);
    }

    #[test]
    fn test_parse_tolerates_crlf_bom_and_extra_blank_lines() {
        let input = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nOne\r\n\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\nTwo\r\n";
        let lines = parse(input).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "One");
        assert_eq!(lines[1].number, 2);
        assert_eq!(lines[1].text, "Two");
    }

    #[test]
    fn test_parse_ignores_position_coordinates() {
        let input = "1\n00:00:01,000 --> 00:00:02,000 X1:10 X2:20 Y1:5 Y2:9\nText\n";
        let lines = parse(input).unwrap();
        assert_eq!(lines[0].end_ms, 2000);
    }

    #[test]
    fn test_parse_rejects_bad_number() {
        let err = parse("one\n00:00:01,000 --> 00:00:02,000\nText\n").unwrap_err();
        match err {
            SyncError::SubtitleParse { line, .. } => assert_eq!(line, 1),
            other => panic!("Expected SubtitleParse, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_time_range() {
        let err = parse("1\n00:00:01 --> 00:00:02,000\nText\n").unwrap_err();
        match err {
            SyncError::SubtitleParse { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("invalid time"));
            }
            other => panic!("Expected SubtitleParse, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_overflowing_time() {
        let input = "1\n99999999999999:00:00,000 --> 99999999999999:00:01,000\nhello\n\n";
        match parse(input).unwrap_err() {
            SyncError::SubtitleParse { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("invalid time"), "{message}");
            }
            other => panic!("Expected SubtitleParse, got {other:?}"),
        }
        assert!(parse_time("00:00:18446744073709552,000").is_err());
    }

    #[test]
    fn test_block_without_text_round_trips() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\n\n2\n00:00:03,000 --> 00:00:04,000\nTwo\n\n";
        let lines = parse(input).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "");
        assert!(lines[0].words.is_empty());
        assert_eq!(to_srt_string(&lines), input);
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_time_format_and_parse() {
        assert_eq!(format_time(0), "00:00:00,000");
        assert_eq!(format_time(3_723_004), "01:02:03,004");
        assert_eq!(parse_time("01:02:03,004").unwrap(), 3_723_004);
        assert_eq!(parse_time("00:00:01.500").unwrap(), 1500);
        assert!(parse_time("garbage").is_err());
    }

    #[test]
    fn test_shift_by_zero_is_identity() {
        let lines = parse(SAMPLE).unwrap();
        assert_eq!(shift_lines(&lines, 0).unwrap(), lines);
    }

    #[test]
    fn test_shift_moves_start_and_end() {
        let lines = parse(SAMPLE).unwrap();
        let shifted = shift_lines(&lines, -500).unwrap();
        assert_eq!(shifted[0].start_ms, 500);
        assert_eq!(shifted[0].end_ms, 3000);
        assert_eq!(shifted[1].start_ms, 61_750);
        assert_eq!(shifted[1].text, lines[1].text);
    }

    #[test]
    fn test_shift_rejects_negative_result() {
        let lines = parse(SAMPLE).unwrap();
        let err = shift_lines(&lines, -1500).unwrap_err();
        match err {
            SyncError::NegativeTimestamp { line, time_ms } => {
                assert_eq!(line, 1);
                assert_eq!(time_ms, -500);
            }
            other => panic!("Expected NegativeTimestamp, got {other:?}"),
        }
    }

    #[test]
    fn test_output_path_postfix_and_overwrite() {
        let input = Path::new("/movies/film.srt");
        assert_eq!(output_path(input, true, "synced"), PathBuf::from("/movies/film.srt"));
        assert_eq!(
            output_path(input, false, "synced"),
            PathBuf::from("/movies/film.synced.srt")
        );
    }

    #[test]
    fn test_write_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.srt");
        let lines = parse(SAMPLE).unwrap();
        write_file(&path, &lines).unwrap();
        assert_eq!(read_file(&path).unwrap(), lines);
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("{\\an8}<b>Hi</b>\nthere"), "Hi there");
    }
}
