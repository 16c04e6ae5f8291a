//! Parser for `.description` files.
//!
//! ```text
//! album name
//! artist name
//!
//! 1 First Song - 0:00
//! 2 Second Song - 3:12
//! ```
//!
//! Every non-blank line after the artist is a track line. Lines that do not
//! fit the configured [`Grammar`] are reported as errors rather than skipped.

use std::fmt;

use regex;

/// Shape of a track line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grammar {
    /// `<time> - <title>` instead of `<title> - <time>`.
    pub time_first : bool,
    /// Titles are preceded by a track number.
    pub track_numbers : bool,
}

impl Default for Grammar {
    fn default() -> Self {
        Self { time_first : false, track_numbers : true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub number : Option<u32>,
    pub title : String,
    /// Start offset in seconds.
    pub start : u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumDescription {
    pub album : String,
    pub artist : String,
    pub tracks : Vec<TrackDescriptor>,
}

/// A track together with the range of the source it covers. `end` is `None`
/// for the last track, which runs to the end of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSpan<'a> {
    pub track : &'a TrackDescriptor,
    pub start : u64,
    pub end : Option<u64>,
}

impl TrackSpan<'_> {
    pub fn duration(&self) -> Option<u64> {
        self.end.map(|end| end - self.start)
    }
}

impl AlbumDescription {
    pub fn spans(&self) -> impl Iterator<Item = TrackSpan<'_>> {
        self.tracks.iter().enumerate().map(|(i, track)| TrackSpan {
            track,
            start : track.start,
            end : self.tracks.get(i + 1).map(|next| next.start),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("description line {line}, column {column}: {reason}\n  | {content}")]
pub struct ParseError {
    /// 1-based line number.
    pub line : usize,
    /// 1-based character column the problem was detected at.
    pub column : usize,
    pub content : String,
    pub reason : String,
}

/// Why a timestamp was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampError(String);

impl fmt::Display for TimestampError {
    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses `HH:MM:SS` or `MM:SS` into seconds.
pub fn parse_timestamp(timestamp : &str) -> Result<u64, TimestampError> {
    let parts = timestamp.split(':').collect::<Vec<_>>();
    let mut numbers = Vec::with_capacity(parts.len());
    for part in &parts {
        if part.is_empty() || !part.bytes().all(|x| x.is_ascii_digit()) {
            return Err(TimestampError(format!("'{}' is not a number", part)));
        }
        let number = part.parse::<u64>()
                .map_err(|_| TimestampError(format!("'{}' is out of range", part)))?;
        numbers.push(number);
    }
    match numbers.as_slice() {
        [hours, minutes, seconds] => {
            if *minutes >= 60 || *seconds >= 60 {
                return Err(TimestampError(format!("'{}' has minutes or seconds above 59", timestamp)));
            }
            hours.checked_mul(3600)
                    .and_then(|x| x.checked_add(minutes * 60 + seconds))
                    .ok_or_else(|| TimestampError(format!("'{}' is out of range", timestamp)))
        },
        [minutes, seconds] => {
            if *seconds >= 60 {
                return Err(TimestampError(format!("'{}' has seconds above 59", timestamp)));
            }
            minutes.checked_mul(60)
                    .and_then(|x| x.checked_add(*seconds))
                    .ok_or_else(|| TimestampError(format!("'{}' is out of range", timestamp)))
        },
        _ => Err(TimestampError(format!("expected HH:MM:SS or MM:SS, found '{}'", timestamp))),
    }
}

fn column_of(line : &str, byte_offset : usize) -> usize {
    line[..byte_offset].chars().count() + 1
}

struct LineParser {
    grammar : Grammar,
    re_separator : regex::Regex,
    re_numbered : regex::Regex,
}

impl LineParser {
    fn new(grammar : Grammar) -> Self {
        Self {
            grammar,
            re_separator : regex::Regex::new(r"\s+-\s+").unwrap(),
            // leading token holds the number, possibly decorated like `#3` or `03.`
            re_numbered : regex::Regex::new(r"^[^\s\d]*(\d+)\S*\s+(\S.*)$").unwrap(),
        }
    }

    fn parse(&self, line_number : usize, line : &str) -> Result<TrackDescriptor, ParseError> {
        let error = |offset : usize, reason : String| ParseError {
            line : line_number,
            column : column_of(line, offset),
            content : line.to_string(),
            reason,
        };
        // a title may itself contain ` - `, so split at the separator nearest the timestamp
        let separator = if self.grammar.time_first {
            self.re_separator.find(line)
        } else {
            self.re_separator.find_iter(line).last()
        };
        let Some(separator) = separator else {
            return Err(error(line.len(), "expected ` - ` between title and timestamp".to_string()));
        };
        let (head, tail) = (&line[..separator.start()], &line[separator.end()..]);
        let (time, time_offset, label, label_offset) = if self.grammar.time_first {
            (head, 0, tail, separator.end())
        } else {
            (tail, separator.end(), head, 0)
        };
        let time = time.trim();
        let time_offset = time_offset + (line[time_offset..].len() - line[time_offset..].trim_start().len());
        let start = parse_timestamp(time).map_err(|err| error(time_offset, err.to_string()))?;
        let label = label.trim();
        let (number, title) = if self.grammar.track_numbers {
            let Some(captures) = self.re_numbered.captures(label) else {
                return Err(error(label_offset, "expected a track number followed by a title".to_string()));
            };
            let number = captures[1].parse::<u32>()
                    .map_err(|_| error(label_offset, format!("track number '{}' is out of range", &captures[1])))?;
            (Some(number), captures[2].trim().to_string())
        } else {
            (None, label.to_string())
        };
        if title.is_empty() {
            return Err(error(label_offset, "missing track title".to_string()));
        }
        Ok(TrackDescriptor { number, title, start })
    }
}

/// Parses a whole description file. Start times must strictly increase.
pub fn parse(text : &str, grammar : Grammar) -> Result<AlbumDescription, ParseError> {
    let parser = LineParser::new(grammar);
    let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line.trim_end()));
    let mut header = |what : &str, expected_line : usize| -> Result<String, ParseError> {
        match lines.next() {
            Some((_, line)) if !line.trim().is_empty() => Ok(line.trim().to_string()),
            Some((line_number, line)) => Err(ParseError {
                line : line_number,
                column : 1,
                content : line.to_string(),
                reason : format!("expected the {} name", what),
            }),
            None => Err(ParseError {
                line : expected_line,
                column : 1,
                content : String::new(),
                reason : format!("file ends before the {} name", what),
            }),
        }
    };
    let album = header("album", 1)?;
    let artist = header("artist", 2)?;
    let mut tracks = Vec::<TrackDescriptor>::new();
    let mut last_line = 2;
    for (line_number, line) in lines {
        last_line = line_number;
        if line.trim().is_empty() {
            continue;
        }
        let track = parser.parse(line_number, line)?;
        if let Some(previous) = tracks.last() {
            if track.start <= previous.start {
                return Err(ParseError {
                    line : line_number,
                    column : 1,
                    content : line.to_string(),
                    reason : format!(
                        "track starts at {}s, which is not after the previous track ({}s)",
                        track.start, previous.start
                    ),
                });
            }
        }
        tracks.push(track);
    }
    if tracks.is_empty() {
        return Err(ParseError {
            line : last_line,
            column : 1,
            content : String::new(),
            reason : "no track lines found".to_string(),
        });
    }
    Ok(AlbumDescription { album, artist, tracks })
}
