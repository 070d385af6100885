//! Conflict-marker parser.
//!
//! Scans file text for `<<<<<<< HEAD` / `=======` / `>>>>>>> label` blocks
//! left behind by a merge or rebase and returns them as [`ConflictRegion`]s
//! in document order. Malformed blocks are simply not matched. Blocks
//! written with `merge.conflictStyle = diff3` (or `zdiff3`) are accepted;
//! their `|||||||` base section is not part of either side.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One conflict block within a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRegion {
    /// Text between the `<<<<<<< HEAD` line and the separator.
    pub ours: String,
    /// Text between the separator and the `>>>>>>>` line.
    pub theirs: String,
    /// Free text following `>>>>>>>` on the closing line.
    pub branch_label: String,
    /// The full original block, verbatim.
    pub marker: String,
    /// Byte offset of `marker` within the parsed content.
    pub offset: usize,
    /// 0-based line of the `<<<<<<<` line.
    pub start_line: usize,
    /// 0-based line of the `>>>>>>>` line (inclusive).
    pub end_line: usize,
}

impl ConflictRegion {
    /// Byte span of the block within the parsed content.
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.marker.len()
    }
}

/// Parse result for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConflictSet {
    pub file_path: String,
    /// Regions in ascending `start_line` order.
    pub regions: Vec<ConflictRegion>,
}

impl FileConflictSet {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

const OURS_START: &str = "<<<<<<< HEAD";
const BASE_START: &str = "|||||||";
const SEPARATOR: &str = "=======";
const THEIRS_END: &str = ">>>>>>>";

/// Whether `line` (without its terminator) is any conflict-marker line.
pub fn is_marker_line(line: &str) -> bool {
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.starts_with("<<<<<<<")
        || line.starts_with(THEIRS_END)
        || line.starts_with(BASE_START)
        || line == SEPARATOR
}

/// Whether any line of `text` is a conflict-marker line, complete block or
/// not.
pub fn contains_marker_line(text: &str) -> bool {
    text.lines().any(is_marker_line)
}

/// Scanner position inside a candidate block.
enum State {
    Outside,
    /// After `<<<<<<< HEAD`: block start offset and line, ours start offset.
    Ours { start: usize, line: usize, ours: usize },
    /// Inside a diff3 base section; ours is already closed.
    Base { start: usize, line: usize, ours: Range<usize> },
    /// After `=======`.
    Theirs { start: usize, line: usize, ours: Range<usize>, theirs: usize },
}

/// Side text between two marker lines, without the final line break.
fn side(content: &str, range: Range<usize>) -> String {
    let text = &content[range];
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text).to_string()
}

/// Stateless conflict-marker parser.
pub struct ConflictParser;

impl ConflictParser {
    /// Extract every well-formed conflict block from `content`.
    ///
    /// A single forward scan over lines. A block is abandoned as soon as a
    /// marker line appears out of order, so a malformed block never absorbs
    /// the block after it. diff3-style `|||||||` base sections are dropped
    /// from `ours`. A file without markers yields an empty set, never an
    /// error.
    pub fn parse(file_path: &str, content: &str) -> FileConflictSet {
        let mut regions = Vec::new();
        let mut state = State::Outside;
        let mut offset = 0;

        for (index, raw) in content.split_inclusive('\n').enumerate() {
            let line_start = offset;
            offset += raw.len();
            let line = raw.trim_end_matches(|c: char| c == '\n' || c == '\r');

            if line == OURS_START {
                if !matches!(state, State::Outside) {
                    debug!(path = file_path, line = index, "unterminated conflict block skipped");
                }
                state = State::Ours { start: line_start, line: index, ours: offset };
                continue;
            }
            if !is_marker_line(line) {
                continue;
            }

            state = match state {
                State::Outside => State::Outside,
                State::Ours { start, line: first, ours } if line.starts_with(BASE_START) => {
                    State::Base { start, line: first, ours: ours..line_start }
                }
                State::Ours { start, line: first, ours } if line == SEPARATOR => State::Theirs {
                    start,
                    line: first,
                    ours: ours..line_start,
                    theirs: offset,
                },
                State::Base { start, line: first, ours } if line == SEPARATOR => State::Theirs {
                    start,
                    line: first,
                    ours,
                    theirs: offset,
                },
                State::Theirs { start, line: first, ours, theirs } if line.starts_with(THEIRS_END) => {
                    let end = line_start + line.len();
                    regions.push(ConflictRegion {
                        ours: side(content, ours),
                        theirs: side(content, theirs..line_start),
                        branch_label: line[THEIRS_END.len()..].trim().to_string(),
                        marker: content[start..end].to_string(),
                        offset: start,
                        start_line: first,
                        end_line: index,
                    });
                    State::Outside
                }
                _ => {
                    debug!(path = file_path, line = index, "malformed conflict block skipped");
                    State::Outside
                }
            };
        }

        debug!(path = file_path, regions = regions.len(), "parsed conflict markers");

        FileConflictSet {
            file_path: file_path.to_string(),
            regions,
        }
    }

    /// Whether `content` contains at least one well-formed conflict block.
    pub fn has_conflicts(content: &str) -> bool {
        !Self::parse("", content).is_empty()
    }
}

/// Replace each region's block in `content` with its resolved text.
///
/// Regions paired with `None` are left untouched. Splicing goes by recorded
/// byte offset, so two textually identical blocks resolve independently.
pub fn splice_resolutions(content: &str, resolutions: &[(&ConflictRegion, Option<&str>)]) -> String {
    let mut ordered: Vec<_> = resolutions.iter().collect();
    ordered.sort_by_key(|(region, _)| region.offset);

    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for (region, text) in ordered {
        let span = region.span();
        if span.start < cursor || content.get(span.clone()) != Some(region.marker.as_str()) {
            debug!(offset = region.offset, "region does not match content, skipping");
            continue;
        }
        let Some(text) = text else { continue };
        out.push_str(&content[cursor..span.start]);
        out.push_str(text);
        cursor = span.end;
    }
    out.push_str(&content[cursor..]);
    out
}
