//! Line-streaming record reader over an extracted dump.
//!
//! A dump is a preamble, a run of records each spanning an open marker line
//! through a close marker line, and a trailing footer. The reader hands out
//! one line at a time tagged with where it falls in its record, so a record
//! of any size passes through a single line buffer. Anything outside a record
//! after the preamble is skipped.

use std::io::{self, BufRead};

/// Line markers delimiting records, plus the footer written to close a partition.
#[derive(Debug, Clone)]
pub struct RecordFormat {
    /// Whole-line marker opening a record (line terminator excluded).
    pub open: String,
    /// Whole-line marker closing a record.
    pub close: String,
    /// Text appended after the last record of every partition.
    pub footer: String,
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self {
            open: "  <page>".to_string(),
            close: "  </page>".to_string(),
            footer: "</mediawiki>\n".to_string(),
        }
    }
}

/// Position of a line within its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLine {
    Open,
    Body,
    /// Last line of the record; the record is complete once this is written.
    Close,
}

pub struct RecordReader<R> {
    reader: R,
    format: RecordFormat,
    header: Option<String>,
    /// Open-marker line consumed while reading the header.
    pending: bool,
    line: String,
    in_record: bool,
    /// Lines seen so far in the current record.
    record_lines: usize,
    done: bool,
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R, format: RecordFormat) -> Self {
        Self {
            reader,
            format,
            header: None,
            pending: false,
            line: String::new(),
            in_record: false,
            record_lines: 0,
            done: false,
        }
    }

    /// Everything before the first record. Reads it on first call.
    pub fn header(&mut self) -> io::Result<&str> {
        if self.header.is_none() {
            let mut header = String::new();
            loop {
                self.line.clear();
                if self.reader.read_line(&mut self.line)? == 0 {
                    self.done = true;
                    break;
                }
                if strip_eol(&self.line) == self.format.open {
                    self.pending = true;
                    break;
                }
                header.push_str(&self.line);
            }
            self.header = Some(header);
        }
        Ok(self.header.as_deref().unwrap_or_default())
    }

    /// Advance to the next line belonging to a record, or None at end of
    /// input. The line itself is available from [`line`](Self::line) until
    /// the next call. A record still open at end of input is reported as
    /// `InvalidData`.
    pub fn next_line(&mut self) -> io::Result<Option<RecordLine>> {
        self.header()?;

        if self.pending {
            self.pending = false;
            self.in_record = true;
            self.record_lines = 1;
            return Ok(Some(RecordLine::Open));
        }

        loop {
            if self.done {
                return Ok(None);
            }
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                self.done = true;
                if self.in_record {
                    self.in_record = false;
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "input ended inside a record after {} lines",
                            self.record_lines
                        ),
                    ));
                }
                return Ok(None);
            }
            let bare = strip_eol(&self.line);
            if self.in_record {
                self.record_lines += 1;
                if bare == self.format.close {
                    self.in_record = false;
                    return Ok(Some(RecordLine::Close));
                }
                return Ok(Some(RecordLine::Body));
            }
            if bare == self.format.open {
                self.in_record = true;
                self.record_lines = 1;
                return Ok(Some(RecordLine::Open));
            }
        }
    }

    /// The line returned by the last `next_line`, terminator included.
    pub fn line(&self) -> &str {
        &self.line
    }
}
