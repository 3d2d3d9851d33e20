//! Ad-break elision and URI remapping
//!
//! Transition table, applied to each classified line in order:
//!
//! | line            | outside a break          | inside a break               |
//! |-----------------|--------------------------|------------------------------|
//! | URI             | keep, prefixed with base | drop                         |
//! | splice info     | drop                     | drop                         |
//! | cue-out-cont    | drop, record elapsed     | drop, record elapsed         |
//! | cue-out         | drop, enter break        | drop, warn, restart expected |
//! | cue-in          | warn, emit discontinuity | emit discontinuity, leave    |
//! | `#EXTINF`       | keep                     | drop, add to measured        |
//! | other           | keep                     | drop                         |
//!
//! Malformed cue attributes never fail the rewrite. They are logged, recorded
//! as `ParseWarning`s, and the line is handled as if the value were absent.

use std::fmt;

use tracing::{debug, warn};

use crate::line::{DISCONTINUITY, Line, classify};

/// Ad-break tracking for a single rewrite pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CueState {
    pub cued_out: bool,
    /// Length announced by `#EXT-X-CUE-OUT`.
    pub expected_duration: f64,
    /// Last `ElapsedTime` declared by `#EXT-X-CUE-OUT-CONT`.
    pub elapsed_duration: f64,
    /// Sum of `#EXTINF` durations seen inside the break.
    pub measured_duration: f64,
}

/// A break that was closed by `#EXT-X-CUE-IN`.
///
/// `measured` is diagnostic. It is not reconciled against `expected`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdBreak {
    pub expected: f64,
    pub elapsed: f64,
    pub measured: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number in the input manifest.
    pub line_number: usize,
    pub line: String,
    pub reason: &'static str,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: {} in {:?}",
            self.line_number, self.reason, self.line
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteReport {
    pub ad_breaks: Vec<AdBreak>,
    /// Break still open when the manifest ended (live edge inside an ad).
    pub open_break: Option<CueState>,
    pub uris_elided: usize,
    /// Cue-outs inside a break plus cue-ins outside one.
    pub unbalanced_cues: usize,
    pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub text: String,
    pub report: RewriteReport,
}

/// Rewrite one manifest document.
///
/// `base` is prepended verbatim to every URI line, so it should end with `/`.
/// Lines are split on `\n` and a trailing `\r` is discarded; the output is
/// joined with `\n`.
pub fn rewrite(text: &str, base: &str) -> Rewrite {
    let mut rewriter = Rewriter::new(base);
    for (index, raw) in text.split('\n').enumerate() {
        rewriter.push(index + 1, raw.strip_suffix('\r').unwrap_or(raw));
    }
    rewriter.finish()
}

struct Rewriter<'b> {
    base: &'b str,
    cue: CueState,
    out: Vec<String>,
    report: RewriteReport,
}

impl<'b> Rewriter<'b> {
    fn new(base: &'b str) -> Self {
        Self {
            base,
            cue: CueState::default(),
            out: Vec::new(),
            report: RewriteReport::default(),
        }
    }

    fn push(&mut self, line_number: usize, line: &str) {
        match classify(line) {
            Line::Uri(uri) => {
                if self.cue.cued_out {
                    debug!(uri, "eliding ad segment");
                    self.report.uris_elided += 1;
                } else {
                    self.out.push(format!("{}{uri}", self.base));
                }
            }
            Line::SpliceInfo => debug!("dropping splice info"),
            Line::CueOutCont { elapsed } => match elapsed {
                Some(elapsed) => self.cue.elapsed_duration = elapsed,
                None => self.warn(line_number, line, "unreadable ElapsedTime"),
            },
            Line::CueOut { duration } => {
                if self.cue.cued_out {
                    warn!(line_number, "cue-out while already cued out");
                    self.report.unbalanced_cues += 1;
                }
                self.cue.cued_out = true;
                match duration {
                    Some(duration) => {
                        self.cue.expected_duration = duration;
                        debug!(duration, "ad break started");
                    }
                    None => self.warn(line_number, line, "unreadable cue-out duration"),
                }
            }
            Line::CueIn => {
                if self.cue.cued_out {
                    let ad_break = AdBreak {
                        expected: self.cue.expected_duration,
                        elapsed: self.cue.elapsed_duration,
                        measured: self.cue.measured_duration,
                    };
                    debug!(
                        expected = ad_break.expected,
                        elapsed = ad_break.elapsed,
                        measured = ad_break.measured,
                        "ad break ended"
                    );
                    self.report.ad_breaks.push(ad_break);
                } else {
                    warn!(line_number, "cue-in without a preceding cue-out");
                    self.report.unbalanced_cues += 1;
                }
                self.cue = CueState::default();
                self.out.push(DISCONTINUITY.to_string());
            }
            Line::Duration(duration) if self.cue.cued_out => match duration {
                Some(duration) => self.cue.measured_duration += duration,
                None => self.warn(line_number, line, "unreadable segment duration"),
            },
            _ if self.cue.cued_out => debug!(line, "dropping line inside ad break"),
            Line::Duration(_) | Line::Other => self.out.push(line.to_string()),
        }
    }

    fn warn(&mut self, line_number: usize, line: &str, reason: &'static str) {
        let warning = ParseWarning {
            line_number,
            line: line.to_string(),
            reason,
        };
        warn!(%warning, "malformed cue tag");
        self.report.warnings.push(warning);
    }

    fn finish(mut self) -> Rewrite {
        if self.cue.cued_out {
            self.report.open_break = Some(self.cue);
        }
        Rewrite {
            text: self.out.join("\n"),
            report: self.report,
        }
    }
}
