//! Line classification
//!
//! Each manifest line is classified exactly once into a `Line`. Attribute
//! values the rewriter needs (cue durations, segment durations) are parsed
//! here; `None` means the tag was recognised but its value could not be read.

/// Marker inserted where an elided ad break ended.
pub const DISCONTINUITY: &str = "#EXT-X-DISCONTINUITY";

const SPLICE_INFO: &str = "EXT-OATCLS-SCTE35";
const CUE_OUT: &str = "EXT-X-CUE-OUT";
const CUE_OUT_CONT: &str = "EXT-X-CUE-OUT-CONT";
const CUE_IN: &str = "EXT-X-CUE-IN";
const SEGMENT_DURATION: &str = "EXTINF";

#[derive(Debug, Clone, PartialEq)]
pub enum Line<'a> {
    /// Media segment or child playlist reference.
    Uri(&'a str),
    /// Vendor SCTE-35 splice payload. Always dropped.
    SpliceInfo,
    /// Start of an ad break, with its announced length in seconds.
    CueOut { duration: Option<f64> },
    /// Progress through the current ad break as declared by upstream.
    CueOutCont { elapsed: Option<f64> },
    /// End of an ad break.
    CueIn,
    /// `#EXTINF` segment duration.
    Duration(Option<f64>),
    /// Any other tag, comment or blank line.
    Other,
}

pub fn classify(line: &str) -> Line<'_> {
    if line.is_empty() {
        return Line::Other;
    }
    let Some(tag) = line.strip_prefix('#') else {
        return Line::Uri(line);
    };

    let (name, value) = match tag.split_once(':') {
        Some((name, value)) => (name, Some(value)),
        None => (tag, None),
    };

    match name {
        SPLICE_INFO => Line::SpliceInfo,
        CUE_OUT_CONT => Line::CueOutCont {
            elapsed: value
                .and_then(|v| attribute(v, "ElapsedTime"))
                .and_then(leading_seconds),
        },
        CUE_OUT => Line::CueOut {
            duration: value.and_then(cue_out_duration),
        },
        CUE_IN => Line::CueIn,
        SEGMENT_DURATION => Line::Duration(value.and_then(leading_seconds)),
        _ => Line::Other,
    }
}

/// `#EXT-X-CUE-OUT:30.0` and `#EXT-X-CUE-OUT:DURATION=30.0` both occur in the wild.
fn cue_out_duration(value: &str) -> Option<f64> {
    match attribute(value, "DURATION") {
        Some(duration) => leading_seconds(duration),
        None => leading_seconds(value),
    }
}

/// Look up `key` in a comma-separated `KEY=VALUE` attribute list.
fn attribute<'a>(list: &'a str, key: &str) -> Option<&'a str> {
    list.split(',').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        k.trim()
            .eq_ignore_ascii_case(key)
            .then(|| v.trim().trim_matches('"'))
    })
}

/// Parse the decimal number at the start of `value` (`6.006,` -> 6.006).
fn leading_seconds(value: &str) -> Option<f64> {
    let value = value.trim_start();
    let end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    value[..end].parse().ok()
}
