//! Progress extraction from a worker's `stdlog` buffer (§4.5's only
//! supervisor-side consumer of the syslog parser).

const PROGRESS_ELEMENT: &str = "status@ridersdiscount";
const PROGRESS_PARAM: &str = "progress";

/// Parse only the last line of `stdlog`, pull `status@ridersdiscount`'s
/// `progress` parameter, and clamp it into `[0.0, 1.0]`.
///
/// Returns `None` on any parse failure or missing field; the caller leaves
/// `Instance.progress` untouched in that case, matching §4.5's "a parse
/// failure updates nothing" rule.
pub fn extract_progress(stdlog: &[u8]) -> Option<f64> {
    let last_line = stdlog.split(|&b| b == b'\n').filter(|l| !l.is_empty()).next_back()?;
    let record = procd_syslog::parse(last_line).ok()?;
    let element = record.structured_data.get(PROGRESS_ELEMENT)?;
    let value = element.get(PROGRESS_PARAM)?;
    value.parse::<f64>().ok().map(|p| p.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_progress_from_last_line() {
        let buf = b"<134>1 - - - - - [status@ridersdiscount progress=\"0.200\"]\n<134>1 - - - - - [status@ridersdiscount progress=\"0.750\"]";
        assert_eq!(extract_progress(buf), Some(0.75));
    }

    #[test]
    fn missing_element_yields_none() {
        let buf = b"<134>1 - - - - - -";
        assert_eq!(extract_progress(buf), None);
    }

    #[test]
    fn out_of_range_progress_is_clamped() {
        let buf = b"<134>1 - - - - - [status@ridersdiscount progress=\"1.5\"]";
        assert_eq!(extract_progress(buf), Some(1.0));
    }
}
