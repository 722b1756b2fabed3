//! Helpers for the URL-query stream request grammar
//! (`freq=11836&msys=dvbs2&pol=h&sr=27500&pids=0,16,17`).

use crate::error::RequestError;
use crate::mpegts::MAX_PIDS;

/// Iterate the `key=value` pairs of a request string. A leading `?` and empty
/// fragments are skipped; keys are lowercased for matching.
pub fn query_pairs(msg: &str) -> impl Iterator<Item = (String, &str)> {
    msg.trim_start_matches('?')
        .split('&')
        .filter(|fragment| !fragment.is_empty())
        .filter_map(|fragment| {
            let (key, value) = fragment.split_once('=')?;
            Some((key.trim().to_ascii_lowercase(), value.trim()))
        })
}

/// Extract a single key's value from a request string.
pub fn query_value<'a>(msg: &'a str, wanted: &str) -> Option<&'a str> {
    query_pairs(msg).find(|(key, _)| key == wanted).map(|(_, v)| v)
}

/// A parsed PID list literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PidSpec {
    /// `all`: every PID 0..0x1FFF.
    All,
    /// `none`: the empty set.
    None,
    /// Comma-separated decimal PIDs.
    List(Vec<u16>),
}

/// Parse a `pids=`/`addpids=`/`delpids=` value.
pub fn parse_pid_spec(key: &str, value: &str) -> Result<PidSpec, RequestError> {
    match value {
        "all" => Ok(PidSpec::All),
        "none" => Ok(PidSpec::None),
        _ => {
            let mut pids = Vec::new();
            for item in value.split(',') {
                let item = item.trim();
                if item.is_empty() {
                    continue;
                }
                let pid: u32 = item
                    .parse()
                    .map_err(|_| RequestError::invalid(key, value))?;
                if pid >= MAX_PIDS as u32 {
                    return Err(RequestError::PidOutOfRange(pid));
                }
                pids.push(pid as u16);
            }
            Ok(PidSpec::List(pids))
        }
    }
}

/// Format a PID set back into the comma-separated literal.
pub fn format_pid_list(pids: &[u16]) -> String {
    let mut out = String::new();
    for (i, pid) in pids.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&pid.to_string());
    }
    out
}
