use crate::capabilities::run_tool;
use crate::error::ProbeError;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::Path;
use tracing::debug;

// Internal ffprobe JSON structures
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe the duration of `path` in microseconds.
///
/// Never returns a silent zero: the value is the denominator of progress
/// percentages, so any tool or parse failure is an error.
pub async fn probe_duration_us(ffprobe: &str, path: &Path) -> Result<u64, ProbeError> {
    let args: [&OsStr; 9] = [
        OsStr::new("-v"),
        OsStr::new("quiet"),
        OsStr::new("-of"),
        OsStr::new("json=c=1"),
        OsStr::new("-show_entries"),
        OsStr::new("format=duration"),
        OsStr::new("-sexagesimal"),
        OsStr::new("-i"),
        path.as_os_str(),
    ];
    let stdout = run_tool(ffprobe, args).await?;
    let duration = parse_duration_json(&stdout).map_err(|e| match e {
        ProbeError::MalformedOutput { reason, .. } => {
            ProbeError::malformed(ffprobe, format!("{} ({})", reason, path.display()))
        }
        other => other,
    })?;

    debug!("Duration of {}: {} us", path.display(), duration);
    Ok(duration)
}

/// Extract `format.duration` from ffprobe's JSON envelope
pub fn parse_duration_json(json: &str) -> Result<u64, ProbeError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| ProbeError::malformed("ffprobe", format!("invalid JSON: {}", e)))?;

    let raw = output
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| ProbeError::malformed("ffprobe", "no format.duration field"))?;

    parse_sexagesimal_us(&raw)
}

/// Convert `H:MM:SS.ffffff` into microseconds, truncating digits past the
/// sixth fractional place
pub fn parse_sexagesimal_us(value: &str) -> Result<u64, ProbeError> {
    let bad = || ProbeError::malformed("ffprobe", format!("bad duration {:?}", value));
    let number = |part: &str| -> Result<u64, ProbeError> {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        part.parse::<u64>().map_err(|_| bad())
    };

    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(bad());
    }

    let hours = number(parts[0])?;
    let minutes = number(parts[1])?;
    let (whole, fraction) = parts[2].split_once('.').unwrap_or((parts[2], ""));
    let seconds = number(whole)?;
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let micros: String = fraction.chars().chain(std::iter::repeat('0')).take(6).collect();
    let micros = micros.parse::<u64>().map_err(|_| bad())?;

    hours
        .checked_mul(60)
        .and_then(|m| m.checked_add(minutes))
        .and_then(|m| m.checked_mul(60))
        .and_then(|s| s.checked_add(seconds))
        .and_then(|s| s.checked_mul(1_000_000))
        .and_then(|us| us.checked_add(micros))
        .ok_or_else(bad)
}
