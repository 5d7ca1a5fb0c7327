use crate::error::ProbeError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, warn};

/// Codecs shown when the user has not asked for the full list
pub const COMMON_VIDEO_CODECS: &[&str] = &["h264", "hevc", "vp9", "av1", "dnxhd"];

const CODEC_FLAGS_WIDTH: usize = 6;
const PIXEL_FORMAT_FLAGS_WIDTH: usize = 5;

static CODEC_FLAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z.]{6}$").expect("codec flag pattern"));
static PIXEL_FORMAT_FLAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z.]{5}$").expect("pixel format flag pattern"));
static WIDE_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("spacing pattern"));
static CODER_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\((?:decoders|encoders):[^)]*\)").expect("annotation pattern")
});
static ENCODER_ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(encoders:([^)]*)\)").expect("encoder pattern"));
static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"version\s+[^\d\s]*(\d+)\.(\d+)(?:\.(\d+))?").expect("version pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecInfo {
    pub flags: String,
    pub short_name: String,
    pub description: String,
    /// Encoder back-ends; empty when the codec name doubles as the encoder name
    pub encoders: Vec<String>,
}

impl CodecInfo {
    /// Encoder selected when the user picks this codec
    pub fn default_encoder(&self) -> &str {
        self.encoders
            .first()
            .map(String::as_str)
            .unwrap_or(&self.short_name)
    }

    pub fn supports_encoder(&self, encoder: &str) -> bool {
        if self.encoders.is_empty() {
            encoder == self.short_name
        } else {
            self.encoders.iter().any(|e| e == encoder)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecList {
    pub video: Vec<CodecInfo>,
    pub audio: Vec<CodecInfo>,
    /// Lines that did not match the expected tabular shape and were skipped
    pub anomalies: usize,
}

impl CodecList {
    pub fn find_video(&self, short_name: &str) -> Option<&CodecInfo> {
        self.video.iter().find(|c| c.short_name == short_name)
    }

    pub fn find_audio(&self, short_name: &str) -> Option<&CodecInfo> {
        self.audio.iter().find(|c| c.short_name == short_name)
    }

    /// Video codecs to display: everything, or only the common set
    pub fn displayed_video(&self, show_all: bool) -> Vec<&CodecInfo> {
        self.video
            .iter()
            .filter(|c| show_all || COMMON_VIDEO_CODECS.contains(&c.short_name.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl std::fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Run `ffmpeg -codecs` and parse the encoding-capable codecs
pub async fn probe_codecs(ffmpeg: &str) -> Result<CodecList, ProbeError> {
    let stdout = run_tool(ffmpeg, ["-hide_banner", "-codecs"]).await?;
    let codecs = parse_codecs(&stdout).map_err(|e| relabel(e, ffmpeg))?;
    debug!(
        "Probed {} video and {} audio codecs",
        codecs.video.len(),
        codecs.audio.len()
    );
    Ok(codecs)
}

/// Run `ffmpeg -pix_fmts` and parse the output-capable pixel formats
pub async fn probe_pixel_formats(ffmpeg: &str) -> Result<Vec<String>, ProbeError> {
    let stdout = run_tool(ffmpeg, ["-hide_banner", "-pix_fmts"]).await?;
    parse_pixel_formats(&stdout).map_err(|e| relabel(e, ffmpeg))
}

/// Run `ffmpeg -version` and parse the release number
pub async fn check_version(ffmpeg: &str) -> Result<ToolVersion, ProbeError> {
    let stdout = run_tool(ffmpeg, ["-version"]).await?;
    parse_version(&stdout).map_err(|e| relabel(e, ffmpeg))
}

/// Parse the text of `ffmpeg -codecs` into video and audio encoders
pub fn parse_codecs(output: &str) -> Result<CodecList, ProbeError> {
    let body = after_separator(output)
        .ok_or_else(|| ProbeError::malformed("ffmpeg", "codec listing has no separator line"))?;

    let mut list = CodecList::default();
    let mut seen_video = HashSet::new();
    let mut seen_audio = HashSet::new();

    for raw in body.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let Some(flags) = line.get(..CODEC_FLAGS_WIDTH) else {
            list.anomalies += 1;
            continue;
        };
        if !CODEC_FLAGS.is_match(flags) {
            list.anomalies += 1;
            continue;
        }

        let flag_bytes = flags.as_bytes();
        if flag_bytes[1] != b'E' {
            continue;
        }

        let rest = line[CODEC_FLAGS_WIDTH..].trim();
        let collapsed = WIDE_SPACES.replace_all(rest, " ");
        let (short_name, remainder) = collapsed
            .split_once(' ')
            .unwrap_or((&*collapsed, ""));
        if short_name.is_empty() {
            list.anomalies += 1;
            continue;
        }

        let encoders = ENCODER_ANNOTATION
            .captures(remainder)
            .map(|caps| caps[1].split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let description = CODER_ANNOTATION.replace_all(remainder, "").trim().to_string();

        let info = CodecInfo {
            flags: flags.to_string(),
            short_name: short_name.to_string(),
            description,
            encoders,
        };

        let (target, seen) = match flag_bytes[2] {
            b'V' => (&mut list.video, &mut seen_video),
            b'A' => (&mut list.audio, &mut seen_audio),
            _ => continue,
        };
        if !seen.insert(info.short_name.clone()) {
            list.anomalies += 1;
            continue;
        }
        target.push(info);
    }

    if list.anomalies > 0 {
        warn!("Skipped {} malformed codec listing lines", list.anomalies);
    }

    Ok(list)
}

/// Parse the text of `ffmpeg -pix_fmts` into output-capable format names
pub fn parse_pixel_formats(output: &str) -> Result<Vec<String>, ProbeError> {
    let body = after_separator(output).ok_or_else(|| {
        ProbeError::malformed("ffmpeg", "pixel format listing has no separator line")
    })?;

    let mut formats = Vec::new();
    let mut anomalies = 0usize;

    for raw in body.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let flags = match line.get(..PIXEL_FORMAT_FLAGS_WIDTH) {
            Some(flags) if PIXEL_FORMAT_FLAGS.is_match(flags) => flags,
            _ => {
                anomalies += 1;
                continue;
            }
        };
        if flags.as_bytes()[1] != b'O' {
            continue;
        }

        match line[PIXEL_FORMAT_FLAGS_WIDTH..].split_whitespace().next() {
            Some(name) => formats.push(name.to_string()),
            None => anomalies += 1,
        }
    }

    if anomalies > 0 {
        warn!("Skipped {} malformed pixel format lines", anomalies);
    }

    Ok(formats)
}

/// Parse `major.minor[.patch]` out of a `-version` banner.
/// Handles release banners like "ffmpeg version 7.1" or "ffmpeg version n6.1.1".
pub fn parse_version(output: &str) -> Result<ToolVersion, ProbeError> {
    let caps = VERSION.captures(output).ok_or_else(|| {
        ProbeError::malformed(
            "ffmpeg",
            format!(
                "no release number in version banner: {}",
                output.lines().next().unwrap_or_default()
            ),
        )
    })?;

    let number = |i: usize| -> Result<u32, ProbeError> {
        caps.get(i)
            .map(|m| m.as_str().parse::<u32>())
            .transpose()
            .map(|n| n.unwrap_or(0))
            .map_err(|e| ProbeError::malformed("ffmpeg", format!("bad version number: {}", e)))
    };

    Ok(ToolVersion {
        major: number(1)?,
        minor: number(2)?,
        patch: number(3)?,
    })
}

/// Run an external tool to completion and return its stdout.
///
/// A spawn failure or a non-zero exit both mean the tooling is unavailable.
pub(crate) async fn run_tool<I, S>(program: &str, args: I) -> Result<String, ProbeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| ProbeError::unavailable(program, format!("failed to execute: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::unavailable(
            program,
            format!("exited with {}: {}", output.status, stderr.trim()),
        ));
    }

    String::from_utf8(output.stdout)
        .map_err(|_| ProbeError::malformed(program, "output is not valid UTF-8"))
}

/// Everything after the first line made only of dashes
fn after_separator(output: &str) -> Option<&str> {
    let mut offset = 0;
    for line in output.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c == '-') {
            return Some(&output[offset..]);
        }
    }
    None
}

fn relabel(err: ProbeError, tool: &str) -> ProbeError {
    match err {
        ProbeError::MalformedOutput { reason, .. } => ProbeError::malformed(tool, reason),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CODECS: &str = "Codecs:
 D..... = Decoding supported
 .E.... = Encoding supported
 ..V... = Video codec
 ..A... = Audio codec
 ..S... = Subtitle codec
 -------
 D.VI.S 012v                 Uncompressed 4:2:2 10-bit
 DEV.L. h264                 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (decoders: h264 h264_qsv h264_cuvid ) (encoders: libx264 libx264rgb h264_nvenc h264_qsv )
 DEVIL. dnxhd                VC3/DNxHD
 DEA.L. aac                  AAC (Advanced Audio Coding) (decoders: aac aac_fixed )
 DES... ass                  ASS (Advanced SSA) subtitle (decoders: ssa ass ) (encoders: ssa ass )
";

    #[test]
    fn test_parse_codecs_partitions_and_encoders() {
        let list = parse_codecs(CODECS).unwrap();

        assert_eq!(list.video.len(), 2);
        assert_eq!(list.audio.len(), 1);
        assert_eq!(list.anomalies, 0);

        let h264 = list.find_video("h264").unwrap();
        assert_eq!(h264.flags, "DEV.L.");
        assert_eq!(h264.description, "H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10");
        assert_eq!(
            h264.encoders,
            vec!["libx264", "libx264rgb", "h264_nvenc", "h264_qsv"]
        );
        assert_eq!(h264.default_encoder(), "libx264");

        let dnxhd = list.find_video("dnxhd").unwrap();
        assert!(dnxhd.encoders.is_empty());
        assert_eq!(dnxhd.default_encoder(), "dnxhd");
        assert!(dnxhd.supports_encoder("dnxhd"));

        let aac = list.find_audio("aac").unwrap();
        assert_eq!(aac.description, "AAC (Advanced Audio Coding)");
        assert!(aac.encoders.is_empty());
    }

    #[test]
    fn test_parse_codecs_counts_anomalies() {
        let text = " -------\n DEV.L. h264  H.264\n ???\n DEV.L. h264  duplicate\n\n";
        let list = parse_codecs(text).unwrap();
        assert_eq!(list.video.len(), 1);
        assert_eq!(list.anomalies, 2);
    }

    #[test]
    fn test_parse_codecs_without_separator_is_malformed() {
        let err = parse_codecs("ffmpeg: command not found").unwrap_err();
        assert!(matches!(err, ProbeError::MalformedOutput { .. }));
    }

    #[test]
    fn test_displayed_video_filters_common() {
        let list = parse_codecs(CODECS).unwrap();
        let common: Vec<_> = list
            .displayed_video(false)
            .into_iter()
            .map(|c| c.short_name.as_str())
            .collect();
        assert_eq!(common, vec!["h264", "dnxhd"]);
    }

    #[test]
    fn test_parse_pixel_formats_keeps_output_capable() {
        let text = "Pixel formats:
I.... = Supported Input  format for conversion
.O... = Supported Output format for conversion
FLAGS NAME            NB_COMPONENTS BITS_PER_PIXEL BIT_DEPTHS
-----
IO... yuv420p                3             12      8-8-8
IO... yuv420p10le            3             15      10-10-10
I.... xyz12le                3             36      12-12-12
..H.. vaapi                  0              0      0
";
        let formats = parse_pixel_formats(text).unwrap();
        assert_eq!(formats, vec!["yuv420p", "yuv420p10le"]);
    }

    #[test]
    fn test_parse_version_variants() {
        let v = parse_version("ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023").unwrap();
        assert_eq!(v, ToolVersion { major: 6, minor: 1, patch: 1 });

        let v = parse_version("ffmpeg version n7.1 Copyright").unwrap();
        assert_eq!(v.to_string(), "7.1.0");

        assert!(parse_version("ffmpeg version N-113000-gabc Copyright").is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_tooling_unavailable() {
        let err = probe_codecs("/nonexistent/vencoder-ffmpeg").await.unwrap_err();
        assert!(matches!(err, ProbeError::ToolingUnavailable { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Arbitrary listing bodies never panic and every non-blank line is
        /// either an entry, an anomaly, or a non-encoder line
        #[test]
        fn prop_parse_codecs_is_total(lines in prop::collection::vec(".{0,40}", 0..20)) {
            let text = format!(" -------\n{}", lines.join("\n"));
            let list = parse_codecs(&text).unwrap();
            let non_blank = lines.iter().filter(|l| !l.trim().is_empty()).count();
            prop_assert!(list.video.len() + list.audio.len() + list.anomalies <= non_blank);
        }
    }
}
