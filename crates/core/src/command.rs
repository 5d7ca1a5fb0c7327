// ffmpeg command line generation

use crate::params::{FfmpegParams, StageOptions, DEFAULT_BITRATE};
use std::path::Path;

pub const DEFAULT_PROGRAM: &str = "ffmpeg";

/// Placeholder shown in preview commands before a file is selected
pub const INPUT_PLACEHOLDER: &str = "{filename}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Separator chaining the two passes; the second only runs if the first succeeded
pub const PASS_SEPARATOR: &str = " && ";

/// Container extension for a video codec.
///
/// Matroska is used for every open codec (av1, vp8, vp9) so that any audio
/// codec can be copied alongside.
pub fn container_for(vcodec: &str) -> Option<&'static str> {
    match vcodec {
        "dnxhd" => Some("mov"),
        "h264" | "hevc" => Some("mp4"),
        "av1" | "vp8" | "vp9" => Some("mkv"),
        _ => None,
    }
}

/// Container the output will be written in: the custom extension when one is
/// set, otherwise the codec's default container
pub fn resolved_container(params: &FfmpegParams) -> Option<&str> {
    match params.custom_ext.as_deref() {
        Some(ext) if !ext.is_empty() => Some(ext),
        _ => container_for(&params.vcodec),
    }
}

/// Null sink the first pass of a two-pass encode writes to
pub fn null_sink() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

/// Generate the command for `params` using `ffmpeg` from `PATH`
pub fn generate(params: &FfmpegParams) -> String {
    generate_with(params, DEFAULT_PROGRAM)
}

/// Generate the command for `params` invoking `program`.
///
/// Returns a single invocation, or two invocations chained with
/// [`PASS_SEPARATOR`] when two-pass encoding is requested.
pub fn generate_with(params: &FfmpegParams, program: &str) -> String {
    let program = quote_program(program);

    let global = stage_fragment(
        &format!("-hwaccel {} -y", params.hwaccel.as_deref().unwrap_or("auto")),
        &params.useropts.global,
        &params.extraopts.global,
    );
    let input = stage_fragment("", &params.useropts.input, &params.extraopts.input);

    let mut output_extra = params.extraopts.output.clone();
    if let Some(pix_fmt) = params.pixel_format.as_deref().filter(|p| !p.is_empty()) {
        output_extra.set("pix_fmt", Some(pix_fmt.to_string()));
    }
    let output = stage_fragment("", &params.useropts.output, &output_extra);

    let input_file = quote_path(params.input_file.as_deref(), INPUT_PLACEHOLDER);
    let output_file = quote_path(params.output_file.as_deref(), OUTPUT_PLACEHOLDER);
    let faststart = faststart_flags(params);
    let preset = params.preset.as_ref().map(|p| format!("-preset {}", p));
    let audio = audio_flags(params);

    if params.twopass {
        let common = join(&[
            Some(global),
            Some(input),
            Some(format!("-i {}", input_file)),
            Some(format!("-c:v {}", params.effective_encoder())),
            Some(format!(
                "-b:v {}",
                video_bitrate(params.vbitrate.unwrap_or(DEFAULT_BITRATE))
            )),
            faststart,
            preset,
            Some("-progress -".to_string()),
            Some(output),
        ]);
        let audio_off = if params.do_not_use_an {
            "-vsync cfr"
        } else {
            "-an"
        };

        let first = join(&[
            Some(program.clone()),
            Some(common.clone()),
            Some(pass_flag(&params.vcodec, 1, params.pass_log.as_deref())),
            Some(audio_off.to_string()),
            Some(format!("-f null {}", null_sink())),
        ]);
        let second = join(&[
            Some(program),
            Some(common),
            Some(pass_flag(&params.vcodec, 2, params.pass_log.as_deref())),
            Some(audio),
            Some(output_file),
        ]);

        return format!("{}{}{}", first, PASS_SEPARATOR, second);
    }

    join(&[
        Some(program),
        Some(global),
        Some(input),
        Some(format!("-i {}", input_file)),
        Some(format!("-c:v {}", params.effective_encoder())),
        params.crf.map(|crf| format!("-crf {}", crf)),
        params.vbitrate.map(|b| format!("-b:v {}", video_bitrate(b))),
        faststart,
        preset,
        Some(audio),
        params.speed.map(|s| format!("-speed {}", s)),
        Some("-progress -".to_string()),
        Some(output),
        Some(output_file),
    ])
}

/// Pass selection flags; x265 takes its pass number and statistics file
/// through its own parameter string
pub fn pass_flag(vcodec: &str, pass: u8, log: Option<&Path>) -> String {
    match (vcodec == "hevc", log) {
        (true, None) => format!("-x265-params pass={}", pass),
        (true, Some(log)) => {
            let mut stats = log.as_os_str().to_os_string();
            stats.push(".x265.log");
            let value = format!(
                "pass={}:stats={}",
                pass,
                escape_x265_value(&stats.to_string_lossy())
            );
            format!("-x265-params {}", quote(&value))
        }
        (false, None) => format!("-pass {}", pass),
        (false, Some(log)) => format!(
            "-pass {} -passlogfile {}",
            pass,
            quote(&log.to_string_lossy())
        ),
    }
}

/// `-x265-params` is a `key=value:key=value` list; separators and escapes
/// inside a value need a backslash
fn escape_x265_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ':' | '=' | '\'') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Builds one stage: template defaults, then the user's raw text, then extra
/// options as `-key value` pairs. Later flags win inside ffmpeg.
fn stage_fragment(defaults: &str, user: &str, extra: &StageOptions) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !defaults.is_empty() {
        parts.push(defaults.to_string());
    }
    if !user.trim().is_empty() {
        parts.push(user.trim().to_string());
    }
    for (key, value) in extra.present() {
        if value.is_empty() {
            parts.push(format!("-{}", key));
        } else {
            parts.push(format!("-{} {}", key, value));
        }
    }
    parts.join(" ")
}

fn faststart_flags(params: &FfmpegParams) -> Option<String> {
    if params.faststart && resolved_container(params) == Some("mp4") {
        Some("-movflags +faststart".to_string())
    } else {
        None
    }
}

fn audio_flags(params: &FfmpegParams) -> String {
    let mut flags = format!("-c:a {}", params.acodec.as_deref().unwrap_or("copy"));
    if let Some(abitrate) = params.abitrate {
        flags.push_str(&format!(" -b:a {}k", abitrate));
    }
    flags
}

/// `0` is passed through bare: several encoders read `-b:v 0` as "no bitrate target"
fn video_bitrate(kbps: u32) -> String {
    if kbps == 0 {
        "0".to_string()
    } else {
        format!("{}k", kbps)
    }
}

fn quote_path(path: Option<&Path>, placeholder: &str) -> String {
    match path {
        Some(p) => quote(&p.to_string_lossy()),
        None => quote(placeholder),
    }
}

/// Double-quotes `value` so that POSIX word splitting gives it back unchanged
fn quote(value: &str) -> String {
    format!(
        "\"{}\"",
        value.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

fn quote_program(program: &str) -> String {
    if program.chars().any(char::is_whitespace) {
        quote(program)
    } else {
        program.to_string()
    }
}

fn join(parts: &[Option<String>]) -> String {
    parts
        .iter()
        .flatten()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
