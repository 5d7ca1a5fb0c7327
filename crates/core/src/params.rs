use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default video bitrate in kbit/s (12 Mbps, YouTube's recommendation for
/// high frame rate 1080p)
pub const DEFAULT_BITRATE: u32 = 12_000;

/// Option stage of an ffmpeg invocation: before `-i`, right before the input,
/// or after the input and before the output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Global,
    Input,
    Output,
}

/// Free-text flag fragments typed by the user, appended verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOpts {
    pub global: String,
    pub input: String,
    pub output: String,
}

impl UserOpts {
    pub fn get(&self, stage: Stage) -> &str {
        match stage {
            Stage::Global => &self.global,
            Stage::Input => &self.input,
            Stage::Output => &self.output,
        }
    }

    fn get_mut(&mut self, stage: Stage) -> &mut String {
        match stage {
            Stage::Global => &mut self.global,
            Stage::Input => &mut self.input,
            Stage::Output => &mut self.output,
        }
    }
}

/// Insertion-ordered flag-name to value map for one stage.
///
/// A `None` value marks the key as absent: it keeps its slot but is never
/// emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOptions(Vec<(String, Option<String>)>);

impl StageOptions {
    pub fn set(&mut self, key: &str, value: Option<String>) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.0.retain(|(k, _)| k != key);
    }

    /// Value for `key`, or `None` when missing or marked absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Entries with a value, in insertion order
    pub fn present(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }

    pub fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }
}

/// Extra options pushed programmatically by encoder policies, kept apart from
/// [`UserOpts`] so user text is never clobbered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraOpts {
    pub global: StageOptions,
    pub input: StageOptions,
    pub output: StageOptions,
}

impl ExtraOpts {
    pub fn get(&self, stage: Stage) -> &StageOptions {
        match stage {
            Stage::Global => &self.global,
            Stage::Input => &self.input,
            Stage::Output => &self.output,
        }
    }

    pub fn get_mut(&mut self, stage: Stage) -> &mut StageOptions {
        match stage {
            Stage::Global => &mut self.global,
            Stage::Input => &mut self.input,
            Stage::Output => &mut self.output,
        }
    }
}

/// The current, possibly partial, encoding configuration.
///
/// Bitrates are in kbit/s. `input_file`/`output_file` stay unset until the
/// command for a concrete file is generated, and so does `pass_log`, the
/// two-pass statistics prefix (ffmpeg's working-directory default otherwise).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegParams {
    pub input_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub pass_log: Option<PathBuf>,
    pub vcodec: String,
    pub encoder: Option<String>,
    pub acodec: Option<String>,
    pub crf: Option<u32>,
    pub twopass: bool,
    pub vbitrate: Option<u32>,
    pub abitrate: Option<u32>,
    pub hwaccel: Option<String>,
    pub preset: Option<String>,
    pub speed: Option<u32>,
    pub pixel_format: Option<String>,
    pub faststart: bool,
    pub do_not_use_an: bool,
    pub custom_ext: Option<String>,
    pub useropts: UserOpts,
    pub extraopts: ExtraOpts,
}

/// One field-level change to [`FfmpegParams`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamPatch {
    Vcodec(String),
    Encoder(Option<String>),
    Acodec(Option<String>),
    Crf(Option<u32>),
    VideoBitrate(Option<u32>),
    AudioBitrate(Option<u32>),
    TwoPass(bool),
    Preset(Option<String>),
    Speed(Option<u32>),
    HwAccel(Option<String>),
    PixelFormat(Option<String>),
    FastStart(bool),
    DoNotUseAn(bool),
    CustomExt(Option<String>),
    InputFile(Option<PathBuf>),
    OutputFile(Option<PathBuf>),
    PassLog(Option<PathBuf>),
    UserOpts {
        stage: Stage,
        text: String,
    },
    ExtraOpt {
        stage: Stage,
        key: String,
        value: Option<String>,
    },
    ClearExtraOpt {
        stage: Stage,
        key: String,
    },
}

impl ParamPatch {
    pub fn extra(stage: Stage, key: &str, value: impl Into<String>) -> Self {
        Self::ExtraOpt {
            stage,
            key: key.to_string(),
            value: Some(value.into()),
        }
    }

    pub fn clear(stage: Stage, key: &str) -> Self {
        Self::ClearExtraOpt {
            stage,
            key: key.to_string(),
        }
    }
}

impl FfmpegParams {
    /// Fresh parameters for a configuration session
    pub fn new(vcodec: impl Into<String>) -> Self {
        Self {
            vcodec: vcodec.into(),
            ..Default::default()
        }
    }

    pub fn apply(&mut self, patch: ParamPatch) {
        match patch {
            ParamPatch::Vcodec(v) => self.vcodec = v,
            ParamPatch::Encoder(v) => self.encoder = non_empty(v),
            ParamPatch::Acodec(v) => self.acodec = non_empty(v),
            ParamPatch::Crf(v) => self.crf = v,
            ParamPatch::VideoBitrate(v) => self.vbitrate = v,
            ParamPatch::AudioBitrate(v) => self.abitrate = v,
            ParamPatch::TwoPass(v) => self.twopass = v,
            ParamPatch::Preset(v) => self.preset = non_empty(v),
            ParamPatch::Speed(v) => self.speed = v,
            ParamPatch::HwAccel(v) => self.hwaccel = non_empty(v),
            ParamPatch::PixelFormat(v) => self.pixel_format = non_empty(v),
            ParamPatch::FastStart(v) => self.faststart = v,
            ParamPatch::DoNotUseAn(v) => self.do_not_use_an = v,
            ParamPatch::CustomExt(v) => {
                self.custom_ext = non_empty(v.map(|e| e.trim_start_matches('.').to_string()))
            }
            ParamPatch::InputFile(v) => self.input_file = v,
            ParamPatch::OutputFile(v) => self.output_file = v,
            ParamPatch::PassLog(v) => self.pass_log = v,
            ParamPatch::UserOpts { stage, text } => *self.useropts.get_mut(stage) = text,
            ParamPatch::ExtraOpt { stage, key, value } => {
                self.extraopts.get_mut(stage).set(&key, value)
            }
            ParamPatch::ClearExtraOpt { stage, key } => self.extraopts.get_mut(stage).remove(&key),
        }
    }

    pub fn apply_all(&mut self, patches: impl IntoIterator<Item = ParamPatch>) {
        for patch in patches {
            self.apply(patch);
        }
    }

    /// Encoder identifier handed to `-c:v`
    pub fn effective_encoder(&self) -> &str {
        self.encoder.as_deref().unwrap_or(&self.vcodec)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
