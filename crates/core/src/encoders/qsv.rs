// Intel Quick Sync rate control for h264_qsv / hevc_qsv and vp9_qsv

use super::{clear_owned, mode_name, parse_mode, EncoderPolicy};
use crate::error::PolicyError;
use crate::params::{FfmpegParams, ParamPatch, Stage, DEFAULT_BITRATE};

pub const DEFAULT_GLOBAL_QUALITY: u32 = 18;
pub const DEFAULT_QP: u32 = 18;
pub const VP9_PRESET: &str = "medium";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QsvMode {
    /// Intelligent constant quality via `global_quality`
    Icq,
    Cbr,
    Vbr,
    Cqp,
}

const AVC_MODES: &[(&str, QsvMode)] = &[
    ("icq", QsvMode::Icq),
    ("cbr", QsvMode::Cbr),
    ("vbr", QsvMode::Vbr),
    ("cqp", QsvMode::Cqp),
];
const AVC_MODE_NAMES: &[&str] = &["icq", "cbr", "vbr", "cqp"];

const VP9_MODES: &[(&str, QsvMode)] = &[
    ("cbr", QsvMode::Cbr),
    ("vbr", QsvMode::Vbr),
    ("cqp", QsvMode::Cqp),
];
const VP9_MODE_NAMES: &[&str] = &["cbr", "vbr", "cqp"];

const AVC_OWNED: &[(Stage, &str)] = &[
    (Stage::Output, "global_quality"),
    (Stage::Output, "maxrate"),
    (Stage::Output, "q"),
];
const VP9_OWNED: &[(Stage, &str)] = &[
    (Stage::Input, "hwaccel_output_format"),
    (Stage::Output, "global_quality"),
    (Stage::Output, "maxrate"),
    (Stage::Output, "q"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Avc,
    Vp9,
}

#[derive(Debug, Clone)]
pub struct QsvPolicy {
    family: Family,
    pub mode: QsvMode,
    pub bitrate: u32,
    pub global_quality: u32,
    pub qp: u32,
}

impl QsvPolicy {
    /// Policy for h264_qsv and hevc_qsv
    pub fn avc() -> Self {
        Self {
            family: Family::Avc,
            mode: QsvMode::Icq,
            bitrate: DEFAULT_BITRATE,
            global_quality: DEFAULT_GLOBAL_QUALITY,
            qp: DEFAULT_QP,
        }
    }

    pub fn vp9() -> Self {
        Self {
            family: Family::Vp9,
            mode: QsvMode::Vbr,
            ..Self::avc()
        }
    }

    fn table(&self) -> &'static [(&'static str, QsvMode)] {
        match self.family {
            Family::Avc => AVC_MODES,
            Family::Vp9 => VP9_MODES,
        }
    }
}

impl EncoderPolicy for QsvPolicy {
    fn name(&self) -> &'static str {
        match self.family {
            Family::Avc => "qsv",
            Family::Vp9 => "vp9_qsv",
        }
    }

    fn modes(&self) -> &'static [&'static str] {
        match self.family {
            Family::Avc => AVC_MODE_NAMES,
            Family::Vp9 => VP9_MODE_NAMES,
        }
    }

    fn mode(&self) -> &'static str {
        mode_name(self.mode, self.table())
    }

    fn set_mode(&mut self, mode: &str) -> Result<(), PolicyError> {
        self.mode = parse_mode(self.name(), mode, self.table())?;
        Ok(())
    }

    fn set_bitrate(&mut self, kbps: u32) {
        self.bitrate = kbps;
    }

    fn set_quality(&mut self, value: u32) {
        match self.mode {
            QsvMode::Icq => self.global_quality = value,
            QsvMode::Cqp => self.qp = value,
            QsvMode::Cbr | QsvMode::Vbr => {}
        }
    }

    fn owned_keys(&self) -> &'static [(Stage, &'static str)] {
        match self.family {
            Family::Avc => AVC_OWNED,
            Family::Vp9 => VP9_OWNED,
        }
    }

    fn mount(&self, _params: &FfmpegParams) -> Vec<ParamPatch> {
        let mut patches = vec![ParamPatch::HwAccel(Some("qsv".to_string()))];
        if self.family == Family::Vp9 {
            patches.push(ParamPatch::Preset(Some(VP9_PRESET.to_string())));
        }
        patches
    }

    /// Hardware decoding set at mount goes away with the policy
    fn unmount(&self) -> Vec<ParamPatch> {
        let mut patches = clear_owned(self.owned_keys());
        patches.push(ParamPatch::HwAccel(None));
        patches
    }

    fn patches(&self, _params: &FfmpegParams) -> Vec<ParamPatch> {
        let mut patches = clear_owned(self.owned_keys());
        patches.extend([ParamPatch::TwoPass(false), ParamPatch::Crf(None)]);
        if self.family == Family::Vp9 {
            patches.push(ParamPatch::extra(Stage::Input, "hwaccel_output_format", "qsv"));
        }

        match self.mode {
            QsvMode::Icq => {
                patches.push(ParamPatch::VideoBitrate(None));
                patches.push(ParamPatch::extra(
                    Stage::Output,
                    "global_quality",
                    self.global_quality.to_string(),
                ));
            }
            QsvMode::Cbr => {
                patches.push(ParamPatch::VideoBitrate(Some(self.bitrate)));
                patches.push(ParamPatch::extra(
                    Stage::Output,
                    "maxrate",
                    format!("{}k", self.bitrate),
                ));
            }
            QsvMode::Vbr => patches.push(ParamPatch::VideoBitrate(Some(self.bitrate))),
            QsvMode::Cqp => {
                patches.push(ParamPatch::VideoBitrate(None));
                patches.push(ParamPatch::extra(Stage::Output, "q", self.qp.to_string()));
            }
        }
        patches
    }
}
