// SVT-AV1 rate control: CRF with a numeric preset and svtav1-params

use super::EncoderPolicy;
use crate::error::PolicyError;
use crate::params::{FfmpegParams, ParamPatch, Stage};

pub const DEFAULT_CRF: u32 = 30;
pub const DEFAULT_PRESET: &str = "5";

const MODE_NAMES: &[&str] = &["crf"];
const OWNED: &[(Stage, &str)] = &[(Stage::Output, "g"), (Stage::Output, "svtav1-params")];

/// Tuning target passed through `svtav1-params`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvtTune {
    Subjective = 0,
    Psnr = 1,
}

#[derive(Debug, Clone)]
pub struct SvtAv1Policy {
    pub crf: u32,
    /// Keyframe interval; `None` leaves the encoder default
    pub gop: Option<u32>,
    /// Film grain synthesis level, 0 disables it
    pub film_grain: u32,
    pub tune: SvtTune,
}

impl Default for SvtAv1Policy {
    fn default() -> Self {
        Self {
            crf: DEFAULT_CRF,
            gop: None,
            film_grain: 0,
            tune: SvtTune::Psnr,
        }
    }
}

impl SvtAv1Policy {
    /// Value of the `-svtav1-params` option
    pub fn svt_params(&self) -> String {
        let mut params = vec![format!("tune={}", self.tune as u8)];
        if self.film_grain != 0 {
            params.push(format!("film-grain={}", self.film_grain));
        }
        params.join(":")
    }
}

impl EncoderPolicy for SvtAv1Policy {
    fn name(&self) -> &'static str {
        "libsvtav1"
    }

    fn modes(&self) -> &'static [&'static str] {
        MODE_NAMES
    }

    fn mode(&self) -> &'static str {
        MODE_NAMES[0]
    }

    fn set_mode(&mut self, mode: &str) -> Result<(), PolicyError> {
        super::parse_mode(self.name(), mode, &[("crf", ())])
    }

    fn set_quality(&mut self, value: u32) {
        self.crf = value;
    }

    fn owned_keys(&self) -> &'static [(Stage, &'static str)] {
        OWNED
    }

    /// SVT-AV1 presets are numeric (-2 is the slowest); replace a named
    /// x264-style preset
    fn mount(&self, params: &FfmpegParams) -> Vec<ParamPatch> {
        let numeric = params
            .preset
            .as_deref()
            .map(|p| p.parse::<i32>().is_ok())
            .unwrap_or(false);
        if numeric {
            Vec::new()
        } else {
            vec![ParamPatch::Preset(Some(DEFAULT_PRESET.to_string()))]
        }
    }

    fn patches(&self, _params: &FfmpegParams) -> Vec<ParamPatch> {
        let mut patches = super::clear_owned(OWNED);
        patches.extend([
            ParamPatch::TwoPass(false),
            ParamPatch::VideoBitrate(None),
            ParamPatch::Crf(Some(self.crf)),
        ]);
        if let Some(gop) = self.gop {
            patches.push(ParamPatch::extra(Stage::Output, "g", gop.to_string()));
        }
        patches.push(ParamPatch::extra(Stage::Output, "svtav1-params", self.svt_params()));
        patches
    }
}
