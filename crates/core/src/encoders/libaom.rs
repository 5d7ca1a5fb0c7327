// libaom-av1 rate control

use super::{mode_name, parse_mode, EncoderPolicy};
use crate::error::PolicyError;
use crate::params::{FfmpegParams, ParamPatch, DEFAULT_BITRATE};

pub const DEFAULT_CRF: u32 = 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AomMode {
    /// Constant quality: CRF only
    Constant,
    /// Constrained quality: CRF capped by a bitrate
    Constrained,
    /// 1-pass average bitrate
    Abr,
    /// 2-pass average bitrate
    TwoPassAbr,
}

const MODES: &[(&str, AomMode)] = &[
    ("constant", AomMode::Constant),
    ("constrained", AomMode::Constrained),
    ("abr", AomMode::Abr),
    ("2pass-abr", AomMode::TwoPassAbr),
];
const MODE_NAMES: &[&str] = &["constant", "constrained", "abr", "2pass-abr"];

#[derive(Debug, Clone)]
pub struct LibaomPolicy {
    pub mode: AomMode,
    pub crf: u32,
    pub bitrate: u32,
}

impl Default for LibaomPolicy {
    fn default() -> Self {
        Self {
            mode: AomMode::Constant,
            crf: DEFAULT_CRF,
            bitrate: DEFAULT_BITRATE,
        }
    }
}

impl EncoderPolicy for LibaomPolicy {
    fn name(&self) -> &'static str {
        "libaom-av1"
    }

    fn modes(&self) -> &'static [&'static str] {
        MODE_NAMES
    }

    fn mode(&self) -> &'static str {
        mode_name(self.mode, MODES)
    }

    fn set_mode(&mut self, mode: &str) -> Result<(), PolicyError> {
        self.mode = parse_mode(self.name(), mode, MODES)?;
        Ok(())
    }

    fn set_bitrate(&mut self, kbps: u32) {
        self.bitrate = kbps;
    }

    fn set_quality(&mut self, value: u32) {
        self.crf = value;
    }

    fn patches(&self, _params: &FfmpegParams) -> Vec<ParamPatch> {
        let (crf, bitrate) = match self.mode {
            AomMode::Constant => (Some(self.crf), None),
            AomMode::Constrained => (Some(self.crf), Some(self.bitrate)),
            AomMode::Abr | AomMode::TwoPassAbr => (None, Some(self.bitrate)),
        };

        vec![
            ParamPatch::TwoPass(self.mode == AomMode::TwoPassAbr),
            ParamPatch::Crf(crf),
            ParamPatch::VideoBitrate(bitrate),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::generate;

    fn command_for(policy: &LibaomPolicy) -> String {
        let mut params = FfmpegParams::new("av1");
        params.apply(ParamPatch::Encoder(Some("libaom-av1".into())));
        params.apply_all(policy.patches(&params));
        generate(&params)
    }

    #[test]
    fn test_constant_quality_uses_crf_only() {
        let command = command_for(&LibaomPolicy::default());
        assert!(command.contains("-crf 23"));
        assert!(!command.contains("-b:v"));
    }

    #[test]
    fn test_constrained_uses_both() {
        let mut policy = LibaomPolicy::default();
        policy.set_mode("constrained").unwrap();
        policy.set_quality(30);
        policy.set_bitrate(3000);
        let command = command_for(&policy);
        assert!(command.contains("-crf 30 -b:v 3000k"));
    }

    #[test]
    fn test_two_pass_abr() {
        let mut policy = LibaomPolicy::default();
        policy.set_mode("2pass-abr").unwrap();
        let command = command_for(&policy);
        assert!(command.contains("-pass 1"));
        assert!(command.contains("-pass 2"));
        assert!(!command.contains("-crf"));
    }

    #[test]
    fn test_switching_back_to_crf_clears_bitrate() {
        let mut policy = LibaomPolicy::default();
        let mut params = FfmpegParams::new("av1");

        policy.set_mode("abr").unwrap();
        params.apply_all(policy.patches(&params));
        assert!(generate(&params).contains("-b:v 12000k"));

        policy.set_mode("constant").unwrap();
        params.apply_all(policy.patches(&params));
        assert_eq!(params.vbitrate, None);
        assert!(!generate(&params).contains("-b:v"));
        assert!(!params.twopass);
    }
}
