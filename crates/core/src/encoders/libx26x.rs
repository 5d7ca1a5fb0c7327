// libx264 / libx264rgb / libx265 rate control: CRF or two-pass target bitrate

use super::{mode_name, parse_mode, EncoderPolicy};
use crate::error::PolicyError;
use crate::params::{FfmpegParams, ParamPatch, DEFAULT_BITRATE};

pub const H264_DEFAULT_CRF: u32 = 23;
pub const HEVC_DEFAULT_CRF: u32 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X26xMode {
    Crf,
    TwoPass,
}

const MODES: &[(&str, X26xMode)] = &[("crf", X26xMode::Crf), ("2pass", X26xMode::TwoPass)];
const MODE_NAMES: &[&str] = &["crf", "2pass"];

#[derive(Debug, Clone)]
pub struct X26xPolicy {
    pub mode: X26xMode,
    pub crf: u32,
    pub bitrate: u32,
}

impl X26xPolicy {
    pub fn new(vcodec: &str) -> Self {
        let crf = if vcodec == "hevc" {
            HEVC_DEFAULT_CRF
        } else {
            H264_DEFAULT_CRF
        };
        Self {
            mode: X26xMode::Crf,
            crf,
            bitrate: DEFAULT_BITRATE,
        }
    }
}

impl EncoderPolicy for X26xPolicy {
    fn name(&self) -> &'static str {
        "libx26x"
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
        match self.mode {
            X26xMode::Crf => vec![
                ParamPatch::TwoPass(false),
                ParamPatch::VideoBitrate(None),
                ParamPatch::Crf(Some(self.crf)),
            ],
            X26xMode::TwoPass => vec![
                ParamPatch::TwoPass(true),
                ParamPatch::Crf(None),
                ParamPatch::VideoBitrate(Some(self.bitrate)),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::generate;

    #[test]
    fn test_default_crf_by_codec() {
        assert_eq!(X26xPolicy::new("h264").crf, 23);
        assert_eq!(X26xPolicy::new("hevc").crf, 28);
    }

    #[test]
    fn test_hevc_two_pass_uses_x265_params() {
        let mut policy = X26xPolicy::new("hevc");
        policy.set_mode("2pass").unwrap();
        policy.set_bitrate(5000);

        let mut params = FfmpegParams::new("hevc");
        params.apply(ParamPatch::Encoder(Some("libx265".into())));
        params.apply_all(policy.patches(&params));

        let command = generate(&params);
        assert!(command.contains("-c:v libx265 -b:v 5000k"));
        assert!(command.contains("-x265-params pass=1"));
        assert!(command.contains("-x265-params pass=2"));
    }

    #[test]
    fn test_back_to_crf_is_single_pass() {
        let mut policy = X26xPolicy::new("h264");
        let mut params = FfmpegParams::new("h264");

        policy.set_mode("2pass").unwrap();
        params.apply_all(policy.patches(&params));
        policy.set_mode("crf").unwrap();
        params.apply_all(policy.patches(&params));

        let command = generate(&params);
        assert!(!command.contains("-pass"));
        assert!(!command.contains("-b:v"));
        assert!(command.contains("-crf 23"));
    }
}
