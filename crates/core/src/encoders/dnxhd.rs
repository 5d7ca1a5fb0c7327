// DNxHD / DNxHR profile selection

use super::{mode_name, parse_mode, EncoderPolicy};
use crate::error::PolicyError;
use crate::params::{FfmpegParams, ParamPatch, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnxProfile {
    Dnxhd,
    Dnxhr444,
    DnxhrHqx,
    DnxhrHq,
    DnxhrSq,
    DnxhrLb,
}

const PROFILES: &[(&str, DnxProfile)] = &[
    ("dnxhd", DnxProfile::Dnxhd),
    ("dnxhr_444", DnxProfile::Dnxhr444),
    ("dnxhr_hqx", DnxProfile::DnxhrHqx),
    ("dnxhr_hq", DnxProfile::DnxhrHq),
    ("dnxhr_sq", DnxProfile::DnxhrSq),
    ("dnxhr_lb", DnxProfile::DnxhrLb),
];
const PROFILE_NAMES: &[&str] = &[
    "dnxhd",
    "dnxhr_444",
    "dnxhr_hqx",
    "dnxhr_hq",
    "dnxhr_sq",
    "dnxhr_lb",
];
const OWNED: &[(Stage, &str)] = &[(Stage::Output, "profile")];

/// The "modes" of DNxHD are its profiles; bitrate is implied by the profile
#[derive(Debug, Clone)]
pub struct DnxhdPolicy {
    pub profile: DnxProfile,
}

impl Default for DnxhdPolicy {
    fn default() -> Self {
        Self {
            profile: DnxProfile::Dnxhd,
        }
    }
}

impl EncoderPolicy for DnxhdPolicy {
    fn name(&self) -> &'static str {
        "dnxhd"
    }

    fn modes(&self) -> &'static [&'static str] {
        PROFILE_NAMES
    }

    fn mode(&self) -> &'static str {
        mode_name(self.profile, PROFILES)
    }

    fn set_mode(&mut self, mode: &str) -> Result<(), PolicyError> {
        self.profile = parse_mode(self.name(), mode, PROFILES)?;
        Ok(())
    }

    fn owned_keys(&self) -> &'static [(Stage, &'static str)] {
        OWNED
    }

    fn patches(&self, _params: &FfmpegParams) -> Vec<ParamPatch> {
        vec![
            ParamPatch::TwoPass(false),
            ParamPatch::Crf(None),
            ParamPatch::VideoBitrate(None),
            ParamPatch::extra(Stage::Output, "profile", self.mode()),
        ]
    }
}
