// Encoder-specific rate control policies
//
// Each policy is a small state machine over its encoder's rate control modes.
// `patches` is recomputed after every input change and always clears the
// fields and extra options it owns before setting the ones the current mode
// needs, so nothing from a previous mode leaks into the command.

pub mod dnxhd;
pub mod libaom;
pub mod librav1e;
pub mod libsvtav1;
pub mod libx26x;
pub mod nvenc;
pub mod qsv;

use crate::error::PolicyError;
use crate::params::{FfmpegParams, ParamPatch, Stage};
use std::fmt::Debug;

pub trait EncoderPolicy: Debug + Send + Sync {
    /// Encoder family name, used in messages
    fn name(&self) -> &'static str;

    /// Closed set of rate control modes the user can pick from
    fn modes(&self) -> &'static [&'static str];

    fn mode(&self) -> &'static str;

    fn set_mode(&mut self, mode: &str) -> Result<(), PolicyError>;

    /// Target bitrate in kbit/s, for modes that use one
    fn set_bitrate(&mut self, _kbps: u32) {}

    /// Quality knob of the current mode (CRF, QP, CQ, global quality...)
    fn set_quality(&mut self, _value: u32) {}

    /// Extra-option keys this policy owns
    fn owned_keys(&self) -> &'static [(Stage, &'static str)] {
        &[]
    }

    /// One-time patches applied when the policy is mounted
    fn mount(&self, _params: &FfmpegParams) -> Vec<ParamPatch> {
        Vec::new()
    }

    /// Patches that bring `params` in line with the current mode
    fn patches(&self, params: &FfmpegParams) -> Vec<ParamPatch>;

    /// Patches removing everything this policy owns, applied when another
    /// encoder is selected
    fn unmount(&self) -> Vec<ParamPatch> {
        clear_owned(self.owned_keys())
    }
}

/// Policy for `encoder`, if the encoder has dedicated rate control options
pub fn policy_for(encoder: &str, vcodec: &str) -> Option<Box<dyn EncoderPolicy>> {
    let policy: Box<dyn EncoderPolicy> = match encoder {
        "libaom-av1" => Box::new(libaom::LibaomPolicy::default()),
        "libsvtav1" => Box::new(libsvtav1::SvtAv1Policy::default()),
        "librav1e" => Box::new(librav1e::Rav1ePolicy::default()),
        "libx264" | "libx264rgb" | "libx265" => Box::new(libx26x::X26xPolicy::new(vcodec)),
        "h264_nvenc" | "hevc_nvenc" | "av1_nvenc" => Box::new(nvenc::NvencPolicy::default()),
        "h264_qsv" | "hevc_qsv" => Box::new(qsv::QsvPolicy::avc()),
        "vp9_qsv" => Box::new(qsv::QsvPolicy::vp9()),
        "dnxhd" => Box::new(dnxhd::DnxhdPolicy::default()),
        _ => return None,
    };
    Some(policy)
}

/// Look `mode` up in a policy's mode table
pub(crate) fn parse_mode<M: Copy>(
    encoder: &'static str,
    mode: &str,
    table: &[(&'static str, M)],
) -> Result<M, PolicyError> {
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(mode.trim()))
        .map(|(_, m)| *m)
        .ok_or_else(|| PolicyError::UnknownMode {
            encoder,
            mode: mode.to_string(),
            expected: table
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

pub(crate) fn mode_name<M: Copy + PartialEq>(mode: M, table: &[(&'static str, M)]) -> &'static str {
    table
        .iter()
        .find(|(_, m)| *m == mode)
        .map(|(name, _)| *name)
        .unwrap_or_default()
}

pub(crate) fn clear_owned(keys: &[(Stage, &'static str)]) -> Vec<ParamPatch> {
    keys.iter()
        .map(|(stage, key)| ParamPatch::clear(*stage, key))
        .collect()
}
