// NVENC (h264/hevc/av1) rate control

use super::{clear_owned, mode_name, parse_mode, EncoderPolicy};
use crate::error::PolicyError;
use crate::params::{FfmpegParams, ParamPatch, Stage, DEFAULT_BITRATE};

/// Default floor of the bitrate window, kbit/s
pub const LOWER_BITRATE: u32 = 8_000;
/// `-cq 0` lets the encoder pick the quality level
pub const AUTO_CQ: u32 = 0;
pub const DEFAULT_LOOKAHEAD: u32 = 20;
pub const DEFAULT_AQ_STRENGTH: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvencMode {
    ConstQp,
    Vbr,
    /// VBR with a constant quality target and no bitrate target
    VbrCq,
    Cbr,
}

const MODES: &[(&str, NvencMode)] = &[
    ("constqp", NvencMode::ConstQp),
    ("vbr", NvencMode::Vbr),
    ("vbr-cq", NvencMode::VbrCq),
    ("cbr", NvencMode::Cbr),
];
const MODE_NAMES: &[&str] = &["constqp", "vbr", "vbr-cq", "cbr"];

const OWNED: &[(Stage, &str)] = &[
    (Stage::Global, "hwaccel_output_format"),
    (Stage::Output, "tune"),
    (Stage::Output, "rc"),
    (Stage::Output, "lookahead"),
    (Stage::Output, "g"),
    (Stage::Output, "bf"),
    (Stage::Output, "b_ref_mode"),
    (Stage::Output, "qmin"),
    (Stage::Output, "qmax"),
    (Stage::Output, "temporal_aq"),
    (Stage::Output, "spatial_aq"),
    (Stage::Output, "aq-strength"),
    (Stage::Output, "qp"),
    (Stage::Output, "cq"),
    (Stage::Output, "bufsize"),
    (Stage::Output, "maxrate"),
];

#[derive(Debug, Clone)]
pub struct NvencPolicy {
    pub mode: NvencMode,
    /// Target (vbr, cbr) bitrate, kbit/s
    pub bitrate: u32,
    pub maxrate: u32,
    pub bufsize: u32,
    /// Constant QP; the encoder's own default when unset
    pub qp: Option<u32>,
    pub cq: u32,
    pub lookahead: u32,
    pub gop: Option<u32>,
    pub temporal_aq: bool,
    pub spatial_aq: bool,
    pub aq_strength: u32,
}

impl Default for NvencPolicy {
    fn default() -> Self {
        Self {
            mode: NvencMode::Vbr,
            bitrate: LOWER_BITRATE,
            maxrate: DEFAULT_BITRATE,
            bufsize: LOWER_BITRATE,
            qp: None,
            cq: AUTO_CQ,
            lookahead: DEFAULT_LOOKAHEAD,
            gop: None,
            temporal_aq: true,
            spatial_aq: false,
            aq_strength: DEFAULT_AQ_STRENGTH,
        }
    }
}

impl EncoderPolicy for NvencPolicy {
    fn name(&self) -> &'static str {
        "nvenc"
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
        if self.maxrate < kbps {
            self.maxrate = kbps;
        }
    }

    fn set_quality(&mut self, value: u32) {
        match self.mode {
            NvencMode::ConstQp => self.qp = Some(value),
            NvencMode::VbrCq => self.cq = value,
            NvencMode::Vbr | NvencMode::Cbr => {}
        }
    }

    fn owned_keys(&self) -> &'static [(Stage, &'static str)] {
        OWNED
    }

    fn mount(&self, _params: &FfmpegParams) -> Vec<ParamPatch> {
        vec![ParamPatch::HwAccel(Some("cuda".to_string()))]
    }

    /// Hardware decoding set at mount goes away with the policy
    fn unmount(&self) -> Vec<ParamPatch> {
        let mut patches = clear_owned(OWNED);
        patches.push(ParamPatch::HwAccel(None));
        patches
    }

    fn patches(&self, _params: &FfmpegParams) -> Vec<ParamPatch> {
        let out = |key: &str, value: String| ParamPatch::extra(Stage::Output, key, value);

        let mut patches = clear_owned(OWNED);
        patches.extend([
            ParamPatch::TwoPass(false),
            ParamPatch::Crf(None),
            ParamPatch::extra(Stage::Global, "hwaccel_output_format", "cuda"),
            out("tune", "hq".into()),
        ]);

        let rc = match self.mode {
            NvencMode::ConstQp => "constqp",
            NvencMode::Vbr | NvencMode::VbrCq => "vbr",
            NvencMode::Cbr => "cbr",
        };
        patches.push(out("rc", rc.into()));
        patches.push(out("lookahead", self.lookahead.to_string()));
        if let Some(gop) = self.gop {
            patches.push(out("g", gop.to_string()));
        }
        patches.extend([
            out("bf", "3".into()),
            out("b_ref_mode", "middle".into()),
            out("qmin", "0".into()),
            out("qmax", "-1".into()),
        ]);
        if self.temporal_aq {
            patches.push(out("temporal_aq", "1".into()));
        }
        if self.spatial_aq {
            patches.push(out("spatial_aq", "1".into()));
            patches.push(out("aq-strength", self.aq_strength.to_string()));
        }

        match self.mode {
            NvencMode::ConstQp => {
                patches.push(ParamPatch::VideoBitrate(None));
                if let Some(qp) = self.qp {
                    patches.push(out("qp", qp.to_string()));
                }
            }
            NvencMode::VbrCq => {
                patches.push(ParamPatch::VideoBitrate(Some(0)));
                patches.push(out("cq", self.cq.to_string()));
                patches.push(out("maxrate", format!("{}k", self.maxrate)));
                patches.push(out("bufsize", format!("{}k", self.bufsize)));
            }
            NvencMode::Vbr => {
                patches.push(ParamPatch::VideoBitrate(Some(self.bitrate)));
                patches.push(out("maxrate", format!("{}k", self.maxrate)));
                patches.push(out("bufsize", format!("{}k", self.bufsize)));
            }
            NvencMode::Cbr => {
                patches.push(ParamPatch::VideoBitrate(Some(self.bitrate)));
                patches.push(out("maxrate", format!("{}k", self.bitrate)));
                patches.push(out("bufsize", format!("{}k", self.bufsize)));
            }
        }
        patches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::generate;

    fn command_for(policy: &NvencPolicy) -> String {
        let mut params = FfmpegParams::new("hevc");
        params.apply(ParamPatch::Encoder(Some("hevc_nvenc".into())));
        params.apply_all(policy.mount(&params));
        params.apply_all(policy.patches(&params));
        generate(&params)
    }

    #[test]
    fn test_default_vbr_command() {
        let command = command_for(&NvencPolicy::default());
        assert!(command.contains("-hwaccel cuda -y -hwaccel_output_format cuda"));
        assert!(command.contains("-b:v 8000k"));
        assert!(command.contains("-tune hq -rc vbr -lookahead 20 -bf 3"));
        assert!(command.contains("-maxrate 12000k -bufsize 8000k"));
        assert!(command.contains("-temporal_aq 1"));
        assert!(!command.contains("spatial_aq"));
        assert!(!command.contains("-crf"));
    }

    #[test]
    fn test_cbr_pins_maxrate_to_target() {
        let mut policy = NvencPolicy::default();
        policy.set_mode("cbr").unwrap();
        policy.set_bitrate(6000);
        let command = command_for(&policy);
        assert!(command.contains("-rc cbr"));
        assert!(command.contains("-b:v 6000k"));
        assert!(command.contains("-maxrate 6000k"));
        assert!(!command.contains("-maxrate 12000k"));
    }

    #[test]
    fn test_constqp_without_qp_leaves_it_to_the_encoder() {
        let mut policy = NvencPolicy::default();
        policy.set_mode("constqp").unwrap();
        let command = command_for(&policy);
        assert!(command.contains("-rc constqp"));
        assert!(!command.contains("-qp"));
    }

    #[test]
    fn test_vbr_cq_defaults_to_automatic_quality() {
        let mut policy = NvencPolicy::default();
        policy.set_mode("vbr-cq").unwrap();
        assert!(command_for(&policy).contains("-cq 0"));
    }

    #[test]
    fn test_vbr_cq_zeroes_bitrate() {
        let mut policy = NvencPolicy::default();
        policy.set_mode("vbr-cq").unwrap();
        policy.set_quality(30);
        let command = command_for(&policy);
        assert!(command.contains("-b:v 0 "));
        assert!(command.contains("-rc vbr"));
        assert!(command.contains("-cq 30"));
    }

    #[test]
    fn test_constqp_drops_bitrate_and_window() {
        let mut policy = NvencPolicy::default();
        policy.set_mode("constqp").unwrap();
        policy.set_quality(19);
        let command = command_for(&policy);
        assert!(command.contains("-rc constqp"));
        assert!(command.contains("-qp 19"));
        assert!(!command.contains("-b:v"));
        assert!(!command.contains("-maxrate"));
    }

    #[test]
    fn test_switching_modes_leaves_no_stale_keys() {
        let mut policy = NvencPolicy::default();
        let mut params = FfmpegParams::new("h264");

        policy.set_mode("vbr-cq").unwrap();
        params.apply_all(policy.patches(&params));
        assert!(params.extraopts.output.contains("cq"));

        policy.set_mode("cbr").unwrap();
        params.apply_all(policy.patches(&params));
        assert!(!params.extraopts.output.contains("cq"));
        assert_eq!(params.extraopts.output.get("rc"), Some("cbr"));
    }

    #[test]
    fn test_aq_toggles() {
        let policy = NvencPolicy {
            temporal_aq: false,
            spatial_aq: false,
            ..Default::default()
        };
        let command = command_for(&policy);
        assert!(!command.contains("temporal_aq"));
        assert!(!command.contains("aq-strength"));
    }
}
