// librav1e rate control: bitrate driven, with a speed setting

use super::EncoderPolicy;
use crate::error::PolicyError;
use crate::params::{FfmpegParams, ParamPatch, DEFAULT_BITRATE};

pub const DEFAULT_SPEED: u32 = 5;

const MODE_NAMES: &[&str] = &["abr"];

#[derive(Debug, Clone)]
pub struct Rav1ePolicy {
    pub bitrate: u32,
}

impl Default for Rav1ePolicy {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
        }
    }
}

impl EncoderPolicy for Rav1ePolicy {
    fn name(&self) -> &'static str {
        "librav1e"
    }

    fn modes(&self) -> &'static [&'static str] {
        MODE_NAMES
    }

    fn mode(&self) -> &'static str {
        MODE_NAMES[0]
    }

    fn set_mode(&mut self, mode: &str) -> Result<(), PolicyError> {
        super::parse_mode(self.name(), mode, &[("abr", ())])
    }

    fn set_bitrate(&mut self, kbps: u32) {
        self.bitrate = kbps;
    }

    /// Speed is only seeded here; the user may change it afterwards
    fn mount(&self, params: &FfmpegParams) -> Vec<ParamPatch> {
        if params.speed.is_some() {
            Vec::new()
        } else {
            vec![ParamPatch::Speed(Some(DEFAULT_SPEED))]
        }
    }

    fn patches(&self, _params: &FfmpegParams) -> Vec<ParamPatch> {
        vec![
            ParamPatch::TwoPass(false),
            ParamPatch::Crf(None),
            ParamPatch::VideoBitrate(Some(self.bitrate)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::generate;

    #[test]
    fn test_rav1e_uses_bitrate_and_speed() {
        let mut policy = Rav1ePolicy::default();
        policy.set_bitrate(6000);

        let mut params = FfmpegParams::new("av1");
        params.apply(ParamPatch::Encoder(Some("librav1e".into())));
        params.apply(ParamPatch::Crf(Some(28)));
        params.apply_all(policy.mount(&params));
        params.apply_all(policy.patches(&params));

        let command = generate(&params);
        assert!(command.contains("-c:v librav1e -b:v 6000k"));
        assert!(command.contains("-speed 5"));
        assert!(!command.contains("-crf"));
    }

    #[test]
    fn test_mount_keeps_user_speed() {
        let policy = Rav1ePolicy::default();
        let mut params = FfmpegParams::new("av1");
        params.apply(ParamPatch::Speed(Some(9)));
        assert!(policy.mount(&params).is_empty());
    }
}
