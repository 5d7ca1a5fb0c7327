// Configuration session: parameter model, mounted encoder policy and the
// preview command kept in sync with both

use crate::capabilities::{CodecInfo, CodecList};
use crate::command::{generate_with, DEFAULT_PROGRAM};
use crate::encoders::{policy_for, EncoderPolicy};
use crate::error::SessionError;
use crate::params::{FfmpegParams, ParamPatch};
use tracing::debug;

/// One configuration session.
///
/// Every mutation goes through [`Session::update`] (or one of the selection
/// helpers built on it) and ends with [`Session::recompute`], so
/// [`Session::command`] always reflects the current parameters.
///
/// Rate control fields (`crf`, `vbitrate`, `twopass`) belong to the mounted
/// policy when there is one; change them with `set_mode`, `set_bitrate` and
/// `set_quality` rather than raw patches.
#[derive(Debug)]
pub struct Session {
    codecs: CodecList,
    params: FfmpegParams,
    policy: Option<Box<dyn EncoderPolicy>>,
    program: String,
    command: String,
}

impl Session {
    /// Start a session for `vcodec` with its default encoder selected
    pub fn new(codecs: CodecList, vcodec: &str) -> Result<Self, SessionError> {
        let mut session = Self {
            codecs,
            params: FfmpegParams::default(),
            policy: None,
            program: DEFAULT_PROGRAM.to_string(),
            command: String::new(),
        };
        session.select_codec(vcodec)?;
        Ok(session)
    }

    /// Use `program` instead of `ffmpeg` from `PATH` in generated commands
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self.recompute();
        self
    }

    pub fn params(&self) -> &FfmpegParams {
        &self.params
    }

    pub fn codecs(&self) -> &CodecList {
        &self.codecs
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Current preview command
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn policy(&self) -> Option<&dyn EncoderPolicy> {
        self.policy.as_deref()
    }

    pub fn codec(&self) -> Option<&CodecInfo> {
        self.codecs.find_video(&self.params.vcodec)
    }

    /// Apply one patch and recompute
    pub fn update(&mut self, patch: ParamPatch) {
        self.params.apply(patch);
        self.recompute();
    }

    pub fn update_all(&mut self, patches: impl IntoIterator<Item = ParamPatch>) {
        self.params.apply_all(patches);
        self.recompute();
    }

    /// Bring policy-owned fields in line with the policy's mode and
    /// regenerate the preview command
    pub fn recompute(&mut self) {
        if let Some(policy) = &self.policy {
            let patches = policy.patches(&self.params);
            self.params.apply_all(patches);
        }
        self.command = generate_with(&self.params, &self.program);
    }

    /// Switch codec; its default encoder becomes the selected encoder
    pub fn select_codec(&mut self, vcodec: &str) -> Result<(), SessionError> {
        let encoder = self
            .codecs
            .find_video(vcodec)
            .map(|codec| codec.default_encoder().to_string())
            .ok_or_else(|| SessionError::UnknownCodec(vcodec.to_string()))?;

        self.params.apply(ParamPatch::Vcodec(vcodec.to_string()));
        self.mount(&encoder);
        Ok(())
    }

    /// Switch encoder within the current codec, replacing the mounted policy
    pub fn select_encoder(&mut self, encoder: &str) -> Result<(), SessionError> {
        let supported = self
            .codec()
            .map(|codec| codec.supports_encoder(encoder))
            .unwrap_or(false);
        if !supported {
            return Err(SessionError::UnsupportedEncoder {
                codec: self.params.vcodec.clone(),
                encoder: encoder.to_string(),
            });
        }

        self.mount(encoder);
        Ok(())
    }

    pub fn set_mode(&mut self, mode: &str) -> Result<(), SessionError> {
        let policy = self
            .policy
            .as_mut()
            .ok_or_else(|| SessionError::NoPolicy(self.params.effective_encoder().to_string()))?;
        policy.set_mode(mode)?;
        self.recompute();
        Ok(())
    }

    /// Two-pass encoding for encoders without a policy; a mounted policy
    /// decides passes through its modes
    pub fn set_two_pass(&mut self, enabled: bool) -> Result<(), SessionError> {
        if let Some(policy) = &self.policy {
            return Err(SessionError::PassesOwnedByPolicy {
                encoder: policy.name().to_string(),
                modes: policy.modes().join(", "),
            });
        }
        self.update(ParamPatch::TwoPass(enabled));
        Ok(())
    }

    /// Target video bitrate in kbit/s; set directly when no policy is mounted
    pub fn set_bitrate(&mut self, kbps: u32) {
        match self.policy.as_mut() {
            Some(policy) => {
                policy.set_bitrate(kbps);
                self.recompute();
            }
            None => self.update(ParamPatch::VideoBitrate(Some(kbps))),
        }
    }

    /// Quality knob of the current mode; plain CRF when no policy is mounted
    pub fn set_quality(&mut self, value: u32) {
        match self.policy.as_mut() {
            Some(policy) => {
                policy.set_quality(value);
                self.recompute();
            }
            None => self.update(ParamPatch::Crf(Some(value))),
        }
    }

    fn mount(&mut self, encoder: &str) {
        if let Some(old) = self.policy.take() {
            self.params.apply_all(old.unmount());
        }

        self.params.apply(ParamPatch::Encoder(Some(encoder.to_string())));
        self.policy = policy_for(encoder, &self.params.vcodec);
        if let Some(policy) = &self.policy {
            debug!("Mounted {} policy in mode {}", policy.name(), policy.mode());
            let patches = policy.mount(&self.params);
            self.params.apply_all(patches);
        }
        self.recompute();
    }
}
