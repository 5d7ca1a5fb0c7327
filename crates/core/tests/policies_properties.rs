use proptest::prelude::*;
use vencoder_core::command::generate;
use vencoder_core::encoders::policy_for;
use vencoder_core::params::FfmpegParams;

const ENCODERS: &[(&str, &str)] = &[
    ("libaom-av1", "av1"),
    ("libsvtav1", "av1"),
    ("librav1e", "av1"),
    ("libx264", "h264"),
    ("libx264rgb", "h264"),
    ("libx265", "hevc"),
    ("h264_nvenc", "h264"),
    ("hevc_nvenc", "hevc"),
    ("av1_nvenc", "av1"),
    ("h264_qsv", "h264"),
    ("hevc_qsv", "hevc"),
    ("vp9_qsv", "vp9"),
    ("dnxhd", "dnxhd"),
];

fn mounted(encoder: &str, vcodec: &str) -> FfmpegParams {
    let policy = policy_for(encoder, vcodec).unwrap();
    let mut params = FfmpegParams::new(vcodec);
    params.encoder = Some(encoder.to_string());
    params.apply_all(policy.mount(&params));
    params
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Whatever modes were visited before, the parameters only depend on
    /// the current mode
    #[test]
    fn prop_mode_history_does_not_leak(
        index in 0..ENCODERS.len(),
        history in prop::collection::vec(0usize..8, 0..8),
        last in 0usize..8,
        bitrate in 1_000u32..50_000,
        quality in 0u32..52,
    ) {
        let (encoder, vcodec) = ENCODERS[index];
        let mut policy = policy_for(encoder, vcodec).unwrap();
        let modes = policy.modes();
        policy.set_bitrate(bitrate);

        let mut params = mounted(encoder, vcodec);
        for step in history {
            policy.set_mode(modes[step % modes.len()]).unwrap();
            policy.set_quality(quality);
            params.apply_all(policy.patches(&params));
        }
        policy.set_mode(modes[last % modes.len()]).unwrap();
        policy.set_quality(quality);
        params.apply_all(policy.patches(&params));

        let mut fresh_policy = policy_for(encoder, vcodec).unwrap();
        fresh_policy.set_bitrate(bitrate);
        fresh_policy.set_mode(modes[last % modes.len()]).unwrap();
        fresh_policy.set_quality(quality);
        let mut fresh = mounted(encoder, vcodec);
        fresh.apply_all(fresh_policy.patches(&fresh));

        prop_assert_eq!(generate(&params), generate(&fresh));
    }

    /// Unmounting leaves no extra option behind
    #[test]
    fn prop_unmount_clears_everything(index in 0..ENCODERS.len(), mode in 0usize..8) {
        let (encoder, vcodec) = ENCODERS[index];
        let mut policy = policy_for(encoder, vcodec).unwrap();
        let modes = policy.modes();
        policy.set_mode(modes[mode % modes.len()]).unwrap();

        let mut params = mounted(encoder, vcodec);
        params.apply_all(policy.patches(&params));
        params.apply_all(policy.unmount());

        prop_assert!(params.extraopts.global.is_empty());
        prop_assert!(params.extraopts.input.is_empty());
        prop_assert!(params.extraopts.output.is_empty());
    }
}

#[test]
fn test_bitrate_mode_to_crf_mode_removes_bitrate() {
    for (encoder, vcodec, bitrate_mode, crf_mode) in [
        ("libaom-av1", "av1", "abr", "constant"),
        ("libx264", "h264", "2pass", "crf"),
        ("libx265", "hevc", "2pass", "crf"),
    ] {
        let mut policy = policy_for(encoder, vcodec).unwrap();
        let mut params = mounted(encoder, vcodec);

        policy.set_mode(bitrate_mode).unwrap();
        params.apply_all(policy.patches(&params));
        assert!(generate(&params).contains("-b:v"), "{}", encoder);

        policy.set_mode(crf_mode).unwrap();
        params.apply_all(policy.patches(&params));
        let command = generate(&params);
        assert!(!command.contains("-b:v"), "{}: {}", encoder, command);
        assert!(command.contains("-crf"), "{}: {}", encoder, command);
    }
}
