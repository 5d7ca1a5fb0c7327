use vencoder_core::capabilities::{parse_codecs, parse_pixel_formats, parse_version};
use vencoder_core::ProbeError;

const SYNTHETIC: &str = "Codecs:
 D..... = Decoding supported
 .E.... = Encoding supported
 -------
 DEV.L. av1                  Alliance for Open Media AV1 (decoders: libdav1d libaom-av1 av1 ) (encoders: libaom-av1 libsvtav1 librav1e )
 DEA.L. opus                 Opus (Opus Interactive Audio Codec) (decoders: opus libopus ) (encoders: opus libopus )
";

#[test]
fn test_synthetic_listing_yields_one_video_and_one_audio() {
    let list = parse_codecs(SYNTHETIC).unwrap();
    assert_eq!(list.video.len(), 1);
    assert_eq!(list.audio.len(), 1);

    let av1 = &list.video[0];
    assert_eq!(av1.short_name, "av1");
    assert_eq!(av1.description, "Alliance for Open Media AV1");
    assert_eq!(av1.encoders, vec!["libaom-av1", "libsvtav1", "librav1e"]);

    let opus = &list.audio[0];
    assert_eq!(opus.short_name, "opus");
    assert_eq!(opus.description, "Opus (Opus Interactive Audio Codec)");
    assert_eq!(opus.encoders, vec!["opus", "libopus"]);
}

#[test]
fn test_decode_only_and_subtitle_lines_are_not_entries() {
    let text = " -------\n D.V.L. h263i  Intel H.263\n DES... ass  ASS subtitle\n D.A.L. ac4  AC-4\n";
    let list = parse_codecs(text).unwrap();
    assert!(list.video.is_empty());
    assert!(list.audio.is_empty());
    assert_eq!(list.anomalies, 0);
}

#[test]
fn test_short_lines_are_anomalies_not_errors() {
    let text = " -------\n DEV\n DEV.L. vp9  Google VP9 (encoders: libvpx-vp9 vp9_qsv )\n";
    let list = parse_codecs(text).unwrap();
    assert_eq!(list.video.len(), 1);
    assert_eq!(list.video[0].encoders, vec!["libvpx-vp9", "vp9_qsv"]);
    assert_eq!(list.anomalies, 1);
}

#[test]
fn test_empty_listing_is_distinct_from_failure() {
    let list = parse_codecs("Codecs:\n -------\n").unwrap();
    assert!(list.video.is_empty());
    assert!(list.audio.is_empty());

    assert!(matches!(
        parse_pixel_formats("no listing here"),
        Err(ProbeError::MalformedOutput { .. })
    ));
}

#[test]
fn test_version_banner() {
    let v = parse_version("ffmpeg version 7.0.2 Copyright (c) 2000-2024 the FFmpeg developers").unwrap();
    assert_eq!((v.major, v.minor, v.patch), (7, 0, 2));
}

#[cfg(unix)]
mod with_fake_ffmpeg {
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use vencoder_core::capabilities::{check_version, probe_codecs, probe_pixel_formats};
    use vencoder_core::ProbeError;

    fn fake_ffmpeg(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_probe_runs_the_binary() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = fake_ffmpeg(
            &dir,
            r#"case "$2" in
  -codecs) printf ' -------\n DEV.L. hevc  H.265 (encoders: libx265 hevc_nvenc )\n' ;;
  -pix_fmts) printf '%s\n' '-----' 'IO... yuv420p 3 12 8-8-8' ;;
  *) echo 'ffmpeg version 6.0 Copyright' ;;
esac"#,
        );
        let ffmpeg = ffmpeg.to_str().unwrap();

        let codecs = probe_codecs(ffmpeg).await.unwrap();
        assert_eq!(codecs.video[0].default_encoder(), "libx265");

        let formats = probe_pixel_formats(ffmpeg).await.unwrap();
        assert_eq!(formats, vec!["yuv420p"]);

        let version = check_version(ffmpeg).await.unwrap();
        assert_eq!(version.to_string(), "6.0.0");
    }

    #[tokio::test]
    async fn test_failing_binary_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = fake_ffmpeg(&dir, "echo 'broken build' >&2\nexit 1");

        let err = probe_codecs(ffmpeg.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, ProbeError::ToolingUnavailable { .. }));
        assert!(err.to_string().contains("broken build"));
    }
}
