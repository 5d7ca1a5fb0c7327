// Conversion planning: output paths, overwrite resolution, duration probing
// and the final command for each input

use crate::command::{generate_with, resolved_container};
use crate::config::OverwritePolicy;
use crate::duration::probe_duration_us;
use crate::jobs::QueueEntry;
use crate::params::{FfmpegParams, ParamPatch};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension used when neither a custom extension nor the codec table gives one
pub const FALLBACK_CONTAINER: &str = "mkv";

/// Asks the user yes/no questions
pub trait Prompt {
    /// Whether the existing file at `path` may be replaced
    fn confirm_overwrite(&self, path: &Path) -> bool;
}

/// Prompt answering every question the same way
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Prompt for FixedAnswer {
    fn confirm_overwrite(&self, _path: &Path) -> bool {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub program: String,
    pub ffprobe: String,
    pub output_dir: PathBuf,
    pub overwrite: OverwritePolicy,
}

/// Queue entries ready to run, and the inputs left out with the reason
#[derive(Debug, Default)]
pub struct Plan {
    pub entries: Vec<QueueEntry>,
    pub skipped: Vec<(PathBuf, String)>,
}

/// Output path for `input`: `<output_dir>/<stem>.<container>`
pub fn output_path(params: &FfmpegParams, input: &Path, output_dir: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("{} has no file name", input.display()))?;
    let ext = resolved_container(params).unwrap_or(FALLBACK_CONTAINER);

    let mut name = stem.to_os_string();
    name.push(".");
    name.push(ext);
    Ok(output_dir.join(name))
}

/// Two-pass statistics prefix for `output`, next to it so concurrent jobs
/// never share one
pub fn pass_log_prefix(output: &Path) -> PathBuf {
    let mut prefix = output.as_os_str().to_os_string();
    prefix.push(".passlog");
    PathBuf::from(prefix)
}

/// Final command for one file: the session's parameters with concrete paths
pub fn final_command(params: &FfmpegParams, input: &Path, output: &Path, program: &str) -> String {
    let mut params = params.clone();
    params.apply_all([
        ParamPatch::InputFile(Some(input.to_path_buf())),
        ParamPatch::OutputFile(Some(output.to_path_buf())),
        ParamPatch::PassLog(Some(pass_log_prefix(output))),
    ]);
    generate_with(&params, program)
}

fn may_overwrite(policy: OverwritePolicy, prompt: &dyn Prompt, path: &Path) -> bool {
    match policy {
        OverwritePolicy::Always => true,
        OverwritePolicy::Never => false,
        OverwritePolicy::Ask => prompt.confirm_overwrite(path),
    }
}

/// Turn `inputs` into queue entries.
///
/// A file is skipped (and the rest still planned) when its output would
/// replace the input, when the user declines to overwrite an existing
/// output, or when its duration cannot be probed.
pub async fn plan_conversions(
    params: &FfmpegParams,
    inputs: &[PathBuf],
    options: &PlanOptions,
    prompt: &dyn Prompt,
) -> Result<Plan> {
    std::fs::create_dir_all(&options.output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", options.output_dir))?;

    let mut plan = Plan::default();
    for input in inputs {
        let output = output_path(params, input, &options.output_dir)?;

        if output == *input {
            warn!("Output would replace its own input: {}", input.display());
            plan.skipped
                .push((input.clone(), "output path is the input file".to_string()));
            continue;
        }

        if output.exists() && !may_overwrite(options.overwrite, prompt, &output) {
            info!("Keeping existing {}", output.display());
            plan.skipped
                .push((input.clone(), format!("{} already exists", output.display())));
            continue;
        }

        let length_us = match probe_duration_us(&options.ffprobe, input).await {
            Ok(us) => us,
            Err(e) => {
                warn!("Skipping {}: {}", input.display(), e);
                plan.skipped.push((input.clone(), e.to_string()));
                continue;
            }
        };

        let command = final_command(params, input, &output, &options.program);
        debug!("Queued {} -> {}", input.display(), output.display());
        plan.entries
            .push(QueueEntry::new(command, input.clone(), output, length_us));
    }

    Ok(plan)
}
