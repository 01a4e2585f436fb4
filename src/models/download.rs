//! Piper voice download and installation.
//!
//! Voices are fetched from the rhasspy/piper-voices repository on HuggingFace
//! and stored as `<name>.onnx` plus `<name>.onnx.json` in the user's cache
//! directory.

use crate::models::catalog::VoiceInfo;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "model-download")]
use crate::error::{Result, VoxflowError};
#[cfg(feature = "model-download")]
use crate::models::catalog::VoiceName;

/// Directory where voices are stored.
///
/// Uses `~/.cache/voxflow/voices/` on Linux/Unix.
pub fn voices_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("voxflow")
        .join("voices")
}

/// Model path for `name` inside `dir`. The file may or may not exist.
pub fn voice_path_in(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.onnx"))
}

/// Model path for `name` in the default voices directory.
pub fn voice_path(name: &str) -> PathBuf {
    voice_path_in(&voices_dir(), name)
}

/// Voice config path that piper expects next to `model`.
pub fn config_path_for(model: &Path) -> PathBuf {
    let mut path = model.as_os_str().to_owned();
    path.push(".json");
    PathBuf::from(path)
}

/// Whether both the model and its config are present in `dir`.
pub fn is_voice_installed_in(dir: &Path, name: &str) -> bool {
    let model = voice_path_in(dir, name);
    model.is_file() && config_path_for(&model).is_file()
}

/// Whether `name` is installed in the default voices directory.
pub fn is_voice_installed(name: &str) -> bool {
    is_voice_installed_in(&voices_dir(), name)
}

/// Names of every complete voice in `dir`, sorted.
pub fn list_installed_voices_in(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let file_name = entry.file_name();
            let name = file_name.to_str()?.strip_suffix(".onnx")?;
            is_voice_installed_in(dir, name).then(|| name.to_string())
        })
        .collect();

    names.sort();
    names
}

/// Names of every voice installed in the default directory, sorted.
pub fn list_installed_voices() -> Vec<String> {
    list_installed_voices_in(&voices_dir())
}

/// One catalog line for `voxflow models list`.
pub fn format_voice_info(voice: &VoiceInfo) -> String {
    let status = if is_voice_installed(voice.name) {
        "[installed]"
    } else {
        "[not installed]"
    };
    format!(
        "{:24} {:4} MB   {:24} {}",
        voice.name, voice.size_mb, voice.description, status
    )
}

/// Compares a computed SHA-256 digest with the expected one, ignoring case.
pub fn checksum_matches(expected: &str, calculated: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(calculated)
}

/// Fetches `url` into `output_path`, returning the SHA-256 of the body.
///
/// The body lands in a `.part` file that is renamed once complete, so an
/// interrupted download never looks installed.
#[cfg(feature = "model-download")]
async fn download_to_path(
    voice: &str,
    url: &str,
    expected_sha256: Option<&str>,
    output_path: &Path,
    progress: bool,
) -> Result<String> {
    use futures_util::StreamExt;
    use indicatif::ProgressBar;
    use sha2::{Digest, Sha256};
    use std::io::Write;

    let fail = |message: String| VoxflowError::VoiceDownload {
        voice: voice.to_string(),
        message,
    };

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| fail(format!("failed to create voices directory: {e}")))?;
    }

    tracing::debug!(url, "starting download");
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .map_err(|e| fail(format!("failed to start download: {e}")))?;

    if !response.status().is_success() {
        return Err(fail(format!(
            "{} answered with status {}",
            url,
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = if progress {
        let pb = ProgressBar::new(total_size);
        pb.set_style(progress_style());
        Some(pb)
    } else {
        None
    };

    let partial = output_path.with_extension("part");
    let mut hasher = Sha256::new();
    let mut stream = response.bytes_stream();
    let mut file = fs::File::create(&partial)
        .map_err(|e| fail(format!("failed to create {}: {e}", partial.display())))?;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| fail(format!("failed to read download chunk: {e}")))?;
        file.write_all(&chunk)
            .map_err(|e| fail(format!("failed to write {}: {e}", partial.display())))?;
        hasher.update(&chunk);
        if let Some(ref pb) = pb {
            pb.inc(chunk.len() as u64);
        }
    }
    drop(file);

    if let Some(pb) = pb {
        pb.finish_with_message("Downloaded");
    }

    let calculated = format!("{:x}", hasher.finalize());
    if let Some(expected) = expected_sha256
        && !checksum_matches(expected, &calculated)
    {
        if let Err(e) = fs::remove_file(&partial) {
            tracing::warn!(error = %e, "failed to remove corrupted download");
        }
        return Err(fail(format!(
            "SHA-256 checksum mismatch. Expected: {expected}, got: {calculated}"
        )));
    }

    fs::rename(&partial, output_path)
        .map_err(|e| fail(format!("failed to move download into place: {e}")))?;
    Ok(calculated)
}

#[cfg(feature = "model-download")]
#[allow(clippy::expect_used)]
fn progress_style() -> indicatif::ProgressStyle {
    indicatif::ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .expect("hardcoded progress bar template")
        .progress_chars("#>-")
}

/// Downloads voice `name` into `dir` unless it is already there.
///
/// The config is fetched first and must declare a sample rate; the model is
/// checked against `expected_sha256` when one is given.
///
/// # Errors
///
/// Returns an error if:
/// - The name is not a piper voice name
/// - Either download fails or the config is not a piper voice config
/// - The SHA-256 checksum doesn't match
/// - The files cannot be written
#[cfg(feature = "model-download")]
pub async fn download_voice_into(
    dir: &Path,
    name: &str,
    expected_sha256: Option<&str>,
    progress: bool,
) -> Result<PathBuf> {
    let voice = VoiceName::parse(name)?;
    let model_path = voice_path_in(dir, name);
    if is_voice_installed_in(dir, name) {
        tracing::info!(voice = name, path = %model_path.display(), "voice already installed");
        return Ok(model_path);
    }

    let config_path = config_path_for(&model_path);
    download_to_path(name, &voice.config_url(), None, &config_path, false).await?;
    let config = fs::read_to_string(&config_path)?;
    let Some(sample_rate) = crate::voice::piper::sample_rate_from_config(&config) else {
        if let Err(e) = fs::remove_file(&config_path) {
            tracing::warn!(error = %e, "failed to remove unusable voice config");
        }
        return Err(VoxflowError::VoiceDownload {
            voice: name.to_string(),
            message: "voice config has no audio.sample_rate".to_string(),
        });
    };

    if progress {
        let size = crate::models::catalog::get_voice(name)
            .map(|v| format!(" (~{} MB)", v.size_mb))
            .unwrap_or_default();
        eprintln!("Downloading {name}{size}...");
    }
    let digest =
        download_to_path(name, &voice.model_url(), expected_sha256, &model_path, progress).await?;

    tracing::info!(
        voice = name,
        sample_rate,
        sha256 = %digest,
        path = %model_path.display(),
        "voice installed"
    );
    Ok(model_path)
}

/// Downloads voice `name` into [`voices_dir`].
#[cfg(feature = "model-download")]
pub async fn download_voice(
    name: &str,
    expected_sha256: Option<&str>,
    progress: bool,
) -> Result<PathBuf> {
    download_voice_into(&voices_dir(), name, expected_sha256, progress).await
}
