// download.rs — Model file download with SHA256 verification.
//
// Downloads model weights from the Hugging Face hub on first use, caches locally at
// ~/.inbox-search/models/. Files with a known pin are verified against it.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use sha2::{Digest, Sha256};

use crate::config;
use crate::logging::home_dir;

/// Local cache directory for `model_name` ("org/name" becomes "org--name").
pub fn model_dir(model_name: &str) -> anyhow::Result<PathBuf> {
    let home = home_dir().context("cannot determine home directory (neither HOME nor USERPROFILE is set)")?;
    Ok(home
        .join(config::embedding::MODEL_DIR_REL)
        .join(model_dir_name(model_name)))
}

fn model_dir_name(model_name: &str) -> String {
    model_name.trim_matches('/').replace('/', "--")
}

/// Check if all required model files exist locally.
pub fn model_files_exist(dir: &Path) -> bool {
    config::embedding::MODEL_FILES.iter().all(|f| dir.join(f).exists())
}

/// Download all model files if not already cached. Returns the model directory path.
pub fn ensure_model_files(model_name: &str) -> anyhow::Result<PathBuf> {
    let dir = model_dir(model_name)?;

    if model_files_exist(&dir) {
        log::info!("Model files already cached at {}", dir.display());
        return Ok(dir);
    }

    log::info!("Downloading embedding model {} to {}", model_name, dir.display());
    fs::create_dir_all(&dir).with_context(|| format!("failed to create model dir {}", dir.display()))?;

    for file in config::embedding::MODEL_FILES {
        let dest = dir.join(file);
        if dest.exists() {
            continue;
        }
        download_and_verify(&model_file_url(model_name, file), &dest, pinned_sha256(model_name, file))?;
    }

    log::info!("Model download complete");
    Ok(dir)
}

fn model_file_url(model_name: &str, file: &str) -> String {
    format!(
        "{}/{}/resolve/{}/{}",
        config::embedding::MODEL_HUB_BASE,
        model_name.trim_matches('/'),
        config::embedding::MODEL_REVISION,
        file
    )
}

fn pinned_sha256(model_name: &str, file: &str) -> Option<&'static str> {
    config::embedding::PINNED_SHA256
        .iter()
        .find(|(m, f, _)| *m == model_name && *f == file)
        .map(|(_, _, sha)| *sha)
}

/// Download a file from URL and verify its SHA256 hash when a pin is known.
fn download_and_verify(url: &str, dest: &Path, expected_sha256: Option<&str>) -> anyhow::Result<()> {
    let filename = dest.file_name().unwrap_or_default().to_string_lossy();
    log::info!("Downloading {} from {}", filename, url);

    let resp = ureq::get(url)
        .timeout(std::time::Duration::from_secs(config::http::DOWNLOAD_TIMEOUT_SECS))
        .call()
        .with_context(|| format!("failed to download {url}"))?;

    let status = resp.status();
    if status != 200 {
        bail!("HTTP {status} downloading {url}");
    }

    // Read body into memory (small sentence models fit in RAM)
    let mut body = Vec::new();
    resp.into_reader()
        .read_to_end(&mut body)
        .with_context(|| format!("failed to read response body for {url}"))?;

    let actual_hash = hex::encode(Sha256::digest(&body));
    match expected_sha256 {
        Some(expected) if actual_hash != expected => {
            bail!(
                "SHA256 mismatch for {}: expected {}, got {}",
                filename,
                expected,
                actual_hash
            );
        }
        Some(_) => log::info!("SHA256 verified for {} ({})", filename, &actual_hash[..12]),
        None => log::info!("Downloaded {} (sha256 {}, no pin)", filename, &actual_hash[..12]),
    }

    // Write atomically: write to .tmp, then rename
    let tmp_path = dest.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path).with_context(|| format!("failed to create {}", tmp_path.display()))?;
    file.write_all(&body)?;
    file.flush()?;
    drop(file);

    fs::rename(&tmp_path, dest)
        .with_context(|| format!("failed to rename {} -> {}", tmp_path.display(), dest.display()))?;

    Ok(())
}
