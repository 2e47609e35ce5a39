use crate::bridge::Bridge;
use crate::manifest::ANY_PLATFORM;
use crate::resolve::ResolveError;
use anyhow::Result;
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard};

/// Identifies a cached bridge by the manifest it came from and the platform
/// entry it was opened with.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct Source {
    manifest: PathBuf,
    platform: String,
}

static CACHE: LazyLock<Mutex<HashMap<Source, Bridge>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn lock_cache() -> MutexGuard<'static, HashMap<Source, Bridge>> {
    CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn source_for(manifest_path: &Path, platform: &str) -> Source {
    let manifest = manifest_path
        .canonicalize()
        .unwrap_or_else(|_| manifest_path.to_path_buf());

    Source {
        manifest,
        platform: platform.to_string(),
    }
}

/// Runs `run` against the bridge for `manifest_path` and `platform`, opening
/// it on first use and reusing it afterwards.
pub fn run_cached_bridge<T>(
    manifest_path: &Path,
    platform: &str,
    run: impl Fn(&Bridge) -> Result<T>,
) -> Result<T> {
    let source = source_for(manifest_path, platform);

    let cache = lock_cache();
    if let Some(bridge) = cache.get(&source) {
        debug!("loading cache: {}", source.manifest.display());

        return run(bridge);
    }
    drop(cache);

    let bridge = Bridge::open_with_platform(manifest_path, platform)?;
    #[cfg(test)]
    record_open(&source);

    let res = run(&bridge);

    let mut cache = lock_cache();
    cache.entry(source).or_insert(bridge);
    drop(cache);

    res
}

/// Like [`run_cached_bridge`] for the build target, retrying with the
/// manifest's `any` entry when the target is not listed.
pub fn run_cached_bridge_default<T>(
    manifest_path: &Path,
    run: impl Fn(&Bridge) -> Result<T>,
) -> Result<T> {
    let this_platform = env!("TARGET_TRIPLE");

    match run_cached_bridge(manifest_path, this_platform, &run) {
        Ok(v) => Ok(v),
        Err(e) => {
            if let Some(ResolveError::PlatformNotSupported { .. }) = e.downcast_ref::<ResolveError>()
            {
                debug!("Failed to load with this platform: {}", e);

                run_cached_bridge(manifest_path, ANY_PLATFORM, &run)
            } else {
                Err(e)
            }
        }
    }
}

#[cfg(test)]
static OPENS: LazyLock<Mutex<HashMap<Source, usize>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

#[cfg(test)]
fn record_open(source: &Source) {
    *OPENS.lock().unwrap().entry(source.clone()).or_default() += 1;
}

#[cfg(test)]
fn opens_of(manifest_path: &Path, platform: &str) -> usize {
    let source = source_for(manifest_path, platform);
    OPENS.lock().unwrap().get(&source).copied().unwrap_or(0)
}

#[cfg(test)]
fn is_cached(manifest_path: &Path, platform: &str) -> bool {
    lock_cache().contains_key(&source_for(manifest_path, platform))
}
