use crate::manifest::{BridgeManifest, Dependency, PlatformLibrary, Symbols};
use anyhow::Result;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ResolveError {
    PlatformNotSupported { platform: String, manifest: PathBuf },
    ManifestNotFound(PathBuf),
    LibraryNotFound(PathBuf),
    Cycle(String),
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::PlatformNotSupported { platform, manifest } => {
                write!(
                    f,
                    "Platform {} is not supported by {}",
                    platform,
                    manifest.display()
                )
            }
            ResolveError::ManifestNotFound(path) => {
                write!(f, "Manifest {} does not exist", path.display())
            }
            ResolveError::LibraryNotFound(path) => {
                write!(f, "Library {} does not exist", path.display())
            }
            ResolveError::Cycle(platform) => {
                write!(
                    f,
                    "Failed to resolve all dependencies for {}. It may be a circular dependency.",
                    platform
                )
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// A library as it will be handed to the OS loader.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct LibraryInfo {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub base: LibraryInfo,
    /// Libraries to load before `base`; every entry precedes its dependents.
    pub dependencies: Vec<LibraryInfo>,
    pub symbols: Symbols,
}

/// A bare file name such as `libc.so.6` is left to the loader's search path.
fn is_bare_name(path: &Path) -> bool {
    let s = path.as_os_str().to_string_lossy();
    !s.is_empty() && !s.contains('/') && !s.contains('\\') && path.components().count() == 1
}

fn library_info(manifest_dir: &Path, path: &Path) -> Result<LibraryInfo> {
    if is_bare_name(path) && !manifest_dir.join(path).exists() {
        trace!("leaving {} to the loader search path", path.display());
        return Ok(LibraryInfo {
            path: path.to_path_buf(),
        });
    }

    let full = manifest_dir.join(path);
    if !full.exists() {
        return Err(ResolveError::LibraryNotFound(full).into());
    }

    Ok(LibraryInfo { path: full })
}

fn manifest_key(base_dir: &Path, path: &Path) -> Result<PathBuf> {
    let full = base_dir.join(path);
    if !full.exists() {
        return Err(ResolveError::ManifestNotFound(full).into());
    }

    Ok(full.canonicalize()?)
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

struct Graph {
    entries: BTreeMap<PathBuf, (Symbols, PlatformLibrary)>,
    dependency_map: BTreeMap<PathBuf, Vec<PathBuf>>,
    reverse_dependency_map: BTreeMap<PathBuf, Vec<PathBuf>>,
}

fn read_manifests_inner(key: &PathBuf, platform: &str, graph: &mut Graph) -> Result<()> {
    trace!("reading manifest: {}", key.display());

    let manifest = BridgeManifest::from_file(key)?;
    let Some(p_library) = manifest.platform(platform) else {
        return Err(ResolveError::PlatformNotSupported {
            platform: platform.to_string(),
            manifest: key.clone(),
        }
        .into());
    };

    graph
        .entries
        .insert(key.clone(), (manifest.symbols.clone(), p_library.clone()));

    let dir = parent_dir(key);
    let mut deps = Vec::new();

    for dep in &p_library.dependencies {
        if let Dependency::Manifest { path } = dep {
            let dep_key = manifest_key(&dir, path)?;
            deps.push(dep_key.clone());

            if !graph.entries.contains_key(&dep_key) {
                read_manifests_inner(&dep_key, platform, graph)?;
            }

            graph
                .reverse_dependency_map
                .entry(dep_key)
                .or_default()
                .push(key.clone());
        }
    }

    graph.dependency_map.insert(key.clone(), deps);

    Ok(())
}

/// Orders manifests so that each one comes after everything it depends on.
fn load_order(graph: &Graph, platform: &str) -> Result<Vec<PathBuf>> {
    let mut available = Vec::new();
    let mut remain_deps_counts: BTreeMap<&PathBuf, usize> = graph
        .dependency_map
        .iter()
        .map(|(k, v)| (k, v.len()))
        .collect();
    let mut order = Vec::new();

    for (key, count) in remain_deps_counts.iter() {
        if *count == 0 {
            available.push(*key);
        }
    }

    while let Some(key) = available.pop() {
        order.push(key.clone());

        for dependent in graph.reverse_dependency_map.get(key).into_iter().flatten() {
            let Some(count) = remain_deps_counts.get_mut(dependent) else {
                continue;
            };
            *count -= 1;

            if *count == 0 {
                available.push(dependent);
            }
        }
    }

    if order.len() < graph.entries.len() {
        return Err(ResolveError::Cycle(platform.to_string()).into());
    }

    Ok(order)
}

/// Resolves the libraries named by the manifest at `manifest_path` for
/// `platform`, following nested manifests.
pub fn resolve(manifest_path: &Path, platform: &str) -> Result<Resolved> {
    debug!("resolving {} for {}", manifest_path.display(), platform);

    let root = manifest_key(Path::new(""), manifest_path)?;
    let mut graph = Graph {
        entries: BTreeMap::new(),
        dependency_map: BTreeMap::new(),
        reverse_dependency_map: BTreeMap::new(),
    };
    read_manifests_inner(&root, platform, &mut graph)?;

    let order = load_order(&graph, platform)?;

    let mut dependencies: Vec<LibraryInfo> = Vec::new();
    let mut push_unique = |info: LibraryInfo| {
        if !dependencies.contains(&info) {
            dependencies.push(info);
        }
    };

    let mut base = None;
    let mut symbols = Symbols::default();

    for key in &order {
        let (entry_symbols, p_library) = &graph.entries[key];
        let dir = parent_dir(key);

        for dep in &p_library.dependencies {
            if let Dependency::RawLib { path } = dep {
                push_unique(library_info(&dir, path)?);
            }
        }

        let info = library_info(&dir, &p_library.path)?;
        if key == &root {
            base = Some(info);
            symbols = entry_symbols.clone();
        } else {
            push_unique(info);
        }
    }

    // The root depends on every other manifest, so it is always last.
    let base = base.ok_or_else(|| ResolveError::Cycle(platform.to_string()))?;
    dependencies.retain(|d| d != &base);

    debug!(
        "resolved {} with {} dependencies",
        base.path.display(),
        dependencies.len()
    );

    Ok(Resolved {
        base,
        dependencies,
        symbols,
    })
}
