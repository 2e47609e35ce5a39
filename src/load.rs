use crate::error::BridgeError;
use crate::manifest::ANY_PLATFORM;
use crate::resolve::{resolve, ResolveError, Resolved};
use crate::signature::{ForeignSignature, Invoke};
use anyhow::{anyhow, Result};
#[cfg(unix)]
use libloading::os::unix::{
    Library as LLNativeLibrary, // LL means libloading
    Symbol,
    RTLD_LOCAL,
    RTLD_NOW,
};
#[cfg(windows)]
use libloading::os::windows::{
    Library as LLNativeLibrary, // LL means libloading
    Symbol,
};
use log::{debug, trace};
use std::ops::Deref;
use std::path::Path;

/// A callable foreign function with the signature `(Args) -> Res`.
///
/// `Loaded` holds a symbol resolved from a [`NativeLibrary`] and is only valid
/// while that library is alive. `Linked` is a function compiled into the
/// current binary.
pub enum Function<Args, Res>
where
    (Args, Res): ForeignSignature,
{
    Loaded(Symbol<<(Args, Res) as ForeignSignature>::Pointer>),
    Linked(<(Args, Res) as ForeignSignature>::Pointer),
}

impl<Args, Res> Function<Args, Res>
where
    (Args, Res): ForeignSignature,
    Args: Invoke<Res>,
{
    pub fn pointer(&self) -> <(Args, Res) as ForeignSignature>::Pointer {
        match self {
            Function::Loaded(symbol) => *symbol.deref(),
            Function::Linked(pointer) => *pointer,
        }
    }

    /// Calls the function.
    ///
    /// The caller keeps the promise made when the function was obtained: the
    /// symbol really has this signature and its library is still loaded.
    pub fn call(&self, args: Args) -> Res {
        unsafe { args.invoke(self.pointer()) }
    }
}

/// An OS-native library together with the libraries it was loaded after.
///
/// Owning the dependencies keeps them from being unloaded before the library
/// that needs them.
pub struct NativeLibrary {
    pub raw_library: LLNativeLibrary,
    pub raw_dependencies: Vec<LLNativeLibrary>,
}

impl NativeLibrary {
    pub(crate) fn new(raw_library: LLNativeLibrary, raw_dependencies: Vec<LLNativeLibrary>) -> Self {
        Self {
            raw_library,
            raw_dependencies,
        }
    }

    /// Resolves `name` with the given signature.
    ///
    /// Nothing checks that the signature matches the exported symbol; it is
    /// taken from the manifest or the caller's knowledge of the library.
    pub fn get_function<Args, Res>(&self, name: &str) -> Result<Function<Args, Res>>
    where
        (Args, Res): ForeignSignature,
        Args: Invoke<Res>,
    {
        trace!("resolving symbol: {}", name);

        let symbol: Symbol<<(Args, Res) as ForeignSignature>::Pointer> =
            unsafe { self.raw_library.get(name.as_bytes()) }.map_err(|e| {
                BridgeError::MissingSymbol {
                    symbol: name.to_string(),
                    reason: e.to_string(),
                }
            })?;

        Ok(Function::Loaded(symbol))
    }
}

#[cfg(unix)]
unsafe fn libloading_load(path: &Path) -> Result<LLNativeLibrary> {
    LLNativeLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL)
        .map_err(|e| anyhow!("Failed to load {}: {}", path.display(), e))
}

#[cfg(windows)]
unsafe fn libloading_load(path: &Path) -> Result<LLNativeLibrary> {
    LLNativeLibrary::new(path).map_err(|e| anyhow!("Failed to load {}: {}", path.display(), e))
}

/// Opens a single library without a manifest.
pub fn load_library<P: AsRef<Path>>(path: P) -> Result<NativeLibrary> {
    let path = path.as_ref();
    debug!("loading library: {}", path.display());

    let lib = unsafe { libloading_load(path)? };
    Ok(NativeLibrary::new(lib, Vec::new()))
}

pub(crate) fn load_resolved(resolved: &Resolved) -> Result<NativeLibrary> {
    let mut dependency_libs = Vec::new();

    // Load dependencies in order before the main library.
    for d in &resolved.dependencies {
        trace!("loading dependency: {}", d.path.display());
        let lib = unsafe { libloading_load(&d.path)? };
        dependency_libs.push(lib);
    }

    trace!("loading base library: {}", resolved.base.path.display());
    let lib = unsafe { libloading_load(&resolved.base.path)? };

    Ok(NativeLibrary::new(lib, dependency_libs))
}

/// Resolves the manifest for `platform` and loads its libraries.
pub fn load_with_platform(manifest_path: &Path, platform: &str) -> Result<NativeLibrary> {
    debug!("toplevel-load with {}: {}", platform, manifest_path.display());

    let resolved = resolve(manifest_path, platform)?;
    load_resolved(&resolved)
}

/// Resolves `manifest_path` for the build target, falling back to the
/// manifest's `any` entry when the target is not listed.
pub fn resolve_for_this_platform(manifest_path: &Path) -> Result<Resolved> {
    let this_platform = env!("TARGET_TRIPLE");

    match resolve(manifest_path, this_platform) {
        Ok(v) => Ok(v),
        Err(e) => {
            if let Some(m) = e.downcast_ref::<ResolveError>() {
                if matches!(m, ResolveError::PlatformNotSupported { .. }) {
                    debug!("Failed to load with this platform: {}", m);

                    return resolve(manifest_path, ANY_PLATFORM);
                }
            }
            Err(e)
        }
    }
}

/// Loads the manifest's libraries for the build target, with the `any`
/// fallback.
pub fn load(manifest_path: &Path) -> Result<NativeLibrary> {
    let resolved = resolve_for_this_platform(manifest_path)?;
    let lib = load_resolved(&resolved)?;

    debug!("loaded: {}", manifest_path.display());

    Ok(lib)
}
