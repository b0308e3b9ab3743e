use std::{
  ffi::{CStr, CString},
  mem,
  os::unix::ffi::OsStrExt,
  path::{Path, PathBuf},
  ptr::NonNull,
};

use libc::c_void;
use log::debug;

use crate::{
  arena::Arena,
  error::PluginError,
  strategy::{AllocStrategy, AllocatorStats},
};

type CreateFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;
type DestroyFn = unsafe extern "C" fn(*mut c_void);
type AllocFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;
type FreeFn = unsafe extern "C" fn(*mut c_void, *mut c_void);
type StatsFn = unsafe extern "C" fn(*mut c_void) -> AllocatorStats;

pub const CREATE_SYMBOL: &CStr = c"allocator_create";
pub const DESTROY_SYMBOL: &CStr = c"allocator_destroy";
pub const ALLOC_SYMBOL: &CStr = c"allocator_alloc";
pub const FREE_SYMBOL: &CStr = c"allocator_free";
pub const STATS_SYMBOL: &CStr = c"allocator_get_stats";

/// A strategy library opened with `dlopen` whose five contract symbols all
/// resolved. A library missing any one of them is never constructed.
pub struct Plugin {
  path: PathBuf,
  name: String,
  library: NonNull<c_void>,
  create: CreateFn,
  destroy: DestroyFn,
  alloc: AllocFn,
  free: FreeFn,
  stats: StatsFn,
}

impl Plugin {
  pub fn load(
    path: &Path,
  ) -> Result<Self, PluginError> {
    let open_error = |reason: String| PluginError::Open {
      path: path.to_path_buf(),
      reason,
    };

    let c_path = CString::new(path.as_os_str().as_bytes())
      .map_err(|_| open_error("path contains a NUL byte".to_string()))?;

    let library = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_LAZY | libc::RTLD_LOCAL) };
    let library = NonNull::new(library).ok_or_else(|| open_error(last_dl_error()))?;

    match unsafe { Self::bind(path, library) } {
      Ok(plugin) => {
        debug!("loaded strategy library {}", path.display());
        Ok(plugin)
      }
      Err(error) => {
        unsafe { libc::dlclose(library.as_ptr()) };
        Err(error)
      }
    }
  }

  /// # Safety
  ///
  /// `library` must be a live `dlopen` handle whose contract symbols, when
  /// present, have the C signatures of the allocator contract.
  unsafe fn bind(
    path: &Path,
    library: NonNull<c_void>,
  ) -> Result<Self, PluginError> {
    unsafe {
      Self::bind_with(path, library, |symbol| {
        libc::dlsym(library.as_ptr(), symbol.as_ptr())
      })
    }
  }

  /// Resolves all five contract symbols through `lookup`, failing on the
  /// first one it cannot find.
  ///
  /// # Safety
  ///
  /// Every non-null address `lookup` returns must be a function with the C
  /// signature of the named contract symbol, and `library` must be a handle
  /// `dlclose` accepts once the plugin is dropped.
  unsafe fn bind_with<F>(
    path: &Path,
    library: NonNull<c_void>,
    lookup: F,
  ) -> Result<Self, PluginError>
  where
    F: Fn(&CStr) -> *mut c_void,
  {
    let resolve = |symbol: &'static CStr| {
      let address = lookup(symbol);

      if address.is_null() {
        return Err(PluginError::MissingSymbol {
          path: path.to_path_buf(),
          symbol: symbol.to_str().unwrap_or("?"),
        });
      }

      Ok(address)
    };

    unsafe {
      Ok(Self {
        path: path.to_path_buf(),
        name: path.display().to_string(),
        library,
        create: mem::transmute::<*mut c_void, CreateFn>(resolve(CREATE_SYMBOL)?),
        destroy: mem::transmute::<*mut c_void, DestroyFn>(resolve(DESTROY_SYMBOL)?),
        alloc: mem::transmute::<*mut c_void, AllocFn>(resolve(ALLOC_SYMBOL)?),
        free: mem::transmute::<*mut c_void, FreeFn>(resolve(FREE_SYMBOL)?),
        stats: mem::transmute::<*mut c_void, StatsFn>(resolve(STATS_SYMBOL)?),
      })
    }
  }

  pub fn path(
    &self,
  ) -> &Path {
    &self.path
  }

  /// Creates a plugin handle over `arena`; the plugin writes its metadata
  /// into the arena just like a built-in strategy.
  pub fn instantiate<'a>(
    &'a self,
    arena: Arena<'a>,
  ) -> Result<PluginStrategy<'a>, PluginError> {
    let handle = unsafe { (self.create)(arena.base().as_ptr().cast(), arena.capacity()) };
    let handle = NonNull::new(handle).ok_or(PluginError::CreateFailed)?;

    Ok(PluginStrategy {
      plugin: self,
      handle,
      _arena: arena,
    })
  }
}

impl Drop for Plugin {
  fn drop(
    &mut self,
  ) {
    unsafe { libc::dlclose(self.library.as_ptr()) };
  }
}

/// One live handle created by a [`Plugin`]; destroyed on drop.
pub struct PluginStrategy<'a> {
  plugin: &'a Plugin,
  handle: NonNull<c_void>,
  _arena: Arena<'a>,
}

impl AllocStrategy for PluginStrategy<'_> {
  fn name(
    &self,
  ) -> &str {
    &self.plugin.name
  }

  fn alloc(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let address = unsafe { (self.plugin.alloc)(self.handle.as_ptr(), size) };
    NonNull::new(address.cast::<u8>())
  }

  unsafe fn free(
    &mut self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }

    unsafe { (self.plugin.free)(self.handle.as_ptr(), ptr.cast()) }
  }

  fn stats(
    &self,
  ) -> AllocatorStats {
    unsafe { (self.plugin.stats)(self.handle.as_ptr()) }
  }
}

impl Drop for PluginStrategy<'_> {
  fn drop(
    &mut self,
  ) {
    unsafe { (self.plugin.destroy)(self.handle.as_ptr()) }
  }
}

fn last_dl_error() -> String {
  let message = unsafe { libc::dlerror() };

  if message.is_null() {
    return "unknown dynamic loader error".to_string();
  }

  unsafe { CStr::from_ptr(message) }
    .to_string_lossy()
    .into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_load_missing_library() {
    let path = Path::new("/nonexistent/libstrategy.so");

    match Plugin::load(path) {
      Err(PluginError::Open { path: failed, .. }) => assert_eq!(failed, path),
      Err(other) => panic!("unexpected error {other}"),
      Ok(_) => panic!("loaded a library that does not exist"),
    }
  }

  #[test]
  fn test_load_path_with_nul() {
    let path = Path::new("lib\0strategy.so");
    assert!(matches!(Plugin::load(path), Err(PluginError::Open { .. })));
  }

  #[test]
  #[cfg(all(target_os = "linux", target_env = "gnu"))]
  fn test_load_library_without_contract() {
    // libc resolves fine but exports none of the contract symbols
    let path = Path::new("libc.so.6");

    match Plugin::load(path) {
      Err(PluginError::MissingSymbol { symbol, .. }) => assert_eq!(symbol, "allocator_create"),
      Err(other) => panic!("unexpected error {other}"),
      Ok(_) => panic!("libc does not implement the allocator contract"),
    }
  }

  #[test]
  fn test_partial_symbol_set_is_rejected() {
    extern "C" fn unused() {}

    let path = Path::new("libpartial.so");
    let lookup = |symbol: &CStr| {
      if symbol == STATS_SYMBOL {
        std::ptr::null_mut()
      } else {
        unused as *const () as *mut c_void
      }
    };

    match unsafe { Plugin::bind_with(path, NonNull::dangling(), lookup) } {
      Err(PluginError::MissingSymbol { path: failed, symbol }) => {
        assert_eq!(failed, path);
        assert_eq!(symbol, "allocator_get_stats");
      }
      Err(other) => panic!("unexpected error {other}"),
      Ok(plugin) => {
        mem::forget(plugin);
        panic!("bound a library missing `allocator_get_stats`");
      }
    }
  }
}
