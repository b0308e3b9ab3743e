//! Drives this crate's own `cdylib`, built with the `ffi` feature, as an
//! external strategy library.

#![cfg(all(feature = "ffi", target_os = "linux"))]

use std::{
  env,
  path::{Path, PathBuf},
};

use arenalloc::{
  AllocStrategy, AllocatorStats, Arena, HarnessConfig, Plugin, PluginError, Registry, Workload,
  bench,
};

/// The shared library cargo builds next to the test binary.
fn cdylib_path() -> PathBuf {
  let name = format!("{}arenalloc{}", env::consts::DLL_PREFIX, env::consts::DLL_SUFFIX);
  let exe = env::current_exe().unwrap();
  let deps = exe.parent().unwrap();

  [deps.join(&name), deps.parent().unwrap().join(&name)]
    .into_iter()
    .find(|path| path.exists())
    .unwrap_or_else(|| panic!("{name} not found next to {}", exe.display()))
}

fn load(
  path: &Path,
) -> Plugin {
  match Plugin::load(path) {
    Ok(plugin) => plugin,
    Err(error) => panic!("{error}"),
  }
}

#[test]
fn test_resolve_prefers_loaded_library() {
  let path = cdylib_path();
  let plugin = load(&path);
  assert_eq!(plugin.path(), path);

  let mut buffer = vec![0u8; 1 << 16];
  let mut strategy = Registry::builtin()
    .resolve("best-fit", Some(&plugin), Arena::from_slice(&mut buffer))
    .unwrap();

  let report = Workload {
    ops: 100,
    block_size: 32,
  }
  .run(strategy.as_mut());

  assert_eq!(report.strategy, path.display().to_string());
  assert_eq!(report.failed_allocs, 0);
  assert_eq!(report.stats.requested, 3200);
  assert!(report.stats.allocated >= report.stats.requested);
  assert!(report.utilization() > 0.0);
  assert_eq!(strategy.stats(), AllocatorStats::default());
}

#[test]
fn test_loaded_library_payload_is_usable() {
  let plugin = load(&cdylib_path());
  let mut buffer = vec![0u8; 4096];
  let mut strategy = plugin.instantiate(Arena::from_slice(&mut buffer)).unwrap();

  let first = strategy.alloc(100).unwrap();
  let second = strategy.alloc(100).unwrap();
  assert_ne!(first, second);

  unsafe {
    first.as_ptr().write_bytes(0xAB, 100);
    second.as_ptr().write_bytes(0xCD, 100);
    assert_eq!(*first.as_ptr().add(99), 0xAB);

    strategy.free(first.as_ptr());
    strategy.free(std::ptr::null_mut());
    strategy.free(second.as_ptr());
  }

  assert_eq!(strategy.stats(), AllocatorStats::default());
}

#[test]
fn test_loaded_library_rejects_tiny_arena() {
  let plugin = load(&cdylib_path());
  let mut tiny = [0u8; 4];

  assert!(matches!(
    plugin.instantiate(Arena::from_slice(&mut tiny)),
    Err(PluginError::CreateFailed)
  ));
}

#[test]
fn test_harness_runs_loaded_library() {
  let path = cdylib_path();
  let config = HarnessConfig {
    arena_size: 1 << 16,
    ops: 100,
    block_size: 32,
    ..HarnessConfig::default()
  }
  .with_plugin(&path);

  let report = bench::run(&config, &Registry::builtin()).unwrap();

  assert_eq!(report.strategy, path.display().to_string());
  assert_eq!(report.failed_allocs, 0);
}
