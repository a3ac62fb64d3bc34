//! Compute kernel source generation
//!
//! The device kernel is produced by templating WGSL text around the chosen
//! thread-group shape. Any change of [`ThreadGroupConfig`] means a new source
//! text, a new persisted artifact and a recompile on the active backend.
//!
//! The generated module has two entry points sharing one
//! `@workgroup_size(X, Y, 1)` directive:
//!
//! - `main_1d`: thread `x` (row `y == 0`) owns bodies `[x*N/X, (x+1)*N/X)`
//!   and writes one force per body.
//! - `main_2d`: thread `(x, y)` owns the same body range but only sums the
//!   sources in `[y*N/Y, (y+1)*N/Y)`, writing the partial to row slot
//!   `i*Y + y`. The host adds up each body's row.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Axis, SimResult, SimulationError};

/// Largest exponent offered by the thread-group selectors (2^10 = 1024)
pub const MAX_THREAD_EXPONENT: u32 = 10;
/// Largest thread count per axis
pub const MAX_THREADS_PER_AXIS: u32 = 1 << MAX_THREAD_EXPONENT;

/// Device kernel entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelEntry {
    OneDimensional,
    TwoDimensional,
}

impl KernelEntry {
    pub fn name(self) -> &'static str {
        match self {
            KernelEntry::OneDimensional => "main_1d",
            KernelEntry::TwoDimensional => "main_2d",
        }
    }
}

/// Thread-group shape (X, Y); each axis a power of two in `1..=1024`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadGroupConfig {
    x: u32,
    y: u32,
}

impl Default for ThreadGroupConfig {
    fn default() -> Self {
        Self { x: 1, y: 1 }
    }
}

impl ThreadGroupConfig {
    pub fn new(x: u32, y: u32) -> SimResult<Self> {
        Ok(Self {
            x: Self::check_axis(Axis::X, x)?,
            y: Self::check_axis(Axis::Y, y)?,
        })
    }

    /// Build from selector exponents, i.e. `(2^kx, 2^ky)`
    pub fn from_exponents(kx: u32, ky: u32) -> SimResult<Self> {
        let axis_value = |axis, k: u32| {
            if k > MAX_THREAD_EXPONENT {
                Err(SimulationError::ThreadGroupOutOfRange {
                    axis,
                    value: 1u32.checked_shl(k).unwrap_or(u32::MAX),
                    max: MAX_THREADS_PER_AXIS,
                })
            } else {
                Ok(1u32 << k)
            }
        };
        Self::new(axis_value(Axis::X, kx)?, axis_value(Axis::Y, ky)?)
    }

    fn check_axis(axis: Axis, value: u32) -> SimResult<u32> {
        if value == 0 || value > MAX_THREADS_PER_AXIS {
            return Err(SimulationError::ThreadGroupOutOfRange {
                axis,
                value,
                max: MAX_THREADS_PER_AXIS,
            });
        }
        if !value.is_power_of_two() {
            return Err(SimulationError::ThreadGroupNotPowerOfTwo { axis, value });
        }
        Ok(value)
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// Invocations in one workgroup
    pub fn threads(&self) -> u32 {
        self.x * self.y
    }

    /// Stable name encoding both axes, e.g. `2_1`
    pub fn tag(&self) -> String {
        format!("{}_{}", self.x, self.y)
    }

    /// Check the dispatch preconditions against a population of `bodies`
    pub fn validate_for(&self, entry: KernelEntry, bodies: usize) -> SimResult<()> {
        if self.x as usize > bodies {
            return Err(SimulationError::ThreadGroupExceedsPopulation {
                axis: Axis::X,
                threads: self.x,
                bodies,
            });
        }
        if entry == KernelEntry::TwoDimensional && self.y as usize > bodies {
            return Err(SimulationError::ThreadGroupExceedsPopulation {
                axis: Axis::Y,
                threads: self.y,
                bodies,
            });
        }
        Ok(())
    }

    /// Number of result slots the entry point writes for `bodies`
    pub fn result_len(&self, entry: KernelEntry, bodies: usize) -> usize {
        match entry {
            KernelEntry::OneDimensional => bodies,
            KernelEntry::TwoDimensional => bodies * self.y as usize,
        }
    }
}

/// Generated kernel text together with the shape it was generated for
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSource {
    pub config: ThreadGroupConfig,
    pub text: String,
}

impl KernelSource {
    /// Artifact name, e.g. `generated_kernel_2_1`
    pub fn name(&self) -> String {
        format!("generated_kernel_{}", self.config.tag())
    }
}

/// Templates the WGSL gravity kernel for a thread-group shape
#[derive(Debug, Default, Clone)]
pub struct KernelSourceGenerator;

impl KernelSourceGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, config: ThreadGroupConfig) -> KernelSource {
        let x = config.x();
        let y = config.y();
        let text = format!(
            r#"// Generated gravity kernel: workgroup {x}x{y}
struct Body {{
    position: vec3<f32>,
    mass: f32,
}}

struct Params {{
    body_count: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}}

@group(0) @binding(0) var<storage, read> bodies: array<Body>;
@group(0) @binding(1) var<storage, read_write> results: array<vec4<f32>>;
@group(0) @binding(2) var<uniform> params: Params;

const G: f32 = 6.675e-11;
const NUM_THREADS_X: u32 = {x}u;
const NUM_THREADS_Y: u32 = {y}u;

fn pair_force(body: Body, other: Body) -> vec3<f32> {{
    let separation = other.position - body.position;
    if (all(separation == vec3<f32>(0.0, 0.0, 0.0))) {{
        return vec3<f32>(0.0, 0.0, 0.0);
    }}
    let dist = length(separation);
    let size = G * ((body.mass * other.mass) / dist);
    return (separation / dist) * size;
}}

@compute @workgroup_size({x}, {y}, 1)
fn main_1d(@builtin(local_invocation_id) id: vec3<u32>) {{
    if (id.y != 0u) {{
        return;
    }}
    let n = params.body_count;
    let start_x = id.x * n / NUM_THREADS_X;
    let end_x = (id.x + 1u) * n / NUM_THREADS_X;

    for (var i = start_x; i < end_x; i = i + 1u) {{
        if (i >= n) {{
            continue;
        }}
        let current = bodies[i];
        var total = vec3<f32>(0.0, 0.0, 0.0);
        for (var j = 0u; j < n; j = j + 1u) {{
            total = total + pair_force(current, bodies[j]);
        }}
        results[i] = vec4<f32>(total, 0.0);
    }}
}}

@compute @workgroup_size({x}, {y}, 1)
fn main_2d(@builtin(local_invocation_id) id: vec3<u32>) {{
    let n = params.body_count;
    let start_x = id.x * n / NUM_THREADS_X;
    let end_x = (id.x + 1u) * n / NUM_THREADS_X;
    let start_y = id.y * n / NUM_THREADS_Y;
    let end_y = (id.y + 1u) * n / NUM_THREADS_Y;

    for (var i = start_x; i < end_x; i = i + 1u) {{
        if (i >= n) {{
            continue;
        }}
        let current = bodies[i];
        var partial = vec3<f32>(0.0, 0.0, 0.0);
        for (var j = start_y; j < end_y; j = j + 1u) {{
            partial = partial + pair_force(current, bodies[j]);
        }}
        results[i * NUM_THREADS_Y + id.y] = vec4<f32>(partial, 0.0);
    }}
}}
"#
        );

        log::debug!("Generated kernel source for thread groups {}", config.tag());
        KernelSource { config, text }
    }
}

/// Read the `@workgroup_size(x, y, z)` directive back out of kernel text
pub fn parse_workgroup_size(text: &str) -> Option<(u32, u32, u32)> {
    let start = text.find("@workgroup_size(")? + "@workgroup_size(".len();
    let end = start + text[start..].find(')')?;
    let mut dims = text[start..end]
        .split(',')
        .map(|part| part.trim().parse::<u32>().ok());

    let x = dims.next()??;
    let y = dims.next().flatten().unwrap_or(1);
    let z = dims.next().flatten().unwrap_or(1);
    Some((x, y, z))
}

/// Keeps exactly one generated kernel artifact on disk
#[derive(Debug)]
pub struct KernelArtifactStore {
    directory: Option<PathBuf>,
    current: Option<PathBuf>,
}

impl KernelArtifactStore {
    /// Store writing into `directory`; `None` disables persistence
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self {
            directory,
            current: None,
        }
    }

    /// Delete the previous artifact (if any) and write `source`
    ///
    /// Returns the path written, or `None` when persistence is disabled.
    pub fn replace(&mut self, source: &KernelSource) -> SimResult<Option<PathBuf>> {
        self.clear()?;

        let Some(directory) = &self.directory else {
            return Ok(None);
        };

        fs::create_dir_all(directory)?;
        let path = directory.join(format!("{}.wgsl", source.name()));
        fs::write(&path, &source.text)?;
        log::info!("Wrote kernel artifact {}", path.display());

        self.current = Some(path.clone());
        Ok(Some(path))
    }

    /// Remove the current artifact
    pub fn clear(&mut self) -> SimResult<()> {
        if let Some(previous) = self.current.take() {
            if previous.exists() {
                fs::remove_file(&previous)?;
                log::debug!("Deleted kernel artifact {}", previous.display());
            }
        }
        Ok(())
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_group_validation() {
        assert!(ThreadGroupConfig::new(1, 1).is_ok());
        assert!(ThreadGroupConfig::new(1024, 2).is_ok());
        assert!(matches!(
            ThreadGroupConfig::new(3, 1),
            Err(SimulationError::ThreadGroupNotPowerOfTwo { axis: Axis::X, value: 3 })
        ));
        assert!(matches!(
            ThreadGroupConfig::new(1, 2048),
            Err(SimulationError::ThreadGroupOutOfRange { axis: Axis::Y, .. })
        ));
        assert!(ThreadGroupConfig::new(0, 1).is_err());
    }

    #[test]
    fn test_from_exponents() {
        let config = ThreadGroupConfig::from_exponents(5, 2).unwrap();
        assert_eq!((config.x(), config.y()), (32, 4));
        assert!(ThreadGroupConfig::from_exponents(11, 0).is_err());
    }

    #[test]
    fn test_thread_group_equal_to_population_is_valid() {
        let config = ThreadGroupConfig::new(4, 4).unwrap();
        assert!(config.validate_for(KernelEntry::OneDimensional, 4).is_ok());
        assert!(config.validate_for(KernelEntry::TwoDimensional, 4).is_ok());

        let err = config
            .validate_for(KernelEntry::OneDimensional, 3)
            .unwrap_err();
        assert!(err.is_configuration());

        let tall = ThreadGroupConfig::new(1, 8).unwrap();
        assert!(tall.validate_for(KernelEntry::OneDimensional, 4).is_ok());
        assert!(tall.validate_for(KernelEntry::TwoDimensional, 4).is_err());
    }

    #[test]
    fn test_generated_source_encodes_shape() {
        let generator = KernelSourceGenerator::new();
        let source = generator.generate(ThreadGroupConfig::new(64, 4).unwrap());

        assert_eq!(parse_workgroup_size(&source.text), Some((64, 4, 1)));
        assert!(source.text.contains("const NUM_THREADS_X: u32 = 64u;"));
        assert!(source.text.contains("const NUM_THREADS_Y: u32 = 4u;"));
        assert!(source.text.contains("fn main_1d"));
        assert!(source.text.contains("fn main_2d"));
        assert!(source.text.contains("6.675e-11"));
        assert_eq!(source.name(), "generated_kernel_64_4");
    }

    #[test]
    fn test_parse_workgroup_size_defaults() {
        assert_eq!(parse_workgroup_size("@workgroup_size(8)"), Some((8, 1, 1)));
        assert_eq!(parse_workgroup_size("@workgroup_size(x)"), None);
        assert_eq!(parse_workgroup_size("no directive"), None);
    }

    #[test]
    fn test_artifact_store_keeps_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let generator = KernelSourceGenerator::new();
        let mut store = KernelArtifactStore::new(Some(dir.path().to_path_buf()));

        let first = store
            .replace(&generator.generate(ThreadGroupConfig::default()))
            .unwrap()
            .unwrap();
        assert!(first.ends_with("generated_kernel_1_1.wgsl"));
        assert!(first.exists());

        let second = store
            .replace(&generator.generate(ThreadGroupConfig::new(2, 1).unwrap()))
            .unwrap()
            .unwrap();
        assert!(!first.exists());
        assert!(second.exists());
        assert!(second.file_name().unwrap().to_string_lossy().contains("2_1"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        store.clear().unwrap();
        assert!(!second.exists());
        assert!(store.current().is_none());
    }

    #[test]
    fn test_artifact_store_without_directory() {
        let mut store = KernelArtifactStore::new(None);
        let source = KernelSourceGenerator::new().generate(ThreadGroupConfig::default());
        assert_eq!(store.replace(&source).unwrap(), None);
        assert!(store.current().is_none());
    }
}
