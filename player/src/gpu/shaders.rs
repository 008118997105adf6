//! Kernel shader sources.
//!
//! One WGSL file per kernel, each with a single entry point of the same name.

use cellsynth_core::KernelError;

/// Grid step (`advance`).
pub(super) const ADVANCE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/advance.wgsl"));

/// Grid to RGBA8 (`visualize`).
pub(super) const VISUALIZE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/visualize.wgsl"));

/// Per-group partial audio (`render`).
pub(super) const RENDER: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/render.wgsl"));

/// Pairwise audio reduction (`reduce`).
pub(super) const REDUCE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/reduce.wgsl"));

/// Every kernel as `(entry point, source)`.
pub(super) const KERNELS: [(&str, &str); 4] = [
    ("advance", ADVANCE),
    ("visualize", VISUALIZE),
    ("render", RENDER),
    ("reduce", REDUCE),
];

/// Parse and validate a kernel with naga so build errors surface with a
/// readable message before wgpu sees the module.
pub(super) fn validate(kernel: &'static str, source: &str) -> Result<(), KernelError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| KernelError::Build {
        kernel,
        message: e.emit_to_string(source),
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| KernelError::Build {
            kernel,
            message: format!("{e:?}"),
        })?;

    let has_entry = module.entry_points.iter().any(|ep| ep.name == kernel);
    if !has_entry {
        return Err(KernelError::Build {
            kernel,
            message: format!("missing entry point `{kernel}`"),
        });
    }
    Ok(())
}
