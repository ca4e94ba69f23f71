use tracing::debug;

/// Vertex stage shared by every fullscreen pass: one oversized triangle,
/// exporting `FullscreenOut` for the fragment stage.
pub const FULLSCREEN_VS: &str = include_str!("../shaders/fullscreen.wgsl");

/// Structs, bindings 0..=4 and helpers of the denoise pass.
pub const BMFR_COMMON: &str = include_str!("../shaders/bmfr_common.wgsl");
/// Per-block regression solve, a compute stage.
pub const BMFR_FIT_CS: &str = include_str!("../shaders/bmfr_fit.wgsl");
/// Per-pixel evaluation of the block fits, a fragment stage.
pub const BMFR_APPLY_FS: &str = include_str!("../shaders/bmfr_apply.wgsl");

/// Bytes per `BlockFit` in the fits buffer.
pub const BLOCK_FIT_SIZE: u64 = 192;

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";
pub const COMPUTE_ENTRY: &str = "cs_main";

/// Prepend the fullscreen vertex stage to a fragment shader source.
pub fn compose_fullscreen(fragment: &str) -> String {
    format!("{FULLSCREEN_VS}\n{fragment}")
}

pub fn denoise_fit_source() -> String {
    format!("{BMFR_COMMON}\n{BMFR_FIT_CS}")
}

/// Fragment source; still needs `compose_fullscreen`.
pub fn denoise_apply_fragment() -> String {
    format!("{BMFR_COMMON}\n{BMFR_APPLY_FS}")
}

pub fn load_shader(device: &wgpu::Device, name: &str, source: &str) -> wgpu::ShaderModule {
    debug!(name, "loading shader");
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> naga::Module {
        naga::front::wgsl::parse_str(source)
            .unwrap_or_else(|e| panic!("{}", e.emit_to_string(source)))
    }

    fn validate(source: &str) -> naga::valid::ModuleInfo {
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::empty(),
        )
        .validate(&parse(source))
        .unwrap_or_else(|e| panic!("{}", e.emit_to_string(source)))
    }

    fn entry_points(source: &str) -> Vec<String> {
        parse(source)
            .entry_points
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    fn bound_names(source: &str) -> Vec<String> {
        let module = parse(source);
        let mut bound: Vec<(String, u32)> = module
            .global_variables
            .iter()
            .filter_map(|(_, var)| Some((var.name.clone()?, var.binding.as_ref()?.binding)))
            .collect();
        bound.sort_by_key(|(_, binding)| *binding);
        bound.into_iter().map(|(name, _)| name).collect()
    }

    const NAMED_INPUTS: [&str; 6] = ["gCurFrame", "gPos", "gNorm", "gDiffuseMatl", "params", "fits"];

    #[test]
    fn fit_shader_validates() {
        validate(&denoise_fit_source());
        assert_eq!(entry_points(&denoise_fit_source()), vec![COMPUTE_ENTRY]);
    }

    #[test]
    fn apply_shader_validates_with_both_stages() {
        let source = compose_fullscreen(&denoise_apply_fragment());
        validate(&source);
        let names = entry_points(&source);
        assert!(names.contains(&VERTEX_ENTRY.to_string()));
        assert!(names.contains(&FRAGMENT_ENTRY.to_string()));
    }

    #[test]
    fn both_stages_declare_named_inputs() {
        assert_eq!(bound_names(&denoise_fit_source()), NAMED_INPUTS);
        assert_eq!(
            bound_names(&compose_fullscreen(&denoise_apply_fragment())),
            NAMED_INPUTS
        );
    }

    #[test]
    fn block_fit_matches_buffer_stride() {
        let module = parse(&denoise_fit_source());
        let span = module
            .types
            .iter()
            .find_map(|(_, ty)| match (&ty.name, &ty.inner) {
                (Some(name), naga::TypeInner::Struct { span, .. }) if name == "BlockFit" => {
                    Some(*span)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(u64::from(span), BLOCK_FIT_SIZE);
    }

    #[test]
    fn vertex_stage_alone_validates() {
        validate(FULLSCREEN_VS);
    }
}
