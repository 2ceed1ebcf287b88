// ============================================================================
// GPU SHADERS — WGSL kept inline
// ============================================================================

/// Mipmap generation compute shader. Produces one mip level by averaging 2×2
/// blocks of the level above; edge texels of odd-sized levels clamp.
///
/// `{STORAGE_FORMAT}` is replaced with the WGSL storage texel format.
const MIPMAP_SHADER_TEMPLATE: &str = r#"
@group(0) @binding(0) var src_tex: texture_2d<f32>;
@group(0) @binding(1) var dst_tex: texture_storage_2d<{STORAGE_FORMAT}, write>;

@compute @workgroup_size(16, 16)
fn cs_mipmap(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dst_size = textureDimensions(dst_tex);
    if (gid.x >= dst_size.x || gid.y >= dst_size.y) {
        return;
    }

    let src_max = textureDimensions(src_tex) - vec2<u32>(1u, 1u);
    let x0 = min(gid.x * 2u, src_max.x);
    let y0 = min(gid.y * 2u, src_max.y);
    let x1 = min(x0 + 1u, src_max.x);
    let y1 = min(y0 + 1u, src_max.y);

    let p00 = textureLoad(src_tex, vec2<u32>(x0, y0), 0);
    let p10 = textureLoad(src_tex, vec2<u32>(x1, y0), 0);
    let p01 = textureLoad(src_tex, vec2<u32>(x0, y1), 0);
    let p11 = textureLoad(src_tex, vec2<u32>(x1, y1), 0);

    let avg = (p00 + p10 + p01 + p11) * 0.25;
    textureStore(dst_tex, vec2<u32>(gid.x, gid.y), avg);
}
"#;

/// Mipmap shader for a storage texture of the given WGSL texel format
/// (`rgba8unorm`, `rgba32float`).
pub fn mipmap_shader(storage_format: &str) -> String {
    MIPMAP_SHADER_TEMPLATE.replace("{STORAGE_FORMAT}", storage_format)
}
