/// Value noise shared by the blit passes. Mirrors `veil_render::noise`.
pub const NOISE_WGSL: &str = r#"
fn lattice_hash(p: vec2<i32>) -> f32 {
    var h = bitcast<u32>(p.x) * 374761393u;
    h = (h + bitcast<u32>(p.y)) * 668265263u;
    h = (h ^ (h >> 13u)) * 1274126177u;
    h = h ^ (h >> 16u);
    return f32(h & 0x7fffu) / 32767.0;
}

fn fade(t: vec2<f32>) -> vec2<f32> {
    return t * t * (3.0 - 2.0 * t);
}

fn value_noise(p: vec2<f32>) -> f32 {
    let cell = floor(p);
    let i = vec2<i32>(cell);
    let t = fade(p - cell);
    let a = mix(lattice_hash(i), lattice_hash(i + vec2<i32>(1, 0)), t.x);
    let b = mix(lattice_hash(i + vec2<i32>(0, 1)), lattice_hash(i + vec2<i32>(1, 1)), t.x);
    return mix(a, b, t.y);
}
"#;

/// Per-source draws: the vision stamp and one occluder shadow.
pub const DRAW_SHADER: &str = r#"
struct Draw {
    view_proj: mat4x4<f32>,
    quad: mat4x4<f32>,
    world_to_local: mat4x4<f32>,
    // xyz = world position, w = radius
    source: vec4<f32>,
    shape_min: vec4<f32>,
    shape_max: vec4<f32>,
    // x = reach, y = softness, z = vision falloff
    shadow: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> draw: Draw;

struct QuadOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world: vec3<f32>,
};

@vertex
fn vs_quad(@builtin(vertex_index) index: u32) -> QuadOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-0.5, -0.5),
        vec2<f32>(0.5, -0.5),
        vec2<f32>(0.5, 0.5),
        vec2<f32>(-0.5, -0.5),
        vec2<f32>(0.5, 0.5),
        vec2<f32>(-0.5, 0.5),
    );
    let world = draw.quad * vec4<f32>(corners[index], 0.0, 1.0);
    var clip = draw.view_proj * world;
    // The quad sits at the source's height, which is the far plane.
    clip.z = clamp(clip.z, 0.0, clip.w);

    var out: QuadOutput;
    out.clip_position = clip;
    out.world = world.xyz;
    return out;
}

@fragment
fn fs_vision(in: QuadOutput) -> @location(0) vec4<f32> {
    let radius = draw.source.w;
    let d = distance(in.world.xz, draw.source.xz);
    let v = 1.0 - smoothstep(radius * (1.0 - draw.shadow.z), radius, d);
    return vec4<f32>(v, 0.0, 0.0, 1.0);
}

// Parameter where segment a -> b enters the occluder's local box, or -1.
fn segment_entry(a: vec3<f32>, b: vec3<f32>) -> f32 {
    let d = b - a;
    var t_min = 0.0;
    var t_max = 1.0;
    for (var axis = 0; axis < 3; axis++) {
        let o = a[axis];
        let dir = d[axis];
        let lo = draw.shape_min[axis];
        let hi = draw.shape_max[axis];
        if (abs(dir) < 1e-8) {
            if (o < lo || o > hi) {
                return -1.0;
            }
            continue;
        }
        let inv = 1.0 / dir;
        let t0 = (lo - o) * inv;
        let t1 = (hi - o) * inv;
        t_min = max(t_min, min(t0, t1));
        t_max = min(t_max, max(t0, t1));
        if (t_min > t_max) {
            return -1.0;
        }
    }
    return t_min;
}

@fragment
fn fs_occluder(in: QuadOutput) -> @location(0) vec4<f32> {
    let source = draw.source.xyz;
    let ground = vec3<f32>(in.world.x, source.y, in.world.z);
    let a = (draw.world_to_local * vec4<f32>(source, 1.0)).xyz;
    let b = (draw.world_to_local * vec4<f32>(ground, 1.0)).xyz;
    let t = segment_entry(a, b);
    var shade = 0.0;
    if (t >= 0.0) {
        let beyond = (1.0 - t) * distance(source, ground);
        shade = smoothstep(draw.shadow.x, draw.shadow.x + draw.shadow.y, beyond);
    }
    return vec4<f32>(shade, 0.0, 0.0, 1.0);
}
"#;

/// Full-target passes. `source_tex` is the pass input, `aux_tex` the
/// published visibility for the overlay.
pub const BLIT_SHADER: &str = r#"
struct Blit {
    camera_to_world: mat4x4<f32>,
    // (min.x, min.z, max.x, max.z)
    bounds: vec4<f32>,
    // x = noise scale, y = noise magnitude, z = focal distance, w = base level
    params: vec4<f32>,
    // xy = source texel size, z = destination aspect
    texel: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> blit: Blit;
@group(0) @binding(1)
var source_tex: texture_2d<f32>;
@group(0) @binding(2)
var linear_sampler: sampler;
@group(0) @binding(3)
var aux_tex: texture_2d<f32>;

struct FullscreenOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_fullscreen(@builtin(vertex_index) index: u32) -> FullscreenOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: FullscreenOutput;
    out.clip_position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.uv = uv;
    return out;
}

fn fetch(uv: vec2<f32>) -> f32 {
    return textureSampleLevel(source_tex, linear_sampler, uv, 0.0).r;
}

fn out1(v: f32) -> vec4<f32> {
    return vec4<f32>(v, 0.0, 0.0, 1.0);
}

@fragment
fn fs_accumulate(in: FullscreenOutput) -> @location(0) vec4<f32> {
    return out1(fetch(in.uv));
}

@fragment
fn fs_temporal(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let v = fetch(in.uv);
    let n = value_noise(in.uv * blit.params.x);
    let edge = 4.0 * v * (1.0 - v);
    return out1(clamp(v + (n - 0.5) * blit.params.y * edge, 0.0, 1.0));
}

@fragment
fn fs_saturate(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let x = clamp(fetch(in.uv), 0.0, 1.0);
    return out1(x * x * (3.0 - 2.0 * x));
}

fn gaussian(uv: vec2<f32>, stride: vec2<f32>) -> f32 {
    var weights = array<f32, 5>(0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216);
    var sum = weights[0] * fetch(uv);
    for (var i = 1; i < 5; i++) {
        let offset = stride * f32(i);
        sum += weights[i] * (fetch(uv + offset) + fetch(uv - offset));
    }
    return sum;
}

@fragment
fn fs_blur_h(in: FullscreenOutput) -> @location(0) vec4<f32> {
    return out1(gaussian(in.uv, vec2<f32>(blit.texel.x, 0.0)));
}

@fragment
fn fs_blur_v(in: FullscreenOutput) -> @location(0) vec4<f32> {
    return out1(gaussian(in.uv, vec2<f32>(0.0, blit.texel.y)));
}

@fragment
fn fs_upsample(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let h = 0.5 * blit.texel.xy;
    let v = fetch(in.uv + vec2<f32>(-h.x, -h.y))
        + fetch(in.uv + vec2<f32>(h.x, -h.y))
        + fetch(in.uv + vec2<f32>(-h.x, h.y))
        + fetch(in.uv + vec2<f32>(h.x, h.y));
    return out1(0.25 * v);
}

@fragment
fn fs_overlay(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let ndc = vec2<f32>(in.uv.x * 2.0 - 1.0, 1.0 - in.uv.y * 2.0);
    let local = vec3<f32>(ndc.x * blit.texel.z, ndc.y, -blit.params.z);
    let dir = normalize((blit.camera_to_world * vec4<f32>(local, 0.0)).xyz);
    let origin = blit.camera_to_world[3].xyz;

    var visibility = 0.0;
    if (abs(dir.y) > 1e-6) {
        let t = -origin.y / dir.y;
        if (t > 0.0) {
            let hit = (origin + dir * t).xz;
            let area_uv = (hit - blit.bounds.xy) / (blit.bounds.zw - blit.bounds.xy);
            if (all(area_uv >= vec2<f32>(0.0)) && all(area_uv <= vec2<f32>(1.0))) {
                visibility = textureSampleLevel(aux_tex, linear_sampler, area_uv, 0.0).r;
            }
        }
    }

    let colour = textureSampleLevel(source_tex, linear_sampler, in.uv, 0.0);
    let base = blit.params.w;
    let light = base + (1.0 - base) * clamp(visibility, 0.0, 1.0);
    return vec4<f32>(colour.rgb * light, colour.a);
}
"#;

/// Debug lines for the visibility-area outline.
pub const LINE_SHADER: &str = r#"
struct Uniforms {
    view_proj: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

struct LineVertex {
    @location(0) position: vec3<f32>,
    @location(1) color: vec4<f32>,
};

struct LineOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_line(vertex: LineVertex) -> LineOutput {
    var out: LineOutput;
    out.clip_position = uniforms.view_proj * vec4<f32>(vertex.position, 1.0);
    out.color = vertex.color;
    return out;
}

@fragment
fn fs_line(in: LineOutput) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

/// Blit module source with the noise helpers prepended.
pub fn blit_source() -> String {
    format!("{NOISE_WGSL}{BLIT_SHADER}")
}
