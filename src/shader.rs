//! The gallery's GPU program and the data it consumes.
//!
//! Uniform contract (one block per scene):
//! - `time`: seconds accumulated by the scheduler
//! - `scroll_velocity`: shared normalized velocity in `[-max, max]`
//! - `mouse_enter_amount`: smoothed hover intensity in `[0, 1]`
//! - `mouse_over_pos`: smoothed pointer position in texture space
//! - `quad_size`: current surface size in pixels
//!
//! The functions at the bottom of this module mirror the WGSL math on the CPU
//! so the effect can be reasoned about (and tested) without a device.

use bytemuck::{Pod, Zeroable};
use std::f32::consts::PI;

pub const GALLERY_SHADER: &str = r#"
struct SceneUniform {
  time: f32,
  scroll_velocity: f32,
  mouse_enter_amount: f32,
  _pad0: f32,
  mouse_over_pos: vec2<f32>,
  quad_size: vec2<f32>,
}

@group(0) @binding(0) var<uniform> scene: SceneUniform;
@group(0) @binding(1) var image_tex: texture_2d<f32>;
@group(0) @binding(2) var image_sampler: sampler;

const PI: f32 = 3.141592653589793;
const WAVE_STRENGTH: f32 = -0.04;
const MAX_WAVE_VELOCITY: f32 = 5.0;
const DISTORTION: f32 = 0.02;
const SCROLL_DISTORTION: f32 = 0.2;
const NOISE_SCALE: f32 = 0.01;

struct VertexInput {
  @location(0) position: vec2<f32>,
  @location(1) uv: vec2<f32>,
}

struct VertexOutput {
  @builtin(position) position: vec4<f32>,
  @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
  var p = input.position;
  let v = scene.scroll_velocity;
  p.x = p.x + sin(input.uv.y * PI) * min(abs(v), MAX_WAVE_VELOCITY) * sign(v) * WAVE_STRENGTH;

  var out: VertexOutput;
  out.position = vec4<f32>(p * 2.0, 0.0, 1.0);
  out.uv = input.uv;
  return out;
}

fn mod289_3(x: vec3<f32>) -> vec3<f32> {
  return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn mod289_2(x: vec2<f32>) -> vec2<f32> {
  return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn permute3(x: vec3<f32>) -> vec3<f32> {
  return mod289_3(((x * 34.0) + 1.0) * x);
}

fn snoise(v: vec2<f32>) -> f32 {
  let c = vec4<f32>(0.211324865405187, 0.366025403784439, -0.577350269189626, 0.024390243902439);
  var i = floor(v + dot(v, c.yy));
  let x0 = v - i + dot(i, c.xx);
  var i1 = vec2<f32>(0.0, 1.0);
  if (x0.x > x0.y) {
    i1 = vec2<f32>(1.0, 0.0);
  }
  var x12 = x0.xyxy + c.xxzz;
  x12 = vec4<f32>(x12.xy - i1, x12.zw);
  i = mod289_2(i);
  let p = permute3(permute3(i.y + vec3<f32>(0.0, i1.y, 1.0)) + i.x + vec3<f32>(0.0, i1.x, 1.0));
  var m = max(vec3<f32>(0.5) - vec3<f32>(dot(x0, x0), dot(x12.xy, x12.xy), dot(x12.zw, x12.zw)), vec3<f32>(0.0));
  m = m * m;
  m = m * m;
  let x = 2.0 * fract(p * c.www) - 1.0;
  let h = abs(x) - 0.5;
  let ox = floor(x + 0.5);
  let a0 = x - ox;
  m = m * (1.79284291400159 - 0.85373472095314 * (a0 * a0 + h * h));
  let g = vec3<f32>(a0.x * x0.x + h.x * x0.y, a0.yz * x12.xz + h.yz * x12.yw);
  return 130.0 * dot(m, g);
}

fn circle(uv: vec2<f32>, center: vec2<f32>, radius: f32, border: f32) -> f32 {
  var d = uv - center;
  d.y = d.y * (scene.quad_size.y / max(scene.quad_size.x, 1.0));
  let dist = length(d);
  return 1.0 - smoothstep(radius - border, radius + border, dist);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
  let mask = circle(input.uv, scene.mouse_over_pos, 1.0, 0.2);
  let n = snoise(input.position.xy * NOISE_SCALE + vec2<f32>(scene.time * 0.1, 0.0));
  let amount = scene.mouse_enter_amount + abs(scene.scroll_velocity) * SCROLL_DISTORTION;
  let offset = mix(0.0, mask * n * DISTORTION, amount);
  let tex = textureSample(image_tex, image_sampler, input.uv + vec2<f32>(offset, offset));
  return vec4<f32>(tex.rgb, 1.0);
}
"#;

pub const WAVE_STRENGTH: f32 = -0.04;
pub const MAX_WAVE_VELOCITY: f32 = 5.0;
pub const DISTORTION: f32 = 0.02;
pub const SCROLL_DISTORTION: f32 = 0.2;
const CIRCLE_RADIUS: f32 = 1.0;
const CIRCLE_BORDER: f32 = 0.2;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq, Default)]
pub struct SceneUniforms {
    pub time: f32,
    pub scroll_velocity: f32,
    pub mouse_enter_amount: f32,
    pub _padding: f32,
    pub mouse_over_pos: [f32; 2],
    pub quad_size: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq)]
pub struct MeshVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// A unit quad centred on the origin, subdivided into `segments x segments`
/// cells so the vertex stage has enough vertices to bend smoothly.
pub struct QuadMesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl QuadMesh {
    pub fn subdivided(segments: u32) -> Self {
        let segments = segments.max(1);
        let row = segments + 1;
        let mut vertices = Vec::with_capacity((row * row) as usize);
        for iy in 0..row {
            let v = iy as f32 / segments as f32;
            for ix in 0..row {
                let u = ix as f32 / segments as f32;
                vertices.push(MeshVertex {
                    position: [u - 0.5, v - 0.5],
                    uv: [u, v],
                });
            }
        }

        let mut indices = Vec::with_capacity((segments * segments * 6) as usize);
        for iy in 0..segments {
            for ix in 0..segments {
                let a = iy * row + ix;
                let b = a + 1;
                let c = a + row;
                let d = c + 1;
                indices.extend_from_slice(&[a, b, c, b, d, c]);
            }
        }

        Self { vertices, indices }
    }
}

/// Horizontal vertex offset of the "waving paper" effect.
pub fn wave_displacement(uv_y: f32, scroll_velocity: f32) -> f32 {
    let magnitude = scroll_velocity.abs().min(MAX_WAVE_VELOCITY);
    (uv_y * PI).sin() * magnitude * sign(scroll_velocity) * WAVE_STRENGTH
}

/// Soft disc around the pointer, aspect-corrected by `quad_size`.
pub fn circle_mask(uv: [f32; 2], center: [f32; 2], quad_size: [f32; 2]) -> f32 {
    let dx = uv[0] - center[0];
    let dy = (uv[1] - center[1]) * (quad_size[1] / quad_size[0].max(1.0));
    let dist = (dx * dx + dy * dy).sqrt();
    1.0 - smoothstep(CIRCLE_RADIUS - CIRCLE_BORDER, CIRCLE_RADIUS + CIRCLE_BORDER, dist)
}

/// Texture-coordinate offset applied by the fragment stage.
pub fn perturbation(mask: f32, noise: f32, enter_amount: f32, scroll_velocity: f32) -> f32 {
    let amount = enter_amount + scroll_velocity.abs() * SCROLL_DISTORTION;
    mix(0.0, mask * noise * DISTORTION, amount)
}

/// 2D simplex noise (Ashima Arts / Gustavson variant) matching `snoise` in WGSL.
pub fn simplex2(v: [f32; 2]) -> f32 {
    const C: [f32; 4] = [
        0.211_324_87,
        0.366_025_42,
        -0.577_350_26,
        0.024_390_243,
    ];

    let s = (v[0] + v[1]) * C[1];
    let mut i = [(v[0] + s).floor(), (v[1] + s).floor()];
    let t = (i[0] + i[1]) * C[0];
    let x0 = [v[0] - i[0] + t, v[1] - i[1] + t];
    let i1 = if x0[0] > x0[1] { [1.0, 0.0] } else { [0.0, 1.0] };
    let x1 = [x0[0] + C[0] - i1[0], x0[1] + C[0] - i1[1]];
    let x2 = [x0[0] + C[2], x0[1] + C[2]];

    i = [mod289(i[0]), mod289(i[1])];
    let py = [
        permute(i[1]),
        permute(i[1] + i1[1]),
        permute(i[1] + 1.0),
    ];
    let p = [
        permute(py[0] + i[0]),
        permute(py[1] + i[0] + i1[0]),
        permute(py[2] + i[0] + 1.0),
    ];

    let corners = [x0, x1, x2];
    let mut total = 0.0;
    for (k, corner) in corners.iter().enumerate() {
        let mut m = (0.5 - (corner[0] * corner[0] + corner[1] * corner[1])).max(0.0);
        m *= m;
        m *= m;
        let x = 2.0 * fract(p[k] * C[3]) - 1.0;
        let h = x.abs() - 0.5;
        let a0 = x - (x + 0.5).floor();
        m *= 1.792_842_9 - 0.853_734_7 * (a0 * a0 + h * h);
        total += m * (a0 * corner[0] + h * corner[1]);
    }
    130.0 * total
}

fn mod289(x: f32) -> f32 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

fn permute(x: f32) -> f32 {
    mod289((x * 34.0 + 1.0) * x)
}

fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
