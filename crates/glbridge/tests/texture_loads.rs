#![cfg(not(target_arch = "wasm32"))]

use std::io::Cursor;
use std::time::Duration;

use glbridge::consts::*;
use glbridge::{
    Bridge, BridgeConfig, Category, ContextAttributes, DecoderMode, GlContext, GuestMemory,
    RecordingHost, RecordingProvider, SamplerParams,
};
use image::{ImageFormat, Rgba, RgbaImage};
use pretty_assertions::assert_eq;
use serde_json::json;

const MIME_PTR: u32 = 16;
const WIDTH_PTR: u32 = 200;
const HEIGHT_PTR: u32 = 202;
const DATA_PTR: u32 = 256;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn bridge_with(config: &BridgeConfig) -> Bridge<RecordingHost> {
    let mut provider = RecordingProvider::primary();
    let ctx = GlContext::negotiate(&mut provider, &ContextAttributes::default()).unwrap();
    Bridge::new(ctx, config).unwrap()
}

fn deferred() -> Bridge<RecordingHost> {
    bridge_with(&BridgeConfig {
        decoder: DecoderMode::Deferred,
        ..BridgeConfig::default()
    })
}

/// Guest memory holding a PNG at `DATA_PTR`, its MIME type at `MIME_PTR` and 0xAA elsewhere.
fn guest_with_png(png: &[u8]) -> Vec<u8> {
    let mut buf = vec![0xAAu8; DATA_PTR as usize + png.len() + 64];
    buf[MIME_PTR as usize..MIME_PTR as usize + 9].copy_from_slice(b"image/png");
    buf[DATA_PTR as usize..DATA_PTR as usize + png.len()].copy_from_slice(png);
    buf
}

fn start_load(bridge: &mut Bridge<RecordingHost>, buf: &mut [u8], png_len: usize, sampler: SamplerParams) -> u32 {
    let mem = GuestMemory::new(buf);
    bridge
        .load_texture_image(
            &mem,
            DATA_PTR,
            png_len as u32,
            MIME_PTR,
            9,
            WIDTH_PTR,
            HEIGHT_PTR,
            sampler,
        )
        .unwrap()
}

fn dims(buf: &[u8]) -> (u16, u16) {
    let at = |p: u32| u16::from_le_bytes([buf[p as usize], buf[p as usize + 1]]);
    (at(WIDTH_PTR), at(HEIGHT_PTR))
}

#[test]
fn completed_load_uploads_and_writes_dimensions() {
    let mut bridge = deferred();
    let png = png_bytes(5, 3);
    let mut buf = guest_with_png(&png);
    let texture = start_load(&mut bridge, &mut buf, png.len(), SamplerParams::default());
    assert_eq!(bridge.pending_loads(), 1);
    assert!(bridge.host().calls_named("texImage2D").is_empty());

    let applied = bridge.pump_completions(&mut GuestMemory::new(&mut buf));
    assert_eq!(applied, 1);
    assert_eq!(bridge.pending_loads(), 0);
    assert_eq!(dims(&buf), (5, 3));
    // Neighbouring bytes are untouched.
    assert_eq!(buf[WIDTH_PTR as usize - 1], 0xAA);
    assert_eq!(buf[HEIGHT_PTR as usize + 2], 0xAA);

    let host = bridge.host();
    let upload = host.calls_named("texImage2D");
    assert_eq!(upload.len(), 1);
    assert_eq!(upload[0].args["width"], json!(5));
    assert_eq!(upload[0].args["height"], json!(3));
    assert_eq!(upload[0].args["pixels"], json!(5 * 3 * 4));
    assert_eq!(host.calls_named("texParameteri").len(), 4);
    assert!(host.calls_named("generateMipmap").is_empty());
    assert_eq!(host.calls_named("bindTexture").last().unwrap().args["texture"], json!(null));
    assert!(bridge.bind_texture(TEXTURE_2D, texture).is_ok());
    assert_eq!(bridge.stats().snapshot().completions_applied, 1);
}

#[test]
fn mipmap_min_filter_generates_mipmaps() {
    let mut bridge = deferred();
    let png = png_bytes(4, 4);
    let mut buf = guest_with_png(&png);
    let sampler = SamplerParams {
        min_filter: LINEAR_MIPMAP_LINEAR,
        mag_filter: LINEAR,
        wrap_s: REPEAT,
        wrap_t: REPEAT,
    };
    start_load(&mut bridge, &mut buf, png.len(), sampler);
    bridge.pump_completions(&mut GuestMemory::new(&mut buf));
    assert_eq!(bridge.host().calls_named("generateMipmap").len(), 1);
}

#[test]
fn released_texture_is_not_resurrected() {
    let mut bridge = deferred();
    let png = png_bytes(2, 2);
    let mut buf = guest_with_png(&png);
    let texture = start_load(&mut bridge, &mut buf, png.len(), SamplerParams::default());

    bridge.delete_texture(texture).unwrap();
    // The slot is reused by an unrelated texture before the load finishes.
    let reused = bridge.create_texture().unwrap();
    assert_eq!(reused, texture);

    let applied = bridge.pump_completions(&mut GuestMemory::new(&mut buf));
    assert_eq!(applied, 0);
    assert_eq!(dims(&buf), (0xAAAA, 0xAAAA));
    assert!(bridge.host().calls_named("texImage2D").is_empty());
    assert_eq!(bridge.live_count(Category::Texture), 1);
    assert_eq!(bridge.stats().snapshot().completions_abandoned, 1);
}

#[test]
fn replaced_memory_skips_dimension_write() {
    let mut bridge = deferred();
    let png = png_bytes(7, 9);
    let mut buf = guest_with_png(&png);
    start_load(&mut bridge, &mut buf, png.len(), SamplerParams::default());

    bridge.reset_guest_memory();
    let applied = bridge.pump_completions(&mut GuestMemory::new(&mut buf));
    assert_eq!(applied, 1);
    assert_eq!(dims(&buf), (0xAAAA, 0xAAAA));
    assert_eq!(bridge.host().calls_named("texImage2D").len(), 1);
    assert_eq!(bridge.stats().snapshot().dimension_writes_skipped, 1);
}

#[test]
fn undecodable_bytes_leave_texture_uninitialized() {
    let mut bridge = deferred();
    let garbage = vec![0x42u8; 40];
    let mut buf = guest_with_png(&garbage);
    let texture = start_load(&mut bridge, &mut buf, garbage.len(), SamplerParams::default());

    assert_eq!(bridge.pump_completions(&mut GuestMemory::new(&mut buf)), 0);
    assert!(bridge.host().calls_named("texImage2D").is_empty());
    assert_eq!(bridge.stats().snapshot().decode_failures, 1);
    assert!(bridge.bind_texture(TEXTURE_2D, texture).is_ok());
}

#[test]
fn threaded_decoder_completes_on_drain() {
    let mut bridge = bridge_with(&BridgeConfig::default());
    let png = png_bytes(3, 2);
    let mut buf = guest_with_png(&png);
    start_load(&mut bridge, &mut buf, png.len(), SamplerParams::default());

    let applied = bridge.drain_completions(&mut GuestMemory::new(&mut buf), Duration::from_secs(10));
    assert_eq!(applied, 1);
    assert_eq!(dims(&buf), (3, 2));
}

#[test]
fn url_loads_resolve_against_asset_root() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("tiles")).unwrap();
    std::fs::write(dir.path().join("tiles/grass.png"), png_bytes(8, 8)).unwrap();

    let mut bridge = bridge_with(&BridgeConfig {
        asset_root: dir.path().to_path_buf(),
        decoder: DecoderMode::Deferred,
        ..BridgeConfig::default()
    });
    let mut buf = vec![0u8; 128];
    let good = "tiles/grass.png";
    let escape = "../grass.png";
    buf[0..good.len()].copy_from_slice(good.as_bytes());
    buf[64..64 + escape.len()].copy_from_slice(escape.as_bytes());
    {
        let mem = GuestMemory::new(&mut buf);
        bridge.load_texture(&mem, 0, good.len() as u32).unwrap();
        bridge.load_texture(&mem, 64, escape.len() as u32).unwrap();
    }

    assert_eq!(bridge.pump_completions(&mut GuestMemory::new(&mut buf)), 1);
    let upload = &bridge.host().calls_named("texImage2D")[0].args;
    assert_eq!(upload["width"], json!(8));
    let stats = bridge.stats().snapshot();
    assert_eq!(stats.decode_failures, 1);
    assert_eq!(bridge.live_count(Category::Texture), 2);
}

#[test]
fn dense_handles_number_from_zero() {
    let config = BridgeConfig::from_json_str(r#"{ "dense_handles": ["texture"], "decoder": "deferred" }"#)
        .unwrap();
    let mut bridge = bridge_with(&config);
    assert_eq!(bridge.create_texture().unwrap(), 0);
    assert_eq!(bridge.create_buffer().unwrap(), 1);

    bridge.bind_texture(TEXTURE_2D, 0).unwrap();
    assert_ne!(
        bridge.host().calls_named("bindTexture")[0].args["texture"],
        json!(null)
    );
}

#[test]
fn double_release_never_destroys_twice() {
    let mut bridge = deferred();
    let buffer = bridge.create_buffer().unwrap();
    bridge.delete_buffer(buffer).unwrap();
    assert!(bridge.delete_buffer(buffer).is_err());
    // Releasing the null sentinel is a no-op.
    bridge.delete_buffer(0).unwrap();

    let host = bridge.host();
    assert_eq!(host.calls_named("deleteBuffer").len(), 1);
    assert_eq!(host.double_destroys(), 0);
}

#[test]
fn teardown_abandons_pending_loads() {
    let mut bridge = deferred();
    let png = png_bytes(2, 2);
    let mut buf = guest_with_png(&png);
    start_load(&mut bridge, &mut buf, png.len(), SamplerParams::default());

    bridge.teardown();
    assert_eq!(bridge.pending_loads(), 0);
    assert_eq!(bridge.pump_completions(&mut GuestMemory::new(&mut buf)), 0);
    assert_eq!(bridge.host().live_objects(), 0);
    assert_eq!(dims(&buf), (0xAAAA, 0xAAAA));
}
