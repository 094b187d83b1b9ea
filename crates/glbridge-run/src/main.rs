#![forbid(unsafe_code)]

// Native-only: the runner embeds Wasmtime. Keep a stub so `--target wasm32` workspace builds pass.
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    use anyhow::{anyhow, Context, Result};
    use clap::Parser;
    use glbridge::linker;
    use glbridge::{Bridge, BridgeConfig, GlContext, RecordingProvider};
    use tracing::{debug, info, warn};
    use tracing_subscriber::EnvFilter;
    use wasmtime::{Engine, Linker, Module, Store};

    #[derive(Debug, Parser)]
    #[command(
        about = "Headless runner: drives a guest module's lifecycle exports against a recording GL host"
    )]
    pub struct Args {
        /// Guest module (binary `.wasm`).
        module: PathBuf,

        /// Number of `on_animation_frame` calls to make.
        #[arg(long, default_value_t = 1)]
        frames: u32,

        /// Canvas width passed to `on_resize`.
        #[arg(long, default_value_t = 800)]
        width: i32,

        /// Canvas height passed to `on_resize`.
        #[arg(long, default_value_t = 600)]
        height: i32,

        #[arg(long, default_value_t = 1.0)]
        pixel_ratio: f32,

        /// Bridge configuration as JSON (context attributes, dense handle categories, decoder).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory `glLoadTexture` URLs resolve against. Overrides the config file.
        #[arg(long)]
        asset_root: Option<PathBuf>,

        /// Offer only a fallback (GLES2 / WebGL1) context.
        #[arg(long)]
        webgl1: bool,

        /// How long to wait for outstanding texture loads after the last frame, in milliseconds.
        #[arg(long, default_value_t = 5000)]
        drain_ms: u64,

        /// Write the recorded host call trace to this file as JSON.
        #[arg(long)]
        trace_out: Option<PathBuf>,
    }

    fn wasm_err(err: wasmtime::Error) -> anyhow::Error {
        anyhow!("{err:?}")
    }

    fn load_config(args: &Args) -> Result<BridgeConfig> {
        let mut config = match &args.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                BridgeConfig::from_json_str(&text)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => BridgeConfig::default(),
        };
        if let Some(root) = &args.asset_root {
            config.asset_root = root.clone();
        }
        Ok(config)
    }

    pub fn main() -> Result<()> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();

        let args = Args::parse();
        let config = load_config(&args)?;

        // The context is negotiated before the guest is instantiated; no guest code runs without one.
        let mut provider = if args.webgl1 {
            RecordingProvider::fallback_only(true)
        } else {
            RecordingProvider::primary()
        };
        let ctx = GlContext::negotiate(&mut provider, &config.context)
            .context("graphics context initialization failed")?;
        info!(
            version = ?ctx.version(),
            vertex_arrays = ?ctx.vertex_array_dispatch(),
            "graphics context ready"
        );
        let bridge = Bridge::new(ctx, &config).context("start texture decoder")?;

        let engine = Engine::default();
        let wasm = fs::read(&args.module)
            .with_context(|| format!("read guest module {}", args.module.display()))?;
        let module = Module::new(&engine, &wasm).map_err(wasm_err)?;

        let mut wasm_linker = Linker::new(&engine);
        linker::add_to_linker(&mut wasm_linker).map_err(wasm_err)?;
        let mut store = Store::new(&engine, bridge);
        let instance = wasm_linker
            .instantiate(&mut store, &module)
            .map_err(wasm_err)?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| anyhow!("guest does not export `memory`"))?;

        let on_init = instance
            .get_typed_func::<(), ()>(&mut store, "on_init")
            .map_err(wasm_err)?;
        let on_resize = instance
            .get_typed_func::<(i32, i32, f32), ()>(&mut store, "on_resize")
            .ok();
        let on_frame = instance
            .get_typed_func::<(), ()>(&mut store, "on_animation_frame")
            .ok();

        on_init.call(&mut store, ()).map_err(wasm_err)?;
        if let Some(on_resize) = &on_resize {
            on_resize
                .call(&mut store, (args.width, args.height, args.pixel_ratio))
                .map_err(wasm_err)?;
        }
        for frame in 0..args.frames {
            if let Some(on_frame) = &on_frame {
                on_frame.call(&mut store, ()).map_err(wasm_err)?;
            }
            let applied = linker::pump_completions(&mut store, memory);
            if applied > 0 {
                debug!(frame, applied, "texture loads completed");
            }
        }

        if store.data().pending_loads() > 0 {
            let applied =
                linker::drain_completions(&mut store, memory, Duration::from_millis(args.drain_ms));
            debug!(applied, "drained texture loads");
            let remaining = store.data().pending_loads();
            if remaining > 0 {
                warn!(remaining, "texture loads still pending at exit");
            }
        }

        println!("{}", store.data().stats().snapshot().to_json());

        if let Some(path) = &args.trace_out {
            let trace = serde_json::to_vec_pretty(store.data().host().calls())?;
            fs::write(path, trace).with_context(|| format!("write trace {}", path.display()))?;
            info!(path = %path.display(), "host call trace written");
        }

        store.data_mut().teardown();
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    native::main()
}
