use anyhow::{bail, Result};
use engine_core::config::{BackendKind, EngineConfig, TextureCacheKind};
use engine_core::files::{DiskFiles, FileResolver};
use engine_core::gpu::{GpuBackend, HeadlessBackend, WgpuBackend};
use engine_core::registry::{ReloadReport, ResourceRegistry};
use engine_core::resource::{AssetServices, FileTextureCache, MemoryTextureCache, TextureCache};
use engine_scripting::api::EngineApi;
use engine_scripting::sandbox::LuaSandbox;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

/// Fixed simulation step handed to `on_update`
pub const FIXED_DT: f64 = 1.0 / 60.0;

/// Command line overrides for [`EngineConfig`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub script: Option<PathBuf>,
    pub frames: Option<u32>,
    pub simulate_context_loss: bool,
}

impl CliArgs {
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut cli = CliArgs::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => cli.config = args.next().map(PathBuf::from),
                "--script" => cli.script = args.next().map(PathBuf::from),
                "--frames" => {
                    let Some(value) = args.next() else {
                        bail!("--frames needs a value");
                    };
                    match value.parse() {
                        Ok(frames) => cli.frames = Some(frames),
                        Err(_) => bail!("Invalid --frames value: {}", value),
                    }
                }
                "--simulate-context-loss" => cli.simulate_context_loss = true,
                other => tracing::warn!("Ignoring unknown argument {}", other),
            }
        }
        Ok(cli)
    }

    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(script) = &self.script {
            config.script = script.clone();
        }
        if let Some(frames) = self.frames {
            config.frames = frames;
        }
    }
}

/// The configured backend; falls back to headless when no adapter is usable
pub fn create_backend(kind: BackendKind) -> Rc<dyn GpuBackend> {
    match kind {
        BackendKind::Headless => Rc::new(HeadlessBackend::new()),
        BackendKind::Wgpu => match pollster::block_on(WgpuBackend::new()) {
            Ok(backend) => Rc::new(backend),
            Err(e) => {
                tracing::warn!("wgpu unavailable ({}), using headless backend", e);
                Rc::new(HeadlessBackend::new())
            }
        },
    }
}

pub fn create_services(config: &EngineConfig) -> AssetServices {
    let files: Rc<dyn FileResolver> = Rc::new(DiskFiles::new(
        config.assets_dir.clone(),
        config.app_data_dir.clone(),
    ));
    let cache: Rc<dyn TextureCache> = match config.texture_cache {
        TextureCacheKind::Memory => Rc::new(MemoryTextureCache::new()),
        TextureCacheKind::Disk => Rc::new(FileTextureCache::new(files.clone())),
    };
    AssetServices::new(files, cache)
}

/// One script driving the engine API over a GPU backend
pub struct Session {
    gpu: Rc<dyn GpuBackend>,
    registry: Rc<RefCell<ResourceRegistry>>,
    api: EngineApi,
    sandbox: LuaSandbox,
}

impl Session {
    pub fn new(gpu: Rc<dyn GpuBackend>, services: AssetServices) -> Result<Self> {
        let registry = Rc::new(RefCell::new(ResourceRegistry::new(gpu.clone(), services)));
        let sandbox = LuaSandbox::new()?;
        let api = EngineApi::new(registry.clone());
        api.setup_engine_namespace(sandbox.lua())?;
        Ok(Self {
            gpu,
            registry,
            api,
            sandbox,
        })
    }

    pub fn registry(&self) -> &Rc<RefCell<ResourceRegistry>> {
        &self.registry
    }

    pub fn sandbox(&self) -> &LuaSandbox {
        &self.sandbox
    }

    pub fn load_script(&self, source: &str, name: &str) -> Result<()> {
        self.sandbox.load_script(source, name)
    }

    pub fn start(&self) -> Result<()> {
        self.sandbox.call_hook("on_start", ())?;
        Ok(())
    }

    /// Advance one fixed step. Script errors are logged, not fatal.
    pub fn update(&mut self, dt: f64) {
        self.api.update_time(dt);
        if let Err(e) = self.sandbox.call_hook("on_update", dt) {
            tracing::error!("{}", e);
        }
    }

    /// Lose the GPU context and bring every reloadable resource back
    pub fn simulate_context_loss(&self) -> Result<ReloadReport> {
        tracing::warn!("Simulating GPU context loss");
        let report = {
            let mut registry = self.registry.borrow_mut();
            registry.cache_all();
            self.gpu.lose_context();
            registry.context_lost();
            registry.reload_all()
        };
        self.sandbox.call_hook("on_context_restored", ())?;
        Ok(report)
    }

    pub fn finish(&self) -> Result<()> {
        self.sandbox.call_hook("on_finish", ())?;
        tracing::info!(
            "Session finished, {} live resources, Lua memory {:.2} MB",
            self.registry.borrow().len(),
            self.sandbox.get_memory_usage()
        );
        Ok(())
    }

    /// start, `frames` updates, optional context loss halfway, finish
    pub fn run(&mut self, frames: u32, simulate_context_loss: bool) -> Result<Option<ReloadReport>> {
        self.start()?;
        let loss_frame = simulate_context_loss.then_some(frames / 2);
        let mut report = None;
        for frame in 0..frames {
            if loss_frame == Some(frame) {
                report = Some(self.simulate_context_loss()?);
            }
            self.update(FIXED_DT);
        }
        // zero frames still gets its context loss
        if frames == 0 && simulate_context_loss {
            report = Some(self.simulate_context_loss()?);
        }
        self.finish()?;
        Ok(report)
    }
}
