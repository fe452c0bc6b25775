//! Entry point: load an OBJ model (with its MTL libraries and texture maps),
//! flatten it and optionally upload it to a headless GPU device.
//!
//! Usage: app <model.obj> [--scale=F] [--reverse] [--no-texture] [--no-normal]
//!            [--texture=URL] [--bump=URL] [--upload] [--gpu-backend=NAME]
//!            [--timeout-ms=N]

use std::{
    path::Path,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use asset::{FsFetcher, LoadStatus, LoadedModel, Session, TextureKind};
use corelib::{LoadOptions, RenderFlags};
use renderer::{GpuUploader, Scene};

fn parse_backend_arg() -> wgpu::Backends {
    // Accept: --gpu-backend=auto|vulkan|dx12|metal|gl
    let mut backends = wgpu::Backends::all(); // default = auto
    for arg in std::env::args() {
        if let Some(val) = arg.strip_prefix("--gpu-backend=") {
            backends = match val.to_ascii_lowercase().as_str() {
                "auto" => wgpu::Backends::all(),
                "vulkan" | "vk" => wgpu::Backends::VULKAN,
                "dx12" | "d3d12" => wgpu::Backends::DX12,
                "metal" | "mtl" => wgpu::Backends::METAL,
                "gl" | "opengl" | "gles" => wgpu::Backends::GL,
                other => {
                    log::warn!("Unknown backend '{}', falling back to auto.", other);
                    wgpu::Backends::all()
                }
            };
        }
    }
    backends
}

fn has_flag(name: &str) -> bool {
    std::env::args().any(|arg| arg == name)
}

fn value_arg(prefix: &str) -> Option<String> {
    std::env::args().find_map(|arg| arg.strip_prefix(prefix).map(str::to_owned))
}

fn parse_options() -> Result<LoadOptions> {
    let scale = match value_arg("--scale=") {
        Some(v) => v
            .parse::<f32>()
            .with_context(|| format!("Invalid --scale value '{v}'"))?,
        None => 1.0,
    };
    let options = LoadOptions::new(scale, has_flag("--reverse"))
        .with_overrides(value_arg("--texture="), value_arg("--bump="));
    options.validate()?;
    Ok(options)
}

fn parse_flags() -> RenderFlags {
    RenderFlags {
        use_texture: !has_flag("--no-texture"),
        use_normal: !has_flag("--no-normal"),
    }
}

fn parse_timeout() -> Duration {
    value_arg("--timeout-ms=")
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}

/// First positional argument: the model to load.
fn model_path() -> Result<String> {
    match std::env::args().skip(1).find(|arg| !arg.starts_with("--")) {
        Some(path) => Ok(path),
        None => bail!(
            "Usage: app <model.obj> [--scale=F] [--reverse] [--no-texture] [--no-normal] \
             [--texture=URL] [--bump=URL] [--upload] [--gpu-backend=NAME] [--timeout-ms=N]"
        ),
    }
}

fn print_summary(model: &LoadedModel) {
    let s = model.stats;
    let emitted = model.mesh.vertex_count();
    println!("model:      {}", model.name);
    println!(
        "vertices:   {} (normals {}, texcoords {})",
        s.positions, s.normals, s.texcoords
    );
    println!("groups:     {} ({} faces)", s.groups, s.faces);
    println!("emitted:    {} vertices, {} triangles", emitted, emitted / 3);
    for kind in [TextureKind::Diffuse, TextureKind::Bump] {
        let label = format!("{kind:?}:").to_lowercase();
        match model.texture(kind) {
            Some(t) => println!(
                "{label:<11} {} ({}x{})",
                t.url, t.data.width, t.data.height
            ),
            None => println!("{label:<11} none"),
        }
    }
}

/// Drive the scene frame by frame until the model is on the GPU.
fn upload(session: Session, url: &str, timeout: Duration) -> Result<()> {
    let uploader = GpuUploader::request_headless(parse_backend_arg())?;
    let mut scene = Scene::new(session, uploader);
    scene.load(url);

    let deadline = Instant::now() + timeout;
    while !scene.update()? {
        if let Some(err) = scene.last_error() {
            bail!("{err}");
        }
        if Instant::now() >= deadline {
            bail!("Timed out loading {url}");
        }
        thread::sleep(Duration::from_millis(16));
    }

    if let Some(model) = scene.model() {
        log::info!(
            "{} on GPU: {} indices, diffuse={}, bump={}",
            model.name,
            model.index_count,
            model.diffuse.is_some(),
            model.bump.is_some()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = model_path()?;
    let options = parse_options()?;
    let flags = parse_flags();
    let timeout = parse_timeout();
    log::info!(
        "Loading {} (scale={}, reverse={}, texture={}, normal={})",
        path,
        options.scale,
        options.reverse,
        flags.use_texture,
        flags.use_normal
    );

    // Urls are served relative to the model's directory.
    let model = Path::new(&path);
    let root = model.parent().unwrap_or(Path::new("."));
    let name = model
        .file_name()
        .context("Model path has no file name")?
        .to_string_lossy()
        .into_owned();
    let session = Session::new(Arc::new(FsFetcher::new(root)), options, flags)?;

    if has_flag("--upload") {
        upload(session, &name, timeout)?;
    } else {
        let mut session = session;
        session.load(&name);
        match session.wait(timeout) {
            LoadStatus::Ready(model) => print_summary(&model),
            LoadStatus::Failed(err) => bail!("{err}"),
            LoadStatus::Loading => bail!("Timed out loading {path}"),
            LoadStatus::Idle => bail!("Nothing was loaded"),
        }
    }

    log::info!("Done. Bye!");
    Ok(())
}
