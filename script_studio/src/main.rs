use anyhow::{anyhow, Context, Result};
use script_host::cli::CliOverrides;
use script_host::time::{Time, Timestep};
use script_host::{AssemblyReloader, ScriptHost};
use script_studio::project::Project;
use script_studio::EditorSession;
use std::env;
use std::path::PathBuf;
use tracing::{error, info};

fn main() {
    let opts = match StudioOptions::parse() {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    script_host::init_logging(if opts.verbose { "debug" } else { "info" });
    if let Err(err) = run(opts) {
        error!("studio error: {err:?}");
        std::process::exit(1);
    }
}

fn run(opts: StudioOptions) -> Result<()> {
    let project = match (&opts.new_project, &opts.project) {
        (Some(path), _) => {
            let name = path.file_name().map(|name| name.to_string_lossy().into_owned());
            let project = Project::create_new(path, name)?;
            info!(manifest = ?project.manifest_path(), "created project");
            project
        }
        (None, Some(path)) => Project::load(path)?,
        (None, None) => Project::default()?,
    };
    info!("project {}", project.describe());

    let mut config = project.scripting_config()?;
    config.apply_overrides(&CliOverrides::parse(&opts.passthrough)?.into_config_overrides());

    let mut host = ScriptHost::new(config.clone());
    match host.init() {
        Ok(report) => info!(resolved = ?report.resolved, missing = ?report.missing, "scripting ready"),
        Err(err) => error!("scripting unavailable, continuing without managed scripts: {err}"),
    }

    let mut scene = project.build_scene();
    for (tag, class_name) in &opts.entities {
        let entity = scene.create_entity(tag);
        scene.add_script(entity, class_name);
    }
    let reloader = AssemblyReloader::from_config(&config);
    let mut session = EditorSession::new(host, reloader, scene);

    if opts.frames == 0 {
        return Ok(());
    }
    session.on_scene_play();
    let mut clock = Time::new();
    let mut dispatched = 0usize;
    for _ in 0..opts.frames {
        let step = clock.tick();
        dispatched += session.update(opts.dt.map(Timestep).unwrap_or(step));
    }
    session.on_scene_stop();
    info!(frames = opts.frames, dispatched, elapsed = clock.elapsed_seconds(), "headless play finished");
    if let Some(err) = session.last_error() {
        info!("last error: {err}");
    }
    session.host_mut().shutdown();
    Ok(())
}

struct StudioOptions {
    project: Option<PathBuf>,
    new_project: Option<PathBuf>,
    frames: u32,
    /// Fixed frame delta; wall-clock deltas when absent.
    dt: Option<f32>,
    entities: Vec<(String, String)>,
    verbose: bool,
    passthrough: Vec<String>,
}

impl StudioOptions {
    fn parse() -> Result<Self> {
        Self::parse_from(env::args())
    }

    fn parse_from(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut opts = StudioOptions {
            project: None,
            new_project: None,
            frames: 0,
            dt: None,
            entities: Vec::new(),
            verbose: false,
            passthrough: Vec::new(),
        };
        if let Some(first) = args.next() {
            opts.passthrough.push(first);
        }
        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--project" => {
                    let value = args.next().ok_or_else(|| anyhow!("Expected a value after --project"))?;
                    opts.project = Some(PathBuf::from(value));
                }
                "--new" => {
                    let value = args.next().ok_or_else(|| anyhow!("Expected a directory after --new"))?;
                    opts.new_project = Some(PathBuf::from(value));
                }
                "--frames" => {
                    let value = args.next().ok_or_else(|| anyhow!("--frames requires a value"))?;
                    opts.frames = value.parse().context("--frames must be an integer")?;
                }
                "--dt" => {
                    let value = args.next().ok_or_else(|| anyhow!("--dt requires a value"))?;
                    opts.dt = Some(value.parse().context("--dt must be a number")?);
                }
                "--entity" => {
                    let value = args.next().ok_or_else(|| anyhow!("--entity requires Tag=Class"))?;
                    let (tag, class_name) =
                        value.split_once('=').ok_or_else(|| anyhow!("--entity expects Tag=Class, got '{value}'"))?;
                    opts.entities.push((tag.to_string(), class_name.to_string()));
                }
                "--verbose" | "-v" => opts.verbose = true,
                _ => {
                    opts.passthrough.push(flag.clone());
                    if flag.starts_with("--") {
                        let value = args.next().ok_or_else(|| anyhow!("Missing value for flag '{flag}'"))?;
                        opts.passthrough.push(value);
                    }
                }
            }
        }
        Ok(opts)
    }
}
