use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use collada_conv::{convert_dae_file, ConvertConfig};

const HELP: &str = "\
collada_conv

USAGE:
  collada_conv [OPTIONS] <INPUT>...

Inputs are .dae files or directories containing .dae files.

OPTIONS:
  --dest <DIR>          Output directory [default: .]
  --base <DIR>          Base directory of the inputs. Output paths mirror
                        the input paths relative to it.
  --config <FILE>       JSON file with conversion settings
  --lod-dist1 <DIST>    Distance of LOD level 1, likewise --lod-dist2..4
  --scale <FACTOR>      Uniform scale applied to the whole scene
  --no-geo-opt          Keep the authored triangle order
  --overwrite-mats      Replace existing material files
  --add-model-name      Prefix material files with the model name
  -h, --help            Print help
";

struct Args {
    config: ConvertConfig,
    base: Option<PathBuf>,
    add_model_name: bool,
    inputs: Vec<PathBuf>,
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut pargs = pico_args::Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{}", HELP);
        return Ok(None);
    }

    let mut config = match pargs.opt_value_from_str::<_, PathBuf>("--config")? {
        Some(path) => ConvertConfig::from_json_file(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => ConvertConfig::default(),
    };

    if let Some(dest) = pargs.opt_value_from_str("--dest")? {
        config.output_directory = dest;
    }
    let base: Option<PathBuf> = pargs.opt_value_from_str("--base")?;
    for (i, flag) in ["--lod-dist1", "--lod-dist2", "--lod-dist3", "--lod-dist4"]
        .into_iter()
        .enumerate()
    {
        if let Some(distance) = pargs.opt_value_from_str(flag)? {
            config.lod_distances[i] = distance;
        }
    }
    if let Some(scale) = pargs.opt_value_from_str("--scale")? {
        config.scale_factor = scale;
    }
    if pargs.contains("--no-geo-opt") {
        config.optimize = false;
    }
    if pargs.contains("--overwrite-mats") {
        config.replace_materials = true;
    }
    let add_model_name = pargs.contains("--add-model-name");

    let inputs: Vec<PathBuf> = pargs.finish().into_iter().map(PathBuf::from).collect();
    if inputs.is_empty() {
        return Err(anyhow!("No input files given\n\n{}", HELP));
    }
    config.validate()?;

    Ok(Some(Args {
        config,
        base,
        add_model_name,
        inputs,
    }))
}

/// Expands directories into the .dae files directly inside them.
fn collect_inputs(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read directory {}", input.display()))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .map(|e| e.eq_ignore_ascii_case("dae"))
                        .unwrap_or(false)
                })
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

/// Asset path of `input` relative to `base`, with `/` separators.
fn asset_path(input: &Path, base: Option<&Path>) -> String {
    let Some(base) = base else { return String::new() };
    input
        .parent()
        .and_then(|parent| parent.strip_prefix(base).ok())
        .map(|relative| {
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

fn config_for_input(args: &Args, input: &Path) -> ConvertConfig {
    let mut config = args.config.clone();
    if config.asset_path.is_empty() {
        config.asset_path = asset_path(input, args.base.as_deref());
    }
    if args.add_model_name {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        config.model_name = format!("{stem}_");
    }
    config
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return,
        Err(e) => {
            log::error!("{:?}", e);
            std::process::exit(1);
        }
    };

    let inputs = match collect_inputs(&args.inputs) {
        Ok(inputs) => inputs,
        Err(e) => {
            log::error!("{:?}", e);
            std::process::exit(1);
        }
    };

    let mut failed = 0;
    for input in &inputs {
        log::info!("Converting {}", input.display());
        let config = config_for_input(&args, input);
        match convert_dae_file(input, &config) {
            Ok(files) => {
                log::info!(
                    "Wrote {} and {} material files",
                    files.geometry_path.display(),
                    files.material_paths.len()
                );
            }
            Err(e) => {
                log::error!("{:?}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        log::error!("{} of {} files failed to convert", failed, inputs.len());
        std::process::exit(1);
    }
}
