use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cad_intent::{ExplicitParams, ShapeIntent};
use cad_pipeline::{
    ExportOutcome, HeightmapOptions, ModRequest, PipelineConfig, Rotation, ScaleSpec, Session,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

type DynError = Box<dyn Error>;
type Flags = HashMap<String, String>;

const SWITCHES: &[&str] = &["--info", "--render", "--semantic", "--version", "--help"];
const VALUE_FLAGS: &[&str] = &[
    "--prompt",
    "--input",
    "--image",
    "--output",
    "--format",
    "--output-dir",
    "--shape",
    "--width",
    "--height",
    "--depth",
    "--diameter",
    "--wall-thickness",
    "--scale",
    "--rotate",
    "--rotate-axis",
    "--translate",
    "--max-size",
    "--height-scale",
    "--pixel-scale",
];

fn main() -> ExitCode {
    init_tracing();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,cad_pipeline=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    if args.is_empty() || flags.contains_key("--help") {
        print_usage();
        return Ok(());
    }
    if flags.contains_key("--version") {
        println!("cad3d {VERSION}");
        return Ok(());
    }

    let source = input_source(&flags)?;
    let mut config = PipelineConfig::from_env();
    if let Some(dir) = flags.get("--output-dir") {
        config = config.with_output_dir(dir);
    }
    let output_dir = config.output_dir.clone();
    let mut session = Session::from_config(config);

    match source {
        Source::Prompt(prompt) => {
            println!("Generating model from prompt: '{prompt}'");
            let explicit = explicit_params(&flags)?;
            let generation =
                session.generate(prompt, &explicit, flags.contains_key("--semantic"))?;
            let interpretation = &generation.interpretation;
            println!("Shape: {}", interpretation.intent.buildable());
            debug!(params = ?interpretation.params, "resolved parameters");
        }
        Source::Input(path) => {
            println!("Loading file: {}", path.display());
            session.load(path)?;
        }
        Source::Image(path) => {
            println!("Processing image: {}", path.display());
            session.generate_from_image(path, &heightmap_options(&flags)?)?;
        }
    }

    let request = mod_request(&flags)?;
    if !request.is_empty() {
        println!("Applying modifications...");
        session.modify(&request)?;
    }

    let show_info = flags.contains_key("--info");
    if show_info {
        let info = session.info()?;
        println!("{}", serde_json::to_string_pretty(&info)?);
    }

    let format = flags.get("--format").map(String::as_str);
    let output = match flags.get("--output") {
        Some(path) => Some(PathBuf::from(path)),
        None if !show_info => Some(default_output_path(&output_dir, format)),
        None => None,
    };
    if let Some(output) = &output {
        report(&session.export(output, format)?);
    }

    if flags.contains_key("--render") {
        let target = output.unwrap_or_else(|| default_output_path(&output_dir, None));
        report(&session.export(&target, Some("png"))?);
    }

    println!("Done!");
    Ok(())
}

#[derive(Debug, PartialEq)]
enum Source<'a> {
    Prompt(&'a str),
    Input(&'a Path),
    Image(&'a Path),
}

fn input_source(flags: &Flags) -> Result<Source<'_>, DynError> {
    let mut sources = Vec::new();
    if let Some(prompt) = flags.get("--prompt") {
        sources.push(Source::Prompt(prompt));
    }
    if let Some(path) = flags.get("--input") {
        sources.push(Source::Input(Path::new(path)));
    }
    if let Some(path) = flags.get("--image") {
        sources.push(Source::Image(Path::new(path)));
    }
    match sources.len() {
        0 => Err("one of --prompt, --input or --image is required".into()),
        1 => Ok(sources.remove(0)),
        _ => Err("--prompt, --input and --image are mutually exclusive".into()),
    }
}

fn report(outcome: &ExportOutcome) {
    if let Some(notice) = &outcome.notice {
        println!("{notice}");
    }
    if outcome.written {
        println!("Exported to: {}", outcome.path.display());
    }
}

fn default_output_path(output_dir: &Path, format: Option<&str>) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let extension = format
        .map(|f| f.trim().trim_start_matches('.'))
        .filter(|f| !f.is_empty())
        .unwrap_or("stl");
    output_dir.join(format!("model_{timestamp}.{extension}"))
}

fn explicit_params(flags: &Flags) -> Result<ExplicitParams, DynError> {
    let shape = match flags.get("--shape") {
        Some(name) => match ShapeIntent::from_name(name) {
            ShapeIntent::Custom => {
                let known = ShapeIntent::ALL.map(ShapeIntent::as_str).join(", ");
                return Err(format!("unknown shape `{name}`, expected one of: {known}").into());
            }
            intent => Some(intent),
        },
        None => None,
    };
    Ok(ExplicitParams {
        shape,
        width: optional_f64(flags, "--width")?,
        height: optional_f64(flags, "--height")?,
        depth: optional_f64(flags, "--depth")?,
        diameter: optional_f64(flags, "--diameter")?,
        wall_thickness: optional_f64(flags, "--wall-thickness")?,
        ..ExplicitParams::default()
    })
}

fn mod_request(flags: &Flags) -> Result<ModRequest, DynError> {
    let scale = match flags.get("--scale") {
        Some(raw) if raw.contains(',') => {
            Some(ScaleSpec::PerAxis(parse_triplet("--scale", raw)?))
        }
        Some(_) => optional_f64(flags, "--scale")?.map(ScaleSpec::Uniform),
        None => None,
    };
    let axis = match flags.get("--rotate-axis") {
        Some(raw) => parse_triplet("--rotate-axis", raw)?,
        None => [0.0, 0.0, 1.0],
    };
    let rotate = optional_f64(flags, "--rotate")?.map(|angle| Rotation { angle, axis });
    let translate = flags
        .get("--translate")
        .map(|raw| parse_triplet("--translate", raw))
        .transpose()?;
    Ok(ModRequest {
        scale,
        rotate,
        translate,
    })
}

fn heightmap_options(flags: &Flags) -> Result<HeightmapOptions, DynError> {
    let defaults = HeightmapOptions::default();
    let max_size = match flags.get("--max-size") {
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|err| format!("invalid integer for --max-size: {err}"))?,
        None => defaults.max_size,
    };
    Ok(HeightmapOptions {
        max_size,
        height_scale: optional_f64(flags, "--height-scale")?.unwrap_or(defaults.height_scale),
        scale: optional_f64(flags, "--pixel-scale")?.unwrap_or(defaults.scale),
    })
}

fn parse_triplet(key: &str, raw: &str) -> Result<[f64; 3], DynError> {
    let values = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| format!("invalid number in {key}: {err}"))?;
    <[f64; 3]>::try_from(values)
        .map_err(|values| format!("{key} expects x,y,z, got {} values", values.len()).into())
}

/// Long flags take one value and switches none. `-p`, `-i`, `-o` and `-f` are
/// short for `--prompt`, `--input`, `--output` and `--format`.
fn parse_flags(args: &[String]) -> Result<Flags, DynError> {
    let mut flags = HashMap::new();
    let mut index = 0;
    while index < args.len() {
        let flag = match args[index].as_str() {
            "-p" => "--prompt",
            "-i" => "--input",
            "-o" => "--output",
            "-f" => "--format",
            "-h" => "--help",
            "-V" => "--version",
            other => other,
        };
        let value = if SWITCHES.contains(&flag) {
            index += 1;
            "true".to_string()
        } else if VALUE_FLAGS.contains(&flag) {
            let value = args
                .get(index + 1)
                .ok_or_else(|| format!("missing value for {flag}"))?;
            index += 2;
            value.clone()
        } else {
            return Err(format!("unknown argument: {flag}").into());
        };
        if flags.insert(flag.to_string(), value).is_some() {
            return Err(format!("duplicate flag: {flag}").into());
        }
    }
    Ok(flags)
}

fn optional_f64(flags: &Flags, key: &str) -> Result<Option<f64>, DynError> {
    flags
        .get(key)
        .map(|value| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|err| format!("invalid float for {key}: {err}").into())
        })
        .transpose()
}

fn print_usage() {
    eprintln!("cad3d {VERSION}: build 3D parts from text, meshes or images");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  cad3d --prompt <text> [--shape <name>] [dimensions] [modifications] [output]");
    eprintln!("  cad3d --input <file> [modifications] [output]");
    eprintln!("  cad3d --image <file> [--max-size <px>] [--height-scale <mm>] [--pixel-scale <mm>]");
    eprintln!();
    eprintln!("Dimensions (mm): --width --height --depth --diameter --wall-thickness");
    eprintln!("Modifications:   --scale <f|x,y,z> --rotate <deg> [--rotate-axis x,y,z]");
    eprintln!("                 --translate x,y,z");
    eprintln!("Output:          -o/--output <path> -f/--format <stl|step|stp|dxf|fcstd|png>");
    eprintln!("                 --output-dir <dir> --info --render");
    eprintln!("Other:           --semantic --version --help");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  cad3d --prompt \"a box 50x30x20mm\"");
    eprintln!("  cad3d --input model.stl --scale 1.5 --output model_scaled.stl");
    eprintln!("  cad3d --image photo.jpg --output heightmap.stl");
    eprintln!("  cad3d --input model.fcstd --output model.step");
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use cad_intent::ShapeIntent;
    use cad_pipeline::ScaleSpec;

    use super::{
        Source, default_output_path, explicit_params, input_source, mod_request, parse_flags,
        parse_triplet, run,
    };

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn parses_aliases_and_switches() {
        let flags = parse_flags(&args(&["-p", "a box", "--info", "-o", "out.step"]))
            .expect("flags");
        assert_eq!(flags.get("--prompt").map(String::as_str), Some("a box"));
        assert_eq!(flags.get("--output").map(String::as_str), Some("out.step"));
        assert!(flags.contains_key("--info"));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_flags(&args(&["--prompt"])).is_err());
        assert!(parse_flags(&args(&["--bogus", "1"])).is_err());
        assert!(parse_flags(&args(&["--width", "1", "--width", "2"])).is_err());
    }

    #[test]
    fn sources_are_mutually_exclusive() {
        let flags = parse_flags(&args(&["--input", "a.stl"])).expect("flags");
        assert_eq!(
            input_source(&flags).expect("source"),
            Source::Input(Path::new("a.stl"))
        );

        let both = parse_flags(&args(&["--input", "a.stl", "--prompt", "x"])).expect("flags");
        assert!(input_source(&both).is_err());
        let none = parse_flags(&args(&["--info"])).expect("flags");
        assert!(input_source(&none).is_err());
    }

    #[test]
    fn explicit_dimensions_and_shape() {
        let flags = parse_flags(&args(&["--width", "12.5", "--shape", "pipe"])).expect("flags");
        let explicit = explicit_params(&flags).expect("explicit");
        assert_eq!(explicit.width, Some(12.5));
        assert_eq!(explicit.height, None);
        assert_eq!(explicit.shape, Some(ShapeIntent::Tube));

        let unknown = parse_flags(&args(&["--shape", "gear"])).expect("flags");
        assert!(explicit_params(&unknown).is_err());
        let bad = parse_flags(&args(&["--depth", "deep"])).expect("flags");
        assert!(explicit_params(&bad).is_err());
    }

    #[test]
    fn modification_flags() {
        let flags = parse_flags(&args(&[
            "--scale",
            "1,2,3",
            "--rotate",
            "45",
            "--rotate-axis",
            "1,0,0",
            "--translate",
            "0, 0, 5",
        ]))
        .expect("flags");
        let request = mod_request(&flags).expect("request");
        assert_eq!(request.scale, Some(ScaleSpec::PerAxis([1.0, 2.0, 3.0])));
        let rotation = request.rotate.expect("rotation");
        assert_eq!((rotation.angle, rotation.axis), (45.0, [1.0, 0.0, 0.0]));
        assert_eq!(request.translate, Some([0.0, 0.0, 5.0]));

        let uniform = parse_flags(&args(&["--scale", "2", "--rotate", "90"])).expect("flags");
        let request = mod_request(&uniform).expect("request");
        assert_eq!(request.scale, Some(ScaleSpec::Uniform(2.0)));
        assert_eq!(request.rotate.map(|r| r.axis), Some([0.0, 0.0, 1.0]));
    }

    #[test]
    fn triplets_need_three_numbers() {
        assert_eq!(parse_triplet("--translate", "1,2,3").ok(), Some([1.0, 2.0, 3.0]));
        assert!(parse_triplet("--translate", "1,2").is_err());
        assert!(parse_triplet("--translate", "1,a,3").is_err());
    }

    #[test]
    fn default_output_is_timestamped() {
        let path = default_output_path(Path::new("/tmp/out"), Some(".step"));
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("model_") && name.ends_with(".step"), "{name}");
        // model_YYYYmmdd_HHMMSS.step
        assert_eq!(name.len(), "model_20240101_120000.step".len());
        assert!(
            default_output_path(Path::new("/tmp/out"), None)
                .to_string_lossy()
                .ends_with(".stl")
        );
    }

    #[test]
    fn prompt_to_file_end_to_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("part.step");
        let output_str = output.to_str().expect("utf8 path");
        run(&args(&["--prompt", "a cube with side length 10mm", "--output", output_str]))
            .expect("run");
        assert!(output.is_file());

        let reloaded = dir.path().join("copy.fcstd");
        let reloaded_str = reloaded.to_str().expect("utf8 path");
        let stl = dir.path().join("part.stl");
        run(&args(&["-p", "a sphere", "-o", stl.to_str().expect("utf8 path")])).expect("stl");
        run(&args(&["-i", stl.to_str().expect("utf8 path"), "-o", reloaded_str]))
            .expect("reload");
        assert!(reloaded.is_file());
    }
}
