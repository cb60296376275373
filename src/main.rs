use cadenza::app::App;
use cadenza::audio::{AudioOutput, NullAudioOutput, RodioAudioOutput};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct CliArgs {
    folders: Vec<PathBuf>,
    no_audio: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cadenza=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1).collect())?;
    let output: Box<dyn AudioOutput> = if args.no_audio {
        Box::new(NullAudioOutput::new())
    } else {
        match RodioAudioOutput::new() {
            Ok(output) => Box::new(output),
            Err(err) => {
                tracing::warn!("audio device unavailable, continuing without sound: {err:#}");
                Box::new(NullAudioOutput::new())
            }
        }
    };

    let mut app = App::from_config(output)?;
    for folder in &args.folders {
        app.run_command(&format!("add {}", folder.display()));
        println!("{}", app.status);
    }
    app.run()
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--no-audio" => out.no_audio = true,
            "--folder" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--folder requires a path");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--folder cannot be empty");
                }
                out.folders.push(PathBuf::from(value.trim()));
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("Cadenza");
    println!("  --folder <path>   Add a music folder before starting (repeatable)");
    println!("  --no-audio        Run without opening an audio device");
    println!("  Set RUST_LOG to change log verbosity, CADENZA_CONFIG_DIR to move settings.");
}
