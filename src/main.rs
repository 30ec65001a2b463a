mod cli;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use cg_av::{convert_to_gif, ToolRegistry};
use cg_core::config::Config;
use cg_core::events::Phase;
use cg_core::{ConversionRequest, LoopMode};
use cli::{Cli, Commands, ConvertArgs};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipgif=debug,cg_core=debug,cg_av=debug,cg_server=debug,tower_http=debug".to_string()
        } else {
            "clipgif=info,cg_core=info,cg_av=warn,cg_server=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            eprintln!("Run 'clipgif --help' for usage.");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    tracing::debug!(config = ?cli.config, "clipgif {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Convert(args) => {
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert(args, &config))
        }
        Commands::Serve { host, port } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cg_server::start(config, CancellationToken::new()))?;
            Ok(())
        }
        Commands::CheckTools => {
            let config = Config::load_or_default(cli.config.as_deref());
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

async fn convert(args: ConvertArgs, config: &Config) -> Result<()> {
    let tools = ToolRegistry::discover(&config.tools);

    let loop_mode = match args.loop_mode {
        Some(flag) => LoopMode::try_from(flag)?,
        None => config.defaults.loop_mode,
    };
    let request = ConversionRequest::new(
        &args.input,
        &args.output,
        args.width.unwrap_or(config.defaults.width),
        args.fps.unwrap_or(config.defaults.fps),
    )?
    .with_start(args.start)
    .with_duration(args.duration)
    .with_loop_mode(loop_mode)
    .with_overwrite(args.overwrite);

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{msg:>9} [{bar:40.cyan/blue}] {pos:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let result = convert_to_gif(&tools, &request, |event| {
        bar.set_message(match event.phase {
            Phase::Palette => "palette",
            Phase::Encode => "encoding",
            Phase::Done => "done",
        });
        bar.set_position(u64::from(event.percent));
    })
    .await;

    match result {
        Ok(()) => {
            bar.finish_and_clear();
            println!("Wrote {}", request.output().display());
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            Err(e).with_context(|| format!("converting {}", request.input().display()))
        }
    }
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools);
    let infos = tools.check_all();

    for tool in &infos {
        let status = if tool.available { "✓" } else { "✗" };
        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if infos.iter().all(|t| t.available) {
        println!("All required tools are available!");
        return Ok(());
    }
    if infos.iter().any(|t| t.name == "ffmpeg" && t.available) {
        println!("ffprobe is missing; progress percentages will not advance during encoding.");
        return Ok(());
    }
    anyhow::bail!("ffmpeg was not found; install it or set tools.ffmpeg_path")
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            Config::load(p).with_context(|| format!("invalid config {}", p.display()))?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Job TTL: {}s", config.jobs.ttl_secs);
    println!(
        "  Max concurrent jobs: {}",
        config
            .jobs
            .max_concurrent
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );
    println!(
        "  Defaults: width={} fps={} loop={}",
        config.defaults.width, config.defaults.fps, config.defaults.loop_mode
    );

    for warning in config.validate() {
        println!("  warning: {warning}");
    }

    Ok(())
}
