use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use regex::{Regex, RegexBuilder};
use tk2d_dump::classify::{Classifier, TieBreak};
use tk2d_dump::patch::PatchTarget;
use tk2d_dump::{ContainerFiles, DumpOptions, Environment, Report, WriteOptions, texture};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(version, about = "Finds tk2d fonts in unity asset files and traces them to their textures")]
struct Arguments {
    #[command(subcommand)]
    command: Command,

    /// Log every font data hit and other debug output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify fonts and font data and write the chain report
    Dump(DumpArgs),
    /// Extract textures by name, without looking at fonts
    Textures(TextureArgs),
    /// Route LabelObject.SetText through KRHook.OnSetText in Assembly-CSharp.dll
    Patch(PatchArgs),
}

#[derive(Args, Debug)]
struct AssetArgs {
    /// The serialized file to analyze, e.g. `hunie_Data/level0`
    #[arg(long)]
    assets: PathBuf,
    /// Additional files to load objects from. Missing files are skipped.
    #[arg(long = "dep")]
    deps: Vec<PathBuf>,
    /// Load every serialized file in this directory as a dependency
    #[arg(long)]
    dep_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DumpArgs {
    #[clap(flatten)]
    assets: AssetArgs,
    #[arg(long, short = 'o', default_value = "dump_out")]
    out: PathBuf,
    /// Only classify MonoBehaviours whose name matches
    #[arg(long, value_parser = case_insensitive)]
    name_regex: Option<Regex>,
    /// Only write CSV rows whose main texture name matches
    #[arg(long, value_parser = case_insensitive)]
    texture_regex: Option<Regex>,
    /// Also write tk2d_fontdata_dump.csv
    #[arg(long)]
    csv: bool,
    /// Decode resolved textures into `textures/`
    #[arg(long)]
    extract_textures: bool,
    /// Classify objects matching both kinds as Font instead of FontData
    #[arg(long)]
    prefer_font: bool,
}

#[derive(Args, Debug)]
struct TextureArgs {
    #[clap(flatten)]
    assets: AssetArgs,
    #[arg(long, short = 'o')]
    out: PathBuf,
    /// Only extract textures whose name matches
    #[arg(long, default_value = "^font_exo_", value_parser = case_insensitive)]
    name_regex: Regex,
}

#[derive(Args, Debug)]
struct PatchArgs {
    /// The game folder containing `HuniePop_Data`
    game_dir: PathBuf,
    /// Exit without waiting for Enter
    #[arg(long)]
    no_pause: bool,
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn main() {
    let args = Arguments::parse();
    tracing_subscriber::fmt()
        .with_max_level(match args.verbose {
            true => tracing::Level::DEBUG,
            false => tracing::Level::INFO,
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let pause = matches!(&args.command, Command::Patch(patch) if !patch.no_pause);
    let result = run(args.command);
    if let Err(e) = &result {
        error!("{:?}", e);
    }
    if pause {
        eprint!("Press Enter to exit...");
        let _ = std::io::stdin().read_line(&mut String::new());
    }
    if result.is_err() {
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    let start = Instant::now();
    match command {
        Command::Dump(args) => dump(args)?,
        Command::Textures(args) => textures(args)?,
        Command::Patch(args) => patch(args)?,
    }
    info!("Finished in {:.2?}", start.elapsed());
    Ok(())
}

fn containers(args: &AssetArgs) -> Result<ContainerFiles> {
    let mut files = ContainerFiles::new(&args.assets, args.deps.iter().cloned())?;
    if let Some(dir) = &args.dep_dir {
        files = files.with_dependency_dir(dir)?;
    }
    Ok(files)
}

fn dump(args: DumpArgs) -> Result<()> {
    let env = Environment::open(containers(&args.assets)?);
    let index = env.object_index()?;

    let options = DumpOptions {
        name_filter: args.name_regex,
        classifier: Classifier::new(match args.prefer_font {
            true => TieBreak::PreferFont,
            false => TieBreak::PreferFontData,
        }),
        extract_images: args.extract_textures,
    };
    let analysis = tk2d_dump::dump(&index, &options);

    let report = Report::new(analysis, &env.containers.primary, &env.containers.dependencies);
    let written = report.write(
        &args.out,
        &WriteOptions {
            csv: args.csv,
            texture_filter: args.texture_regex,
        },
    )?;
    for path in written {
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn textures(args: TextureArgs) -> Result<()> {
    let env = Environment::open(containers(&args.assets)?);
    let index = env.object_index()?;

    let export = texture::export_textures(&index, Some(&args.name_regex));
    export.write(&args.out)?;

    let failed = export.manifest.iter().filter(|entry| entry.error.is_some()).count();
    info!(
        "Extracted {} of {} textures to '{}'",
        export.len() - failed,
        export.len(),
        display_dir(&args.out)?,
    );
    Ok(())
}

fn patch(args: PatchArgs) -> Result<()> {
    let target = PatchTarget::in_game_dir(&args.game_dir)?;
    let patched = tk2d_dump::patch::patch(&target)?;
    if !patched.backup_created {
        info!("Kept existing backup {}", target.backup().display());
    }
    info!("Assembly patched");
    Ok(())
}

fn display_dir(dir: &Path) -> Result<String> {
    let dir = std::path::absolute(dir)
        .with_context(|| format!("Invalid output directory '{}'", dir.display()))?;
    Ok(dir.display().to_string())
}
