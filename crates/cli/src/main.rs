//! dynmix CLI — generate multi-speaker audio mixtures from manifests.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use dynmix_core::audio::io::write_wav;
use dynmix_core::{
    parse_paths, DynamicMixer, MixingConfig, MixtureIter, SourceFile, SpeakerPool, Substitution,
};

// ─── Top-level CLI ───────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "dynmix",
    about = "Dynamic multi-speaker speech mixture generator",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate mixtures and write them to a run directory
    Generate(GenerateArgs),
    /// Resolve a file-list manifest and print the concrete paths
    Resolve(ResolveArgs),
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Speaker map JSON: {"speaker": ["a.wav", ...], ...}. Omit to build
    /// the pool from --file-list with one speaker per file.
    #[arg(long)]
    speaker_map: Option<PathBuf>,

    /// File-list manifest (last whitespace token per line is the path)
    #[arg(long)]
    file_list: Option<PathBuf>,

    /// Mixing config JSON; missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Noise file-list manifest (required when the config sets noise_add)
    #[arg(long)]
    noise_list: Option<PathBuf>,

    /// RIR file-list manifest (required when the config sets rir_add)
    #[arg(long)]
    rir_list: Option<PathBuf>,

    /// Path substitution "pattern=replacement", repeatable, applied in order
    #[arg(long = "subst")]
    substitutions: Vec<String>,

    /// Number of mixtures to generate
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Start index, for resuming an interrupted run
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Output directory
    #[arg(long, default_value = "./dynmix-output")]
    out_dir: PathBuf,

    /// RNG seed for reproducible output
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Also write per-source and noise WAVs next to each mixture
    #[arg(long, default_value_t = false)]
    write_sources: bool,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct ResolveArgs {
    /// Manifest to resolve
    list_file: PathBuf,

    /// Path substitution "pattern=replacement", repeatable
    #[arg(long = "subst")]
    substitutions: Vec<String>,
}

// ─── Main ────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let log_level = match &cli.command {
        Command::Generate(a) if a.verbose => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Resolve(args) => run_resolve(args),
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Parse repeatable "pattern=replacement" flags.
fn parse_substitutions(raw: &[String]) -> Result<Vec<Substitution>> {
    let mut subs = Vec::with_capacity(raw.len());
    for entry in raw {
        let Some((pattern, replacement)) = entry.split_once('=') else {
            bail!("Substitution {entry:?} is not pattern=replacement");
        };
        subs.push(
            Substitution::new(pattern, replacement)
                .with_context(|| format!("Bad substitution pattern {pattern:?}"))?,
        );
    }
    Ok(subs)
}

/// Build the speaker pool from either a speaker map or a flat file list.
fn build_pool(args: &GenerateArgs, subs: &[Substitution]) -> Result<SpeakerPool> {
    match (&args.speaker_map, &args.file_list) {
        (Some(map_path), _) => {
            let text = std::fs::read_to_string(map_path)
                .with_context(|| format!("Failed to read {}", map_path.display()))?;
            let map: HashMap<String, Vec<PathBuf>> =
                serde_json::from_str(&text).context("Speaker map is not {speaker: [paths]}")?;
            let mut entries: Vec<(String, Vec<PathBuf>)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let pool = SpeakerPool::from_map(entries.into_iter().map(|(spkr, paths)| {
                let files = paths
                    .into_iter()
                    .map(|p| SourceFile::new(p, None))
                    .collect();
                (spkr, files)
            }))?;
            Ok(pool)
        }
        (None, Some(list)) => {
            let paths = parse_paths(list, subs)?;
            Ok(SpeakerPool::from_files(paths)?)
        }
        (None, None) => bail!("Provide --speaker-map or --file-list"),
    }
}

fn load_config(path: Option<&Path>) -> Result<MixingConfig> {
    let Some(path) = path else {
        return Ok(MixingConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: MixingConfig = serde_json::from_str(&text)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(config)
}

// ─── Generate runner ─────────────────────────────────────────────

fn run_generate(args: GenerateArgs) -> Result<()> {
    let subs = parse_substitutions(&args.substitutions)?;
    let pool = build_pool(&args, &subs)?;
    let config = load_config(args.config.as_deref())?;
    let sample_rate = config.sample_rate;

    log::info!(
        "Pool: {} speakers, {} files",
        pool.num_speakers(),
        pool.len()
    );

    let mixer = DynamicMixer::new(
        pool,
        config,
        args.noise_list.as_deref(),
        args.rir_list.as_deref(),
        &subs,
    )?;

    std::fs::create_dir_all(&args.out_dir)?;
    let meta_path = args.out_dir.join("mixtures.jsonl");
    let mut meta_file = std::fs::File::options()
        .create(true)
        .append(true)
        .open(&meta_path)
        .with_context(|| format!("Failed to open {}", meta_path.display()))?;

    let iter = MixtureIter::resume(&mixer, args.seed, args.start);
    for (n, item) in iter.take(args.count).enumerate() {
        let record = item?;
        let index = args.start + n;
        let stem = format!("mix_{index:06}");

        write_wav(
            &args.out_dir.join(format!("{stem}.wav")),
            &record.mixture,
            sample_rate,
        )?;
        if args.write_sources {
            for (slot, source) in record.sources.iter().enumerate() {
                write_wav(
                    &args.out_dir.join(format!("{stem}_s{}.wav", slot + 1)),
                    source,
                    sample_rate,
                )?;
            }
            write_wav(
                &args.out_dir.join(format!("{stem}_noise.wav")),
                &record.noise,
                sample_rate,
            )?;
        }

        let meta = serde_json::json!({
            "id": record.id,
            "file": format!("{stem}.wav"),
            "metadata": record.metadata,
        });
        writeln!(meta_file, "{meta}")?;

        log::debug!(
            "{}: {} speakers, {:.2}s",
            record.id,
            record.metadata.num_spkrs,
            record.metadata.duration
        );
        if (n + 1) % 100 == 0 {
            log::info!("Generated {}/{}", n + 1, args.count);
        }
    }

    log::info!(
        "Wrote {} mixtures to {}",
        args.count,
        args.out_dir.display()
    );
    Ok(())
}

// ─── Resolve runner ──────────────────────────────────────────────

fn run_resolve(args: ResolveArgs) -> Result<()> {
    let subs = parse_substitutions(&args.substitutions)?;
    let paths = parse_paths(&args.list_file, &subs)?;
    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_substitutions() {
        let subs = parse_substitutions(&["^/old=/new".to_string()]).unwrap();
        assert_eq!(subs.len(), 1);
        assert!(parse_substitutions(&["no-equals".to_string()]).is_err());
    }

    #[test]
    fn test_load_config_default_when_absent() {
        let config = load_config(None).unwrap();
        assert_eq!(config.sample_rate, 16000);
    }

    #[test]
    fn test_build_pool_requires_an_input() {
        let args = GenerateArgs::parse_from(["generate"]);
        assert!(build_pool(&args, &[]).is_err());
    }
}
