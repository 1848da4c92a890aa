use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use melody_domain::{
    ExportFormat, JsonExporter, PipelineConfig, PitchStrategy, SummaryExporter, YamlExporter,
};
use melody_transcriber::ConversionPipeline;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    Centroid,
    Tracker,
}

impl From<Strategy> for PitchStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Centroid => PitchStrategy::Centroid,
            Strategy::Tracker => PitchStrategy::Tracker,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SummaryFormat {
    Json,
    Yaml,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Convert a melody recording into a MIDI file", long_about = None)]
struct Cli {
    /// Audio file to convert (mp3, m4a, wav or webm)
    input: PathBuf,
    /// Where to write the MIDI file; defaults to the input path with a .mid extension
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// YAML pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Pitch estimation strategy, overriding the configuration
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,
    /// Print the full conversion summary in this format
    #[arg(long, value_enum)]
    format: Option<SummaryFormat>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(strategy) = cli.strategy {
        config.pitch.strategy = strategy.into();
    }

    let pipeline = ConversionPipeline::new(config)?;
    let conversion = pipeline
        .convert_file(&cli.input)
        .with_context(|| format!("converting {}", cli.input.display()))?;

    let output = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension("mid"));
    fs::write(&output, &conversion.midi)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(path = %output.display(), bytes = conversion.midi.len(), "midi written");

    let summary = &conversion.summary;
    let exported = match cli.format {
        Some(SummaryFormat::Json) => Some(JsonExporter.export(summary, ExportFormat::Json)?),
        Some(SummaryFormat::Yaml) => Some(YamlExporter.export(summary, ExportFormat::Yaml)?),
        None => None,
    };
    match exported {
        Some(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
        None => println!(
            "{}: {:.1} BPM, {} beats, {} notes -> {}",
            cli.input.display(),
            summary.tempo_bpm,
            summary.beats.len(),
            summary.note_count(),
            output.display()
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strategy_and_format() {
        let cli = Cli::try_parse_from([
            "audio2midi",
            "take.wav",
            "--strategy",
            "tracker",
            "--format",
            "yaml",
        ])
        .unwrap();
        assert!(matches!(cli.strategy, Some(Strategy::Tracker)));
        assert!(matches!(cli.format, Some(SummaryFormat::Yaml)));
        assert_eq!(PitchStrategy::from(Strategy::Tracker), PitchStrategy::Tracker);

        assert!(Cli::try_parse_from(["audio2midi", "take.wav", "--strategy", "fft"]).is_err());
        assert!(Cli::try_parse_from(["audio2midi", "take.wav", "--format", "xml"]).is_err());
    }
}
