//! tiff-sampler - sample fixed-magnification tiles from Whole Slide Images.
//!
//! `sample` reads one tile, moves it to channel-first order, resizes it and
//! writes it as an image. `info` describes a slide's pyramid.

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiff_sampler::{
    config::{Cli, Command, InfoConfig, SampleConfig, SourceConfig},
    create_s3_client,
    slide::{LocalSlideSource, S3SlideSource, SlideSource},
    tile::{SampleRequest, SamplerOptions, SlideDescription, TileSampler},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Sample(config) => run_sample(config).await,
        Command::Info(config) => run_info(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tiff_sampler=debug"
    } else {
        "tiff_sampler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Dispatch to `run` with a sampler over the configured source.
macro_rules! with_sampler {
    ($source:expr, $options:expr, $run:ident, $config:expr) => {
        match &$source.s3_bucket {
            Some(bucket) => {
                let client =
                    create_s3_client($source.s3_endpoint.as_deref(), &$source.s3_region).await;
                let sampler =
                    TileSampler::with_options(S3SlideSource::new(client, bucket.clone()), $options);
                $run(&sampler, $config).await
            }
            None => {
                let sampler = TileSampler::with_options(LocalSlideSource::new(), $options);
                $run(&sampler, $config).await
            }
        }
    };
}

fn describe_source(source: &SourceConfig) -> String {
    match (&source.s3_bucket, &source.s3_endpoint) {
        (Some(bucket), Some(endpoint)) => format!("s3://{} via {}", bucket, endpoint),
        (Some(bucket), None) => format!("s3://{} ({})", bucket, source.s3_region),
        (None, _) => "local filesystem".to_string(),
    }
}

// =============================================================================
// Sample Command
// =============================================================================

async fn run_sample(config: SampleConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    debug!(source = %describe_source(&config.source), "reading slides");

    let options = config.sampler_options();
    with_sampler!(config.source, options, sample_and_save, &config)
}

async fn sample_and_save<S: SlideSource>(
    sampler: &TileSampler<S>,
    config: &SampleConfig,
) -> ExitCode {
    let request = SampleRequest::new(
        &config.slide,
        config.x,
        config.y,
        config.tile_size,
        config.magnification,
    );

    let plan = match sampler.plan(&request).await {
        Ok(plan) => plan,
        Err(e) => {
            println!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Level {} (downsample {:.3}, AppMag {}): reading {}x{} at ({}, {})",
        plan.level,
        plan.downsample,
        plan.app_mag,
        plan.img_size,
        plan.img_size,
        plan.origin_x,
        plan.origin_y
    );

    let tile = match sampler.sample(&request).await {
        Ok(tile) => tile,
        Err(e) => {
            println!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let tensor = tile.to_chw();
    let tensor = match config.output_side() {
        Some(side) => tensor.resize(side),
        None => tensor,
    };

    if let Err(e) = tensor.save(&config.output) {
        println!("✗ {}", e);
        return ExitCode::FAILURE;
    }

    let [channels, height, width] = tensor.shape();
    println!(
        "✓ Sampled {} at ({}, {}), {}x: {}x{} tile ({}) -> {}",
        config.slide,
        config.x,
        config.y,
        config.magnification,
        tile.tile_length(),
        tile.tile_length(),
        tile.layout().as_char(),
        config.output.display()
    );
    println!("  Tensor shape: ({}, {}, {})", channels, height, width);

    ExitCode::SUCCESS
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    with_sampler!(config.source, SamplerOptions::default(), print_info, &config)
}

async fn print_info<S: SlideSource>(sampler: &TileSampler<S>, config: &InfoConfig) -> ExitCode {
    let description = match sampler.describe(&config.slide).await {
        Ok(description) => description,
        Err(e) => {
            println!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        return match serde_json::to_string_pretty(&description) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    print_description(&description);
    ExitCode::SUCCESS
}

fn print_description(description: &SlideDescription) {
    println!("{}", description.slide_id);
    println!("═════════════════════════════════");
    println!("  Format: {}", description.format.name());
    println!("  Size: {} x {}", description.width, description.height);
    match description.app_mag {
        Some(mag) => println!("✓ AppMag: {}", mag),
        None => println!("✗ AppMag: not found (use --fallback-magnification when sampling)"),
    }
    if let Some(mpp) = description.mpp {
        println!("  MPP: {}", mpp);
    }
    println!();
    println!("Levels:");
    println!("─────────────────");
    for level in &description.levels {
        println!(
            "  {:>2}  {:>7} x {:<7} tiles {:>4}x{:<4} of {}x{}  downsample {:>8.3}  {}",
            level.level,
            level.width,
            level.height,
            level.tiles_x,
            level.tiles_y,
            level.tile_width,
            level.tile_height,
            level.downsample,
            level.compression_name
        );
    }
}
