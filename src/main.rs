//! Entry point for the skillscore application.
//! Handles CLI parsing, file loading, and dispatches the scoring subcommands.

use clap::Parser;
use skillscore::io::{read_labeled_array, to_json_string, write_labeled_array};
use skillscore::parallel::{get_parallel_info, ParallelConfig};
use skillscore::prelude::*;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Args, ChunkSpec, Command, ParamArg};

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    ParallelConfig::new(args.threads).setup_global_pool()?;
    if args.verbose {
        get_parallel_info().log();
    }

    let chunks = args.chunks.as_ref();
    let result = match &args.command {
        Command::CrpsEnsemble {
            obs,
            fcst,
            member_dim,
            weights,
        } => {
            let obs = load(obs, chunks)?;
            let fcst = load(fcst, chunks)?;
            let mut options = EnsembleOptions::new();
            if let Some(dim) = member_dim {
                options = options.member_dim(dim.as_str());
            }
            if let Some(weights) = weights {
                options = options.weights(weights.clone());
            }
            crps_ensemble(&obs, &fcst, &options)?
        }
        Command::CrpsGaussian { obs, mu, sig } => {
            let obs = load(obs, chunks)?;
            crps_gaussian(&obs, load_param(mu, chunks)?, load_param(sig, chunks)?)?
        }
        Command::ThresholdBrier {
            obs,
            fcst,
            threshold,
            member_dim,
        } => {
            let obs = load(obs, chunks)?;
            let fcst = load(fcst, chunks)?;
            let member_dim = member_dim.clone().map_or(MemberDim::Extra, MemberDim::Named);
            let threshold = match threshold.as_slice() {
                [single] => Threshold::Scalar(*single),
                many => Threshold::Sequence(many.to_vec()),
            };
            threshold_brier_score(&obs, &fcst, threshold, &member_dim)?
        }
    };
    info!(dims = ?result.dims(), lazy = result.is_lazy(), "computed score");

    if let Some(output_path) = &args.output {
        write_labeled_array(&result, output_path)?;
        info!("Saved result to {}", output_path.display());
    } else {
        println!("{}", to_json_string(&result)?);
    }

    Ok(())
}

fn load(path: &Path, chunks: Option<&ChunkSpec>) -> skillscore::Result<LabeledArray> {
    let array = read_labeled_array(path)?;
    match chunks {
        Some(spec) => {
            let shape = spec.chunk_shape(array.dims(), array.shape());
            array.chunk(Some(&shape))
        }
        None => Ok(array),
    }
}

fn load_param(param: &ParamArg, chunks: Option<&ChunkSpec>) -> skillscore::Result<Param> {
    Ok(match param {
        ParamArg::Value(value) => Param::Scalar(*value),
        ParamArg::File(path) => Param::Array(load(path, chunks)?),
    })
}
