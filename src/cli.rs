//! Defines command-line interface options using `clap` for the skillscore application.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// A CLI tool for scoring probabilistic forecasts stored as JSON labeled arrays
#[derive(Parser, Debug)]
#[command(
    version,
    name = "skillscore",
    about = "Score ensemble and Gaussian forecasts against observations"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to save the result as JSON. If not set, prints to terminal.
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Chunk the inputs lazily, formatted as <dim>=<len>,<dim>=<len>
    #[arg(long, global = true, value_parser = parse_chunk_arg)]
    pub chunks: Option<ChunkSpec>,

    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    /// Enable verbose output.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Continuous ranked probability score of an ensemble forecast
    CrpsEnsemble {
        /// Observation array (JSON)
        obs: PathBuf,
        /// Forecast array with one extra member dimension (JSON)
        fcst: PathBuf,
        /// Name of the member dimension; defaults to the forecast's extra dimension
        #[arg(long)]
        member_dim: Option<String>,
        /// Comma-separated member weights
        #[arg(long, value_delimiter = ',')]
        weights: Option<Vec<f64>>,
    },
    /// Continuous ranked probability score of a Gaussian forecast
    CrpsGaussian {
        /// Observation array (JSON)
        obs: PathBuf,
        /// Forecast mean: a number or a JSON array file
        #[arg(long, value_parser = parse_param_arg)]
        mu: ParamArg,
        /// Forecast standard deviation: a number or a JSON array file
        #[arg(long, value_parser = parse_param_arg)]
        sig: ParamArg,
    },
    /// Brier score of the ensemble probability of exceeding a threshold
    ThresholdBrier {
        /// Observation array (JSON)
        obs: PathBuf,
        /// Forecast array with one extra member dimension (JSON)
        fcst: PathBuf,
        /// Threshold value; several comma-separated values are rejected
        #[arg(long, value_delimiter = ',', required = true)]
        threshold: Vec<f64>,
        /// Name of the member dimension; defaults to the forecast's extra dimension
        #[arg(long)]
        member_dim: Option<String>,
    },
}

/// A Gaussian parameter given on the command line
#[derive(Debug, Clone, PartialEq)]
pub enum ParamArg {
    Value(f64),
    File(PathBuf),
}

/// Chunk lengths per named dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpec {
    pub dims: Vec<(String, usize)>,
}

impl ChunkSpec {
    /// Chunk shape for an array with these dimensions; unlisted dimensions stay whole
    pub fn chunk_shape(&self, dims: &[String], shape: &[usize]) -> Vec<usize> {
        dims.iter()
            .zip(shape)
            .map(|(dim, &len)| {
                self.dims
                    .iter()
                    .find(|(name, _)| name == dim)
                    .map_or(len, |&(_, chunk)| chunk.min(len.max(1)))
            })
            .collect()
    }
}

fn parse_param_arg(s: &str) -> Result<ParamArg, String> {
    match s.parse::<f64>() {
        Ok(value) => Ok(ParamArg::Value(value)),
        Err(_) => Ok(ParamArg::File(PathBuf::from(s))),
    }
}

fn parse_chunk_arg(s: &str) -> Result<ChunkSpec, String> {
    let mut dims = Vec::new();
    for part in s.split(',') {
        let (dim, len) = part
            .split_once('=')
            .ok_or_else(|| "Invalid format: Expected '<dimension>=<length>'.".to_string())?;
        let len = len
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("Invalid chunk length for dimension '{}'", dim.trim()))?;
        if len == 0 {
            return Err(format!("Chunk length for dimension '{}' must be positive", dim.trim()));
        }
        dims.push((dim.trim().to_string(), len));
    }
    Ok(ChunkSpec { dims })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chunk_spec() {
        let spec = parse_chunk_arg("lat=2, lon=3").unwrap();
        assert_eq!(spec.dims, vec![("lat".to_string(), 2), ("lon".to_string(), 3)]);

        let dims = vec!["member".to_string(), "lat".to_string(), "lon".to_string()];
        assert_eq!(spec.chunk_shape(&dims, &[3, 4, 2]), vec![3, 2, 2]);
    }

    #[test]
    fn rejects_bad_chunk_spec() {
        assert!(parse_chunk_arg("lat").is_err());
        assert!(parse_chunk_arg("lat=x").is_err());
        assert!(parse_chunk_arg("lat=0").is_err());
    }

    #[test]
    fn param_is_number_or_path() {
        assert_eq!(parse_param_arg("1.5").unwrap(), ParamArg::Value(1.5));
        assert_eq!(
            parse_param_arg("mu.json").unwrap(),
            ParamArg::File(PathBuf::from("mu.json"))
        );
    }

    #[test]
    fn parses_subcommand() {
        let args = Args::try_parse_from([
            "skillscore",
            "threshold-brier",
            "o.json",
            "f.json",
            "--threshold",
            "0.5",
            "--chunks",
            "lat=2",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::ThresholdBrier { ref threshold, .. } if threshold == &[0.5]));
        assert!(args.chunks.is_some());
    }
}
