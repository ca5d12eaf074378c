//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use mirror_core::config::{
    ConfigError, DEFAULT_PEEK_MIN_BYTES, DEFAULT_PEEK_PERCENT, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};
use mirror_core::fetch::DEFAULT_CHUNK_SIZE;
use mirror_core::{CorruptManifestPolicy, MirrorConfig};

/// What to do with a manifest that cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CorruptManifestArg {
    /// Move it aside and start with an empty manifest
    Quarantine,
    /// Stop without touching anything
    Abort,
}

impl From<CorruptManifestArg> for CorruptManifestPolicy {
    fn from(arg: CorruptManifestArg) -> Self {
        match arg {
            CorruptManifestArg::Quarantine => Self::Quarantine,
            CorruptManifestArg::Abort => Self::Abort,
        }
    }
}

/// Incrementally mirror an HTTP directory index.
///
/// Mirror walks the listing at URL, saves new or changed files under PATH and
/// keeps a manifest there so the next run only fetches what changed.
#[derive(Parser, Debug)]
#[command(name = "mirror")]
#[command(author, version, about)]
pub struct Args {
    /// Root listing URL (https:// is assumed when no scheme is given)
    pub url: String,

    /// Local directory to mirror into
    pub path: PathBuf,

    /// Deepest directory level to visit (0 = unbounded)
    #[arg(default_value_t = 0)]
    pub depth: usize,

    /// Write buffer size for downloads, in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE as u64, value_parser = clap::value_parser!(u64).range(MIN_CHUNK_SIZE as u64..=MAX_CHUNK_SIZE as u64))]
    pub chunk_size: u64,

    /// Minimum number of leading bytes sampled to detect changes
    #[arg(long, default_value_t = DEFAULT_PEEK_MIN_BYTES)]
    pub peek_min_bytes: u64,

    /// Sample divisor: each check reads size / N leading bytes (1-100)
    #[arg(long, default_value_t = DEFAULT_PEEK_PERCENT, value_parser = clap::value_parser!(u64).range(1..=100))]
    pub peek_percent: u64,

    /// Expand downloaded .gz, .tgz, .zip and .tar archives
    #[arg(long)]
    pub expand: bool,

    /// Save every file directly in PATH instead of recreating the tree
    #[arg(long)]
    pub flat: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Treat files already in the manifest as unchanged without checking
    #[arg(long)]
    pub assume_unchanged: bool,

    /// Delete the previous copy when a changed file is downloaded again
    #[arg(long)]
    pub delete_superseded: bool,

    /// Handling of a manifest that cannot be parsed
    #[arg(long, value_enum, default_value_t = CorruptManifestArg::Quarantine)]
    pub on_corrupt_manifest: CorruptManifestArg,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Builds a validated run configuration from the parsed arguments.
    pub fn to_config(&self) -> Result<MirrorConfig, ConfigError> {
        let mut config = MirrorConfig::new(&self.url, self.path.clone())?;
        config.max_depth = self.depth;
        config.chunk_size = usize::try_from(self.chunk_size).unwrap_or(MAX_CHUNK_SIZE);
        config.peek_min_bytes = self.peek_min_bytes;
        config.peek_percent = self.peek_percent;
        config.expand = self.expand;
        config.flat = self.flat;
        config.insecure = self.insecure;
        config.assume_unchanged = self.assume_unchanged;
        config.delete_superseded = self.delete_superseded;
        config.corrupt_policy = self.on_corrupt_manifest.into();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["mirror", "example.com/pub", "/tmp/mirror"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_minimal_args_use_defaults() {
        let args = parse(&[]);
        assert_eq!(args.url, "example.com/pub");
        assert_eq!(args.path, PathBuf::from("/tmp/mirror"));
        assert_eq!(args.depth, 0);
        assert_eq!(args.chunk_size, 512 * 1024);
        assert_eq!(args.peek_min_bytes, 32_768);
        assert_eq!(args.peek_percent, 2);
        assert!(!args.expand);
        assert!(!args.flat);
        assert_eq!(args.on_corrupt_manifest, CorruptManifestArg::Quarantine);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
    }

    #[test]
    fn test_cli_missing_positionals_rejected() {
        let result = Args::try_parse_from(["mirror", "example.com"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_depth_positional() {
        assert_eq!(parse(&["3"]).depth, 3);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        assert_eq!(parse(&["-v"]).verbose, 1);
        assert_eq!(parse(&["-vv"]).verbose, 2);
    }

    #[test]
    fn test_cli_chunk_size_bounds() {
        assert_eq!(parse(&["--chunk-size", "4096"]).chunk_size, 4096);

        let too_small = Args::try_parse_from([
            "mirror",
            "example.com",
            "/tmp/m",
            "--chunk-size",
            "1024",
        ]);
        assert_eq!(
            too_small.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_peek_percent_zero_rejected() {
        let result = Args::try_parse_from([
            "mirror",
            "example.com",
            "/tmp/m",
            "--peek-percent",
            "0",
        ]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_corrupt_manifest_policy() {
        let args = parse(&["--on-corrupt-manifest", "abort"]);
        assert_eq!(args.on_corrupt_manifest, CorruptManifestArg::Abort);
        assert_eq!(
            args.to_config().unwrap().corrupt_policy,
            CorruptManifestPolicy::Abort
        );
    }

    #[test]
    fn test_cli_to_config_applies_flags() {
        let config = parse(&[
            "2",
            "--expand",
            "--flat",
            "--insecure",
            "--assume-unchanged",
            "--delete-superseded",
            "--peek-min-bytes",
            "1024",
        ])
        .to_config()
        .unwrap();

        assert_eq!(config.base_url, "https://example.com/pub/");
        assert_eq!(config.max_depth, 2);
        assert!(config.expand && config.flat && config.insecure);
        assert!(config.assume_unchanged && config.delete_superseded);
        assert_eq!(config.peek_min_bytes, 1024);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["mirror", "--help"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::DisplayHelp
        );
    }
}
