use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "snowball",
    version,
    about = "Copy local directory trees into S3-compatible object storage"
)]
pub struct Cli {
    /// Config file, defaults to the per-user snowball config
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// S3 endpoint url
    #[arg(long, global = true, env = "SNOWBALL_ENDPOINT")]
    pub endpoint: Option<String>,

    /// S3 region
    #[arg(long, global = true, env = "SNOWBALL_REGION")]
    pub region: Option<String>,

    /// Turn verbose logging on
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync a source directory into a bucket
    Sync(SyncArgs),
    /// Upload a single file
    Upload(UploadArgs),
    /// List objects in a bucket
    List(ListArgs),
    /// Delete objects by key or by prefix
    Delete(DeleteArgs),
}

#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Source directory
    #[arg(short, long, value_name = "DIR")]
    pub src: PathBuf,

    /// Destination bucket
    #[arg(short, long, env = "SNOWBALL_BUCKET")]
    pub bucket: Option<String>,

    /// Object keys start with this prefix
    #[arg(short = 'x', long, default_value = "")]
    pub prefix: String,

    /// Chunk part size in MiB
    #[arg(short, long, default_value_t = 32, value_parser = part_size)]
    pub part: u64,

    /// Number of parts of one file uploaded in parallel
    #[arg(short, long, default_value_t = 3)]
    pub threads: usize,

    /// Number of files processed in parallel
    #[arg(short, long, default_value_t = libdispatch::dispatcher::DEFAULT_POOL_SIZE)]
    pub forks: usize,

    /// Number of files queued ahead of the workers
    #[arg(short, long, default_value_t = libdispatch::dispatcher::DEFAULT_QUEUE_CAPACITY)]
    pub queue: usize,

    /// Print what would be uploaded without uploading
    #[arg(short, long)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct UploadArgs {
    /// Source file to upload
    #[arg(short, long, value_name = "FILE")]
    pub src: PathBuf,

    /// Destination object key, defaults to the source path
    #[arg(short, long)]
    pub dst: Option<String>,

    /// Destination bucket
    #[arg(short, long, env = "SNOWBALL_BUCKET")]
    pub bucket: Option<String>,

    /// Chunk part size in MiB
    #[arg(short, long, default_value_t = 32, value_parser = part_size)]
    pub part: u64,

    /// Number of parts uploaded in parallel
    #[arg(short, long, default_value_t = 3)]
    pub threads: usize,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Bucket to list
    #[arg(short, long, env = "SNOWBALL_BUCKET")]
    pub bucket: Option<String>,

    /// Only list keys starting with this prefix
    #[arg(short, long, default_value = "")]
    pub prefix: String,

    /// Sort by key instead of modification time
    #[arg(short, long)]
    pub group: bool,
}

#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// Bucket to delete from
    #[arg(short, long, env = "SNOWBALL_BUCKET")]
    pub bucket: Option<String>,

    /// Keys to delete, repeated or comma separated
    #[arg(short, long, value_delimiter = ',', required_unless_present = "prefix")]
    pub keys: Vec<String>,

    /// Delete every object whose key starts with this prefix
    #[arg(short, long)]
    pub prefix: Option<String>,
}

/// S3 parts are at most 5 GiB.
fn part_size(value: &str) -> Result<u64, String> {
    let mib: u64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number of MiB"))?;
    if !(1..=5 * 1024).contains(&mib) {
        return Err(format!("part size must be between 1 and 5120 MiB, got {mib}"));
    }
    Ok(mib)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_defaults() {
        let cli = Cli::try_parse_from(["snowball", "sync", "--src", "/opt/data"]).unwrap();
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync command");
        };
        assert_eq!(args.src, PathBuf::from("/opt/data"));
        assert_eq!(args.part, 32);
        assert_eq!(args.threads, 3);
        assert_eq!(args.forks, 32);
        assert_eq!(args.queue, 100);
        assert!(!args.dry_run);
        assert_eq!(args.prefix, "");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "snowball",
            "upload",
            "-s",
            "a.cbb",
            "--endpoint",
            "http://127.0.0.1:9000",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
        assert!(matches!(cli.command, Commands::Upload(ref args) if args.dst.is_none()));
    }

    #[test]
    fn test_part_size_bounds() {
        for bad in ["0", "5121", "18446744073709551615", "big"] {
            assert!(
                Cli::try_parse_from(["snowball", "sync", "-s", "/opt", "--part", bad]).is_err(),
                "accepted --part {bad}"
            );
        }
        let cli = Cli::try_parse_from(["snowball", "upload", "-s", "a", "-p", "5120"]).unwrap();
        assert!(matches!(cli.command, Commands::Upload(ref args) if args.part == 5120));
    }

    #[test]
    fn test_delete_keys() {
        let cli =
            Cli::try_parse_from(["snowball", "delete", "-k", "a.cbb,b.cbb", "-k", "c.cbb"]).unwrap();
        let Commands::Delete(args) = cli.command else {
            panic!("expected delete command");
        };
        assert_eq!(args.keys, vec!["a.cbb", "b.cbb", "c.cbb"]);
        assert_eq!(args.prefix, None);

        assert!(Cli::try_parse_from(["snowball", "delete"]).is_err());
        assert!(Cli::try_parse_from(["snowball", "delete", "--prefix", "2024/"]).is_ok());
    }

    #[test]
    fn test_list_defaults() {
        let cli = Cli::try_parse_from(["snowball", "list", "-g"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List(ref args) if args.group && args.prefix.is_empty() && args.bucket.is_none()
        ));
    }
}
