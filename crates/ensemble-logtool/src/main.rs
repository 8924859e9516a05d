use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ensemble_logtool::cluster::Cluster;
use ensemble_logtool::keys::{EnsembleId, StorageKey, TestUid};
use ensemble_logtool::ops::{self, UploadOutcome, UploadRequest};
use ensemble_logtool::{Error, Result};

#[derive(Debug, Parser)]
#[command(
    name = "logtool",
    author,
    version,
    about = "Upload/download simulation trace logs for ensemble test runs"
)]
struct Args {
    /// Cluster file describing the result store and feed
    #[arg(long, global = true)]
    cluster_file: Option<PathBuf>,
    /// Add debug logging
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check the log files and upload them to the result store if necessary
    Upload {
        /// Work directory; the ensemble id is read from `.../ensembles/<id>`
        #[arg(long)]
        work_directory: Option<PathBuf>,
        /// Directory containing trace*.xml / trace*.json logs
        #[arg(long)]
        log_directory: PathBuf,
        /// Ensemble ID (overrides the work directory)
        #[arg(long)]
        ensemble_id: Option<String>,
        /// Test UID
        #[arg(long)]
        test_uid: String,
        /// Only upload logs when RocksDB is involved; otherwise always upload
        #[arg(long)]
        check_rocksdb: bool,
        /// Trace string checked by --check-rocksdb (repeatable; replaces the configured list)
        #[arg(long = "marker")]
        markers: Vec<String>,
    },
    /// Download the logs of one test into a local directory
    Download {
        /// Ensemble ID
        #[arg(long)]
        ensemble_id: String,
        /// Test UID
        #[arg(long)]
        test_uid: String,
        /// Extract here instead of the current directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// List download commands for failed tests in an ensemble. A listed test
    /// may have no stored logs if it never uploaded any.
    List {
        /// Ensemble ID
        #[arg(long)]
        ensemble_id: String,
    },
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|e| Error::msg(format!("cwd error: {e}")))
}

fn main() -> Result<()> {
    let args = Args::parse();
    ensemble_logtool::logging::init(args.debug);

    let cluster = Cluster::open(args.cluster_file.as_deref())?;
    match args.cmd {
        Command::Upload {
            work_directory,
            log_directory,
            ensemble_id,
            test_uid,
            check_rocksdb,
            markers,
        } => {
            let req = UploadRequest {
                work_dir: match work_directory {
                    Some(d) => d,
                    None => current_dir()?,
                },
                log_dir: log_directory,
                ensemble_id,
                test_uid: TestUid::parse(&test_uid)?,
                check_markers: check_rocksdb,
                markers,
            };
            cmd_upload(&cluster, &req)
        }
        Command::Download {
            ensemble_id,
            test_uid,
            output_dir,
        } => {
            let key = StorageKey::new(EnsembleId::parse(&ensemble_id)?, TestUid::parse(&test_uid)?);
            let dest = match output_dir {
                Some(d) => d,
                None => current_dir()?,
            };
            ops::download(&cluster, &key, &dest)?;
            Ok(())
        }
        Command::List { ensemble_id } => cmd_list(&cluster, EnsembleId::parse(&ensemble_id)?),
    }
}

fn cmd_upload(cluster: &Cluster, req: &UploadRequest) -> Result<()> {
    match ops::upload(cluster, req)? {
        UploadOutcome::Uploaded { key, manifest } => {
            tracing::debug!("stored {key} sha256 {}", manifest.sha256);
        }
        UploadOutcome::NoTraceFiles => {
            tracing::info!("skipped: no trace files in {}", req.log_dir.display());
        }
        UploadOutcome::MarkersNotFound => {
            tracing::info!("skipped: markers not found");
        }
    }
    Ok(())
}

fn cmd_list(cluster: &Cluster, ensemble_id: EnsembleId) -> Result<()> {
    for item in ops::list(cluster, ensemble_id)? {
        println!("{}", item?);
    }
    Ok(())
}
