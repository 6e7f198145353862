use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use changefeed::{init_tracing, ChangeFeed, EnqueueStatus, FeedConfig, FileChange};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

/// One line of input: a batch as a file watcher would report it.
#[derive(Debug, Deserialize)]
struct BatchRequest {
    project_id: String,
    user_id: String,
    #[serde(default)]
    changes: Vec<FileChange>,
}

#[derive(Debug, Default)]
struct Options {
    data_dir: Option<PathBuf>,
    in_memory: bool,
    follow: Vec<String>,
}

const USAGE: &str = "usage: changefeed-ingest [--data-dir <dir>] [--in-memory] [--follow <project>]...

Reads newline-delimited JSON batches from stdin:
  {\"project_id\": \"p1\", \"user_id\": \"u1\", \"changes\": [{\"path\": \"a.txt\", \"op\": \"create\", \"size\": 10}]}
Events for followed projects are written to stdout as JSON lines.";

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Options>, String> {
    let mut options = Options::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data-dir" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--data-dir requires a value".to_string())?;
                options.data_dir = Some(PathBuf::from(value));
            }
            "--in-memory" => options.in_memory = true,
            "--follow" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--follow requires a project id".to_string())?;
                options.follow.push(value);
            }
            "-h" | "--help" => return Ok(None),
            other => return Err(format!("unknown argument '{other}'\n\n{USAGE}")),
        }
    }
    Ok(Some(options))
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("changefeed-ingest failed: {error}");
        std::process::exit(1);
    }
}

/// Load `path` (or `.env` from the working directory) into the environment.
/// A missing file is not an error; `Ok(false)` reports that nothing was loaded.
fn load_env_file(path: Option<&Path>) -> Result<bool, dotenvy::Error> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };
    match loaded {
        Ok(()) => Ok(true),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

async fn run() -> Result<(), String> {
    let env_file = load_env_file(None);
    init_tracing();
    if let Err(e) = env_file {
        tracing::warn!("ignoring unreadable .env file: {e}");
    }

    let Some(options) = parse_args(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };

    let mut config = FeedConfig::from_env().map_err(|e| e.to_string())?;
    if options.in_memory {
        config.data_dir = None;
    } else if let Some(dir) = options.data_dir {
        config.data_dir = Some(dir);
    }

    let feed = ChangeFeed::open(&config).map_err(|e| e.to_string())?;

    let followers: Vec<_> = options
        .follow
        .iter()
        .map(|project_id| {
            feed.subscribe_with(project_id, |event| match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("failed to encode change event: {e}"),
            })
        })
        .collect();

    let mut projects = BTreeSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let request: BatchRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("line {line_no}: invalid batch request: {e}");
                continue;
            }
        };
        projects.insert(request.project_id.clone());
        match feed.enqueue(request.project_id, request.user_id, request.changes) {
            EnqueueStatus::Accepted | EnqueueStatus::Empty => {}
            status => tracing::warn!("line {line_no}: batch not queued ({status:?})"),
        }
    }

    feed.shutdown().await;

    let mut latest = Vec::with_capacity(projects.len());
    for project_id in projects {
        let seq = feed
            .log()
            .latest_seq(&project_id)
            .await
            .map_err(|e| e.to_string())?;
        latest.push((project_id, seq));
    }

    // Followers finish once the notifier is gone and their backlog is printed.
    drop(feed);
    for follower in followers {
        follower.join().await;
    }

    for (project_id, seq) in latest {
        tracing::info!(project_id = %project_id, latest_seq = seq, "ingest complete");
    }
    Ok(())
}
