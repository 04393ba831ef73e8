use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use podmirror::{
    AcquisitionPipeline, BucketConfig, Catalog, ContentStore, FeedInfo, FfmpegTranscoder,
    MediaDownloader, NoopNotifier, NoopReporter, Notifier, Orchestrator, OvercastPing,
    ProgressEvent, ProgressReporter, Reconciler, ReqwestClient, S3Bucket, SharedProgressReporter,
    SoundsSource, SyncOptions, SyncResult,
};

// Emoji with fallback for terminals without Unicode support
static RADIO: Emoji<'_, '_> = Emoji("📻 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static BUCKET: Emoji<'_, '_> = Emoji("🪣 ", "[i] ");
static UPLOAD: Emoji<'_, '_> = Emoji("📤 ", "[^] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Mirror streaming radio episodes into a podcast feed on S3
#[derive(Parser, Debug)]
#[command(name = "podmirror")]
#[command(about = "Mirror streaming radio episodes into a podcast feed on S3")]
#[command(version)]
struct Args {
    /// Working directory for downloaded and converted files
    #[arg(long, env = "OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Episode catalog database [default: <output-dir>/catalog.db]
    #[arg(long, env = "DATABASE_PATH")]
    database_path: Option<PathBuf>,

    /// File listing episode page URLs, newest first
    #[arg(long, env = "EPISODES_FILE")]
    episodes_file: Option<PathBuf>,

    /// Number of most recent episodes to publish
    #[arg(short = 'n', long, env = "EPISODE_LIMIT", default_value = "20")]
    episode_limit: usize,

    /// Timeout for a single network request, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "60")]
    request_timeout: u64,

    /// Timeout for a single run of an external media tool, in seconds
    #[arg(long, env = "TOOL_TIMEOUT", default_value = "1800")]
    tool_timeout: u64,

    /// Logo image published as logo.png
    #[arg(long, env = "LOGO_FILE")]
    logo_file: Option<PathBuf>,

    /// Destination bucket
    #[arg(long, env = "S3_BUCKET_NAME")]
    bucket: String,

    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// Custom endpoint for S3 compatible services
    #[arg(long, env = "S3_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, env = "AWS_ACCESS_ID", hide_env_values = true)]
    access_key_id: Option<String>,

    #[arg(long, env = "AWS_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Public URL of the bucket [default: https://<bucket>.s3.amazonaws.com]
    #[arg(long, env = "PODCAST_URL")]
    podcast_url: Option<String>,

    /// Ping Overcast when the feed changes
    #[arg(long, env = "OVERCAST")]
    overcast: bool,

    /// Re-upload objects whose recorded digest differs from the local file
    #[arg(long, env = "VERIFY_DIGESTS")]
    verify_digests: bool,

    /// Publish from the catalog without asking the source for new episodes
    #[arg(long, env = "NO_EPISODE_REFRESH")]
    no_episode_refresh: bool,

    #[arg(long, env = "FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    #[arg(long, env = "FFPROBE", default_value = "ffprobe")]
    ffprobe: PathBuf,

    #[arg(long, env = "YT_DLP", default_value = "yt-dlp")]
    yt_dlp: PathBuf,

    /// Log filter, e.g. "info" or "podmirror=debug"
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

/// Log writer that hides the progress bars while a line is written
#[derive(Clone)]
struct SuspendingWriter {
    multi: Option<MultiProgress>,
}

impl Write for SuspendingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.multi {
            Some(multi) => multi.suspend(|| io::stderr().write(buf)),
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for SuspendingWriter {
    type Writer = SuspendingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new(multi: &MultiProgress) -> Self {
        let main_bar = multi.add(ProgressBar::new(0));
        main_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self { main_bar }
    }

    fn println(&self, line: String) {
        self.main_bar.suspend(|| println!("{line}"));
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::PartialFilesCleanedUp { count } => {
                self.println(format!(
                    "{BROOM}Removed {} leftover partial file(s)",
                    count.to_string().yellow()
                ));
            }

            ProgressEvent::CatalogRefreshed {
                listed,
                added,
                failed,
            } => {
                self.println(format!(
                    "{SEARCH}Catalog: {} listed, {} new, {} failed",
                    listed.to_string().cyan(),
                    added.to_string().green(),
                    if failed > 0 {
                        failed.to_string().red().bold()
                    } else {
                        failed.to_string().green()
                    }
                ));
            }

            ProgressEvent::RemoteListed { bucket, keys } => {
                self.main_bar.set_message(format!(
                    "{BUCKET}{} holds {} objects",
                    bucket.bold().green(),
                    keys.to_string().cyan()
                ));
            }

            ProgressEvent::EpisodesPlanned {
                total,
                to_upload,
                to_delete,
            } => {
                self.main_bar.set_length(total as u64);
                self.println(format!(
                    "{BUCKET}{} episodes published, {} to upload, {} to delete",
                    total.to_string().cyan(),
                    to_upload.to_string().yellow(),
                    to_delete.to_string().yellow()
                ));
            }

            ProgressEvent::EpisodeStarting { index, title, .. } => {
                self.main_bar.set_position(index as u64);
                self.main_bar
                    .set_message(format!("{UPLOAD}{}", truncate_title(&title, 50)));
            }

            ProgressEvent::EpisodeAlreadyPresent { .. } => {
                self.main_bar.inc(1);
            }

            ProgressEvent::EpisodeSynced { title, .. } => {
                self.main_bar.inc(1);
                self.println(format!("  {SUCCESS}{}", truncate_title(&title, 60).green()));
            }

            ProgressEvent::EpisodeFailed { title, error, .. } => {
                self.main_bar.inc(1);
                self.println(format!(
                    "  {FAILURE}{} - {}",
                    truncate_title(&title, 40).red(),
                    error.red()
                ));
            }

            ProgressEvent::OrphansDeleted { count } => {
                self.println(format!(
                    "{BROOM}Deleted {} object(s) outside the published window",
                    count.to_string().yellow()
                ));
            }

            ProgressEvent::FeedPublished { url } => {
                self.println(format!("{UPLOAD}Published feed: {}", url.cyan()));
            }

            ProgressEvent::SyncCompleted {
                synced_count,
                present_count,
                failed_count,
                changed,
            } => {
                let note = if changed { "" } else { " (no changes)" };
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} synced, {} already present, {} failed{}",
                    "Sync complete:".bold().green(),
                    synced_count.to_string().green().bold(),
                    present_count.to_string().yellow(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    },
                    note.dimmed()
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let head: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

fn init_tracing(log_level: &str, multi: Option<MultiProgress>) -> Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log level: {log_level}"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(SuspendingWriter { multi }))
        .try_init()
        .context("Failed to install log subscriber")?;
    Ok(())
}

async fn sync(
    orchestrator: &Orchestrator<'_>,
    args: &Args,
    client: &ReqwestClient,
) -> Result<SyncResult> {
    if !args.no_episode_refresh {
        let Some(episodes_file) = &args.episodes_file else {
            bail!("--episodes-file is required unless --no-episode-refresh is set");
        };
        let source = SoundsSource::new(client.clone(), episodes_file);
        orchestrator
            .refresh_catalog(&source)
            .await
            .context("Failed to refresh catalog")?;
    }

    orchestrator.run().await.context("Sync aborted")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let multi = (!args.quiet).then(MultiProgress::new);
    init_tracing(&args.log_level, multi.clone())?;

    let reporter: SharedProgressReporter = match &multi {
        Some(multi) => Arc::new(IndicatifReporter::new(multi)),
        None => NoopReporter::shared(),
    };

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            RADIO,
            "podmirror".bold().magenta(),
            "- Podcast Mirror".dimmed()
        );
    }

    let request_timeout = Duration::from_secs(args.request_timeout);
    let tool_timeout = Duration::from_secs(args.tool_timeout);

    let client = ReqwestClient::new(request_timeout).context("Failed to create HTTP client")?;

    let (content, cleaned) = ContentStore::open(&args.output_dir)
        .with_context(|| format!("Failed to open {}", args.output_dir.display()))?;
    if cleaned > 0 {
        reporter.report(ProgressEvent::PartialFilesCleanedUp { count: cleaned });
    }

    let database_path = args
        .database_path
        .clone()
        .unwrap_or_else(|| args.output_dir.join("catalog.db"));
    let catalog = Catalog::open(&database_path)
        .await
        .with_context(|| format!("Failed to open catalog {}", database_path.display()))?;

    let bucket = S3Bucket::new(&BucketConfig {
        bucket: args.bucket.clone(),
        region: args.region.clone(),
        endpoint: args.endpoint.clone(),
        access_key_id: args.access_key_id.clone(),
        secret_access_key: args.secret_key.clone(),
        request_timeout,
    })
    .context("Failed to configure bucket")?;

    let pipeline = AcquisitionPipeline::new(
        Arc::new(MediaDownloader::new(client.clone(), &args.yt_dlp, tool_timeout)),
        Arc::new(FfmpegTranscoder::new(&args.ffmpeg, &args.ffprobe, tool_timeout)),
        content.clone(),
    );
    let reconciler = Reconciler::new(Arc::new(bucket), content, args.verify_digests);

    let notifier: Arc<dyn Notifier> = if args.overcast {
        Arc::new(OvercastPing::new(client.clone()))
    } else {
        Arc::new(NoopNotifier)
    };

    let options = SyncOptions {
        max_episodes: args.episode_limit,
        podcast_url: args
            .podcast_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.s3.amazonaws.com", args.bucket)),
        logo_file: args.logo_file.clone(),
        feed: FeedInfo::default(),
    };

    let orchestrator = Orchestrator::new(&catalog, pipeline, reconciler, notifier, options, reporter);

    let outcome = sync(&orchestrator, &args, &client).await;
    drop(orchestrator);
    catalog.close().await;
    let result = outcome?;

    if !args.quiet && result.failed() > 0 {
        println!("\n{}", "Failed episodes:".red().bold());
        for (episode_id, title, error) in result.failed_episodes() {
            println!(
                "  {}{} ({}) - {}",
                CROSS,
                title.yellow(),
                episode_id,
                error.dimmed()
            );
        }
    }

    Ok(())
}
