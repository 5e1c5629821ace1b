use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::{env, io};

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use serde::Deserialize;
use sift_crawler::{run_crawl, Collaborators, CrawlerConfig};
use sift_extract::{DomLinkExtractor, DomTextExtractor, FileSink, HttpFetcher};
use sift_frontier::{FrontierStore, SelectionMode};
use sift_score::{DetectorConfig, QualityConfig, RelevanceConfig, ScoringPipeline};
use tokio::runtime;

/// Focused topical web crawler
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Args {
    #[clap(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[clap(name = "crawl")]
    Crawl(CrawlArgs),
    #[clap(name = "seed")]
    Seed(SeedArgs),
    #[clap(name = "stats")]
    Stats(StatsArgs),
    #[clap(hide = true)]
    Completion,
}

/// Full crawl configuration, usually loaded from a yaml file and then
/// overridden per flag.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrawlConfig {
    pub store: PathBuf,
    pub output_dir: PathBuf,
    pub crawler: CrawlerConfig,
    pub relevance: RelevanceConfig,
    pub quality: QualityConfig,
    pub detector: DetectorConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            store: PathBuf::from("sift.db"),
            output_dir: PathBuf::from("pages"),
            crawler: CrawlerConfig::default(),
            relevance: RelevanceConfig::default(),
            quality: QualityConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

/// Crawl from the frontier, keeping on-topic pages
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    /// Seed URLs added to the frontier at depth 0 before crawling
    #[clap(long, short)]
    pub seed: Vec<String>,
    /// Topic keywords, overriding the config file's list
    #[clap(long, short)]
    pub keyword: Vec<String>,
    /// Optional yaml configuration file
    #[clap(env = "SIFT_CONFIG", parse(from_os_str), long, short)]
    pub config: Option<PathBuf>,
    /// Override the frontier database path
    #[clap(parse(from_os_str), long)]
    pub store: Option<PathBuf>,
    /// Override the directory retained pages are written to
    #[clap(parse(from_os_str), long)]
    pub output_dir: Option<PathBuf>,
    /// Override the crawler's user agent
    #[clap(long)]
    pub user_agent: Option<String>,
    /// Override the number of crawl workers
    #[clap(long)]
    pub num_workers: Option<usize>,
    /// Override how many URLs are claimed per batch
    #[clap(long)]
    pub batch_size: Option<usize>,
    /// Override the link-following depth bound
    #[clap(long)]
    pub max_depth: Option<u32>,
    /// Override the retry ceiling for failed fetches
    #[clap(long)]
    pub max_retries: Option<u32>,
    /// Override how claims pick among eligible URLs
    #[clap(arg_enum, long)]
    pub selection: Option<SelectionMode>,
    /// No SIGINT handling, the crawl won't stop cleanly on ctrl-c
    #[clap(long)]
    pub no_sigint: bool,
    /// When quiet no logs are outputted
    #[clap(long, short)]
    pub quiet: bool,
}

impl TryFrom<&CrawlArgs> for CrawlConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(file) = args.config.as_ref().map(File::open) {
            serde_yaml::from_reader(file?)?
        } else {
            CrawlConfig::default()
        };
        if !args.keyword.is_empty() {
            conf.relevance.keywords = args.keyword.clone();
        }
        if let Some(store) = &args.store {
            conf.store = store.clone();
        }
        if let Some(output_dir) = &args.output_dir {
            conf.output_dir = output_dir.clone();
        }
        if let Some(user_agent) = &args.user_agent {
            conf.crawler.user_agent = user_agent.to_string();
        }
        if let Some(num_workers) = args.num_workers {
            conf.crawler.num_workers = num_workers;
        }
        if let Some(batch_size) = args.batch_size {
            conf.crawler.batch_size = batch_size;
        }
        if let Some(max_depth) = args.max_depth {
            conf.crawler.max_depth = max_depth;
        }
        if let Some(max_retries) = args.max_retries {
            conf.crawler.max_retries = max_retries;
        }
        if let Some(selection) = args.selection {
            conf.crawler.selection = selection;
        }
        if args.no_sigint {
            conf.crawler.handle_sigint = false;
        }
        Ok(conf)
    }
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let conf: CrawlConfig = (&args).try_into()?;
    anyhow::ensure!(
        !conf.relevance.keywords.is_empty(),
        "no topic keywords configured; pass --keyword or set relevance.keywords"
    );

    let store = Arc::new(FrontierStore::open(&conf.store, conf.crawler.max_retries)?);
    for url in &args.seed {
        store.insert(url, None, 0)?;
    }

    let collab = Collaborators {
        fetcher: Arc::new(HttpFetcher::new(
            &conf.crawler.user_agent,
            conf.crawler.fetch_timeout(),
        )?),
        links: Arc::new(DomLinkExtractor),
        text: Arc::new(DomTextExtractor),
        sink: Arc::new(FileSink::new(&conf.output_dir)?),
        renderers: None,
    };
    let scoring = ScoringPipeline::new(
        conf.relevance.clone(),
        conf.quality.clone(),
        conf.detector.clone(),
    );

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let report = rt.block_on(run_crawl(&conf.crawler, store, collab, scoring))?;

    println!(
        "fetched {}, kept {}, failed {}, deferred {}, discovered {}",
        report.fetched, report.kept, report.failed, report.deferred, report.discovered
    );
    print_stats(&report.stats);
    Ok(())
}

/// Add URLs to the frontier without crawling
#[derive(Debug, clap::Args)]
pub struct SeedArgs {
    /// Path to the frontier database
    #[clap(parse(from_os_str), long, default_value = "sift.db")]
    pub store: PathBuf,
    /// URLs added at depth 0
    #[clap(required = true)]
    pub urls: Vec<String>,
}

pub fn seed(args: SeedArgs) -> anyhow::Result<()> {
    let store = FrontierStore::open(&args.store, CrawlerConfig::default().max_retries)?;
    let mut added = 0;
    for url in &args.urls {
        if store.insert(url, None, 0)? {
            added += 1;
        }
    }
    println!("added {added} of {} urls", args.urls.len());
    Ok(())
}

/// Print frontier counts per status
#[derive(Debug, clap::Args)]
pub struct StatsArgs {
    /// Path to the frontier database
    #[clap(parse(from_os_str), long, default_value = "sift.db")]
    pub store: PathBuf,
}

pub fn stats(args: StatsArgs) -> anyhow::Result<()> {
    let store = FrontierStore::open(&args.store, CrawlerConfig::default().max_retries)?;
    print_stats(&store.stats()?);
    Ok(())
}

fn print_stats(stats: &sift_frontier::FrontierStats) {
    println!(
        "frontier: {} pending, {} leased, {} success, {} failed ({} total)",
        stats.pending, stats.leased, stats.success, stats.failed, stats.total
    );
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            if !args.quiet {
                env::set_var(
                    "RUST_LOG",
                    "sift_crawler=info,sift_frontier=warn,sift_extract=warn",
                );
                env_logger::init();
            }
            crawl(args)
        }
        SubCommand::Seed(args) => seed(args),
        SubCommand::Stats(args) => stats(args),
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "sift", &mut io::stdout());
            Ok(())
        }
    }
}
