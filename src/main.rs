use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bzip2::read::BzDecoder;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wikibreak_scanner::dump::{run_sequential, PageScanner, Stats};
use wikibreak_scanner::parallel::{process_batch_parallel, process_channel_pipeline, ParallelConfig};
use wikibreak_scanner::{Extractor, Vocabulary};

/// Processing strategy for scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Sequential processing
    Sequential,
    /// Batch-parallel processing with thread pool
    BatchParallel,
    /// Channel-based pipeline processing
    ChannelPipeline,
}

#[derive(Parser)]
#[command(name = "wikibreak-scanner")]
#[command(about = "Extract wikibreak templates from MediaWiki XML dumps - outputs one line per page")]
struct Args {
    /// Input XML file (.xml or .xml.bz2)
    input: PathBuf,

    /// Output JSONL file
    output: PathBuf,

    /// Processing strategy
    #[arg(short, long, value_enum, default_value_t = Strategy::ChannelPipeline)]
    strategy: Strategy,

    /// Number of threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// Batch size for batch-parallel strategy
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// Channel buffer size for channel-pipeline strategy
    #[arg(long, default_value_t = 10000)]
    channel_buffer: usize,

    /// Limit number of records to write
    #[arg(long)]
    limit: Option<usize>,

    /// Limit number of pages to scan
    #[arg(long)]
    page_limit: Option<usize>,

    /// Namespaces to scan (repeatable); pass -1 to scan every namespace
    #[arg(long = "namespace", default_values_t = [2, 3], allow_negative_numbers = true)]
    namespaces: Vec<i32>,

    /// Path to a wikibreak vocabulary YAML file (default: built-in schema/wikibreaks.yaml)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Log progress details
    #[arg(short, long)]
    verbose: bool,
}

fn open_input(path: &Path) -> std::io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    Ok(if path.to_string_lossy().ends_with(".bz2") {
        Box::new(BufReader::with_capacity(256 * 1024, BzDecoder::new(file)))
    } else {
        Box::new(BufReader::with_capacity(256 * 1024, file))
    })
}

fn print_stats(stats: &Stats, strategy_name: &str) {
    println!();
    println!("============================================================");
    println!("Strategy: {}", strategy_name);
    println!("Pages processed: {}", stats.pages_processed);
    println!("Pages with wikibreaks: {}", stats.pages_with_wikibreaks);
    println!("Wikibreaks found: {}", stats.wikibreaks_found);
    println!("Records written: {}", stats.records_written);
    println!("------------------------------------------------------------");
    println!("By category:");
    for (category, count) in &stats.by_category {
        println!("  {}: {}", category, count);
    }
    println!("------------------------------------------------------------");
    println!("Redirects: {}", stats.redirects);
    println!("Other namespaces: {}", stats.filtered);
    println!("Malformed pages: {}", stats.malformed);
    println!("Time: {}m {}s", stats.elapsed.as_secs() / 60, stats.elapsed.as_secs() % 60);
    println!("Rate: {:.0} pages/sec", stats.pages_processed as f64 / stats.elapsed.as_secs_f64());
    println!("============================================================");
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "wikibreak_scanner=debug"
    } else {
        "wikibreak_scanner=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let vocabulary = match &args.schema {
        Some(path) => Vocabulary::load(path),
        None => Vocabulary::builtin(),
    };
    let vocabulary = match vocabulary {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error loading wikibreak schema: {}", e);
            std::process::exit(1);
        }
    };

    let extractor = match Extractor::from_names(vocabulary.names()) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error building wikibreak matchers: {}", e);
            std::process::exit(1);
        }
    };

    // Early termination by record count needs in-order writing with a stop signal.
    if args.limit.is_some() && args.strategy == Strategy::BatchParallel {
        eprintln!(
            "Error: --limit is not supported with --strategy batch-parallel.\n\
             Use sequential or channel-pipeline, which can stop early."
        );
        std::process::exit(1);
    }

    let template_count = vocabulary.names().count();
    let namespaces = if args.namespaces.contains(&-1) {
        Vec::new()
    } else {
        args.namespaces.clone()
    };
    let scanner = Arc::new(PageScanner::new(extractor, vocabulary, namespaces));

    let mut config = ParallelConfig::default();
    if args.threads > 0 {
        config.num_threads = args.threads;
        config.num_workers = args.threads.saturating_sub(1).max(1);
    }
    config.batch_size = args.batch_size.max(1);
    config.channel_buffer = args.channel_buffer;

    if !args.quiet {
        println!("Scanning: {}", args.input.display());
        println!("Output: {}", args.output.display());
        println!("Strategy: {:?}", args.strategy);
        if args.strategy != Strategy::Sequential {
            println!("Threads: {}", config.num_threads);
        }
        println!("Templates: {}", template_count);
        if let Some(limit) = args.limit {
            println!("Limit: {} records", limit);
        }
        if let Some(limit) = args.page_limit {
            println!("Page limit: {}", limit);
        }
        println!();
    }

    let reader = open_input(&args.input)?;
    let output = File::create(&args.output)?;

    let stats = match args.strategy {
        Strategy::Sequential => {
            let mut writer = BufWriter::with_capacity(256 * 1024, output);
            run_sequential(reader, &mut writer, &*scanner, args.limit, args.page_limit, args.quiet)?
        }
        Strategy::BatchParallel => {
            let mut writer = BufWriter::with_capacity(256 * 1024, output);
            process_batch_parallel(reader, &mut writer, scanner, &config, args.page_limit)?
        }
        Strategy::ChannelPipeline => {
            process_channel_pipeline(reader, output, scanner, &config, args.limit, args.page_limit)?
        }
    };

    if !args.quiet {
        print_stats(&stats, &format!("{:?}", args.strategy));
    }

    Ok(())
}
