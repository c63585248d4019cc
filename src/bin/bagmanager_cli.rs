use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bagmanager::core::time::{ns_to_secs, secs_to_ns};
use bagmanager::core::{BagManager, BagMessage, Message, ReaderConfig};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bagmanager-cli", version, about = "Query recorded message bags")]
struct Cli {
    /// Skip payload CRC checks on read.
    #[arg(long = "no-verify", global = true)]
    no_verify: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise topics, counts and types.
    Info {
        bag_path: PathBuf,
        #[arg(long = "json")]
        json: bool,
    },
    /// Index one topic and print its statistics.
    Topic {
        bag_path: PathBuf,
        topic: String,
        /// Also decode header stamps (reads every message).
        #[arg(long = "header")]
        header: bool,
        /// Print every timestamp.
        #[arg(long = "times")]
        times: bool,
    },
    /// Print the message at a position within a topic.
    Message {
        bag_path: PathBuf,
        topic: String,
        index: usize,
    },
    /// Print the message closest to a time in seconds.
    Closest(ClosestArgs),
    /// Count messages per topic within [start, end] (seconds, inclusive).
    Count {
        bag_path: PathBuf,
        #[arg(long = "topic")]
        topics: Vec<String>,
        #[arg(long = "start")]
        start: Option<f64>,
        #[arg(long = "end")]
        end: Option<f64>,
        #[arg(long = "json")]
        json: bool,
    },
}

#[derive(Args)]
struct ClosestArgs {
    bag_path: PathBuf,
    topic: String,
    time_secs: f64,
    /// Match against header stamps instead of log time.
    #[arg(long = "header")]
    header: bool,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = ReaderConfig {
        verify_crc: !cli.no_verify,
    };
    let mut out = io::BufWriter::new(io::stdout());
    match cli.command {
        Commands::Info { bag_path, json } => cmd_info(&open(&bag_path, config)?, json, &mut out)?,
        Commands::Topic {
            bag_path,
            topic,
            header,
            times,
        } => cmd_topic(&open(&bag_path, config)?, &topic, header, times, &mut out)?,
        Commands::Message {
            bag_path,
            topic,
            index,
        } => {
            let bag = open(&bag_path, config)?;
            let msg = bag.get_message_by_index(&topic, index)?;
            write_message(&topic, index, &msg, &mut out)?;
        }
        Commands::Closest(args) => cmd_closest(&open(&args.bag_path, config)?, &args, &mut out)?,
        Commands::Count {
            bag_path,
            topics,
            start,
            end,
            json,
        } => {
            let bag = open(&bag_path, config)?;
            cmd_count(&bag, &topics, start, end, json, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn open(path: &Path, config: ReaderConfig) -> Result<BagManager> {
    BagManager::open_with_config(path, config)
        .with_context(|| format!("opening {}", path.display()))
}

fn parse_secs(secs: f64) -> Result<u64> {
    secs_to_ns(secs).ok_or_else(|| anyhow!("invalid time: {secs}"))
}

fn cmd_info(bag: &BagManager, json: bool, out: &mut dyn Write) -> Result<()> {
    let summary = bag.summary()?.with_path(bag.path());
    if json {
        serde_json::to_writer_pretty(&mut *out, &summary)?;
        writeln!(out)?;
    } else {
        write!(out, "{summary}")?;
    }
    Ok(())
}

fn cmd_topic(
    bag: &BagManager,
    topic: &str,
    header: bool,
    times: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let info = bag.get_topic_info(topic, header)?;
    writeln!(out, "topic={}", info.topic())?;
    writeln!(
        out,
        "type={} messages={}",
        info.message_type(),
        info.message_count()
    )?;
    match info.frequency() {
        Some(hz) => writeln!(out, "frequency_hz={hz:.3}")?,
        None => writeln!(out, "frequency_hz=n/a")?,
    }
    if let (Some(start), Some(end)) = (info.start_time_ns(), info.end_time_ns()) {
        writeln!(out, "start_ns={start} end_ns={end}")?;
    }
    if times {
        let headers = info.header_times();
        for (i, ts) in info.rosbag_times().iter().enumerate() {
            match headers {
                Some(headers) => writeln!(out, "{i} rosbag_ns={ts} header_ns={}", headers[i])?,
                None => writeln!(out, "{i} rosbag_ns={ts}")?,
            }
        }
    }
    Ok(())
}

fn cmd_closest(bag: &BagManager, args: &ClosestArgs, out: &mut dyn Write) -> Result<()> {
    let time_ns = parse_secs(args.time_secs)?;
    let (position, msg) = if args.header {
        bag.closest_by_header_time(&args.topic, time_ns)?
    } else {
        bag.closest_by_rosbag_time(&args.topic, time_ns)?
    };
    write_message(&args.topic, position, &msg, out)
}

fn cmd_count(
    bag: &BagManager,
    topics: &[String],
    start: Option<f64>,
    end: Option<f64>,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let start = start.map(parse_secs).transpose()?;
    let end = end.map(parse_secs).transpose()?;
    let names: Vec<&str> = topics.iter().map(String::as_str).collect();
    let selected = (!names.is_empty()).then_some(names.as_slice());
    let counts = bag.get_message_count_in_interval(selected, start, end)?;
    if json {
        serde_json::to_writer_pretty(&mut *out, &counts)?;
        writeln!(out)?;
        return Ok(());
    }
    for (topic, count) in counts.iter() {
        writeln!(out, "{topic} {count}")?;
    }
    writeln!(out, "total {}", counts.total())?;
    Ok(())
}

fn write_message(topic: &str, index: usize, msg: &BagMessage, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "topic={topic} index={index} type={}", msg.type_name())?;
    match msg.header_timestamp() {
        Ok(Some(stamp)) => writeln!(out, "header_s={:.9}", ns_to_secs(stamp))?,
        Ok(None) => {}
        Err(err) => writeln!(out, "header=<{err}>")?,
    }
    let body = msg.body();
    writeln!(out, "body_len={}", body.len())?;
    let preview: Vec<String> = body.iter().take(32).map(|b| format!("{b:02x}")).collect();
    writeln!(out, "body={}", preview.join(" "))?;
    Ok(())
}
