use std::path::PathBuf;

mod analysis;
mod app;
mod config;
mod db;
mod error;
mod extract;
mod models;
mod records;
mod services;
mod urls;

use app::App;
use config::Config;
use error::Result;
use models::{FetchReport, ReadingStatus, ReadingUpdate};

const USAGE: &str = "\
Usage: pocket-rescue <command> [options]

Commands:
  fetch <csv> [--workers N] [--include-archived]   Fetch and save article content
  check <csv> [--output PATH]                      Find dead links
  recover <csv>                                    Recover dead links from the Wayback Machine
  index                                            Rebuild the search index
  search <query...>                                Search saved articles
  priority <csv> [--export PATH]                   Rank bookmarks by reading priority
  duplicates [--clean] [--keep-second]             Find (and remove) duplicate articles
  stats                                            Show store statistics
  mark <url> <status> [--progress N] [--rating N] [--notes TEXT]
                                                   Set reading status (unread, reading, completed)
  reading [status|all] [--tag TAG] [--limit N]     List articles by reading status
  session start <url>                              Start a reading session
  session end <id> [--notes TEXT]                  Finish a reading session
  reading-stats                                    Show reading statistics
  export <path> [--reading]                        Export the store (or reading data) to CSV
  cleanup [--remove-failed]                        Remove orphaned reading rows and failed articles";

#[derive(Debug, PartialEq)]
enum Command {
    Fetch {
        csv: PathBuf,
        workers: Option<usize>,
        include_archived: bool,
    },
    Check {
        csv: PathBuf,
        output: PathBuf,
    },
    Recover {
        csv: PathBuf,
    },
    Index,
    Search {
        query: String,
    },
    Priority {
        csv: PathBuf,
        export: Option<PathBuf>,
    },
    Duplicates {
        clean: bool,
        keep_first: bool,
    },
    Stats,
    Mark {
        url: String,
        update: ReadingUpdate,
    },
    Reading {
        status: Option<ReadingStatus>,
        tag: Option<String>,
        limit: Option<u32>,
    },
    SessionStart {
        url: String,
    },
    SessionEnd {
        session: i64,
        notes: Option<String>,
    },
    ReadingStats,
    Export {
        path: PathBuf,
        reading: bool,
    },
    Cleanup {
        remove_failed: bool,
    },
}

const DEFAULT_READING_LIMIT: u32 = 20;
const MAX_RATING: u8 = 5;

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Leading arguments before the first flag.
fn positionals(args: &[String]) -> Vec<&str> {
    args.iter()
        .take_while(|a| !a.starts_with("--"))
        .map(String::as_str)
        .collect()
}

fn parse_mark(rest: &[String]) -> Option<Command> {
    let args = positionals(rest);
    let [url, status, ..] = args.as_slice() else {
        return None;
    };
    let progress = match flag_value(rest, "--progress") {
        Some(p) => Some(p.parse::<u8>().ok().filter(|p| *p <= 100)?),
        None => None,
    };
    let rating = match flag_value(rest, "--rating") {
        Some(r) => Some(r.parse::<u8>().ok().filter(|r| (1..=MAX_RATING).contains(r))?),
        None => None,
    };

    Some(Command::Mark {
        url: url.to_string(),
        update: ReadingUpdate {
            status: status.parse().ok()?,
            progress,
            notes: flag_value(rest, "--notes"),
            rating,
        },
    })
}

fn parse_command(args: &[String]) -> Option<Command> {
    let (name, rest) = args.split_first()?;
    let positional = rest.first().filter(|a| !a.starts_with("--")).map(PathBuf::from);

    match name.as_str() {
        "fetch" => Some(Command::Fetch {
            csv: positional?,
            workers: flag_value(rest, "--workers").and_then(|w| w.parse().ok()),
            include_archived: has_flag(rest, "--include-archived"),
        }),
        "check" => Some(Command::Check {
            csv: positional?,
            output: flag_value(rest, "--output")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("invalid_links.csv")),
        }),
        "recover" => Some(Command::Recover { csv: positional? }),
        "index" => Some(Command::Index),
        "search" if !rest.is_empty() => Some(Command::Search {
            query: rest.join(" "),
        }),
        "priority" => Some(Command::Priority {
            csv: positional?,
            export: flag_value(rest, "--export").map(PathBuf::from),
        }),
        "duplicates" => Some(Command::Duplicates {
            clean: has_flag(rest, "--clean"),
            keep_first: !has_flag(rest, "--keep-second"),
        }),
        "stats" => Some(Command::Stats),
        "mark" => parse_mark(rest),
        "reading" => {
            let status = match positionals(rest).first() {
                None => Some(ReadingStatus::Unread),
                Some(&"all") => None,
                Some(status) => Some(status.parse().ok()?),
            };
            Some(Command::Reading {
                status,
                tag: flag_value(rest, "--tag"),
                limit: Some(
                    flag_value(rest, "--limit")
                        .and_then(|l| l.parse().ok())
                        .unwrap_or(DEFAULT_READING_LIMIT),
                ),
            })
        }
        "session" => match positionals(rest).as_slice() {
            ["start", url] => Some(Command::SessionStart {
                url: url.to_string(),
            }),
            ["end", id] => Some(Command::SessionEnd {
                session: id.parse().ok()?,
                notes: flag_value(rest, "--notes"),
            }),
            _ => None,
        },
        "reading-stats" => Some(Command::ReadingStats),
        "export" => Some(Command::Export {
            path: positional?,
            reading: has_flag(rest, "--reading"),
        }),
        "cleanup" => Some(Command::Cleanup {
            remove_failed: has_flag(rest, "--remove-failed"),
        }),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = parse_command(&args) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = Config::load()?;
    let app = App::new(config).await?;

    match command {
        Command::Fetch {
            csv,
            workers,
            include_archived,
        } => {
            let report = app.fetch(&csv, workers, include_archived).await?;
            print_report("Fetch", &report);
        }
        Command::Check { csv, output } => {
            let invalid = app.check_links(&csv, &output).await?;
            println!("Found {} invalid links, saved to {}", invalid.len(), output.display());
        }
        Command::Recover { csv } => {
            let report = app.recover(&csv).await?;
            print_report("Recovery", &report);
        }
        Command::Index => {
            let index = app.build_index().await?;
            println!("Indexed {} articles", index.len());
        }
        Command::Search { query } => {
            let hits = app.search(&query).await?;
            if hits.is_empty() {
                println!("No results for '{}'", query);
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("{:>2}. [{}] {}", i + 1, hit.score, hit.title);
                println!("    {}", hit.url);
                if !hit.tags.is_empty() {
                    println!("    tags: {}", hit.tags);
                }
            }
        }
        Command::Priority { csv, export } => {
            let ranked = app.prioritize(&csv, export.as_deref())?;
            for (category, count) in analysis::category_counts(&ranked) {
                println!("{:<8} {}", category, count);
            }
            println!();
            for article in ranked.iter().take(20) {
                println!(
                    "{:>6.2} {:<8} {}",
                    article.priority.score, article.priority.category, article.title
                );
            }
            if let Some(path) = export {
                println!("\nExported to {}", path.display());
            }
        }
        Command::Duplicates { clean, keep_first } => {
            let scan = app.duplicates(clean, keep_first).await?;
            println!("Found {} potential duplicates", scan.candidates.len());
            for candidate in &scan.candidates {
                println!("{:.2}  {}", candidate.similarity, candidate.first.title);
                println!("      {}", candidate.second.title);
            }
            if let Some(resolution) = scan.resolution {
                println!("Removed {} duplicates", resolution.removed.len());
                for path in &resolution.orphaned_files {
                    println!("Could not delete {}", path);
                }
            }
        }
        Command::Stats => {
            let stats = app.stats().await?;
            println!("Articles:        {}", stats.total_articles);
            println!("Failed:          {}", stats.failed_articles);
            println!("Total content:   {} chars", stats.total_content_length);
            println!("Average content: {} chars", stats.avg_content_length);
            println!("\nBy method:");
            for (method, count) in &stats.by_method {
                println!("  {:<12} {}", method, count);
            }
            println!("\nTop tags:");
            for (tags, count) in &stats.top_tags {
                println!("  {:<30} {}", tags, count);
            }
        }
        Command::Mark { url, update } => {
            let status = update.status;
            let article = app.mark(&url, update).await?;
            println!("Marked '{}' as {}", article.title, status);
        }
        Command::Reading { status, tag, limit } => {
            let entries = app.reading_list(status, tag, limit).await?;
            let label = status.map_or("All", |s| match s {
                ReadingStatus::Unread => "Unread",
                ReadingStatus::Reading => "Reading",
                ReadingStatus::Completed => "Completed",
            });
            println!("{} articles ({}):", label, entries.len());
            for entry in &entries {
                let title: String = entry.title.chars().take(60).collect();
                println!("- {} [{}, {}%]", title, entry.status, entry.progress_percent);
                println!("    {}", entry.url);
                println!("    {} min", entry.reading_time_estimate);
                if !entry.tags.is_empty() {
                    println!("    tags: {}", entry.tags);
                }
            }
        }
        Command::SessionStart { url } => {
            let (article, session) = app.start_session(&url).await?;
            println!("Started session {} for '{}'", session, article.title);
        }
        Command::SessionEnd { session, notes } => {
            let minutes = app.end_session(session, notes).await?;
            println!("Session {} lasted {} min", session, minutes);
        }
        Command::ReadingStats => {
            let stats = app.reading_stats().await?;
            println!("Articles:      {}", stats.total_articles);
            for (status, count) in &stats.by_status {
                println!("  {:<12} {}", status, count);
            }
            println!(
                "Reading time:  {} min ({} h)",
                stats.total_reading_minutes,
                stats.total_reading_hours()
            );
            match stats.average_rating {
                Some(rating) => println!("Avg rating:    {:.1}", rating),
                None => println!("Avg rating:    -"),
            }
            println!("\nTop tags:");
            for (tags, count) in &stats.top_tags {
                println!("  {:<30} {}", tags, count);
            }
        }
        Command::Export { path, reading } => {
            let rows = app.export(&path, reading).await?;
            println!("Exported {} rows to {}", rows, path.display());
        }
        Command::Cleanup { remove_failed } => {
            let report = app.cleanup(remove_failed).await?;
            println!("Removed {} failed articles", report.failed_articles);
            println!("Removed {} orphaned progress rows", report.orphaned_progress);
            println!("Removed {} orphaned sessions", report.orphaned_sessions);
        }
    }

    Ok(())
}

fn print_report(label: &str, report: &FetchReport) {
    println!(
        "{} finished: {} succeeded, {} failed ({} total)",
        label,
        report.succeeded,
        report.failed,
        report.total()
    );
    for (kind, count) in report.failure_kinds() {
        println!("  {:<20} {}", kind, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn parses_fetch_options() {
        assert_eq!(
            parse_command(&args("fetch part.csv --workers 4 --include-archived")),
            Some(Command::Fetch {
                csv: PathBuf::from("part.csv"),
                workers: Some(4),
                include_archived: true,
            })
        );
    }

    #[test]
    fn check_defaults_output_path() {
        assert_eq!(
            parse_command(&args("check part.csv")),
            Some(Command::Check {
                csv: PathBuf::from("part.csv"),
                output: PathBuf::from("invalid_links.csv"),
            })
        );
    }

    #[test]
    fn search_joins_query_words() {
        assert_eq!(
            parse_command(&args("search rust async")),
            Some(Command::Search {
                query: "rust async".to_string()
            })
        );
    }

    #[test]
    fn duplicates_keep_first_by_default() {
        assert_eq!(
            parse_command(&args("duplicates --clean")),
            Some(Command::Duplicates {
                clean: true,
                keep_first: true
            })
        );
        assert_eq!(
            parse_command(&args("duplicates --keep-second")),
            Some(Command::Duplicates {
                clean: false,
                keep_first: false
            })
        );
    }

    #[test]
    fn parses_mark_with_options() {
        assert_eq!(
            parse_command(&args("mark https://a.example/p completed --rating 4 --notes great")),
            Some(Command::Mark {
                url: "https://a.example/p".to_string(),
                update: ReadingUpdate {
                    status: ReadingStatus::Completed,
                    progress: None,
                    notes: Some("great".to_string()),
                    rating: Some(4),
                },
            })
        );
        assert_eq!(parse_command(&args("mark https://a.example/p skimmed")), None);
        assert_eq!(parse_command(&args("mark https://a.example/p reading --progress 150")), None);
        assert_eq!(parse_command(&args("mark https://a.example/p completed --rating 9")), None);
        assert_eq!(parse_command(&args("mark https://a.example/p")), None);
    }

    #[test]
    fn reading_list_defaults_to_unread() {
        assert_eq!(
            parse_command(&args("reading")),
            Some(Command::Reading {
                status: Some(ReadingStatus::Unread),
                tag: None,
                limit: Some(20),
            })
        );
        assert_eq!(
            parse_command(&args("reading all --tag rust --limit 5")),
            Some(Command::Reading {
                status: None,
                tag: Some("rust".to_string()),
                limit: Some(5),
            })
        );
    }

    #[test]
    fn parses_sessions_export_and_cleanup() {
        assert_eq!(
            parse_command(&args("session start https://a.example/p")),
            Some(Command::SessionStart {
                url: "https://a.example/p".to_string()
            })
        );
        assert_eq!(
            parse_command(&args("session end 12 --notes done")),
            Some(Command::SessionEnd {
                session: 12,
                notes: Some("done".to_string())
            })
        );
        assert_eq!(parse_command(&args("session end twelve")), None);
        assert_eq!(
            parse_command(&args("export out.csv --reading")),
            Some(Command::Export {
                path: PathBuf::from("out.csv"),
                reading: true
            })
        );
        assert_eq!(
            parse_command(&args("cleanup --remove-failed")),
            Some(Command::Cleanup {
                remove_failed: true
            })
        );
    }

    #[test]
    fn missing_arguments_are_rejected() {
        assert_eq!(parse_command(&args("fetch")), None);
        assert_eq!(parse_command(&args("search")), None);
        assert_eq!(parse_command(&args("bogus")), None);
        assert_eq!(parse_command(&[]), None);
    }
}
