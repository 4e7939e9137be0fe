#![allow(clippy::print_stderr, clippy::print_stdout)]

//! CLI entrypoint for `grh` (Gerrit review helper).
//!
//! The handlers live in the `grh` library crate (`src/commands.rs`); this file
//! parses flags, sets up logging and prints results.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use grh::commands::{self, ListParams, OpenParams, SpamParams};
use grh::config::{Config, ConfigOverrides};
use grh::format::ColorChoice;
use grh::git::Git;
use grh::runner::ProcessRunner;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "grh",
    version,
    about = "Gerrit review helper",
    long_about = "Gerrit review helper.\n\n\
`grh` talks to a Gerrit server over its SSH command interface and to the local `git` client.\n\
Server, user, port and project are taken from the URL of the configured remote unless given as flags.\n\n\
Use `--json` for machine-readable output.",
    after_long_help = r#"Changeset arguments:
  63155                      change number (current patchset)
  refs/changes/55/63155/3    ref path (patchset 3)
  https://review.example.com/c/tools/grh/+/63155
                             review URL (last path segment)
  63155/2                    change and patchset (spam only)

Common flows:
  grh list reset
  grh fetch 63155 && git checkout FETCH_HEAD
  grh reset-to main
  grh spam 63155 63160/4 --message recheck
"#
)]
struct Cli {
    #[arg(
        short = 'H',
        long,
        global = true,
        env = "GRH_HOST",
        value_name = "HOST",
        help = "Review server host (default: from the remote URL)."
    )]
    host: Option<String>,
    #[arg(
        short = 'U',
        long,
        global = true,
        env = "GRH_USER",
        value_name = "USER",
        help = "SSH user (default: remote URL, then `git config gerrit.username`, then $USER)."
    )]
    user: Option<String>,
    #[arg(
        short = 'P',
        long,
        global = true,
        env = "GRH_PORT",
        value_name = "PORT",
        help = "SSH port (default: from an ssh:// remote URL, else 29418)."
    )]
    port: Option<u16>,
    #[arg(
        long,
        global = true,
        value_name = "PROJECT",
        help = "Project name or fragment (default: from the remote URL)."
    )]
    project: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "REMOTE",
        help = "git remote pointing at the review server [default: origin]."
    )]
    remote: Option<String>,
    #[arg(
        short,
        long,
        global = true,
        default_value_t = false,
        help = "Log every external command to stderr."
    )]
    verbose: bool,
    #[arg(
        long,
        global = true,
        default_value_t = false,
        help = "Emit pretty JSON (suitable for scripting)."
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List changesets of the project, optionally filtered by regex.
    List {
        #[arg(
            value_name = "PATTERN",
            help = "Regex matched against subject or topic; lowercase patterns ignore case."
        )]
        patterns: Vec<String>,
        #[arg(long, default_value_t = false, help = "Include merged and abandoned changes.")]
        all: bool,
        #[arg(long, value_enum, default_value_t = ColorChoice::Auto, help = "When to colour output.")]
        color: ColorChoice,
    },
    /// Fetch a changeset into FETCH_HEAD.
    Fetch {
        #[arg(value_name = "CHANGESET")]
        changeset: String,
    },
    /// Hard-reset the current branch to a remote branch or a changeset, after safety checks.
    #[command(after_long_help = r#"Checks, in order:
  1. the working tree is clean
  2. HEAD is a known changeset or contained in the upstream branch
  3. TARGET is a remote branch, otherwise a changeset
Nothing is modified unless every check passes.
"#)]
    ResetTo {
        #[arg(value_name = "TARGET")]
        target: String,
    },
    /// Open a changeset (or HEAD's changeset) in a browser.
    Open {
        #[arg(value_name = "CHANGESET", help = "Ref path, number or commit id [default: HEAD].")]
        changeset: Option<String>,
        #[arg(long, value_name = "PROGRAM", help = "Program to open the URL with.")]
        open_with: Option<String>,
    },
    /// Post the same review comment on several changesets.
    Spam {
        #[arg(value_name = "CHANGESET", required = true, num_args = 1..)]
        changesets: Vec<String>,
        #[arg(short, long, value_name = "MSG")]
        message: String,
    },
    /// List server projects, optionally filtered by substring.
    LsProjects {
        #[arg(value_name = "SUBSTRING")]
        substrings: Vec<String>,
    },
    /// Print the resolved configuration.
    DumpConfig,
}

fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    init_logging(verbose);
    if let Err(err) = run(cli) {
        if verbose {
            eprintln!("error: {err:?}");
        } else {
            eprintln!("error: {err:#}");
        }
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let runner = ProcessRunner;
    let overrides = ConfigOverrides {
        host: cli.host,
        user: cli.user,
        port: cli.port,
        remote: cli.remote,
        project: cli.project,
    };
    let config = Config::resolve(&Git::new(&runner), overrides).context("resolve configuration")?;
    let ctx = commands::Context::new(&config, &runner);

    match cli.command {
        Commands::List {
            patterns,
            all,
            color,
        } => {
            let rows = commands::list(&ctx, &ListParams { patterns, all })?;
            if cli.json {
                write_json(&rows)?;
            } else {
                let color = color.enabled();
                colored::control::set_override(color);
                let mut stdout = std::io::stdout().lock();
                for row in &rows {
                    writeln!(stdout, "{}", row.render(color)).context("write stdout")?;
                }
            }
        }

        Commands::Fetch { changeset } => {
            let fetched = commands::fetch(&ctx, &changeset)?;
            if cli.json {
                write_json(&fetched)?;
            } else {
                println!("fetched {} into {}", fetched.ref_name, fetched.target);
                println!("hint: git checkout {}", fetched.target);
            }
        }

        Commands::ResetTo { target } => {
            let plan = commands::reset_to(&ctx, &target)?;
            if cli.json {
                write_json(&plan)?;
            } else {
                println!("reset to {plan}");
            }
        }

        Commands::Open {
            changeset,
            open_with,
        } => {
            let opened = commands::open(
                &ctx,
                &OpenParams {
                    changeset,
                    open_with,
                },
            )?;
            if cli.json {
                write_json(&opened)?;
            } else {
                println!("{}", opened.url);
            }
        }

        Commands::Spam {
            changesets,
            message,
        } => {
            let posted = commands::spam(
                &ctx,
                &SpamParams {
                    changesets,
                    message,
                },
            )?;
            if cli.json {
                write_json(&posted)?;
            } else {
                for comment in &posted {
                    println!("commented on {} patchset {}", comment.change, comment.patchset);
                }
            }
        }

        Commands::LsProjects { substrings } => {
            let projects = commands::ls_projects(&ctx, &substrings)?;
            write_lines(cli.json, &projects)?;
        }

        Commands::DumpConfig => {
            let config = commands::dump_config(&ctx);
            if cli.json {
                write_json(&config)?;
            } else {
                println!("host = {}", config.host);
                println!("user = {}", config.user);
                println!("port = {}", config.port);
                println!("remote = {}", config.remote);
                println!("project = {}", config.project.as_deref().unwrap_or(""));
            }
        }
    }

    Ok(())
}

fn write_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    let raw = serde_json::to_string_pretty(value).context("serialize JSON")?;
    stdout.write_all(raw.as_bytes()).context("write stdout")?;
    stdout.write_all(b"\n").context("write stdout newline")?;
    Ok(())
}

fn write_lines(json: bool, lines: &[String]) -> anyhow::Result<()> {
    if json {
        return write_json(&lines);
    }
    let mut stdout = std::io::stdout().lock();
    for line in lines {
        writeln!(stdout, "{line}").context("write stdout")?;
    }
    Ok(())
}
