use std::fs;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::interpreter::{run_until_done, ErrorRecord, Outcome, VM};

#[derive(Parser)]
#[command(name = "pscontrol")]
#[command(about = "pscontrol - A PostScript control-flow engine", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a program file, feeding it to the interpreter in chunks
    Run {
        /// Program to run
        file: String,

        /// Bytes fed per chunk (default: 4096)
        #[arg(long, default_value = "4096")]
        chunk_size: usize,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate a program given on the command line
    Eval {
        /// Program source
        source: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

/// What a finished run looks like from outside
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub job_id: String,
    pub outcome: Outcome,
    /// Operand stack, bottom first, rendered as `==` prints it
    pub stack: Vec<String>,
    pub output: String,
    pub steps: u64,
}

impl RunReport {
    fn new(vm: &VM, outcome: Outcome) -> Self {
        RunReport {
            job_id: vm.job_id.to_string(),
            outcome,
            stack: vm.ostack.as_slice().iter().map(|o| o.to_string()).collect(),
            output: vm.output.clone(),
            steps: vm.stats.dispatched,
        }
    }

    fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(self)?);
            return Ok(());
        }
        print!("{}", self.output);
        match &self.outcome {
            Outcome::Completed => {}
            Outcome::NeedInput => eprintln!("Input ended while the job wanted more"),
            Outcome::Quit { code } => eprintln!("Quit with code {}", code),
            Outcome::Aborted(record) => {
                let command = record.command.as_deref().unwrap_or("--nostringval--");
                eprintln!("Error: {} in {}", record.error, command);
                eprintln!("  {}", record.message);
            }
        }
        if !self.stack.is_empty() {
            println!("Operand stack:");
            for obj in self.stack.iter().rev() {
                println!("  {}", obj);
            }
        }
        Ok(())
    }
}

/// Run the CLI by parsing process arguments
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli)
}

/// Run the CLI with provided arguments
pub fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli)
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    let config = Config::builder().config_path(cli.config).build()?;

    match cli.command {
        Commands::Run {
            file,
            chunk_size,
            json,
        } => {
            let source =
                fs::read(&file).with_context(|| format!("Failed to read {}", file))?;
            let mut vm = VM::new(config);
            let outcome = run_chunked(&mut vm, &file, &source, chunk_size);
            RunReport::new(&vm, outcome).print(json)?;
        }

        Commands::Eval { source, json } => {
            let mut vm = VM::new(config);
            let outcome = vm.run_source(&source);
            RunReport::new(&vm, outcome).print(json)?;
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Feed `source` to a fresh input stream `chunk_size` bytes at a time,
/// running the driver whenever it asks for more
pub fn run_chunked(vm: &mut VM, name: &str, source: &[u8], chunk_size: usize) -> Outcome {
    vm.begin_job();
    let input = match vm.open_input(name) {
        Ok(input) => input,
        Err(err) => return Outcome::Aborted(ErrorRecord::new(&err, None)),
    };
    let mut chunks = source.chunks(chunk_size.max(1));
    loop {
        match chunks.next() {
            Some(chunk) => input.feed(chunk),
            None => input.close(),
        }
        let outcome = run_until_done(vm);
        if outcome != Outcome::NeedInput || input.is_closed() {
            info!(steps = vm.stats.dispatched, "run finished");
            return outcome;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_chunked_matches_run_source() {
        let source = b"/sq {dup mul} def 0 1 4 {sq} for count";
        for chunk_size in [1, 3, 7, 4096] {
            let mut vm = VM::default();
            assert_eq!(
                run_chunked(&mut vm, "%test", source, chunk_size),
                Outcome::Completed
            );
            let stack: Vec<String> =
                vm.ostack.as_slice().iter().map(|o| o.to_string()).collect();
            assert_eq!(stack, vec!["0", "1", "4", "9", "16", "5"]);
        }
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["pscontrol", "--config", "x.toml", "eval", "1 2 add", "--json"]);
        assert_eq!(cli.config.as_deref(), Some("x.toml"));
        let Commands::Eval { source, json } = cli.command else {
            unreachable!("expected eval")
        };
        assert_eq!(source, "1 2 add");
        assert!(json);
    }

    #[test]
    fn test_report_serializes_outcome() {
        let mut vm = VM::default();
        let outcome = vm.run_source("1 (a) =");
        let report = RunReport::new(&vm, outcome);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"]["status"], "completed");
        assert_eq!(value["stack"][0], "1");
        assert_eq!(value["output"], "a\n");
    }
}
