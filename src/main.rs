mod commands;
mod config;

use std::{io::IsTerminal, process::ExitCode};

use clap::Parser;
use yansi::{Condition, Paint};

use crate::commands::Cli;

fn report(err: &eyre::Report) -> String {
    let mut report = format!("Error: {}", err);
    let causes: Vec<String> = err.chain().skip(1).map(|cause| cause.to_string()).collect();
    if !causes.is_empty() {
        report.push_str("\n\nCaused by:");
        for cause in causes {
            report.push_str(&format!("\n  {}", cause));
        }
    }
    report
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.run() {
        Err(err) => {
            let condition = if std::io::stderr().is_terminal() {
                Condition::ALWAYS
            } else {
                Condition::NEVER
            };
            eprintln!("{}", report(&err).red().whenever(condition));
            ExitCode::from(1)
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}
