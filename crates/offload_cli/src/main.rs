//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `offload_core` linkage.
//! - Run the on-device breakdown over the arguments, with no network.
//!
//! Usage: `offload_cli [--granularity N] <text...>`

use offload_core::{OnDeviceGenerator, SimpleOnDeviceGenerator};
use std::process::ExitCode;

const DEFAULT_GRANULARITY: i32 = 2;

fn main() -> ExitCode {
    println!("offload_core ping={}", offload_core::ping());
    println!("offload_core version={}", offload_core::core_version());

    let (granularity, text) = match parse_args(std::env::args().skip(1)) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };
    if text.is_empty() {
        return ExitCode::SUCCESS;
    }

    for step in SimpleOnDeviceGenerator.generate(&text, granularity, &[], &[]) {
        println!("{}", step.title);
    }
    ExitCode::SUCCESS
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<(i32, String), String> {
    let mut granularity = DEFAULT_GRANULARITY;
    let mut words = Vec::new();
    let mut args = args;
    while let Some(arg) = args.next() {
        if arg == "--granularity" {
            let value = args
                .next()
                .ok_or_else(|| "--granularity needs a value".to_string())?;
            granularity = value
                .parse()
                .map_err(|_| format!("invalid granularity `{value}`"))?;
        } else {
            words.push(arg);
        }
    }
    Ok((granularity, words.join(" ")))
}
