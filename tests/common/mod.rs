#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};

/// Run the divly binary against an isolated data and config directory
pub fn run_divly(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_divly"))
        .args(args)
        .env("DIVLY_DATA_DIR", dir.join("data"))
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env("XDG_CACHE_HOME", dir.join("cache"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("ALPHA_VANTAGE_API_KEY")
        .output()
        .expect("Failed to run divly")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Add a monthly payer paying $25 on the 15th (100 shares at $50, 6% yield)
pub fn add_monthly_holding(dir: &Path) {
    let output = run_divly(
        dir,
        &[
            "holdings",
            "add",
            "O",
            "--shares",
            "100",
            "--price",
            "50",
            "--yield-pct",
            "6",
            "--frequency",
            "monthly",
            "--payment-day",
            "15",
        ],
    );
    assert!(output.status.success(), "holdings add failed: {}", stderr(&output));
}
