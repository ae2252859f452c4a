mod common;

use anyhow::Result;
use common::{add_monthly_holding, run_divly, stderr, stdout};
use tempfile::tempdir;

#[test]
fn test_holdings_add_and_list() -> Result<()> {
    let temp_dir = tempdir()?;
    add_monthly_holding(temp_dir.path());

    let output = run_divly(temp_dir.path(), &["holdings", "list"]);
    assert!(output.status.success());

    let stdout = stdout(&output);
    assert!(stdout.contains("Portfolio Holdings"));
    assert!(stdout.contains("O"));
    assert!(stdout.contains("Monthly"));
    assert!(stdout.contains("day 15"));
    assert!(stdout.contains("$300.00"));

    Ok(())
}

#[test]
fn test_holdings_add_rejects_bad_payment_month() -> Result<()> {
    let temp_dir = tempdir()?;

    let output = run_divly(
        temp_dir.path(),
        &[
            "holdings", "add", "KO", "--shares", "10", "--price", "60", "--yield-pct", "3",
            "--payment-months", "4,13",
        ],
    );

    assert!(!output.status.success());
    assert!(stderr(&output).contains("out of range"));

    Ok(())
}

#[test]
fn test_add_record_duplicate_detection() -> Result<()> {
    let temp_dir = tempdir()?;
    let args = ["add", "AAPL", "--amount", "24", "--date", "2024-02-15"];

    let first = run_divly(temp_dir.path(), &args);
    assert!(first.status.success(), "{}", stderr(&first));
    assert!(stdout(&first).contains("Recorded $24.00 from AAPL on 2024-02-15"));

    let second = run_divly(temp_dir.path(), &args);
    assert!(!second.status.success(), "Duplicate should be rejected");
    assert!(stderr(&second).contains("Duplicate dividend exists for AAPL on 2024-02-15"));

    let mut forced = args.to_vec();
    forced.push("--force");
    let third = run_divly(temp_dir.path(), &forced);
    assert!(third.status.success(), "Force flag should allow duplicate");

    Ok(())
}

#[test]
fn test_add_record_invalid_amount() -> Result<()> {
    let temp_dir = tempdir()?;

    let output = run_divly(
        temp_dir.path(),
        &["add", "AAPL", "--amount", "invalid", "--date", "2024-02-15"],
    );

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid amount"));

    Ok(())
}

#[test]
fn test_calendar_shows_projected_payments() -> Result<()> {
    let temp_dir = tempdir()?;
    add_monthly_holding(temp_dir.path());

    let output = run_divly(
        temp_dir.path(),
        &["calendar", "--today", "2024-01-02", "--days", "60"],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let stdout = stdout(&output);
    assert!(stdout.contains("Dividend Calendar"));
    assert!(stdout.contains("2024-02-13"));
    assert!(stdout.contains("2024-02-15 Thu $25.00"));
    assert!(stdout.contains("2024-02"));
    // Next payment is outside the window
    assert!(!stdout.contains("2024-03-15"));

    Ok(())
}

#[test]
fn test_calendar_empty_portfolio() -> Result<()> {
    let temp_dir = tempdir()?;

    let output = run_divly(temp_dir.path(), &["calendar", "--today", "2024-01-02"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No dividend events in this period"));

    Ok(())
}

#[test]
fn test_calendar_month_export_ics_and_csv() -> Result<()> {
    let temp_dir = tempdir()?;
    add_monthly_holding(temp_dir.path());
    let ics_path = temp_dir.path().join("march.ics");
    let csv_path = temp_dir.path().join("march.csv");

    let output = run_divly(
        temp_dir.path(),
        &[
            "calendar",
            "--today",
            "2024-01-02",
            "--month",
            "2024-03",
            "--export-ics",
            ics_path.to_str().unwrap(),
            "--export-csv",
            csv_path.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let ics = std::fs::read_to_string(&ics_path)?;
    assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
    assert!(ics.contains("SUMMARY:O Payment\r\n"));
    assert!(ics.contains("DTSTART:20240315T040000Z\r\n"));
    assert!(ics.contains("DTSTART:20240313T040000Z\r\n"));

    let csv = std::fs::read_to_string(&csv_path)?;
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.starts_with("Date,Symbol,Type,Amount,Source,Auto,Growth %"));
    assert!(csv.contains("2024-03-15,O,Payment,"));
    assert!(csv.contains("2024-03-13,O,Ex-Date,"));
    assert!(csv.contains(",projected,true,"));

    Ok(())
}

#[test]
fn test_calendar_filters_by_type() -> Result<()> {
    let temp_dir = tempdir()?;
    add_monthly_holding(temp_dir.path());

    let output = run_divly(
        temp_dir.path(),
        &["calendar", "--today", "2024-01-02", "--month", "2024-03", "--type", "ex"],
    );
    assert!(output.status.success());

    let stdout = stdout(&output);
    assert!(stdout.contains("2024-03-13"));
    assert!(!stdout.contains("2024-03-15"));

    Ok(())
}

#[test]
fn test_calendar_days_beyond_date_range() -> Result<()> {
    let temp_dir = tempdir()?;
    add_monthly_holding(temp_dir.path());

    let output = run_divly(
        temp_dir.path(),
        &["calendar", "--today", "2024-01-02", "--days", "10000000000000"],
    );
    assert!(!output.status.success());
    let stderr = stderr(&output);
    assert!(stderr.contains("--days 10000000000000 is out of range"));
    assert!(!stderr.contains("panicked"));

    Ok(())
}

#[test]
fn test_calendar_invalid_month() -> Result<()> {
    let temp_dir = tempdir()?;

    let output = run_divly(temp_dir.path(), &["calendar", "--month", "2024-13"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid month"));

    Ok(())
}

#[test]
fn test_manual_payout_overrides_projection() -> Result<()> {
    let temp_dir = tempdir()?;
    add_monthly_holding(temp_dir.path());

    let added = run_divly(
        temp_dir.path(),
        &["payouts", "add", "O", "--amount", "26.5", "--date", "2024-02-15", "--type", "payment"],
    );
    assert!(added.status.success(), "{}", stderr(&added));

    let output = run_divly(
        temp_dir.path(),
        &["calendar", "--today", "2024-01-02", "--month", "2024-02"],
    );
    let stdout = stdout(&output);
    assert!(stdout.contains("2024-02-15 Thu $26.50"));
    assert!(stdout.contains("manual"));
    assert!(stdout.contains("2024-02-13"));
    assert!(!stdout.contains("Payment  $25.00"));

    Ok(())
}

#[test]
fn test_payout_lifecycle_with_confirmation() -> Result<()> {
    let temp_dir = tempdir()?;

    // 2024-03-30 is a Saturday, Good Friday closes the 29th
    let added = run_divly(
        temp_dir.path(),
        &["payouts", "add", "pep", "--amount", "1.27", "--date", "2024-03-30", "--priority", "high"],
    );
    assert!(added.status.success(), "{}", stderr(&added));
    let added_out = stdout(&added);
    assert!(added_out.contains("Added PEP Payment of $1.27 on 2024-04-01"));
    assert!(added_out.contains("not a trading day"));

    let edited = run_divly(
        temp_dir.path(),
        &["payouts", "edit", "1", "PEP", "--amount", "1.35", "--date", "2024-04-01"],
    );
    assert!(edited.status.success(), "{}", stderr(&edited));

    let listed = stdout(&run_divly(temp_dir.path(), &["payouts", "list"]));
    assert!(listed.contains("PEP"));
    assert!(listed.contains("$1.35"));

    // No stdin: the prompt is declined and nothing is removed
    let declined = run_divly(temp_dir.path(), &["payouts", "delete", "1"]);
    assert!(declined.status.success());
    assert!(stdout(&declined).contains("Deletion cancelled"));
    assert!(stdout(&run_divly(temp_dir.path(), &["payouts", "list"])).contains("PEP"));

    let deleted = run_divly(temp_dir.path(), &["payouts", "delete", "1", "--yes"]);
    assert!(deleted.status.success());
    assert!(stdout(&deleted).contains("Deleted PEP Payment on 2024-04-01"));
    assert!(stdout(&run_divly(temp_dir.path(), &["payouts", "list"])).contains("No manual payouts"));

    let missing = run_divly(temp_dir.path(), &["payouts", "delete", "1", "--yes"]);
    assert!(!missing.status.success());
    assert!(stderr(&missing).contains("No manual payout numbered 1 (have 0)"));

    let edit_missing = run_divly(
        temp_dir.path(),
        &["payouts", "edit", "3", "PEP", "--amount", "1.35", "--date", "2024-04-01"],
    );
    assert!(!edit_missing.status.success());
    assert!(stderr(&edit_missing).contains("No manual payout numbered 3 (have 0)"));

    Ok(())
}

#[test]
fn test_holidays_listing() -> Result<()> {
    let temp_dir = tempdir()?;

    let output = run_divly(temp_dir.path(), &["holidays", "--year", "2024"]);
    assert!(output.status.success());

    let stdout = stdout(&output);
    assert!(stdout.contains("NYSE holidays 2024"));
    assert!(stdout.contains("2024-03-29 Fri"));
    assert!(stdout.contains("2024-06-19 Wed"));
    assert!(stdout.contains("2024-11-28 Thu"));

    let unsupported = run_divly(temp_dir.path(), &["holidays", "--year", "1985"]);
    assert!(!unsupported.status.success());

    Ok(())
}

#[test]
fn test_data_stats() -> Result<()> {
    let temp_dir = tempdir()?;
    add_monthly_holding(temp_dir.path());

    let output = run_divly(temp_dir.path(), &["data", "stats"]);
    assert!(output.status.success());

    let stdout = stdout(&output);
    assert!(stdout.contains("Data Statistics"));
    assert!(stdout.contains("Holdings: 1"));

    Ok(())
}
