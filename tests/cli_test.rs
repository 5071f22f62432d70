use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("raildispatch"));
    cmd.arg("tests/fixtures/requests.csv");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "id,correlation_id,status,current_rail,amount,priority,sla_deadline,sla_breached",
        ))
        // Emergency payment settled over FedNow within the run.
        .stdout(predicate::str::contains("corr-1,COMPLETED,fednow,19400,emergency"))
        // Standard ACH only acknowledges; settlement comes later.
        .stdout(predicate::str::contains("corr-2,PENDING,standard-ach,500,standard"));

    Ok(())
}

#[test]
fn test_cli_duplicate_rows_collapse() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("raildispatch"));
    cmd.arg("tests/fixtures/requests.csv");

    let output = cmd.output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    // corr-1 appears twice in the input but once in the output.
    assert_eq!(stdout.matches("corr-1,").count(), 1);
    Ok(())
}

#[test]
fn test_cli_missing_input_fails() {
    let mut cmd = Command::new(cargo_bin!("raildispatch"));
    cmd.arg("tests/fixtures/does-not-exist.csv");
    cmd.assert().failure();
}
