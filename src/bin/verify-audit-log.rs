use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, Command};
use tracing::{error, info};

use blud_audit_ledger::audit::{check_ledger, CheckOptions, CheckOutcome, VerificationResult};
use blud_audit_ledger::config::AppConfig;
use blud_audit_ledger::database::Database;
use blud_audit_ledger::AuditLedger;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("verify-audit-log")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Verify BLUD audit ledger hash-chain integrity")
        .after_help("Exits 0 when the range verifies (an empty ledger verifies with 0 rows), 1 on a broken chain, a checkpoint mismatch or a storage error.")
        .arg(
            Arg::new("database-url")
                .short('d')
                .long("database-url")
                .value_name("URL")
                .help("Ledger database URL (defaults to DATABASE_URL)"),
        )
        .arg(
            Arg::new("from")
                .long("from")
                .value_name("SEQ")
                .value_parser(value_parser!(i64))
                .help("First sequence number to verify"),
        )
        .arg(
            Arg::new("to")
                .long("to")
                .value_name("SEQ")
                .value_parser(value_parser!(i64))
                .help("Last sequence number to verify"),
        )
        .arg(
            Arg::new("checkpoint")
                .short('c')
                .long("checkpoint")
                .value_name("HASH")
                .help("Expected Merkle root of the verified range"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose")
                .help("Suppress output except errors"),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    // Set log level based on flags
    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let database_url = match matches.get_one::<String>("database-url") {
        Some(url) => url.clone(),
        None => AppConfig::load()?.database_url,
    };
    let options = CheckOptions {
        from_seq: matches.get_one::<i64>("from").copied(),
        to_seq: matches.get_one::<i64>("to").copied(),
        expected_checkpoint: matches.get_one::<String>("checkpoint").cloned(),
    };

    match verify_ledger(&database_url, &options, verbose, quiet).await {
        Ok(outcome) if outcome.passed() => {
            if !quiet {
                println!("✓ Audit ledger verification completed successfully");
            }
            Ok(())
        }
        Ok(outcome) => {
            error!("Audit ledger verification failed: {}", outcome.summary());
            std::process::exit(outcome.exit_code());
        }
        Err(e) => {
            error!("Audit ledger verification failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn verify_ledger(
    database_url: &str,
    options: &CheckOptions,
    verbose: bool,
    quiet: bool,
) -> Result<CheckOutcome> {
    info!("Verifying audit ledger: {}", database_url);

    let database = Database::open_read_only(database_url).await?;
    let ledger = AuditLedger::new(database);

    let total = ledger.count().await?;
    if total == 0 {
        info!("Audit ledger is empty; nothing to verify");
    }

    let outcome = check_ledger(&ledger, options).await?;

    if !quiet {
        println!("{}", outcome.summary());
    }

    if verbose {
        if let CheckOutcome::Passed {
            result: VerificationResult::Valid { rows_checked, head_hash },
            checkpoint,
        } = &outcome
        {
            println!("\nAudit Ledger Summary:");
            println!("  Total rows:   {}", total);
            println!("  Rows checked: {}", rows_checked);
            println!("  Last hash:    {}", head_hash.as_deref().unwrap_or("-"));
            if let Some(cp) = checkpoint {
                println!("  Merkle root:  {} ({} rows)", cp.merkle_root, cp.row_count);
            }
        }
    }

    ledger.database().close().await;
    Ok(outcome)
}
