//! Basic usage example: submit a command and read the active contract set.
//!
//! Run: `cargo run --example basic_usage -- --endpoint localhost:6865 --party Alice::1220`
//!
//! This example shows:
//! - Client configuration with a default acting party
//! - Creating a contract and waiting for the transaction
//! - Reading the active contract set for the party
//! - Error handling patterns

// Examples are allowed to use expect/unwrap for brevity
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::disallowed_methods)]

use daml_ledger_sdk::{
    ClientConfig, GetActiveContractsOptions, LedgerClient, Result,
    types::{Command, Commands, Identifier, Record, TransactionFilter, Value},
};

fn arg<'a>(args: &'a [String], flag: &str, default: &'a str) -> &'a str {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("daml_ledger_sdk=debug").init();

    let args: Vec<String> = std::env::args().collect();
    let endpoint = arg(&args, "--endpoint", "localhost:6865");
    let party = arg(&args, "--party", "Alice::1220");
    let package = arg(&args, "--package", "#my-package");

    println!("Connecting to ledger at {endpoint}");

    // -------------------------------------------------------------------------
    // 1. Create a client with configuration
    // -------------------------------------------------------------------------
    let config = ClientConfig::builder()
        .with_endpoint(endpoint)
        .with_party(party)
        .with_user_id("basic-usage-example")
        .with_timeout(std::time::Duration::from_secs(10))
        .build()?;
    let client = LedgerClient::new(config)?;

    println!("Ledger API version {}", client.get_version().await?);
    println!("Ledger end at offset {}", client.get_ledger_end().await?);

    // -------------------------------------------------------------------------
    // 2. Create a contract and wait for its transaction
    // -------------------------------------------------------------------------
    let template = Identifier::new(package, "Main", "Asset")?;
    let args = Record::new()
        .with_field("issuer", Value::Party(party.to_owned()))
        .with_field("owner", Value::Party(party.to_owned()))
        .with_field("name", Value::from("gold"));
    let commands = Commands::new(vec![Command::create(template.clone(), args)])
        .with_workflow_id("basic-usage");

    match client.submit_and_wait_for_transaction(commands, None).await {
        Ok(transaction) => {
            for created in transaction.created_events() {
                println!("Created {} at offset {}", created.contract_id, transaction.offset);
            }
        },
        Err(e) => {
            // The ledger decides rejections; the SDK reports them once
            eprintln!("Submission rejected ({:?}): {e}", e.code());
            for detail in e.details() {
                eprintln!("  {}: {:?}", detail.type_url, detail.reason);
            }
        },
    }

    // -------------------------------------------------------------------------
    // 3. Read the active contract set for the party
    // -------------------------------------------------------------------------
    let acs = client
        .get_active_contracts(GetActiveContractsOptions::new(TransactionFilter::wildcard_for([
            party,
        ])))
        .await?;
    println!("{} active contracts as of offset {}", acs.contracts.len(), acs.offset);
    for entry in acs.contracts.iter().filter(|c| c.created_event().template_id == template) {
        println!("  {}", entry.contract_id());
    }

    client.close();
    Ok(())
}
