//! Fuzz target for wire decoding.
//!
//! Tests that arbitrary bytes received from a ledger never panic, neither in
//! prost's `Message::decode` nor in the conversion to domain types. Responses
//! are untrusted input to the client.

#![no_main]

use daml_ledger_proto::proto;
use daml_ledger_types::{Completion, ContractEntry, Transaction, TransactionTree, Value};
use libfuzzer_sys::fuzz_target;
use prost::Message;

fuzz_target!(|data: &[u8]| {
    // Vary which message type we decode based on the first byte
    if data.is_empty() {
        return;
    }

    let selector = data[0] % 5;
    let payload = &data[1..];

    match selector {
        0 => {
            if let Ok(value) = proto::Value::decode(payload) {
                let _ = Value::try_from(value);
            }
        },
        1 => {
            if let Ok(tx) = proto::Transaction::decode(payload) {
                let _ = Transaction::try_from(tx);
            }
        },
        2 => {
            if let Ok(tree) = proto::TransactionTree::decode(payload) {
                // Linking and traversal must terminate on arbitrary node ranges
                if let Ok(tree) = TransactionTree::try_from(tree) {
                    let _ = tree.walk_ids();
                }
            }
        },
        3 => {
            if let Ok(chunk) = proto::GetActiveContractsResponse::decode(payload)
                && let Some(entry) = chunk.contract_entry
            {
                let _ = ContractEntry::try_from(entry);
            }
        },
        _ => {
            if let Ok(completion) = proto::Completion::decode(payload) {
                let _ = Completion::try_from(completion);
            }
        },
    }
});
