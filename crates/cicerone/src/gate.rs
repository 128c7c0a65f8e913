use async_trait::async_trait;
use cicerone_engine::planner::gate::{ConfirmationDecision, ConfirmationGate, PendingConfirmation};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Confirmation gate backed by the terminal: prints the pending action
/// and waits for a y/N answer on stdin.
pub struct StdinGate;

#[async_trait]
impl ConfirmationGate for StdinGate {
    async fn review(&mut self, pending: &PendingConfirmation) -> ConfirmationDecision {
        println!();
        println!("Confirmation required: {}", pending.description);
        print!("Proceed? [y/N] ");
        if io::stdout().flush().is_err() {
            return ConfirmationDecision::Cancelled;
        }

        let mut reader = BufReader::new(tokio::io::stdin()).lines();
        match reader.next_line().await {
            Ok(Some(line)) => {
                let answer = line.trim().to_lowercase();
                if answer == "y" || answer == "yes" {
                    ConfirmationDecision::Approved
                } else {
                    ConfirmationDecision::Cancelled
                }
            }
            _ => ConfirmationDecision::Cancelled,
        }
    }
}
