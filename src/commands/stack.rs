//! Stack command - inspect, fix, hide and delete stacks.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::core::StatusChange;
use crate::services::Services;
use crate::types::Stack;

#[derive(Args)]
pub struct StackCmd {
    #[command(subcommand)]
    pub command: StackSubCmd,
}

#[derive(Subcommand)]
pub enum StackSubCmd {
    /// Show a stack's counters and status
    Show {
        /// Stack id
        id: String,
    },

    /// Mark a stack fixed
    Fix {
        /// Stack id
        id: String,

        /// Reopen instead of fixing
        #[arg(long)]
        reopen: bool,
    },

    /// Hide a stack and its events
    Hide {
        /// Stack id
        id: String,

        /// Unhide instead of hiding
        #[arg(long)]
        unhide: bool,
    },

    /// Delete a stack that has no events left
    Delete {
        /// Stack id
        id: String,
    },
}

impl StackCmd {
    pub async fn run(&self) -> Result<()> {
        let services = Services::open().await?;
        let stacks = services.stacks();

        match &self.command {
            StackSubCmd::Show { id } => {
                print_stack(&stacks.get_stack(id).await?);
            }
            StackSubCmd::Fix { id, reopen } => {
                let stack = stacks.set_status(id, StatusChange::fixed(!reopen)).await?;
                print_stack(&stack);
            }
            StackSubCmd::Hide { id, unhide } => {
                let stack = stacks.set_status(id, StatusChange::hidden(!unhide)).await?;
                print_stack(&stack);
            }
            StackSubCmd::Delete { id } => {
                stacks.delete_stack(id).await?;
                println!("Deleted stack {}.", id);
            }
        }

        Ok(())
    }
}

fn print_stack(stack: &Stack) {
    println!("{}  {}", stack.id, stack.title);
    println!("  project:      {}", stack.project_id);
    println!("  signature:    {}", stack.signature_hash);
    println!("  occurrences:  {}", stack.total_occurrences);
    if stack.total_occurrences > 0 {
        println!("  first seen:   {}", stack.first_occurrence.to_rfc3339());
        println!("  last seen:    {}", stack.last_occurrence.to_rfc3339());
    }

    let mut status = Vec::new();
    if stack.is_fixed {
        match stack.date_fixed {
            Some(at) => status.push(format!("fixed {}", at.to_rfc3339())),
            None => status.push("fixed".to_string()),
        }
    }
    if stack.is_regressed {
        status.push("regressed".to_string());
    }
    if stack.is_hidden {
        status.push("hidden".to_string());
    }
    if status.is_empty() {
        status.push("open".to_string());
    }
    println!("  status:       {}", status.join(", "));
}
