//! Tenant command - create tenants and inspect their limits.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

use crate::services::Services;
use crate::store::DocumentStore;
use crate::types::{Tenant, UNLIMITED};

#[derive(Args)]
pub struct TenantCmd {
    #[command(subcommand)]
    pub command: TenantSubCmd,
}

#[derive(Subcommand)]
pub enum TenantSubCmd {
    /// Create a tenant or update its name and limits
    Add(TenantAddCmd),

    /// Show a tenant's limits and last checkpointed usage
    Show {
        /// Tenant id
        id: String,
    },
}

#[derive(Args)]
pub struct TenantAddCmd {
    /// Tenant id
    pub id: String,

    /// Display name (defaults to the id)
    #[arg(long)]
    pub name: Option<String>,

    /// Events accepted per hour (-1 for unlimited)
    #[arg(long, default_value_t = UNLIMITED, allow_negative_numbers = true)]
    pub hourly_limit: i64,

    /// Events accepted per month (-1 for unlimited)
    #[arg(long, default_value_t = UNLIMITED, allow_negative_numbers = true)]
    pub monthly_limit: i64,

    /// Extra monthly events on top of the monthly limit
    #[arg(long, default_value_t = 0)]
    pub bonus_events: i64,

    /// When the bonus stops counting (RFC 3339)
    #[arg(long)]
    pub bonus_expires: Option<DateTime<Utc>>,
}

impl TenantCmd {
    pub async fn run(&self) -> Result<()> {
        let services = Services::open().await?;

        match &self.command {
            TenantSubCmd::Add(cmd) => {
                let tenant = Tenant::new(&cmd.id, cmd.name.as_deref().unwrap_or(&cmd.id))
                    .with_limits(cmd.hourly_limit, cmd.monthly_limit)
                    .with_bonus(cmd.bonus_events, cmd.bonus_expires);

                services
                    .store
                    .upsert_tenant(&tenant)
                    .await
                    .context("Failed to save tenant")?;

                println!("Tenant {} saved.", tenant.id);
                print_limits(&tenant);
            }
            TenantSubCmd::Show { id } => {
                let tenant = services
                    .store
                    .get_tenant(id)
                    .await?
                    .with_context(|| format!("Tenant not found: {}", id))?;

                println!("{} ({})", tenant.id, tenant.name);
                print_limits(&tenant);
                println!();
                println!(
                    "hourly usage:   {} [{}] blocked {} too big {}",
                    tenant.hourly_usage.total,
                    tenant.hourly_usage.period,
                    tenant.hourly_usage.blocked,
                    tenant.hourly_usage.too_big
                );
                println!(
                    "monthly usage:  {} [{}] blocked {} too big {}",
                    tenant.monthly_usage.total,
                    tenant.monthly_usage.period,
                    tenant.monthly_usage.blocked,
                    tenant.monthly_usage.too_big
                );
                match tenant.last_checkpoint {
                    Some(at) => println!("checkpointed:   {}", at.to_rfc3339()),
                    None => println!("checkpointed:   never"),
                }
            }
        }

        Ok(())
    }
}

fn print_limits(tenant: &Tenant) {
    let limit = |value: i64| {
        if value < 0 {
            "unlimited".to_string()
        } else {
            value.to_string()
        }
    };

    println!("hourly limit:   {}", limit(tenant.hourly_limit));
    println!("monthly limit:  {}", limit(tenant.monthly_limit));
    if tenant.bonus_events > 0 {
        match tenant.bonus_expiration {
            Some(at) => println!("bonus events:   {} until {}", tenant.bonus_events, at.to_rfc3339()),
            None => println!("bonus events:   {}", tenant.bonus_events),
        }
    }
}
