//! Quota command - remaining quota and live usage for a tenant.

use anyhow::Result;
use clap::Args;

use crate::services::Services;
use crate::types::UsageSnapshot;

#[derive(Args)]
pub struct QuotaCmd {
    /// Tenant id
    pub tenant: String,
}

impl QuotaCmd {
    pub async fn run(&self) -> Result<()> {
        let services = Services::open().await?;
        let limiter = services.limiter();

        let remaining = limiter.get_remaining_quota(&self.tenant).await?;
        let usage = limiter.get_usage(&self.tenant).await?;

        println!("Tenant: {}", self.tenant);
        println!();
        println!("remaining this month:  {}", remaining);
        println!();
        print_period("hourly", &usage.hourly);
        print_period("monthly", &usage.monthly);

        Ok(())
    }
}

fn print_period(label: &str, usage: &UsageSnapshot) {
    println!("{} [{}]", label, usage.period);
    println!("  total:    {}", usage.total);
    println!("  blocked:  {}", usage.blocked);
    println!("  too big:  {}", usage.too_big);
}
