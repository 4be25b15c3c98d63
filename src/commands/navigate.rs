//! Navigate command - find the events before and after a given event.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use clap::{Args, ValueEnum};

use crate::services::Services;
use crate::types::{DateRange, Event, EventFilter, Scope};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ScopeArg {
    Stack,
    Project,
    Tenant,
}

impl ScopeArg {
    fn for_event(self, event: &Event) -> Scope {
        match self {
            ScopeArg::Stack => Scope::Stack(event.stack_id.clone()),
            ScopeArg::Project => Scope::Project(event.project_id.clone()),
            ScopeArg::Tenant => Scope::Tenant(event.tenant_id.clone()),
        }
    }
}

#[derive(Args)]
pub struct NavigateCmd {
    /// Reference event id
    pub event_id: String,

    /// Which events count as neighbours
    #[arg(long, short = 's', value_enum, default_value = "stack")]
    pub scope: ScopeArg,

    /// Window start (RFC 3339, default: retention horizon)
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,

    /// Window end (RFC 3339, default: now)
    #[arg(long)]
    pub end: Option<DateTime<Utc>>,

    /// Skip events of fixed stacks
    #[arg(long)]
    pub exclude_fixed: bool,

    /// Skip events of hidden stacks
    #[arg(long)]
    pub exclude_hidden: bool,
}

impl NavigateCmd {
    pub async fn run(&self) -> Result<()> {
        let services = Services::open().await?;
        let navigator = services.navigator();

        let event = navigator.event(&self.event_id).await?;
        let now = services.clock.now();
        let window = DateRange::new(
            self.start
                .unwrap_or(now - Duration::days(i64::from(services.config.retention_days))),
            self.end.unwrap_or(now.max(event.timestamp)),
        );
        let filter = EventFilter {
            is_fixed: self.exclude_fixed.then_some(false),
            is_hidden: self.exclude_hidden.then_some(false),
        };
        let scope = self.scope.for_event(&event);

        let adjacent = navigator
            .previous_and_next(&event.to_ref(), &scope, filter, window)
            .await?;

        println!("event:     {} at {}", event.id, event.timestamp.to_rfc3339());
        println!("scope:     {} {}", scope.column(), scope.id());
        println!("previous:  {}", adjacent.previous.as_deref().unwrap_or("(none)"));
        println!("next:      {}", adjacent.next.as_deref().unwrap_or("(none)"));

        Ok(())
    }
}
